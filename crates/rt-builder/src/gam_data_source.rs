//! Double-buffered data source for function-to-function exchange.

use rt_core::{RtError, RtResult};
use rt_signals::Direction;
use rt_tree::ConfigTree;

use crate::broker::BrokerKind;
use crate::datasource::{BrokerQuery, DataSource, DataSourceLayout, DataSourceMemory};
use crate::error::BuildResult;

/// Two buffer copies; the inactive one is prepared on each state change so
/// functions of the leaving state can keep reading until the switch.
#[derive(Debug, Default)]
pub struct GamDataSource {
    name: String,
    memory: DataSourceMemory,
    active: u32,
}

impl GamDataSource {
    pub const CLASS: &'static str = "GAMDataSource";

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn from_tree(name: &str, _node: &ConfigTree) -> BuildResult<Self> {
        Ok(Self::new(name))
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl DataSource for GamDataSource {
    fn class_name(&self) -> &'static str {
        Self::CLASS
    }

    fn broker_name(&self, query: &BrokerQuery<'_>, direction: Direction) -> Option<&'static str> {
        if query.samples > 1 || query.is_synchronising() || query.trigger {
            return None;
        }
        let kind = match direction {
            Direction::Input => BrokerKind::MemoryMapInput,
            Direction::Output => BrokerKind::MemoryMapOutput,
        };
        Some(kind.name())
    }

    fn number_of_buffers(&self) -> u32 {
        2
    }

    fn allocate_memory(&mut self, layout: &DataSourceLayout) -> RtResult<()> {
        if layout.number_of_buffers != 2 {
            return Err(RtError::InvalidArg {
                what: "GAMDataSource layout must have two buffers",
            });
        }
        self.active = 0;
        self.memory.allocate(layout)
    }

    fn memory(&self) -> &[u8] {
        self.memory.bytes()
    }

    fn memory_mut(&mut self) -> &mut [u8] {
        self.memory.bytes_mut()
    }

    fn active_buffer(&self) -> u32 {
        self.active
    }

    fn signal_memory_buffer(&self, signal_index: usize, buffer_index: u32) -> RtResult<&[u8]> {
        self.memory.signal(signal_index, buffer_index)
    }

    fn prepare_next_state(&mut self, current: &str, next: &str) -> RtResult<()> {
        let target = 1 - self.active;
        self.memory.copy_buffer(self.active, target)?;
        let reset = self.memory.reset_entering_signals(current, next, target)?;
        tracing::debug!(
            data_source = %self.name,
            from = current,
            to = next,
            buffer = target,
            reset,
            "prepared next state"
        );
        self.active = target;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::LayoutSignal;
    use rt_core::BasicType;

    fn query(samples: u32, frequency: Option<f32>) -> BrokerQuery<'static> {
        BrokerQuery {
            function: "GAMA",
            signal: "Signal0",
            frequency,
            trigger: false,
            samples,
            number_of_elements: 1,
            byte_size: 4,
        }
    }

    #[test]
    fn brokers() {
        let ds = GamDataSource::new("DDB1");
        assert_eq!(
            ds.broker_name(&query(1, None), Direction::Input),
            Some("MemoryMapInputBroker")
        );
        assert_eq!(
            ds.broker_name(&query(1, Some(-1.0)), Direction::Output),
            Some("MemoryMapOutputBroker")
        );
        assert_eq!(ds.broker_name(&query(2, None), Direction::Input), None);
        assert_eq!(ds.broker_name(&query(1, Some(10.0)), Direction::Input), None);
    }

    #[test]
    fn state_change_swaps_buffers_and_resets_entering_signals() {
        let layout = DataSourceLayout {
            name: "DDB1".into(),
            signals: vec![
                LayoutSignal {
                    name: "Kept".into(),
                    basic_type: BasicType::UInt8,
                    number_of_elements: 1,
                    offset: 0,
                    size: 1,
                    default: Some(vec![1]),
                    states: vec!["A".into(), "B".into()],
                },
                LayoutSignal {
                    name: "Entering".into(),
                    basic_type: BasicType::UInt8,
                    number_of_elements: 1,
                    offset: 1,
                    size: 1,
                    default: Some(vec![9]),
                    states: vec!["B".into()],
                },
            ],
            buffer_size: 2,
            number_of_buffers: 2,
        };
        let mut ds = GamDataSource::new("DDB1");
        ds.allocate_memory(&layout).unwrap();
        ds.memory_mut()[0] = 5;
        ds.memory_mut()[1] = 6;

        ds.prepare_next_state("A", "B").unwrap();
        assert_eq!(ds.active_buffer(), 1);
        assert_eq!(ds.signal_memory_buffer(0, 1).unwrap(), &[5]);
        assert_eq!(ds.signal_memory_buffer(1, 1).unwrap(), &[9]);
        // the leaving buffer is untouched
        assert_eq!(ds.signal_memory_buffer(1, 0).unwrap(), &[6]);
    }
}
