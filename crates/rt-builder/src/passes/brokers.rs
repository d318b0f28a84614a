//! AssignBrokersToFunctions.

use rt_signals::Direction;

use crate::broker::{Broker, BrokerKind, CopyDescriptor};
use crate::builder::{ConfigurationBuilder, Pass};
use crate::database::{DataSourceRecord, SignalSlot};
use crate::datasource::{BrokerQuery, DataSourceLayout};
use crate::error::{BuildError, BuildResult};

fn copies_for(slot: &SignalSlot, layout: &DataSourceLayout) -> BuildResult<Vec<CopyDescriptor>> {
    let bases: Vec<u32> = (0..layout.number_of_buffers)
        .map(|buffer| layout.offset_of(slot.data_source_signal, buffer))
        .collect::<Option<_>>()
        .ok_or_else(|| BuildError::InternalConsistency {
            what: format!("'{}' has no slot in '{}'", slot.remote_name, layout.name),
        })?;

    if slot.byte_offsets.len() == 1 && slot.byte_offsets[0][0] == 0 {
        return Ok(vec![CopyDescriptor {
            function_offset: slot.gam_memory_offset,
            data_source_offsets: bases,
            size: slot.byte_size,
        }]);
    }

    let mut function_offset = slot.gam_memory_offset;
    let mut copies = Vec::with_capacity(slot.byte_offsets.len());
    for &[offset, size] in &slot.byte_offsets {
        copies.push(CopyDescriptor {
            function_offset,
            data_source_offsets: bases.iter().map(|b| b + offset).collect(),
            size,
        });
        function_offset += size;
    }
    Ok(copies)
}

fn select_broker(
    ds: &DataSourceRecord,
    function: &str,
    slot: &SignalSlot,
    element_count: u32,
    direction: Direction,
) -> BuildResult<BrokerKind> {
    let query = BrokerQuery {
        function,
        signal: &slot.remote_name,
        frequency: slot.frequency,
        trigger: slot.trigger == Some(1),
        samples: slot.samples,
        number_of_elements: element_count,
        byte_size: slot.byte_size,
    };
    ds.object
        .broker_name(&query, direction)
        .and_then(BrokerKind::from_name)
        .ok_or_else(|| BuildError::UnsupportedBroker {
            function: function.to_string(),
            signal: slot.qualified_name.clone(),
            data_source: ds.qualified_name.clone(),
        })
}

impl ConfigurationBuilder {
    /// Ask each data source for a broker per signal and precompute every
    /// copy the brokers will perform.
    pub fn assign_brokers_to_functions(&mut self) -> BuildResult<()> {
        self.step(Pass::AssignBrokersToFunctions, |b| {
            let db = &mut b.db;
            for record in &mut db.functions {
                let function = record.qualified_name.clone();
                let id = record.id;
                for direction in Direction::BOTH {
                    let side = record.side_mut(direction);
                    let mut brokers: Vec<Broker> = Vec::new();
                    for block in &mut side.blocks {
                        let ds = db.data_sources.get_mut(&block.data_source).ok_or_else(|| {
                            BuildError::InternalConsistency {
                                what: format!("unknown data source '{}'", block.data_source),
                            }
                        })?;
                        let layout = ds.layout.clone().ok_or_else(|| BuildError::InternalConsistency {
                            what: format!("'{}' has no memory layout", ds.qualified_name),
                        })?;
                        for slot in &mut block.signals {
                            let elements = side.signals[slot.signal_index].element_count();
                            let kind = select_broker(ds, &function, slot, elements, direction)?;
                            slot.broker = Some(kind);
                            let copies = copies_for(slot, &layout)?;

                            match brokers
                                .iter_mut()
                                .find(|br| br.kind == kind && br.data_source == block.data_source)
                            {
                                Some(broker) => broker.copies.extend(copies),
                                None => {
                                    let mut broker = Broker::new(kind, block.data_source.clone());
                                    broker.copies = copies;
                                    brokers.push(broker);
                                }
                            }

                            if let Some(user) = ds.functions.iter_mut().find(|u| u.function == id) {
                                if let Some(entry) = user
                                    .signals
                                    .iter_mut()
                                    .find(|s| s.direction == direction && s.qualified_name == slot.qualified_name)
                                {
                                    entry.broker = Some(kind);
                                }
                            }
                            tracing::debug!(%function, signal = %slot.qualified_name, broker = %kind, "assigned broker");
                        }
                    }
                    side.brokers = brokers;
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::LayoutSignal;
    use rt_core::BasicType;

    fn slot(byte_offsets: Vec<[u32; 2]>, byte_size: u32) -> SignalSlot {
        SignalSlot {
            signal_index: 0,
            qualified_name: "S".into(),
            remote_name: "S".into(),
            data_source_signal: 1,
            byte_offsets,
            byte_size,
            padding: 0,
            samples: 1,
            frequency: None,
            trigger: None,
            alignment: 4,
            gam_memory_offset: 8,
            broker: None,
        }
    }

    fn layout() -> DataSourceLayout {
        let signal = |name: &str, offset| LayoutSignal {
            name: name.into(),
            basic_type: BasicType::UInt32,
            number_of_elements: 32,
            offset,
            size: 128,
            default: None,
            states: vec![],
        };
        DataSourceLayout {
            name: "DDB1".into(),
            signals: vec![signal("A", 0), signal("S", 128)],
            buffer_size: 256,
            number_of_buffers: 2,
        }
    }

    #[test]
    fn whole_signal_is_one_copy_per_buffer() {
        let copies = copies_for(&slot(vec![[0, 128]], 128), &layout()).unwrap();
        assert_eq!(
            copies,
            vec![CopyDescriptor {
                function_offset: 8,
                data_source_offsets: vec![128, 384],
                size: 128,
            }]
        );
    }

    #[test]
    fn ranges_become_separate_copies() {
        let copies = copies_for(&slot(vec![[44, 16], [84, 44]], 60), &layout()).unwrap();
        assert_eq!(copies.len(), 2);
        assert_eq!(copies[0].function_offset, 8);
        assert_eq!(copies[0].data_source_offsets, vec![172, 428]);
        assert_eq!(copies[1].function_offset, 24);
        assert_eq!(copies[1].data_source_offsets, vec![212, 468]);
        assert_eq!(copies[1].size, 44);
    }
}
