//! Copy engines between function memory and data-source memory.

use std::fmt;
use std::ops::Range;

use rt_core::{RtError, RtResult};
use rt_signals::Direction;

use crate::datasource::DataSource;

/// The closed set of broker types a data source may recommend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrokerKind {
    MemoryMapInput,
    MemoryMapOutput,
    MemoryMapSynchronisedInput,
    MemoryMapSynchronisedOutput,
    MemoryMapMultiBufferInput,
    MemoryMapMultiBufferOutput,
    MemoryMapSynchronisedMultiBufferInput,
    MemoryMapSynchronisedMultiBufferOutput,
}

impl BrokerKind {
    pub const ALL: [BrokerKind; 8] = [
        BrokerKind::MemoryMapInput,
        BrokerKind::MemoryMapOutput,
        BrokerKind::MemoryMapSynchronisedInput,
        BrokerKind::MemoryMapSynchronisedOutput,
        BrokerKind::MemoryMapMultiBufferInput,
        BrokerKind::MemoryMapMultiBufferOutput,
        BrokerKind::MemoryMapSynchronisedMultiBufferInput,
        BrokerKind::MemoryMapSynchronisedMultiBufferOutput,
    ];

    pub fn name(self) -> &'static str {
        match self {
            BrokerKind::MemoryMapInput => "MemoryMapInputBroker",
            BrokerKind::MemoryMapOutput => "MemoryMapOutputBroker",
            BrokerKind::MemoryMapSynchronisedInput => "MemoryMapSynchronisedInputBroker",
            BrokerKind::MemoryMapSynchronisedOutput => "MemoryMapSynchronisedOutputBroker",
            BrokerKind::MemoryMapMultiBufferInput => "MemoryMapMultiBufferInputBroker",
            BrokerKind::MemoryMapMultiBufferOutput => "MemoryMapMultiBufferOutputBroker",
            BrokerKind::MemoryMapSynchronisedMultiBufferInput => {
                "MemoryMapSynchronisedMultiBufferInputBroker"
            }
            BrokerKind::MemoryMapSynchronisedMultiBufferOutput => {
                "MemoryMapSynchronisedMultiBufferOutputBroker"
            }
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.name() == name)
    }

    pub fn direction(self) -> Direction {
        match self {
            BrokerKind::MemoryMapInput
            | BrokerKind::MemoryMapSynchronisedInput
            | BrokerKind::MemoryMapMultiBufferInput
            | BrokerKind::MemoryMapSynchronisedMultiBufferInput => Direction::Input,
            _ => Direction::Output,
        }
    }

    pub fn is_synchronised(self) -> bool {
        matches!(
            self,
            BrokerKind::MemoryMapSynchronisedInput
                | BrokerKind::MemoryMapSynchronisedOutput
                | BrokerKind::MemoryMapSynchronisedMultiBufferInput
                | BrokerKind::MemoryMapSynchronisedMultiBufferOutput
        )
    }

    pub fn is_multi_buffer(self) -> bool {
        matches!(
            self,
            BrokerKind::MemoryMapMultiBufferInput
                | BrokerKind::MemoryMapMultiBufferOutput
                | BrokerKind::MemoryMapSynchronisedMultiBufferInput
                | BrokerKind::MemoryMapSynchronisedMultiBufferOutput
        )
    }
}

impl fmt::Display for BrokerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One precomputed copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CopyDescriptor {
    pub function_offset: u32,
    /// Absolute offset in data-source memory, one per buffer copy.
    pub data_source_offsets: Vec<u32>,
    pub size: u32,
}

/// A broker bound to one function, direction and data source.
#[derive(Debug, Clone, PartialEq)]
pub struct Broker {
    pub kind: BrokerKind,
    pub data_source: String,
    pub copies: Vec<CopyDescriptor>,
}

fn span(offset: u32, size: u32, len: usize, what: &'static str) -> RtResult<Range<usize>> {
    let start = offset as usize;
    let end = start + size as usize;
    if end > len {
        return Err(RtError::IndexOob {
            what,
            index: end,
            len,
        });
    }
    Ok(start..end)
}

impl Broker {
    pub fn new(kind: BrokerKind, data_source: impl Into<String>) -> Self {
        Self {
            kind,
            data_source: data_source.into(),
            copies: Vec::new(),
        }
    }

    pub fn direction(&self) -> Direction {
        self.kind.direction()
    }

    /// Total bytes moved per execution.
    pub fn bytes_per_execution(&self) -> u32 {
        self.copies.iter().map(|c| c.size).sum()
    }

    /// Run every copy against the data source's active buffer.
    pub fn execute(&self, function_memory: &mut [u8], data_source: &mut dyn DataSource) -> RtResult<()> {
        match self.direction() {
            Direction::Input => {
                if self.kind.is_synchronised() {
                    data_source.synchronise()?;
                }
                let buffer = data_source.active_buffer() as usize;
                let memory = data_source.memory();
                for copy in &self.copies {
                    let ds_offset = *copy.data_source_offsets.get(buffer).ok_or(RtError::IndexOob {
                        what: "broker buffer",
                        index: buffer,
                        len: copy.data_source_offsets.len(),
                    })?;
                    let src = span(ds_offset, copy.size, memory.len(), "data source memory")?;
                    let dst = span(copy.function_offset, copy.size, function_memory.len(), "function memory")?;
                    function_memory[dst].copy_from_slice(&memory[src]);
                }
            }
            Direction::Output => {
                let buffer = data_source.active_buffer() as usize;
                let memory = data_source.memory_mut();
                for copy in &self.copies {
                    let ds_offset = *copy.data_source_offsets.get(buffer).ok_or(RtError::IndexOob {
                        what: "broker buffer",
                        index: buffer,
                        len: copy.data_source_offsets.len(),
                    })?;
                    let dst = span(ds_offset, copy.size, memory.len(), "data source memory")?;
                    let src = span(copy.function_offset, copy.size, function_memory.len(), "function memory")?;
                    memory[dst].copy_from_slice(&function_memory[src]);
                }
                if self.kind.is_synchronised() {
                    data_source.synchronise()?;
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::{DataSourceLayout, LayoutSignal};
    use crate::memory_data_source::MemoryDataSource;
    use rt_core::BasicType;

    #[test]
    fn names_round_trip() {
        for kind in BrokerKind::ALL {
            assert_eq!(BrokerKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(BrokerKind::from_name("FancyBroker"), None);
        assert_eq!(BrokerKind::MemoryMapSynchronisedOutput.direction(), Direction::Output);
        assert!(BrokerKind::MemoryMapSynchronisedMultiBufferInput.is_multi_buffer());
    }

    fn data_source() -> MemoryDataSource {
        let layout = DataSourceLayout {
            name: "M".into(),
            signals: vec![LayoutSignal {
                name: "S".into(),
                basic_type: BasicType::UInt16,
                number_of_elements: 2,
                offset: 0,
                size: 4,
                default: None,
                states: vec![],
            }],
            buffer_size: 4,
            number_of_buffers: 1,
        };
        let mut ds = MemoryDataSource::new("M", 1).unwrap();
        ds.allocate_memory(&layout).unwrap();
        ds
    }

    #[test]
    fn output_then_input() {
        let mut ds = data_source();
        let mut writer = Broker::new(BrokerKind::MemoryMapSynchronisedOutput, "M");
        writer.copies.push(CopyDescriptor {
            function_offset: 2,
            data_source_offsets: vec![0],
            size: 4,
        });
        let mut fn_mem = vec![0, 0, 1, 2, 3, 4];
        writer.execute(&mut fn_mem, &mut ds).unwrap();
        assert_eq!(ds.memory(), &[1, 2, 3, 4]);
        assert_eq!(ds.synchronisations(), 1);

        let mut reader = Broker::new(BrokerKind::MemoryMapInput, "M");
        reader.copies.push(CopyDescriptor {
            function_offset: 0,
            data_source_offsets: vec![2],
            size: 2,
        });
        let mut other = vec![0; 2];
        reader.execute(&mut other, &mut ds).unwrap();
        assert_eq!(other, vec![3, 4]);
        assert_eq!(reader.bytes_per_execution(), 2);
    }

    #[test]
    fn out_of_bounds_copy_fails() {
        let mut ds = data_source();
        let mut reader = Broker::new(BrokerKind::MemoryMapInput, "M");
        reader.copies.push(CopyDescriptor {
            function_offset: 0,
            data_source_offsets: vec![2],
            size: 4,
        });
        let mut fn_mem = vec![0; 4];
        assert!(reader.execute(&mut fn_mem, &mut ds).is_err());
    }
}
