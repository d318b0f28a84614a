//! General memory data source with configurable buffering depth.

use rt_core::{RtError, RtResult};
use rt_signals::Direction;
use rt_tree::ConfigTree;

use crate::broker::BrokerKind;
use crate::datasource::{BrokerQuery, DataSource, DataSourceLayout, DataSourceMemory};
use crate::error::{BuildError, BuildResult};

pub const NUMBER_OF_BUFFERS: &str = "NumberOfBuffers";

/// Ring of `NumberOfBuffers` copies. Each synchronisation point carries the
/// active copy forward into the next slot, so the previous copies keep the
/// recent history.
#[derive(Debug)]
pub struct MemoryDataSource {
    name: String,
    number_of_buffers: u32,
    memory: DataSourceMemory,
    active: u32,
    synchronisations: u64,
}

impl MemoryDataSource {
    pub const CLASS: &'static str = "MemoryDataSource";

    pub fn new(name: impl Into<String>, number_of_buffers: u32) -> RtResult<Self> {
        if number_of_buffers == 0 {
            return Err(RtError::InvalidArg {
                what: "NumberOfBuffers must be at least 1",
            });
        }
        Ok(Self {
            name: name.into(),
            number_of_buffers,
            memory: DataSourceMemory::default(),
            active: 0,
            synchronisations: 0,
        })
    }

    pub fn from_tree(name: &str, node: &ConfigTree) -> BuildResult<Self> {
        let buffers = node.read_opt::<u32>(NUMBER_OF_BUFFERS)?.unwrap_or(1);
        Self::new(name, buffers).map_err(|e| BuildError::InvalidDataSource {
            data_source: name.to_string(),
            reason: e.to_string(),
        })
    }

    /// Number of synchronisation points reached so far.
    pub fn synchronisations(&self) -> u64 {
        self.synchronisations
    }
}

impl DataSource for MemoryDataSource {
    fn class_name(&self) -> &'static str {
        Self::CLASS
    }

    fn broker_name(&self, query: &BrokerQuery<'_>, direction: Direction) -> Option<&'static str> {
        let synchronised = match direction {
            Direction::Input => query.is_synchronising(),
            Direction::Output => query.trigger,
        };
        let multi = self.number_of_buffers > 1;
        let kind = match (direction, synchronised, multi) {
            (Direction::Input, false, false) => BrokerKind::MemoryMapInput,
            (Direction::Input, true, false) => BrokerKind::MemoryMapSynchronisedInput,
            (Direction::Input, false, true) => BrokerKind::MemoryMapMultiBufferInput,
            (Direction::Input, true, true) => BrokerKind::MemoryMapSynchronisedMultiBufferInput,
            (Direction::Output, false, false) => BrokerKind::MemoryMapOutput,
            (Direction::Output, true, false) => BrokerKind::MemoryMapSynchronisedOutput,
            (Direction::Output, false, true) => BrokerKind::MemoryMapMultiBufferOutput,
            (Direction::Output, true, true) => BrokerKind::MemoryMapSynchronisedMultiBufferOutput,
        };
        Some(kind.name())
    }

    fn number_of_buffers(&self) -> u32 {
        self.number_of_buffers
    }

    fn allocate_memory(&mut self, layout: &DataSourceLayout) -> RtResult<()> {
        if layout.number_of_buffers != self.number_of_buffers {
            return Err(RtError::Invariant {
                what: "layout buffer count differs from NumberOfBuffers",
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
        self.memory.reset_entering_signals(current, next, self.active)?;
        Ok(())
    }

    fn synchronise(&mut self) -> RtResult<()> {
        self.synchronisations += 1;
        if self.number_of_buffers > 1 {
            let next = (self.active + 1) % self.number_of_buffers;
            self.memory.copy_buffer(self.active, next)?;
            self.active = next;
        }
        Ok(())
    }
}
