//! Receives the generated cycle and execution time signals.

use rt_core::RtResult;
use rt_signals::Direction;
use rt_tree::ConfigTree;

use crate::broker::BrokerKind;
use crate::datasource::{BrokerQuery, DataSource, DataSourceLayout, DataSourceMemory};
use crate::error::BuildResult;

#[derive(Debug, Default)]
pub struct TimingDataSource {
    name: String,
    memory: DataSourceMemory,
}

impl TimingDataSource {
    pub const CLASS: &'static str = "TimingDataSource";

    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            memory: DataSourceMemory::default(),
        }
    }

    pub fn from_tree(name: &str, _node: &ConfigTree) -> BuildResult<Self> {
        Ok(Self::new(name))
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl DataSource for TimingDataSource {
    fn class_name(&self) -> &'static str {
        Self::CLASS
    }

    fn broker_name(&self, _query: &BrokerQuery<'_>, direction: Direction) -> Option<&'static str> {
        match direction {
            Direction::Input => Some(BrokerKind::MemoryMapInput.name()),
            Direction::Output => None,
        }
    }

    fn allow_no_producers(&self) -> bool {
        true
    }

    fn is_timing(&self) -> bool {
        true
    }

    fn allocate_memory(&mut self, layout: &DataSourceLayout) -> RtResult<()> {
        self.memory.allocate(layout)
    }

    fn memory(&self) -> &[u8] {
        self.memory.bytes()
    }

    fn memory_mut(&mut self) -> &mut [u8] {
        self.memory.bytes_mut()
    }

    fn signal_memory_buffer(&self, signal_index: usize, buffer_index: u32) -> RtResult<&[u8]> {
        self.memory.signal(signal_index, buffer_index)
    }

    fn prepare_next_state(&mut self, _current: &str, _next: &str) -> RtResult<()> {
        Ok(())
    }
}
