//! Working database the resolver passes fill in.
//!
//! Everything is kept in insertion-ordered containers so the resolved
//! offsets are a function of configuration order only.

use indexmap::IndexMap;
use rt_core::{DataSourceId, FunctionId};
use rt_signals::{Direction, SignalDescriptor};

use crate::broker::{Broker, BrokerKind};
use crate::datasource::{DataSource, DataSourceLayout};

/// Byte footprint of one function signal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignalFootprint {
    /// `[offset, size]` rows inside one sample, one per range.
    pub byte_offsets: Vec<[u32; 2]>,
    /// Whole signal size including samples.
    pub byte_size: u32,
}

/// A function signal placed in function memory.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalSlot {
    /// Index in the function's signal list for this direction.
    pub signal_index: usize,
    pub qualified_name: String,
    pub remote_name: String,
    /// Index in the data source signal list.
    pub data_source_signal: usize,
    pub byte_offsets: Vec<[u32; 2]>,
    pub byte_size: u32,
    /// Structure padding kept after the signal in function memory.
    pub padding: u32,
    pub samples: u32,
    pub frequency: Option<f32>,
    pub trigger: Option<u32>,
    pub alignment: u32,
    pub gam_memory_offset: u32,
    pub broker: Option<BrokerKind>,
}

/// Signals a function exchanges with one data source in one direction.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryBlock {
    pub data_source: String,
    pub signals: Vec<SignalSlot>,
    pub byte_size: u32,
}

/// One direction of a function.
#[derive(Debug, Clone, Default)]
pub struct FunctionSignals {
    pub signals: Vec<SignalDescriptor>,
    pub footprints: Vec<SignalFootprint>,
    pub blocks: Vec<MemoryBlock>,
    pub brokers: Vec<Broker>,
}

#[derive(Debug, Clone)]
pub struct FunctionRecord {
    pub id: FunctionId,
    pub qualified_name: String,
    pub class: Option<String>,
    pub inputs: FunctionSignals,
    pub outputs: FunctionSignals,
    /// State name to the threads running this function in it.
    pub states: IndexMap<String, Vec<String>>,
    /// Size of the private working buffer.
    pub byte_size: u32,
}

impl FunctionRecord {
    pub fn new(id: FunctionId, qualified_name: impl Into<String>) -> Self {
        Self {
            id,
            qualified_name: qualified_name.into(),
            class: None,
            inputs: FunctionSignals::default(),
            outputs: FunctionSignals::default(),
            states: IndexMap::new(),
            byte_size: 0,
        }
    }

    pub fn side(&self, direction: Direction) -> &FunctionSignals {
        match direction {
            Direction::Input => &self.inputs,
            Direction::Output => &self.outputs,
        }
    }

    pub fn side_mut(&mut self, direction: Direction) -> &mut FunctionSignals {
        match direction {
            Direction::Input => &mut self.inputs,
            Direction::Output => &mut self.outputs,
        }
    }

    pub fn signal_names(&self, direction: Direction) -> impl Iterator<Item = &str> {
        self.side(direction)
            .signals
            .iter()
            .map(|s| s.qualified_name.as_str())
    }
}

/// One function's access to a data-source signal in a state.
#[derive(Debug, Clone, PartialEq)]
pub struct Usage {
    pub function: FunctionId,
    pub function_name: String,
    /// Function-side qualified name.
    pub signal: String,
    pub ranges: Option<Vec<[u32; 2]>>,
    pub samples: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct StateUsage {
    pub consumers: Vec<Usage>,
    pub producers: Vec<Usage>,
}

impl StateUsage {
    /// Producers deduplicated by function, in first-seen order.
    pub fn distinct_producers(&self) -> Vec<FunctionId> {
        let mut out: Vec<FunctionId> = Vec::new();
        for p in &self.producers {
            if !out.contains(&p.function) {
                out.push(p.function);
            }
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataSourceSignal {
    pub descriptor: SignalDescriptor,
    pub states: IndexMap<String, StateUsage>,
}

impl DataSourceSignal {
    pub fn new(descriptor: SignalDescriptor) -> Self {
        Self {
            descriptor,
            states: IndexMap::new(),
        }
    }
}

/// A signal of a function as seen from the data source.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSourceFunctionSignal {
    pub qualified_name: String,
    pub remote_name: String,
    pub direction: Direction,
    pub byte_size: u32,
    pub broker: Option<BrokerKind>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DataSourceFunction {
    pub function: FunctionId,
    pub qualified_name: String,
    pub signals: Vec<DataSourceFunctionSignal>,
    pub byte_size: u32,
}

#[derive(Debug)]
pub struct DataSourceRecord {
    pub id: DataSourceId,
    pub qualified_name: String,
    pub class: String,
    pub locked: bool,
    /// `AllowNoProducers` from the data source node.
    pub allow_no_producers: bool,
    pub signals: IndexMap<String, DataSourceSignal>,
    pub functions: Vec<DataSourceFunction>,
    pub layout: Option<DataSourceLayout>,
    pub object: Box<dyn DataSource>,
}

impl DataSourceRecord {
    pub fn is_timing(&self) -> bool {
        self.object.is_timing()
    }

    /// Whether `signal` tolerates having no producer.
    pub fn signal_allows_no_producers(&self, signal: &DataSourceSignal) -> bool {
        self.allow_no_producers
            || self.object.allow_no_producers()
            || signal.descriptor.allow_no_producers == Some(true)
    }
}

/// State name to thread name to the functions it runs, in order.
pub type StateTable = IndexMap<String, IndexMap<String, Vec<FunctionId>>>;

#[derive(Debug, Default)]
pub struct Database {
    pub functions: Vec<FunctionRecord>,
    pub data_sources: IndexMap<String, DataSourceRecord>,
    pub states: StateTable,
}

impl Database {
    pub fn function(&self, id: FunctionId) -> &FunctionRecord {
        &self.functions[id.as_usize()]
    }

    pub fn function_by_name(&self, name: &str) -> Option<&FunctionRecord> {
        self.functions.iter().find(|f| f.qualified_name == name)
    }

    pub fn timing_data_source(&self) -> Option<&str> {
        self.data_sources
            .values()
            .find(|d| d.is_timing())
            .map(|d| d.qualified_name.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn usage(function: u32, samples: u32) -> Usage {
        Usage {
            function: FunctionId::from_index(function),
            function_name: format!("GAM{function}"),
            signal: "S".into(),
            ranges: None,
            samples,
        }
    }

    #[test]
    fn distinct_producers_dedup_by_function() {
        let state = StateUsage {
            consumers: vec![],
            producers: vec![usage(1, 1), usage(0, 1), usage(1, 1)],
        };
        let ids = state.distinct_producers();
        assert_eq!(ids, vec![FunctionId::from_index(1), FunctionId::from_index(0)]);
    }
}
