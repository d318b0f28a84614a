//! The wired runtime application produced by a successful build.

use std::fmt;
use std::ops::Range;

use indexmap::IndexMap;
use rt_core::{RtError, RtResult};
use rt_signals::Direction;

use crate::broker::Broker;
use crate::database::{Database, FunctionSignals};
use crate::datasource::{DataSource, DataSourceLayout};

/// Runtime view of one function: its private memory and its brokers.
#[derive(Debug, Clone)]
pub struct FunctionRuntime {
    pub name: String,
    pub memory: Vec<u8>,
    pub input_brokers: Vec<Broker>,
    pub output_brokers: Vec<Broker>,
    /// State name to the threads running the function.
    pub states: IndexMap<String, Vec<String>>,
    inputs: IndexMap<String, Range<usize>>,
    outputs: IndexMap<String, Range<usize>>,
}

fn slot_ranges(side: &FunctionSignals) -> IndexMap<String, Range<usize>> {
    side.blocks
        .iter()
        .flat_map(|b| &b.signals)
        .map(|s| {
            let start = s.gam_memory_offset as usize;
            (s.qualified_name.clone(), start..start + s.byte_size as usize)
        })
        .collect()
}

impl FunctionRuntime {
    fn slots(&self, direction: Direction) -> &IndexMap<String, Range<usize>> {
        match direction {
            Direction::Input => &self.inputs,
            Direction::Output => &self.outputs,
        }
    }

    pub fn signal(&self, direction: Direction, name: &str) -> RtResult<&[u8]> {
        let range = self.slots(direction).get(name).ok_or(RtError::InvalidArg {
            what: "unknown function signal",
        })?;
        Ok(&self.memory[range.clone()])
    }

    pub fn signal_mut(&mut self, direction: Direction, name: &str) -> RtResult<&mut [u8]> {
        let range = self
            .slots(direction)
            .get(name)
            .cloned()
            .ok_or(RtError::InvalidArg {
                what: "unknown function signal",
            })?;
        Ok(&mut self.memory[range])
    }
}

/// Built application: function buffers, data sources and brokers.
pub struct RealTimeApplication {
    functions: IndexMap<String, FunctionRuntime>,
    data_sources: IndexMap<String, Box<dyn DataSource>>,
    layouts: IndexMap<String, DataSourceLayout>,
    states: IndexMap<String, IndexMap<String, Vec<String>>>,
}

impl fmt::Debug for RealTimeApplication {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealTimeApplication")
            .field("functions", &self.functions.keys().collect::<Vec<_>>())
            .field("data_sources", &self.data_sources.keys().collect::<Vec<_>>())
            .field("states", &self.states.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl RealTimeApplication {
    pub(crate) fn from_database(db: Database) -> Self {
        let names: Vec<String> = db.functions.iter().map(|f| f.qualified_name.clone()).collect();
        let states = db
            .states
            .iter()
            .map(|(state, threads)| {
                let threads = threads
                    .iter()
                    .map(|(thread, ids)| {
                        let fns = ids.iter().map(|id| names[id.as_usize()].clone()).collect();
                        (thread.clone(), fns)
                    })
                    .collect();
                (state.clone(), threads)
            })
            .collect();

        let functions = db
            .functions
            .into_iter()
            .map(|f| {
                let runtime = FunctionRuntime {
                    name: f.qualified_name.clone(),
                    memory: vec![0; f.byte_size as usize],
                    inputs: slot_ranges(&f.inputs),
                    outputs: slot_ranges(&f.outputs),
                    input_brokers: f.inputs.brokers,
                    output_brokers: f.outputs.brokers,
                    states: f.states,
                };
                (f.qualified_name, runtime)
            })
            .collect();

        let mut data_sources = IndexMap::new();
        let mut layouts = IndexMap::new();
        for (name, record) in db.data_sources {
            if let Some(layout) = record.layout {
                layouts.insert(name.clone(), layout);
            }
            data_sources.insert(name, record.object);
        }
        Self {
            functions,
            data_sources,
            layouts,
            states,
        }
    }

    pub fn function(&self, name: &str) -> Option<&FunctionRuntime> {
        self.functions.get(name)
    }

    pub fn function_mut(&mut self, name: &str) -> Option<&mut FunctionRuntime> {
        self.functions.get_mut(name)
    }

    pub fn functions(&self) -> impl Iterator<Item = &FunctionRuntime> {
        self.functions.values()
    }

    pub fn data_source(&self, name: &str) -> Option<&dyn DataSource> {
        self.data_sources.get(name).map(|d| &**d)
    }

    pub fn layout(&self, name: &str) -> Option<&DataSourceLayout> {
        self.layouts.get(name)
    }

    /// State name to thread name to function names.
    pub fn states(&self) -> &IndexMap<String, IndexMap<String, Vec<String>>> {
        &self.states
    }

    fn execute(&mut self, function: &str, direction: Direction) -> RtResult<()> {
        let runtime = self.functions.get_mut(function).ok_or(RtError::InvalidArg {
            what: "unknown function",
        })?;
        let brokers = match direction {
            Direction::Input => &runtime.input_brokers,
            Direction::Output => &runtime.output_brokers,
        };
        for broker in brokers {
            let ds = self
                .data_sources
                .get_mut(&broker.data_source)
                .ok_or(RtError::InvalidArg {
                    what: "broker bound to unknown data source",
                })?;
            broker.execute(&mut runtime.memory, &mut **ds)?;
        }
        Ok(())
    }

    /// Copy every input of `function` from its data sources.
    pub fn execute_inputs(&mut self, function: &str) -> RtResult<()> {
        self.execute(function, Direction::Input)
    }

    /// Copy every output of `function` into its data sources.
    pub fn execute_outputs(&mut self, function: &str) -> RtResult<()> {
        self.execute(function, Direction::Output)
    }

    /// Let every data source prepare for a state change.
    pub fn prepare_next_state(&mut self, current: &str, next: &str) -> RtResult<()> {
        if !self.states.contains_key(next) {
            return Err(RtError::InvalidArg {
                what: "unknown next state",
            });
        }
        for ds in self.data_sources.values_mut() {
            ds.prepare_next_state(current, next)?;
        }
        tracing::info!(from = current, to = next, "state change prepared");
        Ok(())
    }

    /// Bytes of a data-source signal in its active buffer.
    pub fn data_source_signal(&self, data_source: &str, signal: &str) -> RtResult<&[u8]> {
        let unknown = RtError::InvalidArg {
            what: "unknown data source signal",
        };
        let ds = self.data_sources.get(data_source).ok_or(unknown.clone())?;
        let layout = self.layouts.get(data_source).ok_or(unknown.clone())?;
        let index = layout
            .signals
            .iter()
            .position(|s| s.name == signal)
            .ok_or(unknown)?;
        ds.signal_memory_buffer(index, ds.active_buffer())
    }

    /// Write `bytes` into a function signal slot.
    pub fn write_signal(&mut self, function: &str, direction: Direction, signal: &str, bytes: &[u8]) -> RtResult<()> {
        let runtime = self.functions.get_mut(function).ok_or(RtError::InvalidArg {
            what: "unknown function",
        })?;
        let slot = runtime.signal_mut(direction, signal)?;
        if slot.len() != bytes.len() {
            return Err(RtError::IndexOob {
                what: "signal write length",
                index: bytes.len(),
                len: slot.len(),
            });
        }
        slot.copy_from_slice(bytes);
        Ok(())
    }

    /// Read a function signal slot.
    pub fn read_signal(&self, function: &str, direction: Direction, signal: &str) -> RtResult<&[u8]> {
        self.functions
            .get(function)
            .ok_or(RtError::InvalidArg {
                what: "unknown function",
            })?
            .signal(direction, signal)
    }
}
