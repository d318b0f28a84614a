//! ResolveStates: scheduling of functions into state threads.

use indexmap::IndexMap;
use rt_core::{BasicType, FunctionId};
use rt_signals::{SignalDescriptor, attr};

use super::{APPLICATION, FUNCTIONS, STATES, THREADS, object_name};
use crate::builder::{ConfigurationBuilder, Pass};
use crate::database::{DataSourceSignal, FunctionRecord, StateTable};
use crate::error::{BuildError, BuildResult};

const THREAD_FUNCTIONS: &str = "Functions";
pub(crate) const TIMING_TYPE: BasicType = BasicType::UInt32;

/// Resolve a thread's function reference: an exact function name or a
/// group prefix covering several functions.
fn resolve_reference(functions: &[FunctionRecord], reference: &str) -> Vec<FunctionId> {
    let name = reference.trim_start_matches(':');
    let name = name
        .strip_prefix(FUNCTIONS)
        .and_then(|rest| rest.strip_prefix('.'))
        .unwrap_or(name);
    if let Some(f) = functions.iter().find(|f| f.qualified_name == name) {
        return vec![f.id];
    }
    let prefix = format!("{name}.");
    functions
        .iter()
        .filter(|f| f.qualified_name.starts_with(&prefix))
        .map(|f| f.id)
        .collect()
}

impl ConfigurationBuilder {
    /// Read every state and thread, schedule functions and check the
    /// per-thread synchronisation rules.
    pub fn resolve_states(&mut self) -> BuildResult<()> {
        self.step(Pass::ResolveStates, |b| {
            let table = b.read_states()?;
            for (state, threads) in &table {
                for (thread, functions) in threads {
                    for id in functions {
                        b.schedule(state, thread, *id)?;
                    }
                    b.check_synchronisation(state, thread, functions)?;
                }
            }

            if let Some(timing) = b.db.timing_data_source().map(str::to_string) {
                for (state, threads) in &table {
                    for thread in threads.keys() {
                        b.ensure_timing_signal(&timing, &format!("{state}.{thread}_CycleTime"))?;
                    }
                }
            }
            tracing::info!(states = table.len(), "states resolved");
            b.db.states = table;
            Ok(())
        })
    }

    fn read_states(&mut self) -> BuildResult<StateTable> {
        let tree = &mut self.tree;
        tree.move_to_root();
        if !tree.is_node(STATES) {
            return Err(BuildError::MissingAttribute {
                at: APPLICATION.into(),
                attribute: STATES.into(),
            });
        }
        tree.move_relative(STATES)?;
        let mut table = StateTable::new();
        for state_node in tree.child_nodes() {
            let state = object_name(&state_node).to_string();
            tree.move_relative(&state_node)?;
            if !tree.is_node(THREADS) {
                return Err(BuildError::MissingAttribute {
                    at: format!("{STATES}.{state}"),
                    attribute: THREADS.into(),
                });
            }
            tree.move_relative(THREADS)?;
            let mut threads = IndexMap::new();
            for thread_node in tree.child_nodes() {
                let thread = object_name(&thread_node).to_string();
                tree.move_relative(&thread_node)?;
                let references: Vec<String> =
                    tree.read_opt(THREAD_FUNCTIONS)?
                        .ok_or_else(|| BuildError::MissingAttribute {
                            at: format!("{STATES}.{state}.{THREADS}.{thread}"),
                            attribute: THREAD_FUNCTIONS.into(),
                        })?;
                let mut ids = Vec::new();
                for reference in &references {
                    let resolved = resolve_reference(&self.db.functions, reference);
                    if resolved.is_empty() {
                        return Err(BuildError::UnknownFunction {
                            state,
                            thread,
                            reference: reference.clone(),
                        });
                    }
                    ids.extend(resolved);
                }
                tracing::debug!(%state, %thread, functions = ids.len(), "read thread");
                threads.insert(thread, ids);
                tree.move_to_ancestor(1)?;
            }
            table.insert(state, threads);
            tree.move_to_ancestor(2)?;
        }
        tree.move_to_root();
        Ok(table)
    }

    fn schedule(&mut self, state: &str, thread: &str, id: FunctionId) -> BuildResult<()> {
        let check = self.options.check_same_gam_in_more_threads;
        let record = &mut self.db.functions[id.as_usize()];
        match record.states.get_mut(state) {
            Some(threads) if check => {
                let mut all = threads.clone();
                all.push(thread.to_string());
                Err(BuildError::SameFunctionTwiceInState {
                    function: record.qualified_name.clone(),
                    state: state.to_string(),
                    threads: all.join(", "),
                })
            }
            Some(threads) => {
                if !threads.iter().any(|t| t == thread) {
                    threads.push(thread.to_string());
                }
                Ok(())
            }
            None => {
                record.states.insert(state.to_string(), vec![thread.to_string()]);
                Ok(())
            }
        }
    }

    /// A thread blocks on at most one synchronising signal, and at most one
    /// of its functions synchronises on any given data source.
    fn check_synchronisation(&self, state: &str, thread: &str, functions: &[FunctionId]) -> BuildResult<()> {
        let mut distinct: Vec<FunctionId> = Vec::new();
        for id in functions {
            if !distinct.contains(id) {
                distinct.push(*id);
            }
        }

        let mut synchronising = Vec::new();
        let mut per_source: IndexMap<&str, Vec<&str>> = IndexMap::new();
        for id in &distinct {
            let record = self.db.function(*id);
            let inputs = record.inputs.signals.iter().filter(|s| s.is_synchronising());
            let outputs = record.outputs.signals.iter().filter(|s| s.is_triggering());
            for signal in inputs.clone() {
                synchronising.push(format!("{}.{}", record.qualified_name, signal.qualified_name));
            }
            for signal in inputs.chain(outputs) {
                let ds = signal.data_source.as_deref().unwrap_or_default();
                let users = per_source.entry(ds).or_default();
                if !users.contains(&record.qualified_name.as_str()) {
                    users.push(&record.qualified_name);
                }
            }
        }

        if synchronising.len() > 1 {
            return Err(BuildError::MultipleSynchronisedFunctions {
                state: state.to_string(),
                thread: thread.to_string(),
                detail: format!("more than one synchronising signal ({})", synchronising.join(", ")),
            });
        }
        if let Some((ds, users)) = per_source.iter().find(|(_, users)| users.len() > 1) {
            return Err(BuildError::MultipleSynchronisedFunctions {
                state: state.to_string(),
                thread: thread.to_string(),
                detail: format!("functions {} all synchronise on '{ds}'", users.join(", ")),
            });
        }
        Ok(())
    }

    /// Add a generated uint32 timing signal, or check an existing one.
    pub(crate) fn ensure_timing_signal(&mut self, data_source: &str, name: &str) -> BuildResult<()> {
        let ds = self
            .db
            .data_sources
            .get_mut(data_source)
            .ok_or_else(|| BuildError::InternalConsistency {
                what: format!("timing data source '{data_source}' vanished"),
            })?;
        if let Some(existing) = ds.signals.get(name) {
            let d = &existing.descriptor;
            if d.basic_type() != Some(TIMING_TYPE) || d.element_count() != 1 {
                return Err(BuildError::SignalConflict {
                    signal: format!("{data_source}.{name}"),
                    attribute: attr::TYPE.into(),
                    existing: format!("{}[{}]", d.type_name.as_deref().unwrap_or_default(), d.element_count()),
                    incoming: format!("{}[1]", TIMING_TYPE),
                });
            }
            return Ok(());
        }
        let mut d = SignalDescriptor::new(name)
            .with_type(TIMING_TYPE.name())
            .with_data_source(data_source)
            .with_elements(1);
        d.full_type = Some(TIMING_TYPE.name().to_string());
        d.number_of_dimensions = Some(0);
        d.byte_size = Some(TIMING_TYPE.byte_size());
        d.alignment = Some(TIMING_TYPE.alignment());
        tracing::debug!(data_source, signal = name, "added timing signal");
        ds.signals.insert(name.to_string(), DataSourceSignal::new(d));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn functions() -> Vec<FunctionRecord> {
        ["GAMA", "Group.GAMB", "Group.GAMC", "GroupX"]
            .iter()
            .enumerate()
            .map(|(i, n)| FunctionRecord::new(FunctionId::from_index(i as u32), *n))
            .collect()
    }

    #[test]
    fn references() {
        let fns = functions();
        let id = |i: u32| FunctionId::from_index(i);
        assert_eq!(resolve_reference(&fns, "GAMA"), vec![id(0)]);
        assert_eq!(resolve_reference(&fns, ":Functions.GAMA"), vec![id(0)]);
        assert_eq!(resolve_reference(&fns, "Group"), vec![id(1), id(2)]);
        assert_eq!(resolve_reference(&fns, "Group.GAMC"), vec![id(2)]);
        assert!(resolve_reference(&fns, "Nope").is_empty());
    }
}
