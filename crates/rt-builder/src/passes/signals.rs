//! InitialiseSignalsDatabase and FlattenSignalsDatabases.

use std::collections::HashSet;

use indexmap::IndexMap;
use rt_core::{DataSourceId, FunctionId};
use rt_signals::{Direction, SignalDescriptor, attr, expand, read_signal_list};
use rt_tree::ConfigTree;

use super::{
    APPLICATION, CLASS, DATA, FUNCTIONS, REFERENCE_CONTAINER, SIGNALS, TYPES, object_name, owned_by,
};
use crate::builder::{ConfigurationBuilder, Pass, Source};
use crate::database::{DataSourceRecord, DataSourceSignal, FunctionRecord};
use crate::error::{BuildError, BuildResult};

impl ConfigurationBuilder {
    /// Read every function, data source and structured type declaration,
    /// or the resolved records handed over by `set`.
    pub fn initialise_signals_database(&mut self) -> BuildResult<()> {
        self.step(Pass::InitialiseSignalsDatabase, |b| {
            b.load_types()?;
            match b.source {
                Source::Declarations => b.read_functions()?,
                Source::Resolved => b.read_resolved_functions()?,
            }
            b.read_data_sources()?;
            tracing::info!(
                functions = b.db.functions.len(),
                data_sources = b.db.data_sources.len(),
                types = b.registry.len(),
                source = ?b.source,
                "signals database initialised"
            );
            Ok(())
        })
    }

    /// Replace structured declarations with their leaves.
    pub fn flatten_signals_databases(&mut self) -> BuildResult<()> {
        self.step(Pass::FlattenSignalsDatabases, |b| {
            let registry = &b.registry;
            for record in &mut b.db.functions {
                let owner = record.qualified_name.clone();
                for direction in Direction::BOTH {
                    let side = record.side_mut(direction);
                    let mut seen = HashSet::new();
                    let mut flat = Vec::with_capacity(side.signals.len());
                    for decl in &side.signals {
                        for leaf in expand(decl, registry)? {
                            if !seen.insert(leaf.qualified_name.clone()) {
                                return Err(BuildError::DuplicateSignal {
                                    owner,
                                    signal: leaf.qualified_name,
                                });
                            }
                            flat.push(leaf);
                        }
                    }
                    side.signals = flat;
                }
            }

            for ds in b.db.data_sources.values_mut() {
                let declared = std::mem::take(&mut ds.signals);
                for (_, signal) in declared {
                    for mut leaf in expand(&signal.descriptor, registry)? {
                        leaf.data_source = Some(ds.qualified_name.clone());
                        if ds.signals.contains_key(&leaf.qualified_name) {
                            return Err(BuildError::DuplicateSignal {
                                owner: ds.qualified_name.clone(),
                                signal: leaf.qualified_name,
                            });
                        }
                        ds.signals
                            .insert(leaf.qualified_name.clone(), DataSourceSignal::new(leaf));
                    }
                }
            }
            Ok(())
        })
    }

    fn load_types(&mut self) -> BuildResult<()> {
        self.tree.move_to_root();
        if self.tree.is_node(TYPES) {
            self.tree.move_relative(TYPES)?;
            let loaded = self.registry.load_from_tree(&mut self.tree)?;
            tracing::debug!(loaded, "registered structured types");
            self.tree.move_to_root();
        }
        Ok(())
    }

    fn read_functions(&mut self) -> BuildResult<()> {
        self.tree.move_to_root();
        if !self.tree.is_node(FUNCTIONS) {
            return Err(BuildError::MissingAttribute {
                at: APPLICATION.into(),
                attribute: FUNCTIONS.into(),
            });
        }
        self.tree.move_relative(FUNCTIONS)?;
        let mut functions = Vec::new();
        collect_functions(&mut self.tree, "", &mut functions)?;
        self.tree.move_to_root();

        for record in &mut functions {
            let owner = record.qualified_name.clone();
            for direction in Direction::BOTH {
                for signal in &mut record.side_mut(direction).signals {
                    if signal.data_source.is_some() {
                        continue;
                    }
                    match &self.options.default_data_source {
                        Some(ds) => signal.data_source = Some(ds.clone()),
                        None => {
                            return Err(BuildError::MissingDataSource {
                                function: owner,
                                signal: signal.qualified_name.clone(),
                            });
                        }
                    }
                }
            }
        }
        self.db.functions = functions;
        Ok(())
    }

    /// Functions exported by `copy`: `Functions.<i>` records with their
    /// signals under `Signals.InputSignals/OutputSignals.<j>`.
    fn read_resolved_functions(&mut self) -> BuildResult<()> {
        self.tree.move_to_root();
        if !self.tree.is_node(FUNCTIONS) {
            return Err(BuildError::MissingAttribute {
                at: APPLICATION.into(),
                attribute: FUNCTIONS.into(),
            });
        }
        self.tree.move_relative(FUNCTIONS)?;
        let tree = &mut self.tree;
        let mut functions = Vec::new();
        for node in tree.child_nodes() {
            tree.move_relative(&node)?;
            let name = record_name(tree, &format!("{FUNCTIONS}.{node}"))?;
            let mut record = FunctionRecord::new(FunctionId::from_index(functions.len() as u32), &name);
            record.class = tree.read_opt(CLASS)?;
            if tree.is_node(SIGNALS) {
                tree.move_relative(SIGNALS)?;
                for direction in Direction::BOTH {
                    if tree.is_node(direction.node_name()) {
                        tree.move_relative(direction.node_name())?;
                        record.side_mut(direction).signals = read_records(tree, &name)?;
                        tree.move_to_ancestor(1)?;
                    }
                }
                tree.move_to_ancestor(1)?;
            }
            tracing::debug!(function = %name, "read resolved function");
            functions.push(record);
            tree.move_to_ancestor(1)?;
        }
        tree.move_to_root();
        self.db.functions = functions;
        Ok(())
    }

    fn read_data_sources(&mut self) -> BuildResult<()> {
        self.tree.move_to_root();
        if !self.tree.is_node(DATA) {
            return Err(BuildError::MissingAttribute {
                at: APPLICATION.into(),
                attribute: DATA.into(),
            });
        }
        self.tree.move_relative(DATA)?;
        for node in self.tree.child_nodes() {
            self.tree.move_relative(&node)?;
            let name = match self.source {
                Source::Declarations => object_name(&node).to_string(),
                Source::Resolved => record_name(&self.tree, &format!("{DATA}.{node}"))?,
            };
            let class: String =
                self.tree
                    .read_opt(CLASS)?
                    .ok_or_else(|| BuildError::MissingAttribute {
                        at: format!("{DATA}.{name}"),
                        attribute: CLASS.into(),
                    })?;
            let object = self.catalog.create(&class, &name, &self.tree)?;
            let locked = self.tree.read_opt::<bool>(attr::LOCKED)?.unwrap_or(false);
            let allow_no_producers = self
                .tree
                .read_opt::<bool>(attr::ALLOW_NO_PRODUCERS)?
                .unwrap_or(false);

            let mut signals = IndexMap::new();
            if self.tree.is_node(SIGNALS) {
                self.tree.move_relative(SIGNALS)?;
                let declared = match self.source {
                    Source::Declarations => read_signal_list(&mut self.tree).map_err(owned_by(&name))?,
                    Source::Resolved => read_records(&mut self.tree, &name)?,
                };
                self.tree.move_to_ancestor(1)?;
                for mut signal in declared {
                    signal.data_source = Some(name.clone());
                    signals.insert(signal.qualified_name.clone(), DataSourceSignal::new(signal));
                }
            }
            self.tree.move_to_ancestor(1)?;

            if self.db.data_sources.contains_key(&name) {
                return Err(BuildError::WrongContainer {
                    at: format!("{DATA}.{name}"),
                    reason: "data source declared twice".into(),
                });
            }
            tracing::debug!(data_source = %name, %class, signals = signals.len(), locked, "read data source");
            let record = DataSourceRecord {
                id: DataSourceId::from_index(self.db.data_sources.len() as u32),
                qualified_name: name.clone(),
                class,
                locked,
                allow_no_producers,
                signals,
                functions: Vec::new(),
                layout: None,
                object,
            };
            self.db.data_sources.insert(name, record);
        }
        self.tree.move_to_root();
        Ok(())
    }
}

/// `QualifiedName` of the record under the cursor.
fn record_name(tree: &ConfigTree, at: &str) -> BuildResult<String> {
    tree.read_opt(attr::QUALIFIED_NAME)?
        .ok_or_else(|| BuildError::MissingAttribute {
            at: at.to_string(),
            attribute: attr::QUALIFIED_NAME.into(),
        })
}

/// Numbered signal records below the cursor, in index order.
fn read_records(tree: &mut ConfigTree, owner: &str) -> BuildResult<Vec<SignalDescriptor>> {
    let mut out: Vec<SignalDescriptor> = Vec::new();
    for node in tree.child_nodes() {
        tree.move_relative(&node)?;
        let name = record_name(tree, &format!("{owner}.{node}"))?;
        if out.iter().any(|s| s.qualified_name == name) {
            return Err(BuildError::DuplicateSignal {
                owner: owner.to_string(),
                signal: name,
            });
        }
        out.push(SignalDescriptor::from_tree(tree, &name)?);
        tree.move_to_ancestor(1)?;
    }
    Ok(out)
}

/// Walk a `Functions` container. `ReferenceContainer` children are groups
/// whose members are qualified by the group name.
fn collect_functions(tree: &mut ConfigTree, prefix: &str, out: &mut Vec<FunctionRecord>) -> BuildResult<()> {
    for node in tree.child_nodes() {
        tree.move_relative(&node)?;
        let name = rt_tree::path::join(prefix, object_name(&node));
        let class: Option<String> = tree.read_opt(CLASS)?;
        if class.as_deref() == Some(REFERENCE_CONTAINER) {
            collect_functions(tree, &name, out)?;
        } else {
            let mut record = FunctionRecord::new(FunctionId::from_index(out.len() as u32), &name);
            record.class = class;
            for direction in Direction::BOTH {
                if tree.is_node(direction.node_name()) {
                    tree.move_relative(direction.node_name())?;
                    let signals = read_signal_list(tree).map_err(owned_by(&name))?;
                    tree.move_to_ancestor(1)?;
                    record.side_mut(direction).signals = signals;
                }
            }
            tracing::debug!(
                function = %name,
                inputs = record.inputs.signals.len(),
                outputs = record.outputs.signals.len(),
                "read function"
            );
            out.push(record);
        }
        tree.move_to_ancestor(1)?;
    }
    Ok(())
}
