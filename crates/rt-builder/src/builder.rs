//! The configuration builder: fixed sequence of resolver passes.

use std::fmt;

use rt_signals::TypeRegistry;
use rt_tree::{ConfigTree, SharedTree, Value};

use crate::application::RealTimeApplication;
use crate::database::Database;
use crate::datasource::DataSourceCatalog;
use crate::error::{BuildError, BuildResult};
use crate::export::clear_node;
use crate::options::BuilderOptions;
use crate::passes::{DATA, FUNCTIONS, STATES, THREADS};

/// The resolver passes, in the only order they may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Pass {
    InitialiseSignalsDatabase,
    FlattenSignalsDatabases,
    ResolveDataSources,
    VerifyDataSourcesSignals,
    ResolveFunctionSignals,
    VerifyFunctionSignals,
    ResolveStates,
    ResolveConsumersAndProducers,
    VerifyConsumersAndProducers,
    ResolveFunctionSignalsMemorySize,
    ResolveFunctionsMemory,
    CalculateFunctionsMemory,
    AssignFunctionsMemoryToDataSource,
    AssignBrokersToFunctions,
}

impl Pass {
    pub const ALL: [Pass; 14] = [
        Pass::InitialiseSignalsDatabase,
        Pass::FlattenSignalsDatabases,
        Pass::ResolveDataSources,
        Pass::VerifyDataSourcesSignals,
        Pass::ResolveFunctionSignals,
        Pass::VerifyFunctionSignals,
        Pass::ResolveStates,
        Pass::ResolveConsumersAndProducers,
        Pass::VerifyConsumersAndProducers,
        Pass::ResolveFunctionSignalsMemorySize,
        Pass::ResolveFunctionsMemory,
        Pass::CalculateFunctionsMemory,
        Pass::AssignFunctionsMemoryToDataSource,
        Pass::AssignBrokersToFunctions,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Pass::InitialiseSignalsDatabase => "InitialiseSignalsDatabase",
            Pass::FlattenSignalsDatabases => "FlattenSignalsDatabases",
            Pass::ResolveDataSources => "ResolveDataSources",
            Pass::VerifyDataSourcesSignals => "VerifyDataSourcesSignals",
            Pass::ResolveFunctionSignals => "ResolveFunctionSignals",
            Pass::VerifyFunctionSignals => "VerifyFunctionSignals",
            Pass::ResolveStates => "ResolveStates",
            Pass::ResolveConsumersAndProducers => "ResolveConsumersAndProducers",
            Pass::VerifyConsumersAndProducers => "VerifyConsumersAndProducers",
            Pass::ResolveFunctionSignalsMemorySize => "ResolveFunctionSignalsMemorySize",
            Pass::ResolveFunctionsMemory => "ResolveFunctionsMemory",
            Pass::CalculateFunctionsMemory => "CalculateFunctionsMemory",
            Pass::AssignFunctionsMemoryToDataSource => "AssignFunctionsMemoryToDataSource",
            Pass::AssignBrokersToFunctions => "AssignBrokersToFunctions",
        }
    }

    fn next(self) -> Option<Pass> {
        let index = Self::ALL.iter().position(|p| *p == self)?;
        Self::ALL.get(index + 1).copied()
    }
}

impl fmt::Display for Pass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where the builder is in the pass sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// The given pass runs next.
    Pending(Pass),
    /// Every pass succeeded.
    Complete,
    /// A pass failed; the builder is unusable.
    Failed,
}

/// What InitialiseSignalsDatabase reads from the `Functions` and `Data`
/// subtrees.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Source {
    /// Declarations as written in the application.
    Declarations,
    /// Numbered records exported by [`ConfigurationBuilder::copy`].
    Resolved,
}

/// Multi-pass resolver over an application configuration.
///
/// The tree handed to [`ConfigurationBuilder::new`] is the application
/// node: it holds `Functions`, `Data`, `States` and optionally `Types`.
/// The builder works on its own copy of that node. After every pass the
/// copy's `Functions` and `Data` subtrees are rewritten with the resolved
/// records (`Functions.<i>`, `Data.<i>`, each tagged with `QualifiedName`),
/// which is what [`copy`](Self::copy) exports and [`set`](Self::set)
/// accepts back.
///
/// Each pass method checks that its predecessor completed; the first
/// failure poisons the builder and every later call returns
/// [`BuildError::Aborted`].
pub struct ConfigurationBuilder {
    pub(crate) tree: ConfigTree,
    pub(crate) registry: TypeRegistry,
    pub(crate) catalog: DataSourceCatalog,
    pub(crate) options: BuilderOptions,
    pub(crate) db: Database,
    pub(crate) source: Source,
    stage: Stage,
}

impl fmt::Debug for ConfigurationBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConfigurationBuilder")
            .field("stage", &self.stage)
            .field("options", &self.options)
            .field("functions", &self.db.functions.len())
            .field("data_sources", &self.db.data_sources.len())
            .finish()
    }
}

impl ConfigurationBuilder {
    /// Builder over the node under the cursor of `tree`. Options are read
    /// from it and the installed type registry is the starting catalog.
    pub fn new(tree: &ConfigTree) -> BuildResult<Self> {
        let mut app = ConfigTree::new();
        tree.copy(&mut app)?;
        let options = BuilderOptions::from_tree(&app)?;
        Ok(Self {
            tree: app,
            registry: (*rt_signals::registry::global()).clone(),
            catalog: DataSourceCatalog::default(),
            options,
            db: Database::default(),
            source: Source::Declarations,
            stage: Stage::Pending(Pass::InitialiseSignalsDatabase),
        })
    }

    /// Builder over a database exported by [`copy`](Self::copy) and
    /// [`copy_states`](Self::copy_states). Running it again reproduces the
    /// exported layout.
    pub fn from_resolved(functions: &ConfigTree, data: &ConfigTree, states: &ConfigTree) -> BuildResult<Self> {
        let mut app = ConfigTree::new();
        app.create_absolute(STATES)?;
        let mut table = states.clone();
        for state in states.child_nodes() {
            table.move_relative(&state)?;
            app.create_relative(&format!("{state}.{THREADS}"))?;
            for (thread, functions) in table.children() {
                if let rt_tree::ChildRef::Leaf(list) = functions {
                    app.create_relative(thread)?;
                    app.write(FUNCTIONS, as_vector(list))?;
                    app.move_to_ancestor(1)?;
                }
            }
            app.move_to_ancestor(2)?;
            table.move_to_ancestor(1)?;
        }
        app.move_to_root();

        let mut builder = Self::new(&app)?;
        builder.set(functions, data)?;
        Ok(builder)
    }
    pub fn with_options(mut self, options: BuilderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_registry(mut self, registry: TypeRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_catalog(mut self, catalog: DataSourceCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn options(&self) -> &BuilderOptions {
        &self.options
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// The working application node, with the resolved `Functions` and
    /// `Data` records of the last completed pass.
    pub fn tree(&self) -> &ConfigTree {
        &self.tree
    }

    fn order_error(&self, operation: &'static str) -> BuildError {
        match self.stage {
            Stage::Failed => BuildError::Aborted,
            Stage::Complete => BuildError::PassOutOfOrder {
                pass: operation,
                expected: "none (build complete)",
            },
            Stage::Pending(next) => BuildError::PassOutOfOrder {
                pass: operation,
                expected: next.name(),
            },
        }
    }

    /// Replace the `Functions` and `Data` subtrees with the records under
    /// the cursors of `functions` and `data`, as written by
    /// [`copy`](Self::copy). InitialiseSignalsDatabase then reads those
    /// records instead of declarations. Only valid before the first pass.
    pub fn set(&mut self, functions: &ConfigTree, data: &ConfigTree) -> BuildResult<()> {
        if self.stage != Stage::Pending(Pass::InitialiseSignalsDatabase) {
            return Err(self.order_error("set"));
        }
        for (name, records) in [(FUNCTIONS, functions), (DATA, data)] {
            clear_node(&mut self.tree, name)?;
            records.copy(&mut self.tree)?;
        }
        self.tree.move_to_root();
        self.source = Source::Resolved;
        tracing::debug!("resolved database set");
        Ok(())
    }

    /// Run `body` as `pass`, enforcing order and recording failure.
    pub(crate) fn step<F>(&mut self, pass: Pass, body: F) -> BuildResult<()>
    where
        F: FnOnce(&mut Self) -> BuildResult<()>,
    {
        if self.stage != Stage::Pending(pass) {
            return Err(self.order_error(pass.name()));
        }

        tracing::info!(pass = pass.name(), "running pass");
        let result = body(self).and_then(|()| self.materialise()).and_then(|()| {
            match pass.next() {
                Some(_) => Ok(()),
                None => self.post_configure_data_sources(),
            }
        });
        match result {
            Ok(()) => {
                self.stage = pass.next().map_or(Stage::Complete, Stage::Pending);
                Ok(())
            }
            Err(err) => {
                tracing::error!(pass = pass.name(), kind = ?err.kind(), error = %err, "pass failed");
                self.stage = Stage::Failed;
                Err(err)
            }
        }
    }

    /// Run every remaining pass in order, stopping at the first failure.
    pub fn run_all(&mut self) -> BuildResult<()> {
        self.run_until(Pass::AssignBrokersToFunctions)
    }

    /// Run the pending passes up to and including `last`.
    pub fn run_until(&mut self, last: Pass) -> BuildResult<()> {
        loop {
            match self.stage {
                Stage::Pending(pass) if pass <= last => self.run(pass)?,
                Stage::Pending(_) | Stage::Complete => return Ok(()),
                Stage::Failed => return Err(BuildError::Aborted),
            }
        }
    }

    /// Resolve and verify the signal, state and producer databases without
    /// laying out memory: every pass up to VerifyConsumersAndProducers.
    pub fn configure(&mut self) -> BuildResult<()> {
        self.run_until(Pass::VerifyConsumersAndProducers)?;
        tracing::info!(
            functions = self.db.functions.len(),
            data_sources = self.db.data_sources.len(),
            states = self.db.states.len(),
            "application configured"
        );
        Ok(())
    }

    /// Hand every data source its resolved `Data.<i>` record.
    fn post_configure_data_sources(&mut self) -> BuildResult<()> {
        self.tree.move_absolute(DATA)?;
        for (i, ds) in self.db.data_sources.values_mut().enumerate() {
            self.tree.move_to_child(i)?;
            ds.object
                .post_configure(&self.tree)
                .map_err(|e| BuildError::InvalidDataSource {
                    data_source: ds.qualified_name.clone(),
                    reason: e.to_string(),
                })?;
            self.tree.move_to_ancestor(1)?;
        }
        self.tree.move_to_root();
        Ok(())
    }

    /// Run one pass by name.
    pub fn run(&mut self, pass: Pass) -> BuildResult<()> {
        match pass {
            Pass::InitialiseSignalsDatabase => self.initialise_signals_database(),
            Pass::FlattenSignalsDatabases => self.flatten_signals_databases(),
            Pass::ResolveDataSources => self.resolve_data_sources(),
            Pass::VerifyDataSourcesSignals => self.verify_data_sources_signals(),
            Pass::ResolveFunctionSignals => self.resolve_function_signals(),
            Pass::VerifyFunctionSignals => self.verify_function_signals(),
            Pass::ResolveStates => self.resolve_states(),
            Pass::ResolveConsumersAndProducers => self.resolve_consumers_and_producers(),
            Pass::VerifyConsumersAndProducers => self.verify_consumers_and_producers(),
            Pass::ResolveFunctionSignalsMemorySize => self.resolve_function_signals_memory_size(),
            Pass::ResolveFunctionsMemory => self.resolve_functions_memory(),
            Pass::CalculateFunctionsMemory => self.calculate_functions_memory(),
            Pass::AssignFunctionsMemoryToDataSource => self.assign_functions_memory_to_data_source(),
            Pass::AssignBrokersToFunctions => self.assign_brokers_to_functions(),
        }
    }

    /// Run every pass and hand the wired application over.
    pub fn build(mut self) -> BuildResult<RealTimeApplication> {
        self.run_all()?;
        self.into_application()
    }

    /// Build from a shared tree, holding its lock for the whole build.
    pub fn build_shared(shared: &SharedTree, options: Option<BuilderOptions>) -> BuildResult<RealTimeApplication> {
        let timeout = options
            .as_ref()
            .map_or(BuilderOptions::default().lock_timeout, |o| o.lock_timeout);
        let guard = shared.lock(timeout)?;
        let mut builder = Self::new(&guard)?;
        if let Some(options) = options {
            builder = builder.with_options(options);
        }
        let app = builder.build();
        drop(guard);
        app
    }

    /// Consume a completed builder into the runtime application.
    pub fn into_application(self) -> BuildResult<RealTimeApplication> {
        match self.stage {
            Stage::Complete => Ok(RealTimeApplication::from_database(self.db)),
            _ => Err(self.order_error("into_application")),
        }
    }
}

/// A thread's function list, which a single name may have collapsed to a
/// scalar.
fn as_vector(list: &Value) -> Value {
    match list {
        Value::Vector(_) => list.clone(),
        other => Value::Vector(vec![other.clone()]),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_sequence() {
        assert_eq!(Pass::ALL.len(), 14);
        assert_eq!(Pass::InitialiseSignalsDatabase.next(), Some(Pass::FlattenSignalsDatabases));
        assert_eq!(Pass::AssignBrokersToFunctions.next(), None);
        for pair in Pass::ALL.windows(2) {
            assert!(pair[0] < pair[1]);
        }
    }

    #[test]
    fn out_of_order_pass_is_rejected_without_poisoning() {
        let mut builder = ConfigurationBuilder::new(&ConfigTree::new()).unwrap();
        let err = builder.resolve_states().unwrap_err();
        assert_eq!(
            err,
            BuildError::PassOutOfOrder {
                pass: "ResolveStates",
                expected: "InitialiseSignalsDatabase",
            }
        );
        assert_eq!(builder.stage(), Stage::Pending(Pass::InitialiseSignalsDatabase));
    }

    #[test]
    fn failure_poisons_builder() {
        // no Functions node
        let mut builder = ConfigurationBuilder::new(&ConfigTree::new()).unwrap();
        assert!(builder.initialise_signals_database().is_err());
        assert_eq!(builder.stage(), Stage::Failed);
        assert_eq!(builder.flatten_signals_databases(), Err(BuildError::Aborted));
        assert_eq!(builder.run_all(), Err(BuildError::Aborted));
    }
}
