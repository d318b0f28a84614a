//! rt-builder: the real-time application configuration builder.
//!
//! A multi-pass resolver over a [`ConfigTree`](rt_tree::ConfigTree):
//! - signal database (functions, data sources, structured type expansion)
//! - data-source binding and attribute back-fill
//! - state scheduling and producer/consumer verification
//! - function and data-source memory layout
//! - broker assignment and the wired [`RealTimeApplication`]

pub mod application;
pub mod broker;
pub mod builder;
pub mod database;
pub mod datasource;
pub mod error;
mod export;
pub mod gam_data_source;
pub mod memory_data_source;
pub mod options;
mod passes;
pub mod timing_data_source;

pub use application::{FunctionRuntime, RealTimeApplication};
pub use broker::{Broker, BrokerKind, CopyDescriptor};
pub use builder::{ConfigurationBuilder, Pass, Stage};
pub use database::Database;
pub use datasource::{
    BrokerQuery, DataSource, DataSourceCatalog, DataSourceLayout, DataSourceMemory, LayoutSignal,
};
pub use error::{BuildError, BuildResult, ErrorKind};
pub use gam_data_source::GamDataSource;
pub use memory_data_source::MemoryDataSource;
pub use options::BuilderOptions;
pub use timing_data_source::TimingDataSource;
