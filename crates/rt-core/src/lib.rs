//! rt-core: stable foundation for the real-time application builder.
//!
//! Contains:
//! - types (basic scalar type catalog: sizes, alignment, encoding)
//! - ids (compact ids for functions and data sources)
//! - error (shared error types)

pub mod error;
pub mod ids;
pub mod types;

pub use error::{RtError, RtResult};
pub use ids::*;
pub use types::BasicType;
