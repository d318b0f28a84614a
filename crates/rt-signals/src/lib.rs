//! rt-signals: signal descriptors and structured-type expansion.
//!
//! Signals are declared by functions and data sources in the configuration
//! tree. A declaration may name a basic type (`uint32`, `float64`, ...) or a
//! registered structure; the expander turns structures into ordered scalar
//! leaves whose names follow the member path (`Signal1.a1.b1`).
//!
//! Provides:
//! - `SignalDescriptor`: one signal occurrence with its optional attributes
//! - `TypeRegistry`: ordered member layout of every registered structure
//! - `expand` / `merge`: flattening and partial-declaration merging

pub mod descriptor;
pub mod error;
pub mod expander;
pub mod registry;

pub use descriptor::{Direction, SignalDescriptor, attr, read_signal_list};
pub use error::{SignalError, SignalResult};
pub use expander::{expand, full_types_compatible, merge};
pub use registry::{
    FieldValue, Member, StructType, StructTypeBuilder, StructValue, TypeRegistry, read_struct,
};
