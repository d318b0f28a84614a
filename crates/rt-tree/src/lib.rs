//! rt-tree: the ordered configuration tree consumed by the builder.
//!
//! Provides:
//! - `ConfigTree`: arena-backed key/value tree with a navigation cursor
//! - `Value` and `FromValue`: typed scalar/vector/matrix leaves
//! - `SharedTree`: lock-guarded handle with timeout-based exclusion
//!
//! # Example
//!
//! ```
//! use rt_tree::ConfigTree;
//!
//! let mut tree = ConfigTree::new();
//! tree.create_absolute("Functions.GAMA").unwrap();
//! tree.write("Class", "IOGAM").unwrap();
//! tree.move_to_root();
//! tree.move_relative("Functions").unwrap();
//!
//! assert_eq!(tree.number_of_children(), 1);
//! assert_eq!(tree.child_name(0), Some("GAMA"));
//! ```

pub mod error;
pub mod path;
pub mod shared;
pub mod tree;
pub mod value;

pub use error::{TreeError, TreeResult};
pub use shared::SharedTree;
pub use tree::{ChildRef, ConfigTree, NodeId};
pub use value::{FromValue, Value};
