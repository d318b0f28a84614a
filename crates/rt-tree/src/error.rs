//! Config tree error types.

use std::time::Duration;

pub type TreeResult<T> = Result<T, TreeError>;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum TreeError {
    #[error("Invalid path '{path}'")]
    InvalidPath { path: String },

    #[error("'{name}' not found under '{at}'")]
    NotFound { name: String, at: String },

    #[error("'{name}' already exists under '{at}'")]
    AlreadyExists { name: String, at: String },

    #[error("'{name}' under '{at}' is a leaf, not a node")]
    NotANode { name: String, at: String },

    #[error("'{name}' under '{at}' is a node, not a value")]
    NotALeaf { name: String, at: String },

    #[error("'{name}' cannot be read as {expected}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
    },

    #[error("Cannot move {levels} level(s) up from '{at}'")]
    NoParent { levels: u32, at: String },

    #[error("Child index {index} out of range ({len} children)")]
    ChildIndex { index: usize, len: usize },

    #[error("Timed out after {timeout:?} waiting for the tree lock")]
    LockTimeout { timeout: Duration },
}
