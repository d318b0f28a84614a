//! Signal-level errors.

use rt_tree::TreeError;

pub type SignalResult<T> = Result<T, SignalError>;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SignalError {
    #[error("Type '{type_name}' of signal '{signal}' is not registered")]
    UnresolvedType { signal: String, type_name: String },

    #[error("Signal '{signal}': conflicting {attribute} ({existing} vs {incoming})")]
    SignalConflict {
        signal: String,
        attribute: &'static str,
        existing: String,
        incoming: String,
    },

    #[error("Signal '{signal}': {reason}")]
    MissingAttribute { signal: String, reason: String },

    #[error("Signal '{signal}': malformed {attribute}: {reason}")]
    MalformedAttribute {
        signal: String,
        attribute: &'static str,
        reason: String,
    },

    #[error("Signal '{signal}': range index {index} does not fit {elements} element(s)")]
    DimensionMismatch {
        signal: String,
        index: u32,
        elements: u32,
    },

    #[error("Signal '{signal}' declared twice")]
    DuplicateSignal { signal: String },

    #[error("Structure '{type_name}': {reason}")]
    InvalidStructure { type_name: String, reason: String },

    #[error(transparent)]
    Tree(#[from] TreeError),
}
