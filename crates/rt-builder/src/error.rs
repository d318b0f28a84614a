//! Build errors.
//!
//! Every variant belongs to one `ErrorKind` and names the offending
//! signal, function, data source or state.

use rt_core::RtError;
use rt_signals::SignalError;
use rt_tree::TreeError;

pub type BuildResult<T> = Result<T, BuildError>;

/// Coarse classification of build failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    ConfigurationSyntax,
    TypeResolution,
    Cardinality,
    Range,
    MemorySize,
    DataSourceBinding,
    Internal,
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum BuildError {
    // Configuration syntax
    #[error("'{at}': missing {attribute}")]
    MissingAttribute { at: String, attribute: String },

    #[error("'{at}': {reason}")]
    WrongContainer { at: String, reason: String },

    #[error("Signal '{signal}': {reason}")]
    MalformedAttribute { signal: String, reason: String },

    #[error("'{owner}' declares signal '{signal}' more than once")]
    DuplicateSignal { owner: String, signal: String },

    #[error("Thread '{state}.{thread}' references unknown function '{reference}'")]
    UnknownFunction {
        state: String,
        thread: String,
        reference: String,
    },

    #[error("Pass {pass} called out of order (expected {expected})")]
    PassOutOfOrder {
        pass: &'static str,
        expected: &'static str,
    },

    #[error("Build already failed; restart from an unmodified configuration")]
    Aborted,

    // Type resolution
    #[error("Signal '{signal}': type '{type_name}' could not be resolved")]
    UnresolvedType { signal: String, type_name: String },

    #[error("Signal '{signal}': conflicting {attribute} ({existing} vs {incoming})")]
    SignalConflict {
        signal: String,
        attribute: String,
        existing: String,
        incoming: String,
    },

    // Cardinality
    #[error("Function '{function}' is executed by more than one thread in state '{state}' ({threads})")]
    SameFunctionTwiceInState {
        function: String,
        state: String,
        threads: String,
    },

    #[error("Thread '{state}.{thread}': {detail}")]
    MultipleSynchronisedFunctions {
        state: String,
        thread: String,
        detail: String,
    },

    #[error("Signal '{data_source}.{signal}' has {producers} producer(s) in state '{state}'")]
    ZeroOrMultipleProducers {
        signal: String,
        data_source: String,
        state: String,
        producers: usize,
    },

    #[error("Timing signal '{signal}' cannot be produced (by '{function}')")]
    TimingSignalProduced { signal: String, function: String },

    // Ranges
    #[error("Signal '{data_source}.{signal}': producer ranges overlap in state '{state}'")]
    RangeOverlap {
        signal: String,
        data_source: String,
        state: String,
    },

    #[error("Signal '{function}.{signal}': range [{min}, {max}] is not ordered")]
    RangeOrder {
        signal: String,
        function: String,
        min: u32,
        max: u32,
    },

    #[error("Signal '{signal}': index {index} does not fit {elements} element(s)")]
    DimensionMismatch {
        signal: String,
        index: u32,
        elements: u32,
    },

    // Memory
    #[error("Signal '{signal}': {reason}")]
    FatalSize { signal: String, reason: String },

    #[error("Internal consistency error: {what}")]
    InternalConsistency { what: String },

    // Data-source binding
    #[error("Signal '{function}.{signal}' has no DataSource and no DefaultDataSource is set")]
    MissingDataSource { function: String, signal: String },

    #[error("Signal '{function}.{signal}' is bound to unknown data source '{data_source}'")]
    UnknownDataSource {
        function: String,
        signal: String,
        data_source: String,
    },

    #[error("Data source '{data_source}' has unknown class '{class}'")]
    UnknownDataSourceClass { data_source: String, class: String },

    #[error("Data source '{data_source}' is locked and does not declare '{signal}'")]
    LockedDataSource { data_source: String, signal: String },

    #[error("Data source '{data_source}' offers no broker for '{function}.{signal}'")]
    UnsupportedBroker {
        function: String,
        signal: String,
        data_source: String,
    },

    #[error("Signal '{signal}': invalid Default ({reason})")]
    DefaultMismatch { signal: String, reason: String },

    #[error("Data source '{data_source}': {reason}")]
    InvalidDataSource { data_source: String, reason: String },

    // Plumbing
    #[error(transparent)]
    Tree(#[from] TreeError),

    #[error(transparent)]
    Core(#[from] RtError),
}

impl BuildError {
    pub fn kind(&self) -> ErrorKind {
        use BuildError::*;
        match self {
            MissingAttribute { .. }
            | WrongContainer { .. }
            | MalformedAttribute { .. }
            | DuplicateSignal { .. }
            | UnknownFunction { .. }
            | PassOutOfOrder { .. }
            | Aborted
            | Tree(_) => ErrorKind::ConfigurationSyntax,
            UnresolvedType { .. } | SignalConflict { .. } => ErrorKind::TypeResolution,
            SameFunctionTwiceInState { .. }
            | MultipleSynchronisedFunctions { .. }
            | ZeroOrMultipleProducers { .. }
            | TimingSignalProduced { .. } => ErrorKind::Cardinality,
            RangeOverlap { .. } | RangeOrder { .. } | DimensionMismatch { .. } => ErrorKind::Range,
            FatalSize { .. } => ErrorKind::MemorySize,
            MissingDataSource { .. }
            | UnknownDataSource { .. }
            | UnknownDataSourceClass { .. }
            | LockedDataSource { .. }
            | UnsupportedBroker { .. }
            | DefaultMismatch { .. }
            | InvalidDataSource { .. } => ErrorKind::DataSourceBinding,
            InternalConsistency { .. } | Core(_) => ErrorKind::Internal,
        }
    }
}

impl From<SignalError> for BuildError {
    fn from(err: SignalError) -> Self {
        match err {
            SignalError::UnresolvedType { signal, type_name } => {
                BuildError::UnresolvedType { signal, type_name }
            }
            SignalError::SignalConflict {
                signal,
                attribute,
                existing,
                incoming,
            } => BuildError::SignalConflict {
                signal,
                attribute: attribute.to_string(),
                existing,
                incoming,
            },
            SignalError::MissingAttribute { signal, reason } => {
                BuildError::MalformedAttribute { signal, reason }
            }
            SignalError::MalformedAttribute {
                signal,
                attribute,
                reason,
            } => BuildError::MalformedAttribute {
                signal,
                reason: format!("{attribute}: {reason}"),
            },
            SignalError::DimensionMismatch {
                signal,
                index,
                elements,
            } => BuildError::DimensionMismatch {
                signal,
                index,
                elements,
            },
            SignalError::DuplicateSignal { signal } => BuildError::DuplicateSignal {
                owner: String::new(),
                signal,
            },
            SignalError::InvalidStructure { type_name, reason } => BuildError::WrongContainer {
                at: type_name,
                reason,
            },
            SignalError::Tree(err) => BuildError::Tree(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds() {
        let err = BuildError::ZeroOrMultipleProducers {
            signal: "Signal0".into(),
            data_source: "DDB1".into(),
            state: "State1".into(),
            producers: 2,
        };
        assert_eq!(err.kind(), ErrorKind::Cardinality);
        assert!(err.to_string().contains("DDB1.Signal0"));

        let err: BuildError = SignalError::SignalConflict {
            signal: "S".into(),
            attribute: "Type",
            existing: "int32".into(),
            incoming: "float32".into(),
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::TypeResolution);
    }
}
