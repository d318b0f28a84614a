use thiserror::Error;

pub type RtResult<T> = Result<T, RtError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RtError {
    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },

    #[error("Index out of bounds: {what} (index={index}, len={len})")]
    IndexOob {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("Value {value} does not fit in {type_name}")]
    OutOfRange { type_name: &'static str, value: f64 },

    #[error("Invariant violated: {what}")]
    Invariant { what: &'static str },
}
