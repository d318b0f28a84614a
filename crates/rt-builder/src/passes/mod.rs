//! Pass bodies, grouped by concern. Each file extends
//! `ConfigurationBuilder` with the public entry points of its passes.

mod brokers;
mod data_sources;
mod memory;
mod producers;
mod signals;
mod states;

use rt_signals::{SignalDescriptor, SignalError};

use crate::error::BuildError;

pub(crate) const FUNCTIONS: &str = "Functions";
pub(crate) const DATA: &str = "Data";
pub(crate) const STATES: &str = "States";
pub(crate) const THREADS: &str = "Threads";
pub(crate) const TYPES: &str = "Types";
pub(crate) const SIGNALS: &str = "Signals";
pub(crate) const CLASS: &str = "Class";
pub(crate) const REFERENCE_CONTAINER: &str = "ReferenceContainer";
pub(crate) const APPLICATION: &str = "application";

/// Strip the `+`/`$` markers textual configurations put on object nodes.
pub(crate) fn object_name(node: &str) -> &str {
    node.trim_start_matches(['+', '$'])
}

/// `"{owner}.{signal}"`, used in messages.
pub(crate) fn qualified(owner: &str, signal: &SignalDescriptor) -> String {
    format!("{owner}.{}", signal.qualified_name)
}

/// Attach the owning function or data source to a signal error.
pub(crate) fn owned_by(owner: &str) -> impl Fn(SignalError) -> BuildError + '_ {
    move |err| match err {
        SignalError::DuplicateSignal { signal } => BuildError::DuplicateSignal {
            owner: owner.to_string(),
            signal,
        },
        other => other.into(),
    }
}

/// Round `offset` up to a multiple of `alignment`; `None` past `u32::MAX`.
pub(crate) fn align_up(offset: u32, alignment: u32) -> Option<u32> {
    let alignment = alignment.max(1);
    offset.div_ceil(alignment).checked_mul(alignment)
}

/// A footprint that does not fit a 32-bit byte count.
pub(crate) fn too_large(signal: String) -> BuildError {
    BuildError::FatalSize {
        signal,
        reason: "byte size does not fit in 32 bits".into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn alignment() {
        assert_eq!(align_up(0, 4), Some(0));
        assert_eq!(align_up(1, 4), Some(4));
        assert_eq!(align_up(8, 8), Some(8));
        assert_eq!(align_up(5, 0), Some(5));
        assert_eq!(align_up(u32::MAX, 8), None);
    }

    #[test]
    fn object_names() {
        assert_eq!(object_name("+GAMA"), "GAMA");
        assert_eq!(object_name("$App"), "App");
        assert_eq!(object_name("Plain"), "Plain");
    }
}
