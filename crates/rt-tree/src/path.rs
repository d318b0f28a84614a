//! Dot-separated path rules.
//!
//! `"A.B.C"` names a node three levels down. The empty string, bare dots
//! (`"."`, `".."`, `"..."`) and any path with an empty segment are rejected.

use crate::error::{TreeError, TreeResult};

/// Split a path into its segments, rejecting malformed input.
pub fn segments(path: &str) -> TreeResult<Vec<&str>> {
    if path.is_empty() {
        return Err(invalid(path));
    }
    let parts: Vec<&str> = path.split('.').collect();
    if parts.iter().any(|p| p.is_empty()) {
        return Err(invalid(path));
    }
    Ok(parts)
}

/// Validate a single child name (no separators allowed).
pub fn check_name(name: &str) -> TreeResult<()> {
    if name.is_empty() || name.contains('.') {
        return Err(invalid(name));
    }
    Ok(())
}

/// Join two path fragments, skipping an empty prefix.
pub fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}.{name}")
    }
}

fn invalid(path: &str) -> TreeError {
    TreeError::InvalidPath {
        path: path.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_dotted_paths() {
        assert_eq!(segments("A.B.C").unwrap(), vec!["A", "B", "C"]);
        assert_eq!(segments("A").unwrap(), vec!["A"]);
    }

    #[test]
    fn rejects_degenerate_paths() {
        for p in ["", ".", "..", "...", ".A", "A.", "A..B"] {
            assert!(segments(p).is_err(), "{p:?} should be rejected");
        }
    }

    #[test]
    fn join_skips_empty_prefix() {
        assert_eq!(join("", "A"), "A");
        assert_eq!(join("A.B", "C"), "A.B.C");
    }
}
