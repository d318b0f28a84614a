//! Content hashing of exported builds.

use rt_tree::ConfigTree;
use sha2::{Digest, Sha256};

use crate::{ProjectResult, to_yaml_string};

/// SHA-256 over the exported function and data-source trees.
///
/// Two builds of the same configuration must give the same fingerprint.
pub fn layout_fingerprint(functions: &ConfigTree, data: &ConfigTree) -> ProjectResult<String> {
    let mut hasher = Sha256::new();
    hasher.update(to_yaml_string(functions)?.as_bytes());
    hasher.update(b"\0");
    hasher.update(to_yaml_string(data)?.as_bytes());
    Ok(format!("{:x}", hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(value: u32) -> ConfigTree {
        let mut tree = ConfigTree::new();
        tree.create_relative("0").unwrap();
        tree.write("Offset", value).unwrap();
        tree.move_to_root();
        tree
    }

    #[test]
    fn fingerprint_stability() {
        let a = layout_fingerprint(&tree(4), &tree(8)).unwrap();
        let b = layout_fingerprint(&tree(4), &tree(8)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[test]
    fn fingerprint_differs_for_different_offsets() {
        let a = layout_fingerprint(&tree(4), &tree(8)).unwrap();
        let b = layout_fingerprint(&tree(4), &tree(12)).unwrap();
        assert_ne!(a, b);
    }
}
