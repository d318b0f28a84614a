//! Builder options read from the application node.

use std::time::Duration;

use rt_tree::ConfigTree;

use crate::error::BuildResult;

pub const CHECK_SAME_GAM_IN_MORE_THREADS: &str = "CheckSameGamInMoreThreads";
pub const CHECK_MULTIPLE_PRODUCERS_WRITES: &str = "CheckMultipleProducersWrites";
pub const DEFAULT_DATA_SOURCE: &str = "DefaultDataSource";

#[derive(Debug, Clone, PartialEq)]
pub struct BuilderOptions {
    /// Reject a function scheduled by two threads of the same state.
    pub check_same_gam_in_more_threads: bool,
    /// Enforce producer cardinality and range checks.
    pub check_multiple_producers_writes: bool,
    /// Data source for signals that do not name one.
    pub default_data_source: Option<String>,
    /// How long `build_shared` waits for the tree lock.
    pub lock_timeout: Duration,
}

impl Default for BuilderOptions {
    fn default() -> Self {
        Self {
            check_same_gam_in_more_threads: true,
            check_multiple_producers_writes: true,
            default_data_source: None,
            lock_timeout: Duration::from_secs(1),
        }
    }
}

impl BuilderOptions {
    /// Read overrides from the application node (cursor position). The
    /// default data source lives in the `Data` child.
    pub fn from_tree(tree: &ConfigTree) -> BuildResult<Self> {
        let mut options = Self::default();
        if let Some(v) = tree.read_opt::<u32>(CHECK_SAME_GAM_IN_MORE_THREADS)? {
            options.check_same_gam_in_more_threads = v > 0;
        }
        if let Some(v) = tree.read_opt::<u32>(CHECK_MULTIPLE_PRODUCERS_WRITES)? {
            options.check_multiple_producers_writes = v > 0;
        }
        if tree.is_node("Data") {
            let mut data = tree.clone();
            data.move_relative("Data")?;
            options.default_data_source = data.read_opt(DEFAULT_DATA_SOURCE)?;
        }
        Ok(options)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_enable_checks() {
        let tree = ConfigTree::new();
        let options = BuilderOptions::from_tree(&tree).unwrap();
        assert!(options.check_same_gam_in_more_threads);
        assert!(options.check_multiple_producers_writes);
        assert_eq!(options.default_data_source, None);
    }

    #[test]
    fn reads_overrides() {
        let mut tree = ConfigTree::new();
        tree.write(CHECK_SAME_GAM_IN_MORE_THREADS, 0_u32).unwrap();
        tree.create_relative("Data").unwrap();
        tree.write(DEFAULT_DATA_SOURCE, "DDB1").unwrap();
        tree.move_to_root();
        let options = BuilderOptions::from_tree(&tree).unwrap();
        assert!(!options.check_same_gam_in_more_threads);
        assert_eq!(options.default_data_source.as_deref(), Some("DDB1"));
    }
}
