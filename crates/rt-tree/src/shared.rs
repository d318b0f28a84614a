//! Lock-guarded tree handle.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, MutexGuard};

use crate::error::{TreeError, TreeResult};
use crate::tree::ConfigTree;

/// A `ConfigTree` shared between a build and external readers (for example
/// a diagnostics endpoint browsing the configuration).
///
/// `lock` blocks for at most `timeout`; the guard unlocks on drop.
#[derive(Debug, Clone, Default)]
pub struct SharedTree {
    inner: Arc<Mutex<ConfigTree>>,
}

impl SharedTree {
    pub fn new(tree: ConfigTree) -> Self {
        Self {
            inner: Arc::new(Mutex::new(tree)),
        }
    }

    pub fn lock(&self, timeout: Duration) -> TreeResult<MutexGuard<'_, ConfigTree>> {
        self.inner
            .try_lock_for(timeout)
            .ok_or(TreeError::LockTimeout { timeout })
    }

    /// Clone the current contents under the lock.
    pub fn snapshot(&self, timeout: Duration) -> TreeResult<ConfigTree> {
        self.lock(timeout).map(|guard| guard.clone())
    }
}

impl From<ConfigTree> for SharedTree {
    fn from(tree: ConfigTree) -> Self {
        Self::new(tree)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_times_out_while_held() {
        let shared = SharedTree::new(ConfigTree::new());
        let reader = shared.clone();
        let _guard = shared.lock(Duration::from_millis(10)).unwrap();
        let err = reader.lock(Duration::from_millis(20)).unwrap_err();
        assert!(matches!(err, TreeError::LockTimeout { .. }));
    }

    #[test]
    fn unlock_on_drop() {
        let shared = SharedTree::new(ConfigTree::new());
        {
            let mut guard = shared.lock(Duration::from_millis(10)).unwrap();
            guard.write("k", 3_u32).unwrap();
        }
        let snap = shared.snapshot(Duration::from_millis(10)).unwrap();
        assert_eq!(snap.read::<u32>("k").unwrap(), 3);
    }

    #[test]
    fn lock_across_threads() {
        let shared = SharedTree::new(ConfigTree::new());
        let other = shared.clone();
        let handle = std::thread::spawn(move || {
            let mut guard = other.lock(Duration::from_secs(1)).unwrap();
            guard.write("from_thread", true).unwrap();
        });
        handle.join().unwrap();
        let guard = shared.lock(Duration::from_secs(1)).unwrap();
        assert!(guard.read::<bool>("from_thread").unwrap());
    }
}
