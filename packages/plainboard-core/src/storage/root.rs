/// The current storage root, with change notification.
///
/// A clone shares the same underlying value. `set` publishes atomically;
/// dependents either read `current()` on each operation (the coordinator) or
/// hold a receiver from `subscribe()` and react to `changed()` (the watcher).
use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::watch;

#[derive(Debug, Clone)]
pub struct StorageRoot {
    tx: Arc<watch::Sender<PathBuf>>,
}

impl StorageRoot {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let (tx, _rx) = watch::channel(path.into());
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> PathBuf {
        self.tx.borrow().clone()
    }

    /// Redirect to `path`. Returns false (and notifies nobody) when unchanged.
    pub fn set(&self, path: impl Into<PathBuf>) -> bool {
        let path = path.into();
        let changed = self.tx.send_if_modified(|current| {
            if *current == path {
                false
            } else {
                *current = path.clone();
                true
            }
        });
        if changed {
            log::info!("[plainboard.storage.root] Storage root is now {:?}", path);
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<PathBuf> {
        self.tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_notifies_subscribers() {
        let root = StorageRoot::new("/a");
        let mut rx = root.subscribe();
        let shared = root.clone();

        assert!(!root.set("/a"));
        assert!(shared.set("/b"));
        rx.changed().await.unwrap();
        assert_eq!(*rx.borrow_and_update(), PathBuf::from("/b"));
        assert_eq!(root.current(), PathBuf::from("/b"));
    }

    #[test]
    fn test_set_without_subscribers() {
        let root = StorageRoot::new("/a");
        assert!(root.set("/c"));
        assert_eq!(root.current(), PathBuf::from("/c"));
    }
}
