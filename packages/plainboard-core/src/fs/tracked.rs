/// File primitives decorator that records every mutation in the self-write
/// tracker before delegating, so the watcher can tell our writes from
/// external edits.
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use super::{FileMeta, FileSystem, FsError};
use crate::watcher::self_write::SelfWriteTracker;

pub struct TrackedFileSystem {
    inner: Arc<dyn FileSystem>,
    tracker: Arc<Mutex<SelfWriteTracker>>,
}

impl TrackedFileSystem {
    pub fn new(inner: Arc<dyn FileSystem>, tracker: Arc<Mutex<SelfWriteTracker>>) -> Self {
        Self { inner, tracker }
    }

    fn with_tracker(&self, f: impl FnOnce(&mut SelfWriteTracker)) {
        let mut tracker = self.tracker.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut tracker);
    }
}

#[async_trait]
impl FileSystem for TrackedFileSystem {
    async fn exists(&self, path: &Path) -> bool {
        self.inner.exists(path).await
    }

    async fn read_file(&self, path: &Path) -> Option<String> {
        self.inner.read_file(path).await
    }

    async fn write_file(&self, path: &Path, content: &str) -> Result<(), FsError> {
        self.with_tracker(|t| t.register_write(path, content));
        self.inner.write_file(path, content).await
    }

    async fn delete_file(&self, path: &Path) -> Result<bool, FsError> {
        self.with_tracker(|t| t.register_removal(path));
        self.inner.delete_file(path).await
    }

    async fn rename_file(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        // The destination appears with the source's content.
        if let Some(content) = self.inner.read_file(from).await {
            self.with_tracker(|t| {
                t.register_write(to, &content);
                t.register_removal(from);
            });
        }
        self.inner.rename_file(from, to).await
    }

    async fn ensure_directory(&self, path: &Path) -> Result<(), FsError> {
        let mut created = Vec::new();
        for dir in path.ancestors() {
            if dir.as_os_str().is_empty() || self.inner.exists(dir).await {
                break;
            }
            created.push(dir.to_path_buf());
        }
        if !created.is_empty() {
            self.with_tracker(|t| created.iter().for_each(|dir| t.register_directory(dir)));
        }
        self.inner.ensure_directory(path).await
    }

    async fn remove_directory(&self, path: &Path) -> Result<bool, FsError> {
        self.with_tracker(|t| t.register_tree_removal(path));
        self.inner.remove_directory(path).await
    }

    async fn list_files(&self, dir: &Path, extension: &str) -> Vec<PathBuf> {
        self.inner.list_files(dir, extension).await
    }

    async fn list_directories(&self, dir: &Path) -> Vec<PathBuf> {
        self.inner.list_directories(dir).await
    }

    async fn list_entries(&self, dir: &Path) -> Result<Vec<PathBuf>, FsError> {
        self.inner.list_entries(dir).await
    }

    async fn stat(&self, path: &Path) -> Option<FileMeta> {
        self.inner.stat(path).await
    }

    async fn canonicalize(&self, path: &Path) -> Option<PathBuf> {
        self.inner.canonicalize(path).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::LocalFileSystem;
    use tempfile::TempDir;

    fn tracked() -> (TrackedFileSystem, Arc<Mutex<SelfWriteTracker>>) {
        let tracker = Arc::new(Mutex::new(SelfWriteTracker::new()));
        let fs = TrackedFileSystem::new(Arc::new(LocalFileSystem::new()), tracker.clone());
        (fs, tracker)
    }

    #[tokio::test]
    async fn test_write_registers_fingerprint() {
        let tmp = TempDir::new().unwrap();
        let (fs, tracker) = tracked();
        let path = tmp.path().join("a.md");

        fs.write_file(&path, "content").await.unwrap();
        assert!(tracker.lock().unwrap().check_write(&path, "content"));
    }

    #[tokio::test]
    async fn test_ensure_directory_marks_new_levels() {
        let tmp = TempDir::new().unwrap();
        let (fs, tracker) = tracked();
        let deep = tmp.path().join("board/column/tasks");

        fs.ensure_directory(&deep).await.unwrap();
        let mut tracker = tracker.lock().unwrap();
        assert!(tracker.check_directory(&tmp.path().join("board")));
        assert!(tracker.check_directory(&deep));
        assert!(!tracker.check_directory(tmp.path()));
    }

    #[tokio::test]
    async fn test_rename_registers_both_sides() {
        let tmp = TempDir::new().unwrap();
        let (fs, tracker) = tracked();
        let from = tmp.path().join("a.md");
        let to = tmp.path().join("b.md");
        std::fs::write(&from, "moved").unwrap();

        fs.rename_file(&from, &to).await.unwrap();
        let mut tracker = tracker.lock().unwrap();
        assert!(tracker.check_write(&to, "moved"));
        assert!(tracker.check_removal(&from));
    }

    #[tokio::test]
    async fn test_remove_directory_marks_whole_tree() {
        let tmp = TempDir::new().unwrap();
        let (fs, tracker) = tracked();
        let column = tmp.path().join("board/old");
        std::fs::create_dir_all(column.join("tasks")).unwrap();
        std::fs::write(column.join("tasks/a-1-x.md"), "x").unwrap();

        assert!(fs.remove_directory(&column).await.unwrap());
        let mut tracker = tracker.lock().unwrap();
        assert!(tracker.check_removal(&column));
        assert!(tracker.check_removal(&column.join("tasks")));
        assert!(tracker.check_removal(&column.join("tasks/a-1-x.md")));
        assert!(!tracker.check_removal(&tmp.path().join("board")));
    }
}
