/// Recursive directory scanner producing full snapshots of a watched root.
///
/// A symlinked directory pointing back inside the root is recorded but not
/// entered, so the real directory keeps its own paths. Links leaving the root
/// are followed, and a per-scan visited set of canonical directory paths
/// enters each target at most once. Depth is capped
/// as a circuit breaker. A subtree that fails to list is logged and treated as
/// empty; a missing root yields an empty snapshot.
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::types::{DirectorySnapshot, FileState};
use crate::fs::FileSystem;
use crate::layout;

pub const MAX_SCAN_DEPTH: usize = 20;
/// Entries processed between cooperative yields to the scheduler.
pub const YIELD_EVERY: usize = 100;

pub struct DirectoryScanner {
    fs: Arc<dyn FileSystem>,
    max_depth: usize,
    yield_every: usize,
}

impl DirectoryScanner {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self {
            fs,
            max_depth: MAX_SCAN_DEPTH,
            yield_every: YIELD_EVERY,
        }
    }

    pub fn with_limits(mut self, max_depth: usize, yield_every: usize) -> Self {
        self.max_depth = max_depth;
        self.yield_every = yield_every.max(1);
        self
    }

    pub async fn scan(&self, root: &Path) -> DirectorySnapshot {
        let mut snapshot = DirectorySnapshot::new();
        match self.fs.stat(root).await {
            Some(meta) if meta.is_dir => {}
            _ => {
                log::debug!("[plainboard.watcher.scan] Root {:?} missing, empty snapshot", root);
                return snapshot;
            }
        }

        let canonical_root = self
            .fs
            .canonicalize(root)
            .await
            .unwrap_or_else(|| root.to_path_buf());
        let mut visited: HashSet<PathBuf> = HashSet::new();
        let mut stack: Vec<(PathBuf, PathBuf, usize)> =
            vec![(root.to_path_buf(), canonical_root.clone(), 0)];
        let mut processed = 0usize;

        while let Some((dir, canonical, depth)) = stack.pop() {
            if !visited.insert(canonical.clone()) {
                log::debug!("[plainboard.watcher.scan] Skipping already visited {:?}", dir);
                continue;
            }

            let entries = match self.fs.list_entries(&dir).await {
                Ok(entries) => entries,
                Err(e) => {
                    log::warn!("[plainboard.watcher.scan] Treating {:?} as empty: {}", dir, e);
                    continue;
                }
            };

            for entry in entries {
                if layout::is_ignored(&entry) {
                    continue;
                }
                // Vanished between listing and stat.
                let Some(meta) = self.fs.stat(&entry).await else {
                    continue;
                };

                if meta.is_dir {
                    snapshot.insert(FileState::directory(entry.clone()));
                    let direct = match entry.file_name() {
                        Some(name) => canonical.join(name),
                        None => entry.clone(),
                    };
                    let target = self
                        .fs
                        .canonicalize(&entry)
                        .await
                        .unwrap_or_else(|| direct.clone());
                    if target != direct && target.starts_with(&canonical_root) {
                        log::debug!(
                            "[plainboard.watcher.scan] Not entering link {:?} into the root",
                            entry
                        );
                    } else if depth + 1 > self.max_depth {
                        log::warn!(
                            "[plainboard.watcher.scan] Depth limit {} reached at {:?}, truncating",
                            self.max_depth,
                            entry
                        );
                    } else {
                        stack.push((entry, target, depth + 1));
                    }
                } else {
                    snapshot.insert(FileState::file(entry, meta.modified));
                }

                processed += 1;
                if processed % self.yield_every == 0 {
                    tokio::task::yield_now().await;
                }
            }
        }

        log::trace!(
            "[plainboard.watcher.scan] {:?}: {} entries",
            root,
            snapshot.len()
        );
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::LocalFileSystem;
    use tempfile::TempDir;

    fn scanner() -> DirectoryScanner {
        DirectoryScanner::new(Arc::new(LocalFileSystem::new()))
    }

    #[tokio::test]
    async fn test_missing_root_is_empty() {
        let tmp = TempDir::new().unwrap();
        let snapshot = scanner().scan(&tmp.path().join("missing")).await;
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn test_scan_records_tree() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("b1/todo/tasks")).unwrap();
        std::fs::write(root.join("b1/kanban.md"), "x").unwrap();
        std::fs::write(root.join("b1/todo/column.md"), "x").unwrap();
        std::fs::write(root.join("b1/todo/tasks/mka-1.md"), "x").unwrap();
        std::fs::write(root.join("b1/.hidden"), "x").unwrap();

        let snapshot = scanner().scan(root).await;
        assert_eq!(snapshot.len(), 6);

        let dir = snapshot.get(&root.join("b1/todo")).unwrap();
        assert!(dir.is_directory);
        assert_eq!(dir.modified, 0);

        let file = snapshot.get(&root.join("b1/todo/tasks/mka-1.md")).unwrap();
        assert!(!file.is_directory);
        assert!(file.modified > 0);
        assert!(!snapshot.contains(&root.join("b1/.hidden")));
        assert!(!snapshot.contains(root));
    }

    #[tokio::test]
    async fn test_depth_limit_truncates() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("a/b/c")).unwrap();
        std::fs::write(root.join("a/b/c/deep.md"), "x").unwrap();

        let snapshot = scanner().with_limits(2, 100).scan(root).await;
        // `c` is recorded but never descended into.
        assert!(snapshot.contains(&root.join("a/b")));
        assert!(snapshot.contains(&root.join("a/b/c")));
        assert!(!snapshot.contains(&root.join("a/b/c/deep.md")));
    }

    #[tokio::test]
    async fn test_many_entries_with_yields() {
        let tmp = TempDir::new().unwrap();
        for i in 0..250 {
            std::fs::write(tmp.path().join(format!("{i}.md")), "x").unwrap();
        }
        let snapshot = scanner().with_limits(MAX_SCAN_DEPTH, 10).scan(tmp.path()).await;
        assert_eq!(snapshot.len(), 250);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_cycle_terminates() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("b1")).unwrap();
        std::fs::write(root.join("b1/kanban.md"), "x").unwrap();
        std::os::unix::fs::symlink(root, root.join("b1/loop")).unwrap();

        let snapshot = scanner().scan(root).await;
        assert!(snapshot.contains(&root.join("b1/kanban.md")));
        assert!(snapshot.contains(&root.join("b1/loop")));
        assert!(!snapshot.contains(&root.join("b1/loop/b1/kanban.md")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_link_to_sibling_keeps_real_paths() {
        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("zz-board/todo")).unwrap();
        std::fs::write(root.join("zz-board/kanban.md"), "x").unwrap();
        // Sorts before the real directory, so it is listed first.
        std::os::unix::fs::symlink(root.join("zz-board"), root.join("aa-link")).unwrap();

        let snapshot = scanner().scan(root).await;
        assert!(snapshot.contains(&root.join("zz-board/kanban.md")));
        assert!(snapshot.contains(&root.join("zz-board/todo")));
        assert!(snapshot.contains(&root.join("aa-link")));
        assert!(!snapshot.contains(&root.join("aa-link/kanban.md")));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_unreadable_subtree_is_empty() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = TempDir::new().unwrap();
        let root = tmp.path();
        std::fs::create_dir_all(root.join("locked/todo")).unwrap();
        std::fs::create_dir_all(root.join("open/todo")).unwrap();
        std::fs::write(root.join("open/kanban.md"), "x").unwrap();
        std::fs::write(root.join("locked/kanban.md"), "x").unwrap();
        let locked = root.join("locked");
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();
        // Privileged users read through the mode bits.
        let readable = std::fs::read_dir(&locked).is_ok();

        let snapshot = scanner().scan(root).await;
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
        if readable {
            return;
        }

        assert!(snapshot.contains(&locked));
        assert!(!snapshot.contains(&locked.join("kanban.md")));
        assert!(snapshot.contains(&root.join("open/kanban.md")));
        assert!(snapshot.contains(&root.join("open/todo")));
    }
}
