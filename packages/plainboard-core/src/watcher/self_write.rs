/// Own-write ledger for the polling watcher.
///
/// Every write the engine performs registers the SHA-256 fingerprint of the
/// content it is about to put on disk; every delete registers a removal mark
/// and every directory it creates a creation mark. When a poll observes an
/// added/modified file whose content matches a pending fingerprint, or a path
/// covered by a mark, the change is ours and is dropped. File entries are
/// consumed on match. Tree removals cover every path below them, which the
/// detector reports in one batch with the directory first, so they only leave
/// with the TTL.
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use super::types::ContentFingerprint;

pub const DEFAULT_TTL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
enum PendingKind {
    Write(ContentFingerprint),
    Removal,
    TreeRemoval,
    Directory,
}

#[derive(Debug)]
struct PendingEntry {
    kind: PendingKind,
    registered_at: Instant,
}

#[derive(Debug)]
pub struct SelfWriteTracker {
    pending: HashMap<PathBuf, Vec<PendingEntry>>,
    ttl: Duration,
}

impl Default for SelfWriteTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SelfWriteTracker {
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            ttl,
        }
    }

    pub fn set_ttl(&mut self, ttl: Duration) {
        self.ttl = ttl;
    }

    /// Called before writing `content` to `path`.
    pub fn register_write(&mut self, path: &Path, content: &str) {
        self.push(path, PendingKind::Write(ContentFingerprint::from_content(content)));
    }

    /// Called before deleting the file `path`.
    pub fn register_removal(&mut self, path: &Path) {
        self.push(path, PendingKind::Removal);
    }

    /// Called before removing the directory `path` with its contents. One
    /// mark suppresses a whole removed board or column.
    pub fn register_tree_removal(&mut self, path: &Path) {
        self.push(path, PendingKind::TreeRemoval);
    }

    /// Called before creating the directory `path`.
    pub fn register_directory(&mut self, path: &Path) {
        self.push(path, PendingKind::Directory);
    }

    fn push(&mut self, path: &Path, kind: PendingKind) {
        self.pending
            .entry(path.to_path_buf())
            .or_default()
            .push(PendingEntry {
                kind,
                registered_at: Instant::now(),
            });
    }

    /// True (and consumed) when `current_content` at `path` is one of our writes.
    pub fn check_write(&mut self, path: &Path, current_content: &str) -> bool {
        let fingerprint = PendingKind::Write(ContentFingerprint::from_content(current_content));
        self.consume(path, &fingerprint)
    }

    /// True when the deletion of `path` was ours. A tree mark on the path or
    /// an ancestor is left in place; a file mark is consumed.
    pub fn check_removal(&mut self, path: &Path) -> bool {
        let in_removed_tree = path.ancestors().any(|ancestor| {
            self.pending.get(ancestor).is_some_and(|entries| {
                entries.iter().any(|e| e.kind == PendingKind::TreeRemoval)
            })
        });
        in_removed_tree || self.consume(path, &PendingKind::Removal)
    }

    /// True (and consumed) when the directory at `path` was created by us.
    pub fn check_directory(&mut self, path: &Path) -> bool {
        self.consume(path, &PendingKind::Directory)
    }

    fn consume(&mut self, path: &Path, kind: &PendingKind) -> bool {
        let Some(entries) = self.pending.get_mut(path) else {
            return false;
        };
        let Some(pos) = entries.iter().position(|e| &e.kind == kind) else {
            return false;
        };
        entries.remove(pos);
        if entries.is_empty() {
            self.pending.remove(path);
        }
        true
    }

    pub fn cleanup_expired(&mut self) {
        let now = Instant::now();
        let ttl = self.ttl;
        self.pending.retain(|_, entries| {
            entries.retain(|e| now.duration_since(e.registered_at) < ttl);
            !entries.is_empty()
        });
    }

    pub fn has_pending(&self, path: &Path) -> bool {
        self.pending.get(path).is_some_and(|e| !e.is_empty())
    }

    pub fn pending_paths(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_matched_once() {
        let mut tracker = SelfWriteTracker::new();
        let path = Path::new("/tmp/b1/todo/tasks/mka-1-title.md");

        tracker.register_write(path, "---\nid: MKA-1\n---\n");
        assert!(tracker.check_write(path, "---\nid: MKA-1\n---\n"));
        assert!(!tracker.check_write(path, "---\nid: MKA-1\n---\n"));
    }

    #[test]
    fn test_external_content_not_matched() {
        let mut tracker = SelfWriteTracker::new();
        let path = Path::new("/tmp/task.md");

        tracker.register_write(path, "ours");
        assert!(!tracker.check_write(path, "theirs"));
        assert!(tracker.has_pending(path));
    }

    #[test]
    fn test_line_endings_ignored() {
        let mut tracker = SelfWriteTracker::new();
        let path = Path::new("/tmp/task.md");

        tracker.register_write(path, "a\nb");
        assert!(tracker.check_write(path, "a\r\nb"));
    }

    #[test]
    fn test_tree_removal_covers_descendants() {
        let mut tracker = SelfWriteTracker::new();
        let column = Path::new("/tmp/b1/old-column");

        tracker.register_tree_removal(column);
        assert!(tracker.check_removal(&column.join("column.md")));
        assert!(tracker.check_removal(&column.join("tasks")));
        assert!(tracker.check_removal(column));
        assert!(!tracker.check_removal(Path::new("/tmp/b1/other")));
    }

    #[test]
    fn test_tree_removal_survives_directory_check() {
        let mut tracker = SelfWriteTracker::new();
        let board = Path::new("/tmp/b1");

        tracker.register_tree_removal(board);
        // Deletions arrive in path order: the directory before its children.
        assert!(tracker.check_removal(board));
        assert!(tracker.check_removal(&board.join("to-do")));
        assert!(tracker.check_removal(&board.join("to-do/tasks/mka-1-fix-login.md")));
        assert!(tracker.has_pending(board));
    }

    #[test]
    fn test_file_removal_does_not_cover_siblings() {
        let mut tracker = SelfWriteTracker::new();
        let path = Path::new("/tmp/b1/to-do/tasks/mka-1-title.md");

        tracker.register_removal(path);
        assert!(!tracker.check_removal(&path.join("child")));
        assert!(tracker.check_removal(path));
        assert!(!tracker.check_removal(path));
    }

    #[test]
    fn test_removal_is_not_a_write() {
        let mut tracker = SelfWriteTracker::new();
        let path = Path::new("/tmp/task.md");

        tracker.register_removal(path);
        assert!(!tracker.check_write(path, ""));
        assert!(tracker.check_removal(path));
        assert!(!tracker.has_pending(path));
    }

    #[test]
    fn test_directory_mark() {
        let mut tracker = SelfWriteTracker::new();
        let dir = Path::new("/tmp/b1/new-column");

        tracker.register_directory(dir);
        assert!(!tracker.check_removal(dir));
        assert!(tracker.check_directory(dir));
        assert!(!tracker.check_directory(dir));
    }

    #[test]
    fn test_cleanup_expired() {
        let mut tracker = SelfWriteTracker::with_ttl(Duration::from_secs(10));
        let path = Path::new("/tmp/task.md");

        tracker.register_write(path, "content");
        if let Some(entries) = tracker.pending.get_mut(path) {
            entries[0].registered_at = Instant::now() - Duration::from_secs(15);
        }
        tracker.cleanup_expired();
        assert!(!tracker.has_pending(path));
        assert_eq!(tracker.pending_paths(), 0);
    }
}
