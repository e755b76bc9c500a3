/// Entity file resolution.
///
/// A task (or agenda item) file is bound to its logical id in two ways: the
/// file name starts with the lower-cased id, and the front-matter declares
/// it. The name is the fast path; the front-matter is authoritative when the
/// two disagree. Ids compare case-insensitively everywhere.
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::frontmatter;
use crate::fs::FileSystem;
use crate::layout::{self, BOARD_FILE, COLUMN_FILE, MARKDOWN_EXTENSION};
use crate::slug::sanitize_id;

pub const DEFAULT_MAX_RETRIES: usize = 100;

/// Number of id characters used in the last-resort file name suffix.
const ID_SUFFIX_LEN: usize = 8;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleanupReport {
    /// Files deleted because their id is no longer current or they lost a
    /// duplicate contest.
    pub removed: Vec<PathBuf>,
    /// Files left alone because their front-matter could not be parsed.
    pub skipped: Vec<PathBuf>,
}

impl CleanupReport {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.skipped.is_empty()
    }
}

/// Who a file on disk belongs to.
enum Owner {
    Vacant,
    Declared(String),
    /// No id in the front-matter; the file name is all there is.
    Undeclared,
    Unknown,
}

pub struct EntityFileResolver {
    fs: Arc<dyn FileSystem>,
}

impl EntityFileResolver {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self { fs }
    }

    /// Entity files in `dir`, excluding the board and column metadata files.
    async fn entity_files(&self, dir: &Path) -> Vec<PathBuf> {
        self.fs
            .list_files(dir, MARKDOWN_EXTENSION)
            .await
            .into_iter()
            .filter(|p| {
                let name = p.file_name().map(|n| n.to_string_lossy().to_lowercase());
                !matches!(name.as_deref(), Some(COLUMN_FILE) | Some(BOARD_FILE))
            })
            .filter(|p| !layout::is_ignored(p))
            .collect()
    }

    /// The file in `dir` bound to `id`, if any.
    ///
    /// File names are tried first; a name match is rejected only when the
    /// file declares a different id. Remaining files are then matched on
    /// their declared id. Files that fail to parse are skipped.
    pub async fn find_by_id(&self, dir: &Path, id: &str) -> Option<PathBuf> {
        let files = self.entity_files(dir).await;
        let wanted = sanitize_id(id);
        let prefix = format!("{}-", wanted);

        let mut unmatched = Vec::new();
        for path in files {
            let stem = layout::file_stem_lower(&path);
            if stem != wanted && !stem.starts_with(&prefix) {
                unmatched.push(path);
                continue;
            }
            match self.owner(&path).await {
                Owner::Declared(owner) if !same_id(&owner, id) => {
                    log::debug!(
                        "[plainboard.storage.resolve] {:?} looks like {} but declares {}",
                        path,
                        id,
                        owner
                    );
                    unmatched.push(path);
                }
                Owner::Vacant => {}
                _ => return Some(path),
            }
        }

        for path in unmatched {
            if let Owner::Declared(owner) = self.owner(&path).await {
                if same_id(&owner, id) {
                    return Some(path);
                }
            }
        }
        None
    }

    /// A file name in `base_path`'s directory that `id` may write to.
    ///
    /// The base name is used when it is free or already bound to `id`.
    /// Otherwise `{stem}_1.md`..`{stem}_{n}.md` are probed, and after that the
    /// name falls back to `{stem}_{first 8 chars of id}.md`.
    pub async fn resolve_unique_name(&self, base_path: &Path, id: &str) -> String {
        self.resolve_unique_name_with(base_path, id, DEFAULT_MAX_RETRIES)
            .await
    }

    pub async fn resolve_unique_name_with(
        &self,
        base_path: &Path,
        id: &str,
        max_retries: usize,
    ) -> String {
        let dir = base_path.parent().unwrap_or_else(|| Path::new(""));
        let stem = base_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let base_name = format!("{}.{}", stem, MARKDOWN_EXTENSION);

        if self.available_for(&dir.join(&base_name), id).await {
            return base_name;
        }
        for n in 1..=max_retries {
            let candidate = format!("{}_{}.{}", stem, n, MARKDOWN_EXTENSION);
            if self.available_for(&dir.join(&candidate), id).await {
                return candidate;
            }
        }

        let suffix: String = sanitize_id(id).chars().take(ID_SUFFIX_LEN).collect();
        log::warn!(
            "[plainboard.storage.resolve] {} probes exhausted for {:?}, using id suffix",
            max_retries,
            base_path
        );
        format!("{}_{}.{}", stem, suffix, MARKDOWN_EXTENSION)
    }

    async fn available_for(&self, path: &Path, id: &str) -> bool {
        match self.owner(path).await {
            Owner::Vacant => true,
            Owner::Declared(owner) => same_id(&owner, id),
            Owner::Undeclared => {
                let stem = layout::file_stem_lower(path);
                let wanted = sanitize_id(id);
                stem == wanted || stem.starts_with(&format!("{}-", wanted))
            }
            Owner::Unknown => false,
        }
    }

    /// The declared owner of `path`. A file that fails to parse belongs to
    /// nobody we can name.
    async fn owner(&self, path: &Path) -> Owner {
        let Some(content) = self.fs.read_file(path).await else {
            return Owner::Vacant;
        };
        match frontmatter::declared_id(&content) {
            Ok(Some(id)) => Owner::Declared(id),
            Ok(None) => Owner::Undeclared,
            Err(e) => {
                log::debug!(
                    "[plainboard.storage.resolve] Unreadable front-matter in {:?}: {}",
                    path,
                    e
                );
                Owner::Unknown
            }
        }
    }

    /// Delete files in `dir` whose id is not in `current_ids`, and among files
    /// sharing an id keep only the most recently modified one.
    pub async fn cleanup(&self, dir: &Path, current_ids: &[String]) -> CleanupReport {
        let wanted: HashSet<String> = current_ids.iter().map(|id| id.to_lowercase()).collect();
        let mut report = CleanupReport::default();
        let mut by_id: HashMap<String, Vec<(PathBuf, u64)>> = HashMap::new();

        for path in self.entity_files(dir).await {
            let Some(content) = self.fs.read_file(&path).await else {
                continue;
            };
            let id = match frontmatter::declared_id(&content) {
                Ok(Some(id)) => id.to_lowercase(),
                Ok(None) => id_from_stem(&path, &wanted),
                Err(e) => {
                    log::warn!(
                        "[plainboard.storage.cleanup] Skipping {:?}: {}",
                        path,
                        e
                    );
                    report.skipped.push(path);
                    continue;
                }
            };

            if !wanted.contains(&id) {
                self.remove(&path, &mut report).await;
                continue;
            }
            let modified = self.fs.stat(&path).await.map(|m| m.modified).unwrap_or(0);
            by_id.entry(id).or_default().push((path, modified));
        }

        let mut groups: Vec<_> = by_id.into_iter().filter(|(_, f)| f.len() > 1).collect();
        groups.sort_by(|a, b| a.0.cmp(&b.0));
        for (id, mut files) in groups {
            // Newest first; listing order breaks ties.
            files.sort_by(|a, b| b.1.cmp(&a.1));
            log::info!(
                "[plainboard.storage.cleanup] {} files for id {}, keeping {:?}",
                files.len(),
                id,
                files[0].0
            );
            for (path, _) in files.into_iter().skip(1) {
                self.remove(&path, &mut report).await;
            }
        }

        report.removed.sort();
        report
    }

    async fn remove(&self, path: &Path, report: &mut CleanupReport) {
        match self.fs.delete_file(path).await {
            Ok(true) => report.removed.push(path.to_path_buf()),
            Ok(false) => {}
            Err(e) => {
                log::warn!(
                    "[plainboard.storage.cleanup] Failed to delete {:?}: {}",
                    path,
                    e
                );
            }
        }
    }
}

fn same_id(a: &str, b: &str) -> bool {
    sanitize_id(a) == sanitize_id(b)
}

/// Id for a file without front-matter: the wanted id its name starts with,
/// or the whole stem.
fn id_from_stem(path: &Path, wanted: &HashSet<String>) -> String {
    let stem = layout::file_stem_lower(path);
    wanted
        .iter()
        .filter(|id| {
            let id = sanitize_id(id);
            stem == id || stem.starts_with(&format!("{}-", id))
        })
        .max_by_key(|id| id.len())
        .cloned()
        .unwrap_or(stem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::LocalFileSystem;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn resolver() -> EntityFileResolver {
        EntityFileResolver::new(Arc::new(LocalFileSystem::new()))
    }

    fn write(dir: &Path, name: &str, id: Option<&str>) -> PathBuf {
        let path = dir.join(name);
        let content = match id {
            Some(id) => format!("---\nid: {}\ntitle: t\n---\n", id),
            None => "plain text\n".to_string(),
        };
        std::fs::write(&path, content).unwrap();
        path
    }

    fn set_mtime(path: &Path, secs_ago: u64) {
        let file = std::fs::File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(secs_ago))
            .unwrap();
    }

    #[tokio::test]
    async fn test_find_by_name_prefix() {
        let tmp = TempDir::new().unwrap();
        let path = write(tmp.path(), "mka-1-fix-login.md", Some("MKA-1"));
        write(tmp.path(), "column.md", Some("MKA-1"));

        assert_eq!(resolver().find_by_id(tmp.path(), "MKA-1").await, Some(path));
        assert_eq!(resolver().find_by_id(tmp.path(), "MKA-2").await, None);
    }

    #[tokio::test]
    async fn test_find_by_front_matter_id() {
        let tmp = TempDir::new().unwrap();
        let path = write(tmp.path(), "renamed-by-hand.md", Some("MKA-7"));
        write(tmp.path(), "broken.md", None);
        std::fs::write(tmp.path().join("bad.md"), "---\nid: [\n---\n").unwrap();

        assert_eq!(resolver().find_by_id(tmp.path(), "mka-7").await, Some(path));
    }

    #[tokio::test]
    async fn test_find_rejects_name_match_with_other_declared_id() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "mka-1-2-other.md", Some("MKA-1-2"));
        let real = write(tmp.path(), "something.md", Some("MKA-1"));

        assert_eq!(resolver().find_by_id(tmp.path(), "MKA-1").await, Some(real));
    }

    #[tokio::test]
    async fn test_find_in_missing_dir() {
        let tmp = TempDir::new().unwrap();
        assert_eq!(
            resolver().find_by_id(&tmp.path().join("nope"), "a").await,
            None
        );
    }

    #[tokio::test]
    async fn test_unique_name_free_or_owned() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("mka-1-fix.md");
        assert_eq!(resolver().resolve_unique_name(&base, "MKA-1").await, "mka-1-fix.md");

        write(tmp.path(), "mka-1-fix.md", Some("mka-1"));
        assert_eq!(resolver().resolve_unique_name(&base, "MKA-1").await, "mka-1-fix.md");
    }

    #[tokio::test]
    async fn test_unique_name_probes_past_other_ids() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("note.md");
        write(tmp.path(), "note.md", Some("A"));
        write(tmp.path(), "note_1.md", Some("B"));

        assert_eq!(resolver().resolve_unique_name(&base, "C").await, "note_2.md");
        assert_eq!(resolver().resolve_unique_name(&base, "b").await, "note_1.md");
    }

    #[tokio::test]
    async fn test_unique_name_exhaustion_uses_id_suffix() {
        let tmp = TempDir::new().unwrap();
        let base = tmp.path().join("note.md");
        write(tmp.path(), "note.md", Some("A"));
        write(tmp.path(), "note_1.md", Some("B"));
        write(tmp.path(), "note_2.md", Some("C"));

        let name = resolver()
            .resolve_unique_name_with(&base, "ABCDEFGHIJ", 2)
            .await;
        assert_eq!(name, "note_abcdefgh.md");
    }

    #[tokio::test]
    async fn test_cleanup_removes_stale_and_duplicates() {
        let tmp = TempDir::new().unwrap();
        let stale = write(tmp.path(), "old-1-gone.md", Some("OLD-1"));
        let older = write(tmp.path(), "mka-1-first.md", Some("MKA-1"));
        let newer = write(tmp.path(), "mka-1-second.md", Some("MKA-1"));
        let keep = write(tmp.path(), "mka-2-x.md", Some("MKA-2"));
        let no_meta = write(tmp.path(), "mka-3-plain.md", None);
        std::fs::write(tmp.path().join("bad.md"), "---\nid: [\n---\n").unwrap();
        write(tmp.path(), "column.md", Some("col"));
        set_mtime(&older, 100);
        set_mtime(&newer, 10);

        let ids = vec!["mka-1".to_string(), "MKA-2".to_string(), "MKA-3".to_string()];
        let report = resolver().cleanup(tmp.path(), &ids).await;

        let mut expected = vec![stale.clone(), older.clone()];
        expected.sort();
        assert_eq!(report.removed, expected);
        assert_eq!(report.skipped, vec![tmp.path().join("bad.md")]);
        assert!(!stale.exists());
        assert!(!older.exists());
        assert!(newer.exists());
        assert!(keep.exists());
        assert!(no_meta.exists());
        assert!(tmp.path().join("column.md").exists());
    }

    #[tokio::test]
    async fn test_cleanup_with_no_current_ids_empties_dir() {
        let tmp = TempDir::new().unwrap();
        write(tmp.path(), "a.md", Some("a"));
        write(tmp.path(), "b.md", None);

        let report = resolver().cleanup(tmp.path(), &[]).await;
        assert_eq!(report.removed.len(), 2);
    }
}
