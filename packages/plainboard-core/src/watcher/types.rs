/// Values flowing through the polling pipeline: snapshots, raw changes and
/// classified domain events.
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// SHA-256 fingerprint of file content, used for self-write detection.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentFingerprint(pub String);

impl ContentFingerprint {
    /// Compute SHA-256 fingerprint of content with normalized line endings.
    pub fn from_content(content: &str) -> Self {
        use sha2::{Digest, Sha256};
        let normalized = content.replace("\r\n", "\n");
        let mut hasher = Sha256::new();
        hasher.update(normalized.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }
}

/// One path as recorded by a scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileState {
    pub path: PathBuf,
    /// Nanoseconds since the epoch; always 0 for directories.
    pub modified: u64,
    pub is_directory: bool,
}

impl FileState {
    pub fn file(path: impl Into<PathBuf>, modified: u64) -> Self {
        Self {
            path: path.into(),
            modified,
            is_directory: false,
        }
    }

    pub fn directory(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            modified: 0,
            is_directory: true,
        }
    }
}

/// Every path under a watched root at one instant, ordered by path.
///
/// Never mutated once a scan hands it out; the detector keeps its own copy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectorySnapshot {
    entries: BTreeMap<PathBuf, FileState>,
}

impl DirectorySnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn insert(&mut self, state: FileState) {
        self.entries.insert(state.path.clone(), state);
    }

    pub fn get(&self, path: &Path) -> Option<&FileState> {
        self.entries.get(path)
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries.contains_key(path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FileState> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<FileState> for DirectorySnapshot {
    fn from_iter<I: IntoIterator<Item = FileState>>(iter: I) -> Self {
        let mut snapshot = Self::new();
        for state in iter {
            snapshot.insert(state);
        }
        snapshot
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
}

/// A verdict produced purely by comparing two snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawChange {
    pub path: PathBuf,
    pub kind: ChangeKind,
    pub is_directory: bool,
}

impl RawChange {
    pub fn new(path: impl Into<PathBuf>, kind: ChangeKind, is_directory: bool) -> Self {
        Self {
            path: path.into(),
            kind,
            is_directory,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Board,
    Column,
    Item,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeType {
    Created,
    Modified,
    Deleted,
}

/// A raw change reinterpreted as a board/column/item lifecycle event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
    pub entity_type: EntityType,
    pub change_type: ChangeType,
    #[serde(serialize_with = "serialize_path", deserialize_with = "deserialize_path")]
    pub file_path: PathBuf,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub board_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
}

fn serialize_path<S: serde::Serializer>(path: &Path, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&path.to_string_lossy())
}

fn deserialize_path<'de, D: serde::Deserializer<'de>>(d: D) -> Result<PathBuf, D::Error> {
    let s = String::deserialize(d)?;
    Ok(PathBuf::from(s))
}
