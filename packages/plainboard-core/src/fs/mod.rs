/// File primitives consumed by the scanner, the resolver and the coordinator.
///
/// Read and list operations report a missing path as `None`, `false` or an
/// empty list. Only write paths return errors, and a permission failure is
/// always reported as `FsError::PermissionDenied` so callers can surface it.
pub mod local;
pub mod tracked;

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

pub use local::LocalFileSystem;
pub use tracked::TrackedFileSystem;

/// Metadata for a single path, as seen by `FileSystem::stat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileMeta {
    /// Modification time in nanoseconds since the Unix epoch.
    pub modified: u64,
    pub is_dir: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum FsError {
    #[error("Permission denied: {}", path.display())]
    PermissionDenied { path: PathBuf },

    #[error("IO error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FsError {
    /// Classify an `io::Error` for `path`, keeping permission failures distinct.
    pub fn from_io(path: &Path, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::PermissionDenied {
            Self::PermissionDenied {
                path: path.to_path_buf(),
            }
        } else {
            Self::Io {
                path: path.to_path_buf(),
                source,
            }
        }
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::PermissionDenied { path } | Self::Io { path, .. } => path,
        }
    }
}

/// Directory and file primitives the engine is built on.
#[async_trait]
pub trait FileSystem: Send + Sync {
    async fn exists(&self, path: &Path) -> bool;

    /// Read a UTF-8 file. `None` when it is missing, unreadable or vanished.
    async fn read_file(&self, path: &Path) -> Option<String>;

    async fn write_file(&self, path: &Path, content: &str) -> Result<(), FsError>;

    /// Delete a file. `Ok(false)` when there was nothing to delete.
    async fn delete_file(&self, path: &Path) -> Result<bool, FsError>;

    async fn rename_file(&self, from: &Path, to: &Path) -> Result<(), FsError>;

    async fn ensure_directory(&self, path: &Path) -> Result<(), FsError>;

    /// Recursively remove a directory. `Ok(false)` when it did not exist.
    async fn remove_directory(&self, path: &Path) -> Result<bool, FsError>;

    /// Files in `dir` with the given extension, sorted by name.
    async fn list_files(&self, dir: &Path, extension: &str) -> Vec<PathBuf>;

    /// Immediate subdirectories of `dir`, sorted by name.
    async fn list_directories(&self, dir: &Path) -> Vec<PathBuf>;

    /// Every entry of `dir`. Unlike the other list calls this reports
    /// failures, so the scanner can log the subtree it had to skip.
    async fn list_entries(&self, dir: &Path) -> Result<Vec<PathBuf>, FsError>;

    /// Metadata following symlinks. `None` when the path is gone.
    async fn stat(&self, path: &Path) -> Option<FileMeta>;

    async fn canonicalize(&self, path: &Path) -> Option<PathBuf>;
}
