/// Local filesystem implementation of the file primitives.
///
/// Writes are atomic: content goes to a sibling temp file, is fsynced, then
/// renamed over the target and the parent directory is fsynced.
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::fs;
use tokio::io::AsyncWriteExt;

use super::{FileMeta, FileSystem, FsError};
use crate::layout::TEMP_EXTENSION;

#[derive(Debug, Clone, Copy, Default)]
pub struct LocalFileSystem;

impl LocalFileSystem {
    pub fn new() -> Self {
        Self
    }

    /// Atomic write with fsync: write to .tmp, fsync, rename, fsync directory.
    /// Refuses to write empty content over a non-empty file.
    async fn atomic_write(path: &Path, content: &str) -> io::Result<()> {
        if content.trim().is_empty() {
            if let Ok(existing) = fs::read_to_string(path).await {
                if !existing.trim().is_empty() {
                    return Err(io::Error::new(
                        io::ErrorKind::InvalidInput,
                        "Refusing to overwrite non-empty file with empty content",
                    ));
                }
            }
        }

        let tmp_path = path.with_extension(TEMP_EXTENSION);
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(content.as_bytes()).await?;
        file.sync_all().await?;
        drop(file);

        if let Err(e) = fs::rename(&tmp_path, path).await {
            let _ = fs::remove_file(&tmp_path).await;
            return Err(e);
        }

        if let Some(dir) = path.parent() {
            if let Ok(d) = fs::File::open(dir).await {
                let _ = d.sync_all().await;
            }
        }
        Ok(())
    }

    async fn read_dir_paths(dir: &Path) -> io::Result<Vec<PathBuf>> {
        let mut entries = fs::read_dir(dir).await?;
        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            paths.push(entry.path());
        }
        paths.sort();
        Ok(paths)
    }
}

fn modified_nanos(meta: &std::fs::Metadata) -> u64 {
    meta.modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos() as u64)
        .unwrap_or_else(|| {
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or(0)
        })
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn exists(&self, path: &Path) -> bool {
        fs::try_exists(path).await.unwrap_or(false)
    }

    async fn read_file(&self, path: &Path) -> Option<String> {
        match fs::read_to_string(path).await {
            Ok(content) => Some(content),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => {
                log::debug!("[plainboard.fs.read] Skipping unreadable {:?}: {}", path, e);
                None
            }
        }
    }

    async fn write_file(&self, path: &Path, content: &str) -> Result<(), FsError> {
        Self::atomic_write(path, content)
            .await
            .map_err(|e| FsError::from_io(path, e))
    }

    async fn delete_file(&self, path: &Path) -> Result<bool, FsError> {
        match fs::remove_file(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(FsError::from_io(path, e)),
        }
    }

    async fn rename_file(&self, from: &Path, to: &Path) -> Result<(), FsError> {
        fs::rename(from, to)
            .await
            .map_err(|e| FsError::from_io(from, e))
    }

    async fn ensure_directory(&self, path: &Path) -> Result<(), FsError> {
        fs::create_dir_all(path)
            .await
            .map_err(|e| FsError::from_io(path, e))
    }

    async fn remove_directory(&self, path: &Path) -> Result<bool, FsError> {
        match fs::remove_dir_all(path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(FsError::from_io(path, e)),
        }
    }

    async fn list_files(&self, dir: &Path, extension: &str) -> Vec<PathBuf> {
        let Ok(paths) = Self::read_dir_paths(dir).await else {
            return Vec::new();
        };
        let mut files = Vec::new();
        for path in paths {
            if path.extension().and_then(|e| e.to_str()) != Some(extension) {
                continue;
            }
            if let Ok(meta) = fs::metadata(&path).await {
                if meta.is_file() {
                    files.push(path);
                }
            }
        }
        files
    }

    async fn list_directories(&self, dir: &Path) -> Vec<PathBuf> {
        let Ok(paths) = Self::read_dir_paths(dir).await else {
            return Vec::new();
        };
        let mut dirs = Vec::new();
        for path in paths {
            if let Ok(meta) = fs::metadata(&path).await {
                if meta.is_dir() {
                    dirs.push(path);
                }
            }
        }
        dirs
    }

    async fn list_entries(&self, dir: &Path) -> Result<Vec<PathBuf>, FsError> {
        Self::read_dir_paths(dir)
            .await
            .map_err(|e| FsError::from_io(dir, e))
    }

    async fn stat(&self, path: &Path) -> Option<FileMeta> {
        let meta = fs::metadata(path).await.ok()?;
        Some(FileMeta {
            modified: modified_nanos(&meta),
            is_dir: meta.is_dir(),
        })
    }

    async fn canonicalize(&self, path: &Path) -> Option<PathBuf> {
        fs::canonicalize(path).await.ok()
    }
}
