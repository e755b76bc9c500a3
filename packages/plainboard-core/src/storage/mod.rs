pub mod coordinator;
mod records;
pub mod resolver;
pub mod root;

use std::path::PathBuf;

pub use coordinator::PersistenceCoordinator;
pub use resolver::{CleanupReport, EntityFileResolver};
pub use root::StorageRoot;

use crate::frontmatter::FrontMatterError;
use crate::fs::FsError;

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error(transparent)]
    Fs(#[from] FsError),

    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: FrontMatterError,
    },

    #[error("Failed to serialize {entity}: {source}")]
    Serialize {
        entity: String,
        #[source]
        source: FrontMatterError,
    },

    #[error("Board not found: {0}")]
    BoardNotFound(String),

    #[error("Column {column} not found on board {board}")]
    ColumnNotFound { board: String, column: String },

    /// The destination copy was written but the source could not be removed.
    /// A best-effort delete of the destination has already been attempted.
    #[error("Moving task {task_id} failed: {source}")]
    Move {
        task_id: String,
        #[source]
        source: Box<StorageError>,
    },
}

impl StorageError {
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Self::Fs(FsError::PermissionDenied { .. }) => true,
            Self::Move { source, .. } => source.is_permission_denied(),
            _ => false,
        }
    }
}
