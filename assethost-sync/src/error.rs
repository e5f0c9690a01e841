//! Error types for assethost-sync.

use std::path::PathBuf;

use thiserror::Error;

use assethost_core::ConfigError;

/// Boxed backend error carried by [`StorageError`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Failures reported by a [`Storage`](crate::storage::Storage) collaborator.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The storage client could not be constructed.
    #[error("storage setup failed: {0}")]
    Setup(#[source] BoxError),

    #[error("listing keys under '{prefix}' failed: {source}")]
    List {
        prefix: String,
        #[source]
        source: BoxError,
    },

    #[error("uploading '{key}' failed: {source}")]
    Put {
        key: String,
        #[source]
        source: BoxError,
    },

    #[error("deleting '{key}' failed: {source}")]
    Delete {
        key: String,
        #[source]
        source: BoxError,
    },
}

/// All errors that can arise from sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Missing or invalid configuration.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// The storage backend rejected an operation.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory traversal failed while scanning the asset tree.
    #[error("scan error: {0}")]
    Walk(#[from] walkdir::Error),

    /// A file lies outside the public root, so no key can be derived for it.
    #[error("{path} is outside the public root {root}")]
    OutsideRoot { path: PathBuf, root: PathBuf },
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
