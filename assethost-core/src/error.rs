//! Error types for assethost-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure (permission denied, etc.).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parse error on load, with the file path and serde_yaml line context.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The config file did not exist at the expected path.
    #[error("config not found at {path}")]
    NotFound { path: PathBuf },

    /// A field parsed but holds a value the sync cannot work with.
    #[error("invalid config field `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },

    /// The built-in MIME table failed to parse.
    #[error("invalid MIME table: {0}")]
    MimeTable(#[source] serde_yaml::Error),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
