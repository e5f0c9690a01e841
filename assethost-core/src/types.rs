//! Domain types shared by the sync engine and the CLI.
//!
//! All path fields use `PathBuf`; remote identifiers use [`AssetKey`].

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A remote object key, unique within the bucket namespace.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AssetKey(pub String);

impl AssetKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AssetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for AssetKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AssetKey {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Which representation of a source asset a key refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Variant {
    /// Uncompressed bytes, served as-is.
    Plain,
    /// Gzip-compressed bytes, served with `Content-Encoding: gzip`.
    Gzip,
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain => write!(f, "plain"),
            Self::Gzip => write!(f, "gzip"),
        }
    }
}

// ---------------------------------------------------------------------------
// Structs
// ---------------------------------------------------------------------------

/// A file discovered under the public root at the start of a sync run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalAsset {
    /// Path on disk, as found by the directory scan.
    pub path: PathBuf,
    /// Path relative to the public root: `/`-separated, leading `/`.
    pub relative: String,
}

impl LocalAsset {
    pub fn new(path: impl Into<PathBuf>, relative: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            relative: relative.into(),
        }
    }

    /// Lowercased file extension without the dot.
    pub fn extension(&self) -> Option<String> {
        extension_of(&self.path)
    }
}

/// Lowercased extension of `path`, if any.
pub fn extension_of(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}
