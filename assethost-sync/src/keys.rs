//! Key derivation: maps a local asset to its remote key.
//!
//! ```text
//! plain: [<key_prefix>/]<fingerprint>/images/logo.png
//! gzip:  <gzip_prefix>/<fingerprint>/javascripts/app.js
//! ```
//!
//! The fingerprint is the first [`FINGERPRINT_LEN`] hex chars of the SHA-256
//! of the file contents, so a changed file always lands on a new key.

use std::fs::File;
use std::io;
use std::path::{Component, Path, PathBuf};

use sha2::{Digest, Sha256};

use assethost_core::{AssetKey, Config, LocalAsset, Variant};

use crate::error::{io_err, SyncError};

pub const FINGERPRINT_LEN: usize = 10;

/// Derives remote keys for files under one public root.
#[derive(Debug, Clone)]
pub struct KeyDeriver {
    root: PathBuf,
    plain_prefix: Option<String>,
    gzip_prefix: String,
}

impl KeyDeriver {
    /// The root is canonicalized when it exists so that paths resolved
    /// through `..` still strip cleanly.
    pub fn new(root: impl Into<PathBuf>, plain_prefix: Option<&str>, gzip_prefix: &str) -> Self {
        let root = root.into();
        let root = root.canonicalize().unwrap_or(root);
        Self {
            root,
            plain_prefix: plain_prefix.filter(|p| !p.is_empty()).map(str::to_owned),
            gzip_prefix: gzip_prefix.to_owned(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config.public_path,
            config.plain_prefix(),
            &config.gzip_prefix,
        )
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Content fingerprint of the file at `path`.
    pub fn fingerprint(&self, path: &Path) -> Result<String, SyncError> {
        let mut file = File::open(path).map_err(|e| io_err(path, e))?;
        let mut hasher = Sha256::new();
        io::copy(&mut file, &mut hasher).map_err(|e| io_err(path, e))?;
        let mut digest = hex::encode(hasher.finalize());
        digest.truncate(FINGERPRINT_LEN);
        Ok(digest)
    }

    /// `path` relative to the public root, `/`-separated with a leading `/`.
    pub fn relative_source(&self, path: &Path) -> Result<String, SyncError> {
        let outside = || SyncError::OutsideRoot {
            path: path.to_path_buf(),
            root: self.root.clone(),
        };
        let rel = path.strip_prefix(&self.root).map_err(|_| outside())?;
        let mut out = String::new();
        for component in rel.components() {
            match component {
                Component::Normal(part) => {
                    out.push('/');
                    out.push_str(&part.to_string_lossy());
                }
                Component::CurDir => {}
                _ => return Err(outside()),
            }
        }
        if out.is_empty() {
            return Err(outside());
        }
        Ok(out)
    }

    /// Build a [`LocalAsset`] for a file under the root.
    pub fn asset(&self, path: &Path) -> Result<LocalAsset, SyncError> {
        Ok(LocalAsset::new(path, self.relative_source(path)?))
    }

    /// Key for one variant of `asset`.
    pub fn key_for(&self, asset: &LocalAsset, variant: Variant) -> Result<AssetKey, SyncError> {
        let fingerprint = self.fingerprint(&asset.path)?;
        let key = match (variant, &self.plain_prefix) {
            (Variant::Plain, Some(prefix)) => format!("{prefix}/{fingerprint}{}", asset.relative),
            (Variant::Plain, None) => format!("{fingerprint}{}", asset.relative),
            (Variant::Gzip, _) => {
                format!("{}/{fingerprint}{}", self.gzip_prefix, asset.relative)
            }
        };
        Ok(AssetKey(key))
    }

    /// Prefixes whose listings together form the tracked remote namespace.
    ///
    /// The gzip namespace is listed even when gzip uploads are off, so stale
    /// compressed keys still get cleaned up. Without a plain prefix the whole
    /// bucket is tracked and one listing covers both.
    pub fn listing_prefixes(&self) -> Vec<String> {
        let Some(prefix) = &self.plain_prefix else {
            return vec![String::new()];
        };
        let mut prefixes = vec![format!("{prefix}/")];
        if !self.gzip_prefix.is_empty() {
            prefixes.push(format!("{}/", self.gzip_prefix));
        }
        prefixes
    }
}
