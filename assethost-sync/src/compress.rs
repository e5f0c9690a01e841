//! Gzip compression collaborator.

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::Path;

use flate2::{write::GzEncoder, Compression};
use tempfile::{NamedTempFile, TempPath};

use crate::error::{io_err, SyncError};

/// Produces a gzip-compressed copy of a file.
pub trait Compressor {
    /// Compress `path` into a new temporary file, removed when the returned
    /// [`TempPath`] is dropped.
    fn compress(&self, path: &Path) -> Result<TempPath, SyncError>;
}

/// Native gzip encoder; output is standard RFC 1952 gzip.
#[derive(Debug, Clone, Copy)]
pub struct GzipCompressor {
    level: Compression,
}

impl Default for GzipCompressor {
    /// Level 6, the `gzip` utility's default.
    fn default() -> Self {
        Self {
            level: Compression::default(),
        }
    }
}

impl GzipCompressor {
    pub fn with_level(level: u32) -> Self {
        Self {
            level: Compression::new(level.min(9)),
        }
    }
}

impl Compressor for GzipCompressor {
    fn compress(&self, path: &Path) -> Result<TempPath, SyncError> {
        let source = File::open(path).map_err(|e| io_err(path, e))?;
        let tmp = NamedTempFile::with_prefix("assethost-gz").map_err(|e| io_err(path, e))?;
        let (file, tmp_path) = tmp.into_parts();

        // On error `tmp_path` drops here and takes the partial file with it.
        let mut encoder = GzEncoder::new(BufWriter::new(file), self.level);
        io::copy(&mut BufReader::new(source), &mut encoder)
            .map_err(|e| io_err(tmp_path.to_path_buf(), e))?;
        encoder
            .finish()
            .and_then(|mut w| w.flush())
            .map_err(|e| io_err(tmp_path.to_path_buf(), e))?;

        tracing::debug!("compressed {} -> {}", path.display(), tmp_path.display());
        Ok(tmp_path)
    }
}
