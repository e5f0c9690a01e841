//! Shared sync entrypoint used by the CLI: wires the production
//! collaborators around an [`AssetSyncReconciler`].

use std::io::{Error, ErrorKind};

use assethost_core::Config;

use crate::{
    error::io_err, AssetSyncReconciler, FingerprintCssRewriter, GzipCompressor, KeyDeriver,
    S3Storage, Storage, SyncError, SyncObserver, SyncReport,
};

/// Run a sync against the S3 bucket named in `config`.
///
/// The config is validated before the storage client is built, so a bad
/// config never reaches the network.
pub fn run(
    config: &Config,
    dry_run: bool,
    observer: &mut dyn SyncObserver,
) -> Result<SyncReport, SyncError> {
    config.validate()?;
    check_public_root(config)?;
    let storage = S3Storage::from_config(config)?;
    run_with_storage(config, &storage, dry_run, observer)
}

/// Run a sync against any [`Storage`], with gzip compression and
/// fingerprint CSS rewriting.
///
/// Refuses to run when the public root is missing: an empty scan would
/// plan every remote key for deletion.
pub fn run_with_storage(
    config: &Config,
    storage: &dyn Storage,
    dry_run: bool,
    observer: &mut dyn SyncObserver,
) -> Result<SyncReport, SyncError> {
    check_public_root(config)?;

    let css = FingerprintCssRewriter::new(KeyDeriver::from_config(config), config.asset_host());
    let compressor = GzipCompressor::default();
    let mut reconciler = AssetSyncReconciler::new(config, storage, &compressor, &css)?;
    reconciler.sync(dry_run, observer)
}

fn check_public_root(config: &Config) -> Result<(), SyncError> {
    if config.public_path.is_dir() {
        return Ok(());
    }
    Err(io_err(
        &config.public_path,
        Error::new(ErrorKind::NotFound, "public root is not a directory"),
    ))
}
