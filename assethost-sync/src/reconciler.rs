//! Upload/delete reconciliation between the local asset tree and the bucket.
//!
//! ## Run order
//!
//! 1. Reset run-scoped memo (local scan, remote listing, CSS trigger).
//! 2. Plain variant: plan, then apply.
//! 3. Gzip variant (when enabled): plan, then apply.
//! 4. Delete every remote key no plan in this run asked for.
//!
//! Deletes always run last so a key uploaded in this run is never a
//! deletion candidate.
//!
//! ## CSS re-upload trigger
//!
//! Image keys carry content fingerprints. If any local image's plain key is
//! missing remotely, some fingerprint changed, and every stylesheet is
//! re-uploaded through the [`CssRewriter`] even though its own key exists.
//! The decision is made once per run from the initial remote snapshot.

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use chrono::Utc;

use assethost_core::{AssetKey, Config, LocalAsset, MimeTable, Variant};

use crate::compress::Compressor;
use crate::css::CssRewriter;
use crate::error::{io_err, SyncError};
use crate::keys::KeyDeriver;
use crate::scan::scan_assets;
use crate::storage::{Acl, ObjectHeaders, Storage};

// ---------------------------------------------------------------------------
// Plans and outcomes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Upload,
    Skip,
}

/// One asset variant considered for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedUpload {
    pub key: AssetKey,
    pub asset: LocalAsset,
    pub action: Action,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPlan {
    pub variant: Variant,
    pub entries: Vec<PlannedUpload>,
}

impl UploadPlan {
    pub fn uploads(&self) -> impl Iterator<Item = &PlannedUpload> {
        self.entries.iter().filter(|e| e.action == Action::Upload)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeletePlan {
    pub keys: Vec<AssetKey>,
}

/// Outcome of a single planned action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Object was uploaded.
    Uploaded { key: AssetKey, variant: Variant },
    /// `--dry-run` mode: the object *would* have been uploaded.
    WouldUpload { key: AssetKey, variant: Variant },
    /// Key already present remotely and not subject to a CSS rewrite.
    Unchanged { key: AssetKey, variant: Variant },
    /// Object was deleted.
    Deleted { key: AssetKey },
    /// `--dry-run` mode: the object *would* have been deleted.
    WouldDelete { key: AssetKey },
}

impl KeyOutcome {
    pub fn key(&self) -> &AssetKey {
        match self {
            Self::Uploaded { key, .. }
            | Self::WouldUpload { key, .. }
            | Self::Unchanged { key, .. }
            | Self::Deleted { key }
            | Self::WouldDelete { key } => key,
        }
    }

    /// `+` upload, `=` unchanged, `-` delete.
    pub fn mark(&self) -> char {
        match self {
            Self::Uploaded { .. } | Self::WouldUpload { .. } => '+',
            Self::Unchanged { .. } => '=',
            Self::Deleted { .. } | Self::WouldDelete { .. } => '-',
        }
    }
}

/// Everything one run did, in order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub outcomes: Vec<KeyOutcome>,
}

impl SyncReport {
    pub fn uploaded(&self) -> usize {
        self.count('+')
    }

    pub fn unchanged(&self) -> usize {
        self.count('=')
    }

    pub fn deleted(&self) -> usize {
        self.count('-')
    }

    fn count(&self, mark: char) -> usize {
        self.outcomes.iter().filter(|o| o.mark() == mark).count()
    }
}

/// Stage of a run, reported to a [`SyncObserver`] as it begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    UploadPlain,
    UploadGzip,
    Delete,
}

/// Receives progress while a run executes, so callers can report actions
/// completed before a failure.
pub trait SyncObserver {
    fn phase(&mut self, _phase: Phase) {}
    fn outcome(&mut self, _outcome: &KeyOutcome) {}
}

impl SyncObserver for () {}

// ---------------------------------------------------------------------------
// Reconciler
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
struct RunCache {
    assets: Option<Vec<LocalAsset>>,
    remote: Option<BTreeSet<AssetKey>>,
    rewrite_all_css: Option<bool>,
}

/// Computes and applies sync plans through injected collaborators.
pub struct AssetSyncReconciler<'a> {
    config: &'a Config,
    storage: &'a dyn Storage,
    compressor: &'a dyn Compressor,
    css: &'a dyn CssRewriter,
    keys: KeyDeriver,
    mime: MimeTable,
    cache: RunCache,
    wanted: BTreeSet<AssetKey>,
}

impl<'a> AssetSyncReconciler<'a> {
    pub fn new(
        config: &'a Config,
        storage: &'a dyn Storage,
        compressor: &'a dyn Compressor,
        css: &'a dyn CssRewriter,
    ) -> Result<Self, SyncError> {
        Ok(Self {
            config,
            storage,
            compressor,
            css,
            keys: KeyDeriver::from_config(config),
            mime: MimeTable::with_overrides(&config.mime_types)?,
            cache: RunCache::default(),
            wanted: BTreeSet::new(),
        })
    }

    pub fn keys(&self) -> &KeyDeriver {
        &self.keys
    }

    /// Drop all run-scoped state.
    pub fn reset(&mut self) {
        self.cache = RunCache::default();
        self.wanted.clear();
    }

    /// Keys recorded as still wanted by the plans computed so far.
    pub fn wanted_keys(&self) -> &BTreeSet<AssetKey> {
        &self.wanted
    }

    /// Local assets, scanned once per run.
    pub fn local_assets(&mut self) -> Result<&[LocalAsset], SyncError> {
        let assets = match self.cache.assets.take() {
            Some(assets) => assets,
            None => scan_assets(&self.keys, &self.config.asset_dirs)?,
        };
        Ok(self.cache.assets.insert(assets).as_slice())
    }

    /// Remote keys under the tracked prefixes, listed once per run.
    pub fn remote_keys(&mut self) -> Result<&BTreeSet<AssetKey>, SyncError> {
        let remote = match self.cache.remote.take() {
            Some(remote) => remote,
            None => {
                let mut remote = BTreeSet::new();
                for prefix in self.keys.listing_prefixes() {
                    remote.extend(self.storage.list(&prefix)?.into_iter().map(AssetKey));
                }
                tracing::debug!("{} remote keys", remote.len());
                remote
            }
        };
        Ok(&*self.cache.remote.insert(remote))
    }

    /// Whether every stylesheet must be re-uploaded this run.
    pub fn rewrite_all_css(&mut self) -> Result<bool, SyncError> {
        if let Some(active) = self.cache.rewrite_all_css {
            return Ok(active);
        }
        let config = self.config;
        let images: Vec<LocalAsset> = self
            .local_assets()?
            .iter()
            .filter(|a| config.is_image(&a.path))
            .cloned()
            .collect();

        let mut active = false;
        for image in &images {
            let key = self.keys.key_for(image, Variant::Plain)?;
            if !self.remote_keys()?.contains(&key) {
                tracing::info!("new image {key}; stylesheets will be re-uploaded");
                active = true;
                break;
            }
        }
        self.cache.rewrite_all_css = Some(active);
        Ok(active)
    }

    /// Decide upload/skip for every local asset of `variant`.
    pub fn compute_upload_plan(&mut self, variant: Variant) -> Result<UploadPlan, SyncError> {
        let config = self.config;
        let assets: Vec<LocalAsset> = self
            .local_assets()?
            .iter()
            .filter(|a| variant == Variant::Plain || config.gzip_allowed_for_source(&a.relative))
            .cloned()
            .collect();

        let mut entries = Vec::with_capacity(assets.len());
        for asset in assets {
            let key = self.keys.key_for(&asset, variant)?;
            let missing = !self.remote_keys()?.contains(&key);
            let action = if missing || (config.is_css(&asset.path) && self.rewrite_all_css()?) {
                Action::Upload
            } else {
                Action::Skip
            };
            self.wanted.insert(key.clone());
            entries.push(PlannedUpload { key, asset, action });
        }
        Ok(UploadPlan { variant, entries })
    }

    /// Upload every `Upload` entry of `plan`; `put` is skipped in dry runs.
    pub fn apply_upload_plan(
        &self,
        plan: &UploadPlan,
        dry_run: bool,
        observer: &mut dyn SyncObserver,
    ) -> Result<Vec<KeyOutcome>, SyncError> {
        let mut outcomes = Vec::with_capacity(plan.entries.len());
        for entry in &plan.entries {
            let key = entry.key.clone();
            let variant = plan.variant;
            let outcome = match entry.action {
                Action::Skip => {
                    tracing::debug!("unchanged: {key}");
                    KeyOutcome::Unchanged { key, variant }
                }
                Action::Upload => {
                    self.upload(entry, variant, dry_run)?;
                    if dry_run {
                        KeyOutcome::WouldUpload { key, variant }
                    } else {
                        KeyOutcome::Uploaded { key, variant }
                    }
                }
            };
            observer.outcome(&outcome);
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    fn upload(&self, entry: &PlannedUpload, variant: Variant, dry_run: bool) -> Result<(), SyncError> {
        let asset = &entry.asset;

        // Temp files below are removed when these bindings drop, on every path.
        let rewritten = if self.config.is_css(&asset.path) {
            Some(self.css.rewrite(&asset.path)?)
        } else {
            None
        };
        let source: &Path = rewritten.as_deref().unwrap_or(asset.path.as_path());
        let compressed = match variant {
            Variant::Gzip => Some(self.compressor.compress(source)?),
            Variant::Plain => None,
        };
        let data_path: &Path = compressed.as_deref().unwrap_or(source);
        let bytes = fs::read(data_path).map_err(|e| io_err(data_path, e))?;

        let content_type = self.mime.lookup(asset.extension().as_deref());
        let headers = ObjectHeaders::for_upload(content_type, variant, Utc::now());

        if dry_run {
            tracing::info!("[dry-run] would upload: {} ({content_type})", entry.key);
            return Ok(());
        }
        self.storage
            .put(entry.key.as_str(), bytes, &headers, Acl::PublicRead)?;
        tracing::info!("uploaded: {} ({content_type})", entry.key);
        Ok(())
    }

    /// Delete every key in `plan`; skipped in dry runs.
    pub fn apply_delete_plan(
        &self,
        plan: &DeletePlan,
        dry_run: bool,
        observer: &mut dyn SyncObserver,
    ) -> Result<Vec<KeyOutcome>, SyncError> {
        let mut outcomes = Vec::with_capacity(plan.keys.len());
        for key in &plan.keys {
            let outcome = if dry_run {
                tracing::info!("[dry-run] would delete: {key}");
                KeyOutcome::WouldDelete { key: key.clone() }
            } else {
                self.storage.delete(key.as_str())?;
                tracing::info!("deleted: {key}");
                KeyOutcome::Deleted { key: key.clone() }
            };
            observer.outcome(&outcome);
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Run a full sync: plain uploads, gzip uploads, then deletes.
    pub fn sync(
        &mut self,
        dry_run: bool,
        observer: &mut dyn SyncObserver,
    ) -> Result<SyncReport, SyncError> {
        self.reset();
        let mut report = SyncReport::default();

        observer.phase(Phase::UploadPlain);
        let plan = self.compute_upload_plan(Variant::Plain)?;
        report
            .outcomes
            .extend(self.apply_upload_plan(&plan, dry_run, observer)?);

        if self.config.gzip {
            observer.phase(Phase::UploadGzip);
            let plan = self.compute_upload_plan(Variant::Gzip)?;
            report
                .outcomes
                .extend(self.apply_upload_plan(&plan, dry_run, observer)?);
        }

        observer.phase(Phase::Delete);
        let wanted = self.wanted.clone();
        let plan = compute_delete_plan(&wanted, self.remote_keys()?);
        report
            .outcomes
            .extend(self.apply_delete_plan(&plan, dry_run, observer)?);

        Ok(report)
    }
}

/// `remote - wanted`, de-duplicated and sorted.
pub fn compute_delete_plan(wanted: &BTreeSet<AssetKey>, remote: &BTreeSet<AssetKey>) -> DeletePlan {
    DeletePlan {
        keys: remote.difference(wanted).cloned().collect(),
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::path::PathBuf;

    use tempfile::{NamedTempFile, TempDir, TempPath};

    use crate::compress::GzipCompressor;
    use crate::storage::MemoryStorage;

    use super::*;

    /// Copies the stylesheet verbatim, remembering the temp paths it made.
    #[derive(Default)]
    struct RecordingRewriter {
        made: RefCell<Vec<PathBuf>>,
    }

    impl CssRewriter for RecordingRewriter {
        fn rewrite(&self, path: &Path) -> Result<TempPath, SyncError> {
            let tmp = NamedTempFile::new().map_err(|e| io_err(path, e))?.into_temp_path();
            fs::copy(path, &tmp).map_err(|e| io_err(path, e))?;
            self.made.borrow_mut().push(tmp.to_path_buf());
            Ok(tmp)
        }
    }

    fn public_dir() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("images")).unwrap();
        fs::create_dir_all(dir.path().join("stylesheets")).unwrap();
        fs::write(dir.path().join("images/logo.png"), b"logo-v1").unwrap();
        fs::write(dir.path().join("stylesheets/app.css"), "a{}").unwrap();
        dir
    }

    fn config(dir: &TempDir, gzip: bool) -> Config {
        let mut config = Config::new("bucket", "https://cdn.test");
        config.public_path = dir.path().to_path_buf();
        config.gzip = gzip;
        config
    }

    #[test]
    fn delete_plan_is_set_difference() {
        let wanted: BTreeSet<AssetKey> = ["a", "b"].into_iter().map(AssetKey::from).collect();
        let remote: BTreeSet<AssetKey> = ["b", "c", "d"].into_iter().map(AssetKey::from).collect();
        let plan = compute_delete_plan(&wanted, &remote);
        assert_eq!(plan.keys, vec![AssetKey::from("c"), AssetKey::from("d")]);
    }

    #[test]
    fn trigger_is_memoized_for_the_run() {
        let dir = public_dir();
        let config = config(&dir, false);
        let storage = MemoryStorage::new();
        let css = RecordingRewriter::default();
        let compressor = GzipCompressor::default();
        let mut r = AssetSyncReconciler::new(&config, &storage, &compressor, &css).unwrap();

        assert!(r.rewrite_all_css().unwrap());
        // Remote drift after the snapshot does not change this run's decision.
        let logo = r.keys().asset(&r.keys().root().join("images/logo.png")).unwrap();
        let key = r.keys().key_for(&logo, Variant::Plain).unwrap();
        storage
            .put(
                key.as_str(),
                Vec::new(),
                &ObjectHeaders::for_upload("image/png", Variant::Plain, Utc::now()),
                Acl::PublicRead,
            )
            .unwrap();
        assert!(r.rewrite_all_css().unwrap());

        r.reset();
        assert!(!r.rewrite_all_css().unwrap());
    }

    #[test]
    fn failed_put_still_removes_temp_files() {
        let dir = public_dir();
        let config = config(&dir, true);
        let storage = MemoryStorage::new().failing_puts();
        let css = RecordingRewriter::default();
        let compressor = GzipCompressor::default();
        let mut r = AssetSyncReconciler::new(&config, &storage, &compressor, &css).unwrap();

        let mut plan = r.compute_upload_plan(Variant::Gzip).unwrap();
        assert_eq!(plan.entries.len(), 1, "only the stylesheet is gzip-eligible");
        plan.entries[0].action = Action::Upload;

        let err = r.apply_upload_plan(&plan, false, &mut ()).unwrap_err();
        assert!(matches!(err, SyncError::Storage(_)), "got: {err}");

        let made = css.made.borrow();
        assert_eq!(made.len(), 1);
        assert!(!made[0].exists(), "rewritten temp file must be removed");
    }

    #[test]
    fn upload_headers_follow_extension_and_variant() {
        let dir = public_dir();
        let config = config(&dir, true);
        let storage = MemoryStorage::new();
        let css = RecordingRewriter::default();
        let compressor = GzipCompressor::default();
        let mut r = AssetSyncReconciler::new(&config, &storage, &compressor, &css).unwrap();

        r.sync(false, &mut ()).unwrap();

        for key in storage.keys() {
            let object = storage.get(&key).unwrap();
            assert_eq!(object.acl, Acl::PublicRead);
            assert_eq!(object.headers.cache_control, "max-age=315360000");
            if key.starts_with("gz/") {
                assert_eq!(object.headers.content_encoding.as_deref(), Some("gzip"));
                assert_eq!(object.headers.content_type, "text/css");
                assert_eq!(&object.bytes[..2], &[0x1f, 0x8b]);
            } else if key.ends_with(".png") {
                assert_eq!(object.headers.content_type, "image/png");
                assert_eq!(object.bytes, b"logo-v1");
            } else {
                assert_eq!(object.headers.content_type, "text/css");
                assert!(object.headers.content_encoding.is_none());
            }
        }
        assert_eq!(storage.keys().len(), 3);
    }
}
