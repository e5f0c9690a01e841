//! # assethost-sync
//!
//! Reconciles a local static-asset tree with an object-storage bucket.
//!
//! Build an [`AssetSyncReconciler`] from a [`Config`](assethost_core::Config)
//! and the three collaborators ([`Storage`], [`Compressor`], [`CssRewriter`]),
//! then call [`AssetSyncReconciler::sync`].

pub mod compress;
pub mod css;
pub mod error;
pub mod keys;
pub mod pipeline;
pub mod reconciler;
pub mod s3;
pub mod scan;
pub mod storage;

pub use compress::{Compressor, GzipCompressor};
pub use css::{CssRewriter, FingerprintCssRewriter};
pub use error::{StorageError, SyncError};
pub use keys::KeyDeriver;
pub use reconciler::{
    compute_delete_plan, Action, AssetSyncReconciler, DeletePlan, KeyOutcome, Phase,
    PlannedUpload, SyncObserver, SyncReport, UploadPlan,
};
pub use s3::S3Storage;
pub use storage::{Acl, MemoryStorage, ObjectHeaders, Storage};
