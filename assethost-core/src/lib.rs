//! assethost core library — configuration, MIME table, domain types, errors.
//!
//! - [`types`] — [`AssetKey`], [`Variant`], [`LocalAsset`]
//! - [`config`] — YAML [`Config`] load / validate / classification
//! - [`mime`] — extension → MIME lookup
//! - [`error`] — [`ConfigError`]

pub mod config;
pub mod error;
pub mod mime;
pub mod types;

pub use config::{Config, Credentials};
pub use error::ConfigError;
pub use mime::MimeTable;
pub use types::{AssetKey, LocalAsset, Variant};
