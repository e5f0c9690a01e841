//! YAML configuration for a sync run.
//!
//! # File layout
//!
//! ```text
//! <project>/
//!   config/
//!     assethost.yml   (bucket, credentials, prefixes, asset layout)
//!   public/
//!     images/ javascripts/ stylesheets/
//! ```
//!
//! Every field except `bucket` and `asset_host` has a default, so a minimal
//! file is two lines long.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::extension_of;

/// Default location of the config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "config/assethost.yml";

/// Commented template written by `assethost init`.
pub const TEMPLATE: &str = r#"# assethost configuration
#
# Bucket settings such as server access logging are left untouched;
# manage them outside assethost.
bucket: my-assets
asset_host: https://d1234abcd.cloudfront.net
region: us-east-1
# endpoint: https://s3.example.internal   # S3-compatible stores only
# access_key_id: AKIA...                  # omit both to use the AWS credential chain
# secret_access_key: ...
public_path: public
# key_prefix: assets                      # unset: every key in the bucket is managed
gzip: true
gzip_prefix: gz
gzip_extensions: [js, css]
image_extensions: [png, jpg, jpeg, gif, ico, bmp, webp, svg]
asset_dirs: [images, javascripts, stylesheets]
mime_types: {}
"#;

/// Static credentials for the storage backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
}

/// Everything a sync run needs to know, loaded from YAML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub bucket: String,
    /// CDN origin used when rewriting stylesheet references.
    pub asset_host: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub endpoint: Option<String>,
    #[serde(default)]
    pub access_key_id: Option<String>,
    #[serde(default)]
    pub secret_access_key: Option<String>,
    #[serde(default = "default_public_path")]
    pub public_path: PathBuf,
    /// Prefix for plain-variant keys. `None` (or empty) puts them at the bucket root.
    #[serde(default)]
    pub key_prefix: Option<String>,
    #[serde(default = "default_true")]
    pub gzip: bool,
    #[serde(default = "default_gzip_prefix")]
    pub gzip_prefix: String,
    #[serde(default = "default_gzip_extensions")]
    pub gzip_extensions: Vec<String>,
    #[serde(default = "default_image_extensions")]
    pub image_extensions: Vec<String>,
    #[serde(default = "default_asset_dirs")]
    pub asset_dirs: Vec<String>,
    /// Extension -> MIME type overrides on top of the built-in table.
    #[serde(default)]
    pub mime_types: BTreeMap<String, String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_public_path() -> PathBuf {
    PathBuf::from("public")
}

fn default_true() -> bool {
    true
}

fn default_gzip_prefix() -> String {
    "gz".to_string()
}

fn default_gzip_extensions() -> Vec<String> {
    vec!["js".to_string(), "css".to_string()]
}

fn default_image_extensions() -> Vec<String> {
    ["png", "jpg", "jpeg", "gif", "ico", "bmp", "webp", "svg"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_asset_dirs() -> Vec<String> {
    ["images", "javascripts", "stylesheets"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

impl Config {
    /// A config with every default applied.
    pub fn new(bucket: impl Into<String>, asset_host: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            asset_host: asset_host.into(),
            region: default_region(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            public_path: default_public_path(),
            key_prefix: None,
            gzip: true,
            gzip_prefix: default_gzip_prefix(),
            gzip_extensions: default_gzip_extensions(),
            image_extensions: default_image_extensions(),
            asset_dirs: default_asset_dirs(),
            mime_types: BTreeMap::new(),
        }
    }

    /// Load and validate the config at `path`.
    ///
    /// Returns `ConfigError::NotFound` if absent,
    /// `ConfigError::Parse` (with path + line context) if malformed YAML,
    /// `ConfigError::Invalid` if a field fails validation.
    pub fn load_at(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.to_path_buf(),
            });
        }
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants key derivation and the storage client rely on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket.trim().is_empty() {
            return Err(ConfigError::invalid("bucket", "must not be empty"));
        }
        if self.asset_host.trim().is_empty() {
            return Err(ConfigError::invalid("asset_host", "must not be empty"));
        }
        if let Some(prefix) = self.plain_prefix() {
            check_prefix("key_prefix", prefix)?;
        }
        if self.gzip {
            if self.gzip_prefix.is_empty() {
                return Err(ConfigError::invalid(
                    "gzip_prefix",
                    "must not be empty when gzip is enabled",
                ));
            }
            check_prefix("gzip_prefix", &self.gzip_prefix)?;
            if self.plain_prefix() == Some(self.gzip_prefix.as_str()) {
                return Err(ConfigError::invalid(
                    "gzip_prefix",
                    "must differ from key_prefix",
                ));
            }
        }
        match (&self.access_key_id, &self.secret_access_key) {
            (Some(_), None) => Err(ConfigError::invalid(
                "secret_access_key",
                "required when access_key_id is set",
            )),
            (None, Some(_)) => Err(ConfigError::invalid(
                "access_key_id",
                "required when secret_access_key is set",
            )),
            _ => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    /// The plain-variant prefix; an empty string counts as no prefix.
    pub fn plain_prefix(&self) -> Option<&str> {
        self.key_prefix.as_deref().filter(|p| !p.is_empty())
    }

    /// Static credentials, when both halves are configured.
    pub fn credentials(&self) -> Option<Credentials> {
        match (&self.access_key_id, &self.secret_access_key) {
            (Some(id), Some(secret)) => Some(Credentials {
                access_key_id: id.clone(),
                secret_access_key: secret.clone(),
            }),
            _ => None,
        }
    }

    /// The asset host without a trailing slash.
    pub fn asset_host(&self) -> &str {
        self.asset_host.trim_end_matches('/')
    }

    // -----------------------------------------------------------------------
    // Classification
    // -----------------------------------------------------------------------

    pub fn is_css(&self, path: &Path) -> bool {
        extension_of(path).as_deref() == Some("css")
    }

    pub fn is_image(&self, path: &Path) -> bool {
        extension_in(path, &self.image_extensions)
    }

    /// Whether a gzip variant should exist for `relative` (a public-root path).
    pub fn gzip_allowed_for_source(&self, relative: &str) -> bool {
        self.gzip && extension_in(Path::new(relative), &self.gzip_extensions)
    }
}

fn extension_in(path: &Path, allowed: &[String]) -> bool {
    match extension_of(path) {
        Some(ext) => allowed.iter().any(|a| a.eq_ignore_ascii_case(&ext)),
        None => false,
    }
}

fn check_prefix(field: &'static str, prefix: &str) -> Result<(), ConfigError> {
    if prefix.starts_with('/') || prefix.ends_with('/') {
        return Err(ConfigError::invalid(
            field,
            format!("'{prefix}' must not start or end with '/'"),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> Config {
        Config::new("my-assets", "https://cdn.example.com/")
    }

    #[test]
    fn template_parses_and_validates() {
        let parsed: Config = serde_yaml::from_str(TEMPLATE).unwrap();
        parsed.validate().unwrap();
        assert_eq!(parsed.bucket, "my-assets");
        assert_eq!(parsed.gzip_prefix, "gz");
        assert!(parsed.plain_prefix().is_none());
        assert!(TEMPLATE.contains("access logging are left untouched"));
    }

    #[test]
    fn minimal_yaml_applies_defaults() {
        let parsed: Config =
            serde_yaml::from_str("bucket: b\nasset_host: https://cdn\n").unwrap();
        assert_eq!(parsed, Config::new("b", "https://cdn"));
    }

    #[test]
    fn asset_host_drops_trailing_slash() {
        assert_eq!(config().asset_host(), "https://cdn.example.com");
    }

    #[test]
    fn empty_key_prefix_is_no_prefix() {
        let mut c = config();
        c.key_prefix = Some(String::new());
        assert!(c.plain_prefix().is_none());
        c.validate().unwrap();
    }

    #[test]
    fn slashed_prefix_is_rejected() {
        let mut c = config();
        c.key_prefix = Some("assets/".to_string());
        let err = c.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "key_prefix", .. }));
    }

    #[test]
    fn gzip_prefix_equal_to_key_prefix_is_rejected() {
        let mut c = config();
        c.key_prefix = Some("gz".to_string());
        let err = c.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "gzip_prefix", .. }));
    }

    #[test]
    fn half_credentials_are_rejected() {
        let mut c = config();
        c.access_key_id = Some("AKIA".to_string());
        assert!(c.validate().is_err());
        c.secret_access_key = Some("s3cr3t".to_string());
        c.validate().unwrap();
        assert_eq!(c.credentials().unwrap().access_key_id, "AKIA");
    }

    #[test]
    fn classification_is_case_insensitive() {
        let c = config();
        assert!(c.is_css(Path::new("stylesheets/App.CSS")));
        assert!(c.is_image(Path::new("images/logo.PNG")));
        assert!(!c.is_image(Path::new("javascripts/app.js")));
    }

    #[test]
    fn gzip_allowed_follows_extensions_and_switch() {
        let mut c = config();
        assert!(c.gzip_allowed_for_source("/javascripts/app.js"));
        assert!(!c.gzip_allowed_for_source("/images/logo.png"));
        c.gzip = false;
        assert!(!c.gzip_allowed_for_source("/javascripts/app.js"));
    }
}
