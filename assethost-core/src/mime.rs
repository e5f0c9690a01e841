//! Extension → MIME type lookup.
//!
//! The built-in table is stored as `MIME type → [extensions]` YAML and
//! inverted on load; config overrides are applied on top.

use std::collections::{BTreeMap, HashMap};

use crate::error::ConfigError;

/// Served when an extension is unknown.
pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

const BUILTIN: &str = include_str!("mime_types.yml");

#[derive(Debug, Clone, Default)]
pub struct MimeTable {
    by_extension: HashMap<String, String>,
}

impl MimeTable {
    /// Parse a `MIME type → [extensions]` YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let grouped: BTreeMap<String, Vec<String>> =
            serde_yaml::from_str(yaml).map_err(ConfigError::MimeTable)?;
        let by_extension = grouped
            .into_iter()
            .flat_map(|(mime, exts)| {
                exts.into_iter()
                    .map(move |ext| (ext.to_ascii_lowercase(), mime.clone()))
            })
            .collect();
        Ok(Self { by_extension })
    }

    /// The built-in table.
    pub fn builtin() -> Result<Self, ConfigError> {
        Self::from_yaml(BUILTIN)
    }

    /// Built-in table with `overrides` (extension → MIME type) applied.
    pub fn with_overrides(overrides: &BTreeMap<String, String>) -> Result<Self, ConfigError> {
        let mut table = Self::builtin()?;
        for (ext, mime) in overrides {
            table
                .by_extension
                .insert(ext.trim_start_matches('.').to_ascii_lowercase(), mime.clone());
        }
        Ok(table)
    }

    /// MIME type for `extension`, or [`DEFAULT_MIME_TYPE`].
    pub fn lookup(&self, extension: Option<&str>) -> &str {
        extension
            .and_then(|ext| self.by_extension.get(&ext.to_ascii_lowercase()))
            .map(String::as_str)
            .unwrap_or(DEFAULT_MIME_TYPE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_covers_web_assets() {
        let table = MimeTable::builtin().unwrap();
        assert_eq!(table.lookup(Some("css")), "text/css");
        assert_eq!(table.lookup(Some("js")), "application/javascript");
        assert_eq!(table.lookup(Some("JPEG")), "image/jpeg");
    }

    #[test]
    fn unknown_or_missing_extension_falls_back() {
        let table = MimeTable::builtin().unwrap();
        assert_eq!(table.lookup(Some("xyz")), DEFAULT_MIME_TYPE);
        assert_eq!(table.lookup(None), DEFAULT_MIME_TYPE);
    }

    #[test]
    fn overrides_win() {
        let mut overrides = BTreeMap::new();
        overrides.insert(".JS".to_string(), "text/javascript".to_string());
        overrides.insert("avif".to_string(), "image/avif".to_string());
        let table = MimeTable::with_overrides(&overrides).unwrap();
        assert_eq!(table.lookup(Some("js")), "text/javascript");
        assert_eq!(table.lookup(Some("avif")), "image/avif");
    }

    #[test]
    fn malformed_yaml_is_an_error() {
        let err = MimeTable::from_yaml("- not\n- a map\n").unwrap_err();
        assert!(matches!(err, ConfigError::MimeTable(_)));
    }
}
