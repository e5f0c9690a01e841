//! Local asset discovery.

use walkdir::WalkDir;

use assethost_core::LocalAsset;

use crate::error::SyncError;
use crate::keys::KeyDeriver;

/// Recursively collect regular files under each of `asset_dirs` below the
/// deriver's public root, sorted by relative path.
///
/// Asset directories that do not exist are skipped.
pub fn scan_assets(keys: &KeyDeriver, asset_dirs: &[String]) -> Result<Vec<LocalAsset>, SyncError> {
    let mut assets = Vec::new();
    for dir in asset_dirs {
        let base = keys.root().join(dir);
        if !base.is_dir() {
            tracing::debug!("asset dir missing, skipped: {}", base.display());
            continue;
        }
        for entry in WalkDir::new(&base).follow_links(true) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            assets.push(keys.asset(entry.path())?);
        }
    }
    assets.sort_by(|a, b| a.relative.cmp(&b.relative));
    assets.dedup_by(|a, b| a.relative == b.relative);
    Ok(assets)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::TempDir;

    use super::*;

    fn dirs() -> Vec<String> {
        vec![
            "images".to_string(),
            "javascripts".to_string(),
            "stylesheets".to_string(),
        ]
    }

    #[test]
    fn scans_only_asset_dirs_recursively() {
        let root = TempDir::new().unwrap();
        let p = root.path();
        fs::create_dir_all(p.join("images/icons")).unwrap();
        fs::create_dir_all(p.join("javascripts")).unwrap();
        fs::create_dir_all(p.join("uploads")).unwrap();
        fs::write(p.join("images/icons/a.png"), b"a").unwrap();
        fs::write(p.join("javascripts/app.js"), b"js").unwrap();
        fs::write(p.join("uploads/user.png"), b"u").unwrap();
        fs::write(p.join("index.html"), b"<html>").unwrap();

        let keys = KeyDeriver::new(p, None, "gz");
        let assets = scan_assets(&keys, &dirs()).unwrap();
        let rel: Vec<_> = assets.iter().map(|a| a.relative.as_str()).collect();
        assert_eq!(rel, vec!["/images/icons/a.png", "/javascripts/app.js"]);
    }

    #[test]
    fn empty_root_yields_nothing() {
        let root = TempDir::new().unwrap();
        let keys = KeyDeriver::new(root.path(), None, "gz");
        assert!(scan_assets(&keys, &dirs()).unwrap().is_empty());
    }
}
