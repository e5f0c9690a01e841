//! `assethost key <file>` — show where one asset lives remotely.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;

use assethost_core::{Config, Variant};
use assethost_sync::KeyDeriver;

/// Arguments for `assethost key`.
#[derive(Args, Debug)]
pub struct KeyArgs {
    /// Asset file under the configured public root.
    pub file: PathBuf,
}

impl KeyArgs {
    pub fn run(self, config_path: &Path) -> Result<()> {
        let config = Config::load_at(config_path)
            .with_context(|| format!("failed to load config '{}'", config_path.display()))?;
        let keys = KeyDeriver::from_config(&config);

        let path = self
            .file
            .canonicalize()
            .with_context(|| format!("cannot resolve path '{}'", self.file.display()))?;
        let asset = keys
            .asset(&path)
            .with_context(|| format!("'{}' is not a public asset", self.file.display()))?;

        let plain = keys.key_for(&asset, Variant::Plain)?;
        println!("plain: {plain}");
        if config.gzip_allowed_for_source(&asset.relative) {
            println!("gzip:  {}", keys.key_for(&asset, Variant::Gzip)?);
        }
        println!("url:   {}/{plain}", config.asset_host());
        Ok(())
    }
}
