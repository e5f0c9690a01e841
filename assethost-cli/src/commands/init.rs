//! `assethost init [--force]`

use std::path::Path;

use anyhow::{bail, Context, Result};
use clap::Args;

use assethost_core::config::TEMPLATE;

/// Write a starter config file.
#[derive(Args, Debug)]
pub struct InitArgs {
    /// Overwrite an existing config file.
    #[arg(long)]
    pub force: bool,
}

impl InitArgs {
    pub fn run(self, config_path: &Path) -> Result<()> {
        if config_path.exists() && !self.force {
            bail!(
                "config already exists at '{}'; pass --force to overwrite",
                config_path.display()
            );
        }
        if let Some(parent) = config_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("cannot create '{}'", parent.display()))?;
        }
        std::fs::write(config_path, TEMPLATE)
            .with_context(|| format!("cannot write '{}'", config_path.display()))?;

        println!("✓ Wrote {}", config_path.display());
        println!("  Set `bucket` and `asset_host`, then run `assethost sync --dry-run`.");
        Ok(())
    }
}
