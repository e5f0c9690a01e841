//! assethost — sync static assets to a CDN-fronted bucket.
//!
//! # Usage
//!
//! ```text
//! assethost init [--force]
//! assethost sync [--dry-run] [--verbose | --silent]
//! assethost key <file>
//! ```
//!
//! Every subcommand reads `config/assethost.yml` unless `--config` says otherwise.

mod commands;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, EnvFilter};

use assethost_core::config::DEFAULT_CONFIG_PATH;
use commands::{init::InitArgs, key::KeyArgs, sync::SyncArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "assethost",
    version,
    about = "Upload static assets to an S3 bucket behind a CDN",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML config file.
    #[arg(long, short = 'c', global = true, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a starter config file.
    Init(InitArgs),

    /// Upload new assets (plain and gzip) and delete expired keys.
    Sync(SyncArgs),

    /// Print the remote keys and CDN URL for one local asset.
    Key(KeyArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Init(args) => args.run(&cli.config),
        Commands::Sync(args) => args.run(&cli.config),
        Commands::Key(args) => args.run(&cli.config),
    }
}
