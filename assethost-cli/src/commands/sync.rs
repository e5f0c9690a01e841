//! `assethost sync` — upload new assets and delete expired keys.

use std::io::{self, Write};
use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use assethost_core::Config;
use assethost_sync::{pipeline, KeyOutcome, Phase, SyncObserver, SyncReport};

/// Arguments for `assethost sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Show what would be uploaded and deleted without touching the bucket.
    #[arg(long)]
    pub dry_run: bool,

    /// Print one line per key: `+` upload, `=` unchanged, `-` delete.
    #[arg(long, short = 'v')]
    pub verbose: bool,

    /// Print nothing; overrides `--verbose`.
    #[arg(long, short = 's')]
    pub silent: bool,
}

impl SyncArgs {
    pub fn run(self, config_path: &Path) -> Result<()> {
        let config = Config::load_at(config_path)
            .with_context(|| format!("failed to load config '{}'", config_path.display()))?;

        let mut printer = Printer::new(io::stdout(), self.verbose, self.silent);
        let report = pipeline::run(&config, self.dry_run, &mut printer)
            .with_context(|| format!("sync to bucket '{}' failed", config.bucket))?;

        printer
            .summary(&report, self.dry_run)
            .context("failed to write summary")?;
        Ok(())
    }
}

/// Streams per-key lines as the run progresses.
struct Printer<W: Write> {
    out: W,
    verbose: bool,
    silent: bool,
}

impl<W: Write> Printer<W> {
    /// `silent` wins over `verbose`.
    fn new(out: W, verbose: bool, silent: bool) -> Self {
        Self {
            out,
            verbose: verbose && !silent,
            silent,
        }
    }

    fn summary(&mut self, report: &SyncReport, dry_run: bool) -> io::Result<()> {
        if self.silent {
            return Ok(());
        }
        let prefix = if dry_run { "[dry-run] " } else { "" };
        if report.uploaded() == 0 && report.deleted() == 0 {
            return writeln!(
                self.out,
                "{prefix}✓ bucket up to date, nothing to do ({} unchanged)",
                report.unchanged()
            );
        }
        writeln!(
            self.out,
            "{prefix}✓ synced ({} uploaded, {} unchanged, {} deleted)",
            report.uploaded(),
            report.unchanged(),
            report.deleted()
        )
    }
}

impl<W: Write> SyncObserver for Printer<W> {
    fn phase(&mut self, phase: Phase) {
        if !self.verbose {
            return;
        }
        let title = match phase {
            Phase::UploadPlain => "Updating uncompressed files",
            Phase::UploadGzip => "Updating compressed files",
            Phase::Delete => "Removing expired files",
        };
        let _ = writeln!(self.out, "-- {title}");
    }

    fn outcome(&mut self, outcome: &KeyOutcome) {
        if !self.verbose {
            return;
        }
        let mark = outcome.mark().to_string();
        let mark = match outcome.mark() {
            '+' => mark.green(),
            '-' => mark.red(),
            _ => mark.dimmed(),
        };
        let _ = writeln!(self.out, "{mark} {}", outcome.key());
    }
}
