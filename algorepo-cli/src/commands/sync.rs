//! `algorepo sync`: run one working-copy cycle and load every algorithm.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use algorepo_core::ChangeLog;
use algorepo_runtime::LoadSummary;
use algorepo_sync::SyncOutcome;

use crate::host::Settings;

/// Arguments for `algorepo sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl SyncArgs {
    pub fn run(self, config: Option<&Path>) -> Result<()> {
        let settings = Settings::load(config)?;
        let url = settings.repository.remote.url.clone();
        let branch = settings.repository.remote.branch.clone();
        let repository = settings.open(false)?;

        let outcome = repository.sync_outcome();
        let summary = repository.load_summary();
        if self.json {
            let report = SyncReport::new(outcome, summary);
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize sync JSON")?
            );
            return Ok(());
        }

        print_outcome(&url, &branch, repository.root(), outcome);
        print_summary(summary);
        Ok(())
    }
}

#[derive(Serialize)]
struct SyncReport<'a> {
    outcome: &'static str,
    head: String,
    changes: ChangeLog,
    conflicts: Vec<PathBuf>,
    summary: &'a LoadSummary,
}

impl<'a> SyncReport<'a> {
    fn new(outcome: &SyncOutcome, summary: &'a LoadSummary) -> Self {
        let conflicts = match outcome {
            SyncOutcome::RolledBack { conflicts, .. } => conflicts.clone(),
            _ => Vec::new(),
        };
        Self {
            outcome: outcome_key(outcome),
            head: outcome.head().to_string(),
            changes: outcome.change_log(),
            conflicts,
            summary,
        }
    }
}

fn outcome_key(outcome: &SyncOutcome) -> &'static str {
    match outcome {
        SyncOutcome::Cloned { .. } => "cloned",
        SyncOutcome::UpToDate { .. } => "up_to_date",
        SyncOutcome::Updated { .. } => "updated",
        SyncOutcome::RolledBack { .. } => "rolled_back",
    }
}

fn print_outcome(url: &str, branch: &str, root: &Path, outcome: &SyncOutcome) {
    match outcome {
        SyncOutcome::Cloned { head } => {
            println!("✓ cloned {url} ({branch}) into {} at {}", root.display(), head.short());
        }
        SyncOutcome::UpToDate { head } => {
            println!("✓ {} up to date at {}", root.display(), head.short());
        }
        SyncOutcome::Updated { from, to, changes } => {
            println!(
                "✓ {} updated {} → {} ({} changes)",
                root.display(),
                from.short(),
                to.short(),
                changes.len()
            );
            for entry in changes.entries() {
                if let Some(path) = entry.new_path.as_ref().or(entry.old_path.as_ref()) {
                    println!("  {:<8} {}", entry.kind.to_string(), path.display());
                }
            }
        }
        SyncOutcome::RolledBack { head, conflicts } => {
            let files: Vec<String> = conflicts.iter().map(|p| p.display().to_string()).collect();
            println!(
                "{}",
                format!(
                    "⚠ merge with {url} ({branch}) conflicted in {}; kept {}",
                    files.join(", "),
                    head.short()
                )
                .yellow()
            );
        }
    }
}

fn print_summary(summary: &LoadSummary) {
    println!(
        "  {} registered, {} built, {} reused, {} failed",
        summary.registered.len(),
        summary.built.len(),
        summary.reused.len(),
        summary.failed.len()
    );
    for failed in &summary.failed {
        println!(
            "  {} {}: {}",
            "✗".red(),
            failed.path.display(),
            failed.error.red()
        );
    }
}
