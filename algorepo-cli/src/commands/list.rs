//! `algorepo list`: registered algorithms and their descriptors.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use algorepo_core::{AlgorithmDescriptor, RegisteredAlgorithm};

use crate::host::Settings;

/// Arguments for `algorepo list`.
#[derive(Args, Debug)]
pub struct ListArgs {
    /// Only list algorithms describable for this protocol version.
    #[arg(long, value_name = "VERSION")]
    pub protocol: Option<String>,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl ListArgs {
    pub fn run(self, config: Option<&Path>) -> Result<()> {
        let repository = Settings::load(config)?.open(false)?;
        let root = repository.root().to_path_buf();

        let mut entries: Vec<RegisteredAlgorithm<_>> = repository
            .algorithm_names()
            .iter()
            .filter_map(|id| repository.registry().entry(id.as_str()))
            .collect();
        if let Some(version) = self.protocol.as_ref() {
            entries.retain(|e| e.descriptor.supports_any(std::slice::from_ref(version)));
        }

        if self.json {
            let payload: Vec<ListEntryJson<'_>> = entries
                .iter()
                .map(|e| ListEntryJson {
                    source: relative(&root, &e.source),
                    registered_at: e.registered_at.to_rfc3339(),
                    descriptor: &e.descriptor,
                })
                .collect();
            println!(
                "{}",
                serde_json::to_string_pretty(&payload).context("failed to serialize list JSON")?
            );
            return Ok(());
        }

        if repository.is_sync_degraded() {
            println!(
                "{}",
                "⚠ last update conflicted; listing the previous remote state".yellow()
            );
        }
        if entries.is_empty() {
            println!("No algorithms registered.");
            return Ok(());
        }

        let rows: Vec<ListTableRow> = entries
            .iter()
            .map(|e| ListTableRow {
                identifier: e.identifier.to_string(),
                title: e.descriptor.title.clone().unwrap_or_default(),
                versions: e.descriptor.versions.join(", "),
                source: relative(&root, &e.source),
                registered: e.registered_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}

#[derive(Serialize)]
struct ListEntryJson<'a> {
    #[serde(flatten)]
    descriptor: &'a AlgorithmDescriptor,
    source: String,
    registered_at: String,
}

#[derive(Tabled)]
struct ListTableRow {
    #[tabled(rename = "identifier")]
    identifier: String,
    #[tabled(rename = "title")]
    title: String,
    #[tabled(rename = "versions")]
    versions: String,
    #[tabled(rename = "source")]
    source: String,
    #[tabled(rename = "registered")]
    registered: String,
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .display()
        .to_string()
}
