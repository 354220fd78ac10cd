//! `algorepo watch`: keep the registry live until interrupted.

use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;

use algorepo_runtime::block_until_interrupted;

use crate::host::Settings;

/// Arguments for `algorepo watch`.
#[derive(Args, Debug)]
pub struct WatchArgs {}

impl WatchArgs {
    pub fn run(self, config: Option<&Path>) -> Result<()> {
        let repository = Settings::load(config)?.open(true)?;
        println!(
            "✓ watching {} ({} algorithms); press Ctrl-C to stop",
            repository.root().display(),
            repository.algorithm_names().len()
        );
        block_until_interrupted(repository).context("watch loop failed")
    }
}
