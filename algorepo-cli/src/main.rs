//! algorepo: keep a live algorithm registry in sync with a git repository.
//!
//! # Usage
//!
//! ```text
//! algorepo [--config <path>] sync [--json]
//! algorepo [--config <path>] list [--protocol <version>] [--json]
//! algorepo [--config <path>] watch
//! ```
//!
//! Without `--config`, settings are read from `~/.algorepo/repository.yaml`.

mod commands;
mod host;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{list::ListArgs, sync::SyncArgs, watch::WatchArgs};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "algorepo",
    version,
    about = "Mirror a git repository of algorithms into a live registry",
    long_about = None,
)]
struct Cli {
    /// Repository configuration file (default: ~/.algorepo/repository.yaml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Clone or update the working copy and load every algorithm once.
    Sync(SyncArgs),

    /// List registered algorithms and their descriptors.
    List(ListArgs),

    /// Load, then keep the registry updated from working-copy changes until Ctrl-C.
    Watch(WatchArgs),
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    algorepo_runtime::init_tracing();
    let config = cli.config.as_deref();
    match cli.command {
        Commands::Sync(args) => args.run(config),
        Commands::List(args) => args.run(config),
        Commands::Watch(args) => args.run(config),
    }
}
