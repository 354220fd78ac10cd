//! Repository runtime: directory watcher, per-file pipeline, and the
//! [`AlgorithmRepository`] orchestrator.

mod error;
pub mod pipeline;
pub mod repository;
pub mod watcher;

use std::time::Duration;

pub use error::RuntimeError;
pub use pipeline::{FailedFile, LoadSummary, Pipeline, Processed};
pub use repository::AlgorithmRepository;
pub use watcher::{normalize, DirectoryWatcher, WatchEvent, WatchListener, WatcherHandle};

use algorepo_core::{Builder, Loader};

use crate::error::io_err;

/// Install the global `tracing` subscriber on stderr. `RUST_LOG` overrides
/// the default `info` filter. Safe to call more than once.
pub fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Serve `repository` until Ctrl-C or until its watcher stops, then shut it
/// down.
pub fn block_until_interrupted<B, L>(
    mut repository: AlgorithmRepository<B, L>,
) -> Result<(), RuntimeError>
where
    B: Builder + 'static,
    L: Loader + 'static,
{
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| io_err("tokio-runtime", e))?;

    let result = runtime.block_on(async {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);
        let mut interval = tokio::time::interval(Duration::from_secs(1));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                signal = &mut ctrl_c => {
                    return signal
                        .map(|()| tracing::info!("received ctrl-c, shutting down"))
                        .map_err(|e| io_err("ctrl-c handler", e));
                }
                _ = interval.tick() => {
                    if !repository.is_watching() {
                        tracing::warn!("directory watcher is no longer running");
                        return Ok(());
                    }
                }
            }
        }
    });

    repository.shutdown();
    result
}
