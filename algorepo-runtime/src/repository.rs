//! Repository orchestrator: working-copy cycle, initial load, watcher.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use algorepo_core::{
    AlgorithmDescriptor, AlgorithmId, Builder, Loader, Registry, RegistryError, RepositoryConfig,
};
use algorepo_sync::{SyncOutcome, Vcs, WorkingCopyManager};

use crate::error::RuntimeError;
use crate::pipeline::{LoadSummary, Pipeline};
use crate::watcher::{DirectoryWatcher, WatchListener, WatcherHandle};

/// Live registry of algorithms mirrored from a remote repository.
///
/// Construction runs one working-copy cycle, loads every candidate, and
/// starts the directory watcher when the configuration asks for it. After
/// that the watcher is the only writer; queries may come from any thread.
pub struct AlgorithmRepository<B, L>
where
    B: Builder + 'static,
    L: Loader + 'static,
{
    config: RepositoryConfig,
    working_copy: Mutex<WorkingCopyManager>,
    pipeline: Arc<Pipeline<B, L>>,
    outcome: SyncOutcome,
    summary: LoadSummary,
    watcher: Option<WatcherHandle>,
    closed: bool,
}

impl<B, L> AlgorithmRepository<B, L>
where
    B: Builder + 'static,
    L: Loader + 'static,
{
    /// Synchronize, load, and (optionally) start watching.
    ///
    /// Fails with a configuration-class error when the local repository
    /// cannot be opened or created, and with a synchronization-class error
    /// when the clone or pull fails. A conflicted merge is not an error: see
    /// [`Self::is_sync_degraded`].
    pub fn open(
        config: RepositoryConfig,
        vcs: Box<dyn Vcs>,
        builder: B,
        loader: L,
    ) -> Result<Self, RuntimeError> {
        let mut working_copy =
            WorkingCopyManager::new(config.remote.clone(), &config.local_path, vcs);
        let outcome = match working_copy.initialize_or_update() {
            Ok(outcome) => outcome,
            Err(err) => {
                working_copy.shutdown();
                return Err(err.into());
            }
        };

        let registry = Arc::new(Registry::new());
        let pipeline = Arc::new(Pipeline::new(&config, builder, loader, registry));
        pipeline.record_changes(outcome.change_log());

        let summary = match pipeline.load_all(outcome.is_fresh_clone()) {
            Ok(summary) => summary,
            Err(err) => {
                working_copy.shutdown();
                return Err(err);
            }
        };
        tracing::info!(
            root = %pipeline.root().display(),
            head = %outcome.head().short(),
            registered = summary.registered.len(),
            built = summary.built.len(),
            reused = summary.reused.len(),
            failed = summary.failed.len(),
            degraded = outcome.is_degraded(),
            "algorithm repository loaded",
        );

        let watcher = if config.start_watcher {
            match DirectoryWatcher::new(pipeline.root(), Arc::clone(&pipeline)).start() {
                Ok(handle) => Some(handle),
                Err(err) => {
                    pipeline.registry().clear();
                    working_copy.shutdown();
                    return Err(err);
                }
            }
        } else {
            None
        };

        Ok(Self {
            config,
            working_copy: Mutex::new(working_copy),
            pipeline,
            outcome,
            summary,
            watcher,
            closed: false,
        })
    }

    // -----------------------------------------------------------------------
    // Host queries
    // -----------------------------------------------------------------------

    pub fn contains_algorithm(&self, identifier: &str) -> bool {
        self.registry().contains(identifier)
    }

    pub fn get_algorithm(&self, identifier: &str) -> Option<L::Component> {
        self.registry().lookup(identifier)
    }

    pub fn algorithm_names(&self) -> BTreeSet<AlgorithmId> {
        self.registry().identifiers()
    }

    /// Descriptor of `identifier`; unknown identifiers are a caller error.
    pub fn description(&self, identifier: &str) -> Result<AlgorithmDescriptor, RegistryError> {
        self.registry().descriptor(identifier)
    }

    pub fn registry(&self) -> &Arc<Registry<L::Component>> {
        self.pipeline.registry()
    }

    pub fn config(&self) -> &RepositoryConfig {
        &self.config
    }

    /// Resolved working-copy root.
    pub fn root(&self) -> &Path {
        self.pipeline.root()
    }

    // -----------------------------------------------------------------------
    // Status
    // -----------------------------------------------------------------------

    /// Outcome of the startup working-copy cycle.
    pub fn sync_outcome(&self) -> &SyncOutcome {
        &self.outcome
    }

    /// `true` when the startup cycle had to roll back a conflicted merge and
    /// the registry reflects the previous remote state.
    pub fn is_sync_degraded(&self) -> bool {
        self.outcome.is_degraded()
    }

    pub fn load_summary(&self) -> &LoadSummary {
        &self.summary
    }

    pub fn is_watching(&self) -> bool {
        self.watcher.as_ref().is_some_and(WatcherHandle::is_running)
    }

    // -----------------------------------------------------------------------
    // Synthetic events
    // -----------------------------------------------------------------------

    /// Feed a "file added" event through the same path the watcher uses.
    pub fn notify_file_added(&self, path: &Path) -> Result<(), RuntimeError> {
        self.ensure_open()?;
        self.pipeline.file_added(path)
    }

    pub fn notify_file_changed(&self, path: &Path) -> Result<(), RuntimeError> {
        self.ensure_open()?;
        self.pipeline.file_changed(path)
    }

    pub fn notify_file_removed(&self, path: &Path) -> Result<(), RuntimeError> {
        self.ensure_open()?;
        self.pipeline.file_removed(path)
    }

    // -----------------------------------------------------------------------
    // Shutdown
    // -----------------------------------------------------------------------

    /// Stop the watcher, clear the registry and release the working copy.
    /// Idempotent.
    pub fn shutdown(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(mut watcher) = self.watcher.take() {
            watcher.stop();
        }
        self.pipeline.registry().clear();
        self.working_copy
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .shutdown();
        tracing::info!(root = %self.pipeline.root().display(), "algorithm repository shut down");
    }

    fn ensure_open(&self) -> Result<(), RuntimeError> {
        if self.closed {
            Err(RuntimeError::Closed)
        } else {
            Ok(())
        }
    }
}

impl<B, L> Drop for AlgorithmRepository<B, L>
where
    B: Builder + 'static,
    L: Loader + 'static,
{
    fn drop(&mut self) {
        self.shutdown();
    }
}
