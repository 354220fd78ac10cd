use std::path::PathBuf;

use thiserror::Error;

use algorepo_core::{BuildError, ConfigError, LoadError, RegistryError};
use algorepo_detector::DetectError;
use algorepo_sync::SyncError;

/// Error surface for the repository orchestrator, pipeline and watcher.
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    /// The local working copy could not be opened or created.
    #[error("local repository error: {0}")]
    LocalRepository(#[source] SyncError),

    /// Clone, pull or rollback failed.
    #[error("synchronization error: {0}")]
    Sync(#[source] SyncError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("cannot classify source: {0}")]
    Detect(#[from] DetectError),

    #[error("build failed: {0}")]
    Build(#[from] BuildError),

    #[error("load failed: {0}")]
    Load(#[from] LoadError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("{path} has no usable file name")]
    InvalidFileName { path: PathBuf },

    #[error("repository has been shut down")]
    Closed,
}

impl RuntimeError {
    /// Fatal at construction: the settings or the local directory are unusable.
    pub fn is_configuration(&self) -> bool {
        matches!(self, RuntimeError::Config(_) | RuntimeError::LocalRepository(_))
    }

    /// Fatal at construction: the remote state could not be mirrored.
    pub fn is_synchronization(&self) -> bool {
        matches!(self, RuntimeError::Sync(_))
    }
}

impl From<SyncError> for RuntimeError {
    fn from(err: SyncError) -> Self {
        if err.is_configuration() {
            RuntimeError::LocalRepository(err)
        } else {
            RuntimeError::Sync(err)
        }
    }
}

pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> RuntimeError {
    RuntimeError::Io {
        path: path.into(),
        source,
    }
}
