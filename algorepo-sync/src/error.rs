//! Error types for algorepo-sync.

use std::path::PathBuf;

use thiserror::Error;

use crate::vcs::HeadId;

/// Failures reported by a [`crate::Vcs`] implementation.
#[derive(Debug, Error)]
pub enum VcsError {
    /// An error from libgit2.
    #[error("git error: {0}")]
    Git(#[from] git2::Error),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// An operation that needs an open repository was called before `open`
    /// or `clone_into`, or after `close`.
    #[error("no repository is open")]
    NotOpen,
}

/// All errors that can arise from a working-copy cycle.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The local repository could not be opened or created.
    #[error("cannot open local repository at {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: VcsError,
    },

    /// The initial clone failed.
    #[error("clone of {url} into {path} failed: {source}")]
    Clone {
        url: String,
        path: PathBuf,
        #[source]
        source: VcsError,
    },

    /// Checkout, pull or diff failed on an existing working copy.
    #[error("update of {path} failed: {source}")]
    Update {
        path: PathBuf,
        #[source]
        source: VcsError,
    },

    /// Restoring the previous head after a conflicted merge failed.
    #[error("rollback to {head} failed: {source}")]
    Rollback {
        head: HeadId,
        #[source]
        source: VcsError,
    },

    /// The working copy has no commit checked out.
    #[error("working copy at {path} has no head commit")]
    NoHead { path: PathBuf },
}

impl SyncError {
    /// `true` for failures caused by the local setup rather than by the
    /// synchronization itself.
    pub fn is_configuration(&self) -> bool {
        matches!(self, SyncError::Open { .. })
    }
}

/// Convenience constructor for [`VcsError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> VcsError {
    VcsError::Io {
        path: path.into(),
        source,
    }
}
