//! Working-copy lifecycle: clone on first use, branch-aware pull afterwards,
//! rollback to the previous head when a merge conflicts.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use algorepo_core::config::RemoteSource;
use algorepo_core::types::ChangeLog;

use crate::error::{io_err, SyncError};
use crate::vcs::{HeadId, PullOutcome, Vcs};

/// What one `initialize_or_update` cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// No working copy existed; the branch was cloned.
    Cloned { head: HeadId },
    /// The remote had nothing new.
    UpToDate { head: HeadId },
    /// The working copy advanced from `from` to `to`.
    Updated {
        from: HeadId,
        to: HeadId,
        changes: ChangeLog,
    },
    /// The merge conflicted and the working copy was reset to `head`.
    RolledBack { head: HeadId, conflicts: Vec<PathBuf> },
}

impl SyncOutcome {
    /// Change log of the cycle. Empty for everything but `Updated`.
    pub fn change_log(&self) -> ChangeLog {
        match self {
            SyncOutcome::Updated { changes, .. } => changes.clone(),
            _ => ChangeLog::new(),
        }
    }

    /// A fresh clone requires every candidate to be built.
    pub fn is_fresh_clone(&self) -> bool {
        matches!(self, SyncOutcome::Cloned { .. })
    }

    /// `true` when the remote state could not be applied.
    pub fn is_degraded(&self) -> bool {
        matches!(self, SyncOutcome::RolledBack { .. })
    }

    pub fn head(&self) -> &HeadId {
        match self {
            SyncOutcome::Cloned { head }
            | SyncOutcome::UpToDate { head }
            | SyncOutcome::RolledBack { head, .. } => head,
            SyncOutcome::Updated { to, .. } => to,
        }
    }
}

/// Owns the on-disk mirror of the remote source.
pub struct WorkingCopyManager {
    remote: RemoteSource,
    root: PathBuf,
    vcs: Box<dyn Vcs>,
    head: Option<HeadId>,
}

impl std::fmt::Debug for WorkingCopyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkingCopyManager")
            .field("url", &self.remote.url)
            .field("branch", &self.remote.branch)
            .field("root", &self.root)
            .field("head", &self.head)
            .finish()
    }
}

impl WorkingCopyManager {
    pub fn new(remote: RemoteSource, root: impl Into<PathBuf>, vcs: Box<dyn Vcs>) -> Self {
        Self {
            remote,
            root: root.into(),
            vcs,
            head: None,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Head after the last successful cycle.
    pub fn head(&self) -> Option<&HeadId> {
        self.head.as_ref()
    }

    /// Clone if there is no working copy yet, otherwise check out the
    /// configured branch and pull it.
    ///
    /// A conflicted merge is not an error: the working copy is reset to the
    /// head it had before the pull and `SyncOutcome::RolledBack` is returned.
    pub fn initialize_or_update(&mut self) -> Result<SyncOutcome, SyncError> {
        let outcome = if self.vcs.is_repository(&self.root) {
            self.update()?
        } else {
            self.clone_fresh()?
        };
        self.head = Some(outcome.head().clone());
        Ok(outcome)
    }

    /// Release the repository handle. Safe to call repeatedly, and after a
    /// failed initialization.
    pub fn shutdown(&mut self) {
        self.vcs.close();
    }

    fn clone_fresh(&mut self) -> Result<SyncOutcome, SyncError> {
        std::fs::create_dir_all(&self.root).map_err(|e| SyncError::Open {
            path: self.root.clone(),
            source: io_err(&self.root, e),
        })?;

        info!(
            "cloning {} (branch {}) into {}",
            self.remote.url,
            self.remote.branch,
            self.root.display()
        );
        self.vcs
            .clone_into(&self.remote.url, &self.remote.branch, &self.root)
            .map_err(|source| SyncError::Clone {
                url: self.remote.url.clone(),
                path: self.root.clone(),
                source,
            })?;

        let head = self.require_head()?;
        info!("cloned {} at {}", self.remote.url, head.short());
        Ok(SyncOutcome::Cloned { head })
    }

    fn update(&mut self) -> Result<SyncOutcome, SyncError> {
        self.vcs.open(&self.root).map_err(|source| SyncError::Open {
            path: self.root.clone(),
            source,
        })?;

        let branch = self.remote.branch.clone();
        self.vcs
            .checkout(&branch)
            .map_err(|source| self.update_err(source))?;
        let before = self.require_head()?;

        let pulled = self
            .vcs
            .pull(&branch)
            .map_err(|source| self.update_err(source))?;

        match pulled {
            PullOutcome::UpToDate => {
                info!("{} is up to date at {}", self.root.display(), before.short());
                Ok(SyncOutcome::UpToDate { head: before })
            }
            PullOutcome::Merged => {
                let after = self.require_head()?;
                let changes = self
                    .vcs
                    .diff(&before, &after)
                    .map_err(|source| self.update_err(source))?;
                info!(
                    "updated {} from {} to {}: {} change(s)",
                    self.root.display(),
                    before.short(),
                    after.short(),
                    changes.len()
                );
                Ok(SyncOutcome::Updated {
                    from: before,
                    to: after,
                    changes,
                })
            }
            PullOutcome::Conflict { paths } => {
                let listed = paths
                    .iter()
                    .map(|p| p.display().to_string())
                    .collect::<Vec<_>>()
                    .join(", ");
                warn!(
                    "merge of {}/{} conflicted in {} file(s): {listed}; resetting to {}",
                    self.remote.url,
                    branch,
                    paths.len(),
                    before.short()
                );
                self.vcs
                    .reset_hard(&before)
                    .map_err(|source| SyncError::Rollback {
                        head: before.clone(),
                        source,
                    })?;
                Ok(SyncOutcome::RolledBack {
                    head: before,
                    conflicts: paths,
                })
            }
        }
    }

    fn require_head(&self) -> Result<HeadId, SyncError> {
        self.vcs
            .current_head()
            .map_err(|source| self.update_err(source))?
            .ok_or_else(|| SyncError::NoHead {
                path: self.root.clone(),
            })
    }

    fn update_err(&self, source: crate::error::VcsError) -> SyncError {
        SyncError::Update {
            path: self.root.clone(),
            source,
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
