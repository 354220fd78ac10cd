//! Version-control capability and its libgit2 implementation.
//!
//! The working-copy manager only talks to the [`Vcs`] trait, so tests can
//! drive it with a scripted fake. [`GitVcs`] is the production backend.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use git2::build::{CheckoutBuilder, RepoBuilder};
use git2::{
    BranchType, Delta, DiffFindOptions, ErrorCode, FetchOptions, Oid, RemoteCallbacks,
    Repository, ResetType, Signature,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use algorepo_core::types::{ChangeEntry, ChangeLog};

use crate::error::{io_err, VcsError};

const REMOTE_NAME: &str = "origin";

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Commit identifier of a working-copy head, as a hex string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct HeadId(pub String);

impl HeadId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First seven characters, for log lines.
    pub fn short(&self) -> &str {
        self.0.get(..7).unwrap_or(&self.0)
    }
}

impl fmt::Display for HeadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Oid> for HeadId {
    fn from(oid: Oid) -> Self {
        HeadId(oid.to_string())
    }
}

/// Result of pulling the configured branch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PullOutcome {
    /// The remote had nothing new.
    UpToDate,
    /// The remote state was fast-forwarded or merged cleanly.
    Merged,
    /// The merge stopped on conflicts; the working copy is left mid-merge.
    Conflict { paths: Vec<PathBuf> },
}

/// Line-oriented sink for transport progress. Observational only.
pub trait ProgressSink: Send + Sync {
    fn line(&self, line: &str);
}

/// Default sink: forwards every line to the `debug` log level.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn line(&self, line: &str) {
        debug!("remote: {line}");
    }
}

/// Operations the working-copy manager needs from a version-control system.
///
/// Everything except `is_repository`, `open` and `clone_into` acts on the
/// repository opened (or cloned) last.
pub trait Vcs: Send {
    /// `true` if `path` already holds a repository.
    fn is_repository(&self, path: &Path) -> bool;

    fn open(&mut self, path: &Path) -> Result<(), VcsError>;

    /// Clone `url` at `branch` into `path` and keep the result open.
    fn clone_into(&mut self, url: &str, branch: &str, path: &Path) -> Result<(), VcsError>;

    /// Check out the local `branch`, creating it from the remote one if needed.
    fn checkout(&mut self, branch: &str) -> Result<(), VcsError>;

    /// Fetch `branch` from the remote and merge it into the current branch.
    ///
    /// Callers must ensure the current branch has a commit; an unborn head
    /// is reported as a synchronization error before this is reached.
    fn pull(&mut self, branch: &str) -> Result<PullOutcome, VcsError>;

    /// Entries that differ between the trees of `old` and `new`, with paths
    /// relative to the working-copy root.
    fn diff(&self, old: &HeadId, new: &HeadId) -> Result<ChangeLog, VcsError>;

    /// Discard all local state and move the current branch to `head`.
    fn reset_hard(&mut self, head: &HeadId) -> Result<(), VcsError>;

    /// Head commit, or `None` while the branch is unborn.
    fn current_head(&self) -> Result<Option<HeadId>, VcsError>;

    /// Release the repository handle. Calling it twice is harmless.
    fn close(&mut self);
}

// ---------------------------------------------------------------------------
// libgit2 backend
// ---------------------------------------------------------------------------

/// [`Vcs`] backed by libgit2.
pub struct GitVcs {
    repo: Option<Repository>,
    progress: Arc<dyn ProgressSink>,
}

impl Default for GitVcs {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for GitVcs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitVcs")
            .field("open", &self.repo.as_ref().and_then(|r| r.workdir()))
            .finish()
    }
}

impl GitVcs {
    pub fn new() -> Self {
        Self::with_progress(Arc::new(LogProgress))
    }

    pub fn with_progress(progress: Arc<dyn ProgressSink>) -> Self {
        Self {
            repo: None,
            progress,
        }
    }

    fn repo(&self) -> Result<&Repository, VcsError> {
        self.repo.as_ref().ok_or(VcsError::NotOpen)
    }

    fn fetch_options(&self) -> FetchOptions<'static> {
        let sink = Arc::clone(&self.progress);
        let mut callbacks = RemoteCallbacks::new();
        callbacks.sideband_progress(move |data| {
            for line in String::from_utf8_lossy(data).lines() {
                let line = line.trim();
                if !line.is_empty() {
                    sink.line(line);
                }
            }
            true
        });
        let mut options = FetchOptions::new();
        options.remote_callbacks(callbacks);
        options
    }
}

impl Vcs for GitVcs {
    fn is_repository(&self, path: &Path) -> bool {
        Repository::open(path).is_ok()
    }

    fn open(&mut self, path: &Path) -> Result<(), VcsError> {
        self.repo = Some(Repository::open(path)?);
        Ok(())
    }

    fn clone_into(&mut self, url: &str, branch: &str, path: &Path) -> Result<(), VcsError> {
        std::fs::create_dir_all(path).map_err(|e| io_err(path, e))?;
        let repo = RepoBuilder::new()
            .branch(branch)
            .fetch_options(self.fetch_options())
            .clone(url, path)?;
        self.repo = Some(repo);
        Ok(())
    }

    fn checkout(&mut self, branch: &str) -> Result<(), VcsError> {
        let repo = self.repo()?;
        let local_ref = format!("refs/heads/{branch}");

        if repo.find_branch(branch, BranchType::Local).is_err() {
            let remote_ref = format!("refs/remotes/{REMOTE_NAME}/{branch}");
            let commit = repo.find_reference(&remote_ref)?.peel_to_commit()?;
            let mut created = repo.branch(branch, &commit, false)?;
            created.set_upstream(Some(&format!("{REMOTE_NAME}/{branch}")))?;
            info!("created local branch {branch} from {remote_ref}");
        }

        let on_branch = repo
            .head()
            .ok()
            .and_then(|head| head.name().map(|name| name == local_ref))
            .unwrap_or(false);
        if !on_branch {
            repo.set_head(&local_ref)?;
            repo.checkout_head(Some(CheckoutBuilder::new().safe()))?;
            debug!("checked out {local_ref}");
        }
        Ok(())
    }

    fn pull(&mut self, branch: &str) -> Result<PullOutcome, VcsError> {
        let mut options = self.fetch_options();
        let repo = self.repo()?;

        let mut remote = repo.find_remote(REMOTE_NAME)?;
        remote.fetch(&[branch], Some(&mut options), None)?;

        let fetch_head = repo.find_reference("FETCH_HEAD")?;
        let incoming = repo.reference_to_annotated_commit(&fetch_head)?;
        let (analysis, _) = repo.merge_analysis(&[&incoming])?;

        if analysis.is_up_to_date() {
            return Ok(PullOutcome::UpToDate);
        }

        let local_ref = format!("refs/heads/{branch}");
        if analysis.is_fast_forward() {
            let mut reference = repo.find_reference(&local_ref)?;
            reference.set_target(incoming.id(), "pull: fast-forward")?;
            repo.set_head(&local_ref)?;
            repo.checkout_head(Some(CheckoutBuilder::new().force()))?;
            info!("fast-forwarded {branch} to {}", incoming.id());
            return Ok(PullOutcome::Merged);
        }

        repo.merge(&[&incoming], None, None)?;
        let mut index = repo.index()?;
        if index.has_conflicts() {
            let mut paths = Vec::new();
            for conflict in index.conflicts()? {
                let conflict = conflict?;
                if let Some(entry) = conflict.our.or(conflict.their).or(conflict.ancestor) {
                    paths.push(PathBuf::from(
                        String::from_utf8_lossy(&entry.path).into_owned(),
                    ));
                }
            }
            paths.sort();
            paths.dedup();
            return Ok(PullOutcome::Conflict { paths });
        }

        let tree = repo.find_tree(index.write_tree()?)?;
        let signature = repo
            .signature()
            .or_else(|_| Signature::now("algorepo", "algorepo@localhost"))?;
        let ours = repo.head()?.peel_to_commit()?;
        let theirs = repo.find_commit(incoming.id())?;
        let message = format!("Merge {REMOTE_NAME}/{branch}");
        let merge_id = repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            &message,
            &tree,
            &[&ours, &theirs],
        )?;
        repo.cleanup_state()?;
        info!("merged {REMOTE_NAME}/{branch} as {merge_id}");
        Ok(PullOutcome::Merged)
    }

    fn diff(&self, old: &HeadId, new: &HeadId) -> Result<ChangeLog, VcsError> {
        let repo = self.repo()?;
        let old_tree = repo.find_commit(Oid::from_str(old.as_str())?)?.tree()?;
        let new_tree = repo.find_commit(Oid::from_str(new.as_str())?)?.tree()?;

        let mut diff = repo.diff_tree_to_tree(Some(&old_tree), Some(&new_tree), None)?;
        let mut find = DiffFindOptions::new();
        find.renames(true);
        diff.find_similar(Some(&mut find))?;

        let mut log = ChangeLog::new();
        for delta in diff.deltas() {
            let old_path = delta.old_file().path().map(Path::to_path_buf);
            let new_path = delta.new_file().path().map(Path::to_path_buf);
            let entry = match (delta.status(), old_path, new_path) {
                (Delta::Added | Delta::Copied, _, Some(new)) => ChangeEntry::added(new),
                (Delta::Deleted, Some(old), _) => ChangeEntry::deleted(old),
                (
                    Delta::Modified | Delta::Renamed | Delta::Typechange,
                    Some(old),
                    Some(new),
                ) => ChangeEntry::modified(old, new),
                _ => continue,
            };
            log.push(entry);
        }
        Ok(log)
    }

    fn reset_hard(&mut self, head: &HeadId) -> Result<(), VcsError> {
        let repo = self.repo()?;
        let target = repo.find_object(Oid::from_str(head.as_str())?, None)?;
        repo.reset(&target, ResetType::Hard, Some(CheckoutBuilder::new().force()))?;
        repo.cleanup_state()?;
        Ok(())
    }

    fn current_head(&self) -> Result<Option<HeadId>, VcsError> {
        let repo = self.repo()?;
        match repo.head() {
            Ok(head) => Ok(head.target().map(HeadId::from)),
            Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => {
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn close(&mut self) {
        self.repo = None;
    }
}
