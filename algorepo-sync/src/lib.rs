//! # algorepo-sync
//!
//! Working-copy lifecycle and change detection.
//!
//! [`WorkingCopyManager::initialize_or_update`] clones or updates the local
//! mirror through a [`Vcs`] capability and reports a [`SyncOutcome`] carrying
//! the change log of the cycle. [`BuildGate`] turns that change log into
//! per-file rebuild decisions.

pub mod build_gate;
pub mod error;
pub mod vcs;
pub mod working_copy;

pub use build_gate::{BuildDecision, BuildGate};
pub use error::{SyncError, VcsError};
pub use vcs::{GitVcs, HeadId, LogProgress, ProgressSink, PullOutcome, Vcs};
pub use working_copy::{SyncOutcome, WorkingCopyManager};
