//! Per-file rebuild decision.
//!
//! Decision precedence:
//! 1. `Forced` (caller asked for a full build, e.g. after a fresh clone)
//! 2. `Changed` (the file is an add or modify target in the change log)
//! 3. `MissingArtifact` (no compiled artifact on disk)
//! 4. `Reuse`

use std::path::{Component, Path, PathBuf};

use algorepo_core::types::{ChangeEntry, ChangeLog};

/// Outcome of [`BuildGate::should_build`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildDecision {
    Forced,
    Changed,
    MissingArtifact,
    Reuse,
}

impl BuildDecision {
    pub fn requires_build(self) -> bool {
        !matches!(self, BuildDecision::Reuse)
    }
}

/// Compares candidates against change-log entries relative to `root`.
#[derive(Debug, Clone)]
pub struct BuildGate {
    root: PathBuf,
}

impl BuildGate {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Decide whether `source` must be (re)built before loading.
    pub fn should_build(
        &self,
        source: &Path,
        artifact: &Path,
        changes: &ChangeLog,
        force: bool,
    ) -> BuildDecision {
        if force {
            return BuildDecision::Forced;
        }

        if changes.entries().iter().any(|entry| self.touches(entry, source)) {
            return BuildDecision::Changed;
        }

        if !artifact.exists() {
            return BuildDecision::MissingArtifact;
        }
        BuildDecision::Reuse
    }

    /// `true` if `entry` adds or modifies `source`.
    pub fn touches(&self, entry: &ChangeEntry, source: &Path) -> bool {
        let target = canonical(&self.absolute(source));
        entry
            .changed_paths()
            .any(|path| canonical(&self.absolute(path)) == target)
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

/// Resolved absolute path; falls back to lexical normalization for paths
/// that no longer exist.
fn canonical(path: &Path) -> PathBuf {
    if let Ok(resolved) = path.canonicalize() {
        return resolved;
    }
    // Resolve the deepest existing ancestor, then re-append the rest.
    let normalized = normalize(path);
    let mut existing = normalized.as_path();
    let mut tail = Vec::new();
    while let Some(parent) = existing.parent() {
        if let Some(name) = existing.file_name() {
            tail.push(name.to_os_string());
        }
        existing = parent;
        if let Ok(resolved) = existing.canonicalize() {
            return tail.iter().rev().fold(resolved, |acc, part| acc.join(part));
        }
    }
    normalized
}

fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}
