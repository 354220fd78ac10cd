//! Host-provided capabilities consumed by the synchronization pipeline.
//!
//! The core never compiles or loads code itself; a host plugs in a
//! [`Builder`] and a [`Loader`] for the source kinds it supports.

use std::path::{Path, PathBuf};

use crate::error::{BuildError, LoadError};
use crate::types::{AlgorithmDescriptor, SourceKind};

/// Turns a source file into a compiled artifact.
pub trait Builder: Send + Sync {
    /// Where the artifact for `source` lives once built.
    fn artifact_path(&self, kind: &SourceKind, source: &Path) -> PathBuf;

    /// Build `source`. Only invoked when the build gate requires it.
    fn build(&self, kind: &SourceKind, source: &Path) -> Result<(), BuildError>;
}

/// A freshly loaded component and its descriptor.
#[derive(Debug, Clone)]
pub struct Loaded<C> {
    pub component: C,
    pub descriptor: AlgorithmDescriptor,
}

/// Turns a built artifact (or an interpreted source) into a callable component.
pub trait Loader: Send + Sync {
    /// Opaque handle the registry hands back to callers.
    type Component: Clone + Send + Sync + 'static;

    /// Load the component named `name` (the source file stem) from `search_path`.
    fn load(
        &self,
        name: &str,
        kind: &SourceKind,
        search_path: &Path,
    ) -> Result<Loaded<Self::Component>, LoadError>;
}
