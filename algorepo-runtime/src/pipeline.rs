//! Per-file add/update/remove pipeline shared by startup and the watcher.
//!
//! ```text
//! candidate file
//!   -> Classifier (source kind)
//!   -> BuildGate  (compiled kinds only)
//!   -> Builder    (when the gate says so)
//!   -> Loader     (component + descriptor)
//!   -> descriptor validation
//!   -> Registry
//! ```
//!
//! A failure at any step removes whatever the file registered before.

use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;

use algorepo_core::{
    AlgorithmDescriptor, AlgorithmId, Builder, ChangeEntry, ChangeLog, FilePattern, LoadError,
    Loaded, Loader, Registry, RepositoryConfig,
};
use algorepo_detector::Classifier;
use algorepo_sync::BuildGate;

use crate::error::{io_err, RuntimeError};
use crate::watcher::WatchListener;

/// A file that could not be registered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FailedFile {
    pub path: PathBuf,
    pub error: String,
}

/// What a full `load_all` pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub registered: Vec<AlgorithmId>,
    pub built: Vec<PathBuf>,
    pub reused: Vec<PathBuf>,
    pub failed: Vec<FailedFile>,
}

/// Result of processing a single candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Processed {
    pub identifier: AlgorithmId,
    pub built: bool,
}

pub struct Pipeline<B, L: Loader> {
    root: PathBuf,
    pattern: FilePattern,
    classifier: Classifier,
    supported_versions: Vec<String>,
    builder: B,
    loader: L,
    registry: Arc<Registry<L::Component>>,
    gate: BuildGate,
    changes: RwLock<ChangeLog>,
}

impl<B: Builder, L: Loader> Pipeline<B, L> {
    /// `config.local_path` must exist; it is resolved once so paths from the
    /// watcher and from enumeration agree.
    pub fn new(
        config: &RepositoryConfig,
        builder: B,
        loader: L,
        registry: Arc<Registry<L::Component>>,
    ) -> Self {
        let root =
            fs::canonicalize(&config.local_path).unwrap_or_else(|_| config.local_path.clone());
        Self {
            gate: BuildGate::new(&root),
            root,
            pattern: config.remote.pattern.clone(),
            classifier: Classifier::new().with_extensions(&config.extensions),
            supported_versions: config.supported_versions.clone(),
            builder,
            loader,
            registry,
            changes: RwLock::new(ChangeLog::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn registry(&self) -> &Arc<Registry<L::Component>> {
        &self.registry
    }

    // -----------------------------------------------------------------------
    // Change log
    // -----------------------------------------------------------------------

    /// Replace the pending change log (after a working-copy cycle).
    pub fn record_changes(&self, log: ChangeLog) {
        *self.changes.write().unwrap_or_else(PoisonError::into_inner) = log;
    }

    pub fn record_change(&self, entry: ChangeEntry) {
        self.changes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    /// Entries not yet consumed by a rebuild.
    pub fn pending_changes(&self) -> ChangeLog {
        self.changes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn consume_changes(&self, source: &Path) {
        self.changes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|entry| !self.gate.touches(entry, source));
    }

    // -----------------------------------------------------------------------
    // Candidates
    // -----------------------------------------------------------------------

    /// `true` if `path` lies below the root, outside `.git`, and matches the
    /// file pattern.
    pub fn is_candidate(&self, path: &Path) -> bool {
        let Ok(relative) = self.absolute(path).strip_prefix(&self.root).map(Path::to_path_buf)
        else {
            return false;
        };
        let in_git = relative
            .components()
            .any(|c| matches!(c, Component::Normal(name) if name == ".git"));
        !in_git && self.pattern.matches(&relative)
    }

    /// Every candidate below the root, sorted.
    pub fn candidates(&self) -> Result<Vec<PathBuf>, RuntimeError> {
        self.candidates_under(&self.root)
    }

    fn candidates_under(&self, top: &Path) -> Result<Vec<PathBuf>, RuntimeError> {
        let mut files = Vec::new();
        for dir in collect_dirs(top)? {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(err) if err.kind() == ErrorKind::NotFound => continue,
                Err(err) => return Err(io_err(&dir, err)),
            };
            for entry in entries {
                let entry = entry.map_err(|e| io_err(&dir, e))?;
                let ty = entry.file_type().map_err(|e| io_err(entry.path(), e))?;
                if ty.is_file() && self.is_candidate(&entry.path()) {
                    files.push(entry.path());
                }
            }
        }
        files.sort();
        Ok(files)
    }

    // -----------------------------------------------------------------------
    // Processing
    // -----------------------------------------------------------------------

    /// Route every candidate into the registry. Per-file failures are logged
    /// and collected; they never abort the pass.
    pub fn load_all(&self, force_build: bool) -> Result<LoadSummary, RuntimeError> {
        let mut summary = LoadSummary::default();
        for path in self.candidates()? {
            match self.process(&path, force_build) {
                Ok(processed) => {
                    if processed.built {
                        summary.built.push(path);
                    } else {
                        summary.reused.push(path);
                    }
                    summary.registered.push(processed.identifier);
                }
                Err(err) => {
                    tracing::error!(
                        file = %path.display(),
                        error = %err,
                        "failed to register algorithm",
                    );
                    self.forget(&path);
                    summary.failed.push(FailedFile {
                        path,
                        error: err.to_string(),
                    });
                }
            }
        }
        summary.registered.sort();
        summary.registered.dedup();
        Ok(summary)
    }

    /// Add or refresh the registration of one file. Non-candidates are
    /// ignored and yield `Ok(None)`.
    pub fn add_file(&self, path: &Path) -> Result<Option<Processed>, RuntimeError> {
        let path = self.absolute(path);
        if !self.is_candidate(&path) {
            tracing::debug!(file = %path.display(), "ignoring non-candidate file");
            return Ok(None);
        }
        match self.process(&path, false) {
            Ok(processed) => Ok(Some(processed)),
            Err(err) => {
                self.forget(&path);
                Err(err)
            }
        }
    }

    /// Register every candidate below a directory that appeared under the
    /// root. Per-file failures are logged and skipped.
    pub fn add_directory(&self, dir: &Path) -> Result<Vec<Processed>, RuntimeError> {
        let dir = self.absolute(dir);
        let mut processed = Vec::new();
        for path in self.candidates_under(&dir)? {
            self.record_change(ChangeEntry::added(&path));
            match self.add_file(&path) {
                Ok(Some(done)) => processed.push(done),
                Ok(None) => {}
                Err(err) => {
                    tracing::error!(
                        file = %path.display(),
                        error = %err,
                        "failed to register algorithm",
                    );
                }
            }
        }
        tracing::info!(
            dir = %dir.display(),
            registered = processed.len(),
            "loaded directory",
        );
        Ok(processed)
    }

    /// Drop whatever `path` registered; a removed directory drops every
    /// registration below it. Unknown paths are a no-op.
    pub fn remove_file(&self, path: &Path) -> Vec<AlgorithmId> {
        let path = self.absolute(path);
        let removed = self.registry.unregister_under(&path);
        if removed.is_empty() {
            tracing::debug!(file = %path.display(), "removed path was not registered");
        }
        for id in &removed {
            tracing::info!(algorithm = %id, path = %path.display(), "unregistered algorithm");
        }
        removed
    }

    fn process(&self, path: &Path, force_build: bool) -> Result<Processed, RuntimeError> {
        let kind = self.classifier.classify(path)?.kind;

        let mut built = false;
        if kind.requires_build() {
            let artifact = self.builder.artifact_path(&kind, path);
            let decision =
                self.gate
                    .should_build(path, &artifact, &self.pending_changes(), force_build);
            if decision.requires_build() {
                tracing::debug!(file = %path.display(), decision = ?decision, "building");
                self.builder.build(&kind, path)?;
                self.consume_changes(path);
                built = true;
            } else {
                tracing::debug!(
                    file = %path.display(),
                    artifact = %artifact.display(),
                    "reusing artifact",
                );
            }
        }

        let name = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .ok_or_else(|| RuntimeError::InvalidFileName {
                path: path.to_path_buf(),
            })?;
        let search_path = path.parent().unwrap_or(&self.root);
        let Loaded {
            component,
            descriptor,
        } = self.loader.load(name, &kind, search_path)?;
        validate_descriptor(name, &descriptor, &self.supported_versions)?;

        let identifier = descriptor.identifier.clone();
        let replaced =
            self.registry
                .register(identifier.clone(), component, descriptor, path.to_path_buf());
        if let Some(previous) = replaced.filter(|prev| prev.source != path) {
            tracing::warn!(
                algorithm = %identifier,
                previous = %previous.source.display(),
                file = %path.display(),
                "identifier now provided by another file",
            );
        }
        tracing::info!(
            algorithm = %identifier,
            file = %path.display(),
            built,
            "registered algorithm",
        );
        Ok(Processed { identifier, built })
    }

    fn forget(&self, path: &Path) {
        if let Some(id) = self.registry.unregister(path) {
            tracing::warn!(algorithm = %id, file = %path.display(), "removed stale registration");
        }
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl<B, L> WatchListener for Pipeline<B, L>
where
    B: Builder + 'static,
    L: Loader + 'static,
{
    fn file_added(&self, path: &Path) -> Result<(), RuntimeError> {
        if self.absolute(path).is_dir() {
            return self.add_directory(path).map(|_| ());
        }
        if self.is_candidate(path) {
            self.record_change(ChangeEntry::added(path));
        }
        self.add_file(path).map(|_| ())
    }

    fn file_changed(&self, path: &Path) -> Result<(), RuntimeError> {
        if self.is_candidate(path) {
            self.record_change(ChangeEntry::modified(path, path));
        }
        self.add_file(path).map(|_| ())
    }

    fn file_removed(&self, path: &Path) -> Result<(), RuntimeError> {
        self.remove_file(path);
        Ok(())
    }
}

/// A descriptor must name itself and speak at least one supported version.
fn validate_descriptor(
    name: &str,
    descriptor: &AlgorithmDescriptor,
    supported: &[String],
) -> Result<(), LoadError> {
    if descriptor.identifier.as_str().trim().is_empty() {
        return Err(LoadError::InvalidDescriptor {
            name: name.to_string(),
            reason: "empty identifier".to_string(),
        });
    }
    if !descriptor.supports_any(supported) {
        return Err(LoadError::InvalidDescriptor {
            name: name.to_string(),
            reason: format!(
                "versions [{}] include none of [{}]",
                descriptor.versions.join(", "),
                supported.join(", ")
            ),
        });
    }
    Ok(())
}

/// Breadth-first list of `root` and its subdirectories, skipping `.git`.
fn collect_dirs(root: &Path) -> Result<Vec<PathBuf>, RuntimeError> {
    let mut dirs = vec![root.to_path_buf()];
    let mut cursor = 0;
    while cursor < dirs.len() {
        let current = dirs[cursor].clone();
        cursor += 1;
        let entries = match fs::read_dir(&current) {
            Ok(entries) => entries,
            Err(err) => {
                if err.kind() == ErrorKind::NotFound {
                    continue;
                }
                return Err(io_err(&current, err));
            }
        };
        for entry in entries {
            let entry = entry.map_err(|e| io_err(&current, e))?;
            let ty = entry.file_type().map_err(|e| io_err(entry.path(), e))?;
            if ty.is_dir() && entry.file_name() != ".git" {
                dirs.push(entry.path());
            }
        }
    }
    dirs.sort();
    dirs.dedup();
    Ok(dirs)
}
