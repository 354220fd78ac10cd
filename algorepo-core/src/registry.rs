//! In-memory algorithm registry.
//!
//! # Indices
//!
//! ```text
//! by_id:   AlgorithmId -> RegisteredAlgorithm { component, descriptor, source }
//! by_file: source path -> AlgorithmId
//! ```
//!
//! Both maps live behind one `RwLock`, so every reader sees them in agreement:
//! an identifier is in `by_id` iff exactly one source in `by_file` maps to it.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, Utc};

use crate::error::RegistryError;
use crate::types::{AlgorithmDescriptor, AlgorithmId};

/// A component together with the metadata it was registered with.
#[derive(Debug, Clone)]
pub struct RegisteredAlgorithm<C> {
    pub identifier: AlgorithmId,
    pub component: C,
    pub descriptor: AlgorithmDescriptor,
    pub source: PathBuf,
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug)]
struct Indices<C> {
    by_id: HashMap<AlgorithmId, RegisteredAlgorithm<C>>,
    by_file: HashMap<PathBuf, AlgorithmId>,
}

impl<C> Default for Indices<C> {
    fn default() -> Self {
        Self {
            by_id: HashMap::new(),
            by_file: HashMap::new(),
        }
    }
}

/// Identifier-indexed store of loaded components with a reverse file index.
#[derive(Debug)]
pub struct Registry<C> {
    inner: RwLock<Indices<C>>,
}

impl<C> Default for Registry<C> {
    fn default() -> Self {
        Self {
            inner: RwLock::new(Indices::default()),
        }
    }
}

impl<C: Clone> Registry<C> {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Mutation
    // -----------------------------------------------------------------------

    /// Register `component` under `identifier`, replacing any previous entry.
    ///
    /// Stale pairings are dropped in the same critical section: the file that
    /// previously produced `identifier`, and the identifier `source` previously
    /// produced. Returns the replaced entry, if any.
    pub fn register(
        &self,
        identifier: AlgorithmId,
        component: C,
        descriptor: AlgorithmDescriptor,
        source: PathBuf,
    ) -> Option<RegisteredAlgorithm<C>> {
        let mut guard = self.write();

        if let Some(previous_id) = guard.by_file.get(&source).cloned() {
            if previous_id != identifier {
                guard.by_id.remove(&previous_id);
            }
        }

        let entry = RegisteredAlgorithm {
            identifier: identifier.clone(),
            component,
            descriptor,
            source: source.clone(),
            registered_at: Utc::now(),
        };
        let replaced = guard.by_id.insert(identifier.clone(), entry);
        if let Some(old) = &replaced {
            if old.source != source {
                guard.by_file.remove(&old.source);
            }
        }
        guard.by_file.insert(source, identifier);
        replaced
    }

    /// Remove whatever `source` registered. Unknown files are a no-op.
    pub fn unregister(&self, source: &Path) -> Option<AlgorithmId> {
        let mut guard = self.write();
        let identifier = guard.by_file.remove(source)?;
        guard.by_id.remove(&identifier);
        Some(identifier)
    }

    /// Remove whatever `prefix` registered, plus every source below it when
    /// `prefix` was a directory. Returns the removed identifiers, sorted.
    pub fn unregister_under(&self, prefix: &Path) -> Vec<AlgorithmId> {
        let mut guard = self.write();
        let sources: Vec<PathBuf> = guard
            .by_file
            .keys()
            .filter(|source| source.starts_with(prefix))
            .cloned()
            .collect();
        let mut removed = Vec::with_capacity(sources.len());
        for source in sources {
            if let Some(identifier) = guard.by_file.remove(&source) {
                guard.by_id.remove(&identifier);
                removed.push(identifier);
            }
        }
        removed.sort();
        removed
    }

    /// Drop every entry.
    pub fn clear(&self) {
        let mut guard = self.write();
        guard.by_id.clear();
        guard.by_file.clear();
    }

    // -----------------------------------------------------------------------
    // Queries
    // -----------------------------------------------------------------------

    pub fn lookup(&self, identifier: &str) -> Option<C> {
        self.read()
            .by_id
            .get(identifier)
            .map(|entry| entry.component.clone())
    }

    pub fn contains(&self, identifier: &str) -> bool {
        self.read().by_id.contains_key(identifier)
    }

    /// Full entry for `identifier`.
    pub fn entry(&self, identifier: &str) -> Option<RegisteredAlgorithm<C>> {
        self.read().by_id.get(identifier).cloned()
    }

    pub fn identifiers(&self) -> BTreeSet<AlgorithmId> {
        self.read().by_id.keys().cloned().collect()
    }

    /// Descriptor of `identifier`; asking for an unknown one is a caller error.
    pub fn descriptor(&self, identifier: &str) -> Result<AlgorithmDescriptor, RegistryError> {
        self.read()
            .by_id
            .get(identifier)
            .map(|entry| entry.descriptor.clone())
            .ok_or_else(|| RegistryError::NoSuchAlgorithm {
                identifier: AlgorithmId::from(identifier),
            })
    }

    /// Identifier currently registered from `source`.
    pub fn identifier_for(&self, source: &Path) -> Option<AlgorithmId> {
        self.read().by_file.get(source).cloned()
    }

    /// Snapshot of the reverse index, sorted by path.
    pub fn sources(&self) -> BTreeMap<PathBuf, AlgorithmId> {
        self.read()
            .by_file
            .iter()
            .map(|(path, id)| (path.clone(), id.clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.read().by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().by_id.is_empty()
    }

    // Every mutation leaves both indices consistent before releasing the
    // guard, so a poisoned lock still holds a usable state.
    fn read(&self) -> RwLockReadGuard<'_, Indices<C>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, Indices<C>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(id: &str) -> AlgorithmDescriptor {
        AlgorithmDescriptor::new(id).with_versions(["2.0.0"])
    }

    fn register(registry: &Registry<u32>, id: &str, value: u32, file: &str) {
        registry.register(id.into(), value, descriptor(id), PathBuf::from(file));
    }

    #[test]
    fn register_and_lookup() {
        let registry = Registry::new();
        register(&registry, "buffer", 1, "/wc/Buffer.java");
        assert_eq!(registry.lookup("buffer"), Some(1));
        assert!(registry.contains("buffer"));
        assert_eq!(
            registry.identifier_for(Path::new("/wc/Buffer.java")),
            Some(AlgorithmId::from("buffer"))
        );
    }

    #[test]
    fn reregistering_same_file_replaces_component() {
        let registry = Registry::new();
        register(&registry, "buffer", 1, "/wc/Buffer.java");
        let replaced = registry.register(
            "buffer".into(),
            2,
            descriptor("buffer"),
            PathBuf::from("/wc/Buffer.java"),
        );
        assert_eq!(replaced.map(|e| e.component), Some(1));
        assert_eq!(registry.lookup("buffer"), Some(2));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn same_identifier_from_other_file_drops_old_reverse_entry() {
        let registry = Registry::new();
        register(&registry, "buffer", 1, "/wc/Buffer.java");
        register(&registry, "buffer", 2, "/wc/Buffer2.java");

        assert_eq!(registry.identifier_for(Path::new("/wc/Buffer.java")), None);
        assert_eq!(registry.unregister(Path::new("/wc/Buffer.java")), None);
        assert_eq!(registry.lookup("buffer"), Some(2));
    }

    #[test]
    fn file_registering_new_identifier_drops_old_identifier() {
        let registry = Registry::new();
        register(&registry, "old_name", 1, "/wc/Algo.java");
        register(&registry, "new_name", 2, "/wc/Algo.java");

        assert!(!registry.contains("old_name"));
        assert_eq!(registry.identifiers().len(), 1);
    }

    #[test]
    fn unregister_unknown_file_is_noop() {
        let registry = Registry::new();
        register(&registry, "buffer", 1, "/wc/Buffer.java");
        assert_eq!(registry.unregister(Path::new("/wc/Nope.java")), None);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unregister_under_removes_directory_contents_only() {
        let registry = Registry::new();
        register(&registry, "a", 1, "/wc/a.src");
        register(&registry, "b", 2, "/wc/sub/b.src");
        register(&registry, "c", 3, "/wc/sub/deep/c.src");
        register(&registry, "d", 4, "/wc/subway/d.src");

        assert_eq!(
            registry.unregister_under(Path::new("/wc/sub")),
            vec![AlgorithmId::from("b"), AlgorithmId::from("c")]
        );
        let left: Vec<_> = registry.identifiers().into_iter().collect();
        assert_eq!(left, vec![AlgorithmId::from("a"), AlgorithmId::from("d")]);
        assert_eq!(registry.sources().len(), 2);

        assert_eq!(
            registry.unregister_under(Path::new("/wc/a.src")),
            vec![AlgorithmId::from("a")]
        );
        assert!(registry.unregister_under(Path::new("/wc/gone")).is_empty());
    }

    #[test]
    fn descriptor_for_unknown_identifier_is_error() {
        let registry: Registry<u32> = Registry::new();
        let err = registry.descriptor("missing").unwrap_err();
        assert_eq!(
            err,
            RegistryError::NoSuchAlgorithm {
                identifier: AlgorithmId::from("missing")
            }
        );
        assert!(err.to_string().contains("no such algorithm"));
    }

    #[test]
    fn clear_empties_both_indices() {
        let registry = Registry::new();
        register(&registry, "a", 1, "/wc/a.src");
        registry.clear();
        assert!(registry.is_empty());
        assert!(registry.sources().is_empty());
    }
}
