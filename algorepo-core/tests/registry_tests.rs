//! Registry consistency and concurrency tests.
//!
//! Every scripted sequence of register/unregister calls must leave the forward
//! and reverse indices in agreement.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use algorepo_core::{AlgorithmDescriptor, AlgorithmId, Registry, RegistryError};
use rstest::rstest;

#[derive(Debug, Clone, Copy)]
enum Op {
    Register(&'static str, &'static str),
    Unregister(&'static str),
}

fn apply(registry: &Registry<String>, op: Op) {
    match op {
        Op::Register(id, file) => {
            registry.register(
                AlgorithmId::from(id),
                format!("{id}@{file}"),
                AlgorithmDescriptor::new(id).with_versions(["2.0.0"]),
                PathBuf::from(file),
            );
        }
        Op::Unregister(file) => {
            registry.unregister(Path::new(file));
        }
    }
}

/// `lookup(id)` succeeds iff some reverse entry maps to `id`, and the
/// identifier listing has no entry without a forward record.
fn assert_consistent(registry: &Registry<String>) {
    let sources = registry.sources();
    let ids = registry.identifiers();

    for id in &ids {
        assert!(registry.lookup(id.as_str()).is_some(), "listed id {id} has no component");
        let producers = sources.values().filter(|v| *v == id).count();
        assert_eq!(producers, 1, "id {id} must have exactly one source, got {producers}");
        assert!(registry.descriptor(id.as_str()).is_ok());
    }
    for (path, id) in &sources {
        assert!(
            registry.lookup(id.as_str()).is_some(),
            "reverse entry {} -> {id} is orphaned",
            path.display()
        );
    }
    assert_eq!(ids.len(), sources.len());
}

// ---------------------------------------------------------------------------
// 1. Scripted sequences
// ---------------------------------------------------------------------------

#[rstest]
#[case::single(vec![Op::Register("a", "/wc/a.src")])]
#[case::overwrite_same_file(vec![
    Op::Register("a", "/wc/a.src"),
    Op::Register("a", "/wc/a.src"),
])]
#[case::identifier_moves_between_files(vec![
    Op::Register("a", "/wc/a.src"),
    Op::Register("a", "/wc/b.src"),
    Op::Unregister("/wc/a.src"),
])]
#[case::file_changes_identifier(vec![
    Op::Register("a", "/wc/a.src"),
    Op::Register("renamed", "/wc/a.src"),
])]
#[case::unregister_unknown(vec![
    Op::Register("a", "/wc/a.src"),
    Op::Unregister("/wc/untracked.src"),
])]
#[case::register_remove_register(vec![
    Op::Register("a", "/wc/a.src"),
    Op::Unregister("/wc/a.src"),
    Op::Register("a", "/wc/a.src"),
    Op::Register("b", "/wc/b.src"),
    Op::Unregister("/wc/a.src"),
])]
#[case::swap_identifiers(vec![
    Op::Register("a", "/wc/a.src"),
    Op::Register("b", "/wc/b.src"),
    Op::Register("b", "/wc/a.src"),
    Op::Register("a", "/wc/b.src"),
])]
fn scripted_sequences_stay_consistent(#[case] ops: Vec<Op>) {
    let registry = Registry::new();
    for op in ops {
        apply(&registry, op);
        assert_consistent(&registry);
    }
}

#[test]
fn identifier_moves_between_files_keeps_latest_component() {
    let registry = Registry::new();
    apply(&registry, Op::Register("a", "/wc/a.src"));
    apply(&registry, Op::Register("a", "/wc/b.src"));
    apply(&registry, Op::Unregister("/wc/a.src"));

    assert_eq!(registry.lookup("a"), Some("a@/wc/b.src".to_string()));
}

#[test]
fn unknown_descriptor_is_distinct_from_empty_listing() {
    let registry: Registry<String> = Registry::new();
    assert!(registry.identifiers().is_empty());
    assert!(matches!(
        registry.descriptor("ghost"),
        Err(RegistryError::NoSuchAlgorithm { .. })
    ));
}

// ---------------------------------------------------------------------------
// 2. Concurrent readers
// ---------------------------------------------------------------------------

#[test]
fn concurrent_readers_never_observe_torn_pairs() {
    let registry = Arc::new(Registry::<String>::new());

    let writer = {
        let registry = Arc::clone(&registry);
        thread::spawn(move || {
            for round in 0..500 {
                let file = if round % 2 == 0 { "/wc/a.src" } else { "/wc/b.src" };
                apply(&registry, Op::Register("a", file));
                if round % 7 == 0 {
                    apply(&registry, Op::Unregister(file));
                }
            }
        })
    };

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                for _ in 0..500 {
                    let sources = registry.sources();
                    assert!(sources.len() <= 1, "one identifier, at most one source");
                    if let Some(entry) = registry.entry("a") {
                        assert_eq!(entry.component, format!("a@{}", entry.source.display()));
                    }
                }
            })
        })
        .collect();

    writer.join().expect("writer");
    for reader in readers {
        reader.join().expect("reader");
    }
    assert_consistent(&registry);
}
