//! Parameterised source-kind classification tests for `algorepo-detector`.
//!
//! Each `#[case]` gets an isolated `TempDir`: no shared state.

use algorepo_core::types::SourceKind;
use algorepo_detector::{Classifier, Confidence, DetectError};
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Helper
// ---------------------------------------------------------------------------

fn make_dir() -> TempDir {
    TempDir::new().expect("tempdir")
}

fn write(dir: &TempDir, filename: &str, content: &str) -> PathBuf {
    let path = dir.path().join(filename);
    fs::write(&path, content).expect("write fixture");
    path
}

// ---------------------------------------------------------------------------
// Extension table
// ---------------------------------------------------------------------------

#[rstest]
#[case("Buffer.java", SourceKind::Java)]
#[case("Buffer.JAVA", SourceKind::Java)]
#[case("mean.R", SourceKind::R)]
#[case("mean.r", SourceKind::R)]
#[case("tool.py", SourceKind::Python)]
fn builtin_extensions(#[case] filename: &str, #[case] expected: SourceKind) {
    let dir = make_dir();
    let path = write(&dir, filename, "");
    let c = Classifier::new().classify(&path).expect("classify");
    assert_eq!(c.kind, expected);
    assert_eq!(c.confidence, Confidence::High);
}

#[test]
fn override_wins_over_builtin() {
    let dir = make_dir();
    let path = write(&dir, "Buffer.java", "");
    let c = Classifier::new()
        .with_extension(".JAVA", SourceKind::Custom("javalite".into()))
        .classify(&path)
        .expect("classify");
    assert_eq!(c.kind, SourceKind::Custom("javalite".into()));
}

#[test]
fn host_extension_classifies_custom_kind() {
    let dir = make_dir();
    let path = write(&dir, "a.src", "anything");
    let c = Classifier::new()
        .with_extension("src", SourceKind::Custom("src".into()))
        .classify(&path)
        .expect("classify");
    assert!(c.kind.requires_build());
}

// ---------------------------------------------------------------------------
// Content sniffing
// ---------------------------------------------------------------------------

#[rstest]
#[case("#!/usr/bin/env Rscript\nx <- 1\n", SourceKind::R)]
#[case("#!/usr/bin/env python3\nprint(1)\n", SourceKind::Python)]
#[case("package org.example;\n\npublic class Buffer {}\n", SourceKind::Java)]
#[case("// header\n@Algorithm(version = \"1.0.0\")\nclass Buffer {}\n", SourceKind::Java)]
fn content_sniffing(#[case] content: &str, #[case] expected: SourceKind) {
    let dir = make_dir();
    let path = write(&dir, "algorithm", content);
    let c = Classifier::new().classify(&path).expect("classify");
    assert_eq!(c.kind, expected);
    assert_eq!(c.confidence, Confidence::Medium);
}

#[test]
fn unknown_content_is_error() {
    let dir = make_dir();
    let path = write(&dir, "notes.txt", "just some notes");
    let err = Classifier::new().classify(&path).unwrap_err();
    assert!(matches!(err, DetectError::UnknownKind { .. }), "got: {err}");
    assert!(err.to_string().contains("notes.txt"));
}

#[test]
fn missing_file_without_known_extension_is_io_error() {
    let dir = make_dir();
    let err = Classifier::new()
        .classify(&dir.path().join("ghost"))
        .unwrap_err();
    assert!(matches!(err, DetectError::Io { .. }));
}
