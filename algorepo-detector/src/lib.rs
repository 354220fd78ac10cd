//! Source-kind classification for `algorepo-detector`.
//!
//! `Classifier::classify(path)` decides which language family a candidate file
//! belongs to. Checks are ordered by specificity: host overrides first, then
//! the built-in extension table, then content sniffing of the file head.

use std::collections::HashMap;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use algorepo_core::types::SourceKind;
use thiserror::Error;

/// Bytes read from the start of a file when sniffing its content.
const SNIFF_LEN: u64 = 4096;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// Confidence level of a classification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confidence {
    /// Decided by extension (override or built-in table).
    High,
    /// Decided by content sniffing.
    Medium,
}

/// Result of classifying one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub kind: SourceKind,
    pub confidence: Confidence,
}

/// Errors from classification.
#[derive(Debug, Error)]
pub enum DetectError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(
        "could not determine source kind of '{path}': \
         unknown extension and no recognizable content"
    )]
    UnknownKind { path: PathBuf },
}

/// Extension and content based classifier.
#[derive(Debug, Clone, Default)]
pub struct Classifier {
    overrides: HashMap<String, SourceKind>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

impl Classifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Map `extension` (with or without leading dot, any case) to `kind`.
    /// Overrides win over the built-in table.
    pub fn with_extension(mut self, extension: &str, kind: SourceKind) -> Self {
        self.overrides.insert(normalize(extension), kind);
        self
    }

    /// Add every mapping of `extensions`.
    pub fn with_extensions<'a, I>(self, extensions: I) -> Self
    where
        I: IntoIterator<Item = (&'a String, &'a SourceKind)>,
    {
        extensions
            .into_iter()
            .fold(self, |c, (ext, kind)| c.with_extension(ext, kind.clone()))
    }

    /// Classify the file at `path`.
    ///
    /// Returns `DetectError::UnknownKind` if neither the extension nor the
    /// content identifies a supported kind.
    pub fn classify(&self, path: &Path) -> Result<Classification, DetectError> {
        if let Some(kind) = self.by_extension(path) {
            return Ok(Classification {
                kind,
                confidence: Confidence::High,
            });
        }

        let head = read_head(path)?;
        if let Some(kind) = detect_from_shebang(&head) {
            return Ok(Classification {
                kind,
                confidence: Confidence::Medium,
            });
        }
        if looks_like_java(&head) {
            return Ok(Classification {
                kind: SourceKind::Java,
                confidence: Confidence::Medium,
            });
        }

        Err(DetectError::UnknownKind {
            path: path.to_path_buf(),
        })
    }

    fn by_extension(&self, path: &Path) -> Option<SourceKind> {
        let ext = normalize(path.extension()?.to_str()?);
        if let Some(kind) = self.overrides.get(&ext) {
            return Some(kind.clone());
        }
        match ext.as_str() {
            "java" => Some(SourceKind::Java),
            "r" => Some(SourceKind::R),
            "py" => Some(SourceKind::Python),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// Content detectors
// ---------------------------------------------------------------------------

fn detect_from_shebang(head: &str) -> Option<SourceKind> {
    let first = head.lines().next()?.trim();
    let interpreter = first.strip_prefix("#!")?;
    let lower = interpreter.to_lowercase();
    if lower.contains("rscript") {
        Some(SourceKind::R)
    } else if lower.contains("python") {
        Some(SourceKind::Python)
    } else {
        None
    }
}

fn looks_like_java(head: &str) -> bool {
    head.lines().map(str::trim).any(|line| {
        (line.starts_with("package ") && line.ends_with(';'))
            || line.starts_with("public class ")
            || line.starts_with("@Algorithm")
    })
}

// ---------------------------------------------------------------------------
// Utilities
// ---------------------------------------------------------------------------

fn read_head(path: &Path) -> Result<String, DetectError> {
    let io_err = |source| DetectError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = File::open(path).map_err(io_err)?;
    let mut buf = Vec::new();
    file.take(SNIFF_LEN).read_to_end(&mut buf).map_err(io_err)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn normalize(ext: &str) -> String {
    ext.trim_start_matches('.').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shebang_detection() {
        assert_eq!(detect_from_shebang("#!/usr/bin/env Rscript\n"), Some(SourceKind::R));
        assert_eq!(detect_from_shebang("#!/usr/bin/python3\n"), Some(SourceKind::Python));
        assert_eq!(detect_from_shebang("#!/bin/sh\n"), None);
        assert_eq!(detect_from_shebang("print(1)\n"), None);
    }

    #[test]
    fn java_markers() {
        assert!(looks_like_java("package org.example;\n\nclass X {}"));
        assert!(looks_like_java("@Algorithm(version = \"1.0\")\npublic class Buffer {}"));
        assert!(!looks_like_java("x <- 1\n"));
    }
}
