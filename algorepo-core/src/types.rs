//! Domain types shared by every algorepo crate.
//!
//! All path fields use `PathBuf`; never `&str` or `String` for filesystem paths.

use std::borrow::Borrow;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Identifier of a registered algorithm, unique within one registry.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlgorithmId(pub String);

impl AlgorithmId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AlgorithmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for AlgorithmId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for AlgorithmId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl Borrow<str> for AlgorithmId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Source kinds
// ---------------------------------------------------------------------------

/// Language family of a candidate source file.
///
/// Compiled kinds go through the build gate before loading; interpreted kinds
/// are handed to the loader as-is.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SourceKind {
    Java,
    R,
    Python,
    /// Host-defined compiled kind, named after its extension or label.
    Custom(String),
}

impl SourceKind {
    /// Whether a compiled artifact must exist before the file can be loaded.
    pub fn requires_build(&self) -> bool {
        match self {
            SourceKind::Java | SourceKind::Custom(_) => true,
            SourceKind::R | SourceKind::Python => false,
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceKind::Java => write!(f, "java"),
            SourceKind::R => write!(f, "r"),
            SourceKind::Python => write!(f, "python"),
            SourceKind::Custom(label) => write!(f, "{label}"),
        }
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err("source kind must not be empty".to_string());
        }
        Ok(match trimmed.to_ascii_lowercase().as_str() {
            "java" => SourceKind::Java,
            "r" => SourceKind::R,
            "python" | "py" => SourceKind::Python,
            other => SourceKind::Custom(other.to_string()),
        })
    }
}

impl TryFrom<String> for SourceKind {
    type Error = String;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<SourceKind> for String {
    fn from(kind: SourceKind) -> Self {
        kind.to_string()
    }
}

// ---------------------------------------------------------------------------
// Descriptors
// ---------------------------------------------------------------------------

/// One input or output slot of an algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterSpec {
    pub name: String,
    /// Data type name as understood by the host (e.g. `"string"`, `"GeoTIFF"`).
    pub data_type: String,
    #[serde(default = "default_occurs")]
    pub min_occurs: u32,
    #[serde(default = "default_occurs")]
    pub max_occurs: u32,
}

fn default_occurs() -> u32 {
    1
}

/// Contract of a loaded algorithm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlgorithmDescriptor {
    pub identifier: AlgorithmId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// Interaction protocol versions this algorithm can be described for.
    #[serde(default)]
    pub versions: Vec<String>,
    #[serde(default)]
    pub inputs: Vec<ParameterSpec>,
    #[serde(default)]
    pub outputs: Vec<ParameterSpec>,
}

impl AlgorithmDescriptor {
    pub fn new(identifier: impl Into<AlgorithmId>) -> Self {
        Self {
            identifier: identifier.into(),
            title: None,
            versions: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    pub fn with_versions<I, S>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.versions = versions.into_iter().map(Into::into).collect();
        self
    }

    /// True if any of `supported` is listed in this descriptor.
    pub fn supports_any(&self, supported: &[String]) -> bool {
        self.versions.iter().any(|v| supported.contains(v))
    }
}

// ---------------------------------------------------------------------------
// Change log
// ---------------------------------------------------------------------------

/// Kind of a path-level difference between two working-copy states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Add,
    Modify,
    Delete,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Add => write!(f, "add"),
            ChangeKind::Modify => write!(f, "modify"),
            ChangeKind::Delete => write!(f, "delete"),
        }
    }
}

/// A single change entry. Paths are relative to the working-copy root.
///
/// `old_path` is set for modify/delete, `new_path` for add/modify.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEntry {
    pub kind: ChangeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub old_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_path: Option<PathBuf>,
}

impl ChangeEntry {
    pub fn added(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: ChangeKind::Add,
            old_path: None,
            new_path: Some(path.into()),
        }
    }

    pub fn modified(old: impl Into<PathBuf>, new: impl Into<PathBuf>) -> Self {
        Self {
            kind: ChangeKind::Modify,
            old_path: Some(old.into()),
            new_path: Some(new.into()),
        }
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: ChangeKind::Delete,
            old_path: Some(path.into()),
            new_path: None,
        }
    }

    /// Paths this entry marks as having new content (empty for deletes).
    pub fn changed_paths(&self) -> impl Iterator<Item = &Path> {
        let paths: [Option<&Path>; 2] = match self.kind {
            ChangeKind::Add => [self.new_path.as_deref(), None],
            ChangeKind::Modify => [self.new_path.as_deref(), self.old_path.as_deref()],
            ChangeKind::Delete => [None, None],
        };
        paths.into_iter().flatten()
    }
}

/// Ordered set of change entries produced by one update cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLog {
    entries: Vec<ChangeEntry>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an entry, skipping exact duplicates.
    pub fn push(&mut self, entry: ChangeEntry) {
        if !self.entries.contains(&entry) {
            self.entries.push(entry);
        }
    }

    pub fn entries(&self) -> &[ChangeEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn count(&self, kind: ChangeKind) -> usize {
        self.entries.iter().filter(|e| e.kind == kind).count()
    }

    /// Keep only the entries for which `keep` returns `true`, preserving order.
    pub fn retain(&mut self, keep: impl FnMut(&ChangeEntry) -> bool) {
        self.entries.retain(keep);
    }
}

impl FromIterator<ChangeEntry> for ChangeLog {
    fn from_iter<T: IntoIterator<Item = ChangeEntry>>(iter: T) -> Self {
        let mut log = ChangeLog::new();
        for entry in iter {
            log.push(entry);
        }
        log
    }
}

impl IntoIterator for ChangeLog {
    type Item = ChangeEntry;
    type IntoIter = std::vec::IntoIter<ChangeEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
