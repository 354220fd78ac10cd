//! Repository configuration.
//!
//! # Storage layout
//!
//! ```text
//! ~/.algorepo/
//!   repository.yaml
//! ```
//!
//! ```yaml
//! remote_url: https://example.org/algorithms.git
//! branch: main
//! local_path: /var/lib/algorepo/algorithms
//! file_pattern: '.*\.java|.*\.R'
//! start_watcher: true
//! extensions:          # optional, extension -> source kind
//!   src: src
//! supported_versions:  # optional
//!   - "2.0.0"
//! ```
//!
//! As in the rest of the workspace, functions taking a home directory come in
//! an `_at(home, …)` form; tests must always use that form.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use regex::Regex;
use serde::Deserialize;

use crate::error::{config_io_err, ConfigError};
use crate::types::SourceKind;

/// Descriptor versions accepted when the configuration does not list any.
pub const DEFAULT_SUPPORTED_VERSIONS: [&str; 2] = ["1.0.0", "2.0.0"];

// ---------------------------------------------------------------------------
// File pattern
// ---------------------------------------------------------------------------

/// File-selection pattern matched against the whole working-copy relative path.
#[derive(Debug, Clone)]
pub struct FilePattern {
    source: String,
    regex: Regex,
}

impl FilePattern {
    pub fn new(pattern: &str) -> Result<Self, ConfigError> {
        let regex = Regex::new(&format!("^(?:{pattern})$")).map_err(|source| {
            ConfigError::InvalidPattern {
                pattern: pattern.to_string(),
                source,
            }
        })?;
        Ok(Self {
            source: pattern.to_string(),
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Match a path relative to the working-copy root, using `/` separators.
    pub fn matches(&self, relative: &Path) -> bool {
        let joined = relative
            .components()
            .filter_map(|c| match c {
                Component::Normal(part) => Some(part.to_string_lossy()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/");
        !joined.is_empty() && self.regex.is_match(&joined)
    }
}

// ---------------------------------------------------------------------------
// Config structs
// ---------------------------------------------------------------------------

/// Immutable description of the remote source a registry mirrors.
#[derive(Debug, Clone)]
pub struct RemoteSource {
    pub url: String,
    pub branch: String,
    pub pattern: FilePattern,
}

/// Validated repository configuration.
#[derive(Debug, Clone)]
pub struct RepositoryConfig {
    pub remote: RemoteSource,
    pub local_path: PathBuf,
    pub start_watcher: bool,
    /// Extension (without dot, lowercase) → source kind overrides.
    pub extensions: BTreeMap<String, SourceKind>,
    pub supported_versions: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    remote_url: Option<String>,
    branch: Option<String>,
    local_path: Option<PathBuf>,
    file_pattern: Option<String>,
    start_watcher: Option<bool>,
    #[serde(default)]
    extensions: BTreeMap<String, SourceKind>,
    #[serde(default)]
    supported_versions: Vec<String>,
}

impl RepositoryConfig {
    /// Build and validate a configuration from its required settings.
    pub fn new(
        remote_url: impl Into<String>,
        branch: impl Into<String>,
        local_path: impl Into<PathBuf>,
        file_pattern: &str,
        start_watcher: bool,
    ) -> Result<Self, ConfigError> {
        let raw = RawConfig {
            remote_url: Some(remote_url.into()),
            branch: Some(branch.into()),
            local_path: Some(local_path.into()),
            file_pattern: Some(file_pattern.to_string()),
            start_watcher: Some(start_watcher),
            ..RawConfig::default()
        };
        Self::validate(raw)
    }

    /// Add an extension → source kind override.
    pub fn with_extension(mut self, extension: &str, kind: SourceKind) -> Self {
        self.extensions
            .insert(normalize_extension(extension), kind);
        self
    }

    pub fn with_supported_versions<I, S>(mut self, versions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.supported_versions = versions.into_iter().map(Into::into).collect();
        self
    }

    /// Parse and validate YAML. `origin` is only used in error messages.
    pub fn from_yaml_str(contents: &str, origin: &Path) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_yaml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;
        Self::validate(raw)
    }

    /// Load the configuration file at `path`.
    pub fn load_at(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| config_io_err(path, e))?;
        Self::from_yaml_str(&contents, path)
    }

    /// Load `~/.algorepo/repository.yaml`.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_at(&default_config_path()?)
    }

    fn validate(raw: RawConfig) -> Result<Self, ConfigError> {
        let url = required_string(raw.remote_url, "remote_url")?;
        let branch = required_string(raw.branch, "branch")?;
        let pattern = required_string(raw.file_pattern, "file_pattern")?;
        let local_path = raw
            .local_path
            .filter(|p| !p.as_os_str().is_empty())
            .ok_or(ConfigError::MissingField { field: "local_path" })?;
        let start_watcher = raw
            .start_watcher
            .ok_or(ConfigError::MissingField { field: "start_watcher" })?;

        check_local_path(&local_path)?;

        let supported_versions = if raw.supported_versions.is_empty() {
            DEFAULT_SUPPORTED_VERSIONS.iter().map(|v| v.to_string()).collect()
        } else {
            raw.supported_versions
        };

        Ok(Self {
            remote: RemoteSource {
                url,
                branch,
                pattern: FilePattern::new(&pattern)?,
            },
            local_path,
            start_watcher,
            extensions: raw
                .extensions
                .into_iter()
                .map(|(ext, kind)| (normalize_extension(&ext), kind))
                .collect(),
            supported_versions,
        })
    }
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.algorepo/repository.yaml`: pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    home.join(".algorepo").join("repository.yaml")
}

/// `config_path_at` for the current user's home directory.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    let home = dirs::home_dir().ok_or(ConfigError::HomeNotFound)?;
    Ok(config_path_at(&home))
}

fn required_string(value: Option<String>, field: &'static str) -> Result<String, ConfigError> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .ok_or(ConfigError::MissingField { field })
}

fn normalize_extension(ext: &str) -> String {
    ext.trim_start_matches('.').to_ascii_lowercase()
}

/// A local path may be absent (it is created by the clone) but if present it
/// must be a readable directory.
fn check_local_path(path: &Path) -> Result<(), ConfigError> {
    if !path.exists() {
        return Ok(());
    }
    if !path.is_dir() {
        return Err(ConfigError::InvalidLocalPath {
            path: path.to_path_buf(),
            reason: "not a directory".to_string(),
        });
    }
    std::fs::read_dir(path).map_err(|e| ConfigError::InvalidLocalPath {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
