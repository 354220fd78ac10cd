//! Error types for algorepo-core.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::AlgorithmId;

/// Errors raised while reading or validating repository configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Underlying I/O failure while reading the configuration file.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// YAML parse error: includes file path and line context from serde_yaml.
    #[error("failed to parse configuration at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// A required setting is absent or blank.
    #[error("missing required setting '{field}'")]
    MissingField { field: &'static str },

    /// The file-selection pattern is not a valid regular expression.
    #[error("invalid file pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// The local working-copy path cannot be used.
    #[error("invalid local path {path}: {reason}")]
    InvalidLocalPath { path: PathBuf, reason: String },

    /// `dirs::home_dir()` returned `None`: cannot locate `~/.algorepo/`.
    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,
}

/// Errors from registry lookups.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    /// The caller asked for an identifier that is not registered.
    #[error("no such algorithm: {identifier}")]
    NoSuchAlgorithm { identifier: AlgorithmId },
}

/// Failure reported by a build capability.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("build of {path} failed: {message}")]
    Failed { path: PathBuf, message: String },
}

/// Failure reported by a load capability.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The artifact exists but does not satisfy the expected contract.
    #[error("'{name}' is not loadable: {reason}")]
    NotLoadable { name: String, reason: String },

    /// The descriptor was loaded but is not acceptable to this host.
    #[error("descriptor of '{name}' is invalid: {reason}")]
    InvalidDescriptor { name: String, reason: String },
}

pub(crate) fn config_io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ConfigError {
    ConfigError::Io {
        path: path.into(),
        source,
    }
}
