//! algorepo core library: domain types, configuration, the in-memory
//! registry, and the capability traits a host implements.
//!
//! - [`types`]: newtypes, descriptors, change log
//! - [`config`]: [`RepositoryConfig`] loading and validation
//! - [`registry`]: [`Registry`] with forward and reverse indices
//! - [`capability`]: [`Builder`] / [`Loader`]
//! - [`error`]: error enums

pub mod capability;
pub mod config;
pub mod error;
pub mod registry;
pub mod types;

pub use capability::{Builder, Loaded, Loader};
pub use config::{FilePattern, RemoteSource, RepositoryConfig};
pub use error::{BuildError, ConfigError, LoadError, RegistryError};
pub use registry::{RegisteredAlgorithm, Registry};
pub use types::{
    AlgorithmDescriptor, AlgorithmId, ChangeEntry, ChangeKind, ChangeLog, ParameterSpec,
    SourceKind,
};
