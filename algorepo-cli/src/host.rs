//! Host side of the binary: settings file, the external-command build
//! capability and the descriptor-file load capability.
//!
//! ```yaml
//! # ~/.algorepo/repository.yaml, next to the repository settings
//! host:
//!   build_command: "javac -d out {source}"
//!   artifact_extension: class
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;

use anyhow::{Context, Result};
use serde::Deserialize;

use algorepo_core::config::default_config_path;
use algorepo_core::{
    AlgorithmDescriptor, BuildError, Builder, LoadError, Loaded, Loader, RepositoryConfig,
    SourceKind,
};
use algorepo_runtime::AlgorithmRepository;
use algorepo_sync::GitVcs;

const DEFAULT_ARTIFACT_EXTENSION: &str = "class";

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// `host` section of the settings file.
#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    /// Command template; `{source}` and `{artifact}` are substituted.
    #[serde(default)]
    pub build_command: Option<String>,
    #[serde(default = "default_artifact_extension")]
    pub artifact_extension: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            build_command: None,
            artifact_extension: default_artifact_extension(),
        }
    }
}

fn default_artifact_extension() -> String {
    DEFAULT_ARTIFACT_EXTENSION.to_string()
}

#[derive(Debug, Default, Deserialize)]
struct HostFile {
    #[serde(default)]
    host: HostConfig,
}

/// Everything the binary reads from its settings file.
#[derive(Debug, Clone)]
pub struct Settings {
    pub repository: RepositoryConfig,
    pub host: HostConfig,
}

impl Settings {
    /// Load `path`, or `~/.algorepo/repository.yaml` when `None`.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => default_config_path().context("could not locate settings file")?,
        };
        let contents = fs::read_to_string(&path)
            .with_context(|| format!("failed to read settings at {}", path.display()))?;
        Self::from_yaml_str(&contents, &path)
    }

    pub fn from_yaml_str(contents: &str, origin: &Path) -> Result<Self> {
        let repository = RepositoryConfig::from_yaml_str(contents, origin)
            .with_context(|| format!("invalid repository settings in {}", origin.display()))?;
        let host: HostFile = serde_yaml::from_str(contents)
            .with_context(|| format!("invalid host settings in {}", origin.display()))?;
        Ok(Self {
            repository,
            host: host.host,
        })
    }

    /// Open the repository with libgit2 and the host capabilities.
    pub fn open(
        mut self,
        start_watcher: bool,
    ) -> Result<AlgorithmRepository<CommandBuilder, DescriptorLoader>> {
        self.repository.start_watcher = start_watcher;
        let url = self.repository.remote.url.clone();
        AlgorithmRepository::open(
            self.repository,
            Box::new(GitVcs::new()),
            CommandBuilder::new(&self.host),
            DescriptorLoader,
        )
        .map_err(|err| {
            let what = if err.is_configuration() {
                "local working copy is unusable".to_string()
            } else {
                format!("could not synchronize with {url}")
            };
            anyhow::Error::new(err).context(what)
        })
    }
}

// ---------------------------------------------------------------------------
// Build capability
// ---------------------------------------------------------------------------

/// Runs an external command per source file.
#[derive(Debug, Clone)]
pub struct CommandBuilder {
    template: Option<Vec<String>>,
    artifact_extension: String,
}

impl CommandBuilder {
    pub fn new(host: &HostConfig) -> Self {
        Self {
            template: host
                .build_command
                .as_deref()
                .map(|cmd| cmd.split_whitespace().map(str::to_string).collect()),
            artifact_extension: host.artifact_extension.trim_start_matches('.').to_string(),
        }
    }
}

impl Builder for CommandBuilder {
    fn artifact_path(&self, _kind: &SourceKind, source: &Path) -> PathBuf {
        source.with_extension(&self.artifact_extension)
    }

    fn build(&self, kind: &SourceKind, source: &Path) -> Result<(), BuildError> {
        let failed = |message: String| BuildError::Failed {
            path: source.to_path_buf(),
            message,
        };
        let template = self
            .template
            .as_ref()
            .ok_or_else(|| failed(format!("no build command configured for {kind} sources")))?;

        let artifact = self.artifact_path(kind, source);
        let args: Vec<String> = template
            .iter()
            .map(|part| {
                part.replace("{source}", &source.to_string_lossy())
                    .replace("{artifact}", &artifact.to_string_lossy())
            })
            .collect();
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| failed("empty build command".to_string()))?;

        let mut command = Command::new(program);
        command.args(rest);
        if let Some(dir) = source.parent() {
            command.current_dir(dir);
        }
        let output = command.output().map_err(|e| BuildError::Io {
            path: PathBuf::from(program),
            source: e,
        })?;
        if output.status.success() {
            Ok(())
        } else {
            Err(failed(format!(
                "{program} exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )))
        }
    }
}

// ---------------------------------------------------------------------------
// Load capability
// ---------------------------------------------------------------------------

/// Reads `<name>.descriptor.yaml` from the search path. The component handed
/// to callers is the descriptor file location.
#[derive(Debug, Clone, Copy, Default)]
pub struct DescriptorLoader;

impl Loader for DescriptorLoader {
    type Component = PathBuf;

    fn load(
        &self,
        name: &str,
        _kind: &SourceKind,
        search_path: &Path,
    ) -> Result<Loaded<PathBuf>, LoadError> {
        let path = search_path.join(format!("{name}.descriptor.yaml"));
        let contents = match fs::read_to_string(&path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(LoadError::NotLoadable {
                    name: name.to_string(),
                    reason: format!("{} not found", path.display()),
                })
            }
            Err(err) => return Err(LoadError::Io { path, source: err }),
        };
        let descriptor: AlgorithmDescriptor =
            serde_yaml::from_str(&contents).map_err(|e| LoadError::InvalidDescriptor {
                name: name.to_string(),
                reason: e.to_string(),
            })?;
        Ok(Loaded {
            component: path,
            descriptor,
        })
    }
}
