use std::path::{Path, PathBuf};

use log::debug;
use serde::{Deserialize, Serialize};

use crate::{
    constants::{ACTIVE_LABEL, PASSIVE_LABEL},
    error::{DeployerError, InvalidInputError, ReportError},
    is_default,
};

fn default_active_label() -> String {
    ACTIVE_LABEL.into()
}

fn default_passive_label() -> String {
    PASSIVE_LABEL.into()
}

/// Describes one installation of an OS tree onto a target.
///
/// The configuration is built once per installer invocation and is treated as
/// read-only by every engine operation.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct InstallConfig {
    /// Directory the OS tree is installed into. Must be absolute.
    pub target: PathBuf,

    /// Directory holding the OS tree to install. Must be absolute.
    pub source: PathBuf,

    /// Optional cloud-config file injected into the target. An empty path is
    /// equivalent to not providing one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud_init: Option<PathBuf>,

    /// Block device the installation is directed at, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device: Option<PathBuf>,

    /// Reuse the existing partitions instead of recreating them.
    #[serde(default, skip_serializing_if = "is_default")]
    pub no_format: bool,

    /// Proceed even when an active deployment is detected.
    #[serde(default, skip_serializing_if = "is_default")]
    pub force: bool,

    /// Filesystem label of the active slot.
    #[serde(default = "default_active_label")]
    pub active_label: String,

    /// Filesystem label of the passive slot.
    #[serde(default = "default_passive_label")]
    pub passive_label: String,
}

impl Default for InstallConfig {
    fn default() -> Self {
        Self {
            target: PathBuf::new(),
            source: PathBuf::new(),
            cloud_init: None,
            device: None,
            no_format: false,
            force: false,
            active_label: default_active_label(),
            passive_label: default_passive_label(),
        }
    }
}

impl InstallConfig {
    /// Parses a configuration from a YAML document.
    pub fn from_yaml(contents: &str) -> Result<Self, DeployerError> {
        serde_yaml::from_str(contents).structured(InvalidInputError::ParseConfiguration)
    }

    /// Loads a configuration from a YAML file on the host.
    ///
    /// Loading happens before any engine step runs and before the
    /// filesystem and runner are chosen, so the file is read with `std::fs`
    /// directly. Use `from_yaml` to parse contents obtained some other way.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, DeployerError> {
        debug!("Loading configuration from '{}'", path.as_ref().display());
        let contents = std::fs::read_to_string(path.as_ref()).structured(
            InvalidInputError::LoadConfiguration {
                path: path.as_ref().display().to_string(),
            },
        )?;
        Self::from_yaml(&contents)
    }

    /// Returns the cloud-config source, treating an empty path as unset.
    pub fn cloud_init_source(&self) -> Option<&Path> {
        self.cloud_init
            .as_deref()
            .filter(|path| !path.as_os_str().is_empty())
    }

    /// Checks that the target path is usable.
    pub fn validate_target(&self) -> Result<(), DeployerError> {
        validate_path("target", &self.target)
    }

    /// Checks that the source and target paths can be used for copying.
    pub fn validate_paths(&self) -> Result<(), DeployerError> {
        validate_path("source", &self.source)?;
        self.validate_target()
    }
}

fn validate_path(field: &'static str, path: &Path) -> Result<(), DeployerError> {
    if path.as_os_str().is_empty() {
        return Err(DeployerError::new(InvalidInputError::EmptyPath { field }));
    }

    if !path.is_absolute() {
        return Err(DeployerError::new(InvalidInputError::RelativePath {
            field,
            path: path.to_path_buf(),
        }));
    }

    Ok(())
}
