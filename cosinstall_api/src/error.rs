use std::fmt::{Debug, Display, Write};
use std::path::PathBuf;
use std::{borrow::Cow, panic::Location};

use serde::{ser::SerializeStruct, Serialize};
use strum_macros::IntoStaticStr;

/// The deployment safety check refused to continue.
#[derive(Debug, Eq, thiserror::Error, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum SafetyCheckError {
    #[error(
        "There is already an active deployment in the system (label '{label}' found on '{}'), \
        use the force option to overwrite it",
        .device.display()
    )]
    AlreadyDeployed { label: String, device: PathBuf },
}

/// Copying the OS tree into the target failed.
#[derive(Debug, Eq, thiserror::Error, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum CopyError {
    #[error("Copy source '{}' is not a directory", .path.display())]
    SourceNotDirectory { path: PathBuf },
    #[error("Copy target '{}' is not an existing directory", .path.display())]
    TargetNotDirectory { path: PathBuf },
    #[error("Failed to list directory '{}'", .path.display())]
    ReadDirectory { path: PathBuf },
    #[error("Failed to inspect '{}'", .path.display())]
    Inspect { path: PathBuf },
    #[error("Failed to create directory '{}'", .path.display())]
    CreateDirectory { path: PathBuf },
    #[error("Failed to copy file '{}'", .path.display())]
    CopyFile { path: PathBuf },
    #[error("Failed to copy symlink '{}'", .path.display())]
    CopySymlink { path: PathBuf },
    #[error("Failed to set permissions of '{}'", .path.display())]
    SetPermissions { path: PathBuf },
}

/// Installing the user cloud-config into the target failed.
#[derive(Debug, Eq, thiserror::Error, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum CloudConfigError {
    #[error("Failed to read cloud-config '{}'", .path.display())]
    ReadSource { path: PathBuf },
    #[error("Failed to create OEM directory '{}'", .path.display())]
    CreateOemDirectory { path: PathBuf },
    #[error("Failed to write cloud-config to '{}'", .path.display())]
    WriteDestination { path: PathBuf },
}

/// Restoring SELinux labels on the target failed.
#[derive(Debug, Eq, thiserror::Error, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum RelabelError {
    #[error("Cannot relabel, '{binary}' binary not found")]
    MissingTool { binary: String },
    #[error("Failed to read SELinux configuration '{}'", .path.display())]
    ReadSelinuxConfig { path: PathBuf },
    #[error("Failed to inspect SELinux file contexts '{}'", .path.display())]
    InspectFileContexts { path: PathBuf },
    #[error("Failed to run setfiles on '{}'", .target.display())]
    RunSetfiles { target: PathBuf },
}

/// User provided input was invalid.
#[derive(Debug, Eq, thiserror::Error, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum InvalidInputError {
    #[error("Failed to load configuration file from '{path}'")]
    LoadConfiguration { path: String },
    #[error("Failed to parse configuration")]
    ParseConfiguration,
    #[error("Configuration field '{field}' must not be empty")]
    EmptyPath { field: &'static str },
    #[error("Configuration field '{field}' must be an absolute path, got '{}'", .path.display())]
    RelativePath { field: &'static str, path: PathBuf },
}

/// The environment the installer runs in is missing something it needs.
#[derive(Debug, Eq, thiserror::Error, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum ExecutionEnvironmentMisconfigurationError {
    #[error("Failed to find required binary '{binary}'")]
    MissingBinary { binary: &'static str },
}

/// An external command did not complete successfully.
#[derive(Debug, Eq, thiserror::Error, Serialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
pub enum ServicingError {
    #[error("Failed to execute '{binary}'")]
    CommandCouldNotExecute { binary: &'static str },
    #[error("Command '{binary}' {explanation}")]
    CommandFailed {
        binary: &'static str,
        explanation: String,
    },
}

/// Each variant of `ErrorKind` corresponds to a different category of error.
/// Callers match on the category to decide how to react, e.g. a relabel error
/// may be ignorable on hosts without SELinux while a safety check error never
/// is.
#[derive(Debug, Eq, thiserror::Error, IntoStaticStr, PartialEq)]
#[strum(serialize_all = "kebab-case")]
pub enum ErrorKind {
    /// The installation would overwrite an existing deployment.
    #[error(transparent)]
    SafetyCheck(#[from] SafetyCheckError),

    /// Copying the OS tree failed.
    #[error(transparent)]
    Copy(#[from] CopyError),

    /// Injecting the cloud-config failed.
    #[error(transparent)]
    CloudConfig(#[from] CloudConfigError),

    /// SELinux relabeling failed.
    #[error(transparent)]
    Relabel(#[from] RelabelError),

    /// The provided configuration was invalid.
    #[error(transparent)]
    InvalidInput(#[from] InvalidInputError),

    /// The execution environment was misconfigured.
    #[error(transparent)]
    ExecutionEnvironmentMisconfiguration(#[from] ExecutionEnvironmentMisconfigurationError),

    /// An external command failed.
    #[error(transparent)]
    Servicing(#[from] ServicingError),
}

#[derive(Debug)]
struct DeployerErrorInner {
    kind: ErrorKind,
    location: &'static Location<'static>,
    source: Option<anyhow::Error>,
    context: Vec<(Cow<'static, str>, &'static Location<'static>)>,
}

pub struct DeployerError(Box<DeployerErrorInner>);
impl DeployerError {
    #[track_caller]
    pub fn new(kind: impl Into<ErrorKind>) -> Self {
        DeployerError(Box::new(DeployerErrorInner {
            kind: kind.into(),
            location: Location::caller(),
            source: None,
            context: Vec::new(),
        }))
    }

    #[track_caller]
    pub fn with_source(kind: impl Into<ErrorKind>, source: anyhow::Error) -> Self {
        DeployerError(Box::new(DeployerErrorInner {
            kind: kind.into(),
            location: Location::caller(),
            source: Some(source),
            context: Vec::new(),
        }))
    }

    pub fn unstructured(self, context: impl Into<Cow<'static, str>>) -> anyhow::Error {
        match self.0.source {
            Some(source) => source.context(self.0.kind).context(context.into()),
            None => anyhow::Error::from(self.0.kind).context(context.into()),
        }
    }

    /// Returns a reference to the inner ErrorKind.
    pub fn kind(&self) -> &ErrorKind {
        &self.0.kind
    }

    /// Returns the underlying cause, if any.
    pub fn source(&self) -> Option<&anyhow::Error> {
        self.0.source.as_ref()
    }
}

pub trait ReportError<T, K> {
    /// Convert this error into a structured DeployerError.
    fn structured(self, kind: K) -> Result<T, DeployerError>;
}

impl<T, K> ReportError<T, K> for Option<T>
where
    K: Into<ErrorKind>,
{
    #[track_caller]
    fn structured(self, kind: K) -> Result<T, DeployerError> {
        match self {
            Some(t) => Ok(t),
            None => Err(DeployerError::new(kind)),
        }
    }
}

impl<T, E, K> ReportError<T, K> for Result<T, E>
where
    E: Into<anyhow::Error>,
    K: Into<ErrorKind>,
{
    #[track_caller]
    fn structured(self, kind: K) -> Result<T, DeployerError> {
        match self {
            Ok(o) => Ok(o),
            Err(e) => Err(DeployerError::with_source(kind, e.into())),
        }
    }
}

pub trait DeployerResultExt<T> {
    /// Attach a context message to the error.
    fn message(self, context: impl Into<Cow<'static, str>>) -> Result<T, DeployerError>;

    /// Convert the error into an unstructured error.
    fn unstructured(self, context: impl Into<Cow<'static, str>>) -> Result<T, anyhow::Error>;
}
impl<T> DeployerResultExt<T> for Result<T, DeployerError> {
    #[track_caller]
    fn message(mut self, context: impl Into<Cow<'static, str>>) -> Result<T, DeployerError> {
        if let Err(ref mut e) = self {
            e.0.context.push((context.into(), Location::caller()));
        }
        self
    }

    fn unstructured(self, context: impl Into<Cow<'static, str>>) -> Result<T, anyhow::Error> {
        self.map_err(|e| e.unstructured(context))
    }
}

impl Serialize for DeployerError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("deployer-error", 5)?;
        state.serialize_field("message", &self.0.kind.to_string())?;
        match self.0.kind {
            ErrorKind::SafetyCheck(ref e) => state.serialize_field("error", e)?,
            ErrorKind::Copy(ref e) => state.serialize_field("error", e)?,
            ErrorKind::CloudConfig(ref e) => state.serialize_field("error", e)?,
            ErrorKind::Relabel(ref e) => state.serialize_field("error", e)?,
            ErrorKind::InvalidInput(ref e) => state.serialize_field("error", e)?,
            ErrorKind::ExecutionEnvironmentMisconfiguration(ref e) => {
                state.serialize_field("error", e)?
            }
            ErrorKind::Servicing(ref e) => state.serialize_field("error", e)?,
        }
        state.serialize_field("category", <&str>::from(&self.0.kind))?;
        state.serialize_field(
            "location",
            &format!("{}:{}", self.0.location.file(), self.0.location.line()),
        )?;
        match self.0.source {
            Some(ref e) => state.serialize_field("cause", &Some(format!("{e:?}")))?,
            None => state.serialize_field("cause", &None::<String>)?,
        }
        state.end()
    }
}

impl Display for DeployerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.kind)
    }
}

impl Debug for DeployerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} at {}:{}",
            self.0.kind,
            self.0.location.file(),
            self.0.location.line()
        )?;

        if !self.0.context.is_empty() {
            writeln!(f, "\n\nContext:")?;
            for (i, (context, location)) in self.0.context.iter().enumerate() {
                for (j, line) in context.split('\n').enumerate() {
                    if j == 0 {
                        write!(f, "{i: >5}: ")?;
                    } else {
                        f.write_str("\n       ")?;
                    }
                    f.write_str(line)?;
                }
                writeln!(f, " at {}:{}", location.file(), location.line())?;
            }
        }

        if let Some(ref source) = self.0.source {
            writeln!(f, "\n\nCaused by:")?;
            let mut index = 0;
            let mut source: Option<&dyn std::error::Error> = Some(source.as_ref());
            while let Some(e) = source {
                for (i, line) in e.to_string().split('\n').enumerate() {
                    if i == 0 {
                        write!(f, "{index: >5}: ")?;
                    } else {
                        f.write_str("\n       ")?;
                    }
                    f.write_str(line)?;
                }
                f.write_char('\n')?;
                source = e.source();
                index += 1;
            }
        }
        Ok(())
    }
}
