use std::{
    borrow::Cow,
    ffi::{OsStr, OsString},
    io,
    os::unix::process::ExitStatusExt,
    path::PathBuf,
    process::{Command as StdCommand, Output},
};

use log::trace;
use strum_macros::IntoStaticStr;

use cosinstall_api::error::{
    DeployerError, DeployerResultExt, ExecutionEnvironmentMisconfigurationError, ServicingError,
};

#[derive(Debug, thiserror::Error)]
pub enum DependencyError {
    #[error("Failed to find dependency '{dependency}': {source}")]
    NotFound {
        dependency: Dependency,
        #[source]
        source: which::Error,
    },

    #[error("Failed to execute dependency '{dependency}': {inner}")]
    CouldNotExecute {
        dependency: Dependency,
        #[source]
        inner: io::Error,
    },

    #[error("Dependency '{dependency}' finished unsuccessfully: {explanation}\nCmdline: {rendered_command}\n{output}")]
    ExecutionFailed {
        dependency: Dependency,
        rendered_command: String,
        code: Option<i32>,
        signal: Option<i32>,
        stdout: String,
        stderr: String,
        explanation: String,
        output: String,
    },
}

impl From<DependencyError> for DeployerError {
    #[track_caller]
    fn from(value: DependencyError) -> Self {
        match value {
            DependencyError::NotFound { dependency, source } => DeployerError::with_source(
                ExecutionEnvironmentMisconfigurationError::MissingBinary {
                    binary: dependency.name(),
                },
                source.into(),
            ),
            DependencyError::CouldNotExecute { dependency, inner } => DeployerError::with_source(
                ServicingError::CommandCouldNotExecute {
                    binary: dependency.name(),
                },
                inner.into(),
            ),
            DependencyError::ExecutionFailed {
                dependency,
                explanation,
                output,
                ..
            } => DeployerError::with_source(
                ServicingError::CommandFailed {
                    binary: dependency.name(),
                    explanation,
                },
                anyhow::anyhow!(output),
            ),
        }
    }
}

pub trait DependencyResultExt<T> {
    /// Attach a context message to the error.
    fn message(self, context: impl Into<Cow<'static, str>>) -> Result<T, DeployerError>;
}

impl<T> DependencyResultExt<T> for Result<T, Box<DependencyError>> {
    #[track_caller]
    fn message(self, context: impl Into<Cow<'static, str>>) -> Result<T, DeployerError> {
        let result: Result<T, DeployerError> = self.map_err(|e| (*e).into());
        result.message(context)
    }
}

/// Enum of runtime and test dependencies used in the code base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, IntoStaticStr)]
#[strum(serialize_all = "lowercase")]
pub enum Dependency {
    Blkid,
    Chroot,
    Setfiles,
    // Test dependencies
    #[cfg(test)]
    DoesNotExist,
    #[cfg(test)]
    Echo,
    #[cfg(test)]
    False,
}

impl std::fmt::Display for Dependency {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.into())
    }
}

impl Dependency {
    /// Gets the path for a dependency that may live outside of an unprivileged
    /// $PATH
    fn path_override(&self) -> Option<PathBuf> {
        Some(PathBuf::from(match self {
            Self::Setfiles => "/usr/sbin/setfiles",
            _ => return None,
        }))
    }

    /// Gets the name of the dependency
    ///
    /// For example, Dependency::Setfiles => "setfiles"
    pub fn name(&self) -> &'static str {
        self.into()
    }

    /// Gets the path of the dependency on the host
    pub fn path(&self) -> Result<PathBuf, Box<DependencyError>> {
        if let Some(path) = self.path_override().filter(|path| path.exists()) {
            return Ok(path);
        }

        which::which(self.name()).map_err(|source| {
            Box::new(DependencyError::NotFound {
                dependency: *self,
                source,
            })
        })
    }

    /// Converts the dependency to a new Command instance
    /// (Note this does not create a std::process::Command instance)
    pub fn cmd(&self) -> Command {
        Command {
            dependency: *self,
            args: vec![],
        }
    }
}

/// Executes commands on behalf of the engine.
///
/// The host implementation spawns real processes. Tests substitute a double
/// that records invocations and returns canned results.
pub trait Runner: Send + Sync {
    /// Resolves the path of a dependency, failing with
    /// `DependencyError::NotFound` when it is not available.
    fn path(&self, dependency: Dependency) -> Result<PathBuf, Box<DependencyError>>;

    /// Executes the command and captures its output. A non-zero exit status
    /// is not an error at this level, use `CommandOutput::check` for that.
    fn output(&self, command: &Command) -> Result<CommandOutput, Box<DependencyError>>;

    /// Checks if the dependency is present
    fn exists(&self, dependency: Dependency) -> bool {
        self.path(dependency).is_ok()
    }
}

/// Runs commands on the host.
#[derive(Debug, Default, Clone, Copy)]
pub struct HostRunner;

impl Runner for HostRunner {
    fn path(&self, dependency: Dependency) -> Result<PathBuf, Box<DependencyError>> {
        dependency.path()
    }

    fn output(&self, command: &Command) -> Result<CommandOutput, Box<DependencyError>> {
        let mut cmd = StdCommand::new(self.path(command.dependency)?);
        cmd.args(&command.args);
        let rendered_command = command.render_command();
        trace!("Executing '{rendered_command}'");
        let output = cmd
            .output()
            .map_err(|inner| DependencyError::CouldNotExecute {
                dependency: command.dependency,
                inner,
            })?;
        let output = CommandOutput::new(command.dependency, rendered_command.clone(), output);
        trace!(
            "Executed '{rendered_command}': {}. Report:\n{}",
            output.explain_exit(),
            output.output_report(),
        );
        Ok(output)
    }
}

#[derive(Debug, Clone)]
pub struct Command {
    dependency: Dependency,
    args: Vec<OsString>,
}

impl Command {
    pub fn arg<S: AsRef<OsStr>>(&mut self, arg: S) -> &mut Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn with_arg<S: AsRef<OsStr>>(mut self, arg: S) -> Self {
        self.arg(arg);
        self
    }

    pub fn dependency(&self) -> Dependency {
        self.dependency
    }

    pub fn output(&self, runner: &dyn Runner) -> Result<CommandOutput, Box<DependencyError>> {
        runner.output(self)
    }

    pub fn run_and_check(&self, runner: &dyn Runner) -> Result<(), Box<DependencyError>> {
        self.output(runner)?.check()
    }

    pub fn render_command(&self) -> String {
        if self.args.is_empty() {
            self.dependency.to_string()
        } else {
            format!(
                "{} {}",
                self.dependency,
                self.args
                    .iter()
                    .map(|arg| arg.to_string_lossy())
                    .map(|arg| if arg.contains(' ') {
                        format!("'{arg}'")
                    } else {
                        arg.into()
                    })
                    .collect::<Vec<_>>()
                    .join(" "),
            )
        }
    }
}

#[derive(Debug)]
pub struct CommandOutput {
    rendered_command: String,
    dependency: Dependency,
    inner: Output,
}

impl CommandOutput {
    pub(crate) fn new(dependency: Dependency, rendered_command: String, inner: Output) -> Self {
        Self {
            rendered_command,
            dependency,
            inner,
        }
    }

    /// Checks if the process exited successfully
    pub fn success(&self) -> bool {
        self.inner.status.success()
    }

    /// Gets the exit code of the process, if it exited normally
    pub fn code(&self) -> Option<i32> {
        self.inner.status.code()
    }

    /// Gets the signal that terminated the process, if it was terminated by a signal
    fn signal(&self) -> Option<i32> {
        self.inner.status.signal()
    }

    /// Gets stderr
    pub fn error_output(&self) -> String {
        String::from_utf8_lossy(&self.inner.stderr).into()
    }

    /// Gets stdout
    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.inner.stdout).into()
    }

    /// Gets all available output, useful for reporting or debugging
    pub fn output_report(&self) -> String {
        let stdout = self.output();
        let stderr = self.error_output();

        let mut res = String::with_capacity(stdout.len() + stderr.len() + 20);

        if !stdout.is_empty() {
            res += &format!("stdout:\n{stdout}\n");
        }

        if !stderr.is_empty() {
            if !res.is_empty() {
                res += "\n";
            }
            res += &format!("stderr:\n{stderr}\n");
        }

        res
    }

    /// Checks if the process exited successfully, otherwise produces an error
    pub fn check(&self) -> Result<(), Box<DependencyError>> {
        if self.success() {
            return Ok(());
        }

        Err(Box::new(DependencyError::ExecutionFailed {
            dependency: self.dependency,
            rendered_command: self.rendered_command.clone(),
            code: self.code(),
            signal: self.signal(),
            stdout: self.output(),
            stderr: self.error_output(),
            explanation: self.explain_exit(),
            output: match self.output_report() {
                s if !s.is_empty() => s,
                _ => "(no output collected)".into(),
            },
        }))
    }

    /// Checks if the process exited successfully and returns the output,
    /// otherwise produces an error with the output
    pub fn check_output(&self) -> Result<String, Box<DependencyError>> {
        self.check()?;
        Ok(self.output())
    }

    /// Produces a string explaining the exit status of the process
    fn explain_exit(&self) -> String {
        if let Some(code) = self.code() {
            format!("exited with status: {code}")
        } else if let Some(signal) = self.signal() {
            format!("terminated by signal: {signal}")
        } else {
            "exited with unknown status".into()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use cosinstall_api::error::ErrorKind;

    #[test]
    fn test_command() {
        let run_and_check_res = Dependency::Echo
            .cmd()
            .with_arg("Hello, world")
            .run_and_check(&HostRunner);
        run_and_check_res.unwrap();

        let render_command_res = Dependency::Echo
            .cmd()
            .with_arg("Hello, world")
            .render_command();
        assert_eq!(render_command_res, "echo 'Hello, world'");

        let output_res = Dependency::Echo
            .cmd()
            .with_arg("Hello, world")
            .output(&HostRunner);
        assert_eq!(output_res.unwrap().output(), "Hello, world\n");
    }

    #[test]
    fn test_arg_and_with_arg() {
        let mut cmd = Dependency::Echo.cmd();
        cmd.arg("Hello,").arg("world");
        let arg_output = cmd.output(&HostRunner).unwrap().check_output().unwrap();

        let with_arg_output = Dependency::Echo
            .cmd()
            .with_arg("Hello,")
            .with_arg("world")
            .output(&HostRunner)
            .unwrap()
            .check_output()
            .unwrap();

        assert_eq!(arg_output, with_arg_output);
        assert_eq!(arg_output, "Hello, world\n");
    }

    #[test]
    fn test_nonexistent_dep() {
        assert!(!HostRunner.exists(Dependency::DoesNotExist));
        let output = Dependency::DoesNotExist
            .cmd()
            .output(&HostRunner)
            .unwrap_err();
        assert!(matches!(*output, DependencyError::NotFound { .. }));
        assert_eq!(
            output.to_string(),
            "Failed to find dependency 'doesnotexist': cannot find binary path"
        );
    }

    #[test]
    fn test_commandoutput() {
        // This command should succeed
        let output = Dependency::Echo
            .cmd()
            .with_arg("Hello, world")
            .output(&HostRunner)
            .unwrap();
        assert!(output.success());
        assert_eq!(output.code(), Some(0));
        assert_eq!(output.signal(), None);
        assert_eq!(output.error_output(), "");
        assert_eq!(output.output(), "Hello, world\n");
        assert_eq!(output.output_report(), "stdout:\nHello, world\n\n");
        assert!(matches!(output.check(), Ok(())));
        assert!(matches!(output.check_output(), Ok(s) if s == "Hello, world\n"));
        assert_eq!(output.explain_exit(), "exited with status: 0");

        // This command should fail
        let output = Dependency::False.cmd().output(&HostRunner).unwrap();
        assert!(!output.success());
        assert_eq!(output.code(), Some(1));
        assert_eq!(output.signal(), None);
        assert_eq!(output.error_output(), "");
        assert_eq!(output.output(), "");
        assert_eq!(output.output_report(), "");
        assert!(matches!(
            *output.check().unwrap_err(),
            DependencyError::ExecutionFailed { .. }
        ));
        assert!(matches!(
            *output.check_output().unwrap_err(),
            DependencyError::ExecutionFailed { .. }
        ));
        assert_eq!(output.explain_exit(), "exited with status: 1");
    }

    #[test]
    fn test_error_conversion() {
        let error = Dependency::DoesNotExist
            .cmd()
            .run_and_check(&HostRunner)
            .message("Failed to run missing dependency")
            .unwrap_err();
        assert_eq!(
            error.kind(),
            &ErrorKind::ExecutionEnvironmentMisconfiguration(
                ExecutionEnvironmentMisconfigurationError::MissingBinary {
                    binary: "doesnotexist"
                }
            )
        );

        let error = Dependency::False
            .cmd()
            .run_and_check(&HostRunner)
            .message("Failed to run false")
            .unwrap_err();
        assert_eq!(
            error.kind(),
            &ErrorKind::Servicing(ServicingError::CommandFailed {
                binary: "false",
                explanation: "exited with status: 1".into(),
            })
        );
    }
}
