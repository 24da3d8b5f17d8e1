use std::{
    collections::{HashMap, HashSet},
    os::unix::process::ExitStatusExt,
    path::{Path, PathBuf},
    process::{ExitStatus, Output},
    sync::Mutex,
};

use crate::dependencies::{Command, CommandOutput, Dependency, DependencyError, Runner};

/// Canned result returned by `MockRunner` for a dependency.
#[derive(Debug, Clone, Default)]
pub struct MockResponse {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Runner double that never spawns processes.
///
/// Every dependency is considered present and exits successfully with empty
/// output unless configured otherwise. Executed commands are recorded and can
/// be inspected with `history()`.
#[derive(Debug, Default)]
pub struct MockRunner {
    missing: HashSet<Dependency>,
    responses: HashMap<Dependency, MockResponse>,
    command_responses: HashMap<String, MockResponse>,
    history: Mutex<Vec<String>>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the dependency unavailable.
    pub fn with_missing(mut self, dependency: Dependency) -> Self {
        self.missing.insert(dependency);
        self
    }

    /// Makes the dependency exit successfully, printing `stdout`.
    pub fn with_output(self, dependency: Dependency, stdout: impl Into<String>) -> Self {
        self.with_response(
            dependency,
            MockResponse {
                stdout: stdout.into(),
                ..Default::default()
            },
        )
    }

    /// Makes the dependency exit with `code` and no output.
    pub fn with_exit_code(self, dependency: Dependency, code: i32) -> Self {
        self.with_response(
            dependency,
            MockResponse {
                code,
                ..Default::default()
            },
        )
    }

    pub fn with_response(mut self, dependency: Dependency, response: MockResponse) -> Self {
        self.responses.insert(dependency, response);
        self
    }

    /// Answers one exact command line, as rendered by
    /// `Command::render_command`, with `response`. Takes precedence over the
    /// per dependency response.
    pub fn with_command_response(
        mut self,
        command: impl Into<String>,
        response: MockResponse,
    ) -> Self {
        self.command_responses.insert(command.into(), response);
        self
    }

    /// Makes one exact command line exit successfully, printing `stdout`.
    pub fn with_command_output(
        self,
        command: impl Into<String>,
        stdout: impl Into<String>,
    ) -> Self {
        self.with_command_response(
            command,
            MockResponse {
                stdout: stdout.into(),
                ..Default::default()
            },
        )
    }

    /// Rendered command lines executed so far, in order.
    pub fn history(&self) -> Vec<String> {
        self.history.lock().unwrap().clone()
    }
}

impl Runner for MockRunner {
    fn path(&self, dependency: Dependency) -> Result<PathBuf, Box<DependencyError>> {
        if self.missing.contains(&dependency) {
            return Err(Box::new(DependencyError::NotFound {
                dependency,
                source: which::Error::CannotFindBinaryPath,
            }));
        }

        Ok(Path::new("/usr/bin").join(dependency.name()))
    }

    fn output(&self, command: &Command) -> Result<CommandOutput, Box<DependencyError>> {
        self.path(command.dependency())?;

        let rendered_command = command.render_command();
        self.history.lock().unwrap().push(rendered_command.clone());

        let response = self
            .command_responses
            .get(&rendered_command)
            .or_else(|| self.responses.get(&command.dependency()))
            .cloned()
            .unwrap_or_default();

        Ok(CommandOutput::new(
            command.dependency(),
            rendered_command,
            Output {
                status: ExitStatus::from_raw(response.code << 8),
                stdout: response.stdout.into_bytes(),
                stderr: response.stderr.into_bytes(),
            },
        ))
    }
}
