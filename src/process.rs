//! External command execution behind a small trait so SSH tooling can be
//! scripted in tests.

use std::ffi::OsString;
use std::process::Command;

use thiserror::Error;
use tracing::debug;

/// Result of running an external command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }

    /// Renders the exit status for error messages.
    #[must_use]
    pub fn status_text(&self) -> String {
        self.code
            .map_or_else(|| String::from("unknown"), |code| code.to_string())
    }
}

/// Errors raised while launching external commands.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CommandError {
    /// Raised when a command cannot be spawned.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Command that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
}

/// Abstraction over command execution to support fakes in tests.
///
/// Runners are shared across the blocking tasks that execute instance suites
/// in parallel, so implementations must be thread-safe.
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with the given arguments, capturing stdout and stderr.
    ///
    /// # Errors
    ///
    /// Returns [`CommandError::Spawn`] if the command cannot be started.
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, CommandError>;
}

/// Real command runner that shells out to the host operating system.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, CommandError> {
        debug!(program, ?args, "spawning command");
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|err| CommandError::Spawn {
                program: program.to_owned(),
                message: err.to_string(),
            })?;

        Ok(CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Some(0), true, "0")]
    #[case(Some(3), false, "3")]
    #[case(None, false, "unknown")]
    fn command_output_reports_status(
        #[case] code: Option<i32>,
        #[case] success: bool,
        #[case] text: &str,
    ) {
        let output = CommandOutput {
            code,
            stdout: String::new(),
            stderr: String::new(),
        };
        assert_eq!(output.is_success(), success);
        assert_eq!(output.status_text(), text);
    }

    #[test]
    fn process_runner_reports_spawn_failure() {
        let err = ProcessCommandRunner
            .run("imageproof-definitely-missing-binary", &[])
            .expect_err("missing binary should fail to spawn");
        assert!(
            matches!(err, CommandError::Spawn { ref program, .. } if program == "imageproof-definitely-missing-binary"),
            "unexpected error: {err}"
        );
    }
}
