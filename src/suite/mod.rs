//! Remote check suite execution.
//!
//! A [`SuiteLauncher`] binds one [`SuiteRunner`] per instance. Runners are
//! moved onto the blocking pool, so they own everything they need and write
//! their outcomes into the shared [`ResultSink`].

use std::ffi::OsString;
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use shell_escape::unix::escape;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::infra::InstanceDescriptor;
use crate::process::{CommandError, CommandOutput, CommandRunner, ProcessCommandRunner};
use crate::results::{CaseOutcome, CaseResult, ResultSink, ResultSinkError};

mod checks;

pub use checks::{BUILT_IN_CHECKS, RemoteCheck};

/// OpenSSH exits with this status when the connection itself fails.
const SSH_CONNECTION_FAILURE: i32 = 255;

/// Errors that stop the suite on a single instance.
///
/// These are recorded against the instance and never abort the batch.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RemoteExecutionError {
    /// Raised when the reachability probe fails.
    #[error("instance {instance} is unreachable: {message}")]
    Unreachable {
        /// Instance identifier.
        instance: String,
        /// Failure detail from the probe.
        message: String,
    },
    /// Raised when the SSH client cannot be started.
    #[error("failed to run checks on {instance}: {source}")]
    Spawn {
        /// Instance identifier.
        instance: String,
        /// Underlying spawn failure.
        #[source]
        source: CommandError,
    },
    /// Raised when outcomes cannot be written to the sink.
    #[error("failed to record results for {instance}: {source}")]
    Results {
        /// Instance identifier.
        instance: String,
        /// Underlying sink failure.
        #[source]
        source: ResultSinkError,
    },
}

/// Runs the check suite against one bound instance.
pub trait SuiteRunner: Send + 'static {
    /// Identifier of the bound instance.
    fn instance_id(&self) -> &str;

    /// Executes every check, recording each outcome into `sink`.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteExecutionError`] when the suite cannot continue on
    /// this instance.
    fn run_tests(&self, sink: &ResultSink) -> Result<(), RemoteExecutionError>;
}

/// Produces a runner bound to one instance.
pub trait SuiteLauncher: Send + Sync {
    /// Runner type handed to the blocking pool.
    type Runner: SuiteRunner;

    /// Binds a runner to `instance`, connecting through `ssh_config_file`.
    fn runner_for(&self, instance: &InstanceDescriptor, ssh_config_file: &Utf8Path)
    -> Self::Runner;
}

/// Launcher for [`SshSuiteRunner`]s.
#[derive(Clone, Debug)]
pub struct SshSuiteLauncher<R = ProcessCommandRunner> {
    runner: R,
    ssh_bin: String,
    debug: bool,
}

impl SshSuiteLauncher<ProcessCommandRunner> {
    /// Creates a launcher that spawns the system `ssh` client.
    #[must_use]
    pub fn new(ssh_bin: impl Into<String>, debug: bool) -> Self {
        Self::with_runner(ProcessCommandRunner, ssh_bin, debug)
    }
}

impl<R> SshSuiteLauncher<R>
where
    R: CommandRunner + Clone + 'static,
{
    /// Creates a launcher whose runners execute through `runner`.
    #[must_use]
    pub fn with_runner(runner: R, ssh_bin: impl Into<String>, debug: bool) -> Self {
        Self {
            runner,
            ssh_bin: ssh_bin.into(),
            debug,
        }
    }
}

impl<R> SuiteLauncher for SshSuiteLauncher<R>
where
    R: CommandRunner + Clone + 'static,
{
    type Runner = SshSuiteRunner<R>;

    fn runner_for(
        &self,
        instance: &InstanceDescriptor,
        ssh_config_file: &Utf8Path,
    ) -> Self::Runner {
        SshSuiteRunner {
            runner: self.runner.clone(),
            ssh_bin: self.ssh_bin.clone(),
            ssh_config_file: ssh_config_file.to_path_buf(),
            instance: instance.id.clone(),
            checks: BUILT_IN_CHECKS.to_vec(),
            debug: self.debug,
        }
    }
}

/// Runs [`BUILT_IN_CHECKS`] over `ssh -F <config> <instance>`.
#[derive(Clone, Debug)]
pub struct SshSuiteRunner<R = ProcessCommandRunner> {
    runner: R,
    ssh_bin: String,
    ssh_config_file: Utf8PathBuf,
    instance: String,
    checks: Vec<RemoteCheck>,
    debug: bool,
}

impl<R: CommandRunner> SshSuiteRunner<R> {
    fn ssh_args(&self, check: &RemoteCheck) -> Vec<OsString> {
        let remote = format!("sh -c {}", escape(check.script.into()));
        vec![
            OsString::from("-F"),
            OsString::from(self.ssh_config_file.as_str()),
            OsString::from(&self.instance),
            OsString::from(remote),
        ]
    }

    fn record(&self, sink: &ResultSink, case: CaseResult) -> Result<(), RemoteExecutionError> {
        sink.record_case(&self.instance, case)
            .map_err(|source| RemoteExecutionError::Results {
                instance: self.instance.clone(),
                source,
            })
    }

    fn case_from_output(
        &self,
        name: &str,
        output: CommandOutput,
        duration_ms: u64,
    ) -> CaseResult {
        let outcome = classify(&output);
        debug!(
            instance = %self.instance,
            check = name,
            status = %output.status_text(),
            stdout = %output.stdout.trim(),
            stderr = %output.stderr.trim(),
            "check finished"
        );
        let mut case = CaseResult::new(name, outcome, duration_ms);
        if self.debug {
            case.stdout = Some(output.stdout);
            case.stderr = Some(output.stderr);
        }
        case
    }
}

fn last_line(text: &str) -> Option<&str> {
    text.lines().map(str::trim).rfind(|line| !line.is_empty())
}

fn classify(output: &CommandOutput) -> CaseOutcome {
    let detail = last_line(&output.stderr).or_else(|| last_line(&output.stdout));
    let with_detail = |summary: String| {
        detail.map_or_else(|| summary.clone(), |line| format!("{summary}: {line}"))
    };
    match output.code {
        Some(0) => CaseOutcome::Passed,
        Some(SSH_CONNECTION_FAILURE) => CaseOutcome::Errored {
            message: with_detail(String::from("ssh connection failed (exit status 255)")),
        },
        Some(code) => CaseOutcome::Failed {
            message: with_detail(format!("exit status {code}")),
        },
        None => CaseOutcome::Errored {
            message: with_detail(String::from("terminated without an exit status")),
        },
    }
}

impl<R> SuiteRunner for SshSuiteRunner<R>
where
    R: CommandRunner + 'static,
{
    fn instance_id(&self) -> &str {
        &self.instance
    }

    fn run_tests(&self, sink: &ResultSink) -> Result<(), RemoteExecutionError> {
        info!(instance = %self.instance, checks = self.checks.len(), "running remote checks");
        for (index, check) in self.checks.iter().enumerate() {
            let started = Instant::now();
            let result = self.runner.run(&self.ssh_bin, &self.ssh_args(check));
            let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

            let output = match result {
                Ok(output) => output,
                Err(source) => {
                    self.record(
                        sink,
                        CaseResult::new(
                            check.name,
                            CaseOutcome::Errored {
                                message: source.to_string(),
                            },
                            duration_ms,
                        ),
                    )?;
                    return Err(RemoteExecutionError::Spawn {
                        instance: self.instance.clone(),
                        source,
                    });
                }
            };

            let case = self.case_from_output(check.name, output, duration_ms);
            let probe_failure = match (&case.outcome, index) {
                (CaseOutcome::Failed { message } | CaseOutcome::Errored { message }, 0) => {
                    Some(message.clone())
                }
                _ => None,
            };
            if !matches!(case.outcome, CaseOutcome::Passed) {
                warn!(
                    instance = %self.instance,
                    check = check.name,
                    outcome = ?case.outcome,
                    "check did not pass"
                );
            }
            self.record(sink, case)?;

            if let Some(message) = probe_failure {
                return Err(RemoteExecutionError::Unreachable {
                    instance: self.instance.clone(),
                    message,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests;
