//! Test support utilities shared across unit and integration tests.
//!
//! The scripted collaborators record every call into a shared [`CallLog`]
//! so tests can assert on phase ordering without touching a cloud or
//! spawning `ssh`.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard as StdMutexGuard, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tokio::sync::{Mutex, MutexGuard};

use crate::files;
use crate::infra::{ControllerFuture, InfraController, InstanceDescriptor, StaticHost};
use crate::process::{CommandError, CommandOutput, CommandRunner};
use crate::report::{HtmlReporter, Reporter, ReportingError};
use crate::resources::{
    CloudProvider, ConfigurationError, InfraConfigurator, ResourcePlan, ResourceSpec,
};
use crate::results::{CaseOutcome, CaseResult, ResultSink};
use crate::ssh::{SshError, SshKeyPair, SshSession, render_ssh_config};
use crate::suite::{RemoteExecutionError, SuiteLauncher, SuiteRunner};

fn lock<T>(mutex: &StdMutex<T>) -> StdMutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted command runner that returns pre-seeded outputs in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
/// Clones share the same queue and invocation log.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Arc<StdMutex<VecDeque<CommandOutput>>>,
    invocations: Arc<StdMutex<Vec<CommandInvocation>>>,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        lock(&self.invocations).clone()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a specific exit code.
    pub fn push_exit_code(&self, code: i32) {
        self.push_output(Some(code), "", "");
    }

    /// Pushes a failing exit code with stderr text.
    pub fn push_failure(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes a response with no exit code to simulate abnormal termination.
    pub fn push_missing_exit_code(&self) {
        self.push_output(None, "", "");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        lock(&self.responses).push_back(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        });
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(&self, program: &str, args: &[OsString]) -> Result<CommandOutput, CommandError> {
        lock(&self.invocations).push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
        });
        lock(&self.responses)
            .pop_front()
            .ok_or_else(|| CommandError::Spawn {
                program: program.to_owned(),
                message: String::from("no scripted response available"),
            })
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: Mutex<()> = Mutex::const_new(());

/// Guard that holds the env mutex and cleans up variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets multiple environment variables while holding a global mutex.
    pub async fn set_vars(pairs: &[(&str, &str)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe { env::set_var(key, value) };
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}

/// Ordered record of calls made to scripted collaborators.
#[derive(Clone, Debug, Default)]
pub struct CallLog {
    entries: Arc<StdMutex<Vec<String>>>,
}

impl CallLog {
    /// Creates an empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends an entry.
    pub fn record(&self, entry: impl Into<String>) {
        lock(&self.entries).push(entry.into());
    }

    /// Returns every entry in call order.
    #[must_use]
    pub fn entries(&self) -> Vec<String> {
        lock(&self.entries).clone()
    }

    /// Counts entries equal to `entry`.
    #[must_use]
    pub fn count(&self, entry: &str) -> usize {
        lock(&self.entries)
            .iter()
            .filter(|recorded| recorded.as_str() == entry)
            .count()
    }

    /// Position of the first entry equal to `entry`.
    #[must_use]
    pub fn position(&self, entry: &str) -> Option<usize> {
        lock(&self.entries)
            .iter()
            .position(|recorded| recorded.as_str() == entry)
    }
}

/// Error raised by scripted collaborators.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("{0}")]
pub struct ScriptedFailure(pub String);

/// Builds descriptors for `names` on consecutive loopback addresses.
#[must_use]
pub fn loopback_instances(names: &[&str]) -> Vec<InstanceDescriptor> {
    names
        .iter()
        .zip(1_u8..)
        .map(|(name, octet)| {
            InstanceDescriptor::new(*name, IpAddr::V4(Ipv4Addr::new(127, 0, 0, octet)), 22)
        })
        .collect()
}

/// Behaviour of a [`ScriptedController`].
#[derive(Clone, Debug, Default)]
pub struct ControllerScript {
    /// Instances the controller creates.
    pub instances: Vec<InstanceDescriptor>,
    /// Fail `create_infra` after creating `created_before_failure` instances.
    pub fail_on_create: bool,
    /// Instances recorded before a scripted creation failure.
    pub created_before_failure: usize,
    /// Fail `destroy_infra`.
    pub fail_on_destroy: bool,
}

/// In-memory [`InfraController`] driven by a [`ControllerScript`].
///
/// Logs `create_infra`, `instances`, `destroy_infra`, and one
/// `release <id>` entry per instance released.
#[derive(Debug)]
pub struct ScriptedController {
    script: ControllerScript,
    log: CallLog,
    created: StdMutex<Vec<InstanceDescriptor>>,
}

impl ScriptedController {
    /// Creates a controller that records into `log`.
    #[must_use]
    pub fn new(script: ControllerScript, log: CallLog) -> Self {
        Self {
            script,
            log,
            created: StdMutex::new(Vec::new()),
        }
    }
}

impl InfraController for ScriptedController {
    type Error = ScriptedFailure;

    fn create_infra(&self) -> ControllerFuture<'_, (), Self::Error> {
        Box::pin(async move {
            self.log.record("create_infra");
            let mut created = lock(&self.created);
            if self.script.fail_on_create {
                created.extend(
                    self.script
                        .instances
                        .iter()
                        .take(self.script.created_before_failure)
                        .cloned(),
                );
                return Err(ScriptedFailure(String::from("quota exceeded")));
            }
            created.clone_from(&self.script.instances);
            Ok(())
        })
    }

    fn instances(&self) -> ControllerFuture<'_, Vec<InstanceDescriptor>, Self::Error> {
        Box::pin(async move {
            self.log.record("instances");
            Ok(lock(&self.created).clone())
        })
    }

    fn destroy_infra(&self) -> ControllerFuture<'_, (), Self::Error> {
        Box::pin(async move {
            self.log.record("destroy_infra");
            if self.script.fail_on_destroy {
                return Err(ScriptedFailure(String::from("teardown refused")));
            }
            for instance in lock(&self.created).drain(..) {
                self.log.record(format!("release {}", instance.id));
            }
            Ok(())
        })
    }
}

/// [`InfraConfigurator`] that plans static hosts for a [`ControllerScript`].
#[derive(Clone, Debug, Default)]
pub struct ScriptedConfigurator {
    /// Script handed to the controller.
    pub script: ControllerScript,
    /// Shared call log.
    pub log: CallLog,
    /// Reject the description as naming no provider.
    pub fail_provider: bool,
}

impl InfraConfigurator for ScriptedConfigurator {
    type Controller = ScriptedController;

    fn cloud_provider_from_resources(
        &self,
        resources_file: &Utf8Path,
    ) -> Result<CloudProvider, ConfigurationError> {
        self.log.record("cloud_provider_from_resources");
        if self.fail_provider {
            return Err(ConfigurationError::MissingProvider {
                path: resources_file.to_path_buf(),
            });
        }
        Ok(CloudProvider::Static)
    }

    fn configure_from_resources(
        &self,
        _resources_file: &Utf8Path,
        provider: CloudProvider,
    ) -> Result<ResourcePlan, ConfigurationError> {
        self.log.record("configure_from_resources");
        let hosts = self
            .script
            .instances
            .iter()
            .map(|instance| {
                ResourceSpec::Host(StaticHost {
                    name: instance.id.clone(),
                    address: instance.address,
                    port: instance.ssh_port,
                })
            })
            .collect();
        ResourcePlan::new(provider, hosts)
    }

    fn print_configuration(&self, _plan: &ResourcePlan) {
        self.log.record("print_configuration");
    }

    fn initialize_resources(
        &self,
        _plan: ResourcePlan,
        _key_pair: &SshKeyPair,
    ) -> Result<Self::Controller, ConfigurationError> {
        self.log.record("initialize_resources");
        Ok(ScriptedController::new(
            self.script.clone(),
            self.log.clone(),
        ))
    }
}

/// [`SshSession`] that writes placeholder key files instead of running
/// `ssh-keygen`.
#[derive(Clone, Debug)]
pub struct ScriptedSsh {
    key_pair: SshKeyPair,
    log: CallLog,
    /// Fail key generation.
    pub fail_keygen: bool,
    /// Fail writing the client configuration.
    pub fail_config: bool,
}

impl ScriptedSsh {
    /// Creates a session whose key pair lives in `dir`.
    #[must_use]
    pub fn new(dir: &Utf8Path, log: CallLog) -> Self {
        Self {
            key_pair: SshKeyPair::from_private_key(dir.join("id_ed25519")),
            log,
            fail_keygen: false,
            fail_config: false,
        }
    }

    fn write(path: &Utf8Path, contents: &str) -> Result<(), SshError> {
        files::write_atomic(path, contents).map_err(|err| SshError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        })
    }
}

impl SshSession for ScriptedSsh {
    fn key_pair(&self) -> SshKeyPair {
        self.key_pair.clone()
    }

    fn generate_ssh_key_pair(&self) -> Result<SshKeyPair, SshError> {
        self.log.record("generate_ssh_key_pair");
        if self.fail_keygen {
            return Err(SshError::KeyGeneration {
                program: String::from("ssh-keygen"),
                status: String::from("1"),
                stderr: String::from("simulated failure"),
            });
        }
        Self::write(&self.key_pair.private_key, "PRIVATE KEY\n")?;
        Self::write(&self.key_pair.public_key, "ssh-ed25519 AAAA imageproof\n")?;
        Ok(self.key_pair.clone())
    }

    fn generate_instances_ssh_config(
        &self,
        instances: &[InstanceDescriptor],
        ssh_config_file: &Utf8Path,
        ssh_key_path: &Utf8Path,
    ) -> Result<(), SshError> {
        self.log.record("generate_instances_ssh_config");
        if self.fail_config {
            return Err(SshError::Io {
                path: ssh_config_file.to_path_buf(),
                message: String::from("simulated failure"),
            });
        }
        Self::write(
            ssh_config_file,
            &render_ssh_config(instances, "root", ssh_key_path)?,
        )
    }
}

/// How a [`ScriptedSuiteRunner`] behaves on its instance.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum RunnerBehaviour {
    /// Every check passes.
    #[default]
    Pass,
    /// The reachability probe passes and a later check fails.
    FailCheck,
    /// The reachability probe fails.
    Unreachable,
    /// The runner panics before recording anything.
    Panic,
}

/// [`SuiteLauncher`] whose runners follow per-instance behaviours.
#[derive(Clone, Debug, Default)]
pub struct ScriptedLauncher {
    /// Shared call log; runners append `run_tests <id>`.
    pub log: CallLog,
    /// Behaviour per instance identifier; unlisted instances pass.
    pub behaviours: BTreeMap<String, RunnerBehaviour>,
}

impl ScriptedLauncher {
    /// Overrides the behaviour for `instance`.
    #[must_use]
    pub fn with_behaviour(mut self, instance: &str, behaviour: RunnerBehaviour) -> Self {
        self.behaviours.insert(instance.to_owned(), behaviour);
        self
    }
}

impl SuiteLauncher for ScriptedLauncher {
    type Runner = ScriptedSuiteRunner;

    fn runner_for(
        &self,
        instance: &InstanceDescriptor,
        ssh_config_file: &Utf8Path,
    ) -> Self::Runner {
        ScriptedSuiteRunner {
            instance: instance.id.clone(),
            ssh_config_file: ssh_config_file.to_path_buf(),
            behaviour: self
                .behaviours
                .get(&instance.id)
                .copied()
                .unwrap_or_default(),
            log: self.log.clone(),
        }
    }
}

/// Runner produced by [`ScriptedLauncher`].
#[derive(Clone, Debug)]
pub struct ScriptedSuiteRunner {
    instance: String,
    ssh_config_file: Utf8PathBuf,
    behaviour: RunnerBehaviour,
    log: CallLog,
}

impl ScriptedSuiteRunner {
    /// Configuration file the runner was bound to.
    #[must_use]
    pub fn ssh_config_file(&self) -> &Utf8Path {
        &self.ssh_config_file
    }

    fn record(&self, sink: &ResultSink, case: CaseResult) -> Result<(), RemoteExecutionError> {
        sink.record_case(&self.instance, case)
            .map_err(|source| RemoteExecutionError::Results {
                instance: self.instance.clone(),
                source,
            })
    }
}

impl SuiteRunner for ScriptedSuiteRunner {
    fn instance_id(&self) -> &str {
        &self.instance
    }

    fn run_tests(&self, sink: &ResultSink) -> Result<(), RemoteExecutionError> {
        self.log.record(format!("run_tests {}", self.instance));
        match self.behaviour {
            RunnerBehaviour::Pass => {
                self.record(sink, CaseResult::new("ssh_reachable", CaseOutcome::Passed, 3))?;
                self.record(sink, CaseResult::new("os_release", CaseOutcome::Passed, 4))
            }
            RunnerBehaviour::FailCheck => {
                self.record(sink, CaseResult::new("ssh_reachable", CaseOutcome::Passed, 3))?;
                self.record(
                    sink,
                    CaseResult::new(
                        "cloud_init_finished",
                        CaseOutcome::Failed {
                            message: String::from("exit status 1"),
                        },
                        7,
                    ),
                )
            }
            RunnerBehaviour::Unreachable => {
                let message = String::from("ssh connection failed (exit status 255)");
                self.record(
                    sink,
                    CaseResult::new(
                        "ssh_reachable",
                        CaseOutcome::Errored {
                            message: message.clone(),
                        },
                        10,
                    ),
                )?;
                Err(RemoteExecutionError::Unreachable {
                    instance: self.instance.clone(),
                    message,
                })
            }
            RunnerBehaviour::Panic => {
                std::panic::panic_any(format!("scripted panic on {}", self.instance))
            }
        }
    }
}

/// [`Reporter`] that logs its call and delegates to [`HtmlReporter`].
#[derive(Clone, Debug, Default)]
pub struct RecordingReporter {
    /// Shared call log.
    pub log: CallLog,
    /// Fail instead of writing the report.
    pub fail: bool,
}

impl Reporter for RecordingReporter {
    fn generate_html_report(
        &self,
        results: &crate::results::RunResultSet,
        report_path: &Utf8Path,
    ) -> Result<(), ReportingError> {
        self.log.record("generate_html_report");
        if self.fail {
            return Err(ReportingError::Write {
                path: report_path.to_path_buf(),
                message: String::from("simulated failure"),
            });
        }
        HtmlReporter::default().generate_html_report(results, report_path)
    }
}
