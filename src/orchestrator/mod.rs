//! End-to-end validation run.
//!
//! A run provisions infrastructure from a resource description, prepares SSH
//! access, executes the check suite on every instance, renders a report, and
//! always cleans up. Phase failures are returned only after cleanup; cleanup
//! failures never replace the original error.

use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, warn};

use crate::files;
use crate::infra::{InfraController, InstanceDescriptor};
use crate::report::{Reporter, report_path_for};
use crate::resources::{ConfigurationError, InfraConfigurator};
use crate::results::{ResultSink, ResultSinkError, RunResultSet};
use crate::ssh::SshSession;
use crate::suite::{RemoteExecutionError, SuiteLauncher, SuiteRunner};

mod cleanup;
mod error;

pub use cleanup::{CleanupFailure, CleanupReport};
pub use error::ValidationError;

/// Error type of the controller produced by configurator `C`.
pub type ControllerError<C> =
    <<C as InfraConfigurator>::Controller as InfraController>::Error;

/// Settings fixed for the lifetime of a run.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RunSettings {
    /// JSON resource description.
    pub resources_file: Utf8PathBuf,
    /// Results file; its extension selects the format.
    pub output_file: Utf8PathBuf,
    /// Run instance suites concurrently.
    pub parallel: bool,
    /// Keep remote command output in the results.
    pub debug: bool,
    /// Pause between provisioning and the first SSH connection.
    pub settle_delay: Duration,
    /// Generated OpenSSH client configuration.
    pub ssh_config_file: Utf8PathBuf,
}

/// Outcome of a run whose phases all completed.
#[derive(Clone, Debug)]
pub struct RunSummary {
    /// Instances the suites ran against.
    pub instances: Vec<InstanceDescriptor>,
    /// Final result set.
    pub results: RunResultSet,
    /// Rendered report, when rendering succeeded.
    pub report_path: Option<Utf8PathBuf>,
    /// Cleanup outcome; failures here are warnings.
    pub cleanup: CleanupReport,
}

/// Orchestrates one validation run over injected collaborators.
#[derive(Debug)]
pub struct ValidationRun<C, S, L, P> {
    settings: RunSettings,
    configurator: C,
    ssh: S,
    launcher: L,
    reporter: P,
    sink: Arc<ResultSink>,
}

impl<C, S, L, P> ValidationRun<C, S, L, P>
where
    C: InfraConfigurator,
    S: SshSession,
    L: SuiteLauncher,
    P: Reporter,
{
    /// Creates a run.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::UnsupportedOutputFormat`] when the
    /// output extension does not select a results format.
    pub fn new(
        settings: RunSettings,
        configurator: C,
        ssh: S,
        launcher: L,
        reporter: P,
    ) -> Result<Self, ConfigurationError> {
        let sink = Arc::new(ResultSink::new(settings.output_file.clone())?);
        Ok(Self {
            settings,
            configurator,
            ssh,
            launcher,
            reporter,
            sink,
        })
    }

    /// Settings the run was created with.
    #[must_use]
    pub const fn settings(&self) -> &RunSettings {
        &self.settings
    }

    /// Shared result sink.
    #[must_use]
    pub fn sink(&self) -> &ResultSink {
        &self.sink
    }

    /// Where the HTML report is written.
    #[must_use]
    pub fn report_path(&self) -> Utf8PathBuf {
        report_path_for(&self.settings.output_file)
    }

    /// Executes every phase and always cleans up exactly once.
    ///
    /// Each call starts from an empty result set.
    ///
    /// # Errors
    ///
    /// Returns the first [`ValidationError`] raised by a phase, after
    /// cleanup, with any cleanup failures noted in its message.
    pub async fn run(&self) -> Result<RunSummary, ValidationError<ControllerError<C>>> {
        self.sink.clear();
        let mut controller = None;
        let outcome = self.execute(&mut controller).await;
        let report = self.cleanup(controller.as_ref()).await;

        match outcome {
            Ok((instances, report_path)) => {
                if let Some(note) = report.summary() {
                    warn!(failures = %note, "run completed but cleanup was incomplete");
                }
                Ok(RunSummary {
                    instances,
                    results: self.sink.snapshot(),
                    report_path,
                    cleanup: report,
                })
            }
            Err(err) => {
                let noted = err.with_cleanup_note(&report);
                error!(error = %noted, "validation run failed");
                Err(noted)
            }
        }
    }

    async fn execute(
        &self,
        slot: &mut Option<C::Controller>,
    ) -> Result<
        (Vec<InstanceDescriptor>, Option<Utf8PathBuf>),
        ValidationError<ControllerError<C>>,
    > {
        let controller = slot.insert(self.initialize_infrastructure()?);
        let instances = self.deploy_infrastructure(controller).await?;
        self.run_tests_in_all_instances(&instances).await?;
        let report_path = self.report_test_results();
        Ok((instances, report_path))
    }

    /// Generates credentials and binds a controller to the resolved plan.
    ///
    /// Nothing is created in the cloud by this phase.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Credentials`] when key generation fails
    /// and [`ValidationError::Configuration`] when the description cannot
    /// be resolved.
    pub fn initialize_infrastructure(
        &self,
    ) -> Result<C::Controller, ValidationError<ControllerError<C>>> {
        info!(resources = %self.settings.resources_file, "initialising infrastructure");
        let key_pair = self
            .ssh
            .generate_ssh_key_pair()
            .map_err(ValidationError::credentials)?;
        let resources = self.settings.resources_file.as_path();
        let provider = self.configurator.cloud_provider_from_resources(resources)?;
        let plan = self
            .configurator
            .configure_from_resources(resources, provider)?;
        self.configurator.print_configuration(&plan);
        Ok(self.configurator.initialize_resources(plan, &key_pair)?)
    }

    /// Creates the infrastructure, lists its instances, and writes the SSH
    /// client configuration for them.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Provisioning`] when creation or listing
    /// fails and [`ValidationError::SshConfig`] when the configuration
    /// cannot be written.
    pub async fn deploy_infrastructure(
        &self,
        controller: &C::Controller,
    ) -> Result<Vec<InstanceDescriptor>, ValidationError<ControllerError<C>>> {
        info!("creating infrastructure");
        controller
            .create_infra()
            .await
            .map_err(ValidationError::provisioning)?;
        let instances = controller
            .instances()
            .await
            .map_err(ValidationError::provisioning)?;
        info!(instances = instances.len(), "infrastructure ready");

        let key_pair = self.ssh.key_pair();
        self.ssh
            .generate_instances_ssh_config(
                &instances,
                &self.settings.ssh_config_file,
                &key_pair.private_key,
            )
            .map_err(ValidationError::ssh_config)?;
        Ok(instances)
    }

    /// Runs one suite per instance into the shared sink.
    ///
    /// Per-instance failures are recorded against that instance and do not
    /// stop the batch.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::Results`] when the sink cannot be written.
    pub async fn run_tests_in_all_instances(
        &self,
        instances: &[InstanceDescriptor],
    ) -> Result<(), ValidationError<ControllerError<C>>> {
        if !self.settings.settle_delay.is_zero() {
            info!(
                seconds = self.settings.settle_delay.as_secs(),
                "waiting for instances to settle"
            );
            tokio::time::sleep(self.settings.settle_delay).await;
        }

        info!(
            instances = instances.len(),
            parallel = self.settings.parallel,
            "running check suites"
        );
        let mut first_failure: Option<ResultSinkError> = None;
        if self.settings.parallel {
            let mut tasks = JoinSet::new();
            for instance in instances {
                let runner = self
                    .launcher
                    .runner_for(instance, &self.settings.ssh_config_file);
                let sink = Arc::clone(&self.sink);
                let id = instance.id.clone();
                tasks.spawn(async move {
                    let joined =
                        tokio::task::spawn_blocking(move || runner.run_tests(&sink)).await;
                    (id, joined)
                });
            }
            while let Some(finished) = tasks.join_next().await {
                match finished {
                    Ok((id, joined)) => {
                        if let Err(err) = record_suite_outcome(&self.sink, &id, joined) {
                            first_failure.get_or_insert(err);
                        }
                    }
                    Err(join_err) => error!(error = %join_err, "suite supervisor task failed"),
                }
            }
        } else {
            for instance in instances {
                let runner = self
                    .launcher
                    .runner_for(instance, &self.settings.ssh_config_file);
                let sink = Arc::clone(&self.sink);
                let joined = tokio::task::spawn_blocking(move || runner.run_tests(&sink)).await;
                if let Err(err) = record_suite_outcome(&self.sink, &instance.id, joined) {
                    first_failure.get_or_insert(err);
                }
            }
        }

        if let Some(err) = first_failure {
            return Err(ValidationError::results(err));
        }
        self.sink.flush().map_err(ValidationError::results)
    }

    /// Renders the HTML report next to the results file.
    ///
    /// Failures are logged and yield `None`.
    pub fn report_test_results(&self) -> Option<Utf8PathBuf> {
        let report_path = self.report_path();
        let results = self.sink.snapshot();
        match self
            .reporter
            .generate_html_report(&results, &report_path)
        {
            Ok(()) => {
                info!(report = %report_path, "wrote report");
                Some(report_path)
            }
            Err(err) => {
                warn!(error = %err, "failed to render report");
                None
            }
        }
    }

    /// Destroys the infrastructure, when a controller exists, and removes
    /// both key files. Every step is attempted regardless of earlier
    /// failures.
    pub async fn cleanup(&self, controller: Option<&C::Controller>) -> CleanupReport {
        let mut report = CleanupReport::default();

        if let Some(bound) = controller {
            info!("destroying infrastructure");
            match bound.destroy_infra().await {
                Ok(()) => report.infrastructure_destroyed = true,
                Err(err) => {
                    warn!(error = %err, "infrastructure teardown failed");
                    report.failures.push(CleanupFailure::Teardown {
                        message: err.to_string(),
                    });
                }
            }
        }

        let key_pair = self.ssh.key_pair();
        for path in [key_pair.private_key, key_pair.public_key] {
            remove_key(&path, &mut report);
        }
        report
    }
}

fn remove_key(path: &Utf8Path, report: &mut CleanupReport) {
    match files::remove_file_if_exists(path) {
        Ok(true) => {
            debug!(%path, "removed key file");
            report.removed_keys.push(path.to_path_buf());
        }
        Ok(false) => debug!(%path, "key file already absent"),
        Err(err) => {
            warn!(%path, error = %err, "failed to remove key file");
            report.failures.push(CleanupFailure::KeyRemoval {
                path: path.to_path_buf(),
                message: err.to_string(),
            });
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|text| (*text).to_owned())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| String::from("suite runner panicked"))
}

/// Records an instance error when a suite failed, panicked, or never
/// finished.
fn record_suite_outcome(
    sink: &ResultSink,
    instance: &str,
    joined: Result<Result<(), RemoteExecutionError>, JoinError>,
) -> Result<(), ResultSinkError> {
    let failure = match joined {
        Ok(Ok(())) => return Ok(()),
        Ok(Err(err)) => err.to_string(),
        Err(join_err) if join_err.is_panic() => format!(
            "suite runner panicked: {}",
            panic_message(join_err.into_panic().as_ref())
        ),
        Err(join_err) => format!("suite task did not complete: {join_err}"),
    };
    warn!(%instance, error = %failure, "instance suite failed");
    sink.record_error(instance, failure)
}
