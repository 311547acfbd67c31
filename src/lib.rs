//! Core library for the imageproof cloud image validator.
//!
//! A validation run provisions disposable instances from a resource
//! description, authorises a per-run SSH key on them, executes a fixed
//! suite of remote checks on every instance, writes JSON or JUnit results
//! plus an HTML report, and always tears the infrastructure down again
//! (configure → provision → test → report → cleanup).

pub mod cloud_init;
pub mod config;
pub mod files;
pub mod infra;
pub mod logging;
pub mod orchestrator;
pub mod process;
pub mod report;
pub mod resources;
pub mod results;
pub mod scaleway;
pub mod ssh;
pub mod suite;
pub mod test_support;

pub use config::{ScalewayConfig, ValidatorConfig};
pub use infra::{
    InfraController, InstanceDescriptor, ProvisionError, ProvisionedController, StaticController,
};
pub use orchestrator::{
    CleanupFailure, CleanupReport, RunSettings, RunSummary, ValidationError, ValidationRun,
};
pub use process::{CommandError, CommandOutput, CommandRunner, ProcessCommandRunner};
pub use report::{HtmlReporter, Reporter, ReportingError, report_path_for};
pub use resources::{
    CloudProvider, ConfigurationError, InfraConfigurator, ResourceConfigurator, ResourcePlan,
};
pub use results::{
    CaseOutcome, CaseResult, InstanceResults, ResultFormat, ResultSink, ResultSinkError,
    RunResultSet,
};
pub use scaleway::{ScalewayController, ScalewayControllerError};
pub use ssh::{OpenSshSession, SshError, SshKeyPair, SshSession};
pub use suite::{RemoteExecutionError, SshSuiteLauncher, SuiteLauncher, SuiteRunner};
