//! Shared fixtures for validation BDD scenarios.

use std::sync::Arc;

use camino::Utf8PathBuf;
use imageproof::test_support::{
    CallLog, ControllerScript, RecordingReporter, ScriptedConfigurator, ScriptedLauncher,
    ScriptedSsh,
};
use imageproof::{RunSummary, ValidationError};
use rstest::fixture;
use tempfile::TempDir;
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct ValidationContext {
    pub log: CallLog,
    pub configurator: ScriptedConfigurator,
    pub ssh: ScriptedSsh,
    pub launcher: ScriptedLauncher,
    pub reporter: RecordingReporter,
    pub parallel: bool,
    pub workspace: Utf8PathBuf,
    pub outcome: Option<ValidationOutcome>,
    pub(crate) workspace_tmp: Arc<TempDir>,
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum FailureKind {
    Configuration,
    Credentials,
    Provisioning,
    SshConfig,
    Results,
}

impl FailureKind {
    pub const fn of<E: std::error::Error + 'static>(err: &ValidationError<E>) -> Self {
        match err {
            ValidationError::Configuration { .. } => Self::Configuration,
            ValidationError::Credentials { .. } => Self::Credentials,
            ValidationError::Provisioning { .. } => Self::Provisioning,
            ValidationError::SshConfig { .. } => Self::SshConfig,
            ValidationError::Results { .. } => Self::Results,
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "configuration" => Some(Self::Configuration),
            "credentials" => Some(Self::Credentials),
            "provisioning" => Some(Self::Provisioning),
            "ssh config" => Some(Self::SshConfig),
            "results" => Some(Self::Results),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub enum ValidationOutcome {
    Success(Box<RunSummary>),
    Failure { kind: FailureKind, message: String },
}

#[derive(Clone, Debug, Error)]
pub enum ValidationTestError {
    #[error("failed to create workspace: {0}")]
    Workspace(String),
}

impl ValidationContext {
    pub fn output_file(&self) -> Utf8PathBuf {
        self.workspace.join("results.json")
    }

    pub fn summary(&self) -> Option<&RunSummary> {
        match &self.outcome {
            Some(ValidationOutcome::Success(summary)) => Some(summary.as_ref()),
            _ => None,
        }
    }
}

#[fixture]
pub fn validation_context_result() -> Result<ValidationContext, ValidationTestError> {
    build_validation_context()
}

#[fixture]
pub fn validation_context(
    validation_context_result: Result<ValidationContext, ValidationTestError>,
) -> ValidationContext {
    validation_context_result
        .unwrap_or_else(|err| panic!("validation context fixture should initialise: {err}"))
}

fn build_validation_context() -> Result<ValidationContext, ValidationTestError> {
    let tmp_dir =
        TempDir::new().map_err(|err| ValidationTestError::Workspace(format!("tempdir: {err}")))?;
    let workspace = Utf8PathBuf::from_path_buf(tmp_dir.path().to_path_buf()).map_err(|path| {
        ValidationTestError::Workspace(format!("non-utf8 tempdir path: {}", path.display()))
    })?;
    let log = CallLog::new();

    Ok(ValidationContext {
        configurator: ScriptedConfigurator {
            script: ControllerScript::default(),
            log: log.clone(),
            fail_provider: false,
        },
        ssh: ScriptedSsh::new(&workspace.join("keys"), log.clone()),
        launcher: ScriptedLauncher {
            log: log.clone(),
            ..ScriptedLauncher::default()
        },
        reporter: RecordingReporter {
            log: log.clone(),
            fail: false,
        },
        log,
        parallel: false,
        workspace,
        outcome: None,
        workspace_tmp: Arc::new(tmp_dir),
    })
}
