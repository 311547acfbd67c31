//! Fatal run errors.

use thiserror::Error;

use super::cleanup::CleanupReport;
use crate::resources::ConfigurationError;
use crate::results::ResultSinkError;
use crate::ssh::SshError;

/// Errors that abort a validation run.
///
/// Every variant is returned only after cleanup has run; cleanup failures
/// are appended to the message as a note.
#[derive(Debug, Error)]
pub enum ValidationError<ControllerError>
where
    ControllerError: std::error::Error + 'static,
{
    /// Raised when the resource description or output settings are invalid.
    #[error("invalid configuration: {message}")]
    Configuration {
        /// Human-readable description of the failure.
        message: String,
        /// Underlying configuration error.
        #[source]
        source: ConfigurationError,
    },
    /// Raised when the per-run SSH key pair cannot be generated.
    #[error("failed to generate SSH credentials: {message}")]
    Credentials {
        /// Human-readable description of the failure.
        message: String,
        /// Underlying SSH error.
        #[source]
        source: SshError,
    },
    /// Raised when infrastructure cannot be created or enumerated.
    #[error("failed to provision infrastructure: {message}")]
    Provisioning {
        /// Human-readable description of the failure.
        message: String,
        /// Provider-specific error.
        #[source]
        source: ControllerError,
    },
    /// Raised when the SSH client configuration cannot be written.
    #[error("failed to write SSH configuration: {message}")]
    SshConfig {
        /// Human-readable description of the failure.
        message: String,
        /// Underlying SSH error.
        #[source]
        source: SshError,
    },
    /// Raised when results cannot be persisted.
    #[error("failed to write results: {message}")]
    Results {
        /// Human-readable description of the failure.
        message: String,
        /// Underlying sink error.
        #[source]
        source: ResultSinkError,
    },
}

impl<E> From<ConfigurationError> for ValidationError<E>
where
    E: std::error::Error + 'static,
{
    fn from(source: ConfigurationError) -> Self {
        Self::Configuration {
            message: source.to_string(),
            source,
        }
    }
}

impl<E> ValidationError<E>
where
    E: std::error::Error + 'static,
{
    pub(crate) fn provisioning(source: E) -> Self {
        Self::Provisioning {
            message: source.to_string(),
            source,
        }
    }

    pub(crate) fn credentials(source: SshError) -> Self {
        Self::Credentials {
            message: source.to_string(),
            source,
        }
    }

    pub(crate) fn ssh_config(source: SshError) -> Self {
        Self::SshConfig {
            message: source.to_string(),
            source,
        }
    }

    pub(crate) fn results(source: ResultSinkError) -> Self {
        Self::Results {
            message: source.to_string(),
            source,
        }
    }

    const fn message_mut(&mut self) -> &mut String {
        match self {
            Self::Configuration { message, .. }
            | Self::Credentials { message, .. }
            | Self::Provisioning { message, .. }
            | Self::SshConfig { message, .. }
            | Self::Results { message, .. } => message,
        }
    }

    /// Appends a teardown note when `report` lists cleanup failures.
    #[must_use]
    pub fn with_cleanup_note(mut self, report: &CleanupReport) -> Self {
        if let Some(note) = report.summary() {
            let message = self.message_mut();
            message.push_str(" (teardown also failed: ");
            message.push_str(&note);
            message.push(')');
        }
        self
    }
}
