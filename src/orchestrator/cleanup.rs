//! Cleanup outcome reporting.

use camino::Utf8PathBuf;
use thiserror::Error;

/// One cleanup step that did not complete.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CleanupFailure {
    /// Raised when the controller could not release the infrastructure.
    #[error("infrastructure teardown failed: {message}")]
    Teardown {
        /// Controller error message.
        message: String,
    },
    /// Raised when a key file could not be removed.
    #[error("failed to remove {path}: {message}")]
    KeyRemoval {
        /// Key file path.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
}

/// Outcome of the cleanup phase.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CleanupReport {
    /// `true` when a controller existed and released its infrastructure.
    pub infrastructure_destroyed: bool,
    /// Key files that were present and removed.
    pub removed_keys: Vec<Utf8PathBuf>,
    /// Steps that failed.
    pub failures: Vec<CleanupFailure>,
}

impl CleanupReport {
    /// Returns `true` when every attempted step succeeded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    /// Joins failure messages with `; `, or `None` when cleanup was clean.
    #[must_use]
    pub fn summary(&self) -> Option<String> {
        if self.failures.is_empty() {
            return None;
        }
        Some(
            self.failures
                .iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}
