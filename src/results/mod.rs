//! Run result set and the shared sink suite runners write into.
//!
//! Results are keyed by instance identifier. Every record merges into its
//! own key under a mutex and the whole set is rewritten atomically, so
//! concurrent instance runs never interleave or overwrite each other.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::files;
use crate::resources::ConfigurationError;

mod junit;

pub use junit::render_junit;

/// Outcome of one remote check.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CaseOutcome {
    /// The check exited successfully.
    Passed,
    /// The check ran and reported a problem with the image.
    Failed {
        /// Failure detail.
        message: String,
    },
    /// The check could not be evaluated.
    Errored {
        /// Error detail.
        message: String,
    },
}

/// Result of a single named check on one instance.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct CaseResult {
    /// Check name.
    pub name: String,
    /// Outcome of the check.
    #[serde(flatten)]
    pub outcome: CaseOutcome,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Captured standard output, kept in debug runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stdout: Option<String>,
    /// Captured standard error, kept in debug runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stderr: Option<String>,
}

impl CaseResult {
    /// Creates a result without captured output.
    #[must_use]
    pub fn new(name: impl Into<String>, outcome: CaseOutcome, duration_ms: u64) -> Self {
        Self {
            name: name.into(),
            outcome,
            duration_ms,
            stdout: None,
            stderr: None,
        }
    }
}

/// Every case recorded for one instance plus any instance-level error.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct InstanceResults {
    /// Instance identifier.
    pub instance: String,
    /// Cases in execution order.
    #[serde(default)]
    pub cases: Vec<CaseResult>,
    /// Error that stopped the suite on this instance.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InstanceResults {
    /// Creates an empty entry for `instance`.
    #[must_use]
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            ..Self::default()
        }
    }

    /// Returns `true` when every case passed and no error was recorded.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.error.is_none()
            && self
                .cases
                .iter()
                .all(|case| case.outcome == CaseOutcome::Passed)
    }
}

/// Aggregate counts over a [`RunResultSet`].
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RunTotals {
    /// Passed cases.
    pub passed: usize,
    /// Failed cases.
    pub failed: usize,
    /// Errored cases.
    pub errored: usize,
    /// Instances with an instance-level error.
    pub instance_errors: usize,
}

/// Per-instance outcomes of a run.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct RunResultSet {
    instances: BTreeMap<String, InstanceResults>,
}

impl RunResultSet {
    /// Creates an empty set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Merges `entry` into the slot for its instance: cases are appended and
    /// an existing error is kept.
    pub fn merge(&mut self, entry: InstanceResults) {
        let slot = self
            .instances
            .entry(entry.instance.clone())
            .or_insert_with(|| InstanceResults::new(entry.instance.clone()));
        slot.cases.extend(entry.cases);
        if slot.error.is_none() {
            slot.error = entry.error;
        }
    }

    /// Looks up the entry for `instance`.
    #[must_use]
    pub fn get(&self, instance: &str) -> Option<&InstanceResults> {
        self.instances.get(instance)
    }

    /// Iterates entries ordered by instance identifier.
    pub fn iter(&self) -> impl Iterator<Item = &InstanceResults> {
        self.instances.values()
    }

    /// Number of instances with an entry.
    #[must_use]
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    /// Returns `true` when no instance has recorded anything.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Counts outcomes across every instance.
    #[must_use]
    pub fn totals(&self) -> RunTotals {
        let mut totals = RunTotals::default();
        for entry in self.iter() {
            if entry.error.is_some() {
                totals.instance_errors += 1;
            }
            for case in &entry.cases {
                match case.outcome {
                    CaseOutcome::Passed => totals.passed += 1,
                    CaseOutcome::Failed { .. } => totals.failed += 1,
                    CaseOutcome::Errored { .. } => totals.errored += 1,
                }
            }
        }
        totals
    }

    /// Returns `true` when any case failed or errored or any instance
    /// recorded an error.
    #[must_use]
    pub fn has_failures(&self) -> bool {
        !self.iter().all(InstanceResults::is_clean)
    }
}

/// Serialisation format of the results file.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ResultFormat {
    /// Pretty printed JSON document.
    Json,
    /// JUnit XML with one test suite per instance.
    JunitXml,
}

impl ResultFormat {
    /// Picks the format from the extension of `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::UnsupportedOutputFormat`] for any
    /// extension other than `json` or `xml`.
    pub fn from_path(path: &Utf8Path) -> Result<Self, ConfigurationError> {
        match path.extension().map(str::to_ascii_lowercase).as_deref() {
            Some("json") => Ok(Self::Json),
            Some("xml") => Ok(Self::JunitXml),
            _ => Err(ConfigurationError::UnsupportedOutputFormat {
                path: path.to_path_buf(),
            }),
        }
    }

    /// Renders `results` in this format.
    ///
    /// # Errors
    ///
    /// Returns [`ResultSinkError::Serialize`] when JSON encoding fails.
    pub fn render(self, results: &RunResultSet) -> Result<String, ResultSinkError> {
        match self {
            Self::Json => serde_json::to_string_pretty(results)
                .map(|mut body| {
                    body.push('\n');
                    body
                })
                .map_err(|err| ResultSinkError::Serialize {
                    message: err.to_string(),
                }),
            Self::JunitXml => Ok(render_junit(results)),
        }
    }
}

/// Errors raised while persisting results.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ResultSinkError {
    /// Raised when the results cannot be encoded.
    #[error("failed to serialise results: {message}")]
    Serialize {
        /// Encoder error message.
        message: String,
    },
    /// Raised when the results file cannot be written.
    #[error("failed to write results to {path}: {message}")]
    Write {
        /// Output path.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
}

/// Shared, thread-safe destination for per-instance results.
#[derive(Debug)]
pub struct ResultSink {
    path: Utf8PathBuf,
    format: ResultFormat,
    state: Mutex<RunResultSet>,
}

impl ResultSink {
    /// Creates a sink writing to `path` in the format its extension names.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::UnsupportedOutputFormat`] when the
    /// extension is not recognised.
    pub fn new(output: impl Into<Utf8PathBuf>) -> Result<Self, ConfigurationError> {
        let path = output.into();
        let format = ResultFormat::from_path(&path)?;
        Ok(Self {
            path,
            format,
            state: Mutex::new(RunResultSet::new()),
        })
    }

    /// Output file path.
    #[must_use]
    pub fn path(&self) -> &Utf8Path {
        &self.path
    }

    /// Output format.
    #[must_use]
    pub const fn format(&self) -> ResultFormat {
        self.format
    }

    fn lock(&self) -> MutexGuard<'_, RunResultSet> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Merges `entry` and rewrites the results file.
    ///
    /// # Errors
    ///
    /// Returns [`ResultSinkError`] when the file cannot be rewritten.
    pub fn record(&self, entry: InstanceResults) -> Result<(), ResultSinkError> {
        let mut state = self.lock();
        state.merge(entry);
        self.persist(&state)
    }

    /// Appends one case for `instance`.
    ///
    /// # Errors
    ///
    /// Returns [`ResultSinkError`] when the file cannot be rewritten.
    pub fn record_case(&self, instance: &str, case: CaseResult) -> Result<(), ResultSinkError> {
        debug!(instance, case = %case.name, outcome = ?case.outcome, "recording case");
        self.record(InstanceResults {
            instance: instance.to_owned(),
            cases: vec![case],
            error: None,
        })
    }

    /// Records an instance-level error for `instance`.
    ///
    /// # Errors
    ///
    /// Returns [`ResultSinkError`] when the file cannot be rewritten.
    pub fn record_error(
        &self,
        instance: &str,
        message: impl Into<String>,
    ) -> Result<(), ResultSinkError> {
        self.record(InstanceResults {
            instance: instance.to_owned(),
            cases: Vec::new(),
            error: Some(message.into()),
        })
    }

    /// Writes the current state, producing a file even when nothing was
    /// recorded.
    ///
    /// # Errors
    ///
    /// Returns [`ResultSinkError`] when the file cannot be written.
    pub fn flush(&self) -> Result<(), ResultSinkError> {
        let state = self.lock();
        self.persist(&state)
    }

    /// Discards everything recorded so far.
    pub fn clear(&self) {
        *self.lock() = RunResultSet::new();
    }

    /// Copies the current result set.
    #[must_use]
    pub fn snapshot(&self) -> RunResultSet {
        self.lock().clone()
    }

    fn persist(&self, results: &RunResultSet) -> Result<(), ResultSinkError> {
        let rendered = self.format.render(results)?;
        files::write_atomic(&self.path, &rendered).map_err(|err| ResultSinkError::Write {
            path: self.path.clone(),
            message: err.to_string(),
        })
    }
}
