//! Human-readable HTML report rendering.
//!
//! The report is rendered from the in-memory result set rather than by
//! reparsing the results file, so it works the same for JSON and JUnit
//! output.

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;

use crate::files;
use crate::results::{CaseOutcome, InstanceResults, RunResultSet};

/// Errors raised while rendering the report. Never fatal to a run.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum ReportingError {
    /// Raised when the report file cannot be written.
    #[error("failed to write report {path}: {message}")]
    Write {
        /// Report path.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
}

/// Renders a report for a completed run.
pub trait Reporter: Send + Sync {
    /// Writes a report for `results` to `report_path`.
    ///
    /// # Errors
    ///
    /// Returns [`ReportingError`] when the report cannot be written.
    fn generate_html_report(
        &self,
        results: &RunResultSet,
        report_path: &Utf8Path,
    ) -> Result<(), ReportingError>;
}

/// Returns the report path for a results file: the same path with only the
/// extension replaced by `html`.
#[must_use]
pub fn report_path_for(output: &Utf8Path) -> Utf8PathBuf {
    output.with_extension("html")
}

/// Static single-file HTML reporter.
#[derive(Clone, Debug)]
pub struct HtmlReporter {
    title: String,
}

impl Default for HtmlReporter {
    fn default() -> Self {
        Self::new("imageproof validation report")
    }
}

impl HtmlReporter {
    /// Creates a reporter whose page carries `title`.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
        }
    }

    /// Renders the report document without writing it.
    #[must_use]
    pub fn render(&self, results: &RunResultSet) -> String {
        let totals = results.totals();
        let title = escape_html(&self.title);
        let mut page = format!(
            "<!DOCTYPE html>\n<html lang=\"en\">\n<head>\n<meta charset=\"utf-8\">\n\
             <title>{title}</title>\n<style>{STYLE}</style>\n</head>\n<body>\n\
             <h1>{title}</h1>\n\
             <p class=\"summary\">{instances} instance(s): {passed} passed, {failed} failed, \
             {errored} errored, {instance_errors} instance error(s)</p>\n",
            instances = results.len(),
            passed = totals.passed,
            failed = totals.failed,
            errored = totals.errored,
            instance_errors = totals.instance_errors,
        );
        if results.is_empty() {
            page.push_str("<p>No instances reported results.</p>\n");
        }
        for entry in results.iter() {
            page.push_str(&render_instance(entry));
        }
        page.push_str("</body>\n</html>\n");
        page
    }
}

impl Reporter for HtmlReporter {
    fn generate_html_report(
        &self,
        results: &RunResultSet,
        report_path: &Utf8Path,
    ) -> Result<(), ReportingError> {
        files::write_atomic(report_path, &self.render(results)).map_err(|err| {
            ReportingError::Write {
                path: report_path.to_path_buf(),
                message: err.to_string(),
            }
        })
    }
}

const STYLE: &str = "body{font-family:sans-serif;margin:2em}\
table{border-collapse:collapse;margin-bottom:2em}\
td,th{border:1px solid #ccc;padding:.3em .6em;text-align:left;vertical-align:top}\
.passed{color:#1a7f37}.failed{color:#cf222e}.errored{color:#9a6700}\
pre{margin:0;white-space:pre-wrap}";

fn render_instance(entry: &InstanceResults) -> String {
    let status = if entry.is_clean() { "passed" } else { "failed" };
    let mut section = format!(
        "<h2 class=\"{status}\">{}</h2>\n",
        escape_html(&entry.instance)
    );
    if let Some(error) = &entry.error {
        section.push_str(&format!(
            "<p class=\"errored\">Instance error: {}</p>\n",
            escape_html(error)
        ));
    }
    section.push_str(
        "<table>\n<tr><th>Check</th><th>Outcome</th><th>Duration (ms)</th><th>Detail</th></tr>\n",
    );
    for case in &entry.cases {
        let (class, detail) = match &case.outcome {
            CaseOutcome::Passed => ("passed", String::new()),
            CaseOutcome::Failed { message } => ("failed", escape_html(message)),
            CaseOutcome::Errored { message } => ("errored", escape_html(message)),
        };
        let output = [("stdout", &case.stdout), ("stderr", &case.stderr)]
            .into_iter()
            .filter_map(|(label, text)| {
                text.as_deref()
                    .filter(|value| !value.trim().is_empty())
                    .map(|value| format!("<pre>{label}: {}</pre>", escape_html(value)))
            })
            .collect::<String>();
        section.push_str(&format!(
            "<tr><td>{}</td><td class=\"{class}\">{class}</td><td>{}</td><td>{detail}{output}</td></tr>\n",
            escape_html(&case.name),
            case.duration_ms
        ));
    }
    section.push_str("</table>\n");
    section
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}
