//! JUnit XML rendering.

use std::fmt::Write as _;
use std::time::Duration;

use super::{CaseOutcome, CaseResult, InstanceResults, RunResultSet};

/// Name of the synthetic case carrying an instance-level error.
const INSTANCE_ERROR_CASE: &str = "instance";

fn escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            '\n' | '\r' | '\t' => escaped.push(ch),
            other if other.is_control() => {}
            other => escaped.push(other),
        }
    }
    escaped
}

fn seconds(duration_ms: u64) -> String {
    format!("{:.3}", Duration::from_millis(duration_ms).as_secs_f64())
}

fn write_case(out: &mut String, suite: &str, case: &CaseResult) {
    write!(
        out,
        "    <testcase classname=\"imageproof.{suite}\" name=\"{}\" time=\"{}\"",
        escape(&case.name),
        seconds(case.duration_ms)
    )
    .ok();
    let body = match &case.outcome {
        CaseOutcome::Passed => None,
        CaseOutcome::Failed { message } => Some(("failure", message)),
        CaseOutcome::Errored { message } => Some(("error", message)),
    };
    if body.is_none() && case.stdout.is_none() && case.stderr.is_none() {
        out.push_str("/>\n");
        return;
    }
    out.push_str(">\n");
    if let Some((tag, message)) = body {
        writeln!(out, "      <{tag} message=\"{}\"/>", escape(message)).ok();
    }
    if let Some(stdout) = &case.stdout {
        writeln!(out, "      <system-out>{}</system-out>", escape(stdout)).ok();
    }
    if let Some(stderr) = &case.stderr {
        writeln!(out, "      <system-err>{}</system-err>", escape(stderr)).ok();
    }
    out.push_str("    </testcase>\n");
}

fn write_suite(out: &mut String, entry: &InstanceResults) {
    let suite = escape(&entry.instance);
    let failures = entry
        .cases
        .iter()
        .filter(|case| matches!(case.outcome, CaseOutcome::Failed { .. }))
        .count();
    let errors = entry
        .cases
        .iter()
        .filter(|case| matches!(case.outcome, CaseOutcome::Errored { .. }))
        .count()
        + usize::from(entry.error.is_some());
    let tests = entry.cases.len() + usize::from(entry.error.is_some());
    let total_ms = entry.cases.iter().map(|case| case.duration_ms).sum();

    writeln!(
        out,
        "  <testsuite name=\"{suite}\" tests=\"{tests}\" failures=\"{failures}\" errors=\"{errors}\" time=\"{}\">",
        seconds(total_ms)
    )
    .ok();
    for case in &entry.cases {
        write_case(out, &suite, case);
    }
    if let Some(error) = &entry.error {
        write_case(
            out,
            &suite,
            &CaseResult::new(
                INSTANCE_ERROR_CASE,
                CaseOutcome::Errored {
                    message: error.clone(),
                },
                0,
            ),
        );
    }
    out.push_str("  </testsuite>\n");
}

/// Renders `results` as a JUnit XML document with one `<testsuite>` per
/// instance.
#[must_use]
pub fn render_junit(results: &RunResultSet) -> String {
    let totals = results.totals();
    let mut out = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
    writeln!(
        out,
        "<testsuites name=\"imageproof\" tests=\"{}\" failures=\"{}\" errors=\"{}\">",
        totals.passed + totals.failed + totals.errored + totals.instance_errors,
        totals.failed,
        totals.errored + totals.instance_errors
    )
    .ok();
    for entry in results.iter() {
        write_suite(&mut out, entry);
    }
    out.push_str("</testsuites>\n");
    out
}
