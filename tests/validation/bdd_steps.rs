//! BDD step definitions for the validation run lifecycle.

use std::time::Duration;

use imageproof::test_support::{RunnerBehaviour, loopback_instances};
use imageproof::{CaseOutcome, RunSettings, SshSession, ValidationRun};
use rstest_bdd_macros::{given, then, when};
use tokio::runtime::Runtime;

use super::test_helpers::{FailureKind, ValidationContext, ValidationOutcome};

#[derive(Debug, thiserror::Error)]
pub enum StepError {
    #[error("assertion failed: {0}")]
    Assertion(String),
    #[error("failed to set up the run: {0}")]
    Setup(String),
}

#[given("a resource plan with instances \"{names}\"")]
fn resource_plan(mut validation_context: ValidationContext, names: String) -> ValidationContext {
    let ids: Vec<&str> = names.split(',').map(str::trim).collect();
    validation_context.configurator.script.instances = loopback_instances(&ids);
    validation_context
}

#[given("provisioning fails after \"{count}\" instances")]
fn provisioning_fails(mut validation_context: ValidationContext, count: usize) -> ValidationContext {
    validation_context.configurator.script.fail_on_create = true;
    validation_context.configurator.script.created_before_failure = count;
    validation_context
}

#[given("teardown fails")]
fn teardown_fails(mut validation_context: ValidationContext) -> ValidationContext {
    validation_context.configurator.script.fail_on_destroy = true;
    validation_context
}

#[given("key generation fails")]
fn key_generation_fails(mut validation_context: ValidationContext) -> ValidationContext {
    validation_context.ssh.fail_keygen = true;
    validation_context
}

#[given("instance \"{instance}\" is unreachable")]
fn instance_unreachable(mut validation_context: ValidationContext, instance: String) -> ValidationContext {
    validation_context.launcher = validation_context
        .launcher
        .with_behaviour(instance.trim(), RunnerBehaviour::Unreachable);
    validation_context
}

#[given("suites run in parallel")]
fn suites_run_in_parallel(mut validation_context: ValidationContext) -> ValidationContext {
    validation_context.parallel = true;
    validation_context
}

#[when("I run the validation")]
fn run_validation(validation_context: ValidationContext) -> Result<ValidationContext, StepError> {
    let runtime = Runtime::new().map_err(|err| StepError::Setup(err.to_string()))?;
    let settings = RunSettings {
        resources_file: validation_context.workspace.join("resources.json"),
        output_file: validation_context.output_file(),
        parallel: validation_context.parallel,
        debug: false,
        settle_delay: Duration::ZERO,
        ssh_config_file: validation_context.workspace.join("ssh_config"),
    };
    let run = ValidationRun::new(
        settings,
        validation_context.configurator.clone(),
        validation_context.ssh.clone(),
        validation_context.launcher.clone(),
        validation_context.reporter.clone(),
    )
    .map_err(|err| StepError::Setup(err.to_string()))?;

    let outcome = match runtime.block_on(run.run()) {
        Ok(summary) => ValidationOutcome::Success(Box::new(summary)),
        Err(err) => ValidationOutcome::Failure {
            kind: FailureKind::of(&err),
            message: err.to_string(),
        },
    };

    Ok(ValidationContext {
        outcome: Some(outcome),
        ..validation_context
    })
}

#[then("the run succeeds")]
fn run_succeeds(validation_context: &ValidationContext) -> Result<(), StepError> {
    match &validation_context.outcome {
        Some(ValidationOutcome::Success(_)) => Ok(()),
        Some(ValidationOutcome::Failure { message, .. }) => Err(StepError::Assertion(format!(
            "expected success, got failure: {message}"
        ))),
        None => Err(StepError::Assertion(String::from("missing outcome"))),
    }
}

#[then("the run fails with a \"{kind}\" error")]
fn run_fails_with(validation_context: &ValidationContext, kind: String) -> Result<(), StepError> {
    let expected = FailureKind::parse(&kind)
        .ok_or_else(|| StepError::Assertion(format!("unknown failure kind '{kind}'")))?;
    match &validation_context.outcome {
        Some(ValidationOutcome::Failure { kind: actual, .. }) if *actual == expected => Ok(()),
        Some(ValidationOutcome::Failure { kind: actual, message }) => Err(StepError::Assertion(
            format!("expected {expected:?} failure, got {actual:?}: {message}"),
        )),
        Some(ValidationOutcome::Success(_)) => Err(StepError::Assertion(String::from(
            "expected failure, got success",
        ))),
        None => Err(StepError::Assertion(String::from("missing outcome"))),
    }
}

#[then("the error message contains \"{snippet}\"")]
fn error_message_contains(
    validation_context: &ValidationContext,
    snippet: String,
) -> Result<(), StepError> {
    let Some(ValidationOutcome::Failure { message, .. }) = &validation_context.outcome else {
        return Err(StepError::Assertion(String::from("expected failure outcome")));
    };
    if message.contains(&snippet) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected '{snippet}' in error message: {message}"
        )))
    }
}

#[then("results are recorded for \"{count}\" instances")]
fn results_recorded(validation_context: &ValidationContext, count: usize) -> Result<(), StepError> {
    let summary = validation_context
        .summary()
        .ok_or_else(|| StepError::Assertion(String::from("expected a run summary")))?;
    if summary.results.len() != count {
        return Err(StepError::Assertion(format!(
            "expected {count} instances in results, got {}",
            summary.results.len()
        )));
    }
    if validation_context.output_file().exists() {
        Ok(())
    } else {
        Err(StepError::Assertion(String::from(
            "results file should be written",
        )))
    }
}

#[then("the HTML report is written")]
fn report_written(validation_context: &ValidationContext) -> Result<(), StepError> {
    let report = validation_context.workspace.join("results.html");
    let summary = validation_context
        .summary()
        .ok_or_else(|| StepError::Assertion(String::from("expected a run summary")))?;
    if summary.report_path.as_ref() == Some(&report) && report.exists() {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected report at {report}, summary reported {:?}",
            summary.report_path
        )))
    }
}

#[then("the infrastructure is destroyed once")]
fn destroyed_once(validation_context: &ValidationContext) -> Result<(), StepError> {
    match validation_context.log.count("destroy_infra") {
        1 => Ok(()),
        other => Err(StepError::Assertion(format!(
            "destroy_infra should run exactly once, ran {other} times"
        ))),
    }
}

#[then("the infrastructure is never created")]
fn never_created(validation_context: &ValidationContext) -> Result<(), StepError> {
    let log = &validation_context.log;
    if log.count("create_infra") == 0 && log.count("destroy_infra") == 0 {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "no controller calls expected, got {:?}",
            log.entries()
        )))
    }
}

#[then("instance \"{instance}\" is released")]
fn instance_released(validation_context: &ValidationContext, instance: String) -> Result<(), StepError> {
    let entry = format!("release {}", instance.trim());
    if validation_context.log.count(&entry) == 1 {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected '{entry}' in {:?}",
            validation_context.log.entries()
        )))
    }
}

#[then("no key files remain")]
fn no_key_files_remain(validation_context: &ValidationContext) -> Result<(), StepError> {
    let keys = validation_context.ssh.key_pair();
    if keys.private_key.exists() || keys.public_key.exists() {
        Err(StepError::Assertion(format!(
            "key files should be removed from {}",
            validation_context.workspace
        )))
    } else {
        Ok(())
    }
}

#[then("instance \"{instance}\" has an error containing \"{snippet}\"")]
fn instance_has_error(
    validation_context: &ValidationContext,
    instance: String,
    snippet: String,
) -> Result<(), StepError> {
    let summary = validation_context
        .summary()
        .ok_or_else(|| StepError::Assertion(String::from("expected a run summary")))?;
    let error = summary
        .results
        .get(instance.trim())
        .and_then(|entry| entry.error.as_deref())
        .ok_or_else(|| StepError::Assertion(format!("no error recorded for {instance}")))?;
    if error.contains(&snippet) {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected '{snippet}' in error for {instance}: {error}"
        )))
    }
}

#[then("instance \"{instance}\" passed every check")]
fn instance_passed(validation_context: &ValidationContext, instance: String) -> Result<(), StepError> {
    let summary = validation_context
        .summary()
        .ok_or_else(|| StepError::Assertion(String::from("expected a run summary")))?;
    let entry = summary
        .results
        .get(instance.trim())
        .ok_or_else(|| StepError::Assertion(format!("no results for {instance}")))?;
    let all_passed = !entry.cases.is_empty()
        && entry
            .cases
            .iter()
            .all(|case| case.outcome == CaseOutcome::Passed)
        && entry.error.is_none();
    if all_passed {
        Ok(())
    } else {
        Err(StepError::Assertion(format!(
            "expected every check to pass on {instance}: {entry:?}"
        )))
    }
}
