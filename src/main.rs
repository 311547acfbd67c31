//! Binary entry point for the imageproof CLI.

use std::io::{self, Write};
use std::process;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::Parser;
use thiserror::Error;

use imageproof::logging::{self, LoggingError};
use imageproof::{
    ConfigurationError, HtmlReporter, OpenSshSession, ProvisionError, ResourceConfigurator,
    RunSettings, RunSummary, ScalewayConfig, SshSuiteLauncher, ValidationError, ValidationRun,
    ValidatorConfig,
};

mod cli;

use cli::{Cli, ValidateCommand};

/// Every check passed and cleanup completed.
const EXIT_SUCCESS: i32 = 0;
/// The run could not complete.
const EXIT_FATAL: i32 = 1;
/// The run completed but checks failed or instances errored.
const EXIT_CHECKS_FAILED: i32 = 2;
/// The run completed but resources or key files may have leaked.
const EXIT_CLEANUP_FAILED: i32 = 3;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Logging(#[from] LoggingError),
    #[error(transparent)]
    Setup(#[from] ConfigurationError),
    #[error("validation failed: {0}")]
    Run(#[from] ValidationError<ProvisionError>),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(code) => code,
        Err(err) => {
            report_error(&err);
            EXIT_FATAL
        }
    };

    process::exit(exit_code);
}

async fn dispatch(cli: Cli) -> Result<i32, CliError> {
    match cli {
        Cli::Validate(command) => validate(command).await,
    }
}

async fn validate(args: ValidateCommand) -> Result<i32, CliError> {
    let validator =
        ValidatorConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    validator
        .validate()
        .map_err(|err| CliError::Config(err.to_string()))?;
    logging::init_tracing(&validator.log_format, args.debug)?;

    let scaleway =
        ScalewayConfig::load_without_cli_args().map_err(|err| CliError::Config(err.to_string()))?;
    let settings = RunSettings {
        resources_file: Utf8PathBuf::from(args.resources),
        output_file: Utf8PathBuf::from(args.output),
        parallel: args.parallel,
        debug: args.debug,
        settle_delay: Duration::from_secs(args.settle_seconds.unwrap_or(validator.settle_seconds)),
        ssh_config_file: validator.ssh_config_path(),
    };

    let run = ValidationRun::new(
        settings,
        ResourceConfigurator::new(scaleway, validator.ssh_user.trim()),
        OpenSshSession::new(
            validator.ssh_keygen_bin.trim(),
            validator.ssh_user.trim(),
            validator.ssh_key_path(),
        ),
        SshSuiteLauncher::new(validator.ssh_bin.trim(), args.debug),
        HtmlReporter::default(),
    )?;
    let summary = run.run().await?;

    write_summary(io::stdout(), &summary);
    Ok(exit_code_for(&summary))
}

/// Leaked infrastructure outranks failing checks.
fn exit_code_for(summary: &RunSummary) -> i32 {
    if !summary.cleanup.is_clean() {
        EXIT_CLEANUP_FAILED
    } else if summary.results.has_failures() {
        EXIT_CHECKS_FAILED
    } else {
        EXIT_SUCCESS
    }
}

fn write_summary(mut target: impl Write, summary: &RunSummary) {
    for entry in summary.results.iter() {
        let status = if entry.is_clean() { "PASS" } else { "FAIL" };
        writeln!(target, "{status} {}", entry.instance).ok();
        if let Some(error) = &entry.error {
            writeln!(target, "  error: {error}").ok();
        }
    }

    let totals = summary.results.totals();
    writeln!(
        target,
        "{} instance(s): {} passed, {} failed, {} errored, {} instance error(s)",
        summary.results.len(),
        totals.passed,
        totals.failed,
        totals.errored,
        totals.instance_errors
    )
    .ok();
    if let Some(path) = &summary.report_path {
        writeln!(target, "report: {path}").ok();
    }
    if let Some(note) = summary.cleanup.summary() {
        writeln!(target, "warning: cleanup incomplete: {note}").ok();
    }
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}
