//! Command-line interface definitions for the `imageproof` binary.
//!
//! This module centralises the clap parser structures so both the main binary
//! and the build script can reuse them when generating the manual page.

use clap::Parser;

/// Top-level CLI for the `imageproof` binary.
#[derive(Debug, Parser)]
#[command(
    name = "imageproof",
    version,
    about = "Validate cloud machine images on disposable instances over SSH",
    arg_required_else_help = true
)]
pub(crate) enum Cli {
    /// Provision instances, run the check suite, report, and clean up.
    #[command(
        name = "validate",
        about = "Provision instances, run the check suite over SSH, and clean up"
    )]
    Validate(ValidateCommand),
}

/// Arguments for the `imageproof validate` subcommand.
#[derive(Debug, Parser)]
pub(crate) struct ValidateCommand {
    /// JSON resource description listing the instances to validate.
    #[arg(short = 'r', long, value_name = "FILE")]
    pub(crate) resources: String,
    /// Results file; a `.json` extension writes JSON, `.xml` writes JUnit XML.
    ///
    /// The HTML report is written next to it with the extension replaced by
    /// `.html`.
    #[arg(short = 'o', long, value_name = "FILE")]
    pub(crate) output: String,
    /// Run the check suite on all instances concurrently.
    #[arg(long)]
    pub(crate) parallel: bool,
    /// Log at debug level and keep remote command output in the results.
    #[arg(long)]
    pub(crate) debug: bool,
    /// Seconds to wait after provisioning before connecting; overrides
    /// `IMAGEPROOF_SETTLE_SECONDS`.
    #[arg(long, value_name = "SECONDS")]
    pub(crate) settle_seconds: Option<u64>,
}
