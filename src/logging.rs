//! Logging initialisation for the `imageproof` binary.
//!
//! Configures `tracing-subscriber` from the validator configuration. The
//! `RUST_LOG` environment variable always wins; otherwise the level is
//! `info`, or `debug` when the run was started with `--debug`.

use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Errors raised while installing the global subscriber.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum LoggingError {
    /// Raised when the requested format is not recognised.
    #[error("unknown log format '{0}', expected 'json' or 'pretty'")]
    UnknownFormat(String),
    /// Raised when a global subscriber is already installed.
    #[error("failed to initialise tracing subscriber: {0}")]
    Init(String),
}

/// Returns the default filter directive for the given debug flag.
#[must_use]
pub const fn default_directive(debug: bool) -> &'static str {
    if debug { "debug" } else { "info" }
}

/// Installs the global tracing subscriber.
///
/// Must be called at most once per process, before any tracing macros are
/// expected to produce output. Logs go to stderr so stdout stays free for
/// command output.
///
/// # Errors
///
/// Returns [`LoggingError`] when the format is unknown or a subscriber has
/// already been installed.
pub fn init_tracing(format: &str, debug: bool) -> Result<(), LoggingError> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(debug)));

    match format.trim() {
        "json" => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .map_err(|err| LoggingError::Init(err.to_string())),
        "pretty" => tracing_subscriber::registry()
            .with(env_filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(false)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .map_err(|err| LoggingError::Init(err.to_string())),
        other => Err(LoggingError::UnknownFormat(other.to_owned())),
    }
}
