//! Error types for resource description handling.

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::config::ConfigError;

/// Errors raised while turning a resource description into a plan.
///
/// Every variant is raised before any cloud resource is created.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigurationError {
    /// Raised when the description cannot be read.
    #[error("failed to read resource description {path}: {message}")]
    Read {
        /// Path of the description file.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
    /// Raised when the description is not valid JSON for the expected shape.
    #[error("failed to parse resource description {path}: {message}")]
    Parse {
        /// Path of the description file.
        path: Utf8PathBuf,
        /// Parser error message.
        message: String,
    },
    /// Raised when neither the document nor any entry names a provider.
    #[error("resource description {path} does not name a cloud provider")]
    MissingProvider {
        /// Path of the description file.
        path: Utf8PathBuf,
    },
    /// Raised when entries target more than one provider.
    #[error("resource description targets more than one cloud provider: {providers}")]
    AmbiguousProvider {
        /// Comma separated list of the providers found.
        providers: String,
    },
    /// Raised when the provider name is not supported.
    #[error("unsupported cloud provider '{provider}' (expected 'scaleway' or 'static')")]
    UnsupportedProvider {
        /// Provider name as written in the description.
        provider: String,
    },
    /// Raised when the description lists no instances.
    #[error("resource description {path} does not request any instances")]
    NoResources {
        /// Path of the description file.
        path: Utf8PathBuf,
    },
    /// Raised when an individual entry is incomplete or inconsistent.
    #[error("instance entry {index} is invalid: {message}")]
    InvalidResource {
        /// Zero-based position of the entry.
        index: usize,
        /// Human-readable description of the problem.
        message: String,
    },
    /// Raised when provider credentials are missing.
    #[error("provider settings are incomplete: {0}")]
    ProviderSettings(#[from] ConfigError),
    /// Raised when the public key cannot be read for injection into new
    /// instances.
    #[error("failed to read public key {path}: {message}")]
    PublicKey {
        /// Path of the public key file.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
    /// Raised when the results file extension does not map to a format.
    #[error("unsupported results format for {path}: use a .json or .xml extension")]
    UnsupportedOutputFormat {
        /// Output path supplied by the caller.
        path: Utf8PathBuf,
    },
}
