//! Configuration loading via `ortho-config`.
//!
//! Two layered structures are exposed: [`ScalewayConfig`] holds provider
//! credentials (only required when a resource description targets
//! Scaleway) and [`ValidatorConfig`] holds local tooling settings.

use std::ffi::OsString;

use camino::Utf8PathBuf;
use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

/// Name of the private key generated for each run inside the work directory.
pub const SSH_KEY_FILE_NAME: &str = "id_ed25519";

/// Name of the generated OpenSSH client configuration file.
pub const SSH_CONFIG_FILE_NAME: &str = "ssh_config";

/// Scaleway credentials derived from environment variables, configuration
/// files, and CLI flags.
#[derive(Clone, Debug, Default, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "SCW")]
pub struct ScalewayConfig {
    /// Access key assigned to the Scaleway application. Captured for audit
    /// logging only.
    pub access_key: Option<String>,
    /// Secret key used for authentication.
    pub secret_key: Option<String>,
    /// Organisation identifier used by some Scaleway endpoints.
    pub default_organization_id: Option<String>,
    /// Project identifier used for billing and resource scoping.
    pub default_project_id: Option<String>,
}

/// Validated Scaleway credentials ready for API use.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScalewayCredentials {
    /// Secret key sent as `X-Auth-Token`.
    pub secret_key: String,
    /// Project that owns provisioned servers.
    pub project_id: String,
    /// Optional organisation scope for image lookups.
    pub organization_id: Option<String>,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
    section: &'static str,
}

impl FieldMetadata {
    const fn new(
        description: &'static str,
        env_var: &'static str,
        toml_key: &'static str,
        section: &'static str,
    ) -> Self {
        Self {
            description,
            env_var,
            toml_key,
            section,
        }
    }
}

fn require_field(value: Option<&str>, metadata: &FieldMetadata) -> Result<String, ConfigError> {
    match value.map(str::trim) {
        Some(trimmed) if !trimmed.is_empty() => Ok(trimmed.to_owned()),
        _ => Err(ConfigError::MissingField(format!(
            "missing {}: set {} or add {} to [{}] in imageproof.toml",
            metadata.description, metadata.env_var, metadata.toml_key, metadata.section
        ))),
    }
}

impl ScalewayConfig {
    /// Loads configuration without attempting to parse CLI arguments. Values
    /// still merge defaults, configuration files, and environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("imageproof")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Checks that the fields needed to call the Scaleway API are present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] naming the environment variable
    /// and configuration key that supply the missing value.
    pub fn credentials(&self) -> Result<ScalewayCredentials, ConfigError> {
        let secret_key = require_field(
            self.secret_key.as_deref(),
            &FieldMetadata::new(
                "Scaleway API secret key",
                "SCW_SECRET_KEY",
                "secret_key",
                "scaleway",
            ),
        )?;
        let project_id = require_field(
            self.default_project_id.as_deref(),
            &FieldMetadata::new(
                "Scaleway project ID",
                "SCW_DEFAULT_PROJECT_ID",
                "default_project_id",
                "scaleway",
            ),
        )?;
        let organization_id = self
            .default_organization_id
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_owned);

        Ok(ScalewayCredentials {
            secret_key,
            project_id,
            organization_id,
        })
    }
}

/// Local tooling settings layered from `imageproof.toml`, environment
/// variables prefixed with `IMAGEPROOF_`, and defaults.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "IMAGEPROOF",
    discovery(
        app_name = "imageproof",
        env_var = "IMAGEPROOF_CONFIG_PATH",
        config_file_name = "imageproof.toml",
        dotfile_name = ".imageproof.toml",
        project_file_name = "imageproof.toml"
    )
)]
pub struct ValidatorConfig {
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Path to the `ssh-keygen` executable.
    #[ortho_config(default = "ssh-keygen".to_owned())]
    pub ssh_keygen_bin: String,
    /// Remote user authorised with the generated key.
    #[ortho_config(default = "root".to_owned())]
    pub ssh_user: String,
    /// Directory holding the per-run key pair and SSH client configuration.
    #[ortho_config(default = ".imageproof".to_owned())]
    pub work_dir: String,
    /// Seconds to wait after provisioning before the first SSH connection.
    #[ortho_config(default = 30)]
    pub settle_seconds: u64,
    /// Log output format: `pretty` or `json`.
    #[ortho_config(default = "pretty".to_owned())]
    pub log_format: String,
}

impl ValidatorConfig {
    /// Loads configuration without parsing CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([OsString::from("imageproof")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Ensures configuration values are present after trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] when a required value is blank
    /// or [`ConfigError::Invalid`] when the log format is unknown.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (value, metadata) in [
            (
                &self.ssh_bin,
                FieldMetadata::new("ssh binary", "IMAGEPROOF_SSH_BIN", "ssh_bin", "validator"),
            ),
            (
                &self.ssh_keygen_bin,
                FieldMetadata::new(
                    "ssh-keygen binary",
                    "IMAGEPROOF_SSH_KEYGEN_BIN",
                    "ssh_keygen_bin",
                    "validator",
                ),
            ),
            (
                &self.ssh_user,
                FieldMetadata::new("SSH user", "IMAGEPROOF_SSH_USER", "ssh_user", "validator"),
            ),
            (
                &self.work_dir,
                FieldMetadata::new(
                    "work directory",
                    "IMAGEPROOF_WORK_DIR",
                    "work_dir",
                    "validator",
                ),
            ),
        ] {
            require_field(Some(value.as_str()), &metadata)?;
        }

        if !matches!(self.log_format.trim(), "pretty" | "json") {
            return Err(ConfigError::Invalid(format!(
                "log_format must be 'pretty' or 'json', got '{}'",
                self.log_format
            )));
        }
        Ok(())
    }

    /// Path of the per-run private key.
    #[must_use]
    pub fn ssh_key_path(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(self.work_dir.trim()).join(SSH_KEY_FILE_NAME)
    }

    /// Path of the generated SSH client configuration.
    #[must_use]
    pub fn ssh_config_path(&self) -> Utf8PathBuf {
        Utf8PathBuf::from(self.work_dir.trim()).join(SSH_CONFIG_FILE_NAME)
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("missing configuration field: {0}")]
    MissingField(String),
    /// Indicates a configuration value is present but unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
}

impl From<ortho_config::OrthoError> for ConfigError {
    fn from(value: ortho_config::OrthoError) -> Self {
        Self::Parse(value.to_string())
    }
}
