//! Per-run SSH credentials and client configuration.
//!
//! Each run generates a fresh Ed25519 key pair, authorises its public half
//! on new instances, and writes an OpenSSH client configuration with one
//! `Host` block per instance. Suite runners connect with
//! `ssh -F <config> <instance-id>`, so the instance identifier doubles as
//! the host alias.

use std::collections::BTreeSet;
use std::ffi::OsString;

use camino::{Utf8Path, Utf8PathBuf};
use thiserror::Error;
use tracing::{debug, info};

use crate::files;
use crate::infra::InstanceDescriptor;
use crate::process::{CommandError, CommandRunner, ProcessCommandRunner};

/// Comment stored in generated public keys.
pub const KEY_COMMENT: &str = "imageproof";

/// Paths of the per-run key pair.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SshKeyPair {
    /// Private key file.
    pub private_key: Utf8PathBuf,
    /// Public key file, the private key path with `.pub` appended.
    pub public_key: Utf8PathBuf,
}

impl SshKeyPair {
    /// Derives the key pair paths from the private key location.
    #[must_use]
    pub fn from_private_key(path: impl Into<Utf8PathBuf>) -> Self {
        let private_key = path.into();
        let public_key = Utf8PathBuf::from(format!("{private_key}.pub"));
        Self {
            private_key,
            public_key,
        }
    }
}

/// Errors raised while preparing SSH credentials.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum SshError {
    /// Raised when `ssh-keygen` cannot be started.
    #[error(transparent)]
    Spawn(#[from] CommandError),
    /// Raised when `ssh-keygen` exits unsuccessfully.
    #[error("{program} exited with status {status}: {stderr}")]
    KeyGeneration {
        /// Key generation program.
        program: String,
        /// Exit status text.
        status: String,
        /// Captured standard error.
        stderr: String,
    },
    /// Raised when a key or configuration file cannot be read or written.
    #[error("failed to access {path}: {message}")]
    Io {
        /// Path being accessed.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
    /// Raised when an instance identifier cannot be used as a host alias.
    #[error("instance identifier '{alias}' cannot be used as an SSH host alias")]
    InvalidHostAlias {
        /// Offending identifier.
        alias: String,
    },
    /// Raised when two instances share an identifier, which OpenSSH would
    /// resolve to the first matching host block.
    #[error("instance identifier '{alias}' is used by more than one instance")]
    DuplicateHostAlias {
        /// Repeated identifier.
        alias: String,
    },
}

/// SSH capability used by the orchestrator.
pub trait SshSession: Send + Sync {
    /// Returns the key pair paths this session manages, whether or not the
    /// files exist yet.
    fn key_pair(&self) -> SshKeyPair;

    /// Generates a fresh key pair, replacing stale files from earlier runs.
    ///
    /// # Errors
    ///
    /// Returns [`SshError`] when the key cannot be generated.
    fn generate_ssh_key_pair(&self) -> Result<SshKeyPair, SshError>;

    /// Writes a client configuration with one host entry per instance.
    ///
    /// # Errors
    ///
    /// Returns [`SshError`] when an identifier is not a valid alias or the
    /// file cannot be written.
    fn generate_instances_ssh_config(
        &self,
        instances: &[InstanceDescriptor],
        ssh_config_file: &Utf8Path,
        ssh_key_path: &Utf8Path,
    ) -> Result<(), SshError>;
}

/// [`SshSession`] backed by the OpenSSH command line tools.
#[derive(Clone, Debug)]
pub struct OpenSshSession<R: CommandRunner = ProcessCommandRunner> {
    runner: R,
    keygen_bin: String,
    user: String,
    key_pair: SshKeyPair,
}

impl OpenSshSession<ProcessCommandRunner> {
    /// Creates a session that spawns real processes.
    #[must_use]
    pub fn new(
        keygen_bin: impl Into<String>,
        user: impl Into<String>,
        private_key: Utf8PathBuf,
    ) -> Self {
        Self::with_runner(ProcessCommandRunner, keygen_bin, user, private_key)
    }
}

impl<R: CommandRunner> OpenSshSession<R> {
    /// Creates a session that runs `ssh-keygen` through `runner`.
    #[must_use]
    pub fn with_runner(
        runner: R,
        keygen_bin: impl Into<String>,
        user: impl Into<String>,
        private_key: Utf8PathBuf,
    ) -> Self {
        Self {
            runner,
            keygen_bin: keygen_bin.into(),
            user: user.into(),
            key_pair: SshKeyPair::from_private_key(private_key),
        }
    }

    fn remove_stale(&self, path: &Utf8Path) -> Result<(), SshError> {
        if files::remove_file_if_exists(path).map_err(|err| SshError::Io {
            path: path.to_path_buf(),
            message: err.to_string(),
        })? {
            debug!(%path, "removed stale key file");
        }
        Ok(())
    }
}

impl<R: CommandRunner> SshSession for OpenSshSession<R> {
    fn key_pair(&self) -> SshKeyPair {
        self.key_pair.clone()
    }

    fn generate_ssh_key_pair(&self) -> Result<SshKeyPair, SshError> {
        let SshKeyPair {
            private_key,
            public_key,
        } = &self.key_pair;
        if let Some(parent) = private_key.parent().filter(|p| !p.as_str().is_empty()) {
            files::ensure_dir(parent).map_err(|err| SshError::Io {
                path: parent.to_path_buf(),
                message: err.to_string(),
            })?;
        }
        self.remove_stale(private_key)?;
        self.remove_stale(public_key)?;

        let args: Vec<OsString> = [
            "-t",
            "ed25519",
            "-N",
            "",
            "-C",
            KEY_COMMENT,
            "-f",
            private_key.as_str(),
            "-q",
        ]
        .into_iter()
        .map(OsString::from)
        .collect();
        let output = self.runner.run(&self.keygen_bin, &args)?;
        if !output.is_success() {
            return Err(SshError::KeyGeneration {
                program: self.keygen_bin.clone(),
                status: output.status_text(),
                stderr: output.stderr.trim().to_owned(),
            });
        }

        info!(key = %private_key, "generated SSH key pair");
        Ok(self.key_pair.clone())
    }

    fn generate_instances_ssh_config(
        &self,
        instances: &[InstanceDescriptor],
        ssh_config_file: &Utf8Path,
        ssh_key_path: &Utf8Path,
    ) -> Result<(), SshError> {
        let rendered = render_ssh_config(instances, &self.user, ssh_key_path)?;
        files::write_atomic(ssh_config_file, &rendered).map_err(|err| SshError::Io {
            path: ssh_config_file.to_path_buf(),
            message: err.to_string(),
        })?;
        info!(
            path = %ssh_config_file,
            hosts = instances.len(),
            "wrote SSH client configuration"
        );
        Ok(())
    }
}

/// Returns `true` when `alias` can be used verbatim as an OpenSSH `Host`
/// pattern that matches only itself.
#[must_use]
pub fn is_valid_host_alias(alias: &str) -> bool {
    !alias.is_empty()
        && !alias.chars().any(|ch| {
            ch.is_whitespace() || ch.is_control() || matches!(ch, '*' | '?' | '!' | '#' | ',')
        })
}

/// Renders an OpenSSH client configuration for `instances`.
///
/// # Errors
///
/// Returns [`SshError::InvalidHostAlias`] when an identifier contains
/// characters OpenSSH treats as pattern syntax or separators, and
/// [`SshError::DuplicateHostAlias`] when two instances share one.
pub fn render_ssh_config(
    instances: &[InstanceDescriptor],
    user: &str,
    ssh_key_path: &Utf8Path,
) -> Result<String, SshError> {
    let mut rendered = String::from("# Generated by imageproof; removed with the run's keys.\n");
    let mut aliases = BTreeSet::new();
    for instance in instances {
        if !is_valid_host_alias(&instance.id) {
            return Err(SshError::InvalidHostAlias {
                alias: instance.id.clone(),
            });
        }
        if !aliases.insert(instance.id.as_str()) {
            return Err(SshError::DuplicateHostAlias {
                alias: instance.id.clone(),
            });
        }
        rendered.push_str(&format!(
            "\nHost {alias}\n    \
             HostName {address}\n    \
             Port {port}\n    \
             User {user}\n    \
             IdentityFile \"{ssh_key_path}\"\n    \
             IdentitiesOnly yes\n    \
             BatchMode yes\n    \
             StrictHostKeyChecking no\n    \
             UserKnownHostsFile /dev/null\n    \
             LogLevel ERROR\n    \
             ConnectTimeout 10\n",
            alias = instance.id,
            address = instance.address,
            port = instance.ssh_port,
        ));
    }
    Ok(rendered)
}
