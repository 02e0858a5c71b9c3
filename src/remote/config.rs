//! SSH client settings and validation.
//!
//! [`SshConfig`] is loaded via `ortho-config`, which merges defaults,
//! configuration files and `PODPILOT_SSH_*` environment variables.

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use super::RemoteError;

/// Identity file used when none is configured.
pub const DEFAULT_IDENTITY_FILE: &str = "~/.ssh/id_ed25519";

/// SSH and SCP settings loaded via `ortho-config`.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "PODPILOT_SSH",
    discovery(
        app_name = "podpilot",
        env_var = "PODPILOT_CONFIG_PATH",
        config_file_name = "podpilot.toml",
        dotfile_name = ".podpilot.toml",
        project_file_name = "podpilot.toml"
    )
)]
pub struct SshConfig {
    /// Path to the `ssh` executable.
    #[ortho_config(default = "ssh".to_owned())]
    pub ssh_bin: String,
    /// Path to the `scp` executable.
    #[ortho_config(default = "scp".to_owned())]
    pub scp_bin: String,
    /// Remote user to connect as.
    #[ortho_config(default = "root".to_owned())]
    pub user: String,
    /// Private key used for authentication. Supports `~/` expansion.
    #[ortho_config(default = DEFAULT_IDENTITY_FILE.to_owned())]
    pub identity_file: String,
    /// Lets SSH prompt for passphrases or passwords. Off by default, so every
    /// call runs with `BatchMode=yes` and fails instead of blocking.
    #[ortho_config(default = false)]
    pub allow_prompts: bool,
    /// Whether to enforce host key checking; pods are ephemeral, so this is
    /// off unless requested.
    #[ortho_config(default = false)]
    pub strict_host_key_checking: bool,
    /// Known hosts file override; defaults to `/dev/null`.
    #[ortho_config(default = "/dev/null".to_owned())]
    pub known_hosts_file: String,
}

/// Errors raised when loading the SSH configuration from layered sources.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum SshConfigLoadError {
    /// Indicates that parsing or merging configuration layers failed.
    #[error("ssh configuration parsing failed: {0}")]
    Parse(String),
}

impl SshConfig {
    /// Ensures required values are present after trimming whitespace.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidConfig`] naming the first empty field.
    pub fn validate(&self) -> Result<(), RemoteError> {
        for (value, field) in [
            (&self.ssh_bin, "ssh_bin"),
            (&self.scp_bin, "scp_bin"),
            (&self.user, "user"),
            (&self.identity_file, "identity_file"),
        ] {
            if value.trim().is_empty() {
                return Err(RemoteError::InvalidConfig {
                    field: field.to_owned(),
                    env_var: format!("PODPILOT_SSH_{}", field.to_uppercase()),
                });
            }
        }
        Ok(())
    }

    /// Loads configuration from defaults, configuration files and the
    /// environment without parsing CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`SshConfigLoadError::Parse`] when merging sources fails.
    pub fn load_without_cli_args() -> Result<Self, SshConfigLoadError> {
        Self::load_from_iter([std::ffi::OsString::from("podpilot")])
            .map_err(|err| SshConfigLoadError::Parse(err.to_string()))
    }
}
