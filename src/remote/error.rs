//! Errors surfaced by the remote command and transfer client.

use camino::Utf8PathBuf;
use thiserror::Error;

/// Errors raised while talking to a pod over `ssh` or `scp`.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RemoteError {
    /// Raised when configuration is missing required values.
    #[error("missing {field}: set {env_var} or add {field} to podpilot.toml")]
    InvalidConfig {
        /// Configuration field that failed validation.
        field: String,
        /// Environment variable that supplies the field.
        env_var: String,
    },
    /// Raised when the connection or transfer failed after retries.
    #[error("{operation} on {instance_id} failed: {message}")]
    Transport {
        /// Client operation that failed (for example `upload_file`).
        operation: String,
        /// Pod the operation targeted.
        instance_id: String,
        /// Description of the last failure.
        message: String,
    },
    /// Raised when the remote command ran but exited non-zero.
    #[error("command on {instance_id} exited with status {status}: {command}", status = status_text(.exit_code.as_ref().copied()))]
    RemoteExecution {
        /// Pod the command ran on.
        instance_id: String,
        /// Command line, with registered secrets masked.
        command: String,
        /// Remote exit code, if one was reported.
        exit_code: Option<i32>,
        /// Captured standard error, when available.
        stderr: String,
    },
    /// Raised when a local destination cannot be prepared.
    #[error("failed to prepare local path {path}: {message}")]
    LocalPath {
        /// Local path involved.
        path: Utf8PathBuf,
        /// Operating system error string.
        message: String,
    },
}

fn status_text(code: Option<i32>) -> String {
    code.map_or_else(|| String::from("unknown"), |value| value.to_string())
}
