//! Remote command execution and file transfer over `ssh` and `scp`.
//!
//! Every call builds a fresh invocation from the [`SshConfig`] and a
//! [`ConnectionDescriptor`]; nothing is cached between calls. Transport
//! failures are retried with the budgets in [`RetryPolicy`]; remote exit codes
//! are not.

use std::ffi::OsString;
use std::time::Duration;

use camino::Utf8Path;
use cap_std::{ambient_authority, fs_utf8::Dir};
use tracing::{debug, info};

use crate::backend::ConnectionDescriptor;
use crate::retry::{RetryPolicy, Sleeper, ThreadSleeper, retry};

mod command;
mod config;
mod error;
mod types;
mod util;

pub use command::{ShellCommand, quote};
pub use config::{DEFAULT_IDENTITY_FILE, SshConfig, SshConfigLoadError};
pub use error::RemoteError;
pub use types::{
    CommandOutput, CommandRunner, ProcessCommandRunner, RemoteCommandOutput, RunnerError,
};
pub use util::{
    IDENTITY_PLACEHOLDER, SECRET_MASK, describe_invocation, expand_tilde, mask_secrets,
};

/// Exit status `ssh` reserves for its own connection failures.
pub const SSH_TRANSPORT_EXIT: i32 = 255;

/// Submission limit for detached commands.
pub const BACKGROUND_SUBMIT_TIMEOUT: Duration = Duration::from_secs(10);

/// Limit for single-shot probes such as [`RemoteClient::file_exists`].
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Runs commands on pods and copies files to and from them.
#[derive(Clone, Debug)]
pub struct RemoteClient<R: CommandRunner, S: Sleeper = ThreadSleeper> {
    config: SshConfig,
    runner: R,
    sleeper: S,
    secrets: Vec<String>,
}

impl RemoteClient<ProcessCommandRunner> {
    /// Convenience constructor that wires the real process runner.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidConfig`] when validation fails.
    pub fn with_process_runner(config: SshConfig) -> Result<Self, RemoteError> {
        Self::new(config, ProcessCommandRunner)
    }
}

impl<R: CommandRunner> RemoteClient<R> {
    /// Creates a client that sleeps on the current thread between retries.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::InvalidConfig`] when configuration validation
    /// fails.
    pub fn new(config: SshConfig, runner: R) -> Result<Self, RemoteError> {
        config.validate()?;
        Ok(Self {
            config,
            runner,
            sleeper: ThreadSleeper,
            secrets: Vec::new(),
        })
    }
}

impl<R: CommandRunner, S: Sleeper> RemoteClient<R, S> {
    /// Replaces the sleeper used between retry attempts.
    #[must_use]
    pub fn with_sleeper<T: Sleeper>(self, sleeper: T) -> RemoteClient<R, T> {
        RemoteClient {
            config: self.config,
            runner: self.runner,
            sleeper,
            secrets: self.secrets,
        }
    }

    /// Registers a value that must never appear in logs or error messages.
    #[must_use]
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        let value = secret.into();
        if !value.trim().is_empty() {
            self.secrets.push(value);
        }
        self
    }

    /// Returns a reference to the underlying configuration.
    #[must_use]
    pub const fn config(&self) -> &SshConfig {
        &self.config
    }

    /// Runs `command` on the pod.
    ///
    /// With `capture`, stdout and stderr are returned for the caller to
    /// interpret whatever the exit code. Without it, output streams to the
    /// terminal and a non-zero exit becomes [`RemoteError::RemoteExecution`].
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Transport`] when every attempt failed to reach
    /// the pod, or [`RemoteError::RemoteExecution`] as described above.
    pub fn run_command(
        &self,
        conn: &ConnectionDescriptor,
        command: &ShellCommand,
        capture: bool,
        timeout: Option<Duration>,
    ) -> Result<RemoteCommandOutput, RemoteError> {
        let args = self.ssh_args(conn, &[], Some(command.as_str()));
        self.log_invocation(&self.config.ssh_bin, &args);

        let output = retry(&RetryPolicy::COMMAND, &self.sleeper, "run_command", || {
            self.ssh_attempt(conn, &args, capture, timeout)
        })?;

        if !capture && output.exit_code != Some(0) {
            return Err(self.execution_error(conn, command, &output));
        }
        Ok(output)
    }

    /// Starts `command` detached on the pod and returns once the remote shell
    /// accepted it.
    ///
    /// Submitted once: a timed-out submission may already have started the
    /// command, so it is never repeated.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Transport`] when submission failed, or
    /// [`RemoteError::RemoteExecution`] when the wrapper shell rejected it.
    pub fn run_background(
        &self,
        conn: &ConnectionDescriptor,
        command: &ShellCommand,
    ) -> Result<(), RemoteError> {
        let wrapped = ShellCommand::new("nohup")
            .arg("sh")
            .flag("-c")
            .arg(command.as_str())
            .stdin_from("/dev/null")
            .redirect_all_to("/dev/null")
            .background();
        let args = self.ssh_args(conn, &[], Some(wrapped.as_str()));
        self.log_invocation(&self.config.ssh_bin, &args);
        let output = self.ssh_attempt(conn, &args, true, Some(BACKGROUND_SUBMIT_TIMEOUT))?;
        if output.exit_code != Some(0) {
            return Err(self.execution_error(conn, &wrapped, &output));
        }
        info!(instance_id = %conn.instance_id, "background command submitted");
        Ok(())
    }

    /// Copies a local file to `remote` on the pod.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Transport`] when every attempt failed.
    pub fn upload_file(
        &self,
        conn: &ConnectionDescriptor,
        local: &Utf8Path,
        remote: &str,
    ) -> Result<(), RemoteError> {
        let mut args = self.scp_options(conn.port);
        args.push(OsString::from(local.as_str()));
        args.push(OsString::from(self.remote_spec(conn, remote)));
        self.transfer(conn, "upload_file", &args)
    }

    /// Copies `remote` from the pod into the local directory `local`,
    /// creating the directory first.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::LocalPath`] when the directory cannot be
    /// created, or [`RemoteError::Transport`] when every attempt failed.
    pub fn download_files(
        &self,
        conn: &ConnectionDescriptor,
        remote: &str,
        local: &Utf8Path,
        recursive: bool,
    ) -> Result<(), RemoteError> {
        Dir::create_ambient_dir_all(local, ambient_authority()).map_err(|err| {
            RemoteError::LocalPath {
                path: local.to_path_buf(),
                message: err.to_string(),
            }
        })?;

        let mut args = self.scp_options(conn.port);
        if recursive {
            args.push(OsString::from("-r"));
        }
        args.push(OsString::from(self.remote_spec(conn, remote)));
        args.push(OsString::from(local.as_str()));
        self.transfer(conn, "download_files", &args)
    }

    /// Returns whether `path` is a regular file on the pod. Not retried.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Transport`] when the probe could not run.
    pub fn file_exists(&self, conn: &ConnectionDescriptor, path: &str) -> Result<bool, RemoteError> {
        let probe = ShellCommand::new("test")
            .flag("-f")
            .arg(path)
            .and_then(ShellCommand::raw("echo YES"))
            .or_else(ShellCommand::raw("echo NO"));
        let output = self.probe(conn, &probe, "file_exists")?;
        Ok(output.stdout.trim() == "YES")
    }

    /// Returns whether a process matching `pattern` runs on the pod. Not
    /// retried.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Transport`] when the probe could not run.
    pub fn process_running(
        &self,
        conn: &ConnectionDescriptor,
        pattern: &str,
    ) -> Result<bool, RemoteError> {
        let probe = ShellCommand::new("pgrep").flag("-f").arg(pattern);
        let output = self.probe(conn, &probe, "process_running")?;
        Ok(!output.stdout.trim().is_empty())
    }

    /// Follows `path` on the pod until the remote side closes or the operator
    /// interrupts. Not retried.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Transport`] when `ssh` cannot be started or
    /// cannot reach the pod.
    pub fn tail_log(&self, conn: &ConnectionDescriptor, path: &str) -> Result<(), RemoteError> {
        let command = ShellCommand::new("tail").flag("-f").arg(path);
        let args = self.ssh_args(conn, &[], Some(command.as_str()));
        self.log_invocation(&self.config.ssh_bin, &args);
        let code = self
            .runner
            .run_attached(&self.config.ssh_bin, &args, None)
            .map_err(|err| self.transport(conn, "tail_log", &err.to_string()))?;
        if code == Some(SSH_TRANSPORT_EXIT) {
            return Err(self.transport(
                conn,
                "tail_log",
                &format!("ssh exited with status {SSH_TRANSPORT_EXIT}"),
            ));
        }
        debug!(instance_id = %conn.instance_id, exit_code = ?code, "log tail ended");
        Ok(())
    }

    /// Opens an interactive session on the pod and returns the session's
    /// exit code.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Transport`] when `ssh` cannot be started.
    pub fn open_shell(&self, conn: &ConnectionDescriptor) -> Result<Option<i32>, RemoteError> {
        let args = self.ssh_args(conn, &[], None);
        self.log_invocation(&self.config.ssh_bin, &args);
        self.runner
            .run_attached(&self.config.ssh_bin, &args, None)
            .map_err(|err| self.transport(conn, "open_shell", &err.to_string()))
    }

    /// Starts a detached port-forwarding session for `ports` and returns the
    /// local process id.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::Transport`] when `ssh` cannot be started.
    pub fn open_tunnel(&self, conn: &ConnectionDescriptor, ports: &[u16]) -> Result<u32, RemoteError> {
        let mut forwards = vec![OsString::from("-N")];
        for port in ports {
            forwards.push(OsString::from("-L"));
            forwards.push(OsString::from(format!("{port}:127.0.0.1:{port}")));
        }
        let args = self.ssh_args(conn, &forwards, None);
        self.log_invocation(&self.config.ssh_bin, &args);
        let pid = self
            .runner
            .spawn_detached(&self.config.ssh_bin, &args)
            .map_err(|err| self.transport(conn, "open_tunnel", &err.to_string()))?;
        info!(instance_id = %conn.instance_id, pid, ?ports, "tunnel started");
        Ok(pid)
    }

    fn ssh_attempt(
        &self,
        conn: &ConnectionDescriptor,
        args: &[OsString],
        capture: bool,
        timeout: Option<Duration>,
    ) -> Result<RemoteCommandOutput, RemoteError> {
        let output = if capture {
            let captured = self
                .runner
                .run(&self.config.ssh_bin, args, timeout)
                .map_err(|err| self.transport(conn, "run_command", &err.to_string()))?;
            RemoteCommandOutput {
                exit_code: captured.code,
                stdout: captured.stdout,
                stderr: captured.stderr,
            }
        } else {
            let exit_code = self
                .runner
                .run_attached(&self.config.ssh_bin, args, timeout)
                .map_err(|err| self.transport(conn, "run_command", &err.to_string()))?;
            RemoteCommandOutput {
                exit_code,
                stdout: String::new(),
                stderr: String::new(),
            }
        };

        if output.exit_code == Some(SSH_TRANSPORT_EXIT) {
            let detail = output.stderr.trim();
            let message = if detail.is_empty() {
                format!("ssh exited with status {SSH_TRANSPORT_EXIT}")
            } else {
                format!("ssh exited with status {SSH_TRANSPORT_EXIT}: {detail}")
            };
            return Err(self.transport(conn, "run_command", &message));
        }
        Ok(output)
    }

    fn probe(
        &self,
        conn: &ConnectionDescriptor,
        command: &ShellCommand,
        operation: &str,
    ) -> Result<CommandOutput, RemoteError> {
        let args = self.ssh_args(conn, &[], Some(command.as_str()));
        self.log_invocation(&self.config.ssh_bin, &args);
        let output = self
            .runner
            .run(&self.config.ssh_bin, &args, Some(PROBE_TIMEOUT))
            .map_err(|err| self.transport(conn, operation, &err.to_string()))?;
        if output.code == Some(SSH_TRANSPORT_EXIT) {
            return Err(self.transport(conn, operation, output.stderr.trim()));
        }
        Ok(output)
    }

    fn transfer(
        &self,
        conn: &ConnectionDescriptor,
        operation: &str,
        args: &[OsString],
    ) -> Result<(), RemoteError> {
        self.log_invocation(&self.config.scp_bin, args);
        retry(&RetryPolicy::TRANSFER, &self.sleeper, operation, || {
            let output = self
                .runner
                .run(&self.config.scp_bin, args, None)
                .map_err(|err| self.transport(conn, operation, &err.to_string()))?;
            if output.is_success() {
                return Ok(());
            }
            let status = output
                .code
                .map_or_else(|| String::from("unknown"), |code| code.to_string());
            Err(self.transport(
                conn,
                operation,
                &format!("scp exited with status {status}: {}", output.stderr.trim()),
            ))
        })
    }

    fn ssh_args(
        &self,
        conn: &ConnectionDescriptor,
        extra: &[OsString],
        command: Option<&str>,
    ) -> Vec<OsString> {
        let mut args = vec![OsString::from("-p"), OsString::from(conn.port.to_string())];
        args.extend(self.common_options());
        args.extend_from_slice(extra);
        args.push(OsString::from(self.destination(conn)));
        if let Some(line) = command {
            args.push(OsString::from(line));
        }
        args
    }

    fn scp_options(&self, port: u16) -> Vec<OsString> {
        let mut args = vec![OsString::from("-P"), OsString::from(port.to_string())];
        args.extend(self.common_options());
        args
    }

    fn common_options(&self) -> Vec<OsString> {
        let mut args = vec![
            OsString::from("-i"),
            OsString::from(expand_tilde(&self.config.identity_file)),
        ];

        if !self.config.allow_prompts {
            args.push(OsString::from("-o"));
            args.push(OsString::from("BatchMode=yes"));
        }

        if !self.config.strict_host_key_checking {
            args.push(OsString::from("-o"));
            args.push(OsString::from("StrictHostKeyChecking=no"));
        }

        if !self.config.known_hosts_file.trim().is_empty() {
            args.push(OsString::from("-o"));
            args.push(OsString::from(format!(
                "UserKnownHostsFile={}",
                self.config.known_hosts_file
            )));
        }

        args
    }

    /// Renders the `ssh` command an operator can paste to log in to the pod
    /// as the configured user.
    #[must_use]
    pub fn login_hint(&self, conn: &ConnectionDescriptor) -> String {
        format!("ssh -p {} {}", conn.port, self.destination(conn))
    }

    fn destination(&self, conn: &ConnectionDescriptor) -> String {
        format!("{}@{}", self.config.user, conn.address)
    }

    fn remote_spec(&self, conn: &ConnectionDescriptor, path: &str) -> String {
        format!("{}:{path}", self.destination(conn))
    }

    fn log_invocation(&self, program: &str, args: &[OsString]) {
        debug!(
            command = %describe_invocation(program, args, &self.secrets),
            "running remote invocation"
        );
    }

    fn transport(&self, conn: &ConnectionDescriptor, operation: &str, message: &str) -> RemoteError {
        RemoteError::Transport {
            operation: operation.to_owned(),
            instance_id: conn.instance_id.clone(),
            message: mask_secrets(message, &self.secrets),
        }
    }

    fn execution_error(
        &self,
        conn: &ConnectionDescriptor,
        command: &ShellCommand,
        output: &RemoteCommandOutput,
    ) -> RemoteError {
        RemoteError::RemoteExecution {
            instance_id: conn.instance_id.clone(),
            command: mask_secrets(command.as_str(), &self.secrets),
            exit_code: output.exit_code,
            stderr: mask_secrets(output.stderr.trim(), &self.secrets),
        }
    }
}

#[cfg(test)]
mod tests;
