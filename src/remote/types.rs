//! Process execution seam used for every `ssh` and `scp` invocation.

use std::ffi::OsString;
use std::io::Read;
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use thiserror::Error;

const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Result of running an external command.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

/// Output from a remote command executed over SSH.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RemoteCommandOutput {
    /// Exit code reported by the remote command; `None` when the session was
    /// terminated by a signal.
    pub exit_code: Option<i32>,
    /// Captured standard output (empty when streamed to the terminal).
    pub stdout: String,
    /// Captured standard error (empty when streamed to the terminal).
    pub stderr: String,
}

/// Failures raised by a [`CommandRunner`] before a process produced a result.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RunnerError {
    /// Raised when the program cannot be started.
    #[error("failed to spawn {program}: {message}")]
    Spawn {
        /// Program that failed to start.
        program: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when the process outlived its time limit and was killed.
    #[error("{program} did not finish within {timeout:?}")]
    TimedOut {
        /// Program that was killed.
        program: String,
        /// Limit that was exceeded.
        timeout: Duration,
    },
    /// Raised when waiting on the child process fails.
    #[error("failed to wait for {program}: {message}")]
    Wait {
        /// Program being waited on.
        program: String,
        /// Operating system error string.
        message: String,
    },
}

/// Abstraction over process execution so tests can script outcomes.
pub trait CommandRunner {
    /// Runs `program` with stdout and stderr captured.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError`] when the process cannot be spawned, waited on,
    /// or exceeds `timeout`.
    fn run(
        &self,
        program: &str,
        args: &[OsString],
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, RunnerError>;

    /// Runs `program` attached to the operator's terminal and returns its exit
    /// code.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError`] when the process cannot be spawned, waited on,
    /// or exceeds `timeout`.
    fn run_attached(
        &self,
        program: &str,
        args: &[OsString],
        timeout: Option<Duration>,
    ) -> Result<Option<i32>, RunnerError>;

    /// Starts `program` detached from the terminal and returns its process id.
    ///
    /// # Errors
    ///
    /// Returns [`RunnerError::Spawn`] when the process cannot be started.
    fn spawn_detached(&self, program: &str, args: &[OsString]) -> Result<u32, RunnerError>;
}

/// Real command runner that shells out to the host operating system.
#[derive(Clone, Copy, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run(
        &self,
        program: &str,
        args: &[OsString],
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, RunnerError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| spawn_error(program, &err))?;

        let stdout = drain(child.stdout.take());
        let stderr = drain(child.stderr.take());
        let status = wait_with_limit(&mut child, program, timeout)?;

        Ok(CommandOutput {
            code: status.code(),
            stdout: collect(stdout),
            stderr: collect(stderr),
        })
    }

    fn run_attached(
        &self,
        program: &str,
        args: &[OsString],
        timeout: Option<Duration>,
    ) -> Result<Option<i32>, RunnerError> {
        let mut child = Command::new(program)
            .args(args)
            .spawn()
            .map_err(|err| spawn_error(program, &err))?;
        let status = wait_with_limit(&mut child, program, timeout)?;
        Ok(status.code())
    }

    fn spawn_detached(&self, program: &str, args: &[OsString]) -> Result<u32, RunnerError> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|err| spawn_error(program, &err))?;
        let pid = child.id();
        // Reap the child if it exits while we are still running.
        thread::spawn(move || child.wait());
        Ok(pid)
    }
}

fn spawn_error(program: &str, err: &std::io::Error) -> RunnerError {
    RunnerError::Spawn {
        program: program.to_owned(),
        message: err.to_string(),
    }
}

fn drain<T>(pipe: Option<T>) -> Option<JoinHandle<String>>
where
    T: Read + Send + 'static,
{
    pipe.map(|mut reader| {
        thread::spawn(move || {
            let mut buffer = Vec::new();
            reader.read_to_end(&mut buffer).ok();
            String::from_utf8_lossy(&buffer).into_owned()
        })
    })
}

fn collect(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|reader| reader.join().ok())
        .unwrap_or_default()
}

fn wait_with_limit(
    child: &mut Child,
    program: &str,
    timeout: Option<Duration>,
) -> Result<ExitStatus, RunnerError> {
    let wait_error = |err: std::io::Error| RunnerError::Wait {
        program: program.to_owned(),
        message: err.to_string(),
    };

    let Some(limit) = timeout else {
        return child.wait().map_err(wait_error);
    };

    let deadline = Instant::now() + limit;
    loop {
        if let Some(status) = child.try_wait().map_err(wait_error)? {
            return Ok(status);
        }
        if Instant::now() >= deadline {
            child.kill().ok();
            child.wait().ok();
            return Err(RunnerError::TimedOut {
                program: program.to_owned(),
                timeout: limit,
            });
        }
        thread::sleep(WAIT_POLL_INTERVAL);
    }
}
