//! Test support utilities shared across unit and integration tests.
//!
//! The doubles here replace the provider, the process runner, the retry
//! sleeper and the operator console with scripted, inspectable versions.

use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::env;
use std::ffi::OsString;
use std::rc::Rc;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{Mutex as AsyncMutex, MutexGuard};

use crate::backend::{
    Backend, BackendFuture, CONTROL_PORT, ConnectionDescriptor, DesiredStatus, InstanceRecord,
    InstanceRequest, MachineInfo, PortMapping, RuntimeInfo,
};
use crate::console::Console;
use crate::remote::{CommandOutput, CommandRunner, RunnerError, SshConfig};
use crate::retry::Sleeper;

/// Process id reported for scripted detached spawns.
pub const SCRIPTED_PID: u32 = 4242;

/// Sleeper that records requested delays instead of sleeping.
#[derive(Clone, Debug, Default)]
pub struct RecordingSleeper {
    delays: Rc<RefCell<Vec<Duration>>>,
}

impl RecordingSleeper {
    /// Creates a sleeper with no recorded delays.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the delays requested so far.
    #[must_use]
    pub fn recorded(&self) -> Vec<Duration> {
        self.delays.borrow().clone()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) {
        self.delays.borrow_mut().push(duration);
    }
}

/// How a scripted command was invoked.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum InvocationMode {
    /// Output captured.
    Captured,
    /// Attached to the terminal.
    Attached,
    /// Detached in the background.
    Detached,
}

/// Records a single invocation made through [`ScriptedRunner`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct CommandInvocation {
    /// Program name as passed to the runner.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<OsString>,
    /// How the program was run.
    pub mode: InvocationMode,
    /// Time limit passed by the caller.
    pub timeout: Option<Duration>,
}

impl CommandInvocation {
    /// Returns a shell-like command string for assertions.
    #[must_use]
    pub fn command_string(&self) -> String {
        let mut parts = Vec::with_capacity(self.args.len() + 1);
        parts.push(self.program.clone());
        parts.extend(
            self.args
                .iter()
                .map(|arg| arg.to_string_lossy().into_owned()),
        );
        parts.join(" ")
    }

    /// Returns the final argument, which is the remote command for `ssh`
    /// invocations.
    #[must_use]
    pub fn last_arg(&self) -> String {
        self.args
            .last()
            .map(|arg| arg.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Scripted command runner that returns pre-seeded outcomes in FIFO order.
///
/// Used to drive deterministic command outcomes without spawning processes.
#[derive(Clone, Debug, Default)]
pub struct ScriptedRunner {
    responses: Rc<RefCell<VecDeque<Result<CommandOutput, RunnerError>>>>,
    invocations: Rc<RefCell<Vec<CommandInvocation>>>,
}

impl ScriptedRunner {
    /// Creates a new runner with no queued responses.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all invocations recorded so far.
    #[must_use]
    pub fn invocations(&self) -> Vec<CommandInvocation> {
        self.invocations.borrow().clone()
    }

    /// Pushes a successful exit status.
    pub fn push_success(&self) {
        self.push_output(Some(0), "", "");
    }

    /// Pushes a specific exit code.
    pub fn push_exit_code(&self, code: i32) {
        self.push_output(Some(code), "", "simulated failure");
    }

    /// Pushes an explicit command output response.
    pub fn push_output(
        &self,
        code: Option<i32>,
        stdout: impl Into<String>,
        stderr: impl Into<String>,
    ) {
        self.responses.borrow_mut().push_back(Ok(CommandOutput {
            code,
            stdout: stdout.into(),
            stderr: stderr.into(),
        }));
    }

    /// Pushes a runner failure such as a spawn error or timeout.
    pub fn push_runner_error(&self, error: RunnerError) {
        self.responses.borrow_mut().push_back(Err(error));
    }

    fn next(
        &self,
        program: &str,
        args: &[OsString],
        mode: InvocationMode,
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, RunnerError> {
        self.invocations.borrow_mut().push(CommandInvocation {
            program: program.to_owned(),
            args: args.to_vec(),
            mode,
            timeout,
        });
        self.responses
            .borrow_mut()
            .pop_front()
            .unwrap_or_else(|| {
                Err(RunnerError::Spawn {
                    program: program.to_owned(),
                    message: String::from("no scripted response available"),
                })
            })
    }
}

impl CommandRunner for ScriptedRunner {
    fn run(
        &self,
        program: &str,
        args: &[OsString],
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, RunnerError> {
        self.next(program, args, InvocationMode::Captured, timeout)
    }

    fn run_attached(
        &self,
        program: &str,
        args: &[OsString],
        timeout: Option<Duration>,
    ) -> Result<Option<i32>, RunnerError> {
        self.next(program, args, InvocationMode::Attached, timeout)
            .map(|output| output.code)
    }

    fn spawn_detached(&self, program: &str, args: &[OsString]) -> Result<u32, RunnerError> {
        self.next(program, args, InvocationMode::Detached, None)
            .map(|_| SCRIPTED_PID)
    }
}

/// Console that answers prompts from a script and records everything shown.
#[derive(Clone, Debug, Default)]
pub struct ScriptedConsole {
    answers: Rc<RefCell<VecDeque<String>>>,
    transcript: Rc<RefCell<Vec<String>>>,
}

impl ScriptedConsole {
    /// Creates a console that answers prompts with `answers` in order, then
    /// reports end of input.
    #[must_use]
    pub fn new<I, A>(answers: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<String>,
    {
        Self {
            answers: Rc::new(RefCell::new(answers.into_iter().map(Into::into).collect())),
            transcript: Rc::default(),
        }
    }

    /// Returns every line shown and prompt asked, in order. Prompts are
    /// prefixed with `? `.
    #[must_use]
    pub fn transcript(&self) -> Vec<String> {
        self.transcript.borrow().clone()
    }

    /// Returns `true` when any transcript line contains `needle`.
    #[must_use]
    pub fn mentions(&self, needle: &str) -> bool {
        self.transcript
            .borrow()
            .iter()
            .any(|line| line.contains(needle))
    }

    /// Returns the number of prompts asked.
    #[must_use]
    pub fn prompts_asked(&self) -> usize {
        self.transcript
            .borrow()
            .iter()
            .filter(|line| line.starts_with("? "))
            .count()
    }
}

impl Console for ScriptedConsole {
    fn show(&self, line: &str) {
        self.transcript.borrow_mut().push(line.to_owned());
    }

    fn ask(&self, prompt: &str) -> Option<String> {
        self.transcript.borrow_mut().push(format!("? {prompt}"));
        self.answers.borrow_mut().pop_front()
    }
}

/// Failure returned by [`ScriptedBackend`].
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("scripted provider failure: {0}")]
pub struct ScriptedBackendError(pub String);

#[derive(Debug, Default)]
struct BackendState {
    instances: Vec<InstanceRecord>,
    fail_list: bool,
    create_results: VecDeque<Result<InstanceRecord, ScriptedBackendError>>,
    status_results: VecDeque<Result<InstanceRecord, ScriptedBackendError>>,
    last_status: Option<InstanceRecord>,
    create_requests: Vec<InstanceRequest>,
    get_calls: u32,
    terminated: Vec<String>,
}

/// Provider double with scripted create and status results.
///
/// Status results are returned in order; once exhausted, the last
/// successful snapshot repeats.
#[derive(Clone, Debug, Default)]
pub struct ScriptedBackend {
    state: Arc<Mutex<BackendState>>,
}

impl ScriptedBackend {
    /// Creates a backend with no pods.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<T>(&self, action: impl FnOnce(&mut BackendState) -> T) -> T {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        action(&mut state)
    }

    /// Sets the pods returned by `list_instances`.
    #[must_use]
    pub fn with_instances(self, instances: Vec<InstanceRecord>) -> Self {
        self.with_state(|state| state.instances = instances);
        self
    }

    /// Makes `list_instances` fail.
    pub fn fail_list(&self) {
        self.with_state(|state| state.fail_list = true);
    }

    /// Queues a successful create returning `record`.
    pub fn push_create(&self, record: InstanceRecord) {
        self.with_state(|state| state.create_results.push_back(Ok(record)));
    }

    /// Queues a failed create.
    pub fn push_create_failure(&self, message: &str) {
        self.with_state(|state| {
            state
                .create_results
                .push_back(Err(ScriptedBackendError(message.to_owned())));
        });
    }

    /// Queues a status snapshot for `get_instance`.
    pub fn push_status(&self, record: InstanceRecord) {
        self.with_state(|state| state.status_results.push_back(Ok(record)));
    }

    /// Queues a failed status check.
    pub fn push_status_failure(&self, message: &str) {
        self.with_state(|state| {
            state
                .status_results
                .push_back(Err(ScriptedBackendError(message.to_owned())));
        });
    }

    /// Returns every create request received.
    #[must_use]
    pub fn create_requests(&self) -> Vec<InstanceRequest> {
        self.with_state(|state| state.create_requests.clone())
    }

    /// Returns the number of status checks made.
    #[must_use]
    pub fn get_calls(&self) -> u32 {
        self.with_state(|state| state.get_calls)
    }

    /// Returns the ids passed to `terminate_instance`.
    #[must_use]
    pub fn terminated(&self) -> Vec<String> {
        self.with_state(|state| state.terminated.clone())
    }
}

impl Backend for ScriptedBackend {
    type Error = ScriptedBackendError;

    fn list_instances(&self) -> BackendFuture<'_, Vec<InstanceRecord>, Self::Error> {
        Box::pin(async move {
            self.with_state(|state| {
                if state.fail_list {
                    return Err(ScriptedBackendError(String::from("list failed")));
                }
                Ok(state.instances.clone())
            })
        })
    }

    fn get_instance<'a>(&'a self, id: &'a str) -> BackendFuture<'a, InstanceRecord, Self::Error> {
        Box::pin(async move {
            self.with_state(|state| {
                state.get_calls += 1;
                match state.status_results.pop_front() {
                    Some(Ok(record)) => {
                        state.last_status = Some(record.clone());
                        Ok(record)
                    }
                    Some(Err(err)) => Err(err),
                    None => state
                        .last_status
                        .clone()
                        .ok_or_else(|| ScriptedBackendError(format!("pod {id} not found"))),
                }
            })
        })
    }

    fn create_instance<'a>(
        &'a self,
        request: &'a InstanceRequest,
    ) -> BackendFuture<'a, InstanceRecord, Self::Error> {
        Box::pin(async move {
            self.with_state(|state| {
                state.create_requests.push(request.clone());
                state.create_results.pop_front().unwrap_or_else(|| {
                    Err(ScriptedBackendError(String::from(
                        "no scripted create result",
                    )))
                })
            })
        })
    }

    fn terminate_instance<'a>(&'a self, id: &'a str) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move {
            self.with_state(|state| {
                state.terminated.push(id.to_owned());
                state.instances.retain(|record| record.id != id);
            });
            Ok(())
        })
    }
}

/// Builds a running pod with a public control-port mapping.
#[must_use]
pub fn running_record(id: &str, name: &str) -> InstanceRecord {
    InstanceRecord {
        id: id.to_owned(),
        name: name.to_owned(),
        desired_status: DesiredStatus::Running,
        machine: MachineInfo {
            gpu_name: String::from("RTX A6000"),
            host_id: Some(format!("{id}-host")),
        },
        runtime: Some(RuntimeInfo {
            ports: vec![PortMapping {
                private_port: CONTROL_PORT,
                public_port: 22022,
                ip: Some(String::from("203.0.113.10")),
                is_public: true,
            }],
        }),
        cost_per_hour: 0.79,
    }
}

/// Builds a running pod whose runtime has not published ports yet.
#[must_use]
pub fn unreachable_record(id: &str, name: &str) -> InstanceRecord {
    InstanceRecord {
        runtime: None,
        ..running_record(id, name)
    }
}

/// Builds a pod that has been accepted but is not running yet.
#[must_use]
pub fn pending_record(id: &str, name: &str) -> InstanceRecord {
    InstanceRecord {
        desired_status: DesiredStatus::Pending,
        runtime: None,
        ..running_record(id, name)
    }
}

/// Builds the descriptor [`running_record`] resolves to.
#[must_use]
pub fn descriptor(id: &str) -> ConnectionDescriptor {
    ConnectionDescriptor {
        instance_id: id.to_owned(),
        name: format!("{id}-name"),
        address: String::from("203.0.113.10"),
        port: 22022,
        gpu: String::from("RTX A6000"),
        cost_per_hour: 0.79,
    }
}

/// Returns an SSH configuration with explicit, environment-independent
/// values.
#[must_use]
pub fn ssh_config() -> SshConfig {
    SshConfig {
        ssh_bin: String::from("ssh"),
        scp_bin: String::from("scp"),
        user: String::from("root"),
        identity_file: String::from("/keys/pod_ed25519"),
        allow_prompts: false,
        strict_host_key_checking: false,
        known_hosts_file: String::from("/dev/null"),
    }
}

/// Global mutex used to serialise environment mutation in tests.
pub static ENV_LOCK: AsyncMutex<()> = AsyncMutex::const_new(());

/// Guard that holds the env mutex and restores variables on drop.
pub struct EnvGuard {
    previous: Vec<(String, Option<OsString>)>,
    _guard: MutexGuard<'static, ()>,
}

impl EnvGuard {
    /// Sets and removes environment variables while holding a global mutex.
    /// A `None` value removes the variable for the guard's lifetime.
    pub async fn set_vars(pairs: &[(&str, Option<&str>)]) -> Self {
        debug_assert!(
            {
                let mut seen = BTreeSet::new();
                pairs.iter().all(|(key, _)| seen.insert(*key))
            },
            "duplicate environment variable keys passed to EnvGuard::set_vars"
        );

        let guard = ENV_LOCK.lock().await;
        let mut previous = Vec::with_capacity(pairs.len());
        for (key, value) in pairs {
            let old = env::var_os(key);
            // SAFETY: Environment mutation is serialised by `ENV_LOCK`, preventing races.
            unsafe {
                match value {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
            previous.push(((*key).to_owned(), old));
        }

        Self {
            previous,
            _guard: guard,
        }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, old) in &self.previous {
            // SAFETY: Environment mutation is serialised by holding `_guard`.
            unsafe {
                match old {
                    Some(val) => env::set_var(key, val),
                    None => env::remove_var(key),
                }
            }
        }
    }
}
