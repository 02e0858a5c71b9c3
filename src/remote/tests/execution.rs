//! Command execution, retries and probes.

use std::ffi::OsString;
use std::time::Duration;

use rstest::rstest;

use super::{TestClient, harness};
use crate::remote::{
    BACKGROUND_SUBMIT_TIMEOUT, RemoteClient, RemoteError, RunnerError, ShellCommand, SshConfig,
};
use crate::test_support::{
    InvocationMode, RecordingSleeper, SCRIPTED_PID, ScriptedRunner, descriptor, ssh_config,
};

fn strings(args: &[OsString]) -> Vec<String> {
    args.iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect()
}

#[rstest]
fn builds_ssh_invocation_from_config_and_descriptor(
    harness: (TestClient, ScriptedRunner, RecordingSleeper),
) {
    let (client, runner, _) = harness;
    runner.push_output(Some(0), "hello\n", "");

    let output = client
        .run_command(&descriptor("pod-1"), &ShellCommand::raw("echo hello"), true, None)
        .expect("command should succeed");

    assert_eq!(output.stdout, "hello\n");
    let calls = runner.invocations();
    let call = calls.first().expect("one invocation");
    assert_eq!(call.program, "ssh");
    assert_eq!(call.mode, InvocationMode::Captured);
    assert_eq!(
        strings(&call.args),
        [
            "-p",
            "22022",
            "-i",
            "/keys/pod_ed25519",
            "-o",
            "BatchMode=yes",
            "-o",
            "StrictHostKeyChecking=no",
            "-o",
            "UserKnownHostsFile=/dev/null",
            "root@203.0.113.10",
            "echo hello",
        ]
    );
}

#[rstest]
fn retries_transport_failures_with_command_budget(
    harness: (TestClient, ScriptedRunner, RecordingSleeper),
) {
    let (client, runner, sleeper) = harness;
    runner.push_output(Some(255), "", "Connection refused");
    runner.push_runner_error(RunnerError::Spawn {
        program: String::from("ssh"),
        message: String::from("resource busy"),
    });
    runner.push_output(Some(0), "ok", "");

    let output = client
        .run_command(&descriptor("pod-1"), &ShellCommand::raw("true"), true, None)
        .expect("third attempt should succeed");

    assert_eq!(output.stdout, "ok");
    assert_eq!(runner.invocations().len(), 3);
    assert_eq!(
        sleeper.recorded(),
        [Duration::from_secs(2), Duration::from_secs(3)]
    );
}

#[rstest]
fn exhausted_transport_retries_surface_transport_error(
    harness: (TestClient, ScriptedRunner, RecordingSleeper),
) {
    let (client, runner, _) = harness;
    for _ in 0..3 {
        runner.push_output(Some(255), "", "Connection timed out");
    }

    let err = client
        .run_command(&descriptor("pod-9"), &ShellCommand::raw("true"), true, None)
        .expect_err("all attempts fail");

    let RemoteError::Transport {
        operation,
        instance_id,
        message,
    } = err
    else {
        panic!("expected transport error, got {err:?}");
    };
    assert_eq!(operation, "run_command");
    assert_eq!(instance_id, "pod-9");
    assert!(message.contains("Connection timed out"), "{message}");
}

#[rstest]
fn captured_non_zero_exit_is_returned_without_retry(
    harness: (TestClient, ScriptedRunner, RecordingSleeper),
) {
    let (client, runner, sleeper) = harness;
    runner.push_output(Some(1), "", "no such file");

    let output = client
        .run_command(&descriptor("pod-1"), &ShellCommand::raw("false"), true, None)
        .expect("remote exit codes are data when captured");

    assert_eq!(output.exit_code, Some(1));
    assert_eq!(runner.invocations().len(), 1);
    assert!(sleeper.recorded().is_empty());
}

#[rstest]
fn attached_non_zero_exit_is_remote_execution_error(
    harness: (TestClient, ScriptedRunner, RecordingSleeper),
) {
    let (client, runner, _) = harness;
    runner.push_exit_code(2);

    let err = client
        .run_command(&descriptor("pod-1"), &ShellCommand::raw("exit 2"), false, None)
        .expect_err("non-zero exit should fail");

    assert!(
        matches!(
            err,
            RemoteError::RemoteExecution {
                exit_code: Some(2),
                ..
            }
        ),
        "unexpected error: {err:?}"
    );
    let calls = runner.invocations();
    assert_eq!(
        calls.first().map(|call| call.mode),
        Some(InvocationMode::Attached)
    );
}

#[rstest]
fn background_commands_are_wrapped_and_detached(
    harness: (TestClient, ScriptedRunner, RecordingSleeper),
) {
    let (client, runner, _) = harness;
    runner.push_success();

    client
        .run_background(&descriptor("pod-1"), &ShellCommand::raw("python serve.py"))
        .expect("submission should succeed");

    let calls = runner.invocations();
    let call = calls.first().expect("one invocation");
    assert_eq!(
        call.last_arg(),
        "nohup sh -c 'python serve.py' < /dev/null > /dev/null 2>&1 &"
    );
    assert_eq!(call.timeout, Some(BACKGROUND_SUBMIT_TIMEOUT));
}

#[rstest]
fn background_submission_failure_is_reported(
    harness: (TestClient, ScriptedRunner, RecordingSleeper),
) {
    let (client, runner, _) = harness;
    runner.push_exit_code(127);

    let err = client
        .run_background(&descriptor("pod-1"), &ShellCommand::raw("missing"))
        .expect_err("submission should fail");

    assert!(matches!(err, RemoteError::RemoteExecution { .. }), "{err:?}");
}

#[rstest]
fn timed_out_background_submission_is_not_repeated(
    harness: (TestClient, ScriptedRunner, RecordingSleeper),
) {
    let (client, runner, sleeper) = harness;
    runner.push_runner_error(RunnerError::TimedOut {
        program: String::from("ssh"),
        timeout: BACKGROUND_SUBMIT_TIMEOUT,
    });
    runner.push_success();

    let err = client
        .run_background(&descriptor("pod-1"), &ShellCommand::raw("bash start.sh"))
        .expect_err("timed-out submission should fail");

    assert!(matches!(err, RemoteError::Transport { .. }), "{err:?}");
    assert_eq!(runner.invocations().len(), 1);
    assert!(sleeper.recorded().is_empty());
}

#[rstest]
#[case("YES\n", true)]
#[case("NO\n", false)]
fn file_exists_reads_probe_answer(
    harness: (TestClient, ScriptedRunner, RecordingSleeper),
    #[case] stdout: &str,
    #[case] expected: bool,
) {
    let (client, runner, _) = harness;
    runner.push_output(Some(0), stdout, "");

    let exists = client
        .file_exists(&descriptor("pod-1"), "/workspace/start.sh")
        .expect("probe should run");

    assert_eq!(exists, expected);
    let calls = runner.invocations();
    assert_eq!(
        calls.first().map(|call| call.last_arg()),
        Some(String::from(
            "test -f /workspace/start.sh && echo YES || echo NO"
        ))
    );
}

#[rstest]
fn probes_are_not_retried(harness: (TestClient, ScriptedRunner, RecordingSleeper)) {
    let (client, runner, sleeper) = harness;
    runner.push_output(Some(255), "", "Connection reset");

    let err = client
        .process_running(&descriptor("pod-1"), "comfyui main.py")
        .expect_err("transport failure should surface");

    assert!(matches!(err, RemoteError::Transport { .. }), "{err:?}");
    assert_eq!(runner.invocations().len(), 1);
    assert!(sleeper.recorded().is_empty());
}

#[rstest]
#[case("1234\n", true)]
#[case("", false)]
fn process_running_checks_pgrep_output(
    harness: (TestClient, ScriptedRunner, RecordingSleeper),
    #[case] stdout: &str,
    #[case] expected: bool,
) {
    let (client, runner, _) = harness;
    runner.push_output(Some(if expected { 0 } else { 1 }), stdout, "");

    let running = client
        .process_running(&descriptor("pod-1"), "main.py")
        .expect("probe should run");

    assert_eq!(running, expected);
}

#[rstest]
fn tunnel_forwards_each_port_detached(harness: (TestClient, ScriptedRunner, RecordingSleeper)) {
    let (client, runner, _) = harness;
    runner.push_success();

    let pid = client
        .open_tunnel(&descriptor("pod-1"), &[8888, 3000])
        .expect("tunnel should start");

    assert_eq!(pid, SCRIPTED_PID);
    let calls = runner.invocations();
    let call = calls.first().expect("one invocation");
    assert_eq!(call.mode, InvocationMode::Detached);
    let rendered = call.command_string();
    assert!(
        rendered.contains("-N -L 8888:127.0.0.1:8888 -L 3000:127.0.0.1:3000 root@203.0.113.10"),
        "{rendered}"
    );
}

#[rstest]
fn shell_returns_session_exit_code(harness: (TestClient, ScriptedRunner, RecordingSleeper)) {
    let (client, runner, _) = harness;
    runner.push_exit_code(130);

    let code = client
        .open_shell(&descriptor("pod-1"))
        .expect("shell should start");

    assert_eq!(code, Some(130));
    let calls = runner.invocations();
    assert_eq!(
        calls.first().map(|call| call.last_arg()),
        Some(String::from("root@203.0.113.10"))
    );
}

#[rstest]
fn tail_log_reports_unreachable_pod(harness: (TestClient, ScriptedRunner, RecordingSleeper)) {
    let (client, runner, sleeper) = harness;
    runner.push_exit_code(255);

    let err = client
        .tail_log(&descriptor("pod-1"), "/workspace/startup.log")
        .expect_err("connection failure must surface");

    assert!(
        matches!(
            err,
            RemoteError::Transport { ref operation, ref instance_id, .. }
                if operation == "tail_log" && instance_id == "pod-1"
        ),
        "{err:?}"
    );
    assert_eq!(runner.invocations().len(), 1);
    assert!(sleeper.recorded().is_empty());
}

#[rstest]
#[case(Some(0))]
#[case(Some(130))]
#[case(None)]
fn tail_log_ends_cleanly_when_remote_side_closes(
    harness: (TestClient, ScriptedRunner, RecordingSleeper),
    #[case] code: Option<i32>,
) {
    let (client, runner, _) = harness;
    runner.push_output(code, "", "");

    client
        .tail_log(&descriptor("pod-1"), "/workspace/startup.log")
        .expect("tail should end without error");

    let calls = runner.invocations();
    assert_eq!(
        calls.first().map(|call| call.last_arg()),
        Some(String::from("tail -f /workspace/startup.log"))
    );
}

#[rstest]
#[case("root", "ssh -p 22022 root@203.0.113.10")]
#[case("ubuntu", "ssh -p 22022 ubuntu@203.0.113.10")]
fn login_hint_uses_configured_user(#[case] user: &str, #[case] expected: &str) {
    let config = SshConfig {
        user: user.to_owned(),
        ..ssh_config()
    };
    let client = RemoteClient::new(config, ScriptedRunner::new()).expect("config should validate");

    assert_eq!(client.login_hint(&descriptor("pod-1")), expected);
}

#[rstest]
fn prompts_disable_batch_mode_only_when_allowed() {
    let config = SshConfig {
        allow_prompts: true,
        ..ssh_config()
    };
    let runner = ScriptedRunner::new();
    let client = RemoteClient::new(config, runner.clone()).expect("config should validate");
    runner.push_success();

    client
        .run_command(&descriptor("pod-1"), &ShellCommand::raw("true"), true, None)
        .expect("command should succeed");

    let calls = runner.invocations();
    let call = calls.first().expect("one invocation");
    assert!(!strings(&call.args).contains(&String::from("BatchMode=yes")));
}
