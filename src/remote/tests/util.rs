//! Redaction and path helpers.

use std::ffi::OsString;

use rstest::rstest;

use super::{TestClient, harness};
use crate::remote::{
    IDENTITY_PLACEHOLDER, RemoteError, ShellCommand, describe_invocation, expand_tilde,
    mask_secrets,
};
use crate::test_support::{RecordingSleeper, ScriptedRunner, descriptor};

#[rstest]
fn describe_invocation_hides_identity_and_secrets() {
    let args = [
        OsString::from("-i"),
        OsString::from("/home/me/.ssh/key"),
        OsString::from("root@host"),
        OsString::from("HF_TOKEN=hf_secret"),
    ];

    let rendered = describe_invocation("ssh", &args, &[String::from("hf_secret")]);

    assert_eq!(
        rendered,
        format!("ssh -i {IDENTITY_PLACEHOLDER} root@host HF_TOKEN=***")
    );
}

#[rstest]
fn mask_secrets_ignores_empty_values() {
    assert_eq!(mask_secrets("value", &[String::new()]), "value");
}

#[rstest]
fn expand_tilde_leaves_other_paths() {
    assert_eq!(expand_tilde("relative/key"), "relative/key");
    assert_eq!(expand_tilde("~user/key"), "~user/key");
}

#[rstest]
fn errors_mask_registered_secrets(harness: (TestClient, ScriptedRunner, RecordingSleeper)) {
    let (base, runner, _) = harness;
    let client = base.with_secret("hf_secret");
    runner.push_output(Some(3), "", "bad token hf_secret");

    let err = client
        .run_command(
            &descriptor("pod-1"),
            &ShellCommand::new("login").arg("hf_secret"),
            false,
            None,
        )
        .expect_err("non-zero exit");

    let rendered = err.to_string();
    assert!(!rendered.contains("hf_secret"), "{rendered}");
    assert!(matches!(err, RemoteError::RemoteExecution { .. }));
}

#[rstest]
#[case("user")]
#[case("identity_file")]
fn blank_config_fields_are_rejected(#[case] field: &str) {
    let mut config = crate::test_support::ssh_config();
    match field {
        "user" => config.user = String::from("  "),
        _ => config.identity_file = String::new(),
    }

    let err = config.validate().expect_err("blank field should fail");

    assert_eq!(
        err,
        RemoteError::InvalidConfig {
            field: field.to_owned(),
            env_var: format!("PODPILOT_SSH_{}", field.to_uppercase()),
        }
    );
}
