//! Configuration loading and validation through the environment layer.

use podpilot::config::DEFAULT_API_URL;
use podpilot::remote::DEFAULT_IDENTITY_FILE;
use podpilot::test_support::EnvGuard;
use podpilot::{ConfigError, HuggingFaceConfig, ProviderConfig, SshConfig, WorkspaceConfig};
use rstest::rstest;

#[tokio::test]
async fn provider_config_reads_runpod_variables() {
    let _guard = EnvGuard::set_vars(&[
        ("RUNPOD_API_KEY", Some("rp_test_key")),
        ("RUNPOD_API_URL", None),
    ])
    .await;

    let config = ProviderConfig::load_without_cli_args().expect("provider config should load");

    assert_eq!(config.api_key, "rp_test_key");
    assert_eq!(config.api_url, DEFAULT_API_URL);
    assert!(config.validate().is_ok());
}

#[tokio::test]
async fn missing_api_key_names_variable_and_file() {
    let _guard = EnvGuard::set_vars(&[("RUNPOD_API_KEY", None)]).await;

    let config = ProviderConfig::load_without_cli_args().expect("provider config should load");
    let err = config.validate().expect_err("key is required");

    let ConfigError::MissingField(ref message) = err else {
        panic!("expected MissingField, got {err:?}");
    };
    assert!(message.contains("RUNPOD_API_KEY"), "{message}");
    assert!(message.contains("podpilot.toml"), "{message}");
    assert!(message.contains("api_key"), "{message}");
}

#[tokio::test]
async fn ssh_config_defaults_and_overrides() {
    let _guard = EnvGuard::set_vars(&[
        ("PODPILOT_SSH_USER", Some("ubuntu")),
        ("PODPILOT_SSH_IDENTITY_FILE", None),
        ("PODPILOT_SSH_ALLOW_PROMPTS", None),
    ])
    .await;

    let config = SshConfig::load_without_cli_args().expect("ssh config should load");

    assert_eq!(config.user, "ubuntu");
    assert_eq!(config.identity_file, DEFAULT_IDENTITY_FILE);
    assert!(!config.allow_prompts);
    assert!(!config.strict_host_key_checking);
}

#[tokio::test]
async fn workspace_config_reads_overrides() {
    let _guard = EnvGuard::set_vars(&[
        ("PODPILOT_OUTPUT_DIR", Some("renders")),
        ("PODPILOT_CATALOG_PATH", None),
    ])
    .await;

    let config = WorkspaceConfig::load_without_cli_args().expect("workspace config should load");

    assert_eq!(config.output_dir, "renders");
    assert_eq!(config.catalog_path, "podpilot.yaml");
    assert!(config.validate().is_ok());
}

#[rstest]
fn blank_workspace_path_is_rejected() {
    let config = WorkspaceConfig {
        catalog_path: String::from("podpilot.yaml"),
        output_dir: String::from("  "),
        env_file: String::from(".env"),
        start_scripts_dir: String::from("docker"),
        setup_scripts_dir: String::from("scripts"),
    };

    let err = config.validate().expect_err("blank output dir");

    assert!(err.to_string().contains("PODPILOT_OUTPUT_DIR"), "{err}");
}

#[rstest]
#[case(Some("  hf_abc  "), Some("hf_abc"))]
#[case(Some("   "), None)]
#[case(None, None)]
fn hugging_face_token_is_trimmed(#[case] raw: Option<&str>, #[case] expected: Option<&str>) {
    let config = HuggingFaceConfig {
        token: raw.map(str::to_owned),
    };

    assert_eq!(config.token(), expected);
}
