//! Behavioural smoke tests for the CLI entrypoint.
//!
//! Every case runs in an empty temporary directory with `HOME` pointed at it
//! so no operator configuration leaks in. None of them reach the network.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use rstest::{fixture, rstest};
use tempfile::TempDir;

#[fixture]
fn workdir() -> TempDir {
    TempDir::new().expect("temp dir")
}

fn podpilot(dir: &TempDir) -> Command {
    let mut cmd = cargo_bin_cmd!("podpilot");
    cmd.current_dir(dir.path())
        .env("HOME", dir.path())
        .env_remove("XDG_CONFIG_HOME")
        .env_remove("PODPILOT_CONFIG_PATH")
        .env_remove("PODPILOT_CATALOG_PATH")
        .env_remove("HF_TOKEN")
        .env("RUST_LOG", "off");
    cmd
}

#[rstest]
fn help_lists_every_verb(workdir: TempDir) {
    podpilot(&workdir)
        .arg("--help")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("deploy")
                .and(predicate::str::contains("terminate"))
                .and(predicate::str::contains("ingest"))
                .and(predicate::str::contains("wallet")),
        );
}

#[rstest]
fn templates_work_without_credentials(workdir: TempDir) {
    podpilot(&workdir)
        .env_remove("RUNPOD_API_KEY")
        .arg("templates")
        .assert()
        .success()
        .stdout(
            predicate::str::contains("ltx2-comfyui-prod")
                .and(predicate::str::contains("ltx2-comfyui-value"))
                .and(predicate::str::contains("hunyuan-comfyui-budget")),
        );
}

#[rstest]
fn templates_read_local_catalogue(workdir: TempDir) {
    std::fs::write(
        workdir.path().join("podpilot.yaml"),
        "templates:\n  gold:\n    name: gold-pod\n    gpu_type_id: NVIDIA H100\n",
    )
    .expect("write catalogue");

    podpilot(&workdir)
        .arg("templates")
        .assert()
        .success()
        .stdout(predicate::str::contains("gold-pod").and(predicate::str::contains("prod").not()));
}

#[rstest]
fn malformed_catalogue_fails(workdir: TempDir) {
    std::fs::write(workdir.path().join("podpilot.yaml"), "templates: [unclosed\n")
        .expect("write catalogue");

    podpilot(&workdir)
        .arg("templates")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("invalid catalogue"));
}

#[rstest]
fn provider_commands_require_api_key(workdir: TempDir) {
    podpilot(&workdir)
        .env_remove("RUNPOD_API_KEY")
        .arg("list")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("RUNPOD_API_KEY"));
}

#[rstest]
fn unknown_template_lists_available_keys(workdir: TempDir) {
    podpilot(&workdir)
        .env("RUNPOD_API_KEY", "test-key")
        .args(["deploy", "gold"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains(
            "unknown template 'gold' (available: prod, value, budget)",
        ));
}

#[rstest]
fn push_checks_local_files_first(workdir: TempDir) {
    podpilot(&workdir)
        .env("RUNPOD_API_KEY", "test-key")
        .args(["push", "missing.json"])
        .assert()
        .code(1)
        .stderr(predicate::str::contains("local file missing.json does not exist"));
}
