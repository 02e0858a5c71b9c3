//! Command line construction.

use rstest::rstest;

use crate::remote::{ShellCommand, quote};

#[rstest]
#[case("plain", "plain")]
#[case("/workspace/ComfyUI/output", "/workspace/ComfyUI/output")]
#[case("two words", "'two words'")]
#[case("$(rm -rf /)", "'$(rm -rf /)'")]
#[case("", "''")]
fn quotes_operands(#[case] input: &str, #[case] expected: &str) {
    assert_eq!(quote(input), expected);
}

#[rstest]
fn composes_operators_around_quoted_operands() {
    let command = ShellCommand::new("mkdir")
        .flag("-p")
        .arg("/workspace/my models")
        .and_then(ShellCommand::new("ls").flag("-A").arg("/workspace"))
        .quiet_errors();

    assert_eq!(
        command.as_str(),
        "mkdir -p '/workspace/my models' && ls -A /workspace 2>/dev/null"
    );
}

#[rstest]
fn redirects_and_backgrounds() {
    let command = ShellCommand::new("run.sh")
        .stdin_from("/dev/null")
        .redirect_all_to("/tmp/log file")
        .background();

    assert_eq!(
        command.to_string(),
        "run.sh < /dev/null > '/tmp/log file' 2>&1 &"
    );
}

#[rstest]
fn pipes_and_falls_back() {
    let command = ShellCommand::new("cat")
        .arg("a")
        .pipe(ShellCommand::new("wc").flag("-l"))
        .or_else(ShellCommand::raw("echo 0"));

    assert_eq!(command.as_str(), "cat a | wc -l || echo 0");
}

#[rstest]
fn sequences_independent_commands() {
    let command = ShellCommand::new("echo")
        .arg("== Disk ==")
        .then(ShellCommand::new("df").flag("-h").arg("/workspace"))
        .then(ShellCommand::new("nvidia-smi").or_else(ShellCommand::raw("echo none")));

    assert_eq!(
        command.as_str(),
        "echo '== Disk =='; df -h /workspace; nvidia-smi || echo none"
    );
}
