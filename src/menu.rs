//! Numbered interactive menu dispatching to the same operations as the CLI.
//!
//! Errors from an entry are printed and the menu keeps running; end of input
//! or `0` leaves it.

use camino::Utf8PathBuf;
use tracing::warn;

use crate::backend::Backend;
use crate::console::Console;
use crate::operations::{OperationError, Operations};
use crate::remote::CommandRunner;
use crate::retry::Sleeper;

/// An entry of the interactive menu.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MenuChoice {
    /// Deploy a template.
    Deploy,
    /// List pods.
    List,
    /// Open the port-forwarding tunnel.
    Connect,
    /// Follow the start-up log.
    Watch,
    /// Print the status report.
    Status,
    /// Download outputs.
    Pull,
    /// Upload workflows.
    Push,
    /// Open a shell.
    Shell,
    /// Download models.
    Ingest,
    /// Show the running cost.
    Wallet,
    /// List templates.
    Templates,
    /// Terminate a pod.
    Terminate,
    /// Leave the menu.
    Quit,
}

const ENTRIES: [(MenuChoice, &str); 13] = [
    (MenuChoice::Deploy, "Deploy a template"),
    (MenuChoice::List, "List pods"),
    (MenuChoice::Connect, "Connect (tunnel + URLs)"),
    (MenuChoice::Watch, "Watch startup log"),
    (MenuChoice::Status, "Pod status"),
    (MenuChoice::Pull, "Pull outputs"),
    (MenuChoice::Push, "Push workflows"),
    (MenuChoice::Shell, "Shell"),
    (MenuChoice::Ingest, "Ingest models"),
    (MenuChoice::Wallet, "Wallet"),
    (MenuChoice::Templates, "Templates"),
    (MenuChoice::Terminate, "Terminate a pod"),
    (MenuChoice::Quit, "Quit"),
];

impl MenuChoice {
    /// Parses the operator's answer. `q` is accepted for quit.
    #[must_use]
    pub fn parse(answer: &str) -> Option<Self> {
        let trimmed = answer.trim();
        if trimmed.eq_ignore_ascii_case("q") {
            return Some(Self::Quit);
        }
        let number = trimmed.parse::<usize>().ok()?;
        if number == 0 {
            return Some(Self::Quit);
        }
        ENTRIES
            .get(number.checked_sub(1)?)
            .map(|(choice, _)| *choice)
            .filter(|choice| *choice != Self::Quit)
    }
}

/// Runs the menu until the operator quits or input ends.
pub async fn run_menu<B, R, C, S>(ops: &Operations<B, R, C, S>)
where
    B: Backend,
    R: CommandRunner,
    C: Console,
    S: Sleeper,
{
    let console = ops.console();
    loop {
        console.show("");
        console.show("podpilot");
        for (index, (choice, label)) in ENTRIES.iter().enumerate() {
            let number = if *choice == MenuChoice::Quit { 0 } else { index + 1 };
            console.show(&format!("  [{number}] {label}"));
        }
        let Some(answer) = console.ask("Choice: ") else {
            return;
        };
        let Some(choice) = MenuChoice::parse(&answer) else {
            console.show("Unknown choice.");
            continue;
        };
        if choice == MenuChoice::Quit {
            return;
        }
        if let Err(err) = run_choice(ops, choice).await {
            warn!(error = %err, "menu entry failed");
            console.show(&format!("Error: {err}"));
        }
    }
}

async fn run_choice<B, R, C, S>(
    ops: &Operations<B, R, C, S>,
    choice: MenuChoice,
) -> Result<(), OperationError<B::Error>>
where
    B: Backend,
    R: CommandRunner,
    C: Console,
    S: Sleeper,
{
    let console = ops.console();
    match choice {
        MenuChoice::Deploy => {
            ops.templates();
            let key = console.ask("Template key: ").unwrap_or_default();
            if !key.trim().is_empty() {
                ops.deploy(key.trim(), false).await?;
            }
        }
        MenuChoice::List => {
            ops.list().await?;
        }
        MenuChoice::Connect => {
            ops.connect().await?;
        }
        MenuChoice::Watch => ops.watch().await?,
        MenuChoice::Status => {
            ops.status().await?;
        }
        MenuChoice::Pull => {
            ops.pull().await?;
        }
        MenuChoice::Push => {
            let answer = console
                .ask("Workflow files (space separated): ")
                .unwrap_or_default();
            let files: Vec<Utf8PathBuf> = answer.split_whitespace().map(Utf8PathBuf::from).collect();
            if !files.is_empty() {
                ops.push(&files).await?;
            }
        }
        MenuChoice::Shell => {
            ops.shell().await?;
        }
        MenuChoice::Ingest => {
            ops.ingest(&[]).await?;
        }
        MenuChoice::Wallet => {
            ops.wallet().await?;
        }
        MenuChoice::Templates => ops.templates(),
        MenuChoice::Terminate => {
            ops.terminate(None, false).await?;
        }
        MenuChoice::Quit => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;
    use rstest::rstest;

    use super::{MenuChoice, run_menu};
    use crate::backend::InstanceRecord;
    use crate::catalog::Catalog;
    use crate::lifecycle::{Deployer, SetupSources};
    use crate::operations::Operations;
    use crate::remote::RemoteClient;
    use crate::test_support::{
        RecordingSleeper, ScriptedBackend, ScriptedConsole, ScriptedRunner, running_record,
        ssh_config,
    };

    type TestOps = Operations<ScriptedBackend, ScriptedRunner, ScriptedConsole, RecordingSleeper>;

    fn operations(
        instances: Vec<InstanceRecord>,
        answers: &[&str],
    ) -> (TestOps, ScriptedBackend, ScriptedConsole) {
        let backend = ScriptedBackend::new().with_instances(instances);
        let console = ScriptedConsole::new(answers.iter().copied());
        let remote = RemoteClient::new(ssh_config(), ScriptedRunner::new())
            .expect("config should validate")
            .with_sleeper(RecordingSleeper::new());
        let catalog = Catalog::builtin();
        let deployer = Deployer::new(
            backend.clone(),
            remote,
            catalog.default_image.clone(),
            catalog.layout.clone(),
            SetupSources {
                start_scripts_dir: Utf8PathBuf::from("docker"),
                setup_scripts_dir: Utf8PathBuf::from("scripts"),
                env_file: Utf8PathBuf::from(".env"),
            },
        );
        let ops = Operations::new(
            deployer,
            console.clone(),
            catalog,
            Utf8PathBuf::from("output"),
            None,
        );
        (ops, backend, console)
    }

    #[rstest]
    #[case("1", Some(MenuChoice::Deploy))]
    #[case(" 12 ", Some(MenuChoice::Terminate))]
    #[case("0", Some(MenuChoice::Quit))]
    #[case("Q", Some(MenuChoice::Quit))]
    #[case("13", None)]
    #[case("deploy", None)]
    fn parses_choices(#[case] answer: &str, #[case] expected: Option<MenuChoice>) {
        assert_eq!(MenuChoice::parse(answer), expected);
    }

    #[tokio::test]
    async fn end_of_input_leaves_menu() {
        let (ops, _, console) = operations(Vec::new(), &["11"]);

        run_menu(&ops).await;

        assert!(console.mentions("[0] Quit"));
        assert!(console.transcript().iter().any(|line| line.starts_with("budget ")));
        assert_eq!(console.prompts_asked(), 2);
    }

    #[tokio::test]
    async fn errors_are_shown_and_menu_continues() {
        let (ops, backend, console) = operations(Vec::new(), &["2", "99", "0"]);
        backend.fail_list();

        run_menu(&ops).await;

        assert!(console.mentions("Error: list pods failed"));
        assert!(console.mentions("Unknown choice."));
        assert_eq!(console.prompts_asked(), 3);
    }

    #[tokio::test]
    async fn terminate_entry_uses_prompts() {
        let (ops, backend, _) = operations(
            vec![running_record("pod-a", "ltx2-comfyui-prod")],
            &["12", "1", "y", "q"],
        );

        run_menu(&ops).await;

        assert_eq!(backend.terminated(), ["pod-a"]);
    }
}
