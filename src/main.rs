//! Binary entry point for the `podpilot` CLI.

use std::io::{self, Write};
use std::process;

use camino::Utf8PathBuf;
use clap::Parser;
use thiserror::Error;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use podpilot::{
    AppConfig, ConfigError, Console, Deployer, OperationError, Operations, ProcessCommandRunner,
    RemoteClient, RemoteError, RunPodBackend, RunPodBackendError, SetupSources, StdConsole,
    run_menu, show_templates,
};

mod cli;

use cli::{Cli, Command};

type CliOperations = Operations<RunPodBackend, ProcessCommandRunner, StdConsole>;

#[derive(Debug, Error)]
enum CliError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("provider error: {0}")]
    Provider(#[from] RunPodBackendError),
    #[error("ssh error: {0}")]
    Remote(#[from] RemoteError),
    #[error(transparent)]
    Operation(Box<OperationError<RunPodBackendError>>),
    #[error("background task failed: {0}")]
    Task(String),
}

impl From<OperationError<RunPodBackendError>> for CliError {
    fn from(value: OperationError<RunPodBackendError>) -> Self {
        Self::Operation(Box::new(value))
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() {
    init_tracing();
    let cli = Cli::parse();
    let exit_code = match dispatch(cli).await {
        Ok(()) => 0,
        Err(err) => {
            report_error(&err);
            1
        }
    };

    process::exit(exit_code);
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "podpilot=info".into()))
        .with(fmt::layer().with_writer(io::stderr))
        .init();
}

async fn dispatch(cli: Cli) -> Result<(), CliError> {
    let config = AppConfig::load()?;
    let command = cli.command.unwrap_or(Command::Interactive);
    if matches!(command, Command::Templates) {
        show_templates(&StdConsole, &config.catalog);
        return Ok(());
    }
    let ops = build_operations(config)?;
    run(&ops, command).await
}

fn build_operations(config: AppConfig) -> Result<CliOperations, CliError> {
    let AppConfig {
        provider,
        ssh,
        workspace,
        hugging_face,
        catalog,
    } = config;
    let api_key = provider.api_key.clone();
    let backend = RunPodBackend::new(provider)?;
    let hf_token = hugging_face.token().map(str::to_owned);
    let remote = RemoteClient::with_process_runner(ssh)?
        .with_secret(api_key)
        .with_secret(hf_token.clone().unwrap_or_default());
    let sources = SetupSources {
        start_scripts_dir: Utf8PathBuf::from(&workspace.start_scripts_dir),
        setup_scripts_dir: Utf8PathBuf::from(&workspace.setup_scripts_dir),
        env_file: Utf8PathBuf::from(&workspace.env_file),
    };
    let deployer = Deployer::new(
        backend,
        remote,
        catalog.default_image.clone(),
        catalog.layout.clone(),
        sources,
    );
    Ok(Operations::new(
        deployer,
        StdConsole,
        catalog,
        Utf8PathBuf::from(&workspace.output_dir),
        hf_token,
    ))
}

async fn run(ops: &CliOperations, command: Command) -> Result<(), CliError> {
    match command {
        Command::Deploy(args) => {
            ops.deploy(&args.template, args.no_setup).await?;
        }
        Command::List => {
            ops.list().await?;
        }
        Command::Terminate(args) => {
            ops.terminate(args.id.as_deref(), args.yes).await?;
        }
        Command::Connect => {
            ops.connect().await?;
        }
        Command::Watch => {
            let Some(conn) = ops.target().await? else {
                return Ok(());
            };
            let log = ops.layout().startup_log.clone();
            ops.console()
                .show(&format!("Following {log} on {} (Ctrl-C to stop)", conn.instance_id));
            let remote = ops.remote().clone();
            until_interrupted(move || remote.tail_log(&conn, &log)).await?;
        }
        Command::Status => {
            ops.status().await?;
        }
        Command::Pull => {
            ops.pull().await?;
        }
        Command::Push(args) => {
            let files: Vec<Utf8PathBuf> = args.files.iter().map(Utf8PathBuf::from).collect();
            ops.push(&files).await?;
        }
        Command::Shell => {
            let Some(conn) = ops.target().await? else {
                return Ok(());
            };
            ops.console()
                .show(&format!("Opening shell on {}...", conn.instance_id));
            let remote = ops.remote().clone();
            until_interrupted(move || remote.open_shell(&conn)).await?;
        }
        Command::Ingest(args) => {
            ops.ingest(&args.urls).await?;
        }
        Command::Wallet => {
            ops.wallet().await?;
        }
        Command::Templates => ops.templates(),
        Command::Interactive => {
            let _interrupts = hold_interrupts();
            run_menu(ops).await;
        }
    }
    Ok(())
}

/// Runs a blocking remote session until it ends or the operator presses
/// Ctrl-C. The interrupt also reaches the foreground `ssh` child, which tears
/// the session down.
async fn until_interrupted<T, F>(task: F) -> Result<Option<T>, CliError>
where
    F: FnOnce() -> Result<T, RemoteError> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::task::spawn_blocking(task);
    tokio::select! {
        joined = handle => {
            let outcome = joined.map_err(|err| CliError::Task(err.to_string()))?;
            Ok(Some(outcome?))
        }
        Ok(()) = tokio::signal::ctrl_c() => {
            info!("interrupted by operator");
            Ok(None)
        }
    }
}

// Keeps SIGINT from ending the menu while a foreground session runs.
#[cfg(unix)]
fn hold_interrupts() -> Option<tokio::signal::unix::Signal> {
    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt()).ok()
}

#[cfg(not(unix))]
const fn hold_interrupts() -> Option<()> {
    None
}

fn report_error(err: &CliError) {
    write_error(io::stderr(), err);
}

fn write_error(mut target: impl Write, err: &CliError) {
    writeln!(target, "{err}").ok();
}

#[cfg(test)]
mod tests {
    use clap::Parser;
    use rstest::rstest;

    use super::{CliError, write_error};
    use crate::cli::{Cli, Command};
    use podpilot::{ConfigError, RemoteError};

    #[rstest]
    fn no_subcommand_parses_to_menu() {
        let cli = Cli::try_parse_from(["podpilot"]).expect("parse");

        assert!(cli.command.is_none());
    }

    #[rstest]
    fn terminate_accepts_id_and_yes() {
        let cli = Cli::try_parse_from(["podpilot", "terminate", "pod-1", "--yes"]).expect("parse");

        let Some(Command::Terminate(args)) = cli.command else {
            panic!("expected terminate");
        };
        assert_eq!(args.id.as_deref(), Some("pod-1"));
        assert!(args.yes);
    }

    #[rstest]
    fn push_requires_files() {
        assert!(Cli::try_parse_from(["podpilot", "push"]).is_err());
    }

    #[rstest]
    fn deploy_reads_template_and_flag() {
        let cli = Cli::try_parse_from(["podpilot", "deploy", "value", "--no-setup"]).expect("parse");

        let Some(Command::Deploy(args)) = cli.command else {
            panic!("expected deploy");
        };
        assert_eq!(args.template, "value");
        assert!(args.no_setup);
    }

    #[rstest]
    fn write_error_renders_message() {
        let mut buf = Vec::new();
        let err = CliError::Config(ConfigError::MissingField(String::from(
            "missing RunPod API key: set RUNPOD_API_KEY",
        )));

        write_error(&mut buf, &err);

        let rendered = String::from_utf8(buf).expect("utf8");
        assert_eq!(
            rendered,
            "configuration error: missing RunPod API key: set RUNPOD_API_KEY\n"
        );
    }

    #[rstest]
    fn remote_errors_keep_context() {
        let err = CliError::from(RemoteError::Transport {
            operation: String::from("upload_file"),
            instance_id: String::from("pod-1"),
            message: String::from("timed out"),
        });

        assert_eq!(err.to_string(), "ssh error: upload_file on pod-1 failed: timed out");
    }
}
