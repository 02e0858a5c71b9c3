//! Command-line interface definitions for the `podpilot` binary.
//!
//! The parser lives in its own module so the build script can include it
//! when rendering the manual page.

use clap::{Parser, Subcommand};

/// Top-level CLI for the `podpilot` binary.
#[derive(Debug, Parser)]
#[command(
    name = "podpilot",
    version,
    about = "Provision RunPod GPU pods and drive them over SSH",
    long_about = "Provision RunPod GPU pods from a template catalogue, then run \
                  commands, transfer files and tunnel ports over SSH. Running \
                  without a subcommand opens the interactive menu."
)]
pub(crate) struct Cli {
    /// Operation to perform; omit to open the interactive menu.
    #[command(subcommand)]
    pub(crate) command: Option<Command>,
}

/// Subcommands understood by `podpilot`.
#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Create (or reuse) a pod from a catalogue template and wait for SSH.
    #[command(name = "deploy")]
    Deploy(DeployCommand),
    /// List every pod on the account.
    #[command(name = "list")]
    List,
    /// Terminate a pod, releasing its volume.
    #[command(name = "terminate")]
    Terminate(TerminateCommand),
    /// Open an SSH tunnel to the server ports and print the URLs.
    #[command(name = "connect")]
    Connect,
    /// Follow the pod's startup log.
    #[command(name = "watch")]
    Watch,
    /// Print disk, memory, GPU and process status of a pod.
    #[command(name = "status")]
    Status,
    /// Download generated outputs into the local output directory.
    #[command(name = "pull")]
    Pull,
    /// Upload workflow files to the pod.
    #[command(name = "push")]
    Push(PushCommand),
    /// Open an interactive SSH session.
    #[command(name = "shell")]
    Shell,
    /// Download model files on the pod, routed into model folders.
    #[command(name = "ingest")]
    Ingest(IngestCommand),
    /// Show running pods and the combined hourly cost.
    #[command(name = "wallet")]
    Wallet,
    /// List catalogue templates.
    #[command(name = "templates")]
    Templates,
    /// Open the interactive menu.
    #[command(name = "interactive")]
    Interactive,
}

/// Arguments for `podpilot deploy`.
#[derive(Debug, Parser)]
pub(crate) struct DeployCommand {
    /// Catalogue key of the template to deploy (for example `prod`).
    #[arg(value_name = "TEMPLATE")]
    pub(crate) template: String,
    /// Skip uploading and launching the start scripts.
    #[arg(long)]
    pub(crate) no_setup: bool,
}

/// Arguments for `podpilot terminate`.
#[derive(Debug, Parser)]
pub(crate) struct TerminateCommand {
    /// Pod identifier; prompts for a choice when omitted.
    #[arg(value_name = "POD_ID")]
    pub(crate) id: Option<String>,
    /// Do not ask for confirmation.
    #[arg(long, short = 'y')]
    pub(crate) yes: bool,
}

/// Arguments for `podpilot push`.
#[derive(Debug, Parser)]
pub(crate) struct PushCommand {
    /// Local files to upload to the workflows directory.
    #[arg(required = true, value_name = "FILE")]
    pub(crate) files: Vec<String>,
}

/// Arguments for `podpilot ingest`.
#[derive(Debug, Parser)]
pub(crate) struct IngestCommand {
    /// Model URLs; prompts for a pasted list when omitted.
    #[arg(value_name = "URL")]
    pub(crate) urls: Vec<String>,
}
