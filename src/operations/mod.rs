//! Operator-facing operations behind the CLI verbs and the interactive menu.
//!
//! Each operation lists pods through the provider, resolves a target with
//! [`TargetResolver`], then drives the remote client. Output goes through the
//! [`Console`] so the same code serves the CLI, the menu and the tests.

use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{info, warn};

use crate::backend::{Backend, ConnectionDescriptor, DesiredStatus, InstanceRecord};
use crate::catalog::{Catalog, RemoteLayout};
use crate::console::Console;
use crate::ingest::{ClassifiedUrl, Classifier, download_command, extract_urls, file_name};
use crate::lifecycle::{DeployOptions, Deployer, Deployment, SetupOutcome};
use crate::local::is_file;
use crate::remote::{CommandRunner, RemoteClient, ShellCommand};
use crate::resolver::TargetResolver;
use crate::retry::{Sleeper, ThreadSleeper};

mod error;

pub use error::OperationError;

/// Limit for the captured status report.
pub const STATUS_TIMEOUT: Duration = Duration::from_secs(60);

/// Limit for the output-directory listing that precedes a pull.
pub const LISTING_TIMEOUT: Duration = Duration::from_secs(30);

type OpResult<T, B> = Result<T, OperationError<<B as Backend>::Error>>;

/// Shared context for every operation.
#[derive(Debug)]
pub struct Operations<B, R, C, S = ThreadSleeper>
where
    B: Backend,
    R: CommandRunner,
    C: Console,
    S: Sleeper,
{
    deployer: Deployer<B, R, S>,
    console: C,
    catalog: Catalog,
    classifier: Classifier,
    output_dir: Utf8PathBuf,
    hf_token: Option<String>,
}

impl<B, R, C, S> Operations<B, R, C, S>
where
    B: Backend,
    R: CommandRunner,
    C: Console,
    S: Sleeper,
{
    /// Creates the operation context.
    #[must_use]
    pub fn new(
        deployer: Deployer<B, R, S>,
        console: C,
        catalog: Catalog,
        output_dir: Utf8PathBuf,
        hf_token: Option<String>,
    ) -> Self {
        let classifier = Classifier::new(catalog.model_folders.iter().map(String::as_str));
        Self {
            deployer,
            console,
            catalog,
            classifier,
            output_dir,
            hf_token,
        }
    }

    /// Returns the operator console.
    #[must_use]
    pub const fn console(&self) -> &C {
        &self.console
    }

    /// Returns the remote client.
    #[must_use]
    pub const fn remote(&self) -> &RemoteClient<R, S> {
        self.deployer.remote()
    }

    /// Returns the remote path layout.
    #[must_use]
    pub const fn layout(&self) -> &RemoteLayout {
        &self.catalog.layout
    }

    /// Returns the template catalogue.
    #[must_use]
    pub const fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Deploys the template named `key`.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Catalog`] for an unknown key or
    /// [`OperationError::Deploy`] when the deploy fails.
    pub async fn deploy(&self, key: &str, skip_setup: bool) -> OpResult<Deployment, B> {
        let template = self.catalog.template(key)?;
        self.console.show(&format!(
            "Deploying {} ({}, {} cloud)...",
            template.key, template.gpu_type_id, template.cloud_type
        ));
        let options = DeployOptions {
            skip_setup,
            hf_token: self.hf_token.clone(),
        };
        let deployment = self.deployer.deploy(template, &options).await?;
        self.report_deployment(&deployment);
        Ok(deployment)
    }

    fn report_deployment(&self, deployment: &Deployment) {
        let conn = &deployment.descriptor;
        let verb = if deployment.reused { "Reusing" } else { "Created" };
        self.console.show(&format!(
            "{verb} pod {} ({}) at {}:{}",
            conn.instance_id, conn.gpu, conn.address, conn.port
        ));
        self.console
            .show(&format!("  {}", self.remote().login_hint(conn)));
        match &deployment.setup {
            SetupOutcome::Skipped => self.console.show("  Setup skipped."),
            SetupOutcome::Launched { uploaded } => {
                self.console
                    .show(&format!("  Uploaded: {}", uploaded.join(", ")));
                self.console.show(&format!(
                    "  Start script running; follow it with `podpilot watch` ({})",
                    self.catalog.layout.startup_log
                ));
            }
        }
        self.console.show(&format!(
            "  UI: {}",
            conn.proxy_url(self.catalog.layout.ui_port)
        ));
    }

    /// Prints every pod as a table.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Provider`] when listing fails.
    pub async fn list(&self) -> OpResult<Vec<InstanceRecord>, B> {
        let records = self.list_pods().await?;
        if records.is_empty() {
            self.console.show("No pods.");
            return Ok(records);
        }
        self.console.show(&format!(
            "{:<16} {:<28} {:<20} {:<11} {:>8}",
            "ID", "NAME", "GPU", "STATUS", "$/HR"
        ));
        for record in &records {
            self.console.show(&format!(
                "{:<16} {:<28} {:<20} {:<11} {:>8.3}",
                record.id,
                record.name,
                record.machine.gpu_name,
                record.desired_status.as_str(),
                record.cost_per_hour
            ));
        }
        Ok(records)
    }

    /// Terminates `id`, or a pod chosen from the running ones, after
    /// confirmation unless `assume_yes`. Returns the terminated id, or `None`
    /// when the operator cancelled.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Provider`] when listing or terminating
    /// fails.
    pub async fn terminate(&self, id: Option<&str>, assume_yes: bool) -> OpResult<Option<String>, B> {
        let chosen = match id {
            Some(value) => Some(value.trim().to_owned()),
            None => self.choose_pod_to_terminate().await?,
        };
        let Some(target) = chosen.filter(|value| !value.is_empty()) else {
            self.console.show("Cancelled.");
            return Ok(None);
        };

        if !assume_yes {
            let answer = self
                .console
                .ask(&format!("Terminate {target}? [y/N]: "))
                .unwrap_or_default();
            if !matches!(answer.trim().to_lowercase().as_str(), "y" | "yes") {
                self.console.show("Cancelled.");
                return Ok(None);
            }
        }

        self.deployer
            .backend()
            .terminate_instance(&target)
            .await
            .map_err(|source| OperationError::Provider {
                operation: String::from("terminate pod"),
                instance_id: Some(target.clone()),
                source,
            })?;
        info!(instance_id = %target, "pod terminated");
        self.console.show(&format!("Terminated {target}."));
        Ok(Some(target))
    }

    async fn choose_pod_to_terminate(&self) -> OpResult<Option<String>, B> {
        let running = self.running_pods().await?;
        if running.is_empty() {
            self.console.show("No running pods.");
            return Ok(None);
        }
        for (index, record) in running.iter().enumerate() {
            self.console.show(&format!(
                "  [{}] {}  {}  ${:.3}/hr",
                index + 1,
                record.id,
                record.name,
                record.cost_per_hour
            ));
        }
        let answer = self
            .console
            .ask("Pod number or id (empty to cancel): ")
            .unwrap_or_default();
        let trimmed = answer.trim();
        if trimmed.is_empty() {
            return Ok(None);
        }
        let Ok(number) = trimmed.parse::<usize>() else {
            return Ok(Some(trimmed.to_owned()));
        };
        let picked = number
            .checked_sub(1)
            .and_then(|index| running.get(index))
            .map(|record| record.id.clone());
        if picked.is_none() {
            self.console.show(&format!("No pod numbered {number}."));
        }
        Ok(picked)
    }

    /// Resolves the pod to operate on among the running ones. Prints a note
    /// and returns `None` when nothing runs.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Provider`] when listing fails or
    /// [`OperationError::NotReachable`] when the chosen pod has no endpoint.
    pub async fn target(&self) -> OpResult<Option<ConnectionDescriptor>, B> {
        let running = self.running_pods().await?;
        let resolved = TargetResolver::new(&self.console).resolve(&running)?;
        if resolved.is_none() {
            self.console.show("No running pods.");
        }
        Ok(resolved)
    }

    /// Opens port forwards to the UI ports and prints the local and proxy
    /// URLs.
    ///
    /// # Errors
    ///
    /// Returns an error when no target resolves or `ssh` cannot start.
    pub async fn connect(&self) -> OpResult<Option<u32>, B> {
        let Some(conn) = self.target().await? else {
            return Ok(None);
        };
        let layout = &self.catalog.layout;
        let pid = self.remote().open_tunnel(&conn, &layout.tunnel_ports)?;
        let ports: Vec<String> = layout.tunnel_ports.iter().map(u16::to_string).collect();
        self.console.show(&format!(
            "Tunnel to {} open (pid {pid}) for ports {}",
            conn.instance_id,
            ports.join(", ")
        ));
        self.console
            .show(&format!("  Local: http://127.0.0.1:{}", layout.ui_port));
        self.console
            .show(&format!("  Proxy: {}", conn.proxy_url(layout.ui_port)));
        Ok(Some(pid))
    }

    /// Follows the start-up log on `conn` until the session ends.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Remote`] when `ssh` cannot start.
    pub fn watch_on(&self, conn: &ConnectionDescriptor) -> OpResult<(), B> {
        self.console.show(&format!(
            "Following {} on {} (Ctrl-C to stop)",
            self.catalog.layout.startup_log, conn.instance_id
        ));
        self.remote()
            .tail_log(conn, &self.catalog.layout.startup_log)?;
        Ok(())
    }

    /// Resolves a target and follows its start-up log.
    ///
    /// # Errors
    ///
    /// See [`Operations::target`] and [`Operations::watch_on`].
    pub async fn watch(&self) -> OpResult<(), B> {
        let Some(conn) = self.target().await? else {
            return Ok(());
        };
        self.watch_on(&conn)
    }

    /// Opens an interactive session on `conn`.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Remote`] when `ssh` cannot start.
    pub fn shell_on(&self, conn: &ConnectionDescriptor) -> OpResult<Option<i32>, B> {
        self.console
            .show(&format!("Opening shell on {}...", conn.instance_id));
        Ok(self.remote().open_shell(conn)?)
    }

    /// Resolves a target and opens an interactive session on it.
    ///
    /// # Errors
    ///
    /// See [`Operations::target`] and [`Operations::shell_on`].
    pub async fn shell(&self) -> OpResult<Option<i32>, B> {
        let Some(conn) = self.target().await? else {
            return Ok(None);
        };
        self.shell_on(&conn)
    }

    /// Prints disk, memory, GPU, network and process information from the
    /// pod.
    ///
    /// # Errors
    ///
    /// Returns an error when no target resolves or the report cannot run.
    pub async fn status(&self) -> OpResult<Option<String>, B> {
        let Some(conn) = self.target().await? else {
            return Ok(None);
        };
        self.console.show(&format!(
            "Pod {} ({}, ${:.3}/hr)",
            conn.instance_id, conn.gpu, conn.cost_per_hour
        ));
        let output = self.remote().run_command(
            &conn,
            &status_report(&self.catalog.layout),
            true,
            Some(STATUS_TIMEOUT),
        )?;
        for line in output.stdout.lines() {
            self.console.show(line);
        }
        if output.exit_code != Some(0) && !output.stderr.trim().is_empty() {
            warn!(instance_id = %conn.instance_id, stderr = %output.stderr.trim(), "status report incomplete");
        }
        Ok(Some(output.stdout))
    }

    /// Downloads the pod's output directory into the local output directory.
    /// Returns the number of remote entries copied.
    ///
    /// # Errors
    ///
    /// Returns an error when no target resolves or a transfer fails.
    pub async fn pull(&self) -> OpResult<usize, B> {
        let Some(conn) = self.target().await? else {
            return Ok(0);
        };
        let remote_dir = &self.catalog.layout.output_dir;
        let listing = ShellCommand::new("ls")
            .flag("-A")
            .arg(remote_dir)
            .quiet_errors();
        let output = self
            .remote()
            .run_command(&conn, &listing, true, Some(LISTING_TIMEOUT))?;
        let entries = output
            .stdout
            .lines()
            .filter(|line| !line.trim().is_empty())
            .count();
        if entries == 0 {
            self.console
                .show(&format!("Nothing to pull from {remote_dir}."));
            return Ok(0);
        }

        self.console.show(&format!(
            "Pulling {entries} entries from {remote_dir} into {}...",
            self.output_dir
        ));
        self.remote().download_files(
            &conn,
            &format!("{}/*", remote_dir.trim_end_matches('/')),
            &self.output_dir,
            true,
        )?;
        self.console.show("Pull complete.");
        Ok(entries)
    }

    /// Uploads workflow files into the pod's workflows directory.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::MissingLocalFile`] before connecting when any
    /// file is missing, or an error when a transfer fails.
    pub async fn push(&self, files: &[Utf8PathBuf]) -> OpResult<usize, B> {
        if let Some(missing) = files.iter().find(|path| !is_file(path)) {
            return Err(OperationError::MissingLocalFile {
                path: missing.clone(),
            });
        }
        let Some(conn) = self.target().await? else {
            return Ok(0);
        };
        let workflows = &self.catalog.layout.workflows_dir;
        self.remote().run_command(
            &conn,
            &ShellCommand::new("mkdir").flag("-p").arg(workflows),
            false,
            None,
        )?;
        for path in files {
            let name = local_file_name(path);
            self.remote().upload_file(
                &conn,
                path,
                &format!("{}/{name}", workflows.trim_end_matches('/')),
            )?;
            self.console.show(&format!("Uploaded {name}"));
        }
        Ok(files.len())
    }

    /// Classifies model URLs, asks about the unrecognised ones and downloads
    /// each into its folder on the pod. Prompts for URLs when `urls` is
    /// empty. Returns the number of successful downloads.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::IngestIncomplete`] when any download failed,
    /// after attempting all of them.
    pub async fn ingest(&self, urls: &[String]) -> OpResult<usize, B> {
        let Some(conn) = self.target().await? else {
            return Ok(0);
        };
        let given = if urls.is_empty() {
            self.console
                .ask("Paste model URLs (space or comma separated): ")
                .map(|raw| extract_urls(&raw))
                .unwrap_or_default()
        } else {
            urls.iter().flat_map(|raw| extract_urls(raw)).collect()
        };
        if given.is_empty() {
            self.console.show("No URLs given.");
            return Ok(0);
        }

        let classification = self.classifier.classify(&given);
        for item in &classification.auto {
            self.console.show(&format!(
                "  {} -> {}",
                display_name(&item.url),
                item.category
            ));
        }
        let mut queue = classification.auto;
        queue.extend(
            self.classifier
                .review_manual(&self.console, &classification.manual),
        );
        self.download_all(&conn, &queue)
    }

    fn download_all(&self, conn: &ConnectionDescriptor, queue: &[ClassifiedUrl]) -> OpResult<usize, B> {
        let mut failed = 0_usize;
        for item in queue {
            self.console.show(&format!(
                "Downloading {} into {}",
                display_name(&item.url),
                item.category
            ));
            let command = download_command(&self.catalog.layout, &item.category, &item.url);
            if let Err(err) = self.remote().run_command(conn, &command, false, None) {
                warn!(instance_id = %conn.instance_id, error = %err, "download failed");
                self.console.show(&format!("  Failed: {err}"));
                failed += 1;
            }
        }
        let succeeded = queue.len() - failed;
        if failed > 0 {
            return Err(OperationError::IngestIncomplete {
                instance_id: conn.instance_id.clone(),
                failed,
                total: queue.len(),
            });
        }
        self.console
            .show(&format!("Downloaded {succeeded} file(s)."));
        Ok(succeeded)
    }

    /// Prints the running-pod count and the summed hourly burn rate.
    /// Returns the burn rate.
    ///
    /// # Errors
    ///
    /// Returns [`OperationError::Provider`] when listing fails.
    pub async fn wallet(&self) -> OpResult<f64, B> {
        let running = self.running_pods().await?;
        let burn: f64 = running.iter().map(|record| record.cost_per_hour).sum();
        self.console
            .show(&format!("Running pods: {}", running.len()));
        for record in &running {
            self.console.show(&format!(
                "  {}  {}  ${:.3}/hr",
                record.id, record.name, record.cost_per_hour
            ));
        }
        self.console.show(&format!("Burn rate: ${burn:.3}/hr"));
        Ok(burn)
    }

    /// Prints the template catalogue.
    pub fn templates(&self) {
        show_templates(&self.console, &self.catalog);
    }

    async fn list_pods(&self) -> OpResult<Vec<InstanceRecord>, B> {
        self.deployer
            .backend()
            .list_instances()
            .await
            .map_err(|source| OperationError::Provider {
                operation: String::from("list pods"),
                instance_id: None,
                source,
            })
    }

    async fn running_pods(&self) -> OpResult<Vec<InstanceRecord>, B> {
        let mut records = self.list_pods().await?;
        records.retain(|record| record.desired_status == DesiredStatus::Running);
        Ok(records)
    }
}

/// Prints the templates in `catalog`.
pub fn show_templates<C: Console>(console: &C, catalog: &Catalog) {
    console.show(&format!(
        "{:<8} {:<28} {:<20} {:<10} {}",
        "KEY", "NAME", "GPU", "CLOUD", "DESCRIPTION"
    ));
    for template in &catalog.templates {
        console.show(&format!(
            "{:<8} {:<28} {:<20} {:<10} {}",
            template.key,
            template.name,
            template.gpu_type_id,
            template.cloud_type.as_str(),
            template.description
        ));
    }
}

/// Builds the captured status report run by [`Operations::status`].
#[must_use]
pub fn status_report(layout: &RemoteLayout) -> ShellCommand {
    let heading = |title: &str| ShellCommand::new("echo").arg(format!("== {title} =="));
    heading("Disk")
        .then(ShellCommand::new("df").flag("-h").arg(&layout.workspace_dir))
        .then(heading("Memory"))
        .then(ShellCommand::new("free").flag("-h"))
        .then(heading("GPU"))
        .then(
            ShellCommand::new("nvidia-smi")
                .flag("--query-gpu=name,memory.used,memory.total,utilization.gpu")
                .flag("--format=csv,noheader")
                .or_else(ShellCommand::new("echo").arg("nvidia-smi unavailable")),
        )
        .then(heading("Network"))
        .then(
            ShellCommand::new("curl")
                .flag("-s")
                .flag("-o")
                .arg("/dev/null")
                .flag("-w")
                .arg("UI HTTP %{http_code}\\n")
                .arg(format!("http://127.0.0.1:{}", layout.ui_port))
                .or_else(ShellCommand::new("echo").arg("UI not responding")),
        )
        .then(heading("Processes"))
        .then(
            ShellCommand::new("pgrep")
                .flag("-af")
                .arg("python")
                .or_else(ShellCommand::new("echo").arg("no python processes")),
        )
}

fn display_name(url: &str) -> &str {
    file_name(url).unwrap_or(url)
}

fn local_file_name(path: &Utf8Path) -> &str {
    path.file_name().unwrap_or_else(|| path.as_str())
}
