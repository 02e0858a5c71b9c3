//! Post-provisioning setup: upload start scripts and launch them detached.

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{info, warn};

use super::ProvisioningSetupError;
use crate::backend::ConnectionDescriptor;
use crate::catalog::{InstanceTemplate, RemoteLayout};
use crate::local::is_file;
use crate::remote::{CommandRunner, RemoteClient, RemoteError, ShellCommand};
use crate::retry::Sleeper;

/// Local locations of the files uploaded to new pods.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct SetupSources {
    /// Directory holding template start scripts.
    pub start_scripts_dir: Utf8PathBuf,
    /// Directory holding model setup scripts.
    pub setup_scripts_dir: Utf8PathBuf,
    /// Environment file forwarded to the pod.
    pub env_file: Utf8PathBuf,
}

impl SetupSources {
    /// Returns the local files for `template` that exist, in upload order:
    /// start script, setup script, environment file.
    #[must_use]
    pub fn present_files(&self, template: &InstanceTemplate) -> Vec<Utf8PathBuf> {
        [
            self.start_scripts_dir.join(&template.script),
            self.setup_scripts_dir.join(template.setup_script()),
            self.env_file.clone(),
        ]
        .into_iter()
        .filter(|path| is_file(path))
        .collect()
    }
}

/// What post-provisioning setup did.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum SetupOutcome {
    /// Setup was skipped on request.
    Skipped,
    /// Files were uploaded and the start script launched.
    Launched {
        /// File names copied into the workspace.
        uploaded: Vec<String>,
    },
}

/// Builds the detached launch command for `script`.
#[must_use]
pub fn launch_command(layout: &RemoteLayout, script: &str) -> ShellCommand {
    let remote_script = layout.workspace_file(script);
    ShellCommand::new("chmod")
        .flag("+x")
        .arg(&remote_script)
        .and_then(
            ShellCommand::new("exec")
                .arg(&remote_script)
                .redirect_all_to(&layout.startup_log),
        )
}

pub(super) fn upload_and_launch<R: CommandRunner, S: Sleeper>(
    remote: &RemoteClient<R, S>,
    layout: &RemoteLayout,
    sources: &SetupSources,
    descriptor: &ConnectionDescriptor,
    template: &InstanceTemplate,
) -> Result<SetupOutcome, ProvisioningSetupError> {
    let failure = |step: String, source: RemoteError| ProvisioningSetupError {
        instance_id: descriptor.instance_id.clone(),
        step,
        descriptor: descriptor.clone(),
        login: remote.login_hint(descriptor),
        source,
    };

    let files = sources.present_files(template);
    if !files
        .iter()
        .any(|path| path.file_name() == Some(template.script.as_str()))
    {
        warn!(
            script = %template.script,
            "start script not found locally; launching the copy already on the volume"
        );
    }

    let mut uploaded = Vec::with_capacity(files.len());
    for path in &files {
        let name = file_name(path);
        info!(instance_id = %descriptor.instance_id, file = name, "uploading setup file");
        remote
            .upload_file(descriptor, path, &layout.workspace_file(name))
            .map_err(|err| failure(format!("upload {name}"), err))?;
        uploaded.push(name.to_owned());
    }

    remote
        .run_background(descriptor, &launch_command(layout, &template.script))
        .map_err(|err| failure(format!("launch {}", template.script), err))?;
    info!(instance_id = %descriptor.instance_id, script = %template.script, "start script launched");

    Ok(SetupOutcome::Launched { uploaded })
}

fn file_name(path: &Utf8Path) -> &str {
    path.file_name().unwrap_or_else(|| path.as_str())
}
