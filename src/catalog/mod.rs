//! Declarative pod templates and the remote directory layout.
//!
//! The catalogue is a YAML document:
//!
//! ```yaml
//! default_image: runpod/pytorch:2.4.0-py3.11-cuda12.4.1-devel-ubuntu22.04
//! model_folders: [checkpoints, clip, clip_vision]
//! templates:
//!   prod:
//!     name: ltx2-comfyui-prod
//!     gpu_type_id: NVIDIA RTX A6000
//!     cloud_type: SECURE
//!     script: start.sh
//! ```
//!
//! Every key except `templates.<key>.name` and `gpu_type_id` is optional.
//! When the file does not exist the built-in catalogue applies.

use std::collections::BTreeMap;

use camino::Utf8Path;
use serde::Deserialize;
use thiserror::Error;

use crate::backend::{BackendError, CloudTier, InstanceRequest};
use crate::local::read_optional;

/// Image booted when a template has no override.
pub const DEFAULT_IMAGE: &str = "runpod/pytorch:2.4.0-py3.11-cuda12.4.1-devel-ubuntu22.04";

/// Setup script uploaded when a template names none.
pub const DEFAULT_SETUP_SCRIPT: &str = "setup_models.py";

/// Ports exposed by default.
pub const DEFAULT_PORTS: [&str; 4] = ["8888/http", "8188/http", "3000/http", "22/tcp"];

/// Model folders in routing priority order.
pub const DEFAULT_MODEL_FOLDERS: [&str; 11] = [
    "checkpoints",
    "unet",
    "diffusion_models",
    "clip",
    "text_encoders",
    "vae",
    "loras",
    "clip_vision",
    "latent_upscale_models",
    "controlnet",
    "upscale_models",
];

/// An immutable recipe for creating a pod.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct InstanceTemplate {
    /// Catalogue key (for example `prod`). Filled from the mapping key.
    #[serde(skip)]
    pub key: String,
    /// Pod name; also the key used to find a pod for reuse.
    pub name: String,
    /// One-line description shown in listings.
    #[serde(default, rename = "desc")]
    pub description: String,
    /// Provider GPU type identifier.
    pub gpu_type_id: String,
    /// Cloud tier to request first.
    #[serde(default = "default_tier")]
    pub cloud_type: CloudTier,
    /// Minimum GPU memory in gigabytes.
    #[serde(default = "default_vram")]
    pub min_vram: u32,
    /// Minimum system memory in gigabytes.
    #[serde(default = "default_system_ram")]
    pub system_ram: u32,
    /// Container disk size in gigabytes.
    #[serde(default = "default_container_disk")]
    pub container_disk: u32,
    /// Persistent volume size in gigabytes.
    #[serde(default = "default_volume_disk")]
    pub volume_disk: u32,
    /// Exposed ports in provider notation.
    #[serde(default = "default_ports")]
    pub ports: Vec<String>,
    /// Mount path of the persistent volume.
    #[serde(default = "default_mount_path")]
    pub volume_mount_path: String,
    /// Extra container environment.
    #[serde(default = "default_env")]
    pub env: BTreeMap<String, String>,
    /// Image override for this template.
    #[serde(default)]
    pub image_name: Option<String>,
    /// Start script launched in the background after provisioning.
    #[serde(default = "default_script")]
    pub script: String,
    /// Model setup script uploaded alongside the start script.
    #[serde(default)]
    pub setup_script: Option<String>,
}

const fn default_tier() -> CloudTier {
    CloudTier::Secure
}

const fn default_vram() -> u32 {
    48
}

const fn default_system_ram() -> u32 {
    48
}

const fn default_container_disk() -> u32 {
    40
}

const fn default_volume_disk() -> u32 {
    150
}

fn default_ports() -> Vec<String> {
    DEFAULT_PORTS.iter().map(|port| (*port).to_owned()).collect()
}

fn default_mount_path() -> String {
    String::from("/workspace")
}

fn default_env() -> BTreeMap<String, String> {
    BTreeMap::from([
        (String::from("COMFYUI_LISTEN"), String::from("0.0.0.0")),
        (String::from("COMFYUI_PORT"), String::from("8888")),
    ])
}

fn default_script() -> String {
    String::from("start.sh")
}

fn default_image() -> String {
    DEFAULT_IMAGE.to_owned()
}

fn default_model_folders() -> Vec<String> {
    DEFAULT_MODEL_FOLDERS
        .iter()
        .map(|folder| (*folder).to_owned())
        .collect()
}

impl InstanceTemplate {
    fn builtin(
        key: &str,
        name: &str,
        description: &str,
        gpu_type_id: &str,
        cloud_type: CloudTier,
        min_vram: u32,
        script: &str,
    ) -> Self {
        Self {
            key: key.to_owned(),
            name: name.to_owned(),
            description: description.to_owned(),
            gpu_type_id: gpu_type_id.to_owned(),
            cloud_type,
            min_vram,
            system_ram: default_system_ram(),
            container_disk: default_container_disk(),
            volume_disk: default_volume_disk(),
            ports: default_ports(),
            volume_mount_path: default_mount_path(),
            env: default_env(),
            image_name: None,
            script: script.to_owned(),
            setup_script: None,
        }
    }

    /// Returns the setup script name, falling back to
    /// [`DEFAULT_SETUP_SCRIPT`].
    #[must_use]
    pub fn setup_script(&self) -> &str {
        self.setup_script
            .as_deref()
            .unwrap_or(DEFAULT_SETUP_SCRIPT)
    }

    /// Builds the provider request for this template.
    ///
    /// `hf_token`, when present, is added to the container environment as
    /// `HF_TOKEN`.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Validation`] when the template lacks a
    /// required field.
    pub fn to_request(
        &self,
        default_image: &str,
        hf_token: Option<&str>,
    ) -> Result<InstanceRequest, BackendError> {
        let image = self.image_name.as_deref().unwrap_or(default_image);
        let mut builder = InstanceRequest::builder()
            .name(&self.name)
            .image_name(image)
            .gpu_type_id(&self.gpu_type_id)
            .cloud_tier(self.cloud_type)
            .gpu_count(1)
            .min_vram_gb(self.min_vram)
            .min_memory_gb(self.system_ram)
            .container_disk_gb(self.container_disk)
            .volume_gb(self.volume_disk)
            .ports(self.ports.iter().map(String::as_str))
            .volume_mount_path(&self.volume_mount_path);
        for (key, value) in &self.env {
            builder = builder.env(key, value);
        }
        if let Some(token) = hf_token {
            builder = builder.env("HF_TOKEN", token);
        }
        builder.build()
    }
}

/// Well-known paths on the pod.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct RemoteLayout {
    /// Persistent workspace that receives uploaded scripts.
    #[serde(default = "default_mount_path")]
    pub workspace_dir: String,
    /// Log written by the start script.
    #[serde(default = "default_startup_log")]
    pub startup_log: String,
    /// Directory the server writes generated files into.
    #[serde(default = "default_remote_output")]
    pub output_dir: String,
    /// Directory the server loads saved workflows from.
    #[serde(default = "default_workflows_dir")]
    pub workflows_dir: String,
    /// Root of the model folders.
    #[serde(default = "default_models_dir")]
    pub models_dir: String,
    /// Ports forwarded by `connect`.
    #[serde(default = "default_tunnel_ports")]
    pub tunnel_ports: Vec<u16>,
    /// Port of the server's web interface.
    #[serde(default = "default_ui_port")]
    pub ui_port: u16,
}

fn default_startup_log() -> String {
    String::from("/workspace/startup.log")
}

fn default_remote_output() -> String {
    String::from("/workspace/ComfyUI/output")
}

fn default_workflows_dir() -> String {
    String::from("/workspace/ComfyUI/user/default/workflows")
}

fn default_models_dir() -> String {
    String::from("/workspace/ComfyUI/models")
}

fn default_tunnel_ports() -> Vec<u16> {
    vec![8888, 3000, 7860]
}

const fn default_ui_port() -> u16 {
    8888
}

impl Default for RemoteLayout {
    fn default() -> Self {
        Self {
            workspace_dir: default_mount_path(),
            startup_log: default_startup_log(),
            output_dir: default_remote_output(),
            workflows_dir: default_workflows_dir(),
            models_dir: default_models_dir(),
            tunnel_ports: default_tunnel_ports(),
            ui_port: default_ui_port(),
        }
    }
}

impl RemoteLayout {
    /// Returns the remote path for a file placed in the workspace.
    #[must_use]
    pub fn workspace_file(&self, file_name: &str) -> String {
        format!("{}/{file_name}", self.workspace_dir.trim_end_matches('/'))
    }

    /// Returns the remote directory for a model category.
    #[must_use]
    pub fn model_dir(&self, category: &str) -> String {
        format!("{}/{category}", self.models_dir.trim_end_matches('/'))
    }
}

/// The loaded template catalogue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Catalog {
    /// Image used by templates without an override.
    pub default_image: String,
    /// Model folders in routing priority order.
    pub model_folders: Vec<String>,
    /// Templates in declaration order.
    pub templates: Vec<InstanceTemplate>,
    /// Paths on the pod.
    pub layout: RemoteLayout,
}

#[derive(Deserialize)]
struct CatalogFile {
    #[serde(default = "default_image")]
    default_image: String,
    #[serde(default = "default_model_folders")]
    model_folders: Vec<String>,
    #[serde(default)]
    templates: Option<serde_yaml::Mapping>,
    #[serde(default)]
    layout: RemoteLayout,
}

impl Default for Catalog {
    fn default() -> Self {
        Self::builtin()
    }
}

impl Catalog {
    /// Returns the built-in catalogue.
    #[must_use]
    pub fn builtin() -> Self {
        let budget = InstanceTemplate {
            setup_script: Some(String::from("setup_hunyuan.py")),
            ..InstanceTemplate::builtin(
                "budget",
                "hunyuan-comfyui-budget",
                "RTX A5000 24GB, lowest cost",
                "NVIDIA RTX A5000",
                CloudTier::Secure,
                24,
                "start_budget.sh",
            )
        };
        Self {
            default_image: default_image(),
            model_folders: default_model_folders(),
            templates: vec![
                InstanceTemplate::builtin(
                    "prod",
                    "ltx2-comfyui-prod",
                    "RTX A6000 48GB, secure cloud",
                    "NVIDIA RTX A6000",
                    CloudTier::Secure,
                    48,
                    "start.sh",
                ),
                InstanceTemplate::builtin(
                    "value",
                    "ltx2-comfyui-value",
                    "A40 48GB, community cloud",
                    "NVIDIA A40",
                    CloudTier::Community,
                    48,
                    "start.sh",
                ),
                budget,
            ],
            layout: RemoteLayout::default(),
        }
    }

    /// Loads the catalogue at `path`, or the built-in one when the file does
    /// not exist.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError`] when the file cannot be read or parsed.
    pub fn load(path: &Utf8Path) -> Result<Self, CatalogError> {
        let Some(content) = read_optional(path).map_err(|err| CatalogError::Read {
            path: path.to_string(),
            message: err.to_string(),
        })?
        else {
            return Ok(Self::builtin());
        };
        Self::parse(&content).map_err(|message| CatalogError::Parse {
            path: path.to_string(),
            message,
        })
    }

    /// Parses a catalogue document. An empty `templates` mapping falls back
    /// to the built-in templates.
    ///
    /// # Errors
    ///
    /// Returns the parser's message when the document is malformed.
    pub fn parse(content: &str) -> Result<Self, String> {
        let file: CatalogFile = serde_yaml::from_str(content).map_err(|err| err.to_string())?;
        let mut templates = Vec::new();
        for (key, value) in file.templates.unwrap_or_default() {
            let key_text = key
                .as_str()
                .ok_or_else(|| String::from("template keys must be strings"))?
                .to_owned();
            let template: InstanceTemplate = serde_yaml::from_value(value)
                .map_err(|err| format!("template {key_text}: {err}"))?;
            templates.push(InstanceTemplate {
                key: key_text,
                ..template
            });
        }
        if templates.is_empty() {
            templates = Self::builtin().templates;
        }
        Ok(Self {
            default_image: file.default_image,
            model_folders: file.model_folders,
            templates,
            layout: file.layout,
        })
    }

    /// Looks up a template by catalogue key.
    ///
    /// # Errors
    ///
    /// Returns [`CatalogError::UnknownTemplate`] listing the valid keys.
    pub fn template(&self, key: &str) -> Result<&InstanceTemplate, CatalogError> {
        self.templates
            .iter()
            .find(|template| template.key == key)
            .ok_or_else(|| CatalogError::UnknownTemplate {
                key: key.to_owned(),
                available: self
                    .templates
                    .iter()
                    .map(|template| template.key.clone())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

/// Errors raised while loading the catalogue.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum CatalogError {
    /// Raised when the catalogue file cannot be read.
    #[error("failed to read catalogue {path}: {message}")]
    Read {
        /// Catalogue path.
        path: String,
        /// Operating system error string.
        message: String,
    },
    /// Raised when the catalogue is not valid YAML or misses fields.
    #[error("invalid catalogue {path}: {message}")]
    Parse {
        /// Catalogue path.
        path: String,
        /// Parser message.
        message: String,
    },
    /// Raised when a template key is not in the catalogue.
    #[error("unknown template '{key}' (available: {available})")]
    UnknownTemplate {
        /// Requested key.
        key: String,
        /// Comma separated list of valid keys.
        available: String,
    },
}
