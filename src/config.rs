//! Configuration loading via `ortho-config`.
//!
//! Each concern has its own layered struct (defaults, configuration files,
//! environment). [`AppConfig`] gathers them, plus the template catalogue, into
//! one immutable value built once at start-up.

use ortho_config::OrthoConfig;
use serde::Deserialize;
use thiserror::Error;

use crate::catalog::{Catalog, CatalogError};
use crate::remote::SshConfig;

/// GraphQL endpoint used when none is configured.
pub const DEFAULT_API_URL: &str = "https://api.runpod.io/graphql";

/// RunPod API settings derived from `RUNPOD_*` environment variables and
/// configuration files.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "RUNPOD")]
pub struct ProviderConfig {
    /// API key sent as a bearer token. Required for every provider call.
    #[ortho_config(default = String::new())]
    pub api_key: String,
    /// GraphQL endpoint.
    #[ortho_config(default = DEFAULT_API_URL.to_owned())]
    pub api_url: String,
    /// Per-request HTTP timeout in seconds.
    #[ortho_config(default = 30)]
    pub request_timeout_secs: u64,
}

/// Local paths used by the operations.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(
    prefix = "PODPILOT",
    discovery(
        app_name = "podpilot",
        env_var = "PODPILOT_CONFIG_PATH",
        config_file_name = "podpilot.toml",
        dotfile_name = ".podpilot.toml",
        project_file_name = "podpilot.toml"
    )
)]
pub struct WorkspaceConfig {
    /// YAML template catalogue. Built-in templates apply when it is absent.
    #[ortho_config(default = "podpilot.yaml".to_owned())]
    pub catalog_path: String,
    /// Directory that receives pulled outputs.
    #[ortho_config(default = "output".to_owned())]
    pub output_dir: String,
    /// Environment file uploaded to new pods when present.
    #[ortho_config(default = ".env".to_owned())]
    pub env_file: String,
    /// Directory holding template start scripts.
    #[ortho_config(default = "docker".to_owned())]
    pub start_scripts_dir: String,
    /// Directory holding model setup scripts.
    #[ortho_config(default = "scripts".to_owned())]
    pub setup_scripts_dir: String,
}

/// Hugging Face credentials forwarded to pods.
#[derive(Clone, Debug, Deserialize, OrthoConfig, PartialEq, Eq)]
#[ortho_config(prefix = "HF")]
pub struct HuggingFaceConfig {
    /// Access token injected into pod environments as `HF_TOKEN`.
    pub token: Option<String>,
}

/// Metadata for a configuration field, used to generate actionable error messages.
struct FieldMetadata {
    description: &'static str,
    env_var: &'static str,
    toml_key: &'static str,
}

impl FieldMetadata {
    const fn new(description: &'static str, env_var: &'static str, toml_key: &'static str) -> Self {
        Self {
            description,
            env_var,
            toml_key,
        }
    }

    fn require(&self, value: &str) -> Result<(), ConfigError> {
        if value.trim().is_empty() {
            return Err(ConfigError::MissingField(format!(
                "missing {}: set {} or add {} to podpilot.toml",
                self.description, self.env_var, self.toml_key
            )));
        }
        Ok(())
    }
}

impl ProviderConfig {
    /// Loads configuration without parsing CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("podpilot")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Checks that the key and endpoint are present.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] naming the variable to set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        FieldMetadata::new("RunPod API key", "RUNPOD_API_KEY", "api_key").require(&self.api_key)?;
        FieldMetadata::new("RunPod API URL", "RUNPOD_API_URL", "api_url").require(&self.api_url)?;
        Ok(())
    }
}

impl WorkspaceConfig {
    /// Loads configuration without parsing CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("podpilot")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Checks that every path is non-empty.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingField`] naming the variable to set.
    pub fn validate(&self) -> Result<(), ConfigError> {
        FieldMetadata::new("catalogue path", "PODPILOT_CATALOG_PATH", "catalog_path")
            .require(&self.catalog_path)?;
        FieldMetadata::new("output directory", "PODPILOT_OUTPUT_DIR", "output_dir")
            .require(&self.output_dir)?;
        FieldMetadata::new("environment file", "PODPILOT_ENV_FILE", "env_file")
            .require(&self.env_file)?;
        Ok(())
    }
}

impl HuggingFaceConfig {
    /// Loads configuration without parsing CLI arguments.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] when the merge fails.
    pub fn load_without_cli_args() -> Result<Self, ConfigError> {
        Self::load_from_iter([std::ffi::OsString::from("podpilot")])
            .map_err(|err| ConfigError::Parse(err.to_string()))
    }

    /// Returns the token when it is set and non-blank.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.token
            .as_deref()
            .map(str::trim)
            .filter(|token| !token.is_empty())
    }
}

/// Immutable configuration shared by every operation.
#[derive(Clone, Debug)]
pub struct AppConfig {
    /// Provider credentials and endpoint.
    pub provider: ProviderConfig,
    /// SSH client settings.
    pub ssh: SshConfig,
    /// Local paths.
    pub workspace: WorkspaceConfig,
    /// Hugging Face credentials.
    pub hugging_face: HuggingFaceConfig,
    /// Template catalogue.
    pub catalog: Catalog,
}

impl AppConfig {
    /// Loads every configuration layer and the template catalogue.
    ///
    /// Provider credentials are not validated here so commands that never
    /// call the provider (for example `templates`) work without them.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when any layer fails to load or validate.
    pub fn load() -> Result<Self, ConfigError> {
        let provider = ProviderConfig::load_without_cli_args()?;
        let ssh = SshConfig::load_without_cli_args()
            .map_err(|err| ConfigError::Parse(err.to_string()))?;
        ssh.validate()
            .map_err(|err| ConfigError::MissingField(err.to_string()))?;
        let workspace = WorkspaceConfig::load_without_cli_args()?;
        workspace.validate()?;
        let hugging_face = HuggingFaceConfig::load_without_cli_args()?;
        let catalog = Catalog::load(camino::Utf8Path::new(&workspace.catalog_path))?;
        Ok(Self {
            provider,
            ssh,
            workspace,
            hugging_face,
            catalog,
        })
    }
}

/// Errors raised during configuration loading and validation.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum ConfigError {
    /// Indicates a required configuration field is empty or missing.
    #[error("{0}")]
    MissingField(String),
    /// Surfaces errors from the `ortho-config` loader.
    #[error("configuration parsing failed: {0}")]
    Parse(String),
    /// Surfaces catalogue loading failures.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
}
