//! Provider abstraction for renting GPU pods and reading their state.
//!
//! The types in this module are the crate's view of the provider: requests
//! built from templates, snapshots of running pods, and the connection
//! descriptor derived from a reachable snapshot.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Port used for remote command execution and file transfer.
pub const CONTROL_PORT: u16 = 22;

/// Domain suffix of the provider-assigned hostname used when a control port
/// mapping carries no explicit IP address.
pub const PROVIDER_HOST_SUFFIX: &str = "runpod.io";

/// Provider-side availability and pricing class.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CloudTier {
    /// Higher-availability datacentre capacity.
    Secure,
    /// Cheaper, less available community capacity.
    Community,
}

impl CloudTier {
    /// Returns the provider's wire name for the tier.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Secure => "SECURE",
            Self::Community => "COMMUNITY",
        }
    }

    /// Returns the tier to resubmit with after a failed create, if any.
    #[must_use]
    pub const fn fallback(self) -> Option<Self> {
        match self {
            Self::Community => Some(Self::Secure),
            Self::Secure => None,
        }
    }
}

impl fmt::Display for CloudTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status the provider is driving a pod towards.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DesiredStatus {
    /// Scheduled but not yet running.
    Pending,
    /// Running (not necessarily reachable yet).
    Running,
    /// Stopped; the volume is retained.
    Stopped,
    /// Terminated; the pod is gone.
    Terminated,
}

impl DesiredStatus {
    /// Maps the provider's status string. Unknown values (for example
    /// `CREATED` or `RESTARTING`) are treated as pending.
    #[must_use]
    pub fn from_provider(value: &str) -> Self {
        match value.trim().to_ascii_uppercase().as_str() {
            "RUNNING" => Self::Running,
            "EXITED" | "STOPPED" => Self::Stopped,
            "TERMINATED" => Self::Terminated,
            _ => Self::Pending,
        }
    }

    /// Returns the upper-case label used in listings.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Stopped => "STOPPED",
            Self::Terminated => "TERMINATED",
        }
    }
}

impl fmt::Display for DesiredStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hardware details reported for a pod.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MachineInfo {
    /// Display name of the GPU (for example `RTX A6000`).
    pub gpu_name: String,
    /// Provider host identifier used to build the fallback hostname.
    pub host_id: Option<String>,
}

/// A single exposed-port mapping from the pod runtime.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PortMapping {
    /// Port inside the pod.
    pub private_port: u16,
    /// Port reachable from outside.
    pub public_port: u16,
    /// Public address of the mapping, when the provider reports one.
    pub ip: Option<String>,
    /// Whether the mapping is publicly reachable.
    pub is_public: bool,
}

/// Runtime section of a pod snapshot. Absent until the container starts.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct RuntimeInfo {
    /// Exposed port mappings.
    pub ports: Vec<PortMapping>,
}

/// Provider snapshot of a pod, read fresh on every poll.
#[derive(Clone, Debug, PartialEq)]
pub struct InstanceRecord {
    /// Provider identifier.
    pub id: String,
    /// Logical name the pod was created with.
    pub name: String,
    /// Status the provider is driving the pod towards.
    pub desired_status: DesiredStatus,
    /// Hardware details.
    pub machine: MachineInfo,
    /// Runtime details; `None` while the pod is not yet started.
    pub runtime: Option<RuntimeInfo>,
    /// Hourly cost in US dollars.
    pub cost_per_hour: f64,
}

impl InstanceRecord {
    /// Returns the public control-port mapping, if the runtime exposes one.
    #[must_use]
    pub fn control_mapping(&self) -> Option<&PortMapping> {
        self.runtime.as_ref().and_then(|runtime| {
            runtime
                .ports
                .iter()
                .find(|mapping| mapping.private_port == CONTROL_PORT && mapping.is_public)
        })
    }

    /// Returns `true` when the pod is running and its control port is
    /// publicly reachable.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.desired_status == DesiredStatus::Running && self.control_mapping().is_some()
    }
}

/// Raised when an operation targets a pod without a usable endpoint.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
#[error("instance {instance_id} is not reachable (status {status}, no public port {CONTROL_PORT} mapping)")]
pub struct NotReachableError {
    /// Provider identifier of the pod.
    pub instance_id: String,
    /// Status observed when the check failed.
    pub status: DesiredStatus,
}

/// Short-lived connection details for a reachable pod.
#[derive(Clone, Debug, PartialEq)]
pub struct ConnectionDescriptor {
    /// Provider identifier of the pod.
    pub instance_id: String,
    /// Logical pod name.
    pub name: String,
    /// Address to connect to (IP or provider hostname).
    pub address: String,
    /// Public port mapped to the control port.
    pub port: u16,
    /// GPU display name.
    pub gpu: String,
    /// Hourly cost in US dollars.
    pub cost_per_hour: f64,
}

impl ConnectionDescriptor {
    /// Derives connection details from a usable snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`NotReachableError`] when the pod is not running or lacks a
    /// public control-port mapping.
    pub fn from_record(record: &InstanceRecord) -> Result<Self, NotReachableError> {
        let not_reachable = || NotReachableError {
            instance_id: record.id.clone(),
            status: record.desired_status,
        };
        if record.desired_status != DesiredStatus::Running {
            return Err(not_reachable());
        }
        let mapping = record.control_mapping().ok_or_else(not_reachable)?;

        let address = match mapping.ip.as_deref().map(str::trim) {
            Some(ip) if !ip.is_empty() => ip.to_owned(),
            _ => {
                let host_id = record
                    .machine
                    .host_id
                    .as_deref()
                    .filter(|host| !host.trim().is_empty())
                    .ok_or_else(not_reachable)?;
                format!("{host_id}.{PROVIDER_HOST_SUFFIX}")
            }
        };

        Ok(Self {
            instance_id: record.id.clone(),
            name: record.name.clone(),
            address,
            port: mapping.public_port,
            gpu: record.machine.gpu_name.clone(),
            cost_per_hour: record.cost_per_hour,
        })
    }

    /// Returns the provider's HTTPS proxy URL for a pod port.
    #[must_use]
    pub fn proxy_url(&self, port: u16) -> String {
        format!("https://{}-{port}.proxy.runpod.net/", self.instance_id)
    }
}

/// Parameters required to create a new pod.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceRequest {
    /// Logical pod name; also the key used to find a pod for reuse.
    pub name: String,
    /// Container image to boot.
    pub image_name: String,
    /// Provider GPU type identifier (for example `NVIDIA RTX A6000`).
    pub gpu_type_id: String,
    /// Cloud tier to request.
    pub cloud_tier: CloudTier,
    /// Number of GPUs.
    pub gpu_count: u32,
    /// Minimum GPU memory in gigabytes. Informational only: the deploy
    /// mutation selects hardware by `gpu_type_id`, which already fixes the
    /// memory, so this value is recorded from the template but never sent.
    pub min_vram_gb: u32,
    /// Minimum system memory in gigabytes.
    pub min_memory_gb: u32,
    /// Container disk size in gigabytes.
    pub container_disk_gb: u32,
    /// Persistent volume size in gigabytes.
    pub volume_gb: u32,
    /// Exposed ports in provider notation (`8888/http`, `22/tcp`).
    pub ports: Vec<String>,
    /// Mount path of the persistent volume.
    pub volume_mount_path: String,
    /// Environment variables passed to the container.
    pub env: BTreeMap<String, String>,
}

impl InstanceRequest {
    /// Starts a builder for an [`InstanceRequest`].
    #[must_use]
    pub fn builder() -> InstanceRequestBuilder {
        InstanceRequestBuilder::new()
    }

    /// Returns a copy of the request targeting another cloud tier.
    #[must_use]
    pub fn with_tier(&self, tier: CloudTier) -> Self {
        Self {
            cloud_tier: tier,
            ..self.clone()
        }
    }

    /// Returns the ports as the provider's comma separated list.
    #[must_use]
    pub fn ports_spec(&self) -> String {
        self.ports.join(",")
    }

    /// Validates the request, returning a descriptive error when a required
    /// field is missing.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Validation`] when a required field is empty.
    pub fn validate(&self) -> Result<(), BackendError> {
        if self.name.is_empty() {
            return Err(BackendError::Validation("name".to_owned()));
        }
        if self.image_name.is_empty() {
            return Err(BackendError::Validation("image_name".to_owned()));
        }
        if self.gpu_type_id.is_empty() {
            return Err(BackendError::Validation("gpu_type_id".to_owned()));
        }
        if self.gpu_count == 0 {
            return Err(BackendError::Validation("gpu_count".to_owned()));
        }
        if !self
            .ports
            .iter()
            .any(|port| port.split('/').next() == Some("22"))
        {
            return Err(BackendError::Validation("ports (22/tcp required)".to_owned()));
        }
        Ok(())
    }
}

/// Builder for [`InstanceRequest`] that defers trimming and validation to
/// construction.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct InstanceRequestBuilder {
    name: String,
    image_name: String,
    gpu_type_id: String,
    cloud_tier: CloudTier,
    gpu_count: u32,
    min_vram_gb: u32,
    min_memory_gb: u32,
    container_disk_gb: u32,
    volume_gb: u32,
    ports: Vec<String>,
    volume_mount_path: String,
    env: BTreeMap<String, String>,
}

impl Default for InstanceRequestBuilder {
    fn default() -> Self {
        Self {
            name: String::new(),
            image_name: String::new(),
            gpu_type_id: String::new(),
            cloud_tier: CloudTier::Secure,
            gpu_count: 1,
            min_vram_gb: 0,
            min_memory_gb: 0,
            container_disk_gb: 0,
            volume_gb: 0,
            ports: Vec::new(),
            volume_mount_path: String::new(),
            env: BTreeMap::new(),
        }
    }
}

impl InstanceRequestBuilder {
    /// Creates a builder requesting one GPU on the secure tier.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the pod name.
    #[must_use]
    pub fn name(mut self, value: impl Into<String>) -> Self {
        self.name = value.into();
        self
    }

    /// Sets the container image.
    #[must_use]
    pub fn image_name(mut self, value: impl Into<String>) -> Self {
        self.image_name = value.into();
        self
    }

    /// Sets the GPU type identifier.
    #[must_use]
    pub fn gpu_type_id(mut self, value: impl Into<String>) -> Self {
        self.gpu_type_id = value.into();
        self
    }

    /// Sets the cloud tier.
    #[must_use]
    pub const fn cloud_tier(mut self, value: CloudTier) -> Self {
        self.cloud_tier = value;
        self
    }

    /// Sets the GPU count.
    #[must_use]
    pub const fn gpu_count(mut self, value: u32) -> Self {
        self.gpu_count = value;
        self
    }

    /// Sets the minimum GPU memory.
    #[must_use]
    pub const fn min_vram_gb(mut self, value: u32) -> Self {
        self.min_vram_gb = value;
        self
    }

    /// Sets the minimum system memory.
    #[must_use]
    pub const fn min_memory_gb(mut self, value: u32) -> Self {
        self.min_memory_gb = value;
        self
    }

    /// Sets the container disk size.
    #[must_use]
    pub const fn container_disk_gb(mut self, value: u32) -> Self {
        self.container_disk_gb = value;
        self
    }

    /// Sets the volume size.
    #[must_use]
    pub const fn volume_gb(mut self, value: u32) -> Self {
        self.volume_gb = value;
        self
    }

    /// Sets the exposed ports.
    #[must_use]
    pub fn ports<I, P>(mut self, ports: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: Into<String>,
    {
        self.ports = ports.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the volume mount path.
    #[must_use]
    pub fn volume_mount_path(mut self, value: impl Into<String>) -> Self {
        self.volume_mount_path = value.into();
        self
    }

    /// Adds an environment variable.
    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Builds and validates the [`InstanceRequest`], trimming string inputs.
    ///
    /// # Errors
    ///
    /// Returns [`BackendError::Validation`] when any required field is empty.
    pub fn build(self) -> Result<InstanceRequest, BackendError> {
        let request = InstanceRequest {
            name: self.name.trim().to_owned(),
            image_name: self.image_name.trim().to_owned(),
            gpu_type_id: self.gpu_type_id.trim().to_owned(),
            cloud_tier: self.cloud_tier,
            gpu_count: self.gpu_count,
            min_vram_gb: self.min_vram_gb,
            min_memory_gb: self.min_memory_gb,
            container_disk_gb: self.container_disk_gb,
            volume_gb: self.volume_gb,
            ports: self
                .ports
                .iter()
                .map(|port| port.trim().to_owned())
                .filter(|port| !port.is_empty())
                .collect(),
            volume_mount_path: self.volume_mount_path.trim().to_owned(),
            env: self.env,
        };
        request.validate()?;
        Ok(request)
    }
}

/// Errors raised by backends before any provider call is made.
#[derive(Debug, Error, Eq, PartialEq)]
pub enum BackendError {
    /// Raised when a request is missing a required field.
    #[error("missing or empty field: {0}")]
    Validation(String),
}

/// Future returned by backend operations.
pub type BackendFuture<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + Send + 'a>>;

/// Minimal interface implemented by GPU cloud providers.
pub trait Backend {
    /// Provider specific error type returned by the backend.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Lists every pod visible to the account.
    fn list_instances(&self) -> BackendFuture<'_, Vec<InstanceRecord>, Self::Error>;

    /// Fetches the current snapshot of one pod.
    fn get_instance<'a>(&'a self, id: &'a str) -> BackendFuture<'a, InstanceRecord, Self::Error>;

    /// Submits a create request and returns the provider's first snapshot.
    fn create_instance<'a>(
        &'a self,
        request: &'a InstanceRequest,
    ) -> BackendFuture<'a, InstanceRecord, Self::Error>;

    /// Terminates a pod, releasing its volume and stopping billing.
    fn terminate_instance<'a>(&'a self, id: &'a str) -> BackendFuture<'a, (), Self::Error>;
}
