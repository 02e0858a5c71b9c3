//! Core library for the `podpilot` GPU pod orchestrator.
//!
//! The crate provisions RunPod pods from a template catalogue, waits until
//! their SSH port is reachable, launches start scripts, and then drives the
//! pods over `ssh`/`scp`: status reports, log tailing, file transfer, port
//! forwarding and model downloads routed into folders.

pub mod backend;
pub mod catalog;
pub mod config;
pub mod console;
pub mod ingest;
pub mod lifecycle;
mod local;
pub mod menu;
pub mod operations;
pub mod poll;
pub mod remote;
pub mod resolver;
pub mod retry;
pub mod runpod;
pub mod test_support;

pub use backend::{
    Backend, CloudTier, ConnectionDescriptor, DesiredStatus, InstanceRecord, InstanceRequest,
    InstanceRequestBuilder, NotReachableError,
};
pub use catalog::{Catalog, CatalogError, InstanceTemplate, RemoteLayout};
pub use config::{AppConfig, ConfigError, HuggingFaceConfig, ProviderConfig, WorkspaceConfig};
pub use console::{Console, StdConsole};
pub use ingest::{Classification, ClassifiedUrl, Classifier};
pub use lifecycle::{
    DeployError, DeployOptions, DeployState, Deployer, Deployment, ProvisioningSetupError,
    SetupOutcome, SetupSources,
};
pub use menu::run_menu;
pub use operations::{OperationError, Operations, show_templates};
pub use remote::{
    CommandOutput, CommandRunner, ProcessCommandRunner, RemoteClient, RemoteCommandOutput,
    RemoteError, ShellCommand, SshConfig,
};
pub use resolver::TargetResolver;
pub use retry::{RetryPolicy, Sleeper, ThreadSleeper, retry};
pub use runpod::{RunPodBackend, RunPodBackendError};
