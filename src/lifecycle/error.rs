//! Errors surfaced while deploying a pod.

use thiserror::Error;

use super::DeployState;
use crate::backend::{CloudTier, ConnectionDescriptor};
use crate::remote::RemoteError;

/// Errors surfaced by [`super::Deployer::deploy`].
#[derive(Debug, Error)]
pub enum DeployError<BackendError>
where
    BackendError: std::error::Error + 'static,
{
    /// Raised when the template cannot be turned into a provider request.
    #[error("template {template} is invalid: {message}")]
    InvalidTemplate {
        /// Catalogue key of the template.
        template: String,
        /// Validation message.
        message: String,
    },
    /// Raised when a provider call other than create fails.
    #[error("{operation} failed: {source}")]
    Provider {
        /// Provider operation that failed.
        operation: String,
        /// Provider error.
        #[source]
        source: BackendError,
    },
    /// Raised when the create request failed on every tier tried.
    #[error("failed to create pod for template {template} on {tier} cloud: {source}")]
    CreateFailed {
        /// Catalogue key of the template.
        template: String,
        /// Tier of the last attempt.
        tier: CloudTier,
        /// Raw provider error from the last attempt.
        #[source]
        source: BackendError,
    },
    /// Raised when the pod did not become reachable in time. The pod is left
    /// running.
    #[error(
        "pod {instance_id} was not reachable after {waited_secs}s (last state: {last_state}); \
         it is still running and billing, terminate it with `podpilot terminate {instance_id}`"
    )]
    TimedOut {
        /// Provider identifier of the pod.
        instance_id: String,
        /// Seconds spent waiting.
        waited_secs: u64,
        /// Last state observed before the deadline.
        last_state: DeployState,
    },
    /// Raised when the pod is reachable but post-provisioning setup failed.
    #[error(transparent)]
    Setup(Box<ProvisioningSetupError>),
}

/// Raised when uploading or launching start scripts fails on a reachable pod.
#[derive(Debug, Error)]
#[error(
    "setup of pod {instance_id} failed at step '{step}': {source}; the pod is running, \
     connect with `{login}`"
)]
pub struct ProvisioningSetupError {
    /// Provider identifier of the pod.
    pub instance_id: String,
    /// Setup step that failed (for example `upload start.sh`).
    pub step: String,
    /// Connection details of the still-usable pod.
    pub descriptor: ConnectionDescriptor,
    /// Login command for the still-usable pod, for example
    /// `ssh -p 22022 root@203.0.113.10`.
    pub login: String,
    /// Remote failure.
    #[source]
    pub source: RemoteError,
}

impl<E: std::error::Error + 'static> From<ProvisioningSetupError> for DeployError<E> {
    fn from(value: ProvisioningSetupError) -> Self {
        Self::Setup(Box::new(value))
    }
}
