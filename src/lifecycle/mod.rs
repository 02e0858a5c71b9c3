//! Instance lifecycle controller: create or reuse a pod, wait until it is
//! reachable, then run post-provisioning setup.
//!
//! The deploy flow moves through [`DeployState`]s and logs every transition.
//! A pod that never becomes reachable is left running; the error says so.

use std::cell::Cell;
use std::fmt;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{Instrument, info, info_span, warn};
use uuid::Uuid;

use crate::backend::{
    Backend, ConnectionDescriptor, DesiredStatus, InstanceRecord, InstanceRequest,
};
use crate::catalog::{InstanceTemplate, RemoteLayout};
use crate::poll::{Probe, poll_until};
use crate::remote::{CommandRunner, RemoteClient};
use crate::retry::{Sleeper, ThreadSleeper};

mod error;
mod setup;

pub use error::{DeployError, ProvisioningSetupError};
pub use setup::{SetupOutcome, SetupSources, launch_command};

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const WAIT_TIMEOUT: Duration = Duration::from_secs(300);
const SETTLE_DELAY: Duration = Duration::from_secs(5);

/// Progress of a deploy.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum DeployState {
    /// Looking for a pod to reuse.
    Requested,
    /// A pod exists but is not running yet.
    Provisioning,
    /// The pod runs but exposes no public control port yet.
    RunningUnreachable,
    /// The pod is usable.
    RunningReachable,
    /// Connection details are ready.
    Provisioned,
    /// The create request failed.
    Failed,
    /// The pod did not become reachable in time.
    TimedOut,
}

impl fmt::Display for DeployState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Requested => "requested",
            Self::Provisioning => "provisioning",
            Self::RunningUnreachable => "running-unreachable",
            Self::RunningReachable => "running-reachable",
            Self::Provisioned => "provisioned",
            Self::Failed => "failed",
            Self::TimedOut => "timed-out",
        })
    }
}

/// Caller choices for one deploy.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct DeployOptions {
    /// Skip uploading and launching the start scripts.
    pub skip_setup: bool,
    /// Hugging Face token added to the pod environment.
    pub hf_token: Option<String>,
}

/// Result of a successful deploy.
#[derive(Clone, Debug, PartialEq)]
pub struct Deployment {
    /// Connection details of the usable pod.
    pub descriptor: ConnectionDescriptor,
    /// Whether an existing running pod was reused.
    pub reused: bool,
    /// What post-provisioning setup did.
    pub setup: SetupOutcome,
}

/// Drives pods from template to usable connection.
#[derive(Debug)]
pub struct Deployer<B, R: CommandRunner, S: Sleeper = ThreadSleeper> {
    backend: B,
    remote: RemoteClient<R, S>,
    default_image: String,
    layout: RemoteLayout,
    sources: SetupSources,
    poll_interval: Duration,
    wait_timeout: Duration,
    settle_delay: Duration,
}

impl<B, R, S> Deployer<B, R, S>
where
    B: Backend,
    R: CommandRunner,
    S: Sleeper,
{
    /// Creates a deployer with the default 5 s poll interval, 300 s
    /// reachability timeout and 5 s settle delay.
    #[must_use]
    pub const fn new(
        backend: B,
        remote: RemoteClient<R, S>,
        default_image: String,
        layout: RemoteLayout,
        sources: SetupSources,
    ) -> Self {
        Self {
            backend,
            remote,
            default_image,
            layout,
            sources,
            poll_interval: POLL_INTERVAL,
            wait_timeout: WAIT_TIMEOUT,
            settle_delay: SETTLE_DELAY,
        }
    }

    /// Overrides the status polling interval.
    #[must_use]
    pub const fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Overrides how long to wait for the pod to become reachable.
    #[must_use]
    pub const fn with_wait_timeout(mut self, timeout: Duration) -> Self {
        self.wait_timeout = timeout;
        self
    }

    /// Overrides the pause between reachability and setup.
    #[must_use]
    pub const fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Returns the backend.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Returns the remote client used for setup.
    #[must_use]
    pub const fn remote(&self) -> &RemoteClient<R, S> {
        &self.remote
    }

    /// Creates or reuses a pod for `template` and waits until it is usable.
    ///
    /// # Errors
    ///
    /// Returns [`DeployError`] when the provider rejects the request, the pod
    /// does not become reachable in time, or setup fails.
    pub async fn deploy(
        &self,
        template: &InstanceTemplate,
        options: &DeployOptions,
    ) -> Result<Deployment, DeployError<B::Error>> {
        let span = info_span!("deploy", request_id = %Uuid::new_v4(), template = %template.key);
        self.deploy_inner(template, options).instrument(span).await
    }

    async fn deploy_inner(
        &self,
        template: &InstanceTemplate,
        options: &DeployOptions,
    ) -> Result<Deployment, DeployError<B::Error>> {
        transition(DeployState::Requested, None);
        let request = template
            .to_request(&self.default_image, options.hf_token.as_deref())
            .map_err(|err| DeployError::InvalidTemplate {
                template: template.key.clone(),
                message: err.to_string(),
            })?;

        let (record, reused) = match self.find_running(&request.name).await? {
            Some(existing) => {
                info!(instance_id = %existing.id, name = %existing.name, "reusing running pod");
                (existing, true)
            }
            None => (self.create_with_fallback(template, &request).await?, false),
        };

        transition(DeployState::Provisioning, Some(&record.id));
        let descriptor = self.wait_until_reachable(&record.id).await?;
        transition(DeployState::Provisioned, Some(&descriptor.instance_id));

        let setup = if options.skip_setup {
            info!(instance_id = %descriptor.instance_id, "setup skipped");
            SetupOutcome::Skipped
        } else {
            sleep(self.settle_delay).await;
            setup::upload_and_launch(
                &self.remote,
                &self.layout,
                &self.sources,
                &descriptor,
                template,
            )?
        };

        Ok(Deployment {
            descriptor,
            reused,
            setup,
        })
    }

    async fn find_running(
        &self,
        name: &str,
    ) -> Result<Option<InstanceRecord>, DeployError<B::Error>> {
        let records = self
            .backend
            .list_instances()
            .await
            .map_err(|source| DeployError::Provider {
                operation: String::from("list pods"),
                source,
            })?;
        Ok(records
            .into_iter()
            .find(|record| record.name == name && record.desired_status == DesiredStatus::Running))
    }

    async fn create_with_fallback(
        &self,
        template: &InstanceTemplate,
        request: &InstanceRequest,
    ) -> Result<InstanceRecord, DeployError<B::Error>> {
        info!(tier = %request.cloud_tier, gpu = %request.gpu_type_id, "creating pod");
        let first = match self.backend.create_instance(request).await {
            Ok(record) => return Ok(record),
            Err(err) => err,
        };

        let Some(fallback) = request.cloud_tier.fallback() else {
            transition(DeployState::Failed, None);
            return Err(DeployError::CreateFailed {
                template: template.key.clone(),
                tier: request.cloud_tier,
                source: first,
            });
        };

        warn!(
            tier = %request.cloud_tier,
            fallback = %fallback,
            error = %first,
            "create failed, retrying once on the fallback tier"
        );
        let retried = request.with_tier(fallback);
        self.backend
            .create_instance(&retried)
            .await
            .map_err(|source| {
                transition(DeployState::Failed, None);
                DeployError::CreateFailed {
                    template: template.key.clone(),
                    tier: fallback,
                    source,
                }
            })
    }

    async fn wait_until_reachable(
        &self,
        id: &str,
    ) -> Result<ConnectionDescriptor, DeployError<B::Error>> {
        let last_state = Cell::new(DeployState::Provisioning);
        let outcome = poll_until(self.poll_interval, self.wait_timeout, || {
            let last = &last_state;
            let backend = &self.backend;
            async move {
                let record = match backend.get_instance(id).await {
                    Ok(record) => record,
                    Err(err) => {
                        warn!(instance_id = id, error = %err, "status check failed; polling again");
                        return Probe::Pending;
                    }
                };
                if let Ok(descriptor) = ConnectionDescriptor::from_record(&record) {
                    transition(DeployState::RunningReachable, Some(id));
                    return Probe::Ready(descriptor);
                }
                let observed = if record.desired_status == DesiredStatus::Running {
                    DeployState::RunningUnreachable
                } else {
                    DeployState::Provisioning
                };
                if last.replace(observed) != observed {
                    transition(observed, Some(id));
                }
                Probe::Pending
            }
        })
        .await;

        outcome.map_err(|timeout| {
            transition(DeployState::TimedOut, Some(id));
            DeployError::TimedOut {
                instance_id: id.to_owned(),
                waited_secs: timeout.waited.as_secs(),
                last_state: last_state.get(),
            }
        })
    }
}

fn transition(state: DeployState, instance_id: Option<&str>) {
    info!(state = %state, instance_id = instance_id.unwrap_or("-"), "deploy state changed");
}
