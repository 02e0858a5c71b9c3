//! RunPod backend implementation of the provider boundary.
//!
//! All calls go to the GraphQL endpoint with the API key as a bearer token.
//! Provider errors arrive in the response's `errors` array and are surfaced
//! as [`RunPodBackendError::Api`] with the operation name attached.

mod error;
mod queries;
mod types;

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::backend::{Backend, BackendFuture, InstanceRecord, InstanceRequest};
use crate::config::ProviderConfig;
use types::{DeployData, GraphQlRequest, GraphQlResponse, MyselfData, PodData, TerminateData};

pub use error::RunPodBackendError;

const BODY_SNIPPET_LIMIT: usize = 200;

/// Backend that manages pods through the RunPod GraphQL API.
#[derive(Clone, Debug)]
pub struct RunPodBackend {
    client: Client,
    config: ProviderConfig,
}

impl RunPodBackend {
    /// Constructs a new backend from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`RunPodBackendError::Config`] when the configuration fails
    /// validation or the HTTP client cannot be built.
    pub fn new(config: ProviderConfig) -> Result<Self, RunPodBackendError> {
        config.validate()?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|err| RunPodBackendError::Config(err.to_string()))?;
        Ok(Self { client, config })
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        operation: &str,
        query: &str,
    ) -> Result<T, RunPodBackendError> {
        debug!(operation, "sending GraphQL request");
        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&GraphQlRequest { query })
            .send()
            .await
            .map_err(|err| RunPodBackendError::Http {
                operation: operation.to_owned(),
                message: err.without_url().to_string(),
            })?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| RunPodBackendError::Http {
                operation: operation.to_owned(),
                message: err.without_url().to_string(),
            })?;
        decode_response(operation, status, &body)
    }
}

/// Turns a GraphQL response body into the operation's data.
pub(crate) fn decode_response<T: DeserializeOwned>(
    operation: &str,
    status: StatusCode,
    body: &str,
) -> Result<T, RunPodBackendError> {
    let parsed: Result<GraphQlResponse<T>, _> = serde_json::from_str(body);
    match parsed {
        Ok(response) if !response.errors.is_empty() => Err(RunPodBackendError::Api {
            operation: operation.to_owned(),
            message: response
                .errors
                .into_iter()
                .map(|error| error.message)
                .collect::<Vec<_>>()
                .join("; "),
        }),
        Ok(_) | Err(_) if !status.is_success() => Err(RunPodBackendError::Status {
            operation: operation.to_owned(),
            status: status.as_u16(),
            body: body.chars().take(BODY_SNIPPET_LIMIT).collect(),
        }),
        Ok(response) => response.data.ok_or_else(|| RunPodBackendError::Decode {
            operation: operation.to_owned(),
            message: String::from("response carried no data"),
        }),
        Err(err) => Err(RunPodBackendError::Decode {
            operation: operation.to_owned(),
            message: err.to_string(),
        }),
    }
}

impl Backend for RunPodBackend {
    type Error = RunPodBackendError;

    fn list_instances(&self) -> BackendFuture<'_, Vec<InstanceRecord>, Self::Error> {
        Box::pin(async move {
            let data: MyselfData = self.execute("list pods", &queries::list_pods()).await?;
            Ok(data
                .myself
                .pods
                .into_iter()
                .map(InstanceRecord::from)
                .collect())
        })
    }

    fn get_instance<'a>(&'a self, id: &'a str) -> BackendFuture<'a, InstanceRecord, Self::Error> {
        Box::pin(async move {
            let data: PodData = self.execute("get pod", &queries::get_pod(id)).await?;
            data.pod
                .map(InstanceRecord::from)
                .ok_or_else(|| RunPodBackendError::NotFound {
                    instance_id: id.to_owned(),
                })
        })
    }

    fn create_instance<'a>(
        &'a self,
        request: &'a InstanceRequest,
    ) -> BackendFuture<'a, InstanceRecord, Self::Error> {
        Box::pin(async move {
            request.validate()?;
            let data: DeployData = self
                .execute("create pod", &queries::deploy_pod(request))
                .await?;
            let record = data
                .pod_find_and_deploy_on_demand
                .map(InstanceRecord::from)
                .ok_or_else(|| RunPodBackendError::NoCapacity {
                    gpu_type_id: request.gpu_type_id.clone(),
                    cloud_tier: request.cloud_tier.to_string(),
                })?;
            info!(instance_id = %record.id, name = %record.name, "pod created");
            Ok(record)
        })
    }

    fn terminate_instance<'a>(&'a self, id: &'a str) -> BackendFuture<'a, (), Self::Error> {
        Box::pin(async move {
            let data: TerminateData = self
                .execute("terminate pod", &queries::terminate_pod(id))
                .await?;
            info!(instance_id = id, response = ?data.pod_terminate, "pod terminated");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests;
