//! Error types for the RunPod backend.

use thiserror::Error;

use crate::backend::BackendError;
use crate::config::ConfigError;

/// Errors raised by the RunPod backend.
#[derive(Clone, Debug, Error, Eq, PartialEq)]
pub enum RunPodBackendError {
    /// Raised when the provider configuration is incomplete.
    #[error("configuration error: {0}")]
    Config(String),
    /// Raised when a request is missing a required field.
    #[error("invalid pod request: {0}")]
    Validation(String),
    /// Raised when the HTTP exchange itself failed.
    #[error("{operation}: request failed: {message}")]
    Http {
        /// GraphQL operation being performed.
        operation: String,
        /// Transport error message.
        message: String,
    },
    /// Raised when the endpoint answered with a non-success status.
    #[error("{operation}: HTTP {status}: {body}")]
    Status {
        /// GraphQL operation being performed.
        operation: String,
        /// HTTP status code.
        status: u16,
        /// Start of the response body.
        body: String,
    },
    /// Raised when the response carried GraphQL errors.
    #[error("{operation}: {message}")]
    Api {
        /// GraphQL operation being performed.
        operation: String,
        /// Error messages reported by the provider.
        message: String,
    },
    /// Raised when the response could not be decoded.
    #[error("{operation}: unexpected response: {message}")]
    Decode {
        /// GraphQL operation being performed.
        operation: String,
        /// Decoder message.
        message: String,
    },
    /// Raised when the provider has no pod with the requested id.
    #[error("pod {instance_id} not found")]
    NotFound {
        /// Requested pod id.
        instance_id: String,
    },
    /// Raised when the provider accepted a create request but returned no pod.
    #[error("no {cloud_tier} capacity for {gpu_type_id}")]
    NoCapacity {
        /// Requested GPU type.
        gpu_type_id: String,
        /// Requested cloud tier.
        cloud_tier: String,
    },
}

impl From<BackendError> for RunPodBackendError {
    fn from(value: BackendError) -> Self {
        match value {
            BackendError::Validation(field) => Self::Validation(field),
        }
    }
}

impl From<ConfigError> for RunPodBackendError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value.to_string())
    }
}
