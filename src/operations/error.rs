//! Errors surfaced by operator-facing operations.

use camino::Utf8PathBuf;
use thiserror::Error;

use crate::backend::NotReachableError;
use crate::catalog::CatalogError;
use crate::lifecycle::DeployError;
use crate::remote::RemoteError;

/// Errors raised while running an operation.
#[derive(Debug, Error)]
pub enum OperationError<BackendError>
where
    BackendError: std::error::Error + 'static,
{
    /// Raised when a provider call fails.
    #[error("{operation} failed: {source}")]
    Provider {
        /// Provider operation that failed.
        operation: String,
        /// Instance the call targeted, when known.
        instance_id: Option<String>,
        /// Provider error.
        #[source]
        source: BackendError,
    },
    /// Raised when a deploy fails.
    #[error(transparent)]
    Deploy(Box<DeployError<BackendError>>),
    /// Raised when a remote command or transfer fails.
    #[error(transparent)]
    Remote(#[from] RemoteError),
    /// Raised when the selected pod has no usable endpoint.
    #[error(transparent)]
    NotReachable(#[from] NotReachableError),
    /// Raised when a template lookup fails.
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    /// Raised when a local file to upload does not exist.
    #[error("local file {path} does not exist")]
    MissingLocalFile {
        /// Path given by the operator.
        path: Utf8PathBuf,
    },
    /// Raised when some model downloads failed.
    #[error("{failed} of {total} downloads on {instance_id} failed")]
    IngestIncomplete {
        /// Pod the downloads ran on.
        instance_id: String,
        /// Number of failed downloads.
        failed: usize,
        /// Number of downloads attempted.
        total: usize,
    },
}

impl<E: std::error::Error + 'static> From<DeployError<E>> for OperationError<E> {
    fn from(value: DeployError<E>) -> Self {
        Self::Deploy(Box::new(value))
    }
}
