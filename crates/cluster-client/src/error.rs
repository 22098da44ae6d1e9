//! Cluster client errors

use thiserror::Error;

/// Errors that can occur when talking to the cluster store
#[derive(Debug, Error)]
pub enum ClusterError {
    /// Kubernetes API request/response error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Object exists but is missing data the caller needs
    #[error("Invalid object: {0}")]
    InvalidObject(String),

    /// Error injected by the in-memory mock
    #[error("Cluster API error: {0}")]
    Api(String),
}

impl ClusterError {
    /// True when the error means the requested object does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
