//! Controller-specific error types.

use cluster_client::ClusterError;
use kube::Error as KubeError;
use nodeconfig::{ConfigErrorKind, NodeConfigError};
use thiserror::Error;

/// Errors that can occur in the Windows machine controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes client setup error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Cluster store read or write failed
    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    /// The private key secret does not exist yet
    #[error("Private key secret missing: {0}")]
    PrivateKeyMissing(String),

    #[error("Failed to get node {node}: {source}")]
    NodeLookup {
        node: String,
        #[source]
        source: ClusterError,
    },

    /// Private key could not be parsed or rendered
    #[error("Invalid private key: {0}")]
    InvalidKey(#[source] NodeConfigError),

    /// Machine is missing data the reconciler needs
    #[error("Invalid machine: {0}")]
    InvalidMachine(String),

    /// Deployed userData does not match the current private key
    #[error("userData mismatch: {0}")]
    UserDataMismatch(String),

    /// Node configurator failed
    #[error("Configuration failed: {0}")]
    Configuration(#[source] NodeConfigError),

    /// Auxiliary fleet configuration failed
    #[error("Fleet configuration failed: {0}")]
    Fleet(#[source] NodeConfigError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

/// How a failure should be handled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Credentials rejected by the instance
    AuthenticationFailure,
    /// Likely to succeed on retry
    Transient,
    /// Needs a change to the inputs before retrying can succeed
    Structural,
}

impl ControllerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Configuration(e) => match e.kind() {
                ConfigErrorKind::AuthenticationFailure => ErrorKind::AuthenticationFailure,
                ConfigErrorKind::InvalidInput => ErrorKind::Structural,
                ConfigErrorKind::Transient => ErrorKind::Transient,
            },
            Self::InvalidKey(_)
            | Self::InvalidMachine(_)
            | Self::UserDataMismatch(_)
            | Self::InvalidConfig(_) => ErrorKind::Structural,
            Self::Kube(_)
            | Self::Cluster(_)
            | Self::PrivateKeyMissing(_)
            | Self::NodeLookup { .. }
            | Self::Fleet(_)
            | Self::Io(_)
            | Self::Watch(_) => ErrorKind::Transient,
        }
    }
}
