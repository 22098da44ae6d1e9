//! Node configuration errors

use cluster_client::ClusterError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeConfigError {
    /// The instance rejected our credentials
    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Invalid private key: {0}")]
    InvalidKey(String),

    #[error("Invalid instance: {0}")]
    InvalidInstance(String),

    #[error("Command `{command}` failed (exit code {code:?}): {stderr}")]
    Command {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("Node for instance {0} did not join the cluster in time")]
    NodeNotReady(String),
}

/// Coarse classification callers branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigErrorKind {
    AuthenticationFailure,
    /// Bad key material or instance data; retrying will not help
    InvalidInput,
    Transient,
}

impl NodeConfigError {
    pub fn kind(&self) -> ConfigErrorKind {
        match self {
            Self::Authentication(_) => ConfigErrorKind::AuthenticationFailure,
            Self::InvalidKey(_) | Self::InvalidInstance(_) => ConfigErrorKind::InvalidInput,
            Self::Command { .. } | Self::Io(_) | Self::Cluster(_) | Self::NodeNotReady(_) => {
                ConfigErrorKind::Transient
            }
        }
    }

    pub fn is_authentication(&self) -> bool {
        self.kind() == ConfigErrorKind::AuthenticationFailure
    }
}
