//! Node configurator contract

use crate::error::NodeConfigError;
use crate::signer::Signer;

/// Everything needed to turn an instance into a Node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo {
    /// Internal IP the instance is reachable on
    pub ip: String,
    /// Cloud instance identifier (last segment of the provider ID)
    pub instance_id: String,
    pub machine_name: String,
    pub service_cidr: String,
    pub vxlan_port: Option<String>,
    pub platform: String,
}

/// Runs OS-level setup on one instance
#[async_trait::async_trait]
pub trait NodeConfigurator: Send + Sync {
    /// Configure the instance and annotate the resulting Node
    async fn configure(&self) -> Result<(), NodeConfigError>;

    /// Identifier for logs and events
    fn id(&self) -> String;
}

/// Creates a [`NodeConfigurator`] for an instance
pub trait ConfiguratorFactory: Send + Sync {
    fn create(
        &self,
        instance: InstanceInfo,
        signer: &Signer,
    ) -> Result<Box<dyn NodeConfigurator>, NodeConfigError>;
}
