//! ClusterClient trait for mocking
//!
//! This trait abstracts the Kubernetes API calls made by the controller.
//! `KubeClusterClient` implements it against a live cluster, tests use
//! `MockClusterClient`.

use crate::error::ClusterError;
use crds::{Machine, MachineSet, PRIVATE_KEY_SECRET, PRIVATE_KEY_SECRET_KEY};
use k8s_openapi::api::core::v1::{EndpointSubset, Endpoints, Node};
use std::collections::BTreeMap;

/// Trait for cluster store operations
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
#[async_trait::async_trait]
pub trait ClusterClientTrait: Send + Sync {
    // Secrets

    /// Read one data key of a secret
    async fn get_secret_data(&self, namespace: &str, name: &str, key: &str) -> Result<Vec<u8>, ClusterError>;

    /// Read the private key used to reach Windows instances
    async fn get_private_key(&self, namespace: &str) -> Result<Vec<u8>, ClusterError> {
        self.get_secret_data(namespace, PRIVATE_KEY_SECRET, PRIVATE_KEY_SECRET_KEY).await
    }

    // Machine API
    async fn get_machine(&self, namespace: &str, name: &str) -> Result<Machine, ClusterError>;
    async fn list_machines(&self, namespace: &str, label_selector: &str) -> Result<Vec<Machine>, ClusterError>;
    async fn delete_machine(&self, namespace: &str, name: &str) -> Result<(), ClusterError>;
    async fn get_machine_set(&self, namespace: &str, name: &str) -> Result<MachineSet, ClusterError>;

    // Nodes
    async fn get_node(&self, name: &str) -> Result<Node, ClusterError>;
    async fn list_nodes(&self, label_selector: &str) -> Result<Vec<Node>, ClusterError>;
    async fn patch_node_annotations(&self, name: &str, annotations: &BTreeMap<String, String>) -> Result<(), ClusterError>;

    // Endpoints
    async fn get_endpoints(&self, namespace: &str, name: &str) -> Result<Endpoints, ClusterError>;

    /// Create the Endpoints object or replace its subsets
    async fn apply_endpoints(&self, namespace: &str, name: &str, subsets: Vec<EndpointSubset>) -> Result<(), ClusterError>;
}
