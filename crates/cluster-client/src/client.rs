//! Kubernetes-backed cluster client

use crate::cluster_trait::ClusterClientTrait;
use crate::error::ClusterError;
use crds::{Machine, MachineSet};
use k8s_openapi::api::core::v1::{EndpointSubset, Endpoints, Node, Secret};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams};
use kube::Client;
use std::collections::BTreeMap;
use tracing::debug;

/// Field manager used for server-side apply
pub const FIELD_MANAGER: &str = "windows-machine-controller";

/// Cluster client backed by a `kube::Client`
#[derive(Clone)]
pub struct KubeClusterClient {
    client: Client,
}

impl std::fmt::Debug for KubeClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeClusterClient").finish_non_exhaustive()
    }
}

impl KubeClusterClient {
    /// Create a new cluster client
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn machines(&self, namespace: &str) -> Api<Machine> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn nodes(&self) -> Api<Node> {
        Api::all(self.client.clone())
    }
}

/// Turns a `get_opt` result into a `NotFound` error when the object is absent
fn required<T>(object: Option<T>, what: impl FnOnce() -> String) -> Result<T, ClusterError> {
    object.ok_or_else(|| ClusterError::NotFound(what()))
}

#[async_trait::async_trait]
impl ClusterClientTrait for KubeClusterClient {
    async fn get_secret_data(&self, namespace: &str, name: &str, key: &str) -> Result<Vec<u8>, ClusterError> {
        let api: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = required(api.get_opt(name).await?, || format!("secret {}/{}", namespace, name))?;
        secret
            .data
            .and_then(|mut data| data.remove(key))
            .map(|bytes| bytes.0)
            .ok_or_else(|| ClusterError::InvalidObject(format!(
                "secret {}/{} has no {} key", namespace, name, key
            )))
    }

    async fn get_machine(&self, namespace: &str, name: &str) -> Result<Machine, ClusterError> {
        required(self.machines(namespace).get_opt(name).await?, || format!("machine {}/{}", namespace, name))
    }

    async fn list_machines(&self, namespace: &str, label_selector: &str) -> Result<Vec<Machine>, ClusterError> {
        let params = ListParams::default().labels(label_selector);
        let list = self.machines(namespace).list(&params).await?;
        debug!("Listed {} machines in {} matching {}", list.items.len(), namespace, label_selector);
        Ok(list.items)
    }

    async fn delete_machine(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        self.machines(namespace).delete(name, &DeleteParams::default()).await?;
        Ok(())
    }

    async fn get_machine_set(&self, namespace: &str, name: &str) -> Result<MachineSet, ClusterError> {
        let api: Api<MachineSet> = Api::namespaced(self.client.clone(), namespace);
        required(api.get_opt(name).await?, || format!("machineset {}/{}", namespace, name))
    }

    async fn get_node(&self, name: &str) -> Result<Node, ClusterError> {
        required(self.nodes().get_opt(name).await?, || format!("node {}", name))
    }

    async fn list_nodes(&self, label_selector: &str) -> Result<Vec<Node>, ClusterError> {
        let params = ListParams::default().labels(label_selector);
        Ok(self.nodes().list(&params).await?.items)
    }

    async fn patch_node_annotations(&self, name: &str, annotations: &BTreeMap<String, String>) -> Result<(), ClusterError> {
        let patch = serde_json::json!({
            "metadata": {
                "annotations": annotations
            }
        });
        self.nodes()
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        Ok(())
    }

    async fn get_endpoints(&self, namespace: &str, name: &str) -> Result<Endpoints, ClusterError> {
        let api: Api<Endpoints> = Api::namespaced(self.client.clone(), namespace);
        required(api.get_opt(name).await?, || format!("endpoints {}/{}", namespace, name))
    }

    async fn apply_endpoints(&self, namespace: &str, name: &str, subsets: Vec<EndpointSubset>) -> Result<(), ClusterError> {
        let api: Api<Endpoints> = Api::namespaced(self.client.clone(), namespace);
        let endpoints = Endpoints {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            subsets: Some(subsets),
        };
        let params = PatchParams::apply(FIELD_MANAGER).force();
        api.patch(name, &params, &Patch::Apply(&endpoints)).await?;
        Ok(())
    }
}
