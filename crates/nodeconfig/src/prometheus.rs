//! Metrics endpoints for configured Windows nodes
//!
//! Cluster monitoring scrapes Windows nodes through a selector-less Endpoints
//! object that lists every configured node's internal IP on the
//! windows_exporter port.

use crate::error::NodeConfigError;
use cluster_client::ClusterClientTrait;
use crds::{VERSION_ANNOTATION, WINDOWS_METRICS_ENDPOINTS, WINDOWS_METRICS_PORT, WINDOWS_NODE_SELECTOR};
use k8s_openapi::api::core::v1::{EndpointAddress, EndpointPort, EndpointSubset, Node, ObjectReference};
use kube::ResourceExt;
use std::sync::Arc;
use tracing::{debug, info};

/// Fleet-wide configuration that must track the set of configured nodes
#[async_trait::async_trait]
pub trait FleetConfigurator: Send + Sync {
    /// Bring fleet state up to date. Idempotent.
    async fn configure(&self) -> Result<(), NodeConfigError>;
}

/// Maintains the `windows-exporter` Endpoints object
pub struct PrometheusNodeConfig {
    client: Arc<dyn ClusterClientTrait>,
    namespace: String,
}

impl std::fmt::Debug for PrometheusNodeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PrometheusNodeConfig")
            .field("namespace", &self.namespace)
            .finish_non_exhaustive()
    }
}

impl PrometheusNodeConfig {
    pub fn new(client: Arc<dyn ClusterClientTrait>, namespace: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
        }
    }
}

#[async_trait::async_trait]
impl FleetConfigurator for PrometheusNodeConfig {
    async fn configure(&self) -> Result<(), NodeConfigError> {
        let nodes = self.client.list_nodes(WINDOWS_NODE_SELECTOR).await?;
        let desired = desired_subsets(&nodes);

        let current = match self
            .client
            .get_endpoints(&self.namespace, WINDOWS_METRICS_ENDPOINTS)
            .await
        {
            Ok(endpoints) => Some(endpoints.subsets.unwrap_or_default()),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        };
        if current.as_ref() == Some(&desired) {
            debug!("Endpoints {}/{} already current", self.namespace, WINDOWS_METRICS_ENDPOINTS);
            return Ok(());
        }

        let count = desired.first().and_then(|s| s.addresses.as_ref()).map_or(0, Vec::len);
        self.client
            .apply_endpoints(&self.namespace, WINDOWS_METRICS_ENDPOINTS, desired)
            .await?;
        info!(
            "Updated endpoints {}/{} with {} Windows node(s)",
            self.namespace, WINDOWS_METRICS_ENDPOINTS, count
        );
        Ok(())
    }
}

/// Subsets listing every configured node, sorted by node name. Empty when no
/// node qualifies.
fn desired_subsets(nodes: &[Node]) -> Vec<EndpointSubset> {
    let mut addresses: Vec<EndpointAddress> = nodes
        .iter()
        .filter(|n| n.annotations().contains_key(VERSION_ANNOTATION))
        .filter_map(|node| {
            let ip = internal_ip(node)?;
            Some(EndpointAddress {
                ip,
                node_name: Some(node.name_any()),
                target_ref: Some(ObjectReference {
                    kind: Some("Node".to_string()),
                    name: Some(node.name_any()),
                    uid: node.uid(),
                    ..Default::default()
                }),
                ..Default::default()
            })
        })
        .collect();
    if addresses.is_empty() {
        return Vec::new();
    }
    addresses.sort_by(|a, b| a.node_name.cmp(&b.node_name));

    vec![EndpointSubset {
        addresses: Some(addresses),
        ports: Some(vec![EndpointPort {
            name: Some("metrics".to_string()),
            port: WINDOWS_METRICS_PORT,
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        ..Default::default()
    }]
}

fn internal_ip(node: &Node) -> Option<String> {
    node.status
        .as_ref()?
        .addresses
        .as_ref()?
        .iter()
        .find(|a| a.type_ == "InternalIP")
        .map(|a| a.address.clone())
}
