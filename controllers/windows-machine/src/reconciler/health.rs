//! Machine health.
//!
//! A machine is healthy when its Node exists and has been fully configured
//! by the operator (carries the version annotation). Lookup failures count
//! as unhealthy.

use cluster_client::ClusterClientTrait;
use crds::{Machine, VERSION_ANNOTATION};
use kube::ResourceExt;
use tracing::debug;

pub async fn is_machine_healthy(client: &dyn ClusterClientTrait, machine: &Machine) -> bool {
    // Whatever the phase, there is nothing to check without a linked Node
    let Some(node_name) = machine.node_ref().and_then(|r| r.name.as_deref()) else {
        return false;
    };

    match client.get_node(node_name).await {
        Ok(node) => node.annotations().contains_key(VERSION_ANNOTATION),
        Err(e) => {
            debug!("Machine {} counted unhealthy, node {} lookup failed: {}", machine.name_any(), node_name, e);
            false
        }
    }
}
