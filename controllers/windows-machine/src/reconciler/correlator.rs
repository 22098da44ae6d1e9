//! Node to Machine mapping.
//!
//! Machines point at their Node through `status.nodeRef`; Nodes carry no back
//! reference, so a Node notification is routed by scanning machines for a
//! matching UID.

use super::MachineKey;
use crate::filter::{is_valid_machine, is_windows_node};
use crds::Machine;
use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;

/// The Windows machine whose `nodeRef.uid` is `node`'s UID. First match wins.
pub fn map_node_to_machine<'a>(
    node: &Node,
    machines: impl IntoIterator<Item = &'a Machine>,
) -> Option<MachineKey> {
    if !is_windows_node(node) {
        return None;
    }
    let uid = node.uid()?;

    machines
        .into_iter()
        .filter(|m| m.is_windows() && is_valid_machine(m))
        .find(|m| m.node_ref().and_then(|r| r.uid.as_deref()) == Some(uid.as_str()))
        .map(MachineKey::from_machine)
}
