//! Admission predicates for machine and node notifications.
//!
//! Only notifications that can change what the reconciler would do are
//! turned into reconcile requests.

use crds::{
    Machine, NODE_OS_LABEL, PUB_KEY_HASH_ANNOTATION, VERSION_ANNOTATION, WINDOWS_NODE_OS,
};
use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;

/// A machine the reconciler can act on: it has a phase and at least one address
pub fn is_valid_machine(machine: &Machine) -> bool {
    machine.phase().is_some() && !machine.addresses().is_empty()
}

pub fn is_windows_node(node: &Node) -> bool {
    node.labels().get(NODE_OS_LABEL).map(String::as_str) == Some(WINDOWS_NODE_OS)
}

fn annotation<'a>(node: &'a Node, key: &str) -> Option<&'a str> {
    node.annotations().get(key).map(String::as_str)
}

/// Decides which create/update/delete notifications are enqueued
#[derive(Debug, Clone)]
pub struct EventFilter {
    operator_version: String,
}

impl EventFilter {
    pub fn new(operator_version: impl Into<String>) -> Self {
        Self {
            operator_version: operator_version.into(),
        }
    }

    pub fn admit_machine_create(&self, machine: &Machine) -> bool {
        is_valid_machine(machine) && machine.is_windows()
    }

    /// Only the new state matters for machine updates
    pub fn admit_machine_update(&self, _old: &Machine, new: &Machine) -> bool {
        self.admit_machine_create(new)
    }

    #[allow(dead_code)] // Deleted machines never reach the reconciler
    pub fn admit_machine_delete(&self, _machine: &Machine) -> bool {
        false
    }

    /// New Windows nodes are interesting unless already at our version
    pub fn admit_node_create(&self, node: &Node) -> bool {
        is_windows_node(node)
            && annotation(node, VERSION_ANNOTATION) != Some(self.operator_version.as_str())
    }

    /// Windows node updates that touched the version or key fingerprint
    pub fn admit_node_update(&self, old: &Node, new: &Node) -> bool {
        is_windows_node(new)
            && (annotation(old, VERSION_ANNOTATION) != annotation(new, VERSION_ANNOTATION)
                || annotation(old, PUB_KEY_HASH_ANNOTATION) != annotation(new, PUB_KEY_HASH_ANNOTATION))
    }

    pub fn admit_node_delete(&self, _node: &Node) -> bool {
        false
    }
}
