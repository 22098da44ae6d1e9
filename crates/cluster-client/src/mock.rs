//! Mock ClusterClient for unit testing
//!
//! Stores resources in memory and records every mutation so tests can assert
//! on what the controller wrote. Individual operations can be made to fail.

use crate::cluster_trait::ClusterClientTrait;
use crate::error::ClusterError;
use crate::selector;
use crds::{Machine, MachineSet, PRIVATE_KEY_SECRET, PRIVATE_KEY_SECRET_KEY, USER_DATA_SECRET, USER_DATA_SECRET_KEY};
use k8s_openapi::api::core::v1::{EndpointSubset, Endpoints, Node};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::ResourceExt;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Key = (String, String);

fn key(namespace: &str, name: &str) -> Key {
    (namespace.to_string(), name.to_string())
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Operations that can be forced to fail
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockFailure {
    GetMachine,
    ListMachines,
    DeleteMachine,
    GetMachineSet,
    GetNode,
    ListNodes,
    PatchNode,
    ApplyEndpoints,
}

/// Mock cluster client for testing
#[derive(Clone, Default)]
pub struct MockClusterClient {
    secrets: Arc<Mutex<HashMap<Key, BTreeMap<String, Vec<u8>>>>>,
    machines: Arc<Mutex<HashMap<Key, Machine>>>,
    machine_sets: Arc<Mutex<HashMap<Key, MachineSet>>>,
    nodes: Arc<Mutex<HashMap<String, Node>>>,
    endpoints: Arc<Mutex<HashMap<Key, Endpoints>>>,
    failures: Arc<Mutex<Vec<MockFailure>>>,
    // Recorded mutations
    deleted_machines: Arc<Mutex<Vec<Key>>>,
    node_patches: Arc<Mutex<Vec<(String, BTreeMap<String, String>)>>>,
    endpoint_applies: Arc<Mutex<Vec<Key>>>,
}

impl std::fmt::Debug for MockClusterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockClusterClient")
            .field("machines", &lock(&self.machines).len())
            .field("nodes", &lock(&self.nodes).len())
            .finish_non_exhaustive()
    }
}

impl MockClusterClient {
    /// Create a new, empty mock client
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a secret data key (for test setup)
    pub fn set_secret_data(&self, namespace: &str, name: &str, data_key: &str, value: impl Into<Vec<u8>>) {
        lock(&self.secrets)
            .entry(key(namespace, name))
            .or_default()
            .insert(data_key.to_string(), value.into());
    }

    /// Store the private key secret (for test setup)
    pub fn set_private_key(&self, namespace: &str, value: impl Into<Vec<u8>>) {
        self.set_secret_data(namespace, PRIVATE_KEY_SECRET, PRIVATE_KEY_SECRET_KEY, value);
    }

    /// Store the userData secret (for test setup)
    pub fn set_user_data(&self, namespace: &str, value: impl Into<Vec<u8>>) {
        self.set_secret_data(namespace, USER_DATA_SECRET, USER_DATA_SECRET_KEY, value);
    }

    /// Remove a whole secret (simulates an operator deleting it)
    pub fn remove_secret(&self, namespace: &str, name: &str) {
        lock(&self.secrets).remove(&key(namespace, name));
    }

    /// Add or replace a machine (for test setup)
    pub fn add_machine(&self, machine: Machine) {
        let k = key(&machine.namespace().unwrap_or_default(), &machine.name_any());
        lock(&self.machines).insert(k, machine);
    }

    /// Add or replace a machine set (for test setup)
    pub fn add_machine_set(&self, machine_set: MachineSet) {
        let k = key(&machine_set.namespace().unwrap_or_default(), &machine_set.name_any());
        lock(&self.machine_sets).insert(k, machine_set);
    }

    /// Add or replace a node (for test setup)
    pub fn add_node(&self, node: Node) {
        lock(&self.nodes).insert(node.name_any(), node);
    }

    /// Make an operation fail with `ClusterError::Api`
    pub fn fail_on(&self, failure: MockFailure) {
        lock(&self.failures).push(failure);
    }

    /// Machines deleted so far, as `(namespace, name)`
    pub fn deleted_machines(&self) -> Vec<(String, String)> {
        lock(&self.deleted_machines).clone()
    }

    /// Node annotation patches applied so far
    pub fn node_patches(&self) -> Vec<(String, BTreeMap<String, String>)> {
        lock(&self.node_patches).clone()
    }

    /// Number of endpoint applies so far
    pub fn endpoint_apply_count(&self) -> usize {
        lock(&self.endpoint_applies).len()
    }

    /// Total number of recorded writes
    pub fn mutation_count(&self) -> usize {
        lock(&self.deleted_machines).len() + lock(&self.node_patches).len() + lock(&self.endpoint_applies).len()
    }

    /// Current node object, if any
    pub fn node(&self, name: &str) -> Option<Node> {
        lock(&self.nodes).get(name).cloned()
    }

    fn check(&self, op: MockFailure) -> Result<(), ClusterError> {
        if lock(&self.failures).contains(&op) {
            return Err(ClusterError::Api(format!("injected failure for {:?}", op)));
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl ClusterClientTrait for MockClusterClient {
    async fn get_secret_data(&self, namespace: &str, name: &str, data_key: &str) -> Result<Vec<u8>, ClusterError> {
        let secrets = lock(&self.secrets);
        let secret = secrets
            .get(&key(namespace, name))
            .ok_or_else(|| ClusterError::NotFound(format!("secret {}/{}", namespace, name)))?;
        secret
            .get(data_key)
            .cloned()
            .ok_or_else(|| ClusterError::InvalidObject(format!("secret {}/{} has no {} key", namespace, name, data_key)))
    }

    async fn get_machine(&self, namespace: &str, name: &str) -> Result<Machine, ClusterError> {
        self.check(MockFailure::GetMachine)?;
        lock(&self.machines)
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| ClusterError::NotFound(format!("machine {}/{}", namespace, name)))
    }

    async fn list_machines(&self, namespace: &str, label_selector: &str) -> Result<Vec<Machine>, ClusterError> {
        self.check(MockFailure::ListMachines)?;
        let mut machines: Vec<Machine> = lock(&self.machines)
            .iter()
            .filter(|((ns, _), m)| ns == namespace && selector::matches(m.labels(), label_selector))
            .map(|(_, m)| m.clone())
            .collect();
        machines.sort_by_key(ResourceExt::name_any);
        Ok(machines)
    }

    async fn delete_machine(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        self.check(MockFailure::DeleteMachine)?;
        let k = key(namespace, name);
        if lock(&self.machines).remove(&k).is_none() {
            return Err(ClusterError::NotFound(format!("machine {}/{}", namespace, name)));
        }
        lock(&self.deleted_machines).push(k);
        Ok(())
    }

    async fn get_machine_set(&self, namespace: &str, name: &str) -> Result<MachineSet, ClusterError> {
        self.check(MockFailure::GetMachineSet)?;
        lock(&self.machine_sets)
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| ClusterError::NotFound(format!("machineset {}/{}", namespace, name)))
    }

    async fn get_node(&self, name: &str) -> Result<Node, ClusterError> {
        self.check(MockFailure::GetNode)?;
        lock(&self.nodes)
            .get(name)
            .cloned()
            .ok_or_else(|| ClusterError::NotFound(format!("node {}", name)))
    }

    async fn list_nodes(&self, label_selector: &str) -> Result<Vec<Node>, ClusterError> {
        self.check(MockFailure::ListNodes)?;
        let mut nodes: Vec<Node> = lock(&self.nodes)
            .values()
            .filter(|n| selector::matches(n.labels(), label_selector))
            .cloned()
            .collect();
        nodes.sort_by_key(ResourceExt::name_any);
        Ok(nodes)
    }

    async fn patch_node_annotations(&self, name: &str, annotations: &BTreeMap<String, String>) -> Result<(), ClusterError> {
        self.check(MockFailure::PatchNode)?;
        let mut nodes = lock(&self.nodes);
        let node = nodes
            .get_mut(name)
            .ok_or_else(|| ClusterError::NotFound(format!("node {}", name)))?;
        node.annotations_mut()
            .extend(annotations.iter().map(|(k, v)| (k.clone(), v.clone())));
        lock(&self.node_patches).push((name.to_string(), annotations.clone()));
        Ok(())
    }

    async fn get_endpoints(&self, namespace: &str, name: &str) -> Result<Endpoints, ClusterError> {
        lock(&self.endpoints)
            .get(&key(namespace, name))
            .cloned()
            .ok_or_else(|| ClusterError::NotFound(format!("endpoints {}/{}", namespace, name)))
    }

    async fn apply_endpoints(&self, namespace: &str, name: &str, subsets: Vec<EndpointSubset>) -> Result<(), ClusterError> {
        self.check(MockFailure::ApplyEndpoints)?;
        let k = key(namespace, name);
        let endpoints = Endpoints {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            subsets: Some(subsets),
        };
        lock(&self.endpoints).insert(k.clone(), endpoints);
        lock(&self.endpoint_applies).push(k);
        Ok(())
    }
}
