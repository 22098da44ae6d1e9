//! Kubernetes resource watchers.
//!
//! Windows Machines drive a `kube_runtime::Controller` directly. Windows Node
//! notifications are admitted through the [`EventFilter`] and routed to the
//! owning Machine with the correlator.

use crate::backoff::BackoffTracker;
use crate::error::ControllerError;
use crate::filter::EventFilter;
use crate::reconciler::correlator::map_node_to_machine;
use crate::reconciler::{MachineKey, ReconcileOutcome, Reconciler};
use cluster_client::{ClusterClientTrait, ClusterError};
use crds::{Machine, WINDOWS_MACHINE_SELECTOR, WINDOWS_NODE_SELECTOR};
use futures::StreamExt;
use k8s_openapi::api::core::v1::Node;
use kube::{Api, Client, ResourceExt};
use kube_runtime::controller::{Action, Config as ControllerConfig};
use kube_runtime::reflector::{ObjectRef, Store};
use kube_runtime::{watcher, Controller};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// How often nodes that left the cluster are dropped from the admission cache
const NODE_PRUNE_INTERVAL: Duration = Duration::from_secs(600);

/// Shared state handed to every reconcile
pub struct Context {
    reconciler: Reconciler,
    filter: EventFilter,
    backoff: BackoffTracker,
}

impl Context {
    pub fn new(reconciler: Reconciler, filter: EventFilter) -> Self {
        Self {
            reconciler,
            filter,
            backoff: BackoffTracker::new(),
        }
    }
}

/// Remembers the last state of each Windows node, keyed by UID, so updates
/// can be judged against what changed. The first sighting is a create.
///
/// Nodes removed without a finalizer never show a deletion timestamp, so
/// entries are also pruned against a periodic re-list.
pub(crate) struct NodeAdmission {
    filter: EventFilter,
    seen: Mutex<HashMap<String, Node>>,
}

impl NodeAdmission {
    pub(crate) fn new(filter: EventFilter) -> Self {
        Self {
            filter,
            seen: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) fn admit(&self, node: &Node) -> bool {
        let Some(uid) = node.uid() else {
            return false;
        };
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);

        if node.metadata.deletion_timestamp.is_some() {
            seen.remove(&uid);
            return self.filter.admit_node_delete(node);
        }
        match seen.insert(uid, node.clone()) {
            None => self.filter.admit_node_create(node),
            Some(old) => self.filter.admit_node_update(&old, node),
        }
    }

    /// Forget every node whose UID is not in `live`; returns how many were dropped
    pub(crate) fn retain(&self, live: &HashSet<String>) -> usize {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        let before = seen.len();
        seen.retain(|uid, _| live.contains(uid));
        before - seen.len()
    }
}

/// Re-list Windows nodes and prune departed ones from `admission`
pub(crate) async fn prune_departed_nodes(
    cluster: &dyn ClusterClientTrait,
    admission: &NodeAdmission,
) -> Result<usize, ClusterError> {
    let live: HashSet<String> = cluster
        .list_nodes(WINDOWS_NODE_SELECTOR)
        .await?
        .iter()
        .filter_map(|node| node.uid())
        .collect();
    Ok(admission.retain(&live))
}

/// Maps admitted node notifications onto machine reconcile requests
struct NodeTrigger {
    admission: Arc<NodeAdmission>,
    machines: Store<Machine>,
}

impl NodeTrigger {
    fn map(&self, node: Node) -> Option<ObjectRef<Machine>> {
        if !self.admission.admit(&node) {
            return None;
        }
        let machines = self.machines.state();
        let key = map_node_to_machine(&node, machines.iter().map(Arc::as_ref))?;
        debug!("Node {} maps to machine {}", node.name_any(), key);
        Some(ObjectRef::new(&key.name).within(&key.namespace))
    }
}

async fn reconcile(machine: Arc<Machine>, ctx: Arc<Context>) -> Result<Action, ControllerError> {
    // Only the current object is delivered, so it stands in for both states
    if !ctx.filter.admit_machine_update(&machine, &machine) {
        debug!("Ignoring machine {}", machine.name_any());
        return Ok(Action::await_change());
    }

    let key = MachineKey::from_machine(&machine);
    match ctx.reconciler.reconcile(&key).await? {
        ReconcileOutcome::Done => {
            ctx.backoff.reset(&key);
            Ok(Action::await_change())
        }
        ReconcileOutcome::Requeue => {
            let delay = ctx.backoff.next_delay(&key);
            info!("Requeueing machine {} in {:?}", key, delay);
            Ok(Action::requeue(delay))
        }
    }
}

fn error_policy(machine: Arc<Machine>, error: &ControllerError, ctx: Arc<Context>) -> Action {
    let key = MachineKey::from_machine(&machine);
    let delay = ctx.backoff.next_delay(&key);
    error!(
        machine = %key,
        kind = ?error.kind(),
        "Reconciliation failed, retrying in {:?}: {}",
        delay,
        error
    );
    Action::requeue(delay)
}

/// Watches Windows Machines and Nodes.
pub struct Watcher {
    client: Client,
    cluster: Arc<dyn ClusterClientTrait>,
    context: Arc<Context>,
    machine_api_namespace: String,
    operator_version: String,
    ready: Arc<AtomicBool>,
}

impl Watcher {
    pub fn new(
        client: Client,
        cluster: Arc<dyn ClusterClientTrait>,
        context: Arc<Context>,
        machine_api_namespace: String,
        operator_version: String,
        ready: Arc<AtomicBool>,
    ) -> Self {
        Self {
            client,
            cluster,
            context,
            machine_api_namespace,
            operator_version,
            ready,
        }
    }

    /// Run the controller until its watch streams end.
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("Starting Machine watcher in namespace {}", self.machine_api_namespace);

        let machines: Api<Machine> = Api::namespaced(self.client.clone(), &self.machine_api_namespace);
        let nodes: Api<Node> = Api::all(self.client.clone());

        let controller = Controller::new(
            machines,
            watcher::Config::default().labels(WINDOWS_MACHINE_SELECTOR),
        );
        let store = controller.store();

        let ready = Arc::clone(&self.ready);
        let cache = store.clone();
        tokio::spawn(async move {
            if cache.wait_until_ready().await.is_ok() {
                ready.store(true, Ordering::SeqCst);
                info!("Machine cache synced");
            }
        });

        let admission = Arc::new(NodeAdmission::new(EventFilter::new(self.operator_version.clone())));
        let pruned = Arc::clone(&admission);
        let cluster = Arc::clone(&self.cluster);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(NODE_PRUNE_INTERVAL);
            // The first tick completes immediately and the cache starts empty
            interval.tick().await;
            loop {
                interval.tick().await;
                match prune_departed_nodes(cluster.as_ref(), &pruned).await {
                    Ok(0) => {}
                    Ok(count) => debug!("Pruned {} departed node(s) from admission cache", count),
                    Err(e) => warn!("Failed to re-list Windows nodes for pruning: {}", e),
                }
            }
        });

        let trigger = NodeTrigger {
            admission,
            machines: store,
        };

        // Debounce batches bursts of status updates; at most 3 reconciles in flight
        let controller_config = ControllerConfig::default()
            .debounce(Duration::from_secs(5))
            .concurrency(3);

        controller
            .watches(
                nodes,
                watcher::Config::default().labels(WINDOWS_NODE_SELECTOR),
                move |node| trigger.map(node),
            )
            .with_config(controller_config)
            .run(reconcile, error_policy, self.context)
            .for_each(|res| async move {
                match res {
                    Ok((obj, _action)) => debug!("Reconciled machine {}", obj.name),
                    Err(e) => error!("Controller error: {}", e),
                }
            })
            .await;

        Err(ControllerError::Watch("Machine watch stream ended".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;
    use cluster_client::mock::MockFailure;
    use cluster_client::MockClusterClient;

    #[test]
    fn test_first_sighting_is_a_create() {
        let admission = NodeAdmission::new(EventFilter::new(OPERATOR_VERSION));
        assert!(admission.admit(&windows_node("n", "uid", None, None)));

        let admission = NodeAdmission::new(EventFilter::new(OPERATOR_VERSION));
        assert!(!admission.admit(&windows_node("n", "uid", Some(OPERATOR_VERSION), None)));
    }

    #[test]
    fn test_resync_without_changes_is_not_admitted() {
        let admission = NodeAdmission::new(EventFilter::new(OPERATOR_VERSION));
        let node = windows_node("n", "uid", Some("0.9.0"), Some("abc"));
        assert!(admission.admit(&node));
        assert!(!admission.admit(&node));
    }

    #[test]
    fn test_annotation_change_is_admitted() {
        let admission = NodeAdmission::new(EventFilter::new(OPERATOR_VERSION));
        admission.admit(&windows_node("n", "uid", None, None));

        assert!(admission.admit(&windows_node("n", "uid", Some(OPERATOR_VERSION), Some(FINGERPRINT))));
        // Same state again
        assert!(!admission.admit(&windows_node("n", "uid", Some(OPERATOR_VERSION), Some(FINGERPRINT))));
        assert!(admission.admit(&windows_node("n", "uid", Some(OPERATOR_VERSION), Some("rotated"))));
    }

    #[test]
    fn test_deleted_node_is_rejected_and_forgotten() {
        let admission = NodeAdmission::new(EventFilter::new(OPERATOR_VERSION));
        let node = windows_node("n", "uid", None, None);
        assert!(admission.admit(&node));

        let mut deleting = node.clone();
        deleting.metadata.deletion_timestamp =
            Some(serde_json::from_value(serde_json::json!("2026-10-18T00:00:00Z")).unwrap());
        assert!(!admission.admit(&deleting));

        // A node recreated with the same UID is a create again
        assert!(admission.admit(&node));
    }

    #[tokio::test]
    async fn test_prune_forgets_nodes_missing_from_relist() {
        let admission = NodeAdmission::new(EventFilter::new(OPERATOR_VERSION));
        let kept = windows_node("kept", "uid-kept", Some("0.9.0"), None);
        let gone = windows_node("gone", "uid-gone", Some("0.9.0"), None);
        assert!(admission.admit(&kept));
        assert!(admission.admit(&gone));

        // Only "kept" is still in the cluster
        let cluster = MockClusterClient::new();
        cluster.add_node(kept.clone());
        assert_eq!(prune_departed_nodes(&cluster, &admission).await.unwrap(), 1);

        // The pruned UID is unknown again, the kept one still compares against its old state
        assert!(admission.admit(&gone));
        assert!(!admission.admit(&kept));
    }

    #[tokio::test]
    async fn test_prune_keeps_cache_when_relist_fails() {
        let admission = NodeAdmission::new(EventFilter::new(OPERATOR_VERSION));
        let node = windows_node("n", "uid", Some("0.9.0"), None);
        assert!(admission.admit(&node));

        let cluster = MockClusterClient::new();
        cluster.fail_on(MockFailure::ListNodes);
        assert!(prune_departed_nodes(&cluster, &admission).await.is_err());
        assert!(!admission.admit(&node));
    }

    #[test]
    fn test_nodes_without_uid_are_ignored() {
        let admission = NodeAdmission::new(EventFilter::new(OPERATOR_VERSION));
        let mut node = windows_node("n", "uid", None, None);
        node.metadata.uid = None;
        assert!(!admission.admit(&node));
    }
}
