//! Disruption budget.
//!
//! Drifted machines are replaced by deleting them, and the machine set
//! recreates them. At most [`MAX_UNHEALTHY_COUNT`] machines of a set may be
//! unhealthy at once so a key rotation or upgrade rolls through the fleet
//! instead of taking it down.

use super::health::is_machine_healthy;
use crate::error::ControllerError;
use cluster_client::ClusterClientTrait;
use crds::{Machine, WINDOWS_MACHINE_SELECTOR};
use kube::ResourceExt;
use tracing::info;

/// Machines of one set that may be unhealthy at the same time
pub const MAX_UNHEALTHY_COUNT: i32 = 1;

/// Pure budget arithmetic.
///
/// A set whose size equals the budget can always lose a machine. Otherwise
/// deletion is allowed only while `replicas - healthy` stays strictly below
/// the budget.
pub fn deletion_allowed(replicas: i32, healthy: i32, max_unhealthy: i32) -> bool {
    if replicas == max_unhealthy {
        return true;
    }
    replicas - healthy < max_unhealthy
}

/// Whether deleting `machine` keeps its machine set within budget
pub async fn check_deletion_allowed(
    client: &dyn ClusterClientTrait,
    machine: &Machine,
) -> Result<bool, ControllerError> {
    let name = machine.name_any();
    let owner = machine.owner_name().ok_or_else(|| {
        ControllerError::InvalidMachine(format!("machine {} has no owner reference", name))
    })?;
    let namespace = machine.namespace().unwrap_or_default();

    let replicas = client.get_machine_set(&namespace, owner).await?.replicas();
    if replicas == MAX_UNHEALTHY_COUNT {
        return Ok(true);
    }

    let machines = client.list_machines(&namespace, WINDOWS_MACHINE_SELECTOR).await?;
    let mut healthy = 0;
    for m in machines
        .iter()
        .filter(|m| m.owner_name() == Some(owner) && !m.is_being_deleted())
    {
        if is_machine_healthy(client, m).await {
            healthy += 1;
        }
    }

    let allowed = deletion_allowed(replicas, healthy, MAX_UNHEALTHY_COUNT);
    info!(
        machine = %name,
        machine_set = %owner,
        total = replicas,
        unhealthy = replicas - healthy,
        allowed,
        "Evaluated disruption budget"
    );
    Ok(allowed)
}
