//! Kubernetes events emitted against Machines.

use crds::Machine;
use kube::runtime::events::{Event, EventType, Recorder, Reporter};
use kube::{Client, Resource};
use tracing::warn;

/// Event reasons
pub mod reasons {
    pub const MACHINE_SETUP: &str = "MachineSetup";
    pub const MACHINE_DELETED: &str = "MachineDeleted";
    pub const MACHINE_SETUP_FAILURE: &str = "MachineSetupFailure";
    pub const MACHINE_DELETION_FAILED: &str = "MachineDeletionFailed";
    pub const MACHINE_DELETION_RESTRICTED: &str = "MachineDeletionRestricted";
}

/// Event actions
pub mod actions {
    pub const CONFIGURE: &str = "Configure";
    pub const DELETE: &str = "Delete";
}

/// Fire-and-forget event sink
#[async_trait::async_trait]
pub trait MachineEventRecorder: Send + Sync {
    async fn record(&self, machine: &Machine, event_type: EventType, reason: &str, action: &str, note: String);
}

/// Publishes events through the events.k8s.io API
pub struct KubeMachineEventRecorder {
    recorder: Recorder,
}

impl std::fmt::Debug for KubeMachineEventRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeMachineEventRecorder").finish_non_exhaustive()
    }
}

impl KubeMachineEventRecorder {
    pub fn new(client: Client, controller: &str) -> Self {
        let reporter = Reporter {
            controller: controller.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait::async_trait]
impl MachineEventRecorder for KubeMachineEventRecorder {
    async fn record(&self, machine: &Machine, event_type: EventType, reason: &str, action: &str, note: String) {
        let event = Event {
            type_: event_type,
            reason: reason.to_string(),
            note: Some(note),
            action: action.to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&event, &machine.object_ref(&())).await {
            warn!("Failed to publish {} event: {}", reason, e);
        }
    }
}
