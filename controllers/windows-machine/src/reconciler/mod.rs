//! Windows machine reconciliation.
//!
//! Each reconcile re-derives everything from the cluster:
//!
//! - **Provisioned** machines are configured into Nodes.
//! - **Running** machines whose Node was configured with another operator
//!   version or another key are deleted, within the disruption budget, so the
//!   machine set replaces them. Running machines whose Node never finished
//!   configuration are configured again.
//! - Every other phase only refreshes fleet-wide configuration.

pub mod correlator;
pub mod disruption;
pub mod health;

use crate::error::ControllerError;
use crate::events::{actions, reasons, MachineEventRecorder};
use cluster_client::ClusterClientTrait;
use crds::{
    Machine, MachinePhase, PRIVATE_KEY_SECRET, PRIVATE_KEY_SECRET_KEY, PUB_KEY_HASH_ANNOTATION,
    USER_DATA_SECRET, USER_DATA_SECRET_KEY, VERSION_ANNOTATION,
};
use kube::runtime::events::EventType;
use kube::ResourceExt;
use nodeconfig::{
    generate_user_data, ConfigErrorKind, ConfiguratorFactory, FleetConfigurator, InstanceInfo,
    NodeConfigError, Signer,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Identity of a reconcile request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MachineKey {
    pub namespace: String,
    pub name: String,
}

impl MachineKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn from_machine(machine: &Machine) -> Self {
        Self::new(machine.namespace().unwrap_or_default(), machine.name_any())
    }
}

impl std::fmt::Display for MachineKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Result of a reconcile that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Nothing more to do until something changes
    Done,
    /// Try again later (disruption budget exhausted)
    Requeue,
}

/// Static inputs to reconciliation
#[derive(Debug, Clone)]
pub struct ReconcilerSettings {
    pub watch_namespace: String,
    pub machine_api_namespace: String,
    pub operator_version: String,
    pub service_cidr: String,
    pub vxlan_port: Option<String>,
    pub platform: String,
}

/// Reconciler for Windows Machines
pub struct Reconciler {
    client: Arc<dyn ClusterClientTrait>,
    configurators: Arc<dyn ConfiguratorFactory>,
    fleet: Arc<dyn FleetConfigurator>,
    events: Arc<dyn MachineEventRecorder>,
    settings: ReconcilerSettings,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        client: Arc<dyn ClusterClientTrait>,
        configurators: Arc<dyn ConfiguratorFactory>,
        fleet: Arc<dyn FleetConfigurator>,
        events: Arc<dyn MachineEventRecorder>,
        settings: ReconcilerSettings,
    ) -> Self {
        Self {
            client,
            configurators,
            fleet,
            events,
            settings,
        }
    }

    /// Reconcile one machine
    pub async fn reconcile(&self, key: &MachineKey) -> Result<ReconcileOutcome, ControllerError> {
        let signer = self.load_signer().await?;

        let machine = match self.client.get_machine(&key.namespace, &key.name).await {
            Ok(machine) => machine,
            Err(e) if e.is_not_found() => {
                debug!("Machine {} no longer exists", key);
                return Ok(ReconcileOutcome::Done);
            }
            Err(e) => return Err(e.into()),
        };

        let Some(phase) = machine.phase() else {
            return Err(ControllerError::InvalidMachine(format!("machine {} has no phase", key)));
        };
        debug!("Reconciling machine {} in phase {}", key, phase);

        match phase {
            MachinePhase::Running => self.reconcile_running(key, &machine, &signer).await,
            MachinePhase::Provisioned => self.configure_machine(&machine, &signer).await,
            _ => {
                self.configure_fleet().await?;
                Ok(ReconcileOutcome::Done)
            }
        }
    }

    async fn load_signer(&self) -> Result<Signer, ControllerError> {
        let namespace = &self.settings.watch_namespace;
        let private_key = match self.client.get_private_key(namespace).await {
            Ok(key) => key,
            Err(e) if e.is_not_found() => {
                return Err(ControllerError::PrivateKeyMissing(format!(
                    "create secret {}/{} with the instance private key under {}",
                    namespace, PRIVATE_KEY_SECRET, PRIVATE_KEY_SECRET_KEY
                )));
            }
            Err(e) => return Err(e.into()),
        };
        Signer::create(&private_key).map_err(ControllerError::InvalidKey)
    }

    async fn reconcile_running(
        &self,
        key: &MachineKey,
        machine: &Machine,
        signer: &Signer,
    ) -> Result<ReconcileOutcome, ControllerError> {
        let node_name = machine
            .node_ref()
            .and_then(|r| r.name.as_deref())
            .ok_or_else(|| ControllerError::InvalidMachine(format!("running machine {} has no nodeRef", key)))?;

        let node = self
            .client
            .get_node(node_name)
            .await
            .map_err(|source| ControllerError::NodeLookup {
                node: node_name.to_string(),
                source,
            })?;

        let annotations = node.annotations();
        let Some(version) = annotations.get(VERSION_ANNOTATION) else {
            info!("Node {} of machine {} was not fully configured, configuring", node_name, key);
            return self.configure_machine(machine, signer).await;
        };

        let fingerprint = annotations.get(PUB_KEY_HASH_ANNOTATION).map(String::as_str);
        let version_current = *version == self.settings.operator_version;
        let key_current = fingerprint == Some(signer.public_key_fingerprint());
        if version_current && key_current {
            self.configure_fleet().await?;
            return Ok(ReconcileOutcome::Done);
        }

        info!(
            machine = %key,
            node = %node_name,
            version_current,
            key_current,
            "Node configuration drifted, machine needs replacing"
        );
        if !disruption::check_deletion_allowed(self.client.as_ref(), machine).await? {
            self.events
                .record(
                    machine,
                    EventType::Warning,
                    reasons::MACHINE_DELETION_RESTRICTED,
                    actions::DELETE,
                    format!(
                        "Machine {} deletion restricted as the maximum unhealthy machines can't exceed {} count",
                        key,
                        disruption::MAX_UNHEALTHY_COUNT
                    ),
                )
                .await;
            return Ok(ReconcileOutcome::Requeue);
        }

        self.delete_machine(machine).await?;
        Ok(ReconcileOutcome::Done)
    }

    /// Configure a machine's instance and let it join as a Node
    async fn configure_machine(&self, machine: &Machine, signer: &Signer) -> Result<ReconcileOutcome, ControllerError> {
        self.validate_user_data(signer).await?;
        let instance = self.instance_info(machine)?;

        let configurator = match self.configurators.create(instance, signer) {
            Ok(configurator) => configurator,
            Err(e) => return self.handle_configure_failure(machine, e).await,
        };
        info!("Configuring instance {} of machine {}", configurator.id(), machine.name_any());
        if let Err(e) = configurator.configure().await {
            return self.handle_configure_failure(machine, e).await;
        }

        self.events
            .record(
                machine,
                EventType::Normal,
                reasons::MACHINE_SETUP,
                actions::CONFIGURE,
                format!("Machine {} configured successfully", MachineKey::from_machine(machine)),
            )
            .await;
        info!("Instance {} configured", configurator.id());

        self.configure_fleet().await?;
        Ok(ReconcileOutcome::Done)
    }

    /// Rejected credentials mean the instance can never be configured with
    /// the current key, so it is replaced. Anything else is retried.
    async fn handle_configure_failure(
        &self,
        machine: &Machine,
        error: NodeConfigError,
    ) -> Result<ReconcileOutcome, ControllerError> {
        let name = machine.name_any();
        match error.kind() {
            ConfigErrorKind::AuthenticationFailure => {
                warn!("Authentication to machine {} failed, deleting it: {}", name, error);
                self.events
                    .record(
                        machine,
                        EventType::Warning,
                        reasons::MACHINE_SETUP_FAILURE,
                        actions::CONFIGURE,
                        format!("Machine {} authentication failure", name),
                    )
                    .await;
                self.delete_machine(machine).await?;
                Ok(ReconcileOutcome::Done)
            }
            ConfigErrorKind::InvalidInput | ConfigErrorKind::Transient => {
                self.events
                    .record(
                        machine,
                        EventType::Warning,
                        reasons::MACHINE_SETUP_FAILURE,
                        actions::CONFIGURE,
                        format!("Machine {} configuration failure: {}", name, error),
                    )
                    .await;
                Err(ControllerError::Configuration(error))
            }
        }
    }

    /// The deployed userData must be what the current key generates
    async fn validate_user_data(&self, signer: &Signer) -> Result<(), ControllerError> {
        let expected = generate_user_data(signer.private_key()).map_err(ControllerError::InvalidKey)?;
        let namespace = &self.settings.machine_api_namespace;
        let deployed = self
            .client
            .get_secret_data(namespace, USER_DATA_SECRET, USER_DATA_SECRET_KEY)
            .await?;
        if deployed != expected.content {
            return Err(ControllerError::UserDataMismatch(format!(
                "secret {}/{} was not generated from the current private key",
                namespace, USER_DATA_SECRET
            )));
        }
        Ok(())
    }

    fn instance_info(&self, machine: &Machine) -> Result<InstanceInfo, ControllerError> {
        let name = machine.name_any();
        let ip = machine.internal_ip().ok_or_else(|| {
            ControllerError::InvalidMachine(format!("machine {} has no internal IP address", name))
        })?;
        let provider_id = machine
            .spec
            .provider_id
            .as_deref()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| ControllerError::InvalidMachine(format!("machine {} has no provider ID", name)))?;
        let instance_id = instance_id(provider_id).ok_or_else(|| {
            ControllerError::InvalidMachine(format!(
                "unable to get instance ID from provider ID {:?} of machine {}",
                provider_id, name
            ))
        })?;

        Ok(InstanceInfo {
            ip: ip.to_string(),
            instance_id: instance_id.to_string(),
            machine_name: name,
            service_cidr: self.settings.service_cidr.clone(),
            vxlan_port: self.settings.vxlan_port.clone(),
            platform: self.settings.platform.clone(),
        })
    }

    /// Delete a machine so its machine set replaces it
    async fn delete_machine(&self, machine: &Machine) -> Result<(), ControllerError> {
        let key = MachineKey::from_machine(machine);
        if machine.is_being_deleted() {
            debug!("Machine {} is already being deleted", key);
            return Ok(());
        }

        if let Err(e) = self.client.delete_machine(&key.namespace, &key.name).await {
            self.events
                .record(
                    machine,
                    EventType::Warning,
                    reasons::MACHINE_DELETION_FAILED,
                    actions::DELETE,
                    format!("Machine {} deletion failed: {}", key, e),
                )
                .await;
            return Err(e.into());
        }

        info!("Deleted machine {}", key);
        self.events
            .record(
                machine,
                EventType::Normal,
                reasons::MACHINE_DELETED,
                actions::DELETE,
                format!("Machine {} has been remediated by deleting the Machine object", key),
            )
            .await;
        Ok(())
    }

    async fn configure_fleet(&self) -> Result<(), ControllerError> {
        self.fleet.configure().await.map_err(ControllerError::Fleet)
    }
}

/// Cloud instance identifier: the last path segment of a provider ID,
/// e.g. `i-078285fdadccb2eaa` for `aws:///us-east-1e/i-078285fdadccb2eaa`
pub fn instance_id(provider_id: &str) -> Option<&str> {
    provider_id.rsplit('/').next().filter(|id| !id.is_empty())
}
