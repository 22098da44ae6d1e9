//! Machine resource
//!
//! A Machine is the machine-api record for one compute instance, independent
//! of whether it has joined the cluster as a Node yet. Only the fields the
//! controller reads are modelled; everything else is ignored on deserialize.

use kube::CustomResource;
use kube::ResourceExt;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::well_known::{MACHINE_OS_LABEL, WINDOWS_MACHINE_OS};

#[derive(CustomResource, Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "machine.openshift.io",
    version = "v1beta1",
    kind = "Machine",
    namespaced,
    status = "MachineStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct MachineSpec {
    /// Cloud provider identifier, e.g. `aws:///us-east-1e/i-078285fdadccb2eaa`
    #[serde(default, rename = "providerID", skip_serializing_if = "Option::is_none")]
    pub provider_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct MachineStatus {
    /// Coarse lifecycle stage reported by the machine-api
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,

    /// Network addresses assigned to the instance
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub addresses: Vec<MachineAddress>,

    /// Node produced by this machine, once it has joined the cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_ref: Option<NodeReference>,
}

/// Typed network address (`InternalIP`, `ExternalIP`, `InternalDNS`, ...)
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub struct MachineAddress {
    #[serde(rename = "type")]
    pub address_type: String,
    pub address: String,
}

impl MachineAddress {
    /// Address type used for cluster-internal IPs
    pub const INTERNAL_IP: &'static str = "InternalIP";

    pub fn internal_ip(address: impl Into<String>) -> Self {
        Self {
            address_type: Self::INTERNAL_IP.to_string(),
            address: address.into(),
        }
    }
}

/// Back-reference from a Machine to its Node
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NodeReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
}

/// Machine lifecycle phase.
///
/// The machine-api reports phases as free-form strings; the ones the
/// controller branches on get their own variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MachinePhase {
    Provisioning,
    Provisioned,
    Running,
    Failed,
    Deleting,
    Other(String),
}

impl MachinePhase {
    pub fn parse(phase: &str) -> Self {
        match phase {
            "Provisioning" => Self::Provisioning,
            "Provisioned" => Self::Provisioned,
            "Running" => Self::Running,
            "Failed" => Self::Failed,
            "Deleting" => Self::Deleting,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for MachinePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Provisioning => "Provisioning",
            Self::Provisioned => "Provisioned",
            Self::Running => "Running",
            Self::Failed => "Failed",
            Self::Deleting => "Deleting",
            Self::Other(other) => other,
        };
        f.write_str(s)
    }
}

impl Machine {
    /// Current phase, `None` when the machine-api has not reported one yet
    pub fn phase(&self) -> Option<MachinePhase> {
        self.status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .map(MachinePhase::parse)
    }

    pub fn addresses(&self) -> &[MachineAddress] {
        self.status.as_ref().map_or(&[], |s| s.addresses.as_slice())
    }

    pub fn node_ref(&self) -> Option<&NodeReference> {
        self.status.as_ref().and_then(|s| s.node_ref.as_ref())
    }

    /// Last `InternalIP` address reported for the machine
    pub fn internal_ip(&self) -> Option<&str> {
        self.addresses()
            .iter()
            .rev()
            .find(|a| a.address_type == MachineAddress::INTERNAL_IP)
            .map(|a| a.address.as_str())
    }

    /// True when the machine carries the Windows machine OS label
    pub fn is_windows(&self) -> bool {
        self.labels().get(MACHINE_OS_LABEL).map(String::as_str) == Some(WINDOWS_MACHINE_OS)
    }

    /// Name of the owning machine set, taken from the first owner reference
    pub fn owner_name(&self) -> Option<&str> {
        self.owner_references().first().map(|o| o.name.as_str())
    }

    pub fn is_being_deleted(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }
}
