//! Controller configuration.
//!
//! All settings come from environment variables and are read once at startup.

use crate::error::ControllerError;
use std::net::SocketAddr;

/// Runtime settings for the Windows machine controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// Namespace holding the private key secret and the metrics Endpoints
    pub watch_namespace: String,
    /// Namespace holding Machines, MachineSets and the userData secret
    pub machine_api_namespace: String,
    pub service_cidr: String,
    pub vxlan_port: Option<String>,
    pub platform: String,
    /// Build identifier written to configured Nodes
    pub operator_version: String,
    pub ssh_user: String,
    pub bootstrap_script: String,
    pub probe_addr: SocketAddr,
}

impl ControllerConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, ControllerError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary lookup function.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ControllerError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // Empty values count as unset
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let get_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let service_cidr = get("SERVICE_CIDR").ok_or_else(|| {
            ControllerError::InvalidConfig("SERVICE_CIDR environment variable is required".to_string())
        })?;

        let probe_addr = get_or("PROBE_ADDR", "0.0.0.0:8081");
        let probe_addr = probe_addr.parse().map_err(|e| {
            ControllerError::InvalidConfig(format!("PROBE_ADDR {:?} is not a socket address: {}", probe_addr, e))
        })?;

        Ok(Self {
            watch_namespace: get_or("WATCH_NAMESPACE", "openshift-windows-machine-config-operator"),
            machine_api_namespace: get_or("MACHINE_API_NAMESPACE", "openshift-machine-api"),
            service_cidr,
            vxlan_port: get("VXLAN_PORT"),
            platform: get_or("PLATFORM", "None"),
            operator_version: get_or("OPERATOR_VERSION", env!("CARGO_PKG_VERSION")),
            ssh_user: get_or("SSH_USER", "Administrator"),
            bootstrap_script: get_or("BOOTSTRAP_SCRIPT", r"C:\k\bootstrap.ps1"),
            probe_addr,
        })
    }
}
