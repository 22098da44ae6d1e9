//! SSH-driven node configurator
//!
//! Shells out to the system `ssh` client to run the bootstrap script on the
//! instance, waits for the kubelet to register a Node with the instance's
//! IP, then stamps the Node with the operator version and key fingerprint.

use crate::configurator::{ConfiguratorFactory, InstanceInfo, NodeConfigurator};
use crate::error::NodeConfigError;
use crate::signer::Signer;
use cluster_client::ClusterClientTrait;
use crds::{PUB_KEY_HASH_ANNOTATION, VERSION_ANNOTATION, WINDOWS_NODE_SELECTOR};
use k8s_openapi::api::core::v1::Node;
use kube::ResourceExt;
use std::collections::BTreeMap;
use std::io::Write;
use std::net::IpAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Exit status `ssh` uses for its own failures (as opposed to the remote command's)
const SSH_ERROR_EXIT_CODE: i32 = 255;

/// Settings shared by every configurator the factory creates
#[derive(Debug, Clone)]
pub struct SshSettings {
    pub user: String,
    pub bootstrap_script: String,
    pub operator_version: String,
    /// How long to wait for the Node to register after bootstrap
    pub node_wait: Duration,
    pub poll_interval: Duration,
}

impl SshSettings {
    pub fn new(user: impl Into<String>, bootstrap_script: impl Into<String>, operator_version: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            bootstrap_script: bootstrap_script.into(),
            operator_version: operator_version.into(),
            node_wait: Duration::from_secs(600),
            poll_interval: Duration::from_secs(10),
        }
    }
}

/// Creates [`SshConfigurator`]s
pub struct SshConfiguratorFactory {
    client: Arc<dyn ClusterClientTrait>,
    settings: SshSettings,
}

impl std::fmt::Debug for SshConfiguratorFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SshConfiguratorFactory")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl SshConfiguratorFactory {
    pub fn new(client: Arc<dyn ClusterClientTrait>, settings: SshSettings) -> Self {
        Self { client, settings }
    }
}

impl ConfiguratorFactory for SshConfiguratorFactory {
    fn create(
        &self,
        instance: InstanceInfo,
        signer: &Signer,
    ) -> Result<Box<dyn NodeConfigurator>, NodeConfigError> {
        let ip: IpAddr = instance.ip.parse().map_err(|_| {
            NodeConfigError::InvalidInstance(format!("invalid IP address {:?}", instance.ip))
        })?;
        if instance.instance_id.is_empty() {
            return Err(NodeConfigError::InvalidInstance(format!(
                "machine {} has an empty instance id",
                instance.machine_name
            )));
        }

        Ok(Box::new(SshConfigurator {
            client: Arc::clone(&self.client),
            settings: self.settings.clone(),
            ip,
            instance,
            private_key: signer.private_key().to_vec(),
            fingerprint: signer.public_key_fingerprint().to_string(),
        }))
    }
}

/// Configures one Windows instance over SSH
pub struct SshConfigurator {
    client: Arc<dyn ClusterClientTrait>,
    settings: SshSettings,
    ip: IpAddr,
    instance: InstanceInfo,
    private_key: Vec<u8>,
    fingerprint: String,
}

impl SshConfigurator {
    /// Arguments passed to `ssh`, key file first, remote command last
    fn ssh_args(&self, key_file: &Path) -> Vec<String> {
        vec![
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            "UserKnownHostsFile=/dev/null".to_string(),
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "ConnectTimeout=10".to_string(),
            "-i".to_string(),
            key_file.display().to_string(),
            format!("{}@{}", self.settings.user, self.ip),
            self.bootstrap_command(),
        ]
    }

    /// PowerShell invocation of the bootstrap script
    fn bootstrap_command(&self) -> String {
        let mut command = format!(
            "powershell.exe -NonInteractive -ExecutionPolicy Bypass -File {} -NodeName {} -ServiceCIDR {} -Platform {}",
            self.settings.bootstrap_script,
            self.instance.machine_name,
            self.instance.service_cidr,
            self.instance.platform,
        );
        if let Some(port) = &self.instance.vxlan_port {
            command.push_str(" -VXLANPort ");
            command.push_str(port);
        }
        command
    }

    async fn run_bootstrap(&self) -> Result<(), NodeConfigError> {
        // NamedTempFile is created with mode 0600, which ssh insists on
        let mut key_file = tempfile::NamedTempFile::new()?;
        key_file.write_all(&self.private_key)?;
        key_file.flush()?;

        let args = self.ssh_args(key_file.path());
        debug!("Running bootstrap on {}", self.id());
        let output = Command::new("ssh").args(&args).output().await?;
        if output.status.success() {
            return Ok(());
        }

        let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
        Err(classify_failure(
            self.bootstrap_command(),
            output.status.code(),
            stderr,
        ))
    }

    /// Wait for the Node with our IP, then record version and key fingerprint
    async fn register_node(&self) -> Result<String, NodeConfigError> {
        let node = self.wait_for_node().await?;
        let name = node.name_any();

        let annotations = BTreeMap::from([
            (VERSION_ANNOTATION.to_string(), self.settings.operator_version.clone()),
            (PUB_KEY_HASH_ANNOTATION.to_string(), self.fingerprint.clone()),
        ]);
        self.client.patch_node_annotations(&name, &annotations).await?;
        Ok(name)
    }

    async fn wait_for_node(&self) -> Result<Node, NodeConfigError> {
        let ip = self.ip.to_string();
        let deadline = tokio::time::Instant::now() + self.settings.node_wait;
        loop {
            match self.client.list_nodes(WINDOWS_NODE_SELECTOR).await {
                Ok(nodes) => {
                    if let Some(node) = nodes.into_iter().find(|n| has_internal_ip(n, &ip)) {
                        return Ok(node);
                    }
                }
                Err(e) => warn!("Listing nodes while waiting for {}: {}", self.id(), e),
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(NodeConfigError::NodeNotReady(self.id()));
            }
            tokio::time::sleep(self.settings.poll_interval).await;
        }
    }
}

#[async_trait::async_trait]
impl NodeConfigurator for SshConfigurator {
    async fn configure(&self) -> Result<(), NodeConfigError> {
        self.run_bootstrap().await?;
        let node = self.register_node().await?;
        info!("Instance {} configured as node {}", self.id(), node);
        Ok(())
    }

    fn id(&self) -> String {
        format!("{} ({})", self.instance.instance_id, self.ip)
    }
}

/// Map a failed `ssh` run to an error, singling out rejected credentials
fn classify_failure(command: String, code: Option<i32>, stderr: String) -> NodeConfigError {
    if code == Some(SSH_ERROR_EXIT_CODE) && stderr.contains("Permission denied") {
        return NodeConfigError::Authentication(stderr);
    }
    NodeConfigError::Command {
        command,
        code,
        stderr,
    }
}

fn has_internal_ip(node: &Node, ip: &str) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.addresses.as_ref())
        .is_some_and(|addresses| {
            addresses
                .iter()
                .any(|a| a.type_ == "InternalIP" && a.address == ip)
        })
}
