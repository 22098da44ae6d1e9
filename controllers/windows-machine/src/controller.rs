//! Main controller implementation.
//!
//! Wires the cluster client, node configurator, fleet configurator and event
//! recorder into the reconciler, then runs the machine watcher and the probe
//! server side by side.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::events::KubeMachineEventRecorder;
use crate::filter::EventFilter;
use crate::probes;
use crate::reconciler::{Reconciler, ReconcilerSettings};
use crate::watcher::{Context, Watcher};
use cluster_client::{ClusterClientTrait, KubeClusterClient};
use kube::Client;
use nodeconfig::{PrometheusNodeConfig, SshConfiguratorFactory, SshSettings};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Name events are reported under
const CONTROLLER_NAME: &str = "windows-machine-controller";

/// Main controller for Windows machines.
pub struct Controller {
    machine_watcher: JoinHandle<Result<(), ControllerError>>,
    probe_server: JoinHandle<Result<(), ControllerError>>,
}

impl Controller {
    /// Creates a new controller instance.
    pub async fn new(config: ControllerConfig) -> Result<Self, ControllerError> {
        info!("Initializing Windows Machine Controller");

        let kube_client = Client::try_default().await?;
        let cluster: Arc<dyn ClusterClientTrait> = Arc::new(KubeClusterClient::new(kube_client.clone()));

        // The key can be created after startup, so a missing secret is not fatal
        match cluster.get_private_key(&config.watch_namespace).await {
            Ok(_) => info!("Private key secret found"),
            Err(e) => warn!(
                "Private key secret not readable yet, machines will not be configured until it is: {}",
                e
            ),
        }

        let configurators = Arc::new(SshConfiguratorFactory::new(
            Arc::clone(&cluster),
            SshSettings::new(&config.ssh_user, &config.bootstrap_script, &config.operator_version),
        ));
        let fleet = Arc::new(PrometheusNodeConfig::new(Arc::clone(&cluster), &config.watch_namespace));
        let events = Arc::new(KubeMachineEventRecorder::new(kube_client.clone(), CONTROLLER_NAME));

        let reconciler = Reconciler::new(
            Arc::clone(&cluster),
            configurators,
            fleet,
            events,
            ReconcilerSettings {
                watch_namespace: config.watch_namespace.clone(),
                machine_api_namespace: config.machine_api_namespace.clone(),
                operator_version: config.operator_version.clone(),
                service_cidr: config.service_cidr.clone(),
                vxlan_port: config.vxlan_port.clone(),
                platform: config.platform.clone(),
            },
        );
        let context = Arc::new(Context::new(
            reconciler,
            EventFilter::new(config.operator_version.clone()),
        ));

        let ready = Arc::new(AtomicBool::new(false));
        let watcher = Watcher::new(
            kube_client,
            cluster,
            context,
            config.machine_api_namespace.clone(),
            config.operator_version.clone(),
            Arc::clone(&ready),
        );

        let machine_watcher = tokio::spawn(watcher.run());
        let probe_server = tokio::spawn(probes::serve(config.probe_addr, ready));

        Ok(Self {
            machine_watcher,
            probe_server,
        })
    }

    /// Runs the controller until shutdown.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("Windows Machine Controller running");

        // Wait for either task to exit (they should run forever)
        tokio::select! {
            result = &mut self.machine_watcher => {
                result.map_err(|e| ControllerError::Watch(format!("Machine watcher panicked: {}", e)))??;
            }
            result = &mut self.probe_server => {
                result.map_err(|e| ControllerError::Watch(format!("Probe server panicked: {}", e)))??;
            }
        }

        Ok(())
    }
}
