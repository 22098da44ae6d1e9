//! Windows Machine Controller
//!
//! Turns Windows Machines into cluster Nodes:
//! - Provisioned machines are configured over SSH and join the cluster
//! - Running machines whose Node was configured by another operator version
//!   or with a rotated key are deleted so their MachineSet replaces them,
//!   one at a time per MachineSet
//! - The metrics Endpoints object tracks every configured Windows node

mod backoff;
mod config;
mod controller;
mod error;
mod events;
mod filter;
mod probes;
mod reconciler;
#[cfg(test)]
mod test_utils;
mod watcher;

use crate::config::ControllerConfig;
use crate::controller::Controller;
use crate::error::ControllerError;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    // Install rustls crypto provider
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("rustls crypto provider was already installed");
    }

    info!("Starting Windows Machine Controller");

    let config = ControllerConfig::from_env()?;
    info!("Configuration:");
    info!("  Watch namespace: {}", config.watch_namespace);
    info!("  Machine API namespace: {}", config.machine_api_namespace);
    info!("  Operator version: {}", config.operator_version);
    info!("  Service CIDR: {}", config.service_cidr);
    info!("  Platform: {}", config.platform);
    info!("  VXLAN port: {}", config.vxlan_port.as_deref().unwrap_or("default"));

    // Initialize and run controller
    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
