//! Windows Node Configuration
//!
//! Collaborators the Windows machine controller delegates to once it has
//! decided a machine needs configuring:
//!
//! - [`Signer`] parses the cloud private key and derives the public key
//!   fingerprint stamped on configured Nodes.
//! - [`generate_user_data`] renders the bootstrap payload that authorizes the
//!   key on a fresh instance.
//! - [`ConfiguratorFactory`] / [`NodeConfigurator`] run the OS-level setup;
//!   [`SshConfiguratorFactory`] does it by invoking the system `ssh` client.
//! - [`FleetConfigurator`] keeps fleet-wide state current;
//!   [`PrometheusNodeConfig`] maintains the metrics Endpoints object.

pub mod configurator;
pub mod error;
pub mod prometheus;
pub mod signer;
pub mod ssh;
pub mod userdata;

pub use configurator::{ConfiguratorFactory, InstanceInfo, NodeConfigurator};
pub use error::{ConfigErrorKind, NodeConfigError};
pub use prometheus::{FleetConfigurator, PrometheusNodeConfig};
pub use signer::Signer;
pub use ssh::{SshConfiguratorFactory, SshSettings};
pub use userdata::{generate_user_data, UserData};
