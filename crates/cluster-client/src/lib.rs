//! Cluster Store Client
//!
//! Narrow access layer over the Kubernetes API for the Windows machine
//! controller. Everything the reconciler reads or writes goes through
//! [`ClusterClientTrait`], so the decision logic can run against the
//! in-memory [`MockClusterClient`] in tests.
//!
//! # Example
//!
//! ```no_run
//! use cluster_client::{ClusterClientTrait, KubeClusterClient};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = KubeClusterClient::new(kube::Client::try_default().await?);
//!
//! let key = client.get_private_key("openshift-windows-machine-config-operator").await?;
//! let machines = client
//!     .list_machines("openshift-machine-api", crds::WINDOWS_MACHINE_SELECTOR)
//!     .await?;
//! # let _ = (key, machines);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
#[path = "trait.rs"]
pub mod cluster_trait;
pub mod selector;
#[cfg(feature = "test-util")]
pub mod mock;

pub use client::KubeClusterClient;
pub use cluster_trait::ClusterClientTrait;
pub use error::ClusterError;
#[cfg(feature = "test-util")]
pub use mock::MockClusterClient;
