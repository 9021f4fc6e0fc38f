//! # hearth-core
//!
//! Lifecycle layer for Firecracker microVMs.
//!
//! Maps create/read/update/delete requests onto the provisioning engine in
//! `hearth-vm` and keeps the local [`VmRecord`] a host process persists.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │               hearth-core (host)             │
//! │                                              │
//! │  ┌─────────────────────┐   ┌─────────────┐   │
//! │  │ LifecycleController │──▶│  VmRecord   │   │
//! │  │  - create()         │   └─────────────┘   │
//! │  │  - read()           │                     │
//! │  │  - update()         │   ┌─────────────┐   │
//! │  │  - delete()         │──▶│ UpdatePlan  │   │
//! │  │  - lookup()         │   └─────────────┘   │
//! │  └─────────────────────┘                     │
//! │             │                                │
//! └─────────────┼────────────────────────────────┘
//!               ▼
//! ┌──────────────────────────────────────────────┐
//! │ hearth-vm: Orchestrator / Reconciler         │
//! │            RetryTransport<HttpTransport>     │
//! └──────────────────────────────────────────────┘
//!               │ HTTP over Unix socket
//!               ▼
//!        Firecracker API server
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use hearth_core::{LifecycleController, ProviderConfig};
//! use hearth_vm::{DriveConfig, MachineSizing, VmConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let controller = LifecycleController::new(&ProviderConfig::from_env()?)?;
//!
//! let record = controller
//!     .create(VmConfig {
//!         kernel_image_path: "/var/lib/hearth/vmlinux".into(),
//!         boot_args: None,
//!         drives: vec![DriveConfig::new("root", "/var/lib/hearth/rootfs.ext4", true, false)],
//!         machine_config: MachineSizing::default(),
//!         network_interfaces: Vec::new(),
//!     })
//!     .await?;
//!
//! controller.delete(&record).await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod lifecycle;
pub mod record;

pub use config::{ProviderConfig, ProviderConfigBuilder};
pub use error::{CoreError, Result};
pub use lifecycle::{DeleteOutcome, LifecycleController, UpdatePlan};
pub use record::{VmId, VmPhase, VmRecord};
