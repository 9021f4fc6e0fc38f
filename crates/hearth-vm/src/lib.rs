//! # hearth-vm
//!
//! Provisioning layer for Firecracker microVMs.
//! Turns a desired [`VmConfig`] into the ordered sequence of Firecracker API
//! calls that boots it, and reads the configuration back.
//!
//! ## Quick Start
//!
//! ```no_run
//! use hearth_vm::{
//!     DriveConfig, HttpTransport, MachineSizing, Orchestrator, Reconciler, RetryPolicy,
//!     RetryTransport, TransportConfig, VmConfig,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = TransportConfig {
//!     endpoint: "unix:///tmp/firecracker.socket".parse()?,
//!     ..Default::default()
//! };
//! let transport = RetryTransport::new(HttpTransport::new(&config), RetryPolicy::from(&config));
//!
//! let vm = VmConfig {
//!     kernel_image_path: "/var/lib/hearth/vmlinux".into(),
//!     boot_args: None,
//!     drives: vec![DriveConfig::new("root", "/var/lib/hearth/rootfs.ext4", true, false)],
//!     machine_config: MachineSizing { vcpu_count: 2, mem_size_mib: 1024 },
//!     network_interfaces: Vec::new(),
//! };
//!
//! // Boot source, root drive, other drives, sizing, interfaces, InstanceStart
//! Orchestrator::new(&transport).provision(&vm).await?;
//!
//! // Best-effort read-back
//! if let Some(state) = Reconciler::new(&transport).fetch("my-vm").await? {
//!     println!("{:?}", state.machine_config);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Layers
//!
//! - **Transport**: one HTTP request against the API socket, with timeout;
//!   [`RetryTransport`] adds backoff without repeating uncertain writes
//! - **Configurator**: one sub-resource to its wire body and endpoint
//! - **Orchestrator**: the ordered creation sequence
//! - **Reconciler**: per-endpoint read-back merged into [`RemoteVmState`]

mod boot_args;
mod config;
mod configurator;
mod error;
mod models;
mod orchestrator;
mod reconciler;
mod retry;
mod transport;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use boot_args::{normalize as normalize_boot_args, stable_root_device, ROOT_DRIVE_ID};
pub use config::{
    is_valid_mac, DriveConfig, Flag, MachineSizing, NetworkConfig, VmConfig, DEFAULT_BOOT_ARGS,
    MEM_SIZE_RANGE, VCPU_RANGE,
};
pub use configurator::Configurator;
pub use error::{Result, TransportError, VmError};
pub use models::{
    ActionType, BootSource, Component, Drive, InstanceAction, MachineConfiguration,
    NetworkInterface,
};
pub use orchestrator::{Orchestrator, ProvisionFailure, ProvisionReport, ProvisionStep};
pub use reconciler::{Reconciler, ReconciliationGap, RemoteVmState};
pub use retry::{RetryPolicy, RetryTransport};
pub use transport::{
    ApiRequest, ApiResponse, Endpoint, HttpTransport, Transport, TransportConfig,
    DEFAULT_SOCKET_PATH,
};

// Re-exported so callers can build requests without depending on hyper.
pub use hyper::Method;
