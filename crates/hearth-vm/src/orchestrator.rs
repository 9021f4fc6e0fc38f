//! Ordered creation sequence for a microVM.
//!
//! 1. normalize boot arguments
//! 2. boot source
//! 3. root drive, under [`ROOT_DRIVE_ID`]
//! 4. remaining drives, in declaration order
//! 5. machine sizing
//! 6. network interfaces, in declaration order
//! 7. `InstanceStart`
//!
//! The sequence stops at the first failure. Nothing is rolled back: the
//! Firecracker API has no transactions, so the [`ProvisionFailure`] lists
//! what was already applied.

use crate::boot_args::{self, ROOT_DRIVE_ID};
use crate::config::{DriveConfig, VmConfig};
use crate::configurator::Configurator;
use crate::error::VmError;
use crate::models::{ActionType, Component};
use crate::transport::Transport;
use std::fmt;
use std::time::Instant;
use thiserror::Error;

/// Steps of the creation sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisionStep {
    Validate,
    BootSource,
    RootDrive,
    Drives,
    MachineConfig,
    NetworkInterfaces,
    Start,
}

impl fmt::Display for ProvisionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProvisionStep::Validate => write!(f, "validate"),
            ProvisionStep::BootSource => write!(f, "boot-source"),
            ProvisionStep::RootDrive => write!(f, "root-drive"),
            ProvisionStep::Drives => write!(f, "drives"),
            ProvisionStep::MachineConfig => write!(f, "machine-config"),
            ProvisionStep::NetworkInterfaces => write!(f, "network-interfaces"),
            ProvisionStep::Start => write!(f, "start"),
        }
    }
}

/// A creation sequence that stopped part way.
#[derive(Debug, Error)]
#[error("provisioning failed at step {step} ({} component(s) already applied): {source}", .applied.len())]
pub struct ProvisionFailure {
    /// Step that failed
    pub step: ProvisionStep,
    /// Components applied before the failure, in order
    pub applied: Vec<Component>,
    /// Originating error
    #[source]
    pub source: VmError,
}

/// Outcome of a successful creation sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionReport {
    /// Kernel command line actually sent
    pub boot_args: String,
    /// Components applied, in order, ending with the start action
    pub applied: Vec<Component>,
}

/// Runs the creation sequence against one Firecracker API.
pub struct Orchestrator<'a> {
    configurator: Configurator<'a>,
}

impl<'a> Orchestrator<'a> {
    pub fn new(transport: &'a dyn Transport) -> Self {
        Self {
            configurator: Configurator::new(transport),
        }
    }

    /// Configure every component of `config` and boot the VM.
    ///
    /// # Errors
    /// Returns a [`ProvisionFailure`] naming the failing step. Validation
    /// failures are reported before any request is sent.
    pub async fn provision(&self, config: &VmConfig) -> Result<ProvisionReport, ProvisionFailure> {
        let start = Instant::now();
        let mut applied = Vec::new();

        config
            .validate()
            .map_err(|e| failure(ProvisionStep::Validate, &applied, e))?;
        let (root_index, root) = split_root(config)
            .ok_or_else(|| {
                VmError::Validation("exactly one drive must be the root device".into())
            })
            .map_err(|e| failure(ProvisionStep::Validate, &applied, e))?;

        tracing::info!(
            kernel = %config.kernel_image_path.display(),
            drives = config.drives.len(),
            network_interfaces = config.network_interfaces.len(),
            vcpu_count = config.machine_config.vcpu_count,
            mem_size_mib = config.machine_config.mem_size_mib,
            "Provisioning microVM"
        );

        let boot_args = boot_args::normalize(config.boot_args());
        tracing::debug!(boot_args = %boot_args, "Normalized boot arguments");

        self.configurator
            .apply_boot_source(&config.kernel_image_path, &boot_args)
            .await
            .map_err(|e| failure(ProvisionStep::BootSource, &applied, e))?;
        applied.push(Component::BootSource);

        let canonical_root = DriveConfig {
            drive_id: ROOT_DRIVE_ID.to_string(),
            ..root.clone()
        };
        tracing::debug!(
            declared_id = %root.drive_id,
            drive_id = ROOT_DRIVE_ID,
            path_on_host = %root.path_on_host.display(),
            "Configuring root drive"
        );
        self.configurator
            .apply_drive(&canonical_root)
            .await
            .map_err(|e| failure(ProvisionStep::RootDrive, &applied, e))?;
        applied.push(Component::Drive(ROOT_DRIVE_ID.to_string()));

        for (index, drive) in config.drives.iter().enumerate() {
            if index == root_index {
                continue;
            }
            self.configurator
                .apply_drive(drive)
                .await
                .map_err(|e| failure(ProvisionStep::Drives, &applied, e))?;
            applied.push(Component::Drive(drive.drive_id.clone()));
        }

        self.configurator
            .apply_machine_config(config.machine_config)
            .await
            .map_err(|e| failure(ProvisionStep::MachineConfig, &applied, e))?;
        applied.push(Component::MachineConfig);

        for iface in &config.network_interfaces {
            self.configurator
                .apply_network_interface(iface)
                .await
                .map_err(|e| failure(ProvisionStep::NetworkInterfaces, &applied, e))?;
            applied.push(Component::NetworkInterface(iface.iface_id.clone()));
        }

        self.configurator
            .send_action(ActionType::InstanceStart)
            .await
            .map_err(|e| failure(ProvisionStep::Start, &applied, e))?;
        applied.push(Component::Action(ActionType::InstanceStart));

        tracing::info!(
            components = applied.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "MicroVM started"
        );
        Ok(ProvisionReport { boot_args, applied })
    }
}

fn split_root(config: &VmConfig) -> Option<(usize, &DriveConfig)> {
    let root = config.root_drive()?;
    let index = config
        .drives
        .iter()
        .position(|drive| std::ptr::eq(drive, root))?;
    Some((index, root))
}

fn failure(step: ProvisionStep, applied: &[Component], source: VmError) -> ProvisionFailure {
    tracing::error!(%step, applied = applied.len(), error = %source, "Provisioning aborted");
    ProvisionFailure {
        step,
        applied: applied.to_vec(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tests::sample_config;
    use crate::config::{Flag, NetworkConfig};
    use crate::testing::RecordingTransport;
    use hyper::Method;
    use serde_json::json;

    #[tokio::test]
    async fn test_single_root_drive_sequence() {
        let transport = RecordingTransport::new();
        let report = Orchestrator::new(&transport)
            .provision(&sample_config())
            .await
            .unwrap();

        assert_eq!(
            transport.trace(),
            vec![
                "PUT /boot-source",
                "PUT /drives/rootfs",
                "PUT /machine-config",
                "PUT /actions",
            ]
        );
        assert_eq!(report.applied.len(), 4);
        assert_eq!(
            transport.last_body(Method::PUT, "/drives/rootfs"),
            Some(json!({
                "drive_id": "rootfs",
                "path_on_host": "/img/root.ext4",
                "is_root_device": true,
                "is_read_only": false
            }))
        );
        assert_eq!(
            transport.last_body(Method::PUT, "/machine-config"),
            Some(json!({"vcpu_count": 2, "mem_size_mib": 1024}))
        );
    }

    #[tokio::test]
    async fn test_root_drive_configured_first() {
        let mut config = sample_config();
        config.drives = vec![
            DriveConfig::new("scratch", "/img/scratch.ext4", false, false),
            DriveConfig::new("data", "/img/data.ext4", false, true),
            DriveConfig::new("system", "/img/root.ext4", true, false),
        ];

        let transport = RecordingTransport::new();
        Orchestrator::new(&transport).provision(&config).await.unwrap();

        let drives: Vec<String> = transport
            .trace()
            .into_iter()
            .filter(|call| call.starts_with("PUT /drives/"))
            .collect();
        assert_eq!(
            drives,
            vec![
                "PUT /drives/rootfs",
                "PUT /drives/scratch",
                "PUT /drives/data"
            ]
        );
        assert_eq!(transport.trace()[0], "PUT /boot-source");
    }

    #[tokio::test]
    async fn test_invalid_config_sends_nothing() {
        let mut config = sample_config();
        config.drives.push(DriveConfig::new("other", "/img/other.ext4", true, false));

        let transport = RecordingTransport::new();
        let failure = Orchestrator::new(&transport)
            .provision(&config)
            .await
            .unwrap_err();

        assert_eq!(failure.step, ProvisionStep::Validate);
        assert!(matches!(failure.source, VmError::Validation(_)));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_boot_args_normalized_before_boot_source() {
        let mut config = sample_config();
        config.boot_args = Some("console=ttyS0 root=/dev/vda rw".into());

        let transport = RecordingTransport::new();
        let report = Orchestrator::new(&transport).provision(&config).await.unwrap();

        assert_eq!(
            report.boot_args,
            "console=ttyS0 root=/dev/disk/by-id/virtio-rootfs rw"
        );
        let body = transport.last_body(Method::PUT, "/boot-source").unwrap();
        assert_eq!(body["boot_args"], json!(report.boot_args));
    }

    #[tokio::test]
    async fn test_stops_at_first_failure() {
        let mut config = sample_config();
        config.drives.push(DriveConfig::new("data", "/img/data.ext4", false, false));
        config.network_interfaces.push(NetworkConfig {
            iface_id: "eth0".into(),
            host_dev_name: "tap0".into(),
            guest_mac: None,
        });

        let transport = RecordingTransport::new();
        transport.respond(
            Method::PUT,
            "/drives/data",
            400,
            r#"{"fault_message":"Unable to open block device"}"#,
        );

        let failure = Orchestrator::new(&transport)
            .provision(&config)
            .await
            .unwrap_err();

        assert_eq!(failure.step, ProvisionStep::Drives);
        assert_eq!(
            failure.applied,
            vec![
                Component::BootSource,
                Component::Drive(ROOT_DRIVE_ID.into())
            ]
        );
        assert!(matches!(
            failure.source,
            VmError::Configuration { status: 400, .. }
        ));
        assert_eq!(
            transport.trace().last().map(String::as_str),
            Some("PUT /drives/data")
        );
    }

    #[tokio::test]
    async fn test_start_failure_keeps_applied_components() {
        let transport = RecordingTransport::new();
        transport.respond(Method::PUT, "/actions", 400, "bad kernel");

        let failure = Orchestrator::new(&transport)
            .provision(&sample_config())
            .await
            .unwrap_err();

        assert_eq!(failure.step, ProvisionStep::Start);
        assert_eq!(failure.applied.len(), 3);
        assert!(failure.to_string().contains("start"));
    }

    #[tokio::test]
    async fn test_network_interfaces_in_order() {
        let mut config = sample_config();
        config.network_interfaces = vec![
            NetworkConfig {
                iface_id: "eth1".into(),
                host_dev_name: "tap1".into(),
                guest_mac: Some("06:00:AC:10:00:02".into()),
            },
            NetworkConfig {
                iface_id: "eth0".into(),
                host_dev_name: "tap0".into(),
                guest_mac: None,
            },
        ];

        let transport = RecordingTransport::new();
        Orchestrator::new(&transport).provision(&config).await.unwrap();

        assert_eq!(
            transport.trace(),
            vec![
                "PUT /boot-source",
                "PUT /drives/rootfs",
                "PUT /machine-config",
                "PUT /network-interfaces/eth1",
                "PUT /network-interfaces/eth0",
                "PUT /actions",
            ]
        );
        assert_eq!(
            transport.last_body(Method::PUT, "/network-interfaces/eth1"),
            Some(json!({"iface_id": "eth1", "host_dev_name": "tap1", "guest_mac": "06:00:AC:10:00:02"}))
        );
    }

    #[tokio::test]
    async fn test_stringified_root_flag() {
        let mut config = sample_config();
        config.drives = vec![
            DriveConfig {
                drive_id: "data".into(),
                path_on_host: "/img/data.ext4".into(),
                is_root_device: Flag::Text("false".into()),
                is_read_only: Flag::Text("true".into()),
            },
            DriveConfig {
                drive_id: "root".into(),
                path_on_host: "/img/root.ext4".into(),
                is_root_device: Flag::Text("true".into()),
                is_read_only: Flag::Text("false".into()),
            },
        ];

        let transport = RecordingTransport::new();
        Orchestrator::new(&transport).provision(&config).await.unwrap();

        let root = transport.last_body(Method::PUT, "/drives/rootfs").unwrap();
        assert_eq!(root["is_root_device"], json!(true));
        assert_eq!(root["is_read_only"], json!(false));
        let data = transport.last_body(Method::PUT, "/drives/data").unwrap();
        assert_eq!(data["is_read_only"], json!(true));
    }
}
