//! Best-effort read-back of a VM's configuration.
//!
//! The Firecracker API is write-oriented: several `GET` endpoints answer
//! `400` ("Invalid request method") on some versions. `/machine-config` is
//! probed first to tell "process is alive" apart from "endpoint cannot be
//! read"; every other sub-resource is then read independently and failures
//! become [`ReconciliationGap`]s instead of errors.

use crate::config::MachineSizing;
use crate::error::{Result, VmError};
use crate::models::{BootSource, Drive, MachineConfiguration, NetworkInterface};
use crate::transport::{ApiRequest, Transport};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const PROBE_PATH: &str = "/machine-config";

/// A sub-resource whose state could not be read back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciliationGap {
    /// Endpoint that was read
    pub path: String,
    /// Why the value is unknown
    pub reason: String,
}

/// Merged view of what the Firecracker API reports.
///
/// `None` means "could not be read", not "does not exist"; the matching
/// entry in `gaps` says why.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteVmState {
    pub vm_id: String,
    pub machine_config: Option<MachineSizing>,
    pub boot_source: Option<BootSource>,
    pub drives: Option<Vec<Drive>>,
    pub network_interfaces: Option<Vec<NetworkInterface>>,
    #[serde(default)]
    pub gaps: Vec<ReconciliationGap>,
}

impl RemoteVmState {
    fn unknown(vm_id: &str) -> Self {
        Self {
            vm_id: vm_id.to_string(),
            machine_config: None,
            boot_source: None,
            drives: None,
            network_interfaces: None,
            gaps: Vec::new(),
        }
    }

    /// Drives that were read back; empty when unknown.
    pub fn drives(&self) -> &[Drive] {
        self.drives.as_deref().unwrap_or_default()
    }

    /// Network interfaces that were read back; empty when unknown.
    pub fn network_interfaces(&self) -> &[NetworkInterface] {
        self.network_interfaces.as_deref().unwrap_or_default()
    }

    /// Every sub-resource was read.
    pub fn is_complete(&self) -> bool {
        self.gaps.is_empty()
    }
}

enum Readback<T> {
    Found(T),
    Absent,
    Unknown,
}

/// Reads VM state through a [`Transport`].
pub struct Reconciler<'a> {
    transport: &'a dyn Transport,
}

impl<'a> Reconciler<'a> {
    pub fn new(transport: &'a dyn Transport) -> Self {
        Self { transport }
    }

    /// Read back the state of the VM served by this API.
    ///
    /// Returns `Ok(None)` when the API cannot be reached at all.
    ///
    /// # Errors
    /// Fails when the probe endpoint answers with an unexpected status or an
    /// unparseable body.
    pub async fn fetch(&self, vm_id: &str) -> Result<Option<RemoteVmState>> {
        tracing::debug!(%vm_id, "Checking if Firecracker VM exists");

        let probe = match self.transport.send(ApiRequest::get(PROBE_PATH)).await {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(%vm_id, error = %e, "Firecracker API unreachable, treating VM as absent");
                return Ok(None);
            }
        };

        let mut state = RemoteVmState::unknown(vm_id);
        match probe.status {
            200 => {
                let config: MachineConfiguration = probe.json()?;
                state.machine_config = Some(config.into());
            }
            400 | 404 | 405 => {
                tracing::warn!(%vm_id, status = probe.status, "Machine config not readable, VM is reachable");
                state.gaps.push(ReconciliationGap {
                    path: PROBE_PATH.to_string(),
                    reason: format!("status {}: {}", probe.status, probe.text()),
                });
            }
            status => {
                return Err(VmError::UnexpectedResponse {
                    path: PROBE_PATH.to_string(),
                    status,
                    body: probe.text(),
                });
            }
        }

        state.boot_source = match self.read::<BootSource>("/boot-source", &mut state.gaps).await {
            Readback::Found(boot_source) => Some(boot_source),
            Readback::Absent | Readback::Unknown => None,
        };
        state.drives = match self.read::<Vec<Drive>>("/drives", &mut state.gaps).await {
            Readback::Found(drives) => Some(drives),
            Readback::Absent => Some(Vec::new()),
            Readback::Unknown => None,
        };
        state.network_interfaces = match self
            .read::<Vec<NetworkInterface>>("/network-interfaces", &mut state.gaps)
            .await
        {
            Readback::Found(ifaces) => Some(ifaces),
            Readback::Absent => Some(Vec::new()),
            Readback::Unknown => None,
        };

        tracing::info!(
            %vm_id,
            complete = state.is_complete(),
            gaps = state.gaps.len(),
            "VM state reconciled"
        );
        Ok(Some(state))
    }

    async fn read<T: DeserializeOwned>(
        &self,
        path: &str,
        gaps: &mut Vec<ReconciliationGap>,
    ) -> Readback<T> {
        let mut gap = |reason: String| {
            tracing::warn!(path, reason = %reason, "Could not read component, using defaults");
            gaps.push(ReconciliationGap {
                path: path.to_string(),
                reason,
            });
            Readback::Unknown
        };

        let response = match self.transport.send(ApiRequest::get(path)).await {
            Ok(response) => response,
            Err(e) => return gap(e.to_string()),
        };
        match response.status {
            200 => match response.json() {
                Ok(value) => Readback::Found(value),
                Err(e) => gap(format!("unparseable body: {e}")),
            },
            404 => Readback::Absent,
            status => gap(format!("status {status}: {}", response.text())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingTransport;
    use hyper::Method;

    const INVALID_METHOD: &str = r#"{"fault_message":"Invalid request method"}"#;

    #[tokio::test]
    async fn test_unreachable_is_absent() {
        let transport = RecordingTransport::new();
        transport.unreachable();

        let state = Reconciler::new(&transport).fetch("vm-1").await.unwrap();
        assert!(state.is_none());
        assert_eq!(transport.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_only_machine_config_readable() {
        let transport = RecordingTransport::new();
        transport.respond(
            Method::GET,
            "/machine-config",
            200,
            r#"{"vcpu_count":2,"mem_size_mib":1024,"smt":false}"#,
        );
        transport.respond(Method::GET, "/boot-source", 400, INVALID_METHOD);
        transport.respond(Method::GET, "/drives", 400, INVALID_METHOD);
        transport.respond(Method::GET, "/network-interfaces", 400, INVALID_METHOD);

        let state = Reconciler::new(&transport)
            .fetch("vm-1")
            .await
            .unwrap()
            .expect("VM should be reported present");

        assert_eq!(
            state.machine_config,
            Some(MachineSizing {
                vcpu_count: 2,
                mem_size_mib: 1024
            })
        );
        assert!(state.boot_source.is_none());
        assert!(state.drives().is_empty());
        assert!(state.network_interfaces().is_empty());
        assert_eq!(state.gaps.len(), 3);
        assert!(!state.is_complete());
    }

    #[tokio::test]
    async fn test_full_readback() {
        let transport = RecordingTransport::new();
        transport.respond(
            Method::GET,
            "/machine-config",
            200,
            r#"{"vcpu_count":1,"mem_size_mib":256}"#,
        );
        transport.respond(
            Method::GET,
            "/boot-source",
            200,
            r#"{"kernel_image_path":"/img/vmlinux","boot_args":"console=ttyS0"}"#,
        );
        transport.respond(
            Method::GET,
            "/drives",
            200,
            r#"[{"drive_id":"rootfs","path_on_host":"/img/root.ext4","is_root_device":true,"is_read_only":false}]"#,
        );
        transport.respond(
            Method::GET,
            "/network-interfaces",
            200,
            r#"[{"iface_id":"eth0","host_dev_name":"tap0"}]"#,
        );

        let state = Reconciler::new(&transport)
            .fetch("vm-1")
            .await
            .unwrap()
            .unwrap();

        assert!(state.is_complete());
        assert_eq!(
            state.boot_source.as_ref().map(|b| b.kernel_image_path.as_str()),
            Some("/img/vmlinux")
        );
        assert_eq!(state.drives()[0].drive_id, "rootfs");
        assert_eq!(state.network_interfaces()[0].guest_mac, None);
    }

    #[tokio::test]
    async fn test_not_found_means_empty_not_unknown() {
        let transport = RecordingTransport::new();
        transport.respond(
            Method::GET,
            "/machine-config",
            200,
            r#"{"vcpu_count":1,"mem_size_mib":256}"#,
        );
        // Unscripted reads answer 404.

        let state = Reconciler::new(&transport)
            .fetch("vm-1")
            .await
            .unwrap()
            .unwrap();

        assert_eq!(state.drives, Some(Vec::new()));
        assert_eq!(state.network_interfaces, Some(Vec::new()));
        assert!(state.boot_source.is_none());
        assert!(state.is_complete());
    }

    #[tokio::test]
    async fn test_probe_rejected_but_reachable() {
        let transport = RecordingTransport::new();
        transport.respond(Method::GET, "/machine-config", 400, INVALID_METHOD);

        let state = Reconciler::new(&transport)
            .fetch("vm-1")
            .await
            .unwrap()
            .unwrap();

        assert!(state.machine_config.is_none());
        assert_eq!(state.gaps[0].path, "/machine-config");
    }

    #[tokio::test]
    async fn test_probe_server_error_fails() {
        let transport = RecordingTransport::new();
        transport.respond(Method::GET, "/machine-config", 500, "boom");

        let err = Reconciler::new(&transport).fetch("vm-1").await.unwrap_err();
        assert!(matches!(err, VmError::UnexpectedResponse { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_unparseable_component_is_gap() {
        let transport = RecordingTransport::new();
        transport.respond(
            Method::GET,
            "/machine-config",
            200,
            r#"{"vcpu_count":1,"mem_size_mib":256}"#,
        );
        transport.respond(Method::GET, "/drives", 200, "not json");

        let state = Reconciler::new(&transport)
            .fetch("vm-1")
            .await
            .unwrap()
            .unwrap();

        assert!(state.drives.is_none());
        assert_eq!(state.gaps.len(), 1);
        assert_eq!(state.gaps[0].path, "/drives");
    }
}
