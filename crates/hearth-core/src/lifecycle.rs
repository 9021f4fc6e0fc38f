//! Create/read/update/delete semantics for Firecracker VMs.
//!
//! The controller maps desired state onto the provisioning engine in
//! `hearth-vm`. It never keeps a record for a VM whose creation failed and
//! never lets a failed shutdown block local removal.

use crate::config::ProviderConfig;
use crate::error::{CoreError, Result};
use crate::record::{VmId, VmPhase, VmRecord};
use hearth_vm::{
    normalize_boot_args, ActionType, Configurator, HttpTransport, MachineSizing, NetworkConfig,
    Orchestrator, Reconciler, RemoteVmState, RetryPolicy, RetryTransport, Transport, VmConfig,
    VmError,
};
use std::sync::Arc;
use std::time::Instant;

// ============================================================================
// Update planning
// ============================================================================

/// Changes needed to move a running VM from one configuration to another.
///
/// Machine sizing and new or changed network interfaces are re-applied in
/// place. Any other difference means the VM has to be replaced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdatePlan {
    /// New sizing, when it differs
    pub machine_config: Option<MachineSizing>,
    /// Interfaces to re-apply, in desired order
    pub network_interfaces: Vec<NetworkConfig>,
    /// Fields that cannot change in place
    pub replacement: Vec<&'static str>,
}

impl UpdatePlan {
    /// Compare `current` against `desired`.
    pub fn diff(current: &VmConfig, desired: &VmConfig) -> Self {
        let mut plan = Self::default();

        if current.kernel_image_path != desired.kernel_image_path {
            plan.replacement.push("kernel_image_path");
        }
        if normalize_boot_args(current.boot_args()) != normalize_boot_args(desired.boot_args()) {
            plan.replacement.push("boot_args");
        }
        if drive_keys(current) != drive_keys(desired) {
            plan.replacement.push("drives");
        }

        if current.machine_config != desired.machine_config {
            plan.machine_config = Some(desired.machine_config);
        }

        let removed = current.network_interfaces.iter().any(|old| {
            !desired
                .network_interfaces
                .iter()
                .any(|new| new.iface_id == old.iface_id)
        });
        if removed {
            plan.replacement.push("network_interfaces");
        }
        plan.network_interfaces = desired
            .network_interfaces
            .iter()
            .filter(|new| {
                !current
                    .network_interfaces
                    .iter()
                    .any(|old| same_interface(old, new))
            })
            .cloned()
            .collect();

        plan
    }

    /// Whether the VM must be destroyed and recreated.
    pub fn requires_replacement(&self) -> bool {
        !self.replacement.is_empty()
    }

    /// Whether there is nothing to send.
    pub fn is_noop(&self) -> bool {
        self.machine_config.is_none()
            && self.network_interfaces.is_empty()
            && self.replacement.is_empty()
    }
}

type DriveKey<'a> = (&'a str, &'a std::path::Path, Option<bool>, Option<bool>);

// Flags are compared after coercion so "true" and true are the same drive.
fn drive_keys(config: &VmConfig) -> Vec<DriveKey<'_>> {
    config
        .drives
        .iter()
        .map(|d| {
            (
                d.drive_id.as_str(),
                d.path_on_host.as_path(),
                d.is_root_device.to_bool().ok(),
                d.is_read_only.to_bool().ok(),
            )
        })
        .collect()
}

fn same_interface(a: &NetworkConfig, b: &NetworkConfig) -> bool {
    a.iface_id == b.iface_id && a.host_dev_name == b.host_dev_name && a.guest_mac() == b.guest_mac()
}

// ============================================================================
// Deletion
// ============================================================================

/// What happened when a VM was asked to shut down.
///
/// Every variant means the VM can be dropped from local state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The API accepted the shutdown action
    ShutdownSent,
    /// The API was gone or reported the VM missing
    AlreadyGone,
    /// The shutdown request failed for another reason
    Unacknowledged { reason: String },
}

impl DeleteOutcome {
    fn from_result(result: std::result::Result<(), VmError>) -> Self {
        match result {
            Ok(()) => Self::ShutdownSent,
            Err(VmError::Configuration { status: 404, .. }) => Self::AlreadyGone,
            Err(VmError::Transport(e)) if e.is_connect() => Self::AlreadyGone,
            Err(e) => Self::Unacknowledged {
                reason: e.to_string(),
            },
        }
    }
}

// ============================================================================
// Controller
// ============================================================================

/// Drives VM lifecycles against one Firecracker API.
///
/// Cloning is cheap; clones share the transport and its connection pool.
#[derive(Clone)]
pub struct LifecycleController {
    transport: Arc<dyn Transport>,
}

impl LifecycleController {
    /// Build a controller with a pooled, retrying HTTP transport.
    ///
    /// # Errors
    /// Fails when `config` does not validate.
    pub fn new(config: &ProviderConfig) -> Result<Self> {
        config.validate()?;
        let http = HttpTransport::new(&config.transport);
        let policy = RetryPolicy::from(&config.transport);
        tracing::info!(
            endpoint = %config.transport.endpoint,
            max_retries = policy.max_retries,
            "Lifecycle controller ready"
        );
        Ok(Self::with_transport(Arc::new(RetryTransport::new(http, policy))))
    }

    /// Build a controller over an existing transport.
    pub fn with_transport(transport: Arc<dyn Transport>) -> Self {
        Self { transport }
    }

    /// Provision a VM from `config` and boot it.
    ///
    /// # Errors
    /// Validation errors are returned before any request is sent. A failed
    /// creation step returns [`CoreError::Provision`] and leaves no record.
    pub async fn create(&self, config: VmConfig) -> Result<VmRecord> {
        config.validate()?;

        let id = VmId::generate();
        let start = Instant::now();
        transition(id, VmPhase::Absent, VmPhase::Creating);

        let report = match Orchestrator::new(&*self.transport).provision(&config).await {
            Ok(report) => report,
            Err(failure) => {
                tracing::error!(
                    vm_id = %id,
                    step = %failure.step,
                    applied = failure.applied.len(),
                    error = %failure.source,
                    "VM creation failed"
                );
                transition(id, VmPhase::Creating, VmPhase::Absent);
                return Err(failure.into());
            }
        };

        let remote = self.read_back(id).await;

        transition(id, VmPhase::Creating, VmPhase::Present);
        tracing::info!(
            vm_id = %id,
            duration_ms = start.elapsed().as_millis() as u64,
            "VM created"
        );
        Ok(VmRecord::new(id, config, report.boot_args).with_remote(remote))
    }

    /// Refresh `record` from the remote API.
    ///
    /// Returns `Ok(None)` when the VM is gone and should be dropped from
    /// local state.
    ///
    /// # Errors
    /// Fails when the API answers in a way that cannot be interpreted.
    pub async fn read(&self, record: &VmRecord) -> Result<Option<VmRecord>> {
        let fetched = Reconciler::new(&*self.transport)
            .fetch(&record.id.to_string())
            .await?;

        match fetched {
            Some(remote) => Ok(Some(record.clone().with_remote(Some(remote)))),
            None => {
                tracing::info!(vm_id = %record.id, "VM no longer present, removing from state");
                transition(record.id, VmPhase::Present, VmPhase::Absent);
                Ok(None)
            }
        }
    }

    /// Move a running VM to `desired`.
    ///
    /// # Errors
    /// Returns [`CoreError::ReplacementRequired`] without sending anything
    /// when the change cannot be applied in place. A rejected component
    /// returns the error; the caller keeps the previous record.
    pub async fn update(&self, record: &VmRecord, desired: VmConfig) -> Result<VmRecord> {
        desired.validate()?;

        let plan = UpdatePlan::diff(&record.config, &desired);
        if plan.requires_replacement() {
            tracing::warn!(
                vm_id = %record.id,
                fields = ?plan.replacement,
                "Update requires replacement"
            );
            return Err(CoreError::ReplacementRequired {
                id: record.id,
                fields: plan.replacement,
            });
        }

        let mut updated = record.clone();
        updated.config = desired;
        if plan.is_noop() {
            tracing::debug!(vm_id = %record.id, "No changes to apply");
            return Ok(updated);
        }

        transition(record.id, VmPhase::Present, VmPhase::Updating);
        let configurator = Configurator::new(&*self.transport);
        let applied = async {
            if let Some(sizing) = plan.machine_config {
                configurator.apply_machine_config(sizing).await?;
            }
            for iface in &plan.network_interfaces {
                configurator.apply_network_interface(iface).await?;
            }
            Ok::<(), VmError>(())
        }
        .await;
        transition(record.id, VmPhase::Updating, VmPhase::Present);

        if let Err(e) = applied {
            tracing::error!(vm_id = %record.id, error = %e, "VM update failed");
            return Err(e.into());
        }

        let remote = self.read_back(record.id).await;
        tracing::info!(
            vm_id = %record.id,
            machine_config = plan.machine_config.is_some(),
            network_interfaces = plan.network_interfaces.len(),
            "VM updated"
        );
        Ok(updated.with_remote(remote))
    }

    /// Ask the VM to shut down.
    ///
    /// Never fails: whatever the outcome, the VM is removed from local state.
    pub async fn delete(&self, record: &VmRecord) -> DeleteOutcome {
        transition(record.id, VmPhase::Present, VmPhase::Deleting);

        let result = Configurator::new(&*self.transport)
            .send_action(ActionType::SendCtrlAltDel)
            .await;
        let outcome = DeleteOutcome::from_result(result);

        match &outcome {
            DeleteOutcome::ShutdownSent => {
                tracing::info!(vm_id = %record.id, "Shutdown requested")
            }
            DeleteOutcome::AlreadyGone => {
                tracing::info!(vm_id = %record.id, "VM already gone")
            }
            DeleteOutcome::Unacknowledged { reason } => {
                tracing::warn!(vm_id = %record.id, %reason, "Shutdown not acknowledged, removing anyway")
            }
        }
        transition(record.id, VmPhase::Deleting, VmPhase::Absent);
        outcome
    }

    /// Read the state of a VM the caller knows only by identifier.
    ///
    /// # Errors
    /// Returns [`CoreError::NotFound`] when the API cannot be reached.
    pub async fn lookup(&self, vm_id: &str) -> Result<RemoteVmState> {
        Reconciler::new(&*self.transport)
            .fetch(vm_id)
            .await?
            .ok_or_else(|| CoreError::NotFound(vm_id.to_string()))
    }

    // The changes are already applied, so a failed read-back only leaves
    // the mirror empty.
    async fn read_back(&self, id: VmId) -> Option<RemoteVmState> {
        match Reconciler::new(&*self.transport).fetch(&id.to_string()).await {
            Ok(remote) => remote,
            Err(e) => {
                tracing::warn!(vm_id = %id, error = %e, "Could not read back VM state");
                None
            }
        }
    }
}

fn transition(id: VmId, from: VmPhase, to: VmPhase) {
    tracing::debug!(vm_id = %id, %from, %to, "VM phase changed");
}

#[cfg(test)]
mod tests {
    use super::*;
    use hearth_vm::{DriveConfig, Flag, TransportError};

    fn config() -> VmConfig {
        VmConfig {
            kernel_image_path: "/img/vmlinux".into(),
            boot_args: None,
            drives: vec![DriveConfig::new("root", "/img/root.ext4", true, false)],
            machine_config: MachineSizing {
                vcpu_count: 2,
                mem_size_mib: 1024,
            },
            network_interfaces: vec![NetworkConfig {
                iface_id: "eth0".into(),
                host_dev_name: "tap0".into(),
                guest_mac: None,
            }],
        }
    }

    #[test]
    fn test_identical_config_is_noop() {
        let plan = UpdatePlan::diff(&config(), &config());
        assert!(plan.is_noop());
    }

    #[test]
    fn test_default_boot_args_equal_explicit_default() {
        let mut desired = config();
        desired.boot_args = Some(hearth_vm::DEFAULT_BOOT_ARGS.to_string());
        assert!(UpdatePlan::diff(&config(), &desired).is_noop());
    }

    #[test]
    fn test_stringified_flags_are_not_a_change() {
        let mut desired = config();
        desired.drives[0].is_root_device = Flag::Text("true".into());
        desired.drives[0].is_read_only = Flag::Text("false".into());
        assert!(UpdatePlan::diff(&config(), &desired).is_noop());
    }

    #[test]
    fn test_sizing_change_in_place() {
        let mut desired = config();
        desired.machine_config.mem_size_mib = 2048;

        let plan = UpdatePlan::diff(&config(), &desired);
        assert!(!plan.requires_replacement());
        assert_eq!(plan.machine_config, Some(desired.machine_config));
        assert!(plan.network_interfaces.is_empty());
    }

    #[test]
    fn test_interface_changed_and_added() {
        let mut desired = config();
        desired.network_interfaces[0].guest_mac = Some("AA:FC:00:00:00:01".into());
        desired.network_interfaces.push(NetworkConfig {
            iface_id: "eth1".into(),
            host_dev_name: "tap1".into(),
            guest_mac: None,
        });

        let plan = UpdatePlan::diff(&config(), &desired);
        assert!(!plan.requires_replacement());
        let ids: Vec<_> = plan.network_interfaces.iter().map(|i| i.iface_id.as_str()).collect();
        assert_eq!(ids, ["eth0", "eth1"]);
    }

    #[test]
    fn test_empty_mac_equals_unset() {
        let mut desired = config();
        desired.network_interfaces[0].guest_mac = Some(String::new());
        assert!(UpdatePlan::diff(&config(), &desired).is_noop());
    }

    #[test]
    fn test_replacement_fields() {
        let mut desired = config();
        desired.kernel_image_path = "/img/vmlinux-6.1".into();
        desired.boot_args = Some("console=ttyS0".into());
        desired.drives[0].path_on_host = "/img/other.ext4".into();
        desired.network_interfaces.clear();

        let plan = UpdatePlan::diff(&config(), &desired);
        assert_eq!(
            plan.replacement,
            ["kernel_image_path", "boot_args", "drives", "network_interfaces"]
        );
    }

    #[test]
    fn test_delete_outcomes() {
        assert_eq!(DeleteOutcome::from_result(Ok(())), DeleteOutcome::ShutdownSent);

        let missing = VmError::Configuration {
            component: hearth_vm::Component::Action(ActionType::SendCtrlAltDel),
            status: 404,
            body: String::new(),
        };
        assert_eq!(DeleteOutcome::from_result(Err(missing)), DeleteOutcome::AlreadyGone);

        let refused = VmError::Transport(TransportError::Connect {
            endpoint: "unix:///tmp/fc.sock".into(),
            reason: "connection refused".into(),
        });
        assert_eq!(DeleteOutcome::from_result(Err(refused)), DeleteOutcome::AlreadyGone);

        let rejected = VmError::Configuration {
            component: hearth_vm::Component::Action(ActionType::SendCtrlAltDel),
            status: 400,
            body: "not running".into(),
        };
        assert!(matches!(
            DeleteOutcome::from_result(Err(rejected)),
            DeleteOutcome::Unacknowledged { .. }
        ));
    }
}
