//! Desired-state configuration for a Firecracker microVM.

use crate::boot_args::ROOT_DRIVE_ID;
use crate::error::{Result, VmError};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

/// Kernel command line used when the configuration leaves `boot_args` unset.
pub const DEFAULT_BOOT_ARGS: &str =
    "console=ttyS0 noapic reboot=k panic=1 pci=off root=/dev/vda rootfstype=ext4 rw init=/sbin/init";

/// Firecracker accepts 1-32 vCPUs.
pub const VCPU_RANGE: std::ops::RangeInclusive<u8> = 1..=32;

/// Memory bounds in MiB.
pub const MEM_SIZE_RANGE: std::ops::RangeInclusive<u32> = 128..=32768;

/// Configuration for one microVM.
///
/// A `VmConfig` is never mutated once submitted; updates produce a new value
/// that is compared against the remembered one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VmConfig {
    /// Path to the uncompressed kernel image on the host
    pub kernel_image_path: PathBuf,
    /// Kernel command line (defaults to [`DEFAULT_BOOT_ARGS`])
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_args: Option<String>,
    /// Block devices, exactly one of which is the root device
    pub drives: Vec<DriveConfig>,
    /// vCPU and memory sizing
    pub machine_config: MachineSizing,
    /// Network interfaces backed by pre-existing TAP devices
    #[serde(default)]
    pub network_interfaces: Vec<NetworkConfig>,
}

impl VmConfig {
    /// Kernel command line as submitted, or the default one.
    pub fn boot_args(&self) -> &str {
        self.boot_args.as_deref().unwrap_or(DEFAULT_BOOT_ARGS)
    }

    /// The drive flagged as root device, if the flags parse and exactly one
    /// drive carries it.
    pub fn root_drive(&self) -> Option<&DriveConfig> {
        let mut roots = self
            .drives
            .iter()
            .filter(|d| d.is_root_device.to_bool().unwrap_or(false));
        match (roots.next(), roots.next()) {
            (Some(root), None) => Some(root),
            _ => None,
        }
    }

    /// Validate the configuration.
    ///
    /// # Errors
    /// Returns [`VmError::Validation`] describing the first problem found.
    pub fn validate(&self) -> Result<()> {
        if self.kernel_image_path.as_os_str().is_empty() {
            return Err(VmError::Validation("kernel_image_path is required".into()));
        }

        if self.drives.is_empty() {
            return Err(VmError::Validation("at least one drive is required".into()));
        }

        let mut drive_ids = HashSet::new();
        let mut root_count = 0usize;
        for drive in &self.drives {
            if drive.drive_id.is_empty() {
                return Err(VmError::Validation("drive_id must not be empty".into()));
            }
            if drive.path_on_host.as_os_str().is_empty() {
                return Err(VmError::Validation(format!(
                    "drive {}: path_on_host is required",
                    drive.drive_id
                )));
            }
            if !drive_ids.insert(drive.drive_id.as_str()) {
                return Err(VmError::Validation(format!(
                    "duplicate drive_id: {}",
                    drive.drive_id
                )));
            }

            let is_root = drive.is_root_device.to_bool().map_err(|e| {
                VmError::Validation(format!("drive {}: is_root_device: {e}", drive.drive_id))
            })?;
            drive.is_read_only.to_bool().map_err(|e| {
                VmError::Validation(format!("drive {}: is_read_only: {e}", drive.drive_id))
            })?;

            if is_root {
                root_count += 1;
            } else if drive.drive_id == ROOT_DRIVE_ID {
                // The root drive is always sent under this id.
                return Err(VmError::Validation(format!(
                    "drive_id {ROOT_DRIVE_ID:?} is reserved for the root device"
                )));
            }
        }
        if root_count != 1 {
            return Err(VmError::Validation(format!(
                "exactly one drive must be the root device, found {root_count}"
            )));
        }

        self.machine_config.validate()?;

        let mut iface_ids = HashSet::new();
        for iface in &self.network_interfaces {
            if iface.iface_id.is_empty() {
                return Err(VmError::Validation("iface_id must not be empty".into()));
            }
            if iface.host_dev_name.is_empty() {
                return Err(VmError::Validation(format!(
                    "network interface {}: host_dev_name is required",
                    iface.iface_id
                )));
            }
            if !iface_ids.insert(iface.iface_id.as_str()) {
                return Err(VmError::Validation(format!(
                    "duplicate iface_id: {}",
                    iface.iface_id
                )));
            }
            if let Some(mac) = iface.guest_mac() {
                if !is_valid_mac(mac) {
                    return Err(VmError::Validation(format!(
                        "network interface {}: invalid guest_mac {mac:?}",
                        iface.iface_id
                    )));
                }
            }
        }

        Ok(())
    }
}

/// vCPU and memory sizing for a VM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineSizing {
    /// Number of virtual CPUs (1-32)
    pub vcpu_count: u8,
    /// Memory size in MiB (128-32768)
    pub mem_size_mib: u32,
}

impl Default for MachineSizing {
    fn default() -> Self {
        Self {
            vcpu_count: 2,
            mem_size_mib: 256,
        }
    }
}

impl MachineSizing {
    /// Validate vCPU and memory bounds.
    pub fn validate(&self) -> Result<()> {
        if !VCPU_RANGE.contains(&self.vcpu_count) {
            return Err(VmError::Validation(format!(
                "vcpu_count must be 1-32, got {}",
                self.vcpu_count
            )));
        }
        if !MEM_SIZE_RANGE.contains(&self.mem_size_mib) {
            return Err(VmError::Validation(format!(
                "mem_size_mib must be 128-32768, got {}",
                self.mem_size_mib
            )));
        }
        Ok(())
    }
}

/// Configuration for a block device (drive).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveConfig {
    /// Drive identifier, unique within one VM
    pub drive_id: String,
    /// Path to drive image on host
    pub path_on_host: PathBuf,
    /// Whether this is the root device
    pub is_root_device: Flag,
    /// Read-only flag
    #[serde(default)]
    pub is_read_only: Flag,
}

impl DriveConfig {
    /// Convenience constructor with plain booleans.
    pub fn new(
        drive_id: impl Into<String>,
        path_on_host: impl Into<PathBuf>,
        is_root_device: bool,
        is_read_only: bool,
    ) -> Self {
        Self {
            drive_id: drive_id.into(),
            path_on_host: path_on_host.into(),
            is_root_device: Flag::Bool(is_root_device),
            is_read_only: Flag::Bool(is_read_only),
        }
    }
}

/// Network interface configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Network interface ID, unique within one VM
    pub iface_id: String,
    /// Host device name (tap device)
    pub host_dev_name: String,
    /// Guest MAC address (optional, auto-generated by Firecracker if None)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guest_mac: Option<String>,
}

impl NetworkConfig {
    /// Guest MAC, treating an empty string as unset.
    pub fn guest_mac(&self) -> Option<&str> {
        self.guest_mac.as_deref().filter(|mac| !mac.is_empty())
    }
}

/// A boolean that may arrive as a JSON bool or as `"true"`/`"false"`.
///
/// Desired-state documents produced by schema layers frequently stringify
/// booleans; the Firecracker API only accepts JSON booleans.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Flag {
    /// A JSON boolean
    Bool(bool),
    /// A stringified boolean
    Text(String),
}

impl Default for Flag {
    fn default() -> Self {
        Flag::Bool(false)
    }
}

impl From<bool> for Flag {
    fn from(value: bool) -> Self {
        Flag::Bool(value)
    }
}

impl Flag {
    /// Coerce to a strict boolean.
    ///
    /// # Errors
    /// Returns a validation error for strings other than `true`/`false`
    /// (case-insensitive, surrounding whitespace ignored).
    pub fn to_bool(&self) -> Result<bool> {
        match self {
            Flag::Bool(value) => Ok(*value),
            Flag::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
                "true" => Ok(true),
                "false" => Ok(false),
                other => Err(VmError::Validation(format!(
                    "expected a boolean, got {other:?}"
                ))),
            },
        }
    }
}

/// Check a MAC address of the form `aa:bb:cc:dd:ee:ff` or `aa-bb-cc-dd-ee-ff`.
pub fn is_valid_mac(mac: &str) -> bool {
    let separator = if mac.contains(':') { ':' } else { '-' };
    let octets: Vec<&str> = mac.split(separator).collect();
    octets.len() == 6
        && octets
            .iter()
            .all(|octet| octet.len() == 2 && octet.chars().all(|c| c.is_ascii_hexdigit()))
}
