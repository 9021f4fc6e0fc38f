//! Request and response bodies of the Firecracker API.
//!
//! One struct per endpoint. Field names follow the Firecracker OpenAPI
//! definition; unknown fields in responses are ignored.

use crate::config::MachineSizing;
use serde::{Deserialize, Serialize};
use std::fmt;

/// `PUT /boot-source`, `GET /boot-source`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootSource {
    pub kernel_image_path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boot_args: Option<String>,
}

/// `PUT /machine-config`, `GET /machine-config`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineConfiguration {
    pub vcpu_count: u8,
    pub mem_size_mib: u32,
}

impl From<MachineSizing> for MachineConfiguration {
    fn from(sizing: MachineSizing) -> Self {
        Self {
            vcpu_count: sizing.vcpu_count,
            mem_size_mib: sizing.mem_size_mib,
        }
    }
}

impl From<MachineConfiguration> for MachineSizing {
    fn from(wire: MachineConfiguration) -> Self {
        Self {
            vcpu_count: wire.vcpu_count,
            mem_size_mib: wire.mem_size_mib,
        }
    }
}

/// `PUT /drives/{drive_id}`, elements of `GET /drives`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Drive {
    pub drive_id: String,
    pub path_on_host: String,
    pub is_root_device: bool,
    #[serde(default)]
    pub is_read_only: bool,
}

/// `PUT /network-interfaces/{iface_id}`, elements of `GET /network-interfaces`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkInterface {
    pub iface_id: String,
    pub host_dev_name: String,
    /// Omitted entirely when unset; Firecracker generates one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub guest_mac: Option<String>,
}

/// `PUT /actions`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceAction {
    pub action_type: ActionType,
}

/// Actions accepted by `PUT /actions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ActionType {
    /// Boot the configured microVM
    InstanceStart,
    /// Ask the guest to shut down
    SendCtrlAltDel,
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionType::InstanceStart => write!(f, "InstanceStart"),
            ActionType::SendCtrlAltDel => write!(f, "SendCtrlAltDel"),
        }
    }
}

/// An independently configurable facet of a VM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Component {
    BootSource,
    MachineConfig,
    Drive(String),
    NetworkInterface(String),
    Action(ActionType),
}

impl Component {
    /// API path the component is written to.
    pub fn path(&self) -> String {
        match self {
            Component::BootSource => "/boot-source".to_string(),
            Component::MachineConfig => "/machine-config".to_string(),
            Component::Drive(id) => format!("/drives/{id}"),
            Component::NetworkInterface(id) => format!("/network-interfaces/{id}"),
            Component::Action(_) => "/actions".to_string(),
        }
    }
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::BootSource => write!(f, "boot source"),
            Component::MachineConfig => write!(f, "machine config"),
            Component::Drive(id) => write!(f, "drive {id}"),
            Component::NetworkInterface(id) => write!(f, "network interface {id}"),
            Component::Action(action) => write!(f, "action {action}"),
        }
    }
}
