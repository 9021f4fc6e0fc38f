//! Per-component writes to the Firecracker API.
//!
//! Each method turns one logical sub-resource into its wire body and `PUT`s
//! it to the matching path. Boolean coercion of drive flags happens here and
//! nowhere else.

use crate::config::{DriveConfig, MachineSizing, NetworkConfig};
use crate::error::{Result, VmError};
use crate::models::{
    ActionType, BootSource, Component, Drive, InstanceAction, MachineConfiguration,
    NetworkInterface,
};
use crate::transport::{ApiRequest, Transport};
use serde::Serialize;
use std::path::Path;

impl TryFrom<&DriveConfig> for Drive {
    type Error = VmError;

    fn try_from(drive: &DriveConfig) -> Result<Self> {
        Ok(Self {
            drive_id: drive.drive_id.clone(),
            path_on_host: drive.path_on_host.to_string_lossy().into_owned(),
            is_root_device: drive.is_root_device.to_bool()?,
            is_read_only: drive.is_read_only.to_bool()?,
        })
    }
}

impl From<&NetworkConfig> for NetworkInterface {
    fn from(iface: &NetworkConfig) -> Self {
        Self {
            iface_id: iface.iface_id.clone(),
            host_dev_name: iface.host_dev_name.clone(),
            guest_mac: iface.guest_mac().map(str::to_string),
        }
    }
}

/// Applies individual sub-resources through a [`Transport`].
#[derive(Clone, Copy)]
pub struct Configurator<'a> {
    transport: &'a dyn Transport,
}

impl<'a> Configurator<'a> {
    pub fn new(transport: &'a dyn Transport) -> Self {
        Self { transport }
    }

    /// `PUT /boot-source`. Must precede any drive: Firecracker checks the
    /// root drive against the configured boot source.
    pub async fn apply_boot_source(&self, kernel_image_path: &Path, boot_args: &str) -> Result<()> {
        let body = BootSource {
            kernel_image_path: kernel_image_path.to_string_lossy().into_owned(),
            boot_args: Some(boot_args.to_string()),
        };
        self.put(Component::BootSource, &body).await
    }

    /// `PUT /machine-config`
    pub async fn apply_machine_config(&self, sizing: MachineSizing) -> Result<()> {
        self.put(Component::MachineConfig, &MachineConfiguration::from(sizing))
            .await
    }

    /// `PUT /drives/{drive_id}` with strict boolean flags.
    pub async fn apply_drive(&self, drive: &DriveConfig) -> Result<()> {
        let body = Drive::try_from(drive)?;
        self.put(Component::Drive(body.drive_id.clone()), &body).await
    }

    /// `PUT /network-interfaces/{iface_id}`; an unset MAC is left out.
    pub async fn apply_network_interface(&self, iface: &NetworkConfig) -> Result<()> {
        let body = NetworkInterface::from(iface);
        self.put(Component::NetworkInterface(body.iface_id.clone()), &body)
            .await
    }

    /// `PUT /actions`
    pub async fn send_action(&self, action_type: ActionType) -> Result<()> {
        self.put(Component::Action(action_type), &InstanceAction { action_type })
            .await
    }

    async fn put<T: Serialize + Sync>(&self, component: Component, body: &T) -> Result<()> {
        let path = component.path();
        let request = ApiRequest::put_json(path.clone(), body)?;
        tracing::debug!(%component, path = %path, "Configuring component");

        let response = self.transport.send(request).await?;
        if !response.is_success() {
            let body = response.text();
            tracing::error!(
                %component,
                path = %path,
                status = response.status,
                response = %body,
                "Firecracker API rejected component"
            );
            return Err(VmError::Configuration {
                component,
                status: response.status,
                body,
            });
        }

        tracing::debug!(%component, status = response.status, "Component configured");
        Ok(())
    }
}
