//! Local record of a provisioned VM.
//!
//! The record is what the host process persists between invocations. It only
//! exists while the VM is present: failed creations and deletions leave no
//! record behind.

use chrono::{DateTime, Utc};
use hearth_vm::{RemoteVmState, VmConfig};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Identifier assigned to a VM when the controller creates it.
///
/// Firecracker has no notion of VM identity. The id names the local record,
/// tags log events and is reported as `vm_id` in reconciled state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VmId(Uuid);

impl VmId {
    pub(crate) fn generate() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for VmId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0.hyphenated(), f)
    }
}

impl FromStr for VmId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s.trim()).map(Self)
    }
}

/// Lifecycle phase of a VM as seen by the controller.
///
/// `Absent -> Creating -> Present -> Updating -> Present -> Deleting -> Absent`.
/// There is no failed phase: a failed creation returns to `Absent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VmPhase {
    Absent,
    Creating,
    Present,
    Updating,
    Deleting,
}

impl fmt::Display for VmPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "Absent"),
            Self::Creating => write!(f, "Creating"),
            Self::Present => write!(f, "Present"),
            Self::Updating => write!(f, "Updating"),
            Self::Deleting => write!(f, "Deleting"),
        }
    }
}

/// A VM the controller tracks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VmRecord {
    /// Locally generated identifier
    pub id: VmId,
    /// Configuration as submitted
    pub config: VmConfig,
    /// Kernel command line actually sent, after normalization
    pub boot_args: String,
    /// Last reconciled remote state, if any could be read
    pub remote: Option<RemoteVmState>,
    /// When the VM was created
    pub created_at: DateTime<Utc>,
    /// When the record last changed
    pub updated_at: DateTime<Utc>,
}

impl VmRecord {
    pub(crate) fn new(id: VmId, config: VmConfig, boot_args: String) -> Self {
        let now = Utc::now();
        Self {
            id,
            config,
            boot_args,
            remote: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub(crate) fn with_remote(mut self, remote: Option<RemoteVmState>) -> Self {
        self.remote = remote;
        self.updated_at = Utc::now();
        self
    }
}
