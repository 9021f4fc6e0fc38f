//! Error types for hearth-core.

use crate::record::VmId;
use thiserror::Error;

/// Result type alias for hearth-core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Errors surfaced by the lifecycle controller.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Error from hearth-vm (validation, transport, rejected component)
    #[error("VM error: {0}")]
    Vm(#[from] hearth_vm::VmError),

    /// Creation stopped part way; carries the failing step and the
    /// components that were already applied
    #[error(transparent)]
    Provision(#[from] hearth_vm::ProvisionFailure),

    /// The requested change cannot be applied to a running VM
    #[error("changes to [{}] require replacing VM {id}", .fields.join(", "))]
    ReplacementRequired {
        /// VM that would be replaced
        id: VmId,
        /// Fields that differ
        fields: Vec<&'static str>,
    },

    /// VM not reachable
    #[error("VM not found: {0}")]
    NotFound(String),

    /// Invalid provider configuration
    #[error("configuration error: {0}")]
    Config(String),
}
