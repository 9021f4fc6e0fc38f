//! Command-line arguments.

use clap::{Parser, Subcommand};
use hearth_vm::Endpoint;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "hearth-provider")]
#[command(about = "Provision and manage Firecracker microVMs through the API socket")]
#[command(version)]
pub struct Cli {
    /// Firecracker API endpoint, overrides HEARTH_ENDPOINT
    #[arg(long, global = true)]
    pub endpoint: Option<Endpoint>,

    /// Per-request timeout in seconds, overrides HEARTH_TIMEOUT_SECS
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,

    /// Retries after the first attempt, overrides HEARTH_MAX_RETRIES
    #[arg(long, global = true)]
    pub max_retries: Option<u32>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Create and boot a VM from a JSON configuration
    Create {
        /// VM configuration file
        #[arg(long)]
        config: PathBuf,

        /// State file to write the VM record to
        #[arg(long)]
        state: PathBuf,
    },
    /// Refresh the recorded VM from the API
    Read {
        /// State file holding the VM record
        #[arg(long)]
        state: PathBuf,
    },
    /// Apply a new configuration to a running VM
    Update {
        /// Desired VM configuration file
        #[arg(long)]
        config: PathBuf,

        /// State file holding the VM record
        #[arg(long)]
        state: PathBuf,

        /// Destroy and recreate the VM when the change cannot be applied in place
        #[arg(long)]
        replace: bool,
    },
    /// Shut the VM down and forget it
    Delete {
        /// State file holding the VM record
        #[arg(long)]
        state: PathBuf,
    },
    /// Read the state of a VM known only by identifier
    Lookup {
        /// VM identifier
        #[arg(long)]
        id: String,
    },
}
