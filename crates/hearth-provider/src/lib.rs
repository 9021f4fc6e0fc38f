//! # hearth-provider
//!
//! Command-line front end for `hearth-core`. Each invocation performs one
//! lifecycle operation and keeps the resulting [`VmRecord`] in a JSON state
//! file between runs.
//!
//! [`VmRecord`]: hearth_core::VmRecord

pub mod cli;
pub mod commands;
pub mod state;

pub use cli::{Cli, Command};
pub use state::{StateError, StateFile};
