//! Nosh Common - Shared types and schemas for the Nosh clarification daemon.
//!
//! Everything the daemon and the control CLI both need: analysis records,
//! the pending-clarification model, IPC schema, errors, and configuration.

pub mod analysis;
pub mod clarification;
pub mod config;
pub mod error;
pub mod ipc;

pub use analysis::*;
pub use clarification::*;
pub use config::*;
pub use error::*;
