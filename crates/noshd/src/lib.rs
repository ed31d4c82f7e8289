//! Nosh Daemon - clarification state management for AI food analysis.
//!
//! Decides whether an analysis is trustworthy enough to confirm, holds a
//! per-user pending clarification with a TTL when it is not, routes the
//! next message as a fresh analysis or a clarification reply, and merges
//! the two partial analyses into one combined result.

pub mod analyzer;
pub mod handlers;
pub mod merge;
pub mod router;
pub mod rpc;
pub mod store;
