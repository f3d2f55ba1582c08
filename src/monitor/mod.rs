//! Monitor module
//!
//! This module contains the two cooperating timer-driven state machines:
//! the idle monitor and the keepalive heartbeat it coordinates.

pub mod idle;
pub mod keepalive;

// Re-export main types
pub use idle::Idle;
pub use keepalive::Keepalive;
