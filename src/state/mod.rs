//! State management module
//!
//! This module contains the monitor-owned state structures. They are only
//! ever mutated through their owning monitor's methods.

pub mod idle_state;
pub mod keepalive_state;

// Re-export main types
pub use idle_state::IdleState;
pub use keepalive_state::KeepaliveState;
