//! Timer scheduling module
//!
//! This module contains the timer-slot abstraction the monitors schedule
//! their ticks through.

pub mod timer;

// Re-export main types
pub use timer::{spawn_once, spawn_repeating, TimerSlot};
