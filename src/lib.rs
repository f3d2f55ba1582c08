//! idlewatch - session idle detection and keepalive coordination
//!
//! This library watches an interactive session for prolonged inactivity and
//! notifies observers through lifecycle events, while coordinating a
//! periodic "keep session alive" heartbeat that runs only while the user is
//! active and pauses while idle. The host supplies activity signals through
//! [`monitor::Idle::interrupt`] and renders countdown state from the events
//! on the shared [`events::EventBus`].

pub mod clock;
pub mod config;
pub mod error;
pub mod events;
pub mod monitor;
pub mod services;
pub mod state;
pub mod tasks;
pub mod utils;

// Re-export commonly used types
pub use clock::{Clock, SystemClock};
pub use config::{Config, HttpTarget, IdleOptions, KeepaliveOptions, TimeoutSetting};
pub use error::Error;
pub use events::{EventBus, MonitorEvent};
pub use monitor::{Idle, Keepalive};
pub use utils::signals::shutdown_signal;
