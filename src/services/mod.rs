//! External transport module
//!
//! This module contains the HTTP transport the keepalive monitor pings
//! through.

pub mod http;

// Re-export main functions
pub use http::execute_ping;
