//! Error types for configuration validation and monitor operation

use thiserror::Error;

/// Errors surfaced by monitor configuration and operation.
///
/// Configuration variants are raised synchronously while options are being
/// built, before a monitor exists. Runtime faults of the heartbeat ping are
/// never errors; they are reported through the event bus instead.
#[derive(Debug, Error)]
pub enum Error {
    /// Idle duration of zero was supplied.
    #[error("idle duration must be a positive value, in seconds")]
    InvalidIdleDuration,

    /// Timeout setting was neither a disable marker nor a positive number.
    #[error("timeout must be zero, \"false\" or \"off\" to disable the warning phase, or a positive number of seconds to enable it")]
    InvalidTimeoutDuration,

    /// Keepalive interval of zero (or a non-numeric value) was supplied.
    #[error("keepalive interval must be expressed in seconds and be greater than 0")]
    InvalidKeepaliveInterval,

    /// Keepalive target had an empty URL or a malformed method token.
    #[error("keepalive target must be a URL, or a request configuration with a URL and a valid method")]
    InvalidHttpTarget,

    /// A monitor state lock was poisoned by a panicking holder.
    #[error("monitor state lock poisoned")]
    StatePoisoned,

    /// The keepalive HTTP client could not be constructed.
    #[error("failed to build keepalive http client: {0}")]
    HttpClient(#[from] reqwest::Error),
}
