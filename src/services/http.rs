//! Keepalive HTTP ping transport

use reqwest::{Client, Method};
use tracing::debug;

use crate::config::HttpTarget;

/// Issue the configured keepalive request and fold the outcome into an
/// `(error, status)` pair.
///
/// A reachable endpoint reports its HTTP status with no error, whatever the
/// status class; only transport-level failures populate the error side. This
/// function never panics, so it is safe to drive from a timer callback.
pub async fn execute_ping(client: &Client, target: &HttpTarget) -> (Option<String>, Option<u16>) {
    // Method validity was checked when the target was built.
    let method = Method::from_bytes(target.method.as_bytes()).unwrap_or(Method::GET);
    debug!("keepalive ping: {} {}", target.method, target.url);

    match client.request(method, target.url.as_str()).send().await {
        Ok(response) => (None, Some(response.status().as_u16())),
        Err(err) => {
            let status = err.status().map(|code| code.as_u16());
            (Some(err.to_string()), status)
        }
    }
}
