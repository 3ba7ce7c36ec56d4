//! HTTP client factory with consistent timeout configuration.
//!
//! Vendor adapters and tools get their `reqwest::Client` from here rather than
//! constructing one directly.

use reqwest::Client;
use std::time::Duration;

/// Default connect timeout (TCP handshake + TLS).
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default request timeout for tool calls (search, TTS, image generation).
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build a client with the default connect timeout and the given total timeout.
pub fn try_build_client_with_timeout(request_timeout: Duration) -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
        .timeout(request_timeout)
        .build()
}

pub fn try_build_client() -> Result<Client, reqwest::Error> {
    try_build_client_with_timeout(DEFAULT_REQUEST_TIMEOUT)
}

/// Client for chat vendors. Only the connect phase is bounded here: a total
/// timeout would cut long streams short, so the gateway bounds each call and
/// each streamed chunk itself.
pub fn try_build_vendor_client() -> Result<Client, reqwest::Error> {
    Client::builder()
        .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
        .build()
}
