//! Client IP extraction.

use std::net::SocketAddr;

use axum::extract::{ConnectInfo, Request};

/// Extract the client IP address.
///
/// With `trust_proxy`, the first `X-Forwarded-For` entry is used and there is
/// no fallback: a missing header is an error. Otherwise the socket address
/// from `ConnectInfo` is used.
pub fn extract_client_ip(request: &Request, trust_proxy: bool) -> Result<String, &'static str> {
    if trust_proxy {
        let value = request
            .headers()
            .get("x-forwarded-for")
            .ok_or("IP header not present")?
            .to_str()
            .map_err(|_| "IP header contains invalid characters")?;
        let first = value.split(',').next().map(str::trim).unwrap_or_default();
        if first.is_empty() {
            return Err("IP header is empty");
        }
        return Ok(first.to_string());
    }

    request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ci| ci.0.ip().to_string())
        .ok_or("No client IP available")
}
