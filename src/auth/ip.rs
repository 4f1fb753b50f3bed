//! Client IP extraction utilities.

use std::net::SocketAddr;

use axum::{
    extract::{ConnectInfo, Request},
    http::HeaderName,
};

/// Extract the client IP address.
///
/// If `ip_header` is set (running behind a proxy), the IP is read from that
/// header, taking the first entry of a comma-separated list. A missing or
/// unparsable header is an error; there is no fallback to the socket address.
///
/// If `ip_header` is None, uses the SocketAddr from ConnectInfo.
pub fn extract_client_ip<B>(
    request: &Request<B>,
    ip_header: Option<&HeaderName>,
) -> Result<String, &'static str> {
    match ip_header {
        Some(name) => {
            let header_value = request
                .headers()
                .get(name)
                .ok_or("IP header not present")?
                .to_str()
                .map_err(|_| "IP header contains invalid characters")?;
            let first = header_value.split(',').next().unwrap_or("").trim();
            first
                .parse::<std::net::IpAddr>()
                .map(|ip| ip.to_string())
                .map_err(|_| "IP header does not contain a valid address")
        }
        None => request
            .extensions()
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ci| ci.0.ip().to_string())
            .ok_or("No client IP available"),
    }
}
