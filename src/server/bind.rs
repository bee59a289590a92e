//! Listen address resolution for `server.bind`.
//!
//! - `loopback` -> 127.0.0.1 (default)
//! - `all` / `auto` -> 0.0.0.0
//! - an IP address -> that address on the configured port
//! - `host:port` -> resolved, embedded port wins

use std::net::{IpAddr, Ipv4Addr, SocketAddr, ToSocketAddrs};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum BindMode {
    #[default]
    Loopback,
    All,
    Custom(String),
}

#[derive(Error, Debug)]
pub enum BindError {
    #[error("Invalid IP address or hostname: {0}")]
    InvalidAddress(String),

    #[error("Failed to resolve hostname {host}: {message}")]
    ResolutionFailed { host: String, message: String },
}

/// Parse a bind mode string from config
pub fn parse_bind_mode(value: &str) -> BindMode {
    match value.trim().to_lowercase().as_str() {
        "" | "loopback" | "localhost" | "local" => BindMode::Loopback,
        "all" | "auto" | "0.0.0.0" => BindMode::All,
        _ => BindMode::Custom(value.trim().to_string()),
    }
}

/// Resolve a bind mode to a socket address.
pub fn resolve_bind_address(mode: &BindMode, port: u16) -> Result<SocketAddr, BindError> {
    match mode {
        BindMode::Loopback => Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::LOCALHOST), port)),
        BindMode::All => Ok(SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), port)),
        BindMode::Custom(addr) => resolve_custom_address(addr, port),
    }
}

fn resolve_custom_address(addr: &str, default_port: u16) -> Result<SocketAddr, BindError> {
    if let Ok(sock) = addr.parse::<SocketAddr>() {
        return Ok(sock);
    }
    if let Ok(ip) = addr.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, default_port));
    }
    if addr.contains(char::is_whitespace) {
        return Err(BindError::InvalidAddress(addr.to_string()));
    }

    let with_port = if addr.contains(':') {
        addr.to_string()
    } else {
        format!("{}:{}", addr, default_port)
    };
    let mut candidates: Vec<SocketAddr> = with_port
        .to_socket_addrs()
        .map_err(|e| BindError::ResolutionFailed {
            host: addr.to_string(),
            message: e.to_string(),
        })?
        .collect();
    // Prefer IPv4
    candidates.sort_by_key(|a| !a.is_ipv4());
    candidates
        .into_iter()
        .next()
        .ok_or_else(|| BindError::InvalidAddress(addr.to_string()))
}
