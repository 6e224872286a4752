//! Network utilities
//!
//! Address splitting and the PORT/EPRT argument encodings.

use std::net::{IpAddr, Ipv6Addr, SocketAddr};

use crate::error::ConnectError;

/// Splits `host`, `host:port`, `[v6]`, `[v6]:port` or a bare IPv6 literal
/// into host and port.
pub fn split_host_port(address: &str, default_port: u16) -> Result<(String, u16), ConnectError> {
    let address = address.trim();
    if address.is_empty() {
        return Err(ConnectError::InvalidAddress("empty address".into()));
    }

    if let Some(rest) = address.strip_prefix('[') {
        let end = rest
            .find(']')
            .ok_or_else(|| ConnectError::InvalidAddress(address.to_string()))?;
        let host = &rest[..end];
        let tail = &rest[end + 1..];
        let port = match tail.strip_prefix(':') {
            Some(p) => parse_port(address, p)?,
            None if tail.is_empty() => default_port,
            None => return Err(ConnectError::InvalidAddress(address.to_string())),
        };
        return Ok((host.to_string(), port));
    }

    if address.parse::<Ipv6Addr>().is_ok() {
        return Ok((address.to_string(), default_port));
    }

    match address.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() => Ok((host.to_string(), parse_port(address, port)?)),
        Some(_) => Err(ConnectError::InvalidAddress(address.to_string())),
        None => Ok((address.to_string(), default_port)),
    }
}

fn parse_port(address: &str, port: &str) -> Result<u16, ConnectError> {
    match port.parse::<u16>() {
        Ok(p) if p != 0 => Ok(p),
        _ => Err(ConnectError::InvalidAddress(address.to_string())),
    }
}

/// `h1,h2,h3,h4,p1,p2` for the PORT command. IPv4 only.
pub fn format_port_argument(addr: &SocketAddr) -> Option<String> {
    let ip = match addr.ip() {
        IpAddr::V4(v4) => v4,
        IpAddr::V6(v6) => v6.to_ipv4_mapped()?,
    };
    let o = ip.octets();
    let port = addr.port();
    Some(format!(
        "{},{},{},{},{},{}",
        o[0],
        o[1],
        o[2],
        o[3],
        port >> 8,
        port & 0xff
    ))
}

/// `|af|ip|port|` for the EPRT command (RFC 2428).
pub fn format_eprt_argument(addr: &SocketAddr) -> String {
    let af = match addr.ip() {
        IpAddr::V4(_) => 1,
        IpAddr::V6(_) => 2,
    };
    format!("|{}|{}|{}|", af, addr.ip(), addr.port())
}
