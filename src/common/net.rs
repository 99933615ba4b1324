//! Network utility functions
//!
//! This module provides utility functions for network operations.

use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::str::FromStr;

use super::error::{DemuxError, Result};

/// Parse a socket address
///
/// Accepts a literal `ip:port` or a resolvable `host:port`; the first
/// resolved address wins.
///
/// # Arguments
///
/// * `addr` - The address string to parse
///
/// # Returns
///
/// The parsed `SocketAddr`
pub fn parse_socket_addr(addr: &str) -> Result<SocketAddr> {
    // Try direct parsing first
    if let Ok(socket_addr) = SocketAddr::from_str(addr) {
        return Ok(socket_addr);
    }

    match addr.to_socket_addrs() {
        Ok(mut addrs) => {
            if let Some(addr) = addrs.next() {
                Ok(addr)
            } else {
                Err(DemuxError::Config(format!("Failed to parse address: {}", addr)))
            }
        }
        Err(e) => Err(DemuxError::Config(format!("Failed to parse address {}: {}", addr, e))),
    }
}

/// Rewrite `addr` into the address family of `family`
///
/// IPv4-mapped IPv6 addresses (`::ffff:a.b.c.d`) are converted to plain IPv4
/// and IPv4 addresses are mapped into IPv6. Returns `None` when a native
/// IPv6 address would have to become IPv4.
pub fn match_family(addr: SocketAddr, family: &SocketAddr) -> Option<SocketAddr> {
    match (addr.ip(), family.is_ipv4()) {
        (IpAddr::V4(_), true) | (IpAddr::V6(_), false) => Some(addr),
        (IpAddr::V4(v4), false) => Some(SocketAddr::new(IpAddr::V6(v4.to_ipv6_mapped()), addr.port())),
        (IpAddr::V6(v6), true) => v6
            .to_ipv4_mapped()
            .map(|v4| SocketAddr::new(IpAddr::V4(v4), addr.port())),
    }
}
