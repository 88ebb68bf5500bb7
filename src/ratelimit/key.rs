//! Client key derivation from peer addresses.

use std::net::{IpAddr, SocketAddr};

/// Derive the rate limit key for a connected peer.
///
/// The port is dropped so every connection from one host shares a counter.
/// IPv4-mapped IPv6 addresses collapse to their IPv4 form.
pub fn client_key(addr: &SocketAddr) -> String {
    normalize_ip(addr.ip()).to_string()
}

fn normalize_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
            Some(v4) => IpAddr::V4(v4),
            None => IpAddr::V6(v6),
        },
        v4 => v4,
    }
}
