//! Default bind-address selection
//!
//! Interface enumeration is platform territory and stays outside the
//! core; callers hand in candidate addresses (or use the portable probe)
//! and the selector prefers RFC 1918 private space.

use std::net::{Ipv4Addr, SocketAddr, UdpSocket};

/// Pick a plausible default bind address from `addresses`
///
/// Returns the first private-range address (10/8, 172.16/12, 192.168/16),
/// falling back to the first entry; `None` when the list is empty.
pub fn select_default_address(addresses: &[Ipv4Addr]) -> Option<Ipv4Addr> {
    addresses
        .iter()
        .copied()
        .find(|addr| addr.is_private())
        .or_else(|| addresses.first().copied())
}

/// Probe the local IPv4 address the OS would route external traffic from
///
/// Connects a datagram socket to a public address and reads back the local
/// address; no packets are sent. Returns `None` when the host has no
/// usable IPv4 route.
pub fn probe_default_address() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect("8.8.8.8:80").ok()?;

    match socket.local_addr() {
        Ok(SocketAddr::V4(addr))
            if !addr.ip().is_loopback() && !addr.ip().is_unspecified() =>
        {
            Some(*addr.ip())
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_private_address_preferred() {
        let addresses = ["8.8.8.8".parse().unwrap(), "10.0.0.5".parse().unwrap()];
        assert_eq!(
            select_default_address(&addresses),
            Some("10.0.0.5".parse().unwrap())
        );
    }

    #[test]
    fn test_each_private_range_recognized() {
        for private in ["10.1.2.3", "172.16.0.1", "172.31.255.1", "192.168.0.7"] {
            let addresses = ["1.1.1.1".parse().unwrap(), private.parse().unwrap()];
            assert_eq!(
                select_default_address(&addresses),
                Some(private.parse().unwrap()),
                "expected {private} to be selected"
            );
        }
    }

    #[test]
    fn test_falls_back_to_first_public_address() {
        let addresses = ["8.8.8.8".parse().unwrap(), "1.1.1.1".parse().unwrap()];
        assert_eq!(
            select_default_address(&addresses),
            Some("8.8.8.8".parse().unwrap())
        );
    }

    #[test]
    fn test_empty_list_yields_none() {
        assert_eq!(select_default_address(&[]), None);
    }
}
