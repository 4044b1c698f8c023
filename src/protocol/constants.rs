//! Protocol-wide constants
//!
//! Ports, packet sizing, and liveness timing shared by the control,
//! datagram, and WebSocket surfaces.

use std::time::Duration;

/// Default port for the control (TCP) and audio (UDP) servers
pub const DEFAULT_PORT: u16 = 65530;

/// Lowest acceptable port number
pub const MIN_PORT: u16 = 1;

/// Highest acceptable port number
pub const MAX_PORT: u16 = 65535;

/// Assumed path MTU for sizing audio datagrams
pub const DEFAULT_MTU: usize = 1492;

/// IPv4 header size in bytes
pub const IPV4_HEADER_SIZE: usize = 20;

/// IPv6 header size in bytes
pub const IPV6_HEADER_SIZE: usize = 40;

/// UDP header size in bytes
pub const UDP_HEADER_SIZE: usize = 8;

/// Maximum audio payload per datagram
///
/// Sized against the IPv6 header so one value works for both address
/// families.
pub const MAX_UDP_PAYLOAD: usize = DEFAULT_MTU - IPV6_HEADER_SIZE - UDP_HEADER_SIZE;

/// Interval between server-side keep-alive probes on the control channel
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(3);

/// Maximum inbound-heartbeat age before a control peer is torn down
pub const HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(5);

/// Interval between liveness checks on a WebSocket session
pub const WS_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Maximum inbound-frame age before a WebSocket session is closed
pub const WS_HEARTBEAT_TIMEOUT: Duration = Duration::from_secs(30);

/// Maximum size of the audio format descriptor
pub const MAX_AUDIO_FORMAT_SIZE: usize = 1024;

/// Maximum number of concurrent control clients
pub const MAX_CLIENTS: usize = 100;

/// Outbound segment queue capacity per WebSocket session
pub const WS_QUEUE_CAPACITY: usize = 50;

/// Buffers pre-allocated when a pool is created
pub const POOL_INITIAL_BUFFERS: usize = 16;

/// Maximum idle buffers a pool retains
pub const POOL_MAX_RETAINED: usize = 128;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_udp_payload_size() {
        // 1492 - 40 - 8
        assert_eq!(MAX_UDP_PAYLOAD, 1444);
    }

    #[test]
    fn test_timing_ordering() {
        assert!(HEARTBEAT_INTERVAL < HEARTBEAT_TIMEOUT);
        assert!(WS_HEARTBEAT_INTERVAL < WS_HEARTBEAT_TIMEOUT);
    }
}
