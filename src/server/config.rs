//! Server configuration

use std::net::SocketAddr;
use std::time::Duration;

use crate::protocol::constants::*;

/// Server configuration options
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the control (TCP) and audio (UDP) servers bind to
    pub bind_addr: SocketAddr,

    /// WebSocket server port; `None` means control port + 1
    pub websocket_port: Option<u16>,

    /// Maximum concurrent control clients (0 = unlimited)
    pub max_clients: usize,

    /// Enable TCP_NODELAY on control sockets
    pub tcp_nodelay: bool,

    /// Interval between keep-alive probes on the control channel
    pub heartbeat_interval: Duration,

    /// Inbound-heartbeat age that tears down a control peer
    pub heartbeat_timeout: Duration,

    /// Interval between WebSocket liveness checks
    pub ws_heartbeat_interval: Duration,

    /// Inbound-frame age that closes a WebSocket session
    pub ws_heartbeat_timeout: Duration,

    /// Buffers pre-allocated in the segment pool
    pub pool_initial_buffers: usize,

    /// Maximum idle buffers retained by the segment pool
    pub pool_max_retained: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)),
            websocket_port: None,
            max_clients: MAX_CLIENTS,
            tcp_nodelay: true, // the control channel carries small latency-sensitive frames
            heartbeat_interval: HEARTBEAT_INTERVAL,
            heartbeat_timeout: HEARTBEAT_TIMEOUT,
            ws_heartbeat_interval: WS_HEARTBEAT_INTERVAL,
            ws_heartbeat_timeout: WS_HEARTBEAT_TIMEOUT,
            pool_initial_buffers: POOL_INITIAL_BUFFERS,
            pool_max_retained: POOL_MAX_RETAINED,
        }
    }
}

impl ServerConfig {
    /// Create a new config with a custom bind address
    pub fn with_addr(addr: SocketAddr) -> Self {
        Self {
            bind_addr: addr,
            ..Default::default()
        }
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the WebSocket port
    pub fn websocket_port(mut self, port: u16) -> Self {
        self.websocket_port = Some(port);
        self
    }

    /// Set the maximum client count
    pub fn max_clients(mut self, max: usize) -> Self {
        self.max_clients = max;
        self
    }

    /// Set the control-channel heartbeat timing
    pub fn heartbeat(mut self, interval: Duration, timeout: Duration) -> Self {
        self.heartbeat_interval = interval;
        self.heartbeat_timeout = timeout;
        self
    }

    /// Set the WebSocket heartbeat timing
    pub fn ws_heartbeat(mut self, interval: Duration, timeout: Duration) -> Self {
        self.ws_heartbeat_interval = interval;
        self.ws_heartbeat_timeout = timeout;
        self
    }

    /// Resolve the WebSocket bind address for a control server bound to
    /// `control_addr`
    pub fn ws_addr(&self, control_addr: SocketAddr) -> SocketAddr {
        let port = self
            .websocket_port
            .unwrap_or_else(|| control_addr.port().wrapping_add(1));
        SocketAddr::new(control_addr.ip(), port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();

        assert_eq!(config.bind_addr.port(), DEFAULT_PORT);
        assert_eq!(config.websocket_port, None);
        assert_eq!(config.max_clients, MAX_CLIENTS);
        assert!(config.tcp_nodelay);
        assert_eq!(config.heartbeat_interval, Duration::from_secs(3));
        assert_eq!(config.heartbeat_timeout, Duration::from_secs(5));
    }

    #[test]
    fn test_with_addr() {
        let addr: SocketAddr = "127.0.0.1:4000".parse().unwrap();
        let config = ServerConfig::with_addr(addr);

        assert_eq!(config.bind_addr, addr);
    }

    #[test]
    fn test_ws_addr_defaults_to_adjacent_port() {
        let config = ServerConfig::default();
        let control: SocketAddr = "192.168.1.5:65530".parse().unwrap();

        assert_eq!(config.ws_addr(control), "192.168.1.5:65531".parse().unwrap());
    }

    #[test]
    fn test_ws_addr_explicit_port() {
        let config = ServerConfig::default().websocket_port(9000);
        let control: SocketAddr = "192.168.1.5:65530".parse().unwrap();

        assert_eq!(config.ws_addr(control).port(), 9000);
    }

    #[test]
    fn test_builder_chaining() {
        let addr: SocketAddr = "127.0.0.1:5000".parse().unwrap();
        let config = ServerConfig::default()
            .bind(addr)
            .max_clients(10)
            .heartbeat(Duration::from_millis(100), Duration::from_millis(250))
            .ws_heartbeat(Duration::from_secs(1), Duration::from_secs(2));

        assert_eq!(config.bind_addr, addr);
        assert_eq!(config.max_clients, 10);
        assert_eq!(config.heartbeat_interval, Duration::from_millis(100));
        assert_eq!(config.heartbeat_timeout, Duration::from_millis(250));
        assert_eq!(config.ws_heartbeat_interval, Duration::from_secs(1));
        assert_eq!(config.ws_heartbeat_timeout, Duration::from_secs(2));
    }
}
