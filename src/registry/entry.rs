//! Per-peer records stored in the registry

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Stable identifier for one control connection
///
/// Handles are assigned by the accept loop and are cheap to copy; tasks
/// refer to peers by handle and re-acquire the record through the registry
/// for each access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PeerHandle(pub u64);

impl std::fmt::Display for PeerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "peer#{}", self.0)
    }
}

/// Monotonic liveness timestamp
///
/// Stored as milliseconds elapsed since the record's creation so that the
/// command loop can refresh it and the heartbeat supervisor can sample it
/// without widening the registry critical section. Staleness is bounded by
/// one supervisor interval.
#[derive(Debug)]
pub struct LastTick {
    epoch: Instant,
    elapsed_ms: AtomicU64,
}

impl LastTick {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
            elapsed_ms: AtomicU64::new(0),
        }
    }

    /// Record activity now
    pub fn touch(&self) {
        let ms = self.epoch.elapsed().as_millis() as u64;
        self.elapsed_ms.store(ms, Ordering::Relaxed);
    }

    /// Time since the last recorded activity
    pub fn age(&self) -> Duration {
        let last = Duration::from_millis(self.elapsed_ms.load(Ordering::Relaxed));
        self.epoch.elapsed().saturating_sub(last)
    }
}

impl Default for LastTick {
    fn default() -> Self {
        Self::new()
    }
}

/// Registry record for one playing control peer
#[derive(Debug)]
pub struct PeerInfo {
    /// Session id issued on `START_PLAY`, strictly positive and unique
    /// within the registry's lifetime
    pub id: u32,

    /// Remote address of the control connection
    pub control_addr: SocketAddr,

    /// Datagram endpoint, present once a registration datagram bearing
    /// `id` has arrived
    pub udp_endpoint: Option<SocketAddr>,

    /// Refreshed on inbound heartbeat or datagram registration
    pub last_tick: LastTick,
}

impl PeerInfo {
    pub(super) fn new(id: u32, control_addr: SocketAddr) -> Self {
        let last_tick = LastTick::new();
        last_tick.touch();
        Self {
            id,
            control_addr,
            udp_endpoint: None,
            last_tick,
        }
    }
}
