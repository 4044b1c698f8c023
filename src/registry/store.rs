//! Peer registry implementation
//!
//! The authoritative table of playing control peers. The control server
//! adds and removes entries, the datagram server binds endpoints to them,
//! and the fan-out path snapshots the deliverable endpoints per broadcast.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use super::entry::{PeerHandle, PeerInfo};
use super::error::RegistryError;

/// Central registry for all playing control peers
///
/// All operations serialize on one mutex; critical sections never perform
/// I/O. Liveness timestamps are atomic so the heartbeat supervisor samples
/// them with nothing more than the map lookup under the lock.
pub struct PeerRegistry {
    peers: Mutex<HashMap<PeerHandle, PeerInfo>>,

    /// Next session id; ids are strictly positive and monotonically
    /// increasing within this registry's lifetime
    next_id: AtomicU32,

    /// Session ids whose address-family mismatch has already been logged
    family_warned: Mutex<HashSet<u32>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        Self {
            peers: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(1),
            family_warned: Mutex::new(HashSet::new()),
        }
    }

    /// Register a play session for `handle` and issue its session id
    pub fn add(&self, handle: PeerHandle, control_addr: SocketAddr) -> Result<u32, RegistryError> {
        let mut peers = self.peers.lock().unwrap();

        if peers.contains_key(&handle) {
            tracing::error!(%handle, peer = %control_addr, "repeat add");
            return Err(RegistryError::DuplicatePeer(handle));
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        peers.insert(handle, PeerInfo::new(id, control_addr));

        tracing::trace!(%handle, id, peer = %control_addr, "peer added");
        Ok(id)
    }

    /// Refresh the liveness timestamp for `handle`
    pub fn touch(&self, handle: PeerHandle) -> bool {
        let peers = self.peers.lock().unwrap();
        match peers.get(&handle) {
            Some(info) => {
                info.last_tick.touch();
                true
            }
            None => false,
        }
    }

    /// Sample the liveness age for `handle`; absent peers yield `None`
    pub fn last_tick_age(&self, handle: PeerHandle) -> Option<Duration> {
        let peers = self.peers.lock().unwrap();
        peers.get(&handle).map(|info| info.last_tick.age())
    }

    /// Bind a datagram endpoint to the peer that owns session id `id`
    ///
    /// IPv4-mapped IPv6 source addresses are normalized to IPv4 before
    /// storing. Returns `false` when no peer owns the id.
    pub fn bind_datagram(&self, id: u32, endpoint: SocketAddr) -> bool {
        let endpoint = normalize_endpoint(endpoint);
        let mut peers = self.peers.lock().unwrap();

        let Some(info) = peers.values_mut().find(|info| info.id == id) else {
            tracing::error!(id, peer = %endpoint, "no control peer for registration datagram");
            return false;
        };

        info.udp_endpoint = Some(endpoint);
        info.last_tick.touch();
        tracing::info!(id, control = %info.control_addr, udp = %endpoint, "datagram endpoint bound");
        true
    }

    /// Remove `handle` from the registry
    ///
    /// Idempotent at the correctness level; removing an absent peer is
    /// logged as an error.
    pub fn remove(&self, handle: PeerHandle) -> bool {
        let mut peers = self.peers.lock().unwrap();
        match peers.remove(&handle) {
            Some(info) => {
                tracing::trace!(%handle, peer = %info.control_addr, "peer removed");
                true
            }
            None => {
                tracing::error!(%handle, "repeat remove");
                false
            }
        }
    }

    /// Snapshot the datagram endpoints eligible for fan-out
    ///
    /// Peers without a bound endpoint are skipped; peers whose address
    /// family disagrees with the server's socket are skipped and logged
    /// once per session id.
    pub fn snapshot_endpoints(&self, server_is_v4: bool) -> Vec<SocketAddr> {
        let mut endpoints = Vec::new();
        let mut mismatched = Vec::new();

        {
            let peers = self.peers.lock().unwrap();
            endpoints.reserve(peers.len());
            for info in peers.values() {
                let Some(endpoint) = info.udp_endpoint else {
                    continue;
                };
                if endpoint.is_ipv4() == server_is_v4 {
                    endpoints.push(endpoint);
                } else {
                    mismatched.push((info.id, endpoint));
                }
            }
        }

        if !mismatched.is_empty() {
            let mut warned = self.family_warned.lock().unwrap();
            for (id, endpoint) in mismatched {
                if warned.insert(id) {
                    tracing::warn!(
                        id,
                        udp = %endpoint,
                        server_family = if server_is_v4 { "IPv4" } else { "IPv6" },
                        "address family mismatch, peer skipped"
                    );
                }
            }
        }

        endpoints
    }

    /// Number of registered peers
    pub fn len(&self) -> usize {
        self.peers.lock().unwrap().len()
    }

    /// Whether the registry has no peers
    pub fn is_empty(&self) -> bool {
        self.peers.lock().unwrap().is_empty()
    }
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Collapse an IPv4-mapped IPv6 address (`::ffff:a.b.c.d`) to plain IPv4
fn normalize_endpoint(endpoint: SocketAddr) -> SocketAddr {
    if let SocketAddr::V6(v6) = endpoint {
        if let Some(v4) = v6.ip().to_ipv4_mapped() {
            return SocketAddr::new(v4.into(), v6.port());
        }
    }
    endpoint
}
