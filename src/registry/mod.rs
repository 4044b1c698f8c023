//! Peer registry
//!
//! This module provides:
//! - The authoritative table of playing control peers
//! - Session-id issuance and datagram-endpoint correlation
//! - Atomic liveness timestamps sampled by the heartbeat supervisor

pub mod entry;
pub mod error;
pub mod store;

pub use entry::{LastTick, PeerHandle, PeerInfo};
pub use error::RegistryError;
pub use store::PeerRegistry;
