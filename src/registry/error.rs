//! Registry error types

use super::entry::PeerHandle;

/// Error type for registry operations
#[derive(Debug, Clone)]
pub enum RegistryError {
    /// The handle already has a play session
    DuplicatePeer(PeerHandle),
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::DuplicatePeer(handle) => {
                write!(f, "peer already registered: {}", handle)
            }
        }
    }
}

impl std::error::Error for RegistryError {}
