//! Crate error type

use thiserror::Error;

use crate::capture::SampleEncoding;
use crate::registry::RegistryError;

/// Main error type for the server and capture surfaces
#[derive(Error, Debug)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("server is already running")]
    AlreadyRunning,

    #[error("audio format descriptor is {size} bytes, limit is {limit}")]
    FormatTooLarge { size: usize, limit: usize },

    #[error("invalid bind address '{0}'")]
    InvalidAddress(String),

    #[error("no capture device available")]
    NoCaptureDevice,

    #[error("capture device does not support {0} capture")]
    UnsupportedEncoding(SampleEncoding),

    #[error("audio capture error: {0}")]
    Capture(String),
}

/// Result type alias for crate operations
pub type Result<T> = std::result::Result<T, Error>;
