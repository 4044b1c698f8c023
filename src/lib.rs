//! Low-latency LAN audio broadcast server
//!
//! Captures the host's system audio and streams it to many concurrent
//! listeners over three surfaces on one host address:
//!
//! - A TCP **control channel** running a small little-endian opcode
//!   protocol (format query, play registration, heartbeats)
//! - A UDP **datagram channel** carrying raw PCM, correlated to control
//!   peers through a session id
//! - A **WebSocket channel** on an adjacent port for browser listeners
//!
//! ```no_run
//! use std::sync::Arc;
//! use audioshare::{AudioServer, CaptureConfig, LoopbackCapture, ServerConfig};
//!
//! fn main() -> audioshare::Result<()> {
//!     let source = Arc::new(LoopbackCapture::new(&CaptureConfig::default())?);
//!     let server = AudioServer::new(
//!         ServerConfig::with_addr("192.168.1.5:65530".parse().unwrap()),
//!         source,
//!     );
//!     server.start()?;
//!     server.wait();
//!     Ok(())
//! }
//! ```

pub mod broadcast;
pub mod buffer;
pub mod capture;
pub mod error;
pub mod net;
pub mod protocol;
pub mod registry;
pub mod server;
pub mod ws;

pub use broadcast::{AudioSink, Broadcaster};
pub use buffer::{BufferPool, PooledBuffer};
pub use capture::{
    AudioFormat, AudioSource, CaptureConfig, LoopbackCapture, SampleEncoding,
};
pub use error::{Error, Result};
pub use server::{AudioServer, ServerConfig};
