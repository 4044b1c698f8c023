//! Audio capture seam
//!
//! This module provides:
//! - The PCM format description and its wire/JSON encodings
//! - The [`AudioSource`] trait the server drives capture through
//! - A cpal-backed loopback source and device enumeration

pub mod format;
pub mod loopback;

pub use format::{AudioFormat, SampleEncoding};
pub use loopback::{list_capture_devices, CaptureConfig, DeviceInfo, LoopbackCapture};

use std::sync::Arc;

use bytes::Bytes;

use crate::broadcast::Broadcaster;
use crate::error::Result;

/// A producer of PCM frames
///
/// The server queries the format before it starts listening, then hands
/// the source a [`Broadcaster`]; the source calls
/// [`Broadcaster::broadcast`] from its own thread for every captured
/// block. At most one call is in flight at a time.
pub trait AudioSource: Send + Sync {
    /// The fixed PCM layout this source produces
    fn format(&self) -> AudioFormat;

    /// Opaque format descriptor served over the control channel
    fn format_descriptor(&self) -> Bytes {
        self.format().encode()
    }

    /// Begin capturing into `broadcaster`
    fn start(&self, broadcaster: Arc<Broadcaster>) -> Result<()>;

    /// Stop capturing; idempotent
    fn stop(&self);
}
