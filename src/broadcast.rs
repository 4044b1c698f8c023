//! Broadcast fan-out
//!
//! Single entry point for the capture collaborator. The capture thread
//! hands in a contiguous PCM block; the fan-out forwards it unchanged to
//! every auxiliary sink, splits it into pool-backed datagram segments
//! along block-align boundaries, and posts the datagram sends onto the
//! I/O runtime. The calling thread never touches a socket.

use std::sync::{Arc, Mutex};

use tokio::net::UdpSocket;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

use crate::buffer::{BufferPool, PooledBuffer};
use crate::protocol::MAX_UDP_PAYLOAD;
use crate::registry::PeerRegistry;

/// An additional audio consumer registered at the fan-out point
///
/// Sinks receive the unsegmented byte span and may copy or drop it. They
/// are invoked on the capture thread and must not block.
pub trait AudioSink: Send + Sync {
    /// Deliver one PCM block
    fn deliver(&self, data: &[u8], block_align: usize);
}

/// Fan-out from the capture callback to all subscribers
///
/// Safe to invoke from the capture thread; datagram I/O is posted onto the
/// runtime that owns the socket.
pub struct Broadcaster {
    pool: BufferPool,
    registry: Arc<PeerRegistry>,
    socket: Arc<UdpSocket>,
    server_is_v4: bool,
    runtime: Handle,
    shutdown: CancellationToken,
    sinks: Mutex<Vec<Arc<dyn AudioSink>>>,
}

impl Broadcaster {
    pub(crate) fn new(
        pool: BufferPool,
        registry: Arc<PeerRegistry>,
        socket: Arc<UdpSocket>,
        runtime: Handle,
        shutdown: CancellationToken,
    ) -> Self {
        let server_is_v4 = socket
            .local_addr()
            .map(|addr| addr.is_ipv4())
            .unwrap_or(true);

        Self {
            pool,
            registry,
            socket,
            server_is_v4,
            runtime,
            shutdown,
            sinks: Mutex::new(Vec::new()),
        }
    }

    /// Register an auxiliary sink
    pub fn add_sink(&self, sink: Arc<dyn AudioSink>) {
        let mut sinks = self.sinks.lock().unwrap();
        sinks.push(sink);
        tracing::info!(total = sinks.len(), "auxiliary sink added");
    }

    /// Broadcast one PCM block to every subscriber
    ///
    /// Input that is not a whole number of samples is trimmed down to the
    /// nearest `block_align` multiple; the tail bytes are dropped.
    pub fn broadcast(&self, data: &[u8], block_align: usize) {
        if data.is_empty() || block_align == 0 || self.shutdown.is_cancelled() {
            return;
        }

        {
            let sinks = self.sinks.lock().unwrap();
            for sink in sinks.iter() {
                sink.deliver(data, block_align);
            }
        }

        let segments = split_segments(&self.pool, data, block_align);
        if segments.is_empty() {
            return;
        }

        let endpoints = self.registry.snapshot_endpoints(self.server_is_v4);
        if endpoints.is_empty() {
            return;
        }

        // Hop onto the runtime; segments keep their pool buffers alive
        // until the last send completes.
        let socket = Arc::clone(&self.socket);
        self.runtime.spawn(async move {
            for segment in &segments {
                for endpoint in &endpoints {
                    if let Err(e) = socket.send_to(segment, *endpoint).await {
                        tracing::trace!(peer = %endpoint, error = %e, "datagram send failed");
                    }
                }
            }
        });
    }

    /// Address family of the datagram socket
    pub fn is_ipv4(&self) -> bool {
        self.server_is_v4
    }
}

/// Split `data` into datagram segments that respect sample boundaries
///
/// Each segment is at most `MAX_UDP_PAYLOAD` bytes trimmed to a multiple
/// of `block_align`; a sample never straddles two datagrams. A trailing
/// partial sample is dropped.
fn split_segments(pool: &BufferPool, data: &[u8], block_align: usize) -> Vec<PooledBuffer> {
    let max_seg_size = MAX_UDP_PAYLOAD - MAX_UDP_PAYLOAD % block_align;
    if max_seg_size == 0 {
        tracing::warn!(block_align, "block align exceeds datagram payload");
        return Vec::new();
    }

    let tail = data.len() % block_align;
    if tail != 0 {
        tracing::trace!(tail, "dropping partial-sample tail");
    }
    let usable = &data[..data.len() - tail];

    let mut segments = Vec::with_capacity(usable.len().div_ceil(max_seg_size));
    for chunk in usable.chunks(max_seg_size) {
        let mut segment = pool.acquire();
        segment.extend_from_slice(chunk);
        segments.push(segment);
    }
    segments
}
