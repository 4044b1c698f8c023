//! Per-session WebSocket state
//!
//! Each browser listener gets a bounded outbound queue of audio segments,
//! a liveness timestamp, and a cancellation token shared by its reader,
//! sender, and heartbeat tasks.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;

use crate::protocol::WS_QUEUE_CAPACITY;
use crate::registry::LastTick;

/// State for one upgraded WebSocket client
pub struct WsSession {
    /// Session id, unique per WebSocket server instance
    pub id: u64,

    /// Refreshed on every inbound frame
    pub last_tick: LastTick,

    /// Cancelled when any of the session's tasks terminates the session
    pub shutdown: CancellationToken,

    queue: Mutex<VecDeque<Bytes>>,
    dropped: AtomicU64,
}

impl WsSession {
    pub fn new(id: u64, shutdown: CancellationToken) -> Self {
        let last_tick = LastTick::new();
        last_tick.touch();
        Self {
            id,
            last_tick,
            shutdown,
            queue: Mutex::new(VecDeque::with_capacity(WS_QUEUE_CAPACITY)),
            dropped: AtomicU64::new(0),
        }
    }

    /// Queue one audio segment for delivery
    ///
    /// When the queue is at capacity the segment is dropped; for a live
    /// audio stream staleness is worse than loss. Returns `false` on drop.
    pub fn enqueue(&self, payload: Bytes) -> bool {
        let mut queue = self.queue.lock().unwrap();
        if queue.len() >= WS_QUEUE_CAPACITY {
            drop(queue);
            self.dropped.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        queue.push_back(payload);
        true
    }

    /// Take the next queued segment, oldest first
    pub fn pop(&self) -> Option<Bytes> {
        self.queue.lock().unwrap().pop_front()
    }

    /// Number of queued segments
    pub fn queue_len(&self) -> usize {
        self.queue.lock().unwrap().len()
    }

    /// Segments discarded due to backpressure
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Terminate the session's tasks
    pub fn close(&self) {
        self.shutdown.cancel();
    }

    /// Whether the session has been closed
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}
