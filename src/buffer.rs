//! Reusable buffer pool for the audio hot path
//!
//! Every broadcast call copies PCM segments into datagram-sized buffers.
//! Allocating those fresh at audio rate creates steady allocator churn, so
//! segments are drawn from a bounded pool instead: acquisition pops an idle
//! buffer or falls back to a fresh allocation, and dropping a
//! [`PooledBuffer`] hands the storage back while the pool is below its
//! retention cap.

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

/// Thread-safe pool of fixed-capacity byte buffers
///
/// Cloning is cheap; clones share the same pool.
#[derive(Clone)]
pub struct BufferPool {
    shared: Arc<PoolShared>,
}

struct PoolShared {
    buffer_size: usize,
    max_retained: usize,
    idle: Mutex<Vec<Vec<u8>>>,
    allocations: AtomicU64,
}

impl BufferPool {
    /// Create a pool of `buffer_size`-byte buffers
    ///
    /// `initial_fill` buffers are allocated up front; at most `max_retained`
    /// idle buffers are kept across releases.
    pub fn new(buffer_size: usize, initial_fill: usize, max_retained: usize) -> Self {
        let idle = (0..initial_fill.min(max_retained))
            .map(|_| Vec::with_capacity(buffer_size))
            .collect::<Vec<_>>();

        let shared = Arc::new(PoolShared {
            buffer_size,
            max_retained,
            allocations: AtomicU64::new(idle.len() as u64),
            idle: Mutex::new(idle),
        });

        Self { shared }
    }

    /// Acquire an empty buffer with capacity `buffer_size`
    ///
    /// Never fails: when the pool is empty a fresh buffer is allocated.
    pub fn acquire(&self) -> PooledBuffer {
        let recycled = self.shared.idle.lock().unwrap().pop();

        let data = match recycled {
            Some(buf) => buf,
            None => {
                self.shared.allocations.fetch_add(1, Ordering::Relaxed);
                Vec::with_capacity(self.shared.buffer_size)
            }
        };

        PooledBuffer {
            data,
            pool: Arc::downgrade(&self.shared),
        }
    }

    /// Fixed capacity of each pooled buffer
    pub fn buffer_size(&self) -> usize {
        self.shared.buffer_size
    }

    /// Number of idle buffers currently retained
    pub fn idle_count(&self) -> usize {
        self.shared.idle.lock().unwrap().len()
    }

    /// Total buffers allocated over the pool's lifetime
    pub fn allocation_count(&self) -> u64 {
        self.shared.allocations.load(Ordering::Relaxed)
    }
}

impl PoolShared {
    fn release(&self, mut data: Vec<u8>) {
        let mut idle = self.idle.lock().unwrap();
        if idle.len() < self.max_retained {
            data.clear();
            if data.capacity() < self.buffer_size {
                data.reserve(self.buffer_size);
            }
            idle.push(data);
        }
        // Pool at capacity: the buffer is freed on drop.
    }
}

/// A uniquely-owned buffer drawn from a [`BufferPool`]
///
/// Dereferences to `Vec<u8>`; on drop the storage returns to its
/// originating pool, or is freed normally when the pool is gone or full.
pub struct PooledBuffer {
    data: Vec<u8>,
    pool: Weak<PoolShared>,
}

impl Deref for PooledBuffer {
    type Target = Vec<u8>;

    fn deref(&self) -> &Vec<u8> {
        &self.data
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut Vec<u8> {
        &mut self.data
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.upgrade() {
            pool.release(std::mem::take(&mut self.data));
        }
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.data.len())
            .field("capacity", &self.data.capacity())
            .finish()
    }
}
