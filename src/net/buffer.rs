//! Reusable byte buffers for connection contexts.
//!
//! # Responsibilities
//! - Hand out cleared buffers to connection handlers
//! - Take buffers back when the handler is done, on every exit path
//! - Track how many buffers are checked out
//!
//! # Design Decisions
//! - RAII guard returns the buffer on drop (including unwinding)
//! - Free list is bounded by `max_idle`; surplus buffers are freed
//! - Buffers grown past `RETAIN_FACTOR` times the base capacity are freed too
//! - One process-wide pool by default; tests inject their own

use std::ops::{Deref, DerefMut};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, OnceLock};

use bytes::BytesMut;

use crate::config::BufferPoolConfig;

/// Buffers larger than this multiple of `buffer_capacity` are not kept for reuse.
pub const RETAIN_FACTOR: usize = 4;

static GLOBAL_POOL: OnceLock<Arc<BufferPool>> = OnceLock::new();

/// A pool of reusable `BytesMut` buffers.
#[derive(Debug)]
pub struct BufferPool {
    free: Mutex<Vec<BytesMut>>,
    outstanding: AtomicUsize,
    buffer_capacity: usize,
    max_idle: usize,
}

impl BufferPool {
    /// Create a pool whose fresh buffers start with `buffer_capacity` bytes.
    pub fn new(buffer_capacity: usize, max_idle: usize) -> Arc<Self> {
        Arc::new(Self {
            free: Mutex::new(Vec::new()),
            outstanding: AtomicUsize::new(0),
            buffer_capacity,
            max_idle,
        })
    }

    /// Create a pool from configuration.
    pub fn from_config(config: &BufferPoolConfig) -> Arc<Self> {
        Self::new(config.buffer_capacity, config.max_idle)
    }

    /// The process-wide pool.
    pub fn global() -> Arc<Self> {
        GLOBAL_POOL
            .get_or_init(|| Self::from_config(&BufferPoolConfig::default()))
            .clone()
    }

    /// Size the process-wide pool. Only the first call before any use takes
    /// effect; returns whether this call did.
    pub fn configure_global(config: &BufferPoolConfig) -> bool {
        GLOBAL_POOL.set(Self::from_config(config)).is_ok()
    }

    /// Check out a cleared buffer.
    pub fn acquire(self: &Arc<Self>) -> PooledBuffer {
        let recycled = self.lock_free().pop();
        let mut buf = recycled.unwrap_or_else(|| BytesMut::with_capacity(self.buffer_capacity));
        buf.clear();
        self.outstanding.fetch_add(1, Ordering::AcqRel);
        PooledBuffer {
            buf,
            pool: Arc::clone(self),
        }
    }

    /// Number of buffers currently checked out.
    pub fn outstanding(&self) -> usize {
        self.outstanding.load(Ordering::Acquire)
    }

    /// Number of buffers waiting for reuse.
    pub fn idle(&self) -> usize {
        self.lock_free().len()
    }

    /// Largest capacity a returned buffer may have and still be reused.
    pub fn max_retained_capacity(&self) -> usize {
        self.buffer_capacity.saturating_mul(RETAIN_FACTOR)
    }

    fn release(&self, mut buf: BytesMut) {
        if buf.capacity() <= self.max_retained_capacity() {
            buf.clear();
            let mut free = self.lock_free();
            if free.len() < self.max_idle {
                free.push(buf);
            }
        }
        self.outstanding.fetch_sub(1, Ordering::AcqRel);
    }

    fn lock_free(&self) -> std::sync::MutexGuard<'_, Vec<BytesMut>> {
        // The free list holds plain buffers; a panic mid-push leaves it usable.
        self.free.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// A buffer checked out of a [`BufferPool`]. Returned to the pool on drop.
#[derive(Debug)]
pub struct PooledBuffer {
    buf: BytesMut,
    pool: Arc<BufferPool>,
}

impl Deref for PooledBuffer {
    type Target = BytesMut;

    fn deref(&self) -> &BytesMut {
        &self.buf
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        let buf = std::mem::take(&mut self.buf);
        self.pool.release(buf);
    }
}
