//! Size-categorized pool of host `f64` scratch buffers
//!
//! Copy-out and slow-path materialization borrow buffers from here instead of
//! allocating per call.
//!
//! # Categories
//!
//! | Category | Request size | Capacity |
//! |----------|--------------|----------|
//! | Small    | ≤ 1 KiB      | 1 KiB    |
//! | Medium   | ≤ 64 KiB     | 64 KiB   |
//! | Large    | ≤ 1 MiB      | 1 MiB    |
//! | XLarge   | > 1 MiB      | next power of two |
//!
//! Buffers are zeroed when handed out, not when returned. Loaned buffers are
//! not held by the pool, so eviction can never reach them.

use parking_lot::Mutex;
use serde::Serialize;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::config::PoolConfig;

const KIB: usize = 1024;
const MIB: usize = 1024 * KIB;
const ELEMENT_BYTES: usize = std::mem::size_of::<f64>();

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SizeCategory {
    Small,
    Medium,
    Large,
    XLarge,
}

impl SizeCategory {
    const ALL: [SizeCategory; 4] = [Self::Small, Self::Medium, Self::Large, Self::XLarge];

    pub fn for_bytes(bytes: usize) -> Self {
        if bytes <= KIB {
            Self::Small
        } else if bytes <= 64 * KIB {
            Self::Medium
        } else if bytes <= MIB {
            Self::Large
        } else {
            Self::XLarge
        }
    }

    /// Capacity in bytes a request of `bytes` is rounded up to
    pub fn capacity_for(bytes: usize) -> usize {
        match Self::for_bytes(bytes) {
            Self::Small => KIB,
            Self::Medium => 64 * KIB,
            Self::Large => MIB,
            Self::XLarge => bytes.next_power_of_two(),
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

/// A host buffer owned by the pool or on loan from it
#[derive(Debug)]
pub struct PoolBuffer {
    pub size_category: SizeCategory,
    /// Capacity in bytes
    pub capacity: usize,
    pub last_used_at: Instant,
    pub loaned: bool,
    buffer: Vec<f64>,
}

impl PoolBuffer {
    pub fn as_slice(&self) -> &[f64] {
        &self.buffer
    }

    pub fn as_mut_slice(&mut self) -> &mut [f64] {
        &mut self.buffer
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Move the contents out, leaving the pool nothing to reuse
    pub fn into_vec(self) -> Vec<f64> {
        self.buffer
    }
}

/// Pool counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    pub hits: u64,
    pub misses: u64,
    /// Bytes held by idle buffers
    pub bytes_pooled: usize,
    /// Buffers currently on loan
    pub loaned: usize,
    pub evictions: u64,
}

#[derive(Debug)]
pub struct BufferPool {
    config: PoolConfig,
    idle: [Vec<PoolBuffer>; 4],
    stats: PoolStats,
    last_sweep: Instant,
}

impl BufferPool {
    pub fn new(config: PoolConfig) -> Self {
        Self {
            config,
            idle: Default::default(),
            stats: PoolStats::default(),
            last_sweep: Instant::now(),
        }
    }

    /// Borrow a zeroed buffer of `ceil(byte_size / 8)` elements
    pub fn acquire(&mut self, byte_size: usize) -> PoolBuffer {
        let elements = byte_size.div_ceil(ELEMENT_BYTES);
        let category = SizeCategory::for_bytes(byte_size);
        let capacity = SizeCategory::capacity_for(byte_size);

        let bucket = &mut self.idle[category.index()];
        let reusable = bucket.iter().position(|pooled| pooled.capacity >= capacity);

        let mut buffer = match reusable {
            Some(position) => {
                let pooled = bucket.swap_remove(position);
                self.stats.hits += 1;
                self.stats.bytes_pooled -= pooled.capacity;
                pooled
            }
            None => {
                self.stats.misses += 1;
                PoolBuffer {
                    size_category: category,
                    capacity,
                    last_used_at: Instant::now(),
                    loaned: false,
                    buffer: Vec::with_capacity(capacity / ELEMENT_BYTES),
                }
            }
        };

        buffer.buffer.clear();
        buffer.buffer.resize(elements, 0.0);
        buffer.loaned = true;
        self.stats.loaned += 1;
        buffer
    }

    /// Return a loaned buffer
    ///
    /// Dropped instead of pooled when it would push idle storage past
    /// `max_pooled_bytes`. May trigger an eviction sweep.
    pub fn release(&mut self, mut buffer: PoolBuffer) {
        if buffer.loaned {
            self.stats.loaned = self.stats.loaned.saturating_sub(1);
        }
        buffer.loaned = false;
        buffer.last_used_at = Instant::now();

        if self.stats.bytes_pooled + buffer.capacity <= self.config.max_pooled_bytes {
            self.stats.bytes_pooled += buffer.capacity;
            self.idle[buffer.size_category.index()].push(buffer);
        } else {
            tracing::trace!(capacity = buffer.capacity, "pool budget exhausted, dropping buffer");
        }

        if self.last_sweep.elapsed() >= self.config.eviction_interval {
            self.evict_stale(self.config.max_idle_age);
        }
    }

    /// Record that a loaned buffer will not come back
    pub(crate) fn forget(&mut self) {
        self.stats.loaned = self.stats.loaned.saturating_sub(1);
    }

    /// Drop idle buffers unused for longer than `max_age`
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn evict_stale(&mut self, max_age: Duration) -> usize {
        self.last_sweep = Instant::now();
        let mut evicted = 0;
        let mut freed_bytes = 0;

        for category in SizeCategory::ALL {
            self.idle[category.index()].retain(|pooled| {
                let stale = pooled.last_used_at.elapsed() > max_age;
                if stale {
                    evicted += 1;
                    freed_bytes += pooled.capacity;
                }
                !stale
            });
        }

        self.stats.bytes_pooled -= freed_bytes;
        self.stats.evictions += evicted as u64;
        if evicted > 0 {
            tracing::debug!(evicted, freed_bytes, "evicted stale pool buffers");
        }
        evicted
    }

    pub fn stats(&self) -> PoolStats {
        self.stats
    }

    pub fn idle_count(&self) -> usize {
        self.idle.iter().map(Vec::len).sum()
    }

    /// Borrow a buffer that returns itself to `pool` on drop
    pub fn loan(pool: &Arc<Mutex<BufferPool>>, byte_size: usize) -> PooledBuffer {
        let buffer = pool.lock().acquire(byte_size);
        PooledBuffer {
            buffer: Some(buffer),
            pool: Arc::clone(pool),
        }
    }
}

/// Loan guard; the buffer goes back to its pool when dropped
pub struct PooledBuffer {
    buffer: Option<PoolBuffer>,
    pool: Arc<Mutex<BufferPool>>,
}

impl PooledBuffer {
    pub fn capacity(&self) -> usize {
        self.buffer.as_ref().map_or(0, |buffer| buffer.capacity)
    }

    /// Keep the contents, giving up the loan
    pub fn into_vec(mut self) -> Vec<f64> {
        self.pool.lock().forget();
        self.buffer.take().map(PoolBuffer::into_vec).unwrap_or_default()
    }
}

impl Deref for PooledBuffer {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        match self.buffer.as_ref() {
            Some(buffer) => buffer.as_slice(),
            None => &[],
        }
    }
}

impl DerefMut for PooledBuffer {
    fn deref_mut(&mut self) -> &mut [f64] {
        match self.buffer.as_mut() {
            Some(buffer) => buffer.as_mut_slice(),
            None => &mut [],
        }
    }
}

impl std::fmt::Debug for PooledBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledBuffer")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish()
    }
}

impl Drop for PooledBuffer {
    fn drop(&mut self) {
        if let Some(buffer) = self.buffer.take() {
            self.pool.lock().release(buffer);
        }
    }
}
