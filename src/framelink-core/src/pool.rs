//! Per-stream recycling of frame backing buffers.
//!
//! A stream acquires one buffer per produced frame and gets it back when the
//! caller frees the frame. Pooled buffers are reused for any request they can
//! hold without growing; when none fits, the too-small ones are discarded and a
//! fresh buffer is allocated, so a size change costs a single allocation.

use crate::codes::{PluginError, PluginResult};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};

pub const DEFAULT_MAX_FREE_BUFFERS: usize = 8;

static NEXT_POOL_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of the pool that issued a buffer. `0` marks caller-owned memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PoolId(u64);

impl PoolId {
    pub const DETACHED: PoolId = PoolId(0);

    pub fn get(self) -> u64 {
        self.0
    }
}

/// Owning, contiguous backing store of one frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameBuffer {
    data: Vec<u8>,
    pool: PoolId,
}

impl FrameBuffer {
    /// Wraps caller-owned bytes, e.g. a frame built for a sink.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self {
            data,
            pool: PoolId::DETACHED,
        }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn pool_id(&self) -> PoolId {
        self.pool
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PoolStats {
    /// Fresh allocations.
    pub allocations: u64,
    /// Acquisitions served from the free list.
    pub reuses: u64,
    /// Pooled buffers thrown away because they were too small.
    pub discards: u64,
    /// Buffers handed back to the pool.
    pub releases: u64,
    /// Releases dropped because the free list was full.
    pub overflows: u64,
    /// Buffers currently on the free list.
    pub free: usize,
}

#[derive(Debug, Default)]
struct PoolState {
    free: Vec<Vec<u8>>,
    stats: PoolStats,
}

#[derive(Debug)]
pub struct BufferPool {
    id: PoolId,
    max_free: usize,
    state: Mutex<PoolState>,
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FREE_BUFFERS)
    }
}

impl BufferPool {
    pub fn new(max_free: usize) -> Self {
        Self {
            id: PoolId(NEXT_POOL_ID.fetch_add(1, Ordering::Relaxed)),
            max_free,
            state: Mutex::new(PoolState::default()),
        }
    }

    pub fn id(&self) -> PoolId {
        self.id
    }

    /// Zero-filled buffer of exactly `len` bytes.
    pub fn acquire(&self, len: usize) -> FrameBuffer {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);

        let best = state
            .free
            .iter()
            .enumerate()
            .filter(|(_, buf)| buf.capacity() >= len)
            .min_by_key(|(_, buf)| buf.capacity())
            .map(|(idx, _)| idx);

        let data = match best {
            Some(idx) => {
                let mut buf = state.free.swap_remove(idx);
                buf.clear();
                buf.resize(len, 0);
                state.stats.reuses += 1;
                buf
            }
            None => {
                let before = state.free.len();
                state.free.retain(|buf| buf.capacity() >= len);
                let discarded = before - state.free.len();
                if discarded > 0 {
                    tracing::trace!(pool = self.id.0, discarded, len, "discarding undersized buffers");
                }
                state.stats.discards += discarded as u64;
                state.stats.allocations += 1;
                vec![0u8; len]
            }
        };
        state.stats.free = state.free.len();

        FrameBuffer {
            data,
            pool: self.id,
        }
    }

    /// Returns a buffer issued by this pool. Foreign buffers are rejected.
    pub fn release(&self, buffer: FrameBuffer) -> PluginResult<()> {
        if buffer.pool != self.id {
            return Err(PluginError::error(format!(
                "buffer from pool {} released to pool {}",
                buffer.pool.0, self.id.0
            )));
        }

        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.stats.releases += 1;
        if state.free.len() < self.max_free {
            state.free.push(buffer.data);
        } else {
            state.stats.overflows += 1;
        }
        state.stats.free = state.free.len();
        Ok(())
    }

    pub fn stats(&self) -> PoolStats {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .stats
    }

    /// Drops every pooled buffer.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.free.clear();
        state.stats.free = 0;
    }
}
