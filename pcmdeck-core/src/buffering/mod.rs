//! Double-buffer hand-off between a file reader and the audio callback.
//!
//! ## Protocol
//!
//! ```text
//!   producer (reader thread)                 consumer (audio callback)
//!   ────────────────────────                 ─────────────────────────
//!   wait: any chunk !ready  ◄── notify ────  chunk exhausted → ready=false,
//!   pick active if free,                     active ^= 1
//!     else the other one
//!   copy bytes (no state lock)               active !ready → silence, notify
//!   ready = true                             mix bytes (no state lock), pos += n
//! ```
//!
//! The consumer side never blocks: it takes the state lock only for O(1)
//! flag updates, and uses `try_lock` on the chunk bytes. The producer only
//! ever writes a chunk whose `ready` flag is false, and the consumer only
//! reads a chunk whose `ready` flag is true, so the chunk locks are
//! uncontended while the protocol holds.

pub mod chunk;

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::{Condvar, Mutex};

use crate::{
    audio::{format::SampleFormat, mix::mix_audio},
    error::{PlaybackError, Result},
};

use self::chunk::AudioChunk;

/// Default chunk capacity: 2 × 1920 bytes = 20 ms of 48 kHz stereo s16le.
pub const DEFAULT_CHUNK_BYTES: usize = 2 * 1920;

/// Flags shared by both sides. Guarded by `DoubleBuffer::state`.
#[derive(Debug, Clone, Copy, Default)]
struct HandoffState {
    ready: [bool; 2],
    active: usize,
    /// Chunk the producer has claimed but not yet published.
    filling: Option<usize>,
}

impl HandoffState {
    fn has_free_chunk(&self) -> bool {
        (0..2).any(|i| !self.ready[i] && self.filling != Some(i))
    }

    fn is_idle(&self) -> bool {
        !self.ready[0] && !self.ready[1] && self.filling.is_none()
    }
}

/// Observable state of one chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkPhase {
    /// No unconsumed data; free for the producer.
    Empty,
    /// Claimed by the producer, bytes being copied in.
    Filling,
    /// Published, nothing consumed yet.
    Ready,
    /// Published and partially consumed.
    Draining,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkSnapshot {
    pub phase: ChunkPhase,
    pub ready: bool,
    pub size: usize,
    pub pos: usize,
    pub capacity: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandoffSnapshot {
    pub active: usize,
    pub chunks: [ChunkSnapshot; 2],
    pub cancelled: bool,
}

/// Result of one consumer-side drain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// `n` bytes were mixed into the output.
    Copied(usize),
    /// The active chunk held no data; the output is silence.
    Underrun,
    /// The active chunk bytes were locked elsewhere; the output is silence.
    Contended,
}

impl DrainOutcome {
    pub fn bytes(self) -> usize {
        match self {
            DrainOutcome::Copied(n) => n,
            DrainOutcome::Underrun | DrainOutcome::Contended => 0,
        }
    }
}

/// Two fixed-capacity chunks shared by one producer and one real-time consumer.
///
/// Share it as `Arc<DoubleBuffer>` between the reader loop and the output
/// stream callback. Both chunks are allocated in [`DoubleBuffer::new`] and
/// live as long as the last `Arc`.
pub struct DoubleBuffer {
    chunks: [Mutex<AudioChunk>; 2],
    state: Mutex<HandoffState>,
    /// Signalled whenever a chunk becomes free, and on cancellation.
    freed: Condvar,
    cancelled: AtomicBool,
    sample_format: SampleFormat,
    /// Linear volume stored as `f32` bits.
    volume: AtomicU32,
    capacity: usize,
}

impl DoubleBuffer {
    pub fn new(capacity: usize, sample_format: SampleFormat, volume: f32) -> Self {
        Self {
            chunks: [
                Mutex::new(AudioChunk::with_capacity(capacity)),
                Mutex::new(AudioChunk::with_capacity(capacity)),
            ],
            state: Mutex::new(HandoffState::default()),
            freed: Condvar::new(),
            cancelled: AtomicBool::new(false),
            sample_format,
            volume: AtomicU32::new(volume.clamp(0.0, 1.0).to_bits()),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn sample_format(&self) -> SampleFormat {
        self.sample_format
    }

    pub fn volume(&self) -> f32 {
        f32::from_bits(self.volume.load(Ordering::Relaxed))
    }

    /// Change the mix volume; takes effect on the next drain.
    pub fn set_volume(&self, volume: f32) {
        self.volume
            .store(volume.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    // ── Producer side ────────────────────────────────────────────────────

    /// Copy `data` into a free chunk and publish it to the consumer.
    ///
    /// Blocks until a chunk is free. Prefers the active chunk when it is
    /// free, else takes the other one. At most `capacity` bytes are taken;
    /// the number accepted is returned. An empty `data` publishes nothing.
    ///
    /// # Errors
    /// `PlaybackError::Cancelled` once [`cancel`](Self::cancel) has been called.
    pub fn try_fill(&self, data: &[u8]) -> Result<usize> {
        if data.is_empty() {
            return Ok(0);
        }

        let idx = {
            let mut state = self.state.lock();
            while !state.has_free_chunk() && !self.is_cancelled() {
                self.freed.wait(&mut state);
            }
            if self.is_cancelled() {
                return Err(PlaybackError::Cancelled);
            }
            let idx = if !state.ready[state.active] {
                state.active
            } else {
                1 - state.active
            };
            state.filling = Some(idx);
            idx
        };

        // The consumer ignores chunks that are not ready, so this lock is free.
        let accepted = self.chunks[idx].lock().fill(data);

        let mut state = self.state.lock();
        state.ready[idx] = true;
        state.filling = None;
        Ok(accepted)
    }

    /// Block until both chunks have been fully drained.
    ///
    /// # Errors
    /// `PlaybackError::Cancelled` if cancellation arrives first.
    pub fn wait_drained(&self) -> Result<()> {
        let mut state = self.state.lock();
        while !state.is_idle() && !self.is_cancelled() {
            self.freed.wait(&mut state);
        }
        if self.is_cancelled() {
            return Err(PlaybackError::Cancelled);
        }
        Ok(())
    }

    /// The producer's wait predicate: at least one chunk can be filled.
    pub fn has_free_chunk(&self) -> bool {
        self.state.lock().has_free_chunk()
    }

    /// Stop the hand-off and wake every thread waiting on it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
        // Taking the lock orders the flag store before any waiter re-checks it.
        let _state = self.state.lock();
        self.freed.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }

    // ── Consumer side ────────────────────────────────────────────────────

    /// Mix up to `out.len()` bytes of the active chunk into `out`.
    ///
    /// `out` is zeroed first, so any byte not written is silence. Returns the
    /// number of bytes copied; 0 means underrun. Never blocks.
    pub fn drain(&self, out: &mut [u8]) -> usize {
        self.drain_outcome(out).bytes()
    }

    /// Like [`drain`](Self::drain) but reports why nothing was copied.
    pub fn drain_outcome(&self, out: &mut [u8]) -> DrainOutcome {
        out.fill(0);

        let idx = {
            let state = self.state.lock();
            if !state.ready[state.active] {
                self.freed.notify_all();
                return DrainOutcome::Underrun;
            }
            state.active
        };

        let (copied, exhausted) = {
            let Some(mut chunk) = self.chunks[idx].try_lock() else {
                return DrainOutcome::Contended;
            };
            let pending = chunk.pending(out.len());
            let copied = pending.len();
            mix_audio(&mut out[..copied], pending, self.sample_format, self.volume());
            chunk.advance(copied);
            (copied, chunk.is_exhausted())
        };

        if exhausted {
            let mut state = self.state.lock();
            state.ready[idx] = false;
            state.active = 1 - idx;
            self.freed.notify_all();
        }

        DrainOutcome::Copied(copied)
    }

    // ── Diagnostics ──────────────────────────────────────────────────────

    pub fn active_index(&self) -> usize {
        self.state.lock().active
    }

    /// Point-in-time view of both chunks.
    ///
    /// Not for the real-time path: it waits on the chunk locks.
    pub fn snapshot(&self) -> HandoffSnapshot {
        let state = *self.state.lock();
        let chunk_snapshot = |i: usize| {
            let chunk = self.chunks[i].lock();
            let phase = if state.filling == Some(i) {
                ChunkPhase::Filling
            } else if !state.ready[i] {
                ChunkPhase::Empty
            } else if chunk.pos() == 0 {
                ChunkPhase::Ready
            } else {
                ChunkPhase::Draining
            };
            ChunkSnapshot {
                phase,
                ready: state.ready[i],
                size: chunk.size(),
                pos: chunk.pos(),
                capacity: chunk.capacity(),
            }
        };

        HandoffSnapshot {
            active: state.active,
            chunks: [chunk_snapshot(0), chunk_snapshot(1)],
            cancelled: self.is_cancelled(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sync(capacity: usize) -> DoubleBuffer {
        DoubleBuffer::new(capacity, SampleFormat::S16Le, 1.0)
    }

    fn assert_bounds(buf: &DoubleBuffer) {
        for c in buf.snapshot().chunks {
            assert!(c.pos <= c.size && c.size <= c.capacity, "{c:?}");
        }
    }

    #[test]
    fn underrun_yields_silence() {
        let buf = sync(8);
        let mut out = vec![0xAAu8; 16];
        assert_eq!(buf.drain_outcome(&mut out), DrainOutcome::Underrun);
        assert!(out.iter().all(|b| *b == 0));
    }

    #[test]
    fn first_fill_goes_to_active_chunk() {
        let buf = sync(8);
        assert_eq!(buf.try_fill(&[1, 2, 3, 4]).unwrap(), 4);
        let snap = buf.snapshot();
        assert_eq!(snap.active, 0);
        assert_eq!(snap.chunks[0].phase, ChunkPhase::Ready);
        assert_eq!(snap.chunks[1].phase, ChunkPhase::Empty);
    }

    #[test]
    fn second_fill_goes_to_other_chunk() {
        let buf = sync(8);
        buf.try_fill(&[1; 8]).unwrap();
        buf.try_fill(&[2; 8]).unwrap();
        let snap = buf.snapshot();
        assert!(snap.chunks[0].ready && snap.chunks[1].ready);
        assert!(!buf.has_free_chunk());
    }

    #[test]
    fn fill_truncates_to_capacity() {
        let buf = sync(4);
        assert_eq!(buf.try_fill(&[5; 10]).unwrap(), 4);
        assert_eq!(buf.snapshot().chunks[0].size, 4);
    }

    #[test]
    fn empty_fill_publishes_nothing() {
        let buf = sync(4);
        assert_eq!(buf.try_fill(&[]).unwrap(), 0);
        assert!(buf.snapshot().chunks.iter().all(|c| !c.ready));
    }

    #[test]
    fn partial_drain_moves_to_draining() {
        let buf = sync(8);
        buf.try_fill(&[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        let mut out = [0u8; 2];
        assert_eq!(buf.drain(&mut out), 2);
        assert_eq!(out, [1, 2]);
        let snap = buf.snapshot();
        assert_eq!(snap.chunks[0].phase, ChunkPhase::Draining);
        assert_eq!(snap.chunks[0].pos, 2);
        assert_bounds(&buf);
    }

    #[test]
    fn drain_never_crosses_chunk_boundary() {
        let buf = sync(4);
        buf.try_fill(&[1, 1, 1, 1]).unwrap();
        buf.try_fill(&[2, 2, 2, 2]).unwrap();
        let mut out = [0xFFu8; 6];
        assert_eq!(buf.drain(&mut out), 4);
        assert_eq!(out, [1, 1, 1, 1, 0, 0]);
        assert_eq!(buf.active_index(), 1);
    }

    #[test]
    fn scripted_handoff_frees_producer() {
        let buf = sync(4);
        buf.try_fill(&[1; 4]).unwrap();
        buf.try_fill(&[2; 4]).unwrap();
        assert!(!buf.has_free_chunk());

        let mut out = [0u8; 4];
        assert_eq!(buf.drain(&mut out), 4);

        let snap = buf.snapshot();
        assert!(!snap.chunks[0].ready);
        assert_eq!(snap.active, 1);
        assert!(buf.has_free_chunk());
    }

    #[test]
    fn active_index_alternates_per_cycle() {
        let buf = sync(4);
        let mut out = [0u8; 4];
        assert_eq!(buf.active_index(), 0);

        buf.try_fill(&[1; 4]).unwrap();
        buf.drain(&mut out);
        assert_eq!(buf.active_index(), 1);

        buf.try_fill(&[2; 4]).unwrap();
        buf.drain(&mut out);
        assert_eq!(buf.active_index(), 0);
    }

    #[test]
    fn refill_prefers_active_when_free() {
        let buf = sync(4);
        let mut out = [0u8; 4];
        buf.try_fill(&[1; 4]).unwrap();
        buf.drain(&mut out);
        // active is now 1 and empty
        buf.try_fill(&[2; 4]).unwrap();
        let snap = buf.snapshot();
        assert!(snap.chunks[1].ready);
        assert!(!snap.chunks[0].ready);
    }

    #[test]
    fn volume_is_applied_while_draining() {
        let buf = DoubleBuffer::new(4, SampleFormat::S16Le, 0.5);
        let src: Vec<u8> = [100i16, -100].iter().flat_map(|s| s.to_le_bytes()).collect();
        buf.try_fill(&src).unwrap();
        let mut out = [0u8; 4];
        buf.drain(&mut out);
        assert_eq!(i16::from_le_bytes([out[0], out[1]]), 50);
        assert_eq!(i16::from_le_bytes([out[2], out[3]]), -50);
    }

    #[test]
    fn cancelled_fill_returns_error() {
        let buf = sync(4);
        buf.cancel();
        assert!(matches!(buf.try_fill(&[1; 4]), Err(PlaybackError::Cancelled)));
        assert!(matches!(buf.wait_drained(), Err(PlaybackError::Cancelled)));
    }

    #[test]
    fn wait_drained_returns_when_idle() {
        let buf = sync(4);
        buf.wait_drained().unwrap();
    }
}
