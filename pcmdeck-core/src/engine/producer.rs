//! Blocking reader loop (the producer side of the double buffer).
//!
//! ## Per iteration
//!
//! ```text
//! 1. Read up to one chunk from the source
//! 2. Zero bytes → end of input, leave the loop
//! 3. Drop a trailing partial frame (only possible on the last read)
//! 4. try_fill → blocks until the callback frees a chunk
//! 5. Cancelled → leave the loop
//! ```
//!
//! Runs on the thread that called `Player::play_*`.

use std::sync::{
    atomic::{AtomicU64, AtomicUsize, Ordering},
    Arc,
};
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::{
    buffering::DoubleBuffer,
    error::{PlaybackError, Result},
    source::PcmSource,
};

/// Counters shared by the reader loop and the output callback.
pub struct PlaybackDiagnostics {
    pub chunks_filled: AtomicUsize,
    pub bytes_read: AtomicU64,
    pub bytes_delivered: AtomicU64,
    pub callbacks: AtomicUsize,
    pub underruns: AtomicUsize,
    pub contended_drains: AtomicUsize,
    pub partial_frame_bytes_dropped: AtomicUsize,
}

impl Default for PlaybackDiagnostics {
    fn default() -> Self {
        Self {
            chunks_filled: AtomicUsize::new(0),
            bytes_read: AtomicU64::new(0),
            bytes_delivered: AtomicU64::new(0),
            callbacks: AtomicUsize::new(0),
            underruns: AtomicUsize::new(0),
            contended_drains: AtomicUsize::new(0),
            partial_frame_bytes_dropped: AtomicUsize::new(0),
        }
    }
}

impl PlaybackDiagnostics {
    pub fn reset(&self) {
        self.chunks_filled.store(0, Ordering::Relaxed);
        self.bytes_read.store(0, Ordering::Relaxed);
        self.bytes_delivered.store(0, Ordering::Relaxed);
        self.callbacks.store(0, Ordering::Relaxed);
        self.underruns.store(0, Ordering::Relaxed);
        self.contended_drains.store(0, Ordering::Relaxed);
        self.partial_frame_bytes_dropped.store(0, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> DiagnosticsSnapshot {
        DiagnosticsSnapshot {
            chunks_filled: self.chunks_filled.load(Ordering::Relaxed),
            bytes_read: self.bytes_read.load(Ordering::Relaxed),
            bytes_delivered: self.bytes_delivered.load(Ordering::Relaxed),
            callbacks: self.callbacks.load(Ordering::Relaxed),
            underruns: self.underruns.load(Ordering::Relaxed),
            contended_drains: self.contended_drains.load(Ordering::Relaxed),
            partial_frame_bytes_dropped: self.partial_frame_bytes_dropped.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticsSnapshot {
    pub chunks_filled: usize,
    pub bytes_read: u64,
    pub bytes_delivered: u64,
    pub callbacks: usize,
    pub underruns: usize,
    pub contended_drains: usize,
    pub partial_frame_bytes_dropped: usize,
}

/// Why the reader loop returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerExit {
    /// The source reported end of stream; every chunk read has been published.
    EndOfInput,
    /// The double buffer was cancelled.
    Cancelled,
}

/// Everything the reader loop needs.
pub struct ProducerContext {
    pub source: Box<dyn PcmSource>,
    pub sync: Arc<DoubleBuffer>,
    pub diagnostics: Arc<PlaybackDiagnostics>,
}

/// Run the reader loop until end of input or cancellation.
///
/// # Errors
/// Propagates source read failures. Cancellation is not an error.
pub fn run(mut ctx: ProducerContext) -> Result<ProducerExit> {
    let format = ctx.source.format();
    let mut read_buf = vec![0u8; ctx.sync.capacity()];
    let mut total_bytes_read: u64 = 0;
    let started = Instant::now();

    info!(chunk_bytes = read_buf.len(), %format, "reader started");

    loop {
        if ctx.sync.is_cancelled() {
            info!(total_bytes_read, "reader cancelled");
            return Ok(ProducerExit::Cancelled);
        }

        let bytes_read = ctx.source.read_chunk(&mut read_buf)?;
        if bytes_read == 0 {
            info!(
                total_bytes_read,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "end of pcm input"
            );
            return Ok(ProducerExit::EndOfInput);
        }

        total_bytes_read += bytes_read as u64;
        ctx.diagnostics
            .bytes_read
            .fetch_add(bytes_read as u64, Ordering::Relaxed);

        let aligned = format.align_to_frame(bytes_read);
        if aligned < bytes_read {
            let dropped = bytes_read - aligned;
            warn!(dropped, "dropping trailing partial frame");
            ctx.diagnostics
                .partial_frame_bytes_dropped
                .fetch_add(dropped, Ordering::Relaxed);
        }
        if aligned == 0 {
            continue;
        }

        match ctx.sync.try_fill(&read_buf[..aligned]) {
            Ok(accepted) => {
                ctx.diagnostics.chunks_filled.fetch_add(1, Ordering::Relaxed);
                debug!(accepted, total_bytes_read, "chunk published");
            }
            Err(PlaybackError::Cancelled) => {
                info!(total_bytes_read, "reader cancelled while waiting for a free chunk");
                return Ok(ProducerExit::Cancelled);
            }
            Err(e) => return Err(e),
        }
    }
}
