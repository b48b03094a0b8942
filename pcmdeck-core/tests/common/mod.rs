//! Shared helpers: a thread that plays the role of the audio callback.

#![allow(dead_code)]

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use parking_lot::Mutex;
use pcmdeck_core::audio::{fill_output, OutputSink};
use pcmdeck_core::buffering::DoubleBuffer;
use pcmdeck_core::engine::producer::PlaybackDiagnostics;
use pcmdeck_core::error::Result;

/// Calls `fill_output` with `request` bytes every `period` while resumed,
/// and records every byte that carried audio.
pub struct SimulatedCallback {
    playing: Arc<AtomicBool>,
    shutdown: Arc<AtomicBool>,
    delivered: Arc<Mutex<Vec<u8>>>,
    handle: Option<JoinHandle<()>>,
}

impl SimulatedCallback {
    pub fn start(
        sync: Arc<DoubleBuffer>,
        diagnostics: Arc<PlaybackDiagnostics>,
        request: usize,
        period: Duration,
        delivered: Arc<Mutex<Vec<u8>>>,
    ) -> Self {
        let playing = Arc::new(AtomicBool::new(false));
        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = {
            let playing = Arc::clone(&playing);
            let shutdown = Arc::clone(&shutdown);
            let delivered = Arc::clone(&delivered);
            thread::spawn(move || {
                let mut out = vec![0u8; request];
                while !shutdown.load(Ordering::Acquire) {
                    if playing.load(Ordering::Acquire) {
                        let served = fill_output(&sync, &diagnostics, &mut out);
                        delivered.lock().extend_from_slice(&out[..served]);
                    }
                    thread::sleep(period);
                }
            })
        };

        Self {
            playing,
            shutdown,
            delivered,
            handle: Some(handle),
        }
    }

    pub fn delivered(&self) -> Arc<Mutex<Vec<u8>>> {
        Arc::clone(&self.delivered)
    }
}

impl OutputSink for SimulatedCallback {
    fn resume(&self) -> Result<()> {
        self.playing.store(true, Ordering::Release);
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        self.playing.store(false, Ordering::Release);
        Ok(())
    }
}

impl Drop for SimulatedCallback {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// `chunks` chunks of `chunk_len` bytes; chunk `i` holds a ramp starting at `i * 7`.
pub fn patterned_stream(chunks: usize, chunk_len: usize) -> Vec<u8> {
    (0..chunks)
        .flat_map(|i| (0..chunk_len).map(move |j| ((i * 7 + j) % 251) as u8))
        .collect()
}
