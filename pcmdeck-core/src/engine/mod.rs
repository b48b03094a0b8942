//! `Player`: top-level playback lifecycle controller.
//!
//! ## Lifecycle
//!
//! ```text
//! Player::new()
//!     └─► play_file() / play_source()   (blocks the calling thread)
//!           ├─ allocate both chunks
//!           ├─ open output (fatal on failure), resume   status = Playing
//!           ├─ reader loop until EOF or cancel
//!           ├─ wait for both chunks to drain            status = Draining
//!           └─ close output, then free chunks           status = Finished | Stopped
//!     stop()  (any thread)  → cancel the hand-off, wake the reader
//! ```
//!
//! ## Threading
//!
//! `cpal::Stream` is `!Send` on Windows/macOS, so the output is opened and
//! dropped on the thread running `play_*`. `stop()` only touches the shared
//! double buffer and can be called from anywhere.

pub mod producer;

use std::path::Path;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{info, warn};

use crate::{
    audio::{format::PcmFormat, AudioOutput, OutputSink},
    buffering::{DoubleBuffer, DEFAULT_CHUNK_BYTES},
    error::{PlaybackError, Result},
    events::{PlaybackStatus, PlaybackStatusEvent},
    source::{open_source, PcmSource},
};

use self::producer::{DiagnosticsSnapshot, PlaybackDiagnostics, ProducerContext, ProducerExit};

/// Broadcast channel capacity for status events.
const BROADCAST_CAP: usize = 64;

/// Configuration for `Player`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[serde(default)]
pub struct PlayerConfig {
    /// Layout of raw (headerless) input and of the output stream.
    /// WAV inputs override it with their header. Default: 48 kHz / 2 ch / s16le.
    pub format: PcmFormat,
    /// Linear volume in [0, 1]. Default: 1.0.
    pub volume: f32,
    /// Capacity of each of the two chunks, in bytes.
    /// Default: 3840 (20 ms at the default format).
    pub chunk_bytes: usize,
    /// Output device name. `None` uses the system default.
    pub preferred_output_device: Option<String>,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            format: PcmFormat::default(),
            volume: 1.0,
            chunk_bytes: DEFAULT_CHUNK_BYTES,
            preferred_output_device: None,
        }
    }
}

impl PlayerConfig {
    /// # Errors
    /// `PlaybackError::InvalidConfig` describing the first bad field.
    pub fn validate(&self) -> Result<()> {
        if self.format.sample_rate == 0 {
            return Err(PlaybackError::InvalidConfig("sample rate must be > 0".into()));
        }
        if self.format.channels == 0 {
            return Err(PlaybackError::InvalidConfig("channel count must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.volume) {
            return Err(PlaybackError::InvalidConfig(format!(
                "volume {} outside 0.0..=1.0",
                self.volume
            )));
        }
        if self.chunk_bytes == 0 {
            return Err(PlaybackError::InvalidConfig("chunk size must be > 0".into()));
        }
        if self.chunk_bytes % self.format.frame_bytes() != 0 {
            return Err(PlaybackError::InvalidConfig(format!(
                "chunk size {} is not a multiple of the {}-byte frame",
                self.chunk_bytes,
                self.format.frame_bytes()
            )));
        }
        Ok(())
    }

    /// Chunk capacity for a stream of `format`: the configured size rounded
    /// down to whole frames, but never less than one frame.
    pub fn chunk_bytes_for(&self, format: &PcmFormat) -> usize {
        format
            .align_to_frame(self.chunk_bytes)
            .max(format.frame_bytes())
    }
}

/// Summary of one finished `play_*` call.
#[derive(Debug, Clone, Copy)]
pub struct PlaybackReport {
    pub status: PlaybackStatus,
    pub format: PcmFormat,
    /// Seconds of audio read from the source.
    pub duration_secs: f64,
    pub diagnostics: DiagnosticsSnapshot,
}

/// The top-level player handle.
///
/// `Player` is `Send + Sync`; all fields use interior mutability. Wrap it in
/// `Arc<Player>` to call `stop()` from another thread while `play_*` runs.
pub struct Player {
    config: PlayerConfig,
    /// `true` while a `play_*` call is in progress.
    running: AtomicBool,
    /// Set by `stop()`; covers a stop that lands before the hand-off exists.
    stop_requested: AtomicBool,
    /// Hand-off of the current playback, kept so `stop()` can cancel it.
    current: Mutex<Option<Arc<DoubleBuffer>>>,
    status: Mutex<PlaybackStatus>,
    status_tx: broadcast::Sender<PlaybackStatusEvent>,
    diagnostics: Arc<PlaybackDiagnostics>,
}

impl Player {
    /// # Errors
    /// `PlaybackError::InvalidConfig` if `config` fails validation.
    pub fn new(config: PlayerConfig) -> Result<Self> {
        config.validate()?;
        let (status_tx, _) = broadcast::channel(BROADCAST_CAP);
        Ok(Self {
            config,
            running: AtomicBool::new(false),
            stop_requested: AtomicBool::new(false),
            current: Mutex::new(None),
            status: Mutex::new(PlaybackStatus::Idle),
            status_tx,
            diagnostics: Arc::new(PlaybackDiagnostics::default()),
        })
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    /// Play a raw PCM or WAV file on the configured output device.
    ///
    /// Blocks until the file has been played, playback is stopped, or a
    /// fatal error occurs.
    pub fn play_file(&self, path: &Path) -> Result<PlaybackReport> {
        if self.running.load(Ordering::SeqCst) {
            return Err(PlaybackError::AlreadyRunning);
        }
        let source = match open_source(path, self.config.format) {
            Ok(s) => s,
            Err(e) => {
                self.set_status(PlaybackStatus::Error, Some(e.to_string()));
                return Err(e);
            }
        };
        let device = self.config.preferred_output_device.clone();
        self.play_source(source, move |sync, diagnostics, format| {
            let output = AudioOutput::open(sync, diagnostics, format, device.as_deref())?;
            info!(device = %output.device_name, "output stream open");
            Ok(output)
        })
    }

    /// Play `source` through the sink built by `open_output`.
    ///
    /// `open_output` receives the shared double buffer and must arrange for
    /// [`fill_output`](crate::audio::fill_output) to be called on it
    /// periodically once the sink is resumed.
    ///
    /// # Errors
    /// - `PlaybackError::AlreadyRunning` if another playback is in progress.
    /// - Whatever `open_output` or the source returns; both are fatal.
    pub fn play_source<S, F>(&self, source: Box<dyn PcmSource>, open_output: F) -> Result<PlaybackReport>
    where
        S: OutputSink,
        F: FnOnce(Arc<DoubleBuffer>, Arc<PlaybackDiagnostics>, PcmFormat) -> Result<S>,
    {
        {
            // `current` serialises start/stop/finish against `stop()`.
            let _current = self.current.lock();
            if self.running.load(Ordering::SeqCst) {
                return Err(PlaybackError::AlreadyRunning);
            }
            self.running.store(true, Ordering::SeqCst);
            self.stop_requested.store(false, Ordering::SeqCst);
        }

        self.diagnostics.reset();
        let result = self.run_playback(source, open_output);

        {
            let mut current = self.current.lock();
            *current = None;
            self.stop_requested.store(false, Ordering::SeqCst);
            self.running.store(false, Ordering::SeqCst);
        }

        match &result {
            Ok(report) => self.set_status(report.status, None),
            Err(e) => self.set_status(PlaybackStatus::Error, Some(e.to_string())),
        }
        result
    }

    fn run_playback<S, F>(&self, source: Box<dyn PcmSource>, open_output: F) -> Result<PlaybackReport>
    where
        S: OutputSink,
        F: FnOnce(Arc<DoubleBuffer>, Arc<PlaybackDiagnostics>, PcmFormat) -> Result<S>,
    {
        let format = source.format();
        if format.frame_bytes() == 0 || format.sample_rate == 0 {
            return Err(PlaybackError::UnsupportedFormat(format.to_string()));
        }
        let chunk_bytes = self.config.chunk_bytes_for(&format);

        let sync = Arc::new(DoubleBuffer::new(
            chunk_bytes,
            format.sample_format,
            self.config.volume,
        ));
        {
            let mut current = self.current.lock();
            if self.stop_requested.load(Ordering::SeqCst) {
                sync.cancel();
            }
            *current = Some(Arc::clone(&sync));
        }

        let output = open_output(Arc::clone(&sync), Arc::clone(&self.diagnostics), format)?;
        output.resume()?;
        self.set_status(PlaybackStatus::Playing, Some(format.to_string()));
        info!(%format, chunk_bytes, volume = self.config.volume, "playback started");

        let exit = producer::run(ProducerContext {
            source,
            sync: Arc::clone(&sync),
            diagnostics: Arc::clone(&self.diagnostics),
        });

        let status = match exit {
            Ok(ProducerExit::EndOfInput) => {
                self.set_status(PlaybackStatus::Draining, None);
                match sync.wait_drained() {
                    Ok(()) => PlaybackStatus::Finished,
                    Err(PlaybackError::Cancelled) => PlaybackStatus::Stopped,
                    Err(e) => return Err(e),
                }
            }
            Ok(ProducerExit::Cancelled) => PlaybackStatus::Stopped,
            Err(e) => {
                sync.cancel();
                if let Err(pause_err) = output.pause() {
                    warn!("failed to pause output after error: {pause_err}");
                }
                return Err(e);
            }
        };

        if let Err(e) = output.pause() {
            warn!("failed to pause output: {e}");
        }
        // The callback owns a clone of `sync`; closing the stream first means
        // the chunks outlive every drain.
        drop(output);

        let diagnostics = self.diagnostics.snapshot();
        let report = PlaybackReport {
            status,
            format,
            duration_secs: format.duration_secs(diagnostics.bytes_read as usize),
            diagnostics,
        };
        info!(
            ?status,
            duration_secs = report.duration_secs,
            underruns = diagnostics.underruns,
            "playback ended"
        );
        Ok(report)
    }

    /// Cancel the playback in progress.
    ///
    /// # Errors
    /// - `PlaybackError::NotRunning` if nothing is playing.
    pub fn stop(&self) -> Result<()> {
        let current = self.current.lock();
        if !self.running.load(Ordering::SeqCst) {
            return Err(PlaybackError::NotRunning);
        }
        self.stop_requested.store(true, Ordering::SeqCst);
        if let Some(sync) = current.as_ref() {
            sync.cancel();
        }
        info!("playback stop requested");
        Ok(())
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Change the volume of the playback in progress.
    pub fn set_volume(&self, volume: f32) {
        if let Some(sync) = self.current.lock().as_ref() {
            sync.set_volume(volume);
        }
    }

    /// Current player status (snapshot).
    pub fn status(&self) -> PlaybackStatus {
        *self.status.lock()
    }

    /// Subscribe to live status change events.
    pub fn subscribe_status(&self) -> broadcast::Receiver<PlaybackStatusEvent> {
        self.status_tx.subscribe()
    }

    /// Snapshot of playback counters for observability.
    pub fn diagnostics_snapshot(&self) -> DiagnosticsSnapshot {
        self.diagnostics.snapshot()
    }

    // ── Internal helpers ─────────────────────────────────────────────────────

    fn set_status(&self, new_status: PlaybackStatus, detail: Option<String>) {
        *self.status.lock() = new_status;
        let _ = self.status_tx.send(PlaybackStatusEvent {
            status: new_status,
            detail,
        });
    }
}
