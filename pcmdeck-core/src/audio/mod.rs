//! Audio output via cpal backend.
//!
//! # Design constraints
//!
//! The cpal output callback runs on an OS audio thread at elevated priority.
//! It **must not**:
//! - Allocate heap memory
//! - Block on a mutex or condvar held by the reader
//! - Perform I/O or logging
//!
//! The callback body is [`fill_output`], which only calls the non-blocking
//! [`DoubleBuffer::drain_outcome`] and bumps atomic counters. The byte scratch
//! used to convert to device samples is sized when the stream is built; a
//! period larger than the scratch is served in slices.
//!
//! # Threading note
//!
//! `cpal::Stream` is `!Send` on most platforms (COM on Windows, CoreAudio on macOS).
//! `AudioOutput` therefore must be created and dropped on the same thread.
//! The player does both on the thread that runs the reader loop.

pub mod device;
pub mod format;
pub mod mix;

use std::sync::{atomic::Ordering, Arc};

#[cfg(feature = "audio-cpal")]
use cpal::{
    traits::{DeviceTrait, StreamTrait},
    SampleRate, Stream, StreamConfig,
};
#[cfg(feature = "audio-cpal")]
use tracing::{error, info, warn};

use crate::{
    buffering::{DoubleBuffer, DrainOutcome},
    engine::producer::PlaybackDiagnostics,
    error::Result,
};
#[cfg(not(feature = "audio-cpal"))]
use crate::error::PlaybackError;

use self::format::PcmFormat;
#[cfg(feature = "audio-cpal")]
use self::format::SampleFormat;

/// Something that plays whatever the consumer callback produces.
///
/// Implemented by [`AudioOutput`] for real devices; tests drive the
/// callback from a plain thread instead.
pub trait OutputSink {
    /// Start (or continue) invoking the consumer callback.
    fn resume(&self) -> Result<()>;

    /// Stop invoking the consumer callback until the next `resume`.
    fn pause(&self) -> Result<()>;
}

/// Consumer callback body: fill `out` from the double buffer.
///
/// Drains repeatedly so a request that straddles two chunks is served from
/// both. Whatever cannot be served stays zero (silence). Returns the number
/// of bytes that carry audio.
pub fn fill_output(sync: &DoubleBuffer, diagnostics: &PlaybackDiagnostics, out: &mut [u8]) -> usize {
    diagnostics.callbacks.fetch_add(1, Ordering::Relaxed);
    serve(sync, diagnostics, out, true)
}

/// Drain into `out` until it is full or nothing more is ready.
/// `count_underrun` is false when earlier audio in the same callback was served.
fn serve(
    sync: &DoubleBuffer,
    diagnostics: &PlaybackDiagnostics,
    out: &mut [u8],
    count_underrun: bool,
) -> usize {
    let mut served = 0;
    while served < out.len() {
        match sync.drain_outcome(&mut out[served..]) {
            DrainOutcome::Copied(0) => break,
            DrainOutcome::Copied(n) => served += n,
            DrainOutcome::Underrun => {
                if served == 0 && count_underrun {
                    diagnostics.underruns.fetch_add(1, Ordering::Relaxed);
                }
                break;
            }
            DrainOutcome::Contended => {
                diagnostics.contended_drains.fetch_add(1, Ordering::Relaxed);
                break;
            }
        }
    }

    diagnostics
        .bytes_delivered
        .fetch_add(served as u64, Ordering::Relaxed);
    served
}

/// Frames of byte scratch reserved per stream before it starts.
#[cfg_attr(not(feature = "audio-cpal"), allow(dead_code))]
const SCRATCH_FRAMES: usize = 4096;

/// Fill device samples `data` via the preallocated byte `scratch`.
///
/// Counts as a single callback however many slices it takes. Once a slice
/// comes back short the rest of `data` is silence. `scratch.len()` must be a
/// non-zero multiple of `size_of::<T>()`.
#[cfg_attr(not(feature = "audio-cpal"), allow(dead_code))]
fn fill_samples<T: Default>(
    sync: &DoubleBuffer,
    diagnostics: &PlaybackDiagnostics,
    scratch: &mut [u8],
    data: &mut [T],
    decode: impl Fn(&[u8]) -> T,
) {
    diagnostics.callbacks.fetch_add(1, Ordering::Relaxed);

    let width = std::mem::size_of::<T>();
    let per_slice = (scratch.len() / width).max(1);
    let mut total = 0;
    let mut exhausted = false;

    for piece in data.chunks_mut(per_slice) {
        if exhausted {
            piece.iter_mut().for_each(|s| *s = T::default());
            continue;
        }
        let bytes = &mut scratch[..piece.len() * width];
        let n = serve(sync, diagnostics, bytes, total == 0);
        total += n;
        exhausted = n < bytes.len();
        for (sample, raw) in piece.iter_mut().zip(bytes.chunks_exact(width)) {
            *sample = decode(raw);
        }
    }
}

#[cfg(feature = "audio-cpal")]
fn map_build_error(e: cpal::BuildStreamError) -> crate::error::PlaybackError {
    use crate::error::PlaybackError;
    match e {
        cpal::BuildStreamError::DeviceNotAvailable => PlaybackError::AudioDevice(e.to_string()),
        other => PlaybackError::AudioStream(other.to_string()),
    }
}

/// Handle to an open output stream.
///
/// **Not `Send`**: `cpal::Stream` is bound to its creation thread on Windows/macOS.
/// Create and drop this type on the same OS thread.
pub struct AudioOutput {
    /// Kept alive so the stream is not dropped prematurely.
    #[cfg(feature = "audio-cpal")]
    stream: Stream,
    /// Name of the device the stream was opened on.
    pub device_name: String,
    pub format: PcmFormat,
}

impl AudioOutput {
    /// Open an output stream with exactly `format`, on the device named
    /// `preferred_device_name` if present, else the default output device.
    ///
    /// The stream starts paused; call [`OutputSink::resume`] to begin playback.
    ///
    /// # Errors
    /// `PlaybackError::NoDefaultOutputDevice` when there is no output device,
    /// `PlaybackError::AudioDevice` when the chosen device is unusable,
    /// `PlaybackError::AudioStream` when the device rejects the format.
    #[cfg(feature = "audio-cpal")]
    pub fn open(
        sync: Arc<DoubleBuffer>,
        diagnostics: Arc<PlaybackDiagnostics>,
        format: PcmFormat,
        preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        use crate::error::PlaybackError;
        use cpal::traits::HostTrait;

        let host = cpal::default_host();
        let mut selected_device = None;

        if let Some(preferred_name) = preferred_device_name {
            match host.output_devices() {
                Ok(mut devices) => {
                    selected_device = devices.find(|device| {
                        device
                            .name()
                            .map(|name| name == preferred_name)
                            .unwrap_or(false)
                    });

                    if selected_device.is_none() {
                        warn!(
                            "preferred output device '{}' not found, falling back",
                            preferred_name
                        );
                    }
                }
                Err(e) => {
                    warn!("failed to list output devices while resolving preference: {e}");
                }
            }
        }

        let device = match selected_device {
            Some(device) => device,
            None => host
                .default_output_device()
                .ok_or(PlaybackError::NoDefaultOutputDevice)?,
        };
        let device_name = device
            .name()
            .map_err(|e| PlaybackError::AudioDevice(format!("device unavailable: {e}")))?;

        info!(device = device_name.as_str(), %format, "opening output device");

        let config = StreamConfig {
            channels: format.channels,
            sample_rate: SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let mut scratch = vec![0u8; format.frame_bytes() * SCRATCH_FRAMES];

        let stream = match format.sample_format {
            SampleFormat::S16Le => {
                device.build_output_stream(
                    &config,
                    move |data: &mut [i16], _info: &cpal::OutputCallbackInfo| {
                        fill_samples(&sync, &diagnostics, &mut scratch, data, |b| {
                            i16::from_le_bytes([b[0], b[1]])
                        });
                    },
                    |err| error!("audio stream error: {err}"),
                    None,
                )
            }
            SampleFormat::F32Le => {
                device.build_output_stream(
                    &config,
                    move |data: &mut [f32], _info: &cpal::OutputCallbackInfo| {
                        fill_samples(&sync, &diagnostics, &mut scratch, data, |b| {
                            f32::from_le_bytes([b[0], b[1], b[2], b[3]])
                        });
                    },
                    |err| error!("audio stream error: {err}"),
                    None,
                )
            }
        }
        .map_err(map_build_error)?;

        // cpal may start streams eagerly; hold off until the caller resumes.
        if let Err(e) = stream.pause() {
            warn!("could not pause freshly opened stream: {e}");
        }

        Ok(Self {
            stream,
            device_name,
            format,
        })
    }

    /// Stub when the `audio-cpal` feature is disabled.
    #[cfg(not(feature = "audio-cpal"))]
    pub fn open(
        _sync: Arc<DoubleBuffer>,
        _diagnostics: Arc<PlaybackDiagnostics>,
        _format: PcmFormat,
        _preferred_device_name: Option<&str>,
    ) -> Result<Self> {
        Err(PlaybackError::AudioStream(
            "compiled without audio-cpal feature".into(),
        ))
    }
}

#[cfg(feature = "audio-cpal")]
impl OutputSink for AudioOutput {
    fn resume(&self) -> Result<()> {
        self.stream
            .play()
            .map_err(|e| crate::error::PlaybackError::AudioStream(e.to_string()))
    }

    fn pause(&self) -> Result<()> {
        self.stream
            .pause()
            .map_err(|e| crate::error::PlaybackError::AudioStream(e.to_string()))
    }
}

#[cfg(not(feature = "audio-cpal"))]
impl OutputSink for AudioOutput {
    fn resume(&self) -> Result<()> {
        Ok(())
    }

    fn pause(&self) -> Result<()> {
        Ok(())
    }
}
