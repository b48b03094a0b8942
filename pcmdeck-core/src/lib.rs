//! # pcmdeck-core
//!
//! Double-buffered PCM playback engine.
//!
//! ## Architecture
//!
//! ```text
//! PcmSource ─► producer::run (caller thread) ─► DoubleBuffer ◄─ fill_output (audio thread)
//!                       │                        [chunk 0]            │
//!                 try_fill blocks                [chunk 1]       drain never blocks,
//!                 until a chunk is free                          silence on underrun
//! ```
//!
//! The audio callback never waits on the reader. All file I/O and every
//! blocking wait happen on the thread that called `Player::play_*`.

#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod audio;
pub mod buffering;
pub mod engine;
pub mod error;
pub mod events;
pub mod source;

// Convenience re-exports for downstream crates
pub use audio::format::{PcmFormat, SampleFormat};
pub use buffering::DoubleBuffer;
pub use engine::{PlaybackReport, Player, PlayerConfig};
pub use error::PlaybackError;
pub use events::{PlaybackStatus, PlaybackStatusEvent};
pub use source::{open_source, PcmSource, RawPcmReader, WavPcmReader};
