//! PCM stream format descriptors.

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::PlaybackError;

/// Encoding of a single interleaved sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleFormat {
    /// Signed 16-bit little endian.
    S16Le,
    /// IEEE-754 32-bit float little endian, nominal range [-1.0, 1.0].
    F32Le,
}

impl SampleFormat {
    pub fn bytes_per_sample(self) -> usize {
        match self {
            SampleFormat::S16Le => 2,
            SampleFormat::F32Le => 4,
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SampleFormat::S16Le => "s16le",
            SampleFormat::F32Le => "f32le",
        })
    }
}

impl FromStr for SampleFormat {
    type Err = PlaybackError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "s16" | "s16le" | "i16" => Ok(SampleFormat::S16Le),
            "f32" | "f32le" | "float" => Ok(SampleFormat::F32Le),
            other => Err(PlaybackError::UnsupportedFormat(other.to_string())),
        }
    }
}

/// Fixed layout of an interleaved PCM stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PcmFormat {
    pub sample_rate: u32,
    pub channels: u16,
    pub sample_format: SampleFormat,
}

impl PcmFormat {
    pub fn new(sample_rate: u32, channels: u16, sample_format: SampleFormat) -> Self {
        Self {
            sample_rate,
            channels,
            sample_format,
        }
    }

    /// Bytes in one frame (one sample for every channel).
    pub fn frame_bytes(&self) -> usize {
        self.sample_format.bytes_per_sample() * usize::from(self.channels)
    }

    pub fn bytes_per_second(&self) -> usize {
        self.frame_bytes() * self.sample_rate as usize
    }

    /// Playback duration of `bytes` bytes of this format, in seconds.
    pub fn duration_secs(&self, bytes: usize) -> f64 {
        let bps = self.bytes_per_second();
        if bps == 0 {
            return 0.0;
        }
        bytes as f64 / bps as f64
    }

    /// Round `bytes` down to a whole number of frames.
    pub fn align_to_frame(&self, bytes: usize) -> usize {
        let frame = self.frame_bytes();
        if frame == 0 {
            return bytes;
        }
        bytes - bytes % frame
    }
}

impl Default for PcmFormat {
    /// 48 kHz stereo s16le, the layout produced by
    /// `ffmpeg -i in.mp4 -ar 48000 -ac 2 -f s16le out.pcm`.
    fn default() -> Self {
        Self::new(48_000, 2, SampleFormat::S16Le)
    }
}

impl fmt::Display for PcmFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} Hz / {} ch / {}",
            self.sample_rate, self.channels, self.sample_format
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn default_is_48k_stereo_s16() {
        let fmt = PcmFormat::default();
        assert_eq!(fmt.frame_bytes(), 4);
        assert_eq!(fmt.bytes_per_second(), 192_000);
        // 10 ms of audio
        assert_eq!(fmt.bytes_per_second() / 100, 1920);
    }

    #[test]
    fn duration_of_one_second() {
        let fmt = PcmFormat::new(44_100, 1, SampleFormat::F32Le);
        assert_relative_eq!(fmt.duration_secs(44_100 * 4), 1.0);
    }

    #[test]
    fn align_drops_partial_frame() {
        let fmt = PcmFormat::default();
        assert_eq!(fmt.align_to_frame(3841), 3840);
        assert_eq!(fmt.align_to_frame(3), 0);
    }

    #[test]
    fn parses_sample_format_names() {
        assert_eq!("S16LE".parse::<SampleFormat>().unwrap(), SampleFormat::S16Le);
        assert_eq!("float".parse::<SampleFormat>().unwrap(), SampleFormat::F32Le);
        assert!("u8".parse::<SampleFormat>().is_err());
    }
}
