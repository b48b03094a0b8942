//! WAV file source backed by `hound`.
//!
//! Integer WAVs are played as s16le: wider samples are truncated to their top
//! 16 bits and narrower ones (8-bit) are scaled up to full 16-bit range.
//! Float WAVs are played as f32le. The channel count and sample rate come
//! from the file header.

use std::{fs::File, io::BufReader, path::Path};

use tracing::info;

use super::PcmSource;
use crate::{
    audio::format::{PcmFormat, SampleFormat},
    error::{PlaybackError, Result},
};

pub struct WavPcmReader {
    reader: hound::WavReader<BufReader<File>>,
    format: PcmFormat,
    bits_per_sample: u16,
}

impl WavPcmReader {
    pub fn open(path: &Path) -> Result<Self> {
        let reader = hound::WavReader::open(path).map_err(|e| match e {
            hound::Error::IoError(source) => PlaybackError::SourceOpen {
                path: path.to_path_buf(),
                source,
            },
            other => PlaybackError::UnsupportedFormat(format!("{}: {other}", path.display())),
        })?;

        let spec = reader.spec();
        let sample_format = match spec.sample_format {
            hound::SampleFormat::Int => SampleFormat::S16Le,
            hound::SampleFormat::Float if spec.bits_per_sample == 32 => SampleFormat::F32Le,
            hound::SampleFormat::Float => {
                return Err(PlaybackError::UnsupportedFormat(format!(
                    "{}-bit float wav",
                    spec.bits_per_sample
                )))
            }
        };
        let format = PcmFormat::new(spec.sample_rate, spec.channels, sample_format);

        info!(
            path = %path.display(),
            %format,
            bits_per_sample = spec.bits_per_sample,
            duration_frames = reader.duration(),
            "opened wav source"
        );

        Ok(Self {
            reader,
            format,
            bits_per_sample: spec.bits_per_sample,
        })
    }
}

fn map_hound(e: hound::Error) -> PlaybackError {
    match e {
        hound::Error::IoError(io) => PlaybackError::Io(io),
        other => PlaybackError::UnsupportedFormat(other.to_string()),
    }
}

impl PcmSource for WavPcmReader {
    fn format(&self) -> PcmFormat {
        self.format
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        let width = self.format.sample_format.bytes_per_sample();
        let wanted = buf.len() / width;
        let mut written = 0;

        match self.format.sample_format {
            SampleFormat::F32Le => {
                for sample in self.reader.samples::<f32>().take(wanted) {
                    let s = sample.map_err(map_hound)?;
                    buf[written..written + 4].copy_from_slice(&s.to_le_bytes());
                    written += 4;
                }
            }
            SampleFormat::S16Le if self.bits_per_sample <= 16 => {
                let shift = u32::from(16 - self.bits_per_sample);
                for sample in self.reader.samples::<i16>().take(wanted) {
                    let s = sample.map_err(map_hound)? << shift;
                    buf[written..written + 2].copy_from_slice(&s.to_le_bytes());
                    written += 2;
                }
            }
            SampleFormat::S16Le => {
                let shift = u32::from(self.bits_per_sample - 16);
                for sample in self.reader.samples::<i32>().take(wanted) {
                    let s = (sample.map_err(map_hound)? >> shift) as i16;
                    buf[written..written + 2].copy_from_slice(&s.to_le_bytes());
                    written += 2;
                }
            }
        }

        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn temp_wav(name: &str, spec: hound::WavSpec, write: impl FnOnce(&mut hound::WavWriter<std::io::BufWriter<File>>)) -> PathBuf {
        let path = std::env::temp_dir().join(format!("pcmdeck-{}-{name}.wav", std::process::id()));
        let mut writer = hound::WavWriter::create(&path, spec).expect("create wav");
        write(&mut writer);
        writer.finalize().expect("finalize wav");
        path
    }

    #[test]
    fn reads_16bit_wav_as_s16le_bytes() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 48_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let samples: Vec<i16> = (0..64).map(|i| (i * 100 - 3000) as i16).collect();
        let path = temp_wav("s16", spec, |w| {
            for s in &samples {
                w.write_sample(*s).unwrap();
            }
        });

        let mut src = WavPcmReader::open(&path).unwrap();
        assert_eq!(src.format(), PcmFormat::new(48_000, 2, SampleFormat::S16Le));

        let mut out = Vec::new();
        let mut buf = [0u8; 48];
        loop {
            let n = src.read_chunk(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        let expected: Vec<u8> = samples.iter().flat_map(|s| s.to_le_bytes()).collect();
        assert_eq!(out, expected);
        let _ = std::fs::remove_file(path);
    }

    fn read_all_i16(src: &mut WavPcmReader) -> Vec<i16> {
        let mut out = Vec::new();
        let mut buf = [0u8; 6];
        loop {
            let n = src.read_chunk(&mut buf).unwrap();
            if n == 0 {
                break;
            }
            out.extend(buf[..n].chunks_exact(2).map(|b| i16::from_le_bytes([b[0], b[1]])));
        }
        out
    }

    #[test]
    fn scales_8bit_wav_up_to_full_s16_range() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8_000,
            bits_per_sample: 8,
            sample_format: hound::SampleFormat::Int,
        };
        let path = temp_wav("s8", spec, |w| {
            for s in [127i8, -128, 0, 1] {
                w.write_sample(s).unwrap();
            }
        });

        let mut src = WavPcmReader::open(&path).unwrap();
        assert_eq!(src.format(), PcmFormat::new(8_000, 1, SampleFormat::S16Le));
        assert_eq!(read_all_i16(&mut src), vec![32_512, -32_768, 0, 256]);
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn truncates_24bit_wav_to_top_16_bits() {
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 44_100,
            bits_per_sample: 24,
            sample_format: hound::SampleFormat::Int,
        };
        let path = temp_wav("s24", spec, |w| {
            for s in [8_388_607i32, -8_388_608, 256, -256, 0x12_34_56, 0] {
                w.write_sample(s).unwrap();
            }
        });

        let mut src = WavPcmReader::open(&path).unwrap();
        assert_eq!(src.format(), PcmFormat::new(44_100, 2, SampleFormat::S16Le));
        assert_eq!(
            read_all_i16(&mut src),
            vec![32_767, -32_768, 1, -1, 0x12_34, 0]
        );
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn reads_float_wav_as_f32le() {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 16_000,
            bits_per_sample: 32,
            sample_format: hound::SampleFormat::Float,
        };
        let path = temp_wav("f32", spec, |w| {
            w.write_sample(0.5f32).unwrap();
            w.write_sample(-0.25f32).unwrap();
        });

        let mut src = WavPcmReader::open(&path).unwrap();
        assert_eq!(src.format().sample_format, SampleFormat::F32Le);
        let mut buf = [0u8; 16];
        assert_eq!(src.read_chunk(&mut buf).unwrap(), 8);
        assert_eq!(&buf[..4], &0.5f32.to_le_bytes());
        let _ = std::fs::remove_file(path);
    }

    #[test]
    fn garbage_file_is_unsupported() {
        let path = std::env::temp_dir().join(format!("pcmdeck-{}-bad.wav", std::process::id()));
        std::fs::write(&path, b"definitely not a riff header").unwrap();
        assert!(matches!(
            WavPcmReader::open(&path),
            Err(PlaybackError::UnsupportedFormat(_))
        ));
        let _ = std::fs::remove_file(path);
    }
}
