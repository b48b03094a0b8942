//! PCM sources feeding the producer loop.
//!
//! A source hands out interleaved little-endian PCM bytes in caller-sized
//! chunks. A read of zero bytes is the end-of-stream signal; a short read
//! only happens on the last chunk.

pub mod wav;

use std::{
    fs::File,
    io::{self, BufReader, ErrorKind, Read},
    path::Path,
};

use tracing::info;

use crate::{
    audio::format::PcmFormat,
    error::{PlaybackError, Result},
};

pub use wav::WavPcmReader;

/// Anything the producer loop can pull PCM bytes from.
pub trait PcmSource: Send {
    /// Layout of the bytes returned by [`read_chunk`](Self::read_chunk).
    fn format(&self) -> PcmFormat;

    /// Fill `buf` as far as possible. Returns 0 at end of stream.
    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize>;
}

/// Raw interleaved PCM with a layout fixed by the caller.
pub struct RawPcmReader<R> {
    inner: R,
    format: PcmFormat,
}

impl RawPcmReader<BufReader<File>> {
    /// Open a headerless PCM file, e.g. the output of
    /// `ffmpeg -i in.mp4 -ar 48000 -ac 2 -f s16le out.pcm`.
    pub fn open(path: &Path, format: PcmFormat) -> Result<Self> {
        let file = File::open(path).map_err(|source| PlaybackError::SourceOpen {
            path: path.to_path_buf(),
            source,
        })?;
        info!(path = %path.display(), %format, "opened raw pcm source");
        Ok(Self::new(BufReader::new(file), format))
    }
}

impl<R: Read> RawPcmReader<R> {
    pub fn new(inner: R, format: PcmFormat) -> Self {
        Self { inner, format }
    }
}

impl<R: Read + Send> PcmSource for RawPcmReader<R> {
    fn format(&self) -> PcmFormat {
        self.format
    }

    fn read_chunk(&mut self, buf: &mut [u8]) -> Result<usize> {
        Ok(read_full(&mut self.inner, buf)?)
    }
}

/// Read until `buf` is full or the reader reports end of file.
pub(crate) fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Open `path` as WAV when it has a `.wav` extension, otherwise as raw PCM
/// in `raw_format`.
pub fn open_source(path: &Path, raw_format: PcmFormat) -> Result<Box<dyn PcmSource>> {
    let is_wav = path
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.eq_ignore_ascii_case("wav"))
        .unwrap_or(false);

    if is_wav {
        Ok(Box::new(WavPcmReader::open(path)?))
    } else {
        Ok(Box::new(RawPcmReader::open(path, raw_format)?))
    }
}
