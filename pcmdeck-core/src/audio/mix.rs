//! Volume-scaled mixing of PCM bytes into an output buffer.
//!
//! Behaves like `SDL_MixAudio`: every source sample is scaled by a linear
//! volume factor and added to the destination sample, saturating at the
//! format's limits. Mixing into a zeroed destination at volume 1.0 is a
//! bit-exact copy.

use super::format::SampleFormat;

/// Mix `src` into `dst` at `volume` (clamped to `0.0..=1.0`).
///
/// Only `min(dst.len(), src.len())` bytes are touched; a trailing partial
/// sample is left as is.
pub fn mix_audio(dst: &mut [u8], src: &[u8], format: SampleFormat, volume: f32) {
    let volume = if volume.is_nan() {
        0.0
    } else {
        volume.clamp(0.0, 1.0)
    };
    let n = dst.len().min(src.len());
    if n == 0 || volume == 0.0 {
        return;
    }

    match format {
        SampleFormat::S16Le => {
            for (d, s) in dst[..n].chunks_exact_mut(2).zip(src[..n].chunks_exact(2)) {
                let src_sample = i16::from_le_bytes([s[0], s[1]]);
                let dst_sample = i16::from_le_bytes([d[0], d[1]]);
                let scaled = (f32::from(src_sample) * volume).round() as i32;
                let mixed = (i32::from(dst_sample) + scaled)
                    .clamp(i32::from(i16::MIN), i32::from(i16::MAX)) as i16;
                d.copy_from_slice(&mixed.to_le_bytes());
            }
        }
        SampleFormat::F32Le => {
            for (d, s) in dst[..n].chunks_exact_mut(4).zip(src[..n].chunks_exact(4)) {
                let src_sample = f32::from_le_bytes([s[0], s[1], s[2], s[3]]);
                let dst_sample = f32::from_le_bytes([d[0], d[1], d[2], d[3]]);
                let mixed = (dst_sample + src_sample * volume).clamp(-1.0, 1.0);
                d.copy_from_slice(&mixed.to_le_bytes());
            }
        }
    }
}
