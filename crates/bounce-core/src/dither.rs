//! Float to output-format conversion with dither
//!
//! Integer targets are quantized after adding low-amplitude noise sized to
//! one quantization step, which decorrelates the rounding error from the
//! signal. Float output is written verbatim. Writes are strided so the same
//! routine fills planar and interleaved layouts.

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::types::{Sample, SampleFormat};

/// Dither applied during bit-depth reduction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DitherMode {
    /// Truncation only
    None,
    /// Rectangular PDF noise
    Rectangular,
    /// Triangular PDF noise (sum of two uniforms)
    #[default]
    Triangular,
    /// First-order noise-shaped triangular dither
    Shaped,
}

/// Dither used when the mix is not in high-quality mode
pub const LOW_QUALITY_DITHER: DitherMode = DitherMode::Rectangular;

/// Dither used in high-quality mode
pub const HIGH_QUALITY_DITHER: DitherMode = DitherMode::Shaped;

/// Write `src` into `dst` as `format`, dithering integer targets
///
/// `dst_start` and `dst_stride` count samples: a planar layout passes
/// `(0, 1)`, an interleaved one the channel index and channel count. `dst`
/// must hold `(dst_start + src.len() * dst_stride)` samples of `format`.
pub fn write_samples(
    src: &[Sample],
    dst: &mut [u8],
    dst_start: usize,
    dst_stride: usize,
    format: SampleFormat,
    dither: DitherMode,
) {
    match format {
        SampleFormat::Float32 => write_f32(src, dst, dst_start, dst_stride),
        SampleFormat::Int16 => write_int(src, dst, dst_start, dst_stride, 16, dither),
        SampleFormat::Int24 => write_int(src, dst, dst_start, dst_stride, 24, dither),
    }
}

fn write_f32(src: &[Sample], dst: &mut [u8], dst_start: usize, dst_stride: usize) {
    if dst_start == 0 && dst_stride == 1 {
        // contiguous fast path: one byte-level copy
        dst[..src.len() * 4].copy_from_slice(bytemuck::cast_slice(src));
        return;
    }
    for (k, &s) in src.iter().enumerate() {
        let at = (dst_start + k * dst_stride) * 4;
        dst[at..at + 4].copy_from_slice(&s.to_ne_bytes());
    }
}

fn write_int(
    src: &[Sample],
    dst: &mut [u8],
    dst_start: usize,
    dst_stride: usize,
    bits: u32,
    dither: DitherMode,
) {
    let step = 1.0 / (1i64 << (bits - 1)) as Sample;
    let scale = ((1i64 << (bits - 1)) - 1) as Sample;
    let mut rng = rand::thread_rng();
    let mut error = 0.0f32;

    for (k, &s) in src.iter().enumerate() {
        let value = match dither {
            DitherMode::None => s,
            DitherMode::Rectangular => s + (rng.gen_range(0.0f32..1.0) - 0.5) * step,
            DitherMode::Triangular => {
                let r1: f32 = rng.gen_range(0.0..1.0);
                let r2: f32 = rng.gen_range(0.0..1.0);
                s + (r1 + r2 - 1.0) * step
            }
            DitherMode::Shaped => {
                let r1: f32 = rng.gen_range(0.0..1.0);
                let r2: f32 = rng.gen_range(0.0..1.0);
                s - error + (r1 + r2 - 1.0) * step
            }
        };
        let quantized = (value.clamp(-1.0, 1.0) * scale) as i32;
        if dither == DitherMode::Shaped {
            error = quantized as f32 / scale - (s - error);
        }

        let at = (dst_start + k * dst_stride) * if bits == 16 { 2 } else { 4 };
        if bits == 16 {
            dst[at..at + 2].copy_from_slice(&(quantized as i16).to_ne_bytes());
        } else {
            dst[at..at + 4].copy_from_slice(&quantized.to_ne_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn read_i16(dst: &[u8], at: usize) -> i16 {
        i16::from_ne_bytes([dst[at * 2], dst[at * 2 + 1]])
    }

    #[test]
    fn test_float_passthrough() {
        let src = [0.25f32, -0.5, 1.0];
        let mut dst = vec![0u8; 12];
        write_samples(&src, &mut dst, 0, 1, SampleFormat::Float32, DitherMode::None);
        let round: Vec<f32> = dst
            .chunks_exact(4)
            .map(|b| f32::from_ne_bytes([b[0], b[1], b[2], b[3]]))
            .collect();
        assert_eq!(round, src);
    }

    #[test]
    fn test_int16_truncation_endpoints() {
        let src = [0.0f32, 1.0, -1.0];
        let mut dst = vec![0u8; 6];
        write_samples(&src, &mut dst, 0, 1, SampleFormat::Int16, DitherMode::None);
        assert_eq!(read_i16(&dst, 0), 0);
        assert_eq!(read_i16(&dst, 1), 32767);
        assert_eq!(read_i16(&dst, 2), -32767);
    }

    #[test]
    fn test_int24_range() {
        let src = [1.0f32, -1.0];
        let mut dst = vec![0u8; 8];
        write_samples(&src, &mut dst, 0, 1, SampleFormat::Int24, DitherMode::None);
        let hi = i32::from_ne_bytes([dst[0], dst[1], dst[2], dst[3]]);
        let lo = i32::from_ne_bytes([dst[4], dst[5], dst[6], dst[7]]);
        assert_eq!(hi, 8388607);
        assert_eq!(lo, -8388607);
    }

    #[test]
    fn test_interleaved_stride() {
        let left = [0.5f32, 0.5];
        let right = [-0.5f32, -0.5];
        let mut dst = vec![0u8; 16];
        write_samples(&left, &mut dst, 0, 2, SampleFormat::Int16, DitherMode::None);
        write_samples(&right, &mut dst, 1, 2, SampleFormat::Int16, DitherMode::None);
        assert!(read_i16(&dst, 0) > 0);
        assert!(read_i16(&dst, 1) < 0);
        assert!(read_i16(&dst, 2) > 0);
        assert!(read_i16(&dst, 3) < 0);
    }

    #[test]
    fn test_dither_stays_within_one_step() {
        let src = [0.5f32; 256];
        let mut dst = vec![0u8; 512];
        for mode in [DitherMode::Rectangular, DitherMode::Triangular, DitherMode::Shaped] {
            write_samples(&src, &mut dst, 0, 1, SampleFormat::Int16, mode);
            let expected = 0.5 * 32767.0;
            for k in 0..src.len() {
                let v = read_i16(&dst, k) as f32;
                assert!(
                    (v - expected).abs() <= 4.0,
                    "{:?}: sample {} off by {}",
                    mode,
                    k,
                    v - expected
                );
            }
        }
    }
}
