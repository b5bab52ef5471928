//! Element conversion for the crop kernel.
//!
//! Every destination type converts through `f32`. Half-precision rows take a
//! batched path instead of the per-element one; both produce the same bits.

use half::f16;
use half::slice::HalfFloatSliceExt as _;

use crate::pixel::Element;

/// Elements per batched half-precision conversion.
const F16_CHUNK: usize = 64;

/// Convert a strided run of 8-bit samples into a destination row.
///
/// Reads `src[k * step]` for every `k < dst.len()`.
pub trait ConvertRow: Element {
    fn convert_row(src: &[u8], step: usize, dst: &mut [Self]);
}

macro_rules! generic_convert_row {
    ($($t:ty),*) => {$(
        impl ConvertRow for $t {
            #[inline]
            fn convert_row(src: &[u8], step: usize, dst: &mut [Self]) {
                for (k, d) in dst.iter_mut().enumerate() {
                    *d = <$t>::from_f32(f32::from(src[k * step]));
                }
            }
        }
    )*};
}

generic_convert_row!(u8, i16, i32, i64, f32);

impl ConvertRow for f16 {
    fn convert_row(src: &[u8], step: usize, dst: &mut [Self]) {
        let mut wide = [0f32; F16_CHUNK];
        for (chunk_idx, out) in dst.chunks_mut(F16_CHUNK).enumerate() {
            let base = chunk_idx * F16_CHUNK;
            let wide = &mut wide[..out.len()];
            for (k, w) in wide.iter_mut().enumerate() {
                *w = f32::from(src[(base + k) * step]);
            }
            f32_to_f16_row(wide, out);
        }
    }
}

/// Per-element reference conversion: widen, then round to nearest even.
pub fn f32_to_f16_generic(src: &[f32], dst: &mut [f16]) {
    for (d, &s) in dst.iter_mut().zip(src) {
        *d = f16::from_f32(s);
    }
}

/// Batched `f32` to `f16` conversion. Uses F16C when the CPU has it.
///
/// `src` and `dst` must have equal lengths; extra elements are ignored.
#[cfg(not(feature = "simd"))]
pub fn f32_to_f16_row(src: &[f32], dst: &mut [f16]) {
    let n = src.len().min(dst.len());
    dst[..n].convert_from_f32_slice(&src[..n]);
}

/// Batched `f32` to `f16` conversion, dispatched per CPU tier.
///
/// `src` and `dst` must have equal lengths; extra elements are ignored.
#[cfg(feature = "simd")]
pub fn f32_to_f16_row(src: &[f32], dst: &mut [f16]) {
    let n = src.len().min(dst.len());
    simd::f32_to_f16_row(&src[..n], &mut dst[..n]);
}

#[cfg(feature = "simd")]
mod simd {
    use archmage::incant;
    use archmage::prelude::*;
    use half::f16;
    use half::slice::HalfFloatSliceExt as _;

    pub(super) fn f32_to_f16_row(src: &[f32], dst: &mut [f16]) {
        incant!(f16_row(src, dst), [v3, scalar]);
    }

    fn f16_row_scalar(_token: ScalarToken, src: &[f32], dst: &mut [f16]) {
        dst.convert_from_f32_slice(src);
    }

    #[cfg(target_arch = "x86_64")]
    #[arcane]
    fn f16_row_v3(_token: X64V3Token, src: &[f32], dst: &mut [f16]) {
        use core::arch::x86_64::{_MM_FROUND_TO_NEAREST_INT, _mm256_cvtps_ph};

        let mut i = 0;
        while let Some(s) = src[i..].first_chunk::<8>() {
            let v = safe_unaligned_simd::x86_64::_mm256_loadu_ps(s);
            let h = _mm256_cvtps_ph::<_MM_FROUND_TO_NEAREST_INT>(v);
            let mut bytes = [0u8; 16];
            safe_unaligned_simd::x86_64::_mm_storeu_si128(&mut bytes, h);
            for (d, pair) in dst[i..i + 8].iter_mut().zip(bytes.chunks_exact(2)) {
                *d = f16::from_bits(u16::from_ne_bytes([pair[0], pair[1]]));
            }
            i += 8;
        }
        for (d, &s) in dst[i..].iter_mut().zip(&src[i..]) {
            *d = f16::from_f32(s);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_u8_as_f32() -> Vec<f32> {
        (0..=255u8).map(f32::from).collect()
    }

    #[test]
    fn batched_matches_generic_for_every_u8() {
        let src = all_u8_as_f32();
        let mut batched = vec![f16::ZERO; src.len()];
        let mut generic = vec![f16::ZERO; src.len()];
        f32_to_f16_row(&src, &mut batched);
        f32_to_f16_generic(&src, &mut generic);
        let a: Vec<u16> = batched.iter().map(|h| h.to_bits()).collect();
        let b: Vec<u16> = generic.iter().map(|h| h.to_bits()).collect();
        assert_eq!(a, b);
    }

    #[test]
    fn batched_matches_generic_on_rounding_boundaries() {
        // Values that need rounding in f16, plus range edges and odd tail length.
        let src: Vec<f32> = [
            0.0, -0.0, 1.0, 255.0, 2049.0, 2051.0, 4097.0, 65504.0, 65520.0, 1e-8, 0.1,
            0.33333334, 1234.567, -7.25, 3e5,
        ]
        .to_vec();
        let mut batched = vec![f16::ZERO; src.len()];
        let mut generic = vec![f16::ZERO; src.len()];
        f32_to_f16_row(&src, &mut batched);
        f32_to_f16_generic(&src, &mut generic);
        for ((a, b), s) in batched.iter().zip(&generic).zip(&src) {
            assert_eq!(a.to_bits(), b.to_bits(), "mismatch for {s}");
        }
    }

    #[test]
    fn strided_convert_row_reads_every_step() {
        let src = [10u8, 99, 99, 20, 99, 99, 30, 99, 99];
        let mut out = [0f32; 3];
        f32::convert_row(&src, 3, &mut out);
        assert_eq!(out, [10.0, 20.0, 30.0]);

        let mut half_out = [f16::ZERO; 3];
        f16::convert_row(&src[1..], 3, &mut half_out);
        assert!(half_out.iter().all(|h| h.to_f32() == 99.0));
    }

    #[test]
    fn f16_convert_row_spans_chunks() {
        let src: Vec<u8> = (0..200u32).map(|v| (v * 7 % 256) as u8).collect();
        let mut out = vec![f16::ZERO; src.len()];
        f16::convert_row(&src, 1, &mut out);
        for (o, &s) in out.iter().zip(&src) {
            assert_eq!(o.to_bits(), f16::from_f32(f32::from(s)).to_bits());
        }
    }

    #[cfg(feature = "simd")]
    #[test]
    fn f16_row_all_simd_tiers() {
        use archmage::testing::{CompileTimePolicy, for_each_token_permutation};

        let src: Vec<f32> = (0..1000).map(|i| i as f32 * 65.53 + 0.5).collect();
        let mut expected = vec![f16::ZERO; src.len()];
        f32_to_f16_generic(&src, &mut expected);

        let report = for_each_token_permutation(CompileTimePolicy::Warn, |_perm| {
            let mut out = vec![f16::ZERO; src.len()];
            f32_to_f16_row(&src, &mut out);
            for (a, b) in out.iter().zip(&expected) {
                assert_eq!(a.to_bits(), b.to_bits());
            }
        });
        assert!(report.permutations_run >= 1);
    }
}
