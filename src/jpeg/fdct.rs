// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Pixel side of the encoder: RGBA → YCbCr planes, forward DCT, quantization.
//!
//! All three DCT variants produce coefficients in the JPEG (T.81 A.3.3)
//! scaling, so they are interchangeable ahead of quantization. They differ
//! only in speed and rounding.
//!
//! With the `parallel` feature the per-block transform runs on rayon; each
//! block is independent, so the output is identical to the serial path.

use image::RgbaImage;

use super::dct::{DctGrid, QuantTable};
use super::slots::SLOT_NATURAL;

/// Forward DCT implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DctMethod {
    /// Direct evaluation of the 2-D definition. Slowest, most exact.
    Baseline,
    /// Separable transform: 1-D DCT over columns, then rows.
    #[default]
    ColumnsAndRows,
    /// Arai-Agui-Nakajima float DCT with the scaling folded into the
    /// descale step, as in libjpeg's `jfdctflt`.
    PracticalFast,
}

/// Largest magnitude of a quantized coefficient (baseline category 10).
pub const MAX_COEFFICIENT: i16 = 1023;

/// Slot coefficients stay one below the limit so setting the low bit can
/// never leave the encodable range.
pub const MAX_SLOT_COEFFICIENT: i16 = 1022;

/// One level-shifted sample plane, padded to whole blocks by edge replication.
pub struct Plane {
    blocks_wide: usize,
    blocks_tall: usize,
    stride: usize,
    samples: Vec<f32>,
}

impl Plane {
    pub fn blocks_wide(&self) -> usize {
        self.blocks_wide
    }

    pub fn blocks_tall(&self) -> usize {
        self.blocks_tall
    }

    fn block(&self, index: usize) -> [f32; 64] {
        let (br, bc) = (index / self.blocks_wide, index % self.blocks_wide);
        let mut out = [0f32; 64];
        for y in 0..8 {
            let row = (br * 8 + y) * self.stride + bc * 8;
            out[y * 8..y * 8 + 8].copy_from_slice(&self.samples[row..row + 8]);
        }
        out
    }
}

/// Split an image into Y, Cb and Cr planes (JFIF conversion, alpha ignored).
pub fn rgba_to_planes(img: &RgbaImage) -> [Plane; 3] {
    let (w, h) = (img.width() as usize, img.height() as usize);
    let blocks_wide = w.div_ceil(8).max(1);
    let blocks_tall = h.div_ceil(8).max(1);
    let stride = blocks_wide * 8;
    let padded_h = blocks_tall * 8;

    let mut planes: [Vec<f32>; 3] = std::array::from_fn(|_| vec![0f32; stride * padded_h]);
    for y in 0..padded_h {
        let sy = y.min(h.saturating_sub(1));
        for x in 0..stride {
            let sx = x.min(w.saturating_sub(1));
            let [r, g, b, _] = img.get_pixel(sx as u32, sy as u32).0;
            let (r, g, b) = (r as f32, g as f32, b as f32);
            let at = y * stride + x;
            planes[0][at] = 0.299 * r + 0.587 * g + 0.114 * b - 128.0;
            planes[1][at] = -0.168_736 * r - 0.331_264 * g + 0.5 * b;
            planes[2][at] = 0.5 * r - 0.418_688 * g - 0.081_312 * b;
        }
    }
    planes.map(|samples| Plane { blocks_wide, blocks_tall, stride, samples })
}

/// `COS[k][n] = cos((2n+1)kπ/16)`.
fn cos_table() -> [[f32; 8]; 8] {
    let mut t = [[0f32; 8]; 8];
    for (k, row) in t.iter_mut().enumerate() {
        for (n, v) in row.iter_mut().enumerate() {
            *v = (((2 * n + 1) * k) as f64 * std::f64::consts::PI / 16.0).cos() as f32;
        }
    }
    t
}

fn c(k: usize) -> f32 {
    if k == 0 {
        std::f32::consts::FRAC_1_SQRT_2
    } else {
        1.0
    }
}

fn fdct_baseline(block: &[f32; 64], cos: &[[f32; 8]; 8]) -> [f32; 64] {
    let mut out = [0f32; 64];
    for v in 0..8 {
        for u in 0..8 {
            let mut sum = 0f32;
            for y in 0..8 {
                for x in 0..8 {
                    sum += block[y * 8 + x] * cos[u][x] * cos[v][y];
                }
            }
            out[v * 8 + u] = 0.25 * c(u) * c(v) * sum;
        }
    }
    out
}

fn fdct_separable(block: &[f32; 64], cos: &[[f32; 8]; 8]) -> [f32; 64] {
    // Orthonormal 1-D scale: sqrt(1/8) for DC, 1/2 otherwise.
    let scale = |k: usize| if k == 0 { (0.125f32).sqrt() } else { 0.5 };
    let mut tmp = [0f32; 64];
    for x in 0..8 {
        for v in 0..8 {
            let sum: f32 = (0..8).map(|y| block[y * 8 + x] * cos[v][y]).sum();
            tmp[v * 8 + x] = scale(v) * sum;
        }
    }
    let mut out = [0f32; 64];
    for v in 0..8 {
        for u in 0..8 {
            let sum: f32 = (0..8).map(|x| tmp[v * 8 + x] * cos[u][x]).sum();
            out[v * 8 + u] = scale(u) * sum;
        }
    }
    out
}

const AAN_SCALE: [f32; 8] = [
    1.0, 1.387_039_845, 1.306_562_965, 1.175_875_602, 1.0, 0.785_694_958, 0.541_196_100, 0.275_899_379,
];

fn aan_pass(d: &mut [f32; 64], offset: usize, step: usize) {
    let at = |i: usize| offset + i * step;
    let tmp0 = d[at(0)] + d[at(7)];
    let tmp7 = d[at(0)] - d[at(7)];
    let tmp1 = d[at(1)] + d[at(6)];
    let tmp6 = d[at(1)] - d[at(6)];
    let tmp2 = d[at(2)] + d[at(5)];
    let tmp5 = d[at(2)] - d[at(5)];
    let tmp3 = d[at(3)] + d[at(4)];
    let tmp4 = d[at(3)] - d[at(4)];

    let tmp10 = tmp0 + tmp3;
    let tmp13 = tmp0 - tmp3;
    let tmp11 = tmp1 + tmp2;
    let tmp12 = tmp1 - tmp2;
    d[at(0)] = tmp10 + tmp11;
    d[at(4)] = tmp10 - tmp11;
    let z1 = (tmp12 + tmp13) * 0.707_106_781;
    d[at(2)] = tmp13 + z1;
    d[at(6)] = tmp13 - z1;

    let tmp10 = tmp4 + tmp5;
    let tmp11 = tmp5 + tmp6;
    let tmp12 = tmp6 + tmp7;
    let z5 = (tmp10 - tmp12) * 0.382_683_433;
    let z2 = 0.541_196_100 * tmp10 + z5;
    let z4 = 1.306_562_965 * tmp12 + z5;
    let z3 = tmp11 * 0.707_106_781;
    let z11 = tmp7 + z3;
    let z13 = tmp7 - z3;
    d[at(5)] = z13 + z2;
    d[at(3)] = z13 - z2;
    d[at(1)] = z11 + z4;
    d[at(7)] = z11 - z4;
}

fn fdct_aan(block: &[f32; 64]) -> [f32; 64] {
    let mut d = *block;
    for row in 0..8 {
        aan_pass(&mut d, row * 8, 1);
    }
    for col in 0..8 {
        aan_pass(&mut d, col, 8);
    }
    for v in 0..8 {
        for u in 0..8 {
            d[v * 8 + u] /= 8.0 * AAN_SCALE[u] * AAN_SCALE[v];
        }
    }
    d
}

/// Forward DCT of one level-shifted block, JPEG scaling, natural order.
pub fn forward_dct(method: DctMethod, block: &[f32; 64]) -> [f32; 64] {
    match method {
        DctMethod::Baseline => fdct_baseline(block, &cos_table()),
        DctMethod::ColumnsAndRows => fdct_separable(block, &cos_table()),
        DctMethod::PracticalFast => fdct_aan(block),
    }
}

/// Quantize one transformed block into `out`.
///
/// Ordinary coefficients become `round(F / q)`. Slot coefficients are
/// quantized by the same effective step but stored in unit steps
/// (`round(F / q) * q`), because the container table carries 1 there.
pub fn quantize_block(coeffs: &[f32; 64], effective: &QuantTable, out: &mut [i16]) {
    for (i, (&f, dst)) in coeffs.iter().zip(out.iter_mut()).enumerate() {
        let q = effective.values[i].max(1) as f32;
        let level = (f / q).round();
        *dst = if SLOT_NATURAL.contains(&i) {
            (level * q).clamp(-(MAX_SLOT_COEFFICIENT as f32), MAX_SLOT_COEFFICIENT as f32) as i16
        } else {
            level.clamp(-(MAX_COEFFICIENT as f32), MAX_COEFFICIENT as f32) as i16
        };
    }
}

/// Transform and quantize every block of `plane` into `grid`.
pub fn encode_plane(plane: &Plane, grid: &mut DctGrid, method: DctMethod, effective: &QuantTable) {
    debug_assert_eq!(plane.blocks_wide * plane.blocks_tall, grid.total_blocks());
    let work = |(index, out): (usize, &mut [i16])| {
        let coeffs = forward_dct(method, &plane.block(index));
        quantize_block(&coeffs, effective, out);
    };

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        grid.coeffs_mut().par_chunks_mut(64).enumerate().for_each(work);
    }
    #[cfg(not(feature = "parallel"))]
    {
        grid.coeffs_mut().chunks_mut(64).enumerate().for_each(work);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn ramp() -> [f32; 64] {
        let mut b = [0f32; 64];
        for (i, v) in b.iter_mut().enumerate() {
            *v = ((i % 8) * 13 + (i / 8) * 7) as f32 - 80.0;
        }
        b
    }

    #[test]
    fn flat_block_has_only_dc() {
        let block = [50f32; 64];
        for method in [DctMethod::Baseline, DctMethod::ColumnsAndRows, DctMethod::PracticalFast] {
            let out = forward_dct(method, &block);
            assert!((out[0] - 400.0).abs() < 0.01, "{method:?}: {}", out[0]);
            assert!(out[1..].iter().all(|v| v.abs() < 0.01), "{method:?}");
        }
    }

    #[test]
    fn methods_agree() {
        let block = ramp();
        let a = forward_dct(DctMethod::Baseline, &block);
        let b = forward_dct(DctMethod::ColumnsAndRows, &block);
        let c = forward_dct(DctMethod::PracticalFast, &block);
        for i in 0..64 {
            assert!((a[i] - b[i]).abs() < 0.05, "separable differs at {i}");
            assert!((a[i] - c[i]).abs() < 0.05, "aan differs at {i}");
        }
    }

    #[test]
    fn slot_coefficients_keep_unit_steps() {
        let mut coeffs = [0f32; 64];
        coeffs[0] = 100.0;
        coeffs[1] = 37.0;
        coeffs[10] = 37.0;
        let eff = QuantTable::new([10; 64]);
        let mut out = [0i16; 64];
        quantize_block(&coeffs, &eff, &mut out);
        assert_eq!(out[0], 10);
        assert_eq!(out[1], 40);
        assert_eq!(out[10], 4);
    }

    #[test]
    fn quantization_clamps() {
        let mut coeffs = [5000f32; 64];
        coeffs[1] = -5000.0;
        let eff = QuantTable::new([1; 64]);
        let mut out = [0i16; 64];
        quantize_block(&coeffs, &eff, &mut out);
        assert_eq!(out[0], MAX_COEFFICIENT);
        assert_eq!(out[1], -MAX_SLOT_COEFFICIENT);
    }

    #[test]
    fn planes_replicate_edges() {
        let mut img = RgbaImage::from_pixel(9, 3, Rgba([255, 255, 255, 255]));
        img.put_pixel(8, 2, Rgba([0, 0, 0, 255]));
        let [y, cb, _] = rgba_to_planes(&img);
        assert_eq!((y.blocks_wide(), y.blocks_tall()), (2, 1));
        // The black corner pixel fills the padding of the second block.
        let second = y.block(1);
        assert!((second[2 * 8] + 128.0).abs() < 0.01);
        assert!((second[7 * 8 + 7] + 128.0).abs() < 0.01);
        assert!(cb.block(0).iter().all(|v| v.abs() < 0.01));
    }
}
