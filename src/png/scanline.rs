// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Scanline filters (PNG filter method 0).

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Filter {
    None = 0,
    Sub = 1,
    Up = 2,
    Average = 3,
    Paeth = 4,
}

impl Filter {
    pub const ALL: [Filter; 5] = [Filter::None, Filter::Sub, Filter::Up, Filter::Average, Filter::Paeth];

    pub fn from_u8(v: u8) -> Result<Self> {
        Self::ALL
            .get(v as usize)
            .copied()
            .ok_or_else(|| Error::corrupt_image(format!("unknown png filter type {v}")))
    }
}

#[inline]
fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

#[inline]
fn predict(filter: Filter, left: u8, up: u8, up_left: u8) -> u8 {
    match filter {
        Filter::None => 0,
        Filter::Sub => left,
        Filter::Up => up,
        Filter::Average => ((left as u16 + up as u16) / 2) as u8,
        Filter::Paeth => paeth(left, up, up_left),
    }
}

/// Filter `cur` against `prev` (all zeros for the first row) into `out`.
pub fn filter_row(filter: Filter, bpp: usize, prev: &[u8], cur: &[u8], out: &mut [u8]) {
    for i in 0..cur.len() {
        let left = if i >= bpp { cur[i - bpp] } else { 0 };
        let up_left = if i >= bpp { prev[i - bpp] } else { 0 };
        out[i] = cur[i].wrapping_sub(predict(filter, left, prev[i], up_left));
    }
}

/// Reverse a filter in place. `prev` is the already reconstructed row above.
pub fn unfilter_row(filter: Filter, bpp: usize, prev: &[u8], cur: &mut [u8]) {
    for i in 0..cur.len() {
        let left = if i >= bpp { cur[i - bpp] } else { 0 };
        let up_left = if i >= bpp { prev[i - bpp] } else { 0 };
        cur[i] = cur[i].wrapping_add(predict(filter, left, prev[i], up_left));
    }
}

/// Pick the filter whose output has the smallest sum of absolute values
/// (bytes taken as signed), the usual libpng heuristic. Returns the filter
/// and leaves its output in `out`.
pub fn choose_filter(bpp: usize, prev: &[u8], cur: &[u8], out: &mut [u8], scratch: &mut [u8]) -> Filter {
    let mut best = Filter::None;
    let mut best_sum = u64::MAX;
    for filter in Filter::ALL {
        filter_row(filter, bpp, prev, cur, scratch);
        let sum: u64 = scratch.iter().map(|&b| (b as i8).unsigned_abs() as u64).sum();
        if sum < best_sum {
            best_sum = sum;
            best = filter;
            out.copy_from_slice(scratch);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_filter_inverts() {
        let prev: Vec<u8> = (0..24u8).map(|i| i.wrapping_mul(37)).collect();
        let cur: Vec<u8> = (0..24u8).map(|i| i.wrapping_mul(91).wrapping_add(5)).collect();
        for filter in Filter::ALL {
            let mut out = vec![0u8; cur.len()];
            filter_row(filter, 4, &prev, &cur, &mut out);
            unfilter_row(filter, 4, &prev, &mut out);
            assert_eq!(out, cur, "{filter:?}");
        }
    }

    #[test]
    fn flat_row_prefers_sub_or_up() {
        let prev = vec![10u8; 12];
        let cur = vec![10u8; 12];
        let mut out = vec![0u8; 12];
        let mut scratch = vec![0u8; 12];
        let f = choose_filter(3, &prev, &cur, &mut out, &mut scratch);
        assert_eq!(f, Filter::Up);
        assert!(out.iter().all(|&b| b == 0));
    }

    #[test]
    fn paeth_picks_nearest() {
        assert_eq!(paeth(10, 20, 10), 20);
        assert_eq!(paeth(20, 10, 10), 20);
        assert_eq!(paeth(0, 0, 0), 0);
    }

    #[test]
    fn unknown_filter_type() {
        assert!(Filter::from_u8(5).is_err());
        assert_eq!(Filter::from_u8(4).unwrap(), Filter::Paeth);
    }
}
