// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Quantized coefficient storage.

/// Quantization table: 64 values in natural (row-major) order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuantTable {
    pub values: [u16; 64],
}

impl QuantTable {
    pub fn new(values: [u16; 64]) -> Self {
        Self { values }
    }
}

/// Quantized DCT coefficients of one component.
///
/// Blocks are stored in raster order; each block holds its 64 coefficients
/// in natural order (`row * 8 + col`), so `coeffs().chunks(64)` walks the
/// blocks in the same order the embedding slots are numbered.
#[derive(Debug, Clone)]
pub struct DctGrid {
    blocks_wide: usize,
    blocks_tall: usize,
    coeffs: Vec<i16>,
}

impl DctGrid {
    pub fn new(blocks_wide: usize, blocks_tall: usize) -> Self {
        Self { blocks_wide, blocks_tall, coeffs: vec![0i16; blocks_wide * blocks_tall * 64] }
    }

    pub fn blocks_wide(&self) -> usize {
        self.blocks_wide
    }

    pub fn blocks_tall(&self) -> usize {
        self.blocks_tall
    }

    pub fn total_blocks(&self) -> usize {
        self.blocks_wide * self.blocks_tall
    }

    /// Coefficient (`i`, `j`) of block (`br`, `bc`).
    pub fn get(&self, br: usize, bc: usize, i: usize, j: usize) -> i16 {
        self.coeffs[self.index(br, bc, i, j)]
    }

    pub fn set(&mut self, br: usize, bc: usize, i: usize, j: usize, val: i16) {
        let idx = self.index(br, bc, i, j);
        self.coeffs[idx] = val;
    }

    pub fn block(&self, br: usize, bc: usize) -> &[i16] {
        let start = (br * self.blocks_wide + bc) * 64;
        &self.coeffs[start..start + 64]
    }

    pub fn block_mut(&mut self, br: usize, bc: usize) -> &mut [i16] {
        let start = (br * self.blocks_wide + bc) * 64;
        &mut self.coeffs[start..start + 64]
    }

    /// All coefficients, `total_blocks() * 64` values. Each 64-value chunk
    /// is one block; the forward DCT fills these in parallel.
    pub fn coeffs(&self) -> &[i16] {
        &self.coeffs
    }

    pub fn coeffs_mut(&mut self) -> &mut [i16] {
        &mut self.coeffs
    }

    fn index(&self, br: usize, bc: usize, i: usize, j: usize) -> usize {
        debug_assert!(br < self.blocks_tall && bc < self.blocks_wide);
        debug_assert!(i < 8 && j < 8);
        (br * self.blocks_wide + bc) * 64 + i * 8 + j
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_get_set() {
        let mut grid = DctGrid::new(2, 3);
        assert_eq!(grid.total_blocks(), 6);
        assert_eq!(grid.get(2, 1, 7, 7), 0);
        grid.set(1, 0, 3, 4, 42);
        assert_eq!(grid.get(1, 0, 3, 4), 42);
        assert_eq!(grid.get(0, 0, 3, 4), 0);
    }

    #[test]
    fn blocks_are_raster_chunks() {
        let mut grid = DctGrid::new(2, 2);
        grid.block_mut(1, 0)[5] = 7;
        let chunk = grid.coeffs().chunks(64).nth(2).unwrap();
        assert_eq!(chunk[5], 7);
        assert_eq!(grid.block(1, 0)[5], 7);
    }
}
