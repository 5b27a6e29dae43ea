// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Embedding slots.
//!
//! Every 8×8 block of every component contributes the coefficients at
//! zigzag positions 1 through 6. Slot `n` of block `b` in grid `g` has the
//! global index `offset(g) + b * 6 + n`, where `offset(g)` counts the slots of
//! the grids before it. Each slot carries one payload bit in the low bit of
//! its quantized value.
//!
//! The slot stream holds `[u32 BE length][payload]` followed by random fill,
//! so every slot bit is written whatever the payload size. With a scrambler
//! key, stream bit `i` goes to slot `random_indices(0, slots, 0)[i]`.

use super::dct::DctGrid;
use super::tables::ZIGZAG_TO_NATURAL;
use crate::bitfile::BitFile;
use crate::crypto::fill_random;
use crate::error::{Error, Result};
use crate::scrambler::ScramblerKey;

/// Natural-order indices of the slot coefficients (zigzag 1..=6).
pub const SLOT_NATURAL: [usize; 6] = [
    ZIGZAG_TO_NATURAL[1],
    ZIGZAG_TO_NATURAL[2],
    ZIGZAG_TO_NATURAL[3],
    ZIGZAG_TO_NATURAL[4],
    ZIGZAG_TO_NATURAL[5],
    ZIGZAG_TO_NATURAL[6],
];

/// Bytes of the big-endian length in front of the payload.
pub const LENGTH_PREFIX: usize = 4;

/// APP11 body prefix that marks a scrambled slot order.
pub const SCRAMBLE_TAG: &[u8] = b"SCRAMBLE\0";
pub const SCRAMBLE_VERSION: u8 = 1;

/// Coefficients used per block.
pub fn embedded_group_size() -> usize {
    SLOT_NATURAL.len()
}

/// Payload bits carried by one slot coefficient.
pub fn bits_per_coefficient() -> usize {
    1
}

/// Payload bytes that fit into `slots` slots.
pub fn capacity_for_slots(slots: usize) -> usize {
    (slots * bits_per_coefficient() / 8).saturating_sub(LENGTH_PREFIX)
}

/// Slot addressing over a set of grids.
pub struct SlotLayout {
    /// First global slot of each grid.
    offsets: Vec<usize>,
    total: usize,
}

impl SlotLayout {
    pub fn of(grids: &[DctGrid]) -> Result<Self> {
        let mut offsets = Vec::with_capacity(grids.len());
        let mut total = 0usize;
        for g in grids {
            offsets.push(total);
            total += g.total_blocks() * embedded_group_size();
        }
        if u32::try_from(total).is_err() {
            return Err(Error::InvalidArgument("image has too many blocks"));
        }
        Ok(Self { offsets, total })
    }

    pub fn len(&self) -> usize {
        self.total
    }

    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    pub fn capacity(&self) -> usize {
        capacity_for_slots(self.total)
    }

    /// (grid, index into `coeffs()`) of a global slot.
    pub fn locate(&self, slot: usize) -> (usize, usize) {
        let grid = self.offsets.partition_point(|&o| o <= slot) - 1;
        let local = slot - self.offsets[grid];
        let group = embedded_group_size();
        (grid, (local / group) * 64 + SLOT_NATURAL[local % group])
    }

    /// Stream-bit → slot mapping.
    pub fn order(&self, key: Option<&ScramblerKey>) -> Result<Vec<u32>> {
        match key {
            Some(key) => key.random_indices(0, self.total as u32, 0),
            None => Ok((0..self.total as u32).collect()),
        }
    }
}

/// Value of a slot coefficient after storing `bit` in its low bit.
#[inline]
pub fn with_low_bit(value: i16, bit: bool) -> i16 {
    (value & !1) | i16::from(bit)
}

/// Write the framed payload plus random fill into every slot.
pub fn embed_payload(grids: &mut [DctGrid], payload: &[u8], key: Option<&ScramblerKey>) -> Result<()> {
    let layout = SlotLayout::of(grids)?;
    let capacity = layout.capacity();
    if payload.len() > capacity || layout.len() < LENGTH_PREFIX * 8 {
        return Err(Error::PackedDataOverflow { needed: payload.len(), capacity });
    }

    let mut stream = vec![0u8; layout.len().div_ceil(8)];
    stream[..LENGTH_PREFIX].copy_from_slice(&(payload.len() as u32).to_be_bytes());
    let end = LENGTH_PREFIX + payload.len();
    stream[LENGTH_PREFIX..end].copy_from_slice(payload);
    fill_random(&mut stream[end..]);

    let order = layout.order(key)?;
    let mut bits = BitFile::for_read(stream);
    for &slot in &order {
        let bit = bits.read_bits(1)? == 1;
        let (g, idx) = layout.locate(slot as usize);
        let c = &mut grids[g].coeffs_mut()[idx];
        *c = with_low_bit(*c, bit);
    }
    Ok(())
}

/// Read the framed payload back. A declared length above `max_len` or the
/// slot capacity means this is not a packed image (or the key is wrong).
pub fn extract_payload(grids: &[DctGrid], max_len: usize, key: Option<&ScramblerKey>) -> Result<Vec<u8>> {
    let layout = SlotLayout::of(grids)?;
    if layout.len() < LENGTH_PREFIX * 8 {
        return Err(Error::corrupt_image("image too small to carry a payload"));
    }
    let order = layout.order(key)?;
    let mut stream = order.iter().map(|&slot| {
        let (g, idx) = layout.locate(slot as usize);
        grids[g].coeffs()[idx] & 1
    });

    let mut len = 0u32;
    for bit in stream.by_ref().take(LENGTH_PREFIX * 8) {
        len = (len << 1) | bit as u32;
    }
    let len = len as usize;
    if len > max_len || len > layout.capacity() {
        return Err(Error::corrupt_image(format!("declared payload length {len} is out of range")));
    }

    let mut out = BitFile::for_write();
    for bit in stream.take(len * 8) {
        out.write_bits(bit as u32, 1)?;
    }
    out.into_data()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grids() -> Vec<DctGrid> {
        vec![DctGrid::new(4, 4), DctGrid::new(4, 4), DctGrid::new(2, 2)]
    }

    #[test]
    fn slot_positions() {
        assert_eq!(SLOT_NATURAL, [1, 8, 16, 9, 2, 3]);
        assert_eq!(embedded_group_size(), 6);
        assert_eq!(bits_per_coefficient(), 1);
    }

    #[test]
    fn layout_spans_all_grids() {
        let layout = SlotLayout::of(&grids()).unwrap();
        assert_eq!(layout.len(), (16 + 16 + 4) * 6);
        assert_eq!(layout.locate(0), (0, 1));
        assert_eq!(layout.locate(7), (0, 64 + 8));
        assert_eq!(layout.locate(96), (1, 1));
        assert_eq!(layout.locate(layout.len() - 1), (2, 3 * 64 + 3));
    }

    #[test]
    fn low_bit_handles_negatives() {
        assert_eq!(with_low_bit(-3, false), -4);
        assert_eq!(with_low_bit(-4, true), -3);
        assert_eq!(with_low_bit(1022, true), 1023);
        assert_eq!(with_low_bit(-3, true) & 1, 1);
    }

    #[test]
    fn embed_then_extract() {
        let mut g = grids();
        let payload = b"slots carry this";
        embed_payload(&mut g, payload, None).unwrap();
        assert_eq!(extract_payload(&g, 100, None).unwrap(), payload);
        assert!(extract_payload(&g, 3, None).is_err());
    }

    #[test]
    fn scrambled_order_needs_the_key() {
        let key = ScramblerKey::generate();
        let mut g = grids();
        embed_payload(&mut g, b"hidden", Some(&key)).unwrap();
        assert_eq!(extract_payload(&g, 100, Some(&key)).unwrap(), b"hidden");
        let wrong = ScramblerKey::generate();
        assert_ne!(extract_payload(&g, 100, Some(&wrong)).ok().as_deref(), Some(&b"hidden"[..]));
    }

    #[test]
    fn overflow_is_reported() {
        let mut g = grids();
        let capacity = SlotLayout::of(&g).unwrap().capacity();
        let err = embed_payload(&mut g, &vec![0u8; capacity + 1], None).unwrap_err();
        assert!(matches!(err, Error::PackedDataOverflow { .. }));
        embed_payload(&mut g, &vec![0xA5u8; capacity], None).unwrap();
    }
}
