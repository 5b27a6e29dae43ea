// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Entropy-coded segment reader.
//!
//! Writing goes through [`crate::bitfile::BitFile`]'s entropy segments; this
//! reader is the decode-side counterpart tuned for Huffman lookups. It undoes
//! byte-stuffing (0xFF00 → 0xFF) and notices markers embedded in the stream.

use super::error::{JpegError, Result};

pub struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    /// Valid bits sit in the low `bits_left` positions.
    buf: u32,
    bits_left: u8,
    /// Marker byte seen while filling, if any.
    marker_found: Option<u8>,
}

impl<'a> BitReader<'a> {
    /// `pos` is the first entropy-coded byte (just past the SOS header).
    pub fn new(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos, buf: 0, bits_left: 0, marker_found: None }
    }

    /// Read 1–16 bits, right-aligned.
    pub fn read_bits(&mut self, count: u8) -> Result<u16> {
        let v = self.peek_bits(count)?;
        self.bits_left -= count;
        Ok(v)
    }

    pub fn peek_bits(&mut self, count: u8) -> Result<u16> {
        debug_assert!((1..=16).contains(&count));
        while self.bits_left < count {
            self.fill_byte()?;
        }
        let val = (self.buf >> (self.bits_left - count)) & ((1u32 << count) - 1);
        Ok(val as u16)
    }

    /// Drop bits that were already peeked.
    pub fn skip_bits(&mut self, count: u8) {
        debug_assert!(count <= self.bits_left);
        self.bits_left -= count;
    }

    pub fn byte_align(&mut self) {
        self.bits_left = 0;
        self.buf = 0;
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn marker_found(&self) -> Option<u8> {
        self.marker_found
    }

    /// Consume an RSTn marker at the current position (or one already swallowed
    /// while filling) and return `n`. Sequence numbers are not enforced.
    pub fn check_restart_marker(&mut self) -> Result<Option<u8>> {
        self.byte_align();

        if let Some(m) = self.marker_found {
            if (m & 0xF8) == 0xD0 {
                self.marker_found = None;
                return Ok(Some(m & 0x07));
            }
        }

        while self.pos + 1 < self.data.len() && self.data[self.pos] == 0xFF {
            let next = self.data[self.pos + 1];
            if next == 0xFF {
                self.pos += 1;
                continue;
            }
            if (next & 0xF8) == 0xD0 {
                self.pos += 2;
                return Ok(Some(next & 0x07));
            }
            break;
        }
        Ok(None)
    }

    fn fill_byte(&mut self) -> Result<()> {
        let byte = *self.data.get(self.pos).ok_or(JpegError::UnexpectedEof)?;
        self.pos += 1;

        if byte == 0xFF {
            let next = *self.data.get(self.pos).ok_or(JpegError::UnexpectedEof)?;
            self.pos += 1;
            if next != 0x00 {
                // A marker inside the scan: remember it and feed 1-bits so a
                // pending Huffman lookup can still finish.
                self.marker_found = Some(next);
            }
        }

        self.buf = (self.buf << 8) | byte as u32;
        self.bits_left += 8;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_msb_first() {
        let data = [0xA5];
        let mut r = BitReader::new(&data, 0);
        assert_eq!(r.read_bits(4).unwrap(), 0b1010);
        assert_eq!(r.read_bits(4).unwrap(), 0b0101);
        assert!(matches!(r.read_bits(1), Err(JpegError::UnexpectedEof)));
    }

    #[test]
    fn unstuffs_ff00() {
        let data = [0xFF, 0x00, 0x80];
        let mut r = BitReader::new(&data, 0);
        assert_eq!(r.read_bits(12).unwrap(), 0xFF8);
    }

    #[test]
    fn flags_embedded_marker() {
        let data = [0xAB, 0xFF, 0xD9];
        let mut r = BitReader::new(&data, 0);
        assert_eq!(r.read_bits(8).unwrap(), 0xAB);
        let _ = r.read_bits(8);
        assert_eq!(r.marker_found(), Some(0xD9));
    }

    #[test]
    fn restart_marker_is_consumed() {
        let data = [0x12, 0xFF, 0xD3, 0x34];
        let mut r = BitReader::new(&data, 0);
        assert_eq!(r.read_bits(8).unwrap(), 0x12);
        assert_eq!(r.check_restart_marker().unwrap(), Some(3));
        assert_eq!(r.read_bits(8).unwrap(), 0x34);
    }

    #[test]
    fn peek_then_skip() {
        let data = [0xA5];
        let mut r = BitReader::new(&data, 0);
        assert_eq!(r.peek_bits(4).unwrap(), 0b1010);
        r.skip_bits(4);
        assert_eq!(r.read_bits(4).unwrap(), 0b0101);
    }
}
