// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Huffman coding: decode/encode lookup tables, value categories, and
//! optimal table construction from symbol statistics.

use std::collections::VecDeque;

use super::bitio::BitReader;
use super::error::{JpegError, Result};
use super::tables::HuffmanSpec;

/// Two-level decode table: an 8-bit fast lookup, then a linear scan of the
/// longer codes.
pub struct HuffmanDecodeTable {
    /// Indexed by the next 8 bits: (symbol, length); length 0 = slow path.
    fast: [(u8, u8); 256],
    /// Codes longer than 8 bits: (code, length, symbol).
    slow: Vec<(u16, u8, u8)>,
    max_len: u8,
}

impl HuffmanDecodeTable {
    /// Build from DHT counts (`bits[i]` = codes of length i+1) and symbols.
    pub fn build(spec: &HuffmanSpec) -> Result<Self> {
        let mut fast = [(0u8, 0u8); 256];
        let mut slow = Vec::new();
        let mut max_len = 0u8;
        let mut code: u32 = 0;
        let mut si = 0;

        for length in 1..=16u8 {
            for _ in 0..spec.bits[(length - 1) as usize] {
                let symbol = *spec
                    .huffval
                    .get(si)
                    .ok_or(JpegError::InvalidMarkerData("DHT symbol count mismatch"))?;
                si += 1;
                max_len = length;
                if code >= (1u32 << length) {
                    return Err(JpegError::InvalidMarkerData("DHT code space overflow"));
                }
                if length <= 8 {
                    let base = (code << (8 - length)) as usize;
                    let fill = 1usize << (8 - length);
                    fast[base..base + fill].fill((symbol, length));
                } else {
                    slow.push((code as u16, length, symbol));
                }
                code += 1;
            }
            code <<= 1;
        }

        Ok(Self { fast, slow, max_len })
    }

    pub fn decode(&self, reader: &mut BitReader) -> Result<u8> {
        let peek_len = 8.min(self.max_len.max(1));
        let peek = reader.peek_bits(peek_len)?;
        let idx = if self.max_len >= 8 { peek as usize } else { (peek << (8 - self.max_len)) as usize };

        let (symbol, length) = self.fast[idx];
        if length > 0 {
            reader.skip_bits(length);
            return Ok(symbol);
        }
        for &(code, length, symbol) in &self.slow {
            if reader.peek_bits(length)? == code {
                reader.skip_bits(length);
                return Ok(symbol);
            }
        }
        Err(JpegError::HuffmanDecode)
    }
}

/// Symbol → (code, length). Length 0 means "no code".
pub struct HuffmanEncodeTable {
    table: [(u16, u8); 256],
}

impl HuffmanEncodeTable {
    pub fn build(spec: &HuffmanSpec) -> Self {
        let mut table = [(0u16, 0u8); 256];
        let mut code: u32 = 0;
        let mut symbols = spec.huffval.iter();

        for length in 1..=16u8 {
            for _ in 0..spec.bits[(length - 1) as usize] {
                if let Some(&symbol) = symbols.next() {
                    table[symbol as usize] = (code as u16, length);
                }
                code += 1;
            }
            code <<= 1;
        }
        Self { table }
    }

    pub fn encode(&self, symbol: u8) -> Result<(u16, u8)> {
        match self.table[symbol as usize] {
            (_, 0) => Err(JpegError::InvalidMarkerData("Huffman table missing code for symbol")),
            hit => Ok(hit),
        }
    }
}

/// Undo the "additional bits" encoding of T.81 Table F.1.
pub fn extend_sign(value: u16, bits: u8) -> i16 {
    if bits == 0 {
        return 0;
    }
    let half = 1i32 << (bits - 1);
    if (value as i32) < half {
        (value as i32 - (1i32 << bits) + 1) as i16
    } else {
        value as i16
    }
}

/// Split a value into (additional bits, category).
pub fn encode_value(value: i16) -> (u16, u8) {
    if value == 0 {
        return (0, 0);
    }
    let size = 16 - value.unsigned_abs().leading_zeros() as u8;
    // Negative values use one's complement.
    let bits = if value > 0 { value as u16 } else { (value as i32 - 1) as u16 };
    (bits & ((1u32 << size) - 1) as u16, size)
}

/// Optimal Huffman spec from symbol frequencies (T.81 Annex K.2, K.3).
///
/// A pseudo-symbol with frequency 1 is added before building the tree, as
/// libjpeg does, so no real symbol gets the all-ones code and the length
/// limiting step always finds a donor.
pub fn build_huffman_spec(class: u8, id: u8, freq: &[u32]) -> HuffmanSpec {
    let mut symbols: Vec<(u16, u32)> = freq
        .iter()
        .enumerate()
        .filter(|&(_, &f)| f > 0)
        .map(|(sym, &f)| (sym as u16, f))
        .collect();

    if symbols.is_empty() {
        symbols.push((0, 1));
    }
    if symbols.len() == 1 {
        let mut bits = [0u8; 16];
        bits[0] = 1;
        return HuffmanSpec { class, id, bits, huffval: vec![symbols[0].0 as u8] };
    }

    symbols.push((256, 1));
    let n = symbols.len();
    // Ties broken by symbol so the pseudo-symbol sorts last.
    symbols.sort_by_key(|&(sym, f)| (f, sym));

    // Two-queue merge.
    let total_nodes = 2 * n - 1;
    let mut parent = vec![0usize; total_nodes];
    let mut leaves: VecDeque<(u64, usize)> =
        symbols.iter().enumerate().map(|(idx, &(_, f))| (f as u64, idx)).collect();
    let mut merged: VecDeque<(u64, usize)> = VecDeque::new();

    fn pick_min(a: &mut VecDeque<(u64, usize)>, b: &mut VecDeque<(u64, usize)>) -> (u64, usize) {
        let take_a = match (a.front(), b.front()) {
            (Some(x), Some(y)) => x.0 <= y.0,
            (Some(_), None) => true,
            _ => false,
        };
        let q = if take_a { a } else { b };
        q.pop_front().unwrap_or((0, 0))
    }

    for next in n..total_nodes {
        let (f1, i1) = pick_min(&mut leaves, &mut merged);
        let (f2, i2) = pick_min(&mut leaves, &mut merged);
        parent[i1] = next;
        parent[i2] = next;
        merged.push_back((f1 + f2, next));
    }

    let root = total_nodes - 1;
    let mut code_lengths: Vec<u8> = (0..n)
        .map(|leaf| {
            let mut depth = 0u8;
            let mut node = leaf;
            while node != root {
                node = parent[node];
                depth += 1;
            }
            depth
        })
        .collect();

    // Annex K.3 Adjust_BITS.
    let max_len = code_lengths.iter().copied().max().unwrap_or(0) as usize;
    if max_len > 16 {
        let mut count = vec![0u32; max_len + 1];
        for &len in &code_lengths {
            count[len as usize] += 1;
        }
        let mut i = max_len;
        while i > 16 {
            while count[i] > 0 {
                let mut j = i - 2;
                while j > 0 && count[j] == 0 {
                    j -= 1;
                }
                if j == 0 {
                    count[16] += count[i];
                    count[i] = 0;
                    break;
                }
                count[i] -= 2;
                count[i - 1] += 1;
                count[j + 1] += 2;
                count[j] -= 1;
            }
            i -= 1;
        }
        // Longest codes go to the least frequent symbols (front of the list).
        let mut pos = 0;
        for len in (1..=16u8).rev() {
            for _ in 0..count[len as usize] {
                code_lengths[pos] = len;
                pos += 1;
            }
        }
    }

    let mut sym_len: Vec<(u16, u8)> =
        symbols.iter().zip(&code_lengths).map(|(&(sym, _), &len)| (sym, len)).collect();
    sym_len.sort_by_key(|&(sym, len)| (len, sym));

    let mut bits = [0u8; 16];
    let mut huffval = Vec::with_capacity(n);
    for (sym, len) in sym_len {
        if sym == 256 || len == 0 || len > 16 {
            continue;
        }
        bits[(len - 1) as usize] += 1;
        huffval.push(sym as u8);
    }
    HuffmanSpec { class, id, bits, huffval }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lum_dc() -> HuffmanSpec {
        HuffmanSpec {
            class: 0,
            id: 0,
            bits: [0, 1, 5, 1, 1, 1, 1, 1, 1, 0, 0, 0, 0, 0, 0, 0],
            huffval: (0..12).collect(),
        }
    }

    fn decode_one(enc: &HuffmanEncodeTable, dec: &HuffmanDecodeTable, sym: u8) -> u8 {
        let (code, len) = enc.encode(sym).unwrap();
        let shifted = (code as u32) << (32 - len);
        let mut stuffed = Vec::new();
        for b in shifted.to_be_bytes() {
            stuffed.push(b);
            if b == 0xFF {
                stuffed.push(0x00);
            }
        }
        let mut reader = BitReader::new(&stuffed, 0);
        dec.decode(&mut reader).unwrap()
    }

    #[test]
    fn standard_table_encodes_and_decodes() {
        let spec = lum_dc();
        let enc = HuffmanEncodeTable::build(&spec);
        let dec = HuffmanDecodeTable::build(&spec).unwrap();
        for &sym in &spec.huffval {
            assert_eq!(decode_one(&enc, &dec, sym), sym);
        }
        assert!(enc.encode(200).is_err());
    }

    #[test]
    fn overfull_table_is_rejected() {
        let spec = HuffmanSpec { class: 0, id: 0, bits: [3, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0], huffval: vec![0, 1, 2] };
        assert!(HuffmanDecodeTable::build(&spec).is_err());
    }

    #[test]
    fn value_categories() {
        assert_eq!(extend_sign(0, 1), -1);
        assert_eq!(extend_sign(1, 1), 1);
        assert_eq!(extend_sign(0, 3), -7);
        assert_eq!(extend_sign(4, 3), 4);
        for v in -1023i16..=1023 {
            let (bits, size) = encode_value(v);
            assert_eq!(extend_sign(bits, size), v);
        }
    }

    #[test]
    fn optimal_spec_codes_every_used_symbol() {
        let mut freq = vec![0u32; 256];
        for (i, f) in freq.iter_mut().enumerate().take(162) {
            *f = (i as u32 % 17) * 1000 + 1;
        }
        let spec = build_huffman_spec(1, 0, &freq);
        assert_eq!(spec.huffval.len(), 162);
        let enc = HuffmanEncodeTable::build(&spec);
        let dec = HuffmanDecodeTable::build(&spec).unwrap();
        for sym in 0..162u8 {
            assert_eq!(decode_one(&enc, &dec, sym), sym);
        }
    }

    #[test]
    fn skewed_frequencies_stay_within_16_bits() {
        // Fibonacci-like weights force a deep tree.
        let mut freq = vec![0u32; 256];
        let (mut a, mut b) = (1u32, 1u32);
        for f in freq.iter_mut().take(30) {
            *f = a;
            let c = a.saturating_add(b);
            a = b;
            b = c;
        }
        let spec = build_huffman_spec(1, 1, &freq);
        assert_eq!(spec.huffval.len(), 30);
        assert!(HuffmanDecodeTable::build(&spec).is_ok());
    }

    #[test]
    fn single_symbol_gets_one_bit_code() {
        let mut freq = vec![0u32; 256];
        freq[0] = 10;
        let spec = build_huffman_spec(0, 0, &freq);
        assert_eq!(spec.bits[0], 1);
        assert_eq!(spec.huffval, vec![0]);
    }
}
