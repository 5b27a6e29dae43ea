// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Quantization and Huffman tables: zigzag ordering, the Annex K base tables
//! with IJG quality scaling, and DQT/DHT parsing and serialization.

use super::dct::QuantTable;
use super::error::{JpegError, Result};
use crate::bitfile::BitFile;

/// Zigzag index (0–63) → natural row-major index.
pub const ZIGZAG_TO_NATURAL: [usize; 64] = [
     0,  1,  8, 16,  9,  2,  3, 10,
    17, 24, 32, 25, 18, 11,  4,  5,
    12, 19, 26, 33, 40, 48, 41, 34,
    27, 20, 13,  6,  7, 14, 21, 28,
    35, 42, 49, 56, 57, 50, 43, 36,
    29, 22, 15, 23, 30, 37, 44, 51,
    58, 59, 52, 45, 38, 31, 39, 46,
    53, 60, 61, 54, 47, 55, 62, 63,
];

/// Inverse of [`ZIGZAG_TO_NATURAL`].
pub const NATURAL_TO_ZIGZAG: [usize; 64] = {
    let mut table = [0usize; 64];
    let mut i = 0;
    while i < 64 {
        table[ZIGZAG_TO_NATURAL[i]] = i;
        i += 1;
    }
    table
};

/// T.81 Table K.1, natural order.
pub const STD_LUMINANCE_QUANT: [u16; 64] = [
    16, 11, 10, 16,  24,  40,  51,  61,
    12, 12, 14, 19,  26,  58,  60,  55,
    14, 13, 16, 24,  40,  57,  69,  56,
    14, 17, 22, 29,  51,  87,  80,  62,
    18, 22, 37, 56,  68, 109, 103,  77,
    24, 35, 55, 64,  81, 104, 113,  92,
    49, 64, 78, 87, 103, 121, 120, 101,
    72, 92, 95, 98, 112, 100, 103,  99,
];

/// T.81 Table K.2, natural order.
pub const STD_CHROMINANCE_QUANT: [u16; 64] = [
    17, 18, 24, 47, 99, 99, 99, 99,
    18, 21, 26, 66, 99, 99, 99, 99,
    24, 26, 56, 99, 99, 99, 99, 99,
    47, 66, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
    99, 99, 99, 99, 99, 99, 99, 99,
];

/// Map a 0.0–1.0 quality to the IJG 1–100 scale.
pub fn quality_percent(quality: f32) -> u8 {
    if !quality.is_finite() {
        return 1;
    }
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

/// Scale a base table the way libjpeg's `jpeg_quality_scaling` does, with
/// baseline (8-bit) clamping.
pub fn scaled_quant_table(base: &[u16; 64], percent: u8) -> QuantTable {
    let q = percent.clamp(1, 100) as u32;
    let scale = if q < 50 { 5000 / q } else { 200 - q * 2 };
    let mut values = [0u16; 64];
    for (dst, &b) in values.iter_mut().zip(base) {
        *dst = ((b as u32 * scale + 50) / 100).clamp(1, 255) as u16;
    }
    QuantTable::new(values)
}

/// Parse a DQT segment body (after the length). One segment may hold
/// several tables.
pub fn parse_dqt(data: &[u8]) -> Result<Vec<(u8, QuantTable)>> {
    let mut tables = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        let pq_tq = data[pos];
        pos += 1;
        let precision = pq_tq >> 4;
        let table_id = pq_tq & 0x0F;
        if table_id > 3 {
            return Err(JpegError::InvalidQuantTableId(table_id));
        }

        let mut values = [0u16; 64];
        match precision {
            0 => {
                let raw = data.get(pos..pos + 64).ok_or(JpegError::UnexpectedEof)?;
                for (zi, &v) in raw.iter().enumerate() {
                    values[ZIGZAG_TO_NATURAL[zi]] = v as u16;
                }
                pos += 64;
            }
            1 => {
                let raw = data.get(pos..pos + 128).ok_or(JpegError::UnexpectedEof)?;
                for (zi, pair) in raw.chunks_exact(2).enumerate() {
                    values[ZIGZAG_TO_NATURAL[zi]] = u16::from_be_bytes([pair[0], pair[1]]);
                }
                pos += 128;
            }
            _ => return Err(JpegError::InvalidMarkerData("invalid DQT precision")),
        }
        if values.contains(&0) {
            return Err(JpegError::InvalidMarkerData("zero quantizer"));
        }
        tables.push((table_id, QuantTable::new(values)));
    }

    Ok(tables)
}

/// Append a complete DQT segment (marker, length, body).
pub fn write_dqt(out: &mut BitFile, table_id: u8, qt: &QuantTable) -> crate::Result<()> {
    let precision = if qt.values.iter().all(|&v| v <= 255) { 0u8 } else { 1u8 };
    out.begin_marker_segment(0xFF00 | super::marker::DQT as u16)?;
    out.put_u8((precision << 4) | (table_id & 0x0F))?;
    for &ni in &ZIGZAG_TO_NATURAL {
        if precision == 0 {
            out.put_u8(qt.values[ni] as u8)?;
        } else {
            out.put_u16(qt.values[ni])?;
        }
    }
    out.commit_marker_segment()
}

/// Parsed Huffman table specification.
#[derive(Debug, Clone)]
pub struct HuffmanSpec {
    /// 0 = DC, 1 = AC.
    pub class: u8,
    pub id: u8,
    /// Number of codes of each length 1–16.
    pub bits: [u8; 16],
    /// Symbols in order of increasing code length.
    pub huffval: Vec<u8>,
}

/// Parse a DHT segment body (after the length).
pub fn parse_dht(data: &[u8]) -> Result<Vec<HuffmanSpec>> {
    let mut specs = Vec::new();
    let mut pos = 0;

    while pos < data.len() {
        let tc_th = data[pos];
        pos += 1;
        let class = tc_th >> 4;
        let id = tc_th & 0x0F;
        if class > 1 || id > 3 {
            return Err(JpegError::InvalidHuffmanTableId(tc_th));
        }

        let counts = data.get(pos..pos + 16).ok_or(JpegError::UnexpectedEof)?;
        let mut bits = [0u8; 16];
        bits.copy_from_slice(counts);
        pos += 16;

        let total: usize = bits.iter().map(|&b| b as usize).sum();
        if total > 256 {
            return Err(JpegError::InvalidMarkerData("too many Huffman symbols"));
        }
        let huffval = data.get(pos..pos + total).ok_or(JpegError::UnexpectedEof)?.to_vec();
        pos += total;

        specs.push(HuffmanSpec { class, id, bits, huffval });
    }

    Ok(specs)
}

/// Append a complete DHT segment.
pub fn write_dht(out: &mut BitFile, spec: &HuffmanSpec) -> crate::Result<()> {
    out.begin_marker_segment(0xFF00 | super::marker::DHT as u16)?;
    out.put_u8((spec.class << 4) | (spec.id & 0x0F))?;
    out.write(&spec.bits)?;
    out.write(&spec.huffval)?;
    out.commit_marker_segment()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zigzag_tables_are_inverse() {
        for i in 0..64 {
            assert_eq!(NATURAL_TO_ZIGZAG[ZIGZAG_TO_NATURAL[i]], i);
        }
        assert_eq!(ZIGZAG_TO_NATURAL[2], 8);
    }

    #[test]
    fn parse_8bit_dqt() {
        let mut body = vec![0x00u8];
        body.extend(1..=64u8);
        let tables = parse_dqt(&body).unwrap();
        let (id, qt) = &tables[0];
        assert_eq!(*id, 0);
        assert_eq!(qt.values[0], 1);
        assert_eq!(qt.values[1], 2);
        assert_eq!(qt.values[8], 3);
    }

    #[test]
    fn dqt_written_and_parsed() {
        let mut values = [0u16; 64];
        for (i, v) in values.iter_mut().enumerate() {
            *v = (i * 5 + 1) as u16;
        }
        values[63] = 300;
        let mut out = BitFile::for_write();
        write_dqt(&mut out, 1, &QuantTable::new(values)).unwrap();
        let bytes = out.into_data().unwrap();
        assert_eq!(&bytes[..2], &[0xFF, 0xDB]);
        assert_eq!(u16::from_be_bytes([bytes[2], bytes[3]]) as usize, bytes.len() - 2);
        let tables = parse_dqt(&bytes[4..]).unwrap();
        assert_eq!(tables[0].0, 1);
        assert_eq!(tables[0].1.values, values);
    }

    #[test]
    fn zero_quantizer_rejected() {
        let body = [0u8; 65];
        assert!(parse_dqt(&body).is_err());
    }

    #[test]
    fn dht_written_and_parsed() {
        let spec = HuffmanSpec {
            class: 1,
            id: 0,
            bits: [0, 2, 1, 3, 3, 2, 4, 3, 5, 5, 4, 4, 0, 0, 1, 125],
            huffval: (0..162).collect(),
        };
        let mut out = BitFile::for_write();
        write_dht(&mut out, &spec).unwrap();
        let bytes = out.into_data().unwrap();
        let specs = parse_dht(&bytes[4..]).unwrap();
        assert_eq!(specs[0].class, 1);
        assert_eq!(specs[0].bits, spec.bits);
        assert_eq!(specs[0].huffval, spec.huffval);
    }

    #[test]
    fn quality_scaling_matches_libjpeg() {
        let q50 = scaled_quant_table(&STD_LUMINANCE_QUANT, 50);
        assert_eq!(q50.values, STD_LUMINANCE_QUANT);
        let q100 = scaled_quant_table(&STD_LUMINANCE_QUANT, 100);
        assert!(q100.values.iter().all(|&v| v == 1));
        let q1 = scaled_quant_table(&STD_CHROMINANCE_QUANT, 1);
        assert!(q1.values.iter().all(|&v| v == 255));
        // 75 → scale 50: 16 → 8.
        assert_eq!(scaled_quant_table(&STD_LUMINANCE_QUANT, 75).values[0], 8);
    }

    #[test]
    fn quality_percent_mapping() {
        assert_eq!(quality_percent(0.65), 65);
        assert_eq!(quality_percent(0.0), 1);
        assert_eq!(quality_percent(2.0), 100);
        assert_eq!(quality_percent(f32::NAN), 1);
    }
}
