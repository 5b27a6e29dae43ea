// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Marker segment walking.
//!
//! Walks the header segments of a JPEG stream up to the first SOS and returns
//! where entropy-coded data starts. Anything that is not baseline sequential
//! Huffman is refused here.

use super::error::{JpegError, Result};

pub const SOI: u8 = 0xD8;
pub const EOI: u8 = 0xD9;
pub const SOF0: u8 = 0xC0;
pub const SOF1: u8 = 0xC1;
pub const DHT: u8 = 0xC4;
pub const DQT: u8 = 0xDB;
pub const DRI: u8 = 0xDD;
pub const SOS: u8 = 0xDA;
pub const APP0: u8 = 0xE0;
/// Carries the scramble marker.
pub const APP11: u8 = 0xEB;
pub const COM: u8 = 0xFE;

/// A header segment kept verbatim.
#[derive(Debug, Clone)]
pub struct MarkerSegment {
    /// Marker byte without the 0xFF prefix.
    pub marker: u8,
    /// Body without marker or length field.
    pub data: Vec<u8>,
}

pub struct MarkerEntry {
    pub marker: u8,
    pub data: Vec<u8>,
    /// Offset of the 0xFF byte.
    pub offset: usize,
}

/// Collect markers up to and including the first SOS. Returns the entries and
/// the offset of the first scan byte (or the end of EOI for header-only data).
pub fn iterate_markers(data: &[u8]) -> Result<(Vec<MarkerEntry>, usize)> {
    if data.len() < 2 || data[0] != 0xFF || data[1] != SOI {
        return Err(JpegError::InvalidSoi);
    }
    let mut entries = vec![MarkerEntry { marker: SOI, data: Vec::new(), offset: 0 }];
    let mut pos = 2;

    loop {
        while pos < data.len() && data[pos] != 0xFF {
            pos += 1;
        }
        // Fill bytes.
        while pos + 1 < data.len() && data[pos + 1] == 0xFF {
            pos += 1;
        }
        if pos + 1 >= data.len() {
            return Err(JpegError::UnexpectedEof);
        }

        let offset = pos;
        let marker = data[pos + 1];
        pos += 2;

        if marker == 0x00 {
            continue;
        }
        if marker == EOI || (0xD0..=0xD7).contains(&marker) {
            entries.push(MarkerEntry { marker, data: Vec::new(), offset });
            if marker == EOI {
                return Ok((entries, pos));
            }
            continue;
        }
        if is_unsupported(marker) {
            return Err(JpegError::UnsupportedMarker(marker));
        }

        let len_bytes = data.get(pos..pos + 2).ok_or(JpegError::UnexpectedEof)?;
        let length = u16::from_be_bytes([len_bytes[0], len_bytes[1]]) as usize;
        if length < 2 || pos + length > data.len() {
            return Err(JpegError::InvalidMarkerData("invalid segment length"));
        }
        entries.push(MarkerEntry { marker, data: data[pos + 2..pos + length].to_vec(), offset });
        pos += length;

        if marker == SOS {
            return Ok((entries, pos));
        }
    }
}

/// Every SOF other than baseline (SOF0) and extended 8-bit Huffman (SOF1).
fn is_unsupported(marker: u8) -> bool {
    matches!(marker, 0xC2 | 0xC3 | 0xC5..=0xC7 | 0xC9..=0xCB | 0xCD..=0xCF)
}

/// SOS component selectors: (component id, DC table, AC table).
pub fn parse_sos(data: &[u8]) -> Result<Vec<(u8, u8, u8)>> {
    let (&count, rest) = data.split_first().ok_or(JpegError::InvalidMarkerData("empty SOS"))?;
    let count = count as usize;
    if count == 0 || count > 4 {
        return Err(JpegError::InvalidMarkerData("bad SOS component count"));
    }
    if rest.len() < count * 2 + 3 {
        return Err(JpegError::UnexpectedEof);
    }
    let selectors = rest[..count * 2]
        .chunks_exact(2)
        .map(|sel| (sel[0], sel[1] >> 4, sel[1] & 0x0F))
        .collect();

    // Sequential scans always cover the full spectrum with no approximation.
    let spectral = &rest[count * 2..count * 2 + 3];
    if spectral != [0, 63, 0] {
        return Err(JpegError::InvalidMarkerData("non-sequential scan parameters"));
    }
    Ok(selectors)
}

pub fn parse_dri(data: &[u8]) -> Result<u16> {
    match data {
        [hi, lo, ..] => Ok(u16::from_be_bytes([*hi, *lo])),
        _ => Err(JpegError::UnexpectedEof),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iterate_minimal_jpeg() {
        let data = [0xFF, 0xD8, 0xFF, 0xD9];
        let (entries, end_pos) = iterate_markers(&data).unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].marker, EOI);
        assert_eq!(end_pos, 4);
    }

    #[test]
    fn invalid_soi() {
        assert!(matches!(iterate_markers(&[0, 0]), Err(JpegError::InvalidSoi)));
    }

    #[test]
    fn progressive_is_rejected() {
        let data = [0xFF, 0xD8, 0xFF, 0xC2, 0x00, 0x0B, 8, 0, 8, 0, 8, 1, 1, 0x11, 0, 0xFF, 0xD9];
        assert!(matches!(iterate_markers(&data), Err(JpegError::UnsupportedMarker(0xC2))));
    }

    #[test]
    fn app_segment_is_collected() {
        let data = [0xFF, 0xD8, 0xFF, APP11, 0x00, 0x04, b'h', b'i', 0xFF, 0xD9];
        let (entries, _) = iterate_markers(&data).unwrap();
        assert_eq!(entries[1].marker, APP11);
        assert_eq!(entries[1].data, b"hi");
    }

    #[test]
    fn sos_selectors_and_parameters() {
        let data = [2, 1, 0x00, 2, 0x11, 0, 63, 0];
        assert_eq!(parse_sos(&data).unwrap(), vec![(1, 0, 0), (2, 1, 1)]);
        let progressive = [1, 1, 0x00, 1, 5, 0];
        assert!(parse_sos(&progressive).is_err());
    }

    #[test]
    fn dri_value() {
        assert_eq!(parse_dri(&[0x00, 0x0A]).unwrap(), 10);
        assert!(parse_dri(&[1]).is_err());
    }
}
