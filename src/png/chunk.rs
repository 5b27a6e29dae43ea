// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! PNG chunk framing: `[u32 BE length][type][data][u32 BE CRC]`.

use crate::error::{Error, Result};

pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

pub const IHDR: [u8; 4] = *b"IHDR";
pub const IDAT: [u8; 4] = *b"IDAT";
pub const IEND: [u8; 4] = *b"IEND";

/// Largest IDAT chunk the writer emits.
pub const MAX_IDAT_LEN: usize = 1 << 16;

/// PNG color types this module understands.
pub const COLOR_RGB: u8 = 2;
pub const COLOR_RGBA: u8 = 6;

/// One chunk, borrowed from the file it was read from.
#[derive(Debug, Clone, Copy)]
pub struct Chunk<'a> {
    pub kind: [u8; 4],
    pub data: &'a [u8],
}

impl Chunk<'_> {
    /// Critical chunks have an upper-case first letter.
    pub fn is_critical(&self) -> bool {
        self.kind[0].is_ascii_uppercase()
    }
}

fn chunk_crc(kind: &[u8; 4], data: &[u8]) -> u32 {
    let mut h = crc32fast::Hasher::new();
    h.update(kind);
    h.update(data);
    h.finalize()
}

/// Append one chunk to `out`.
pub fn write_chunk(out: &mut Vec<u8>, kind: [u8; 4], data: &[u8]) -> Result<()> {
    let len = u32::try_from(data.len()).map_err(|_| Error::ImageOutputFailure("png chunk too large"))?;
    out.extend_from_slice(&len.to_be_bytes());
    out.extend_from_slice(&kind);
    out.extend_from_slice(data);
    out.extend_from_slice(&chunk_crc(&kind, data).to_be_bytes());
    Ok(())
}

/// Split a PNG file into chunks, checking the signature and every CRC.
/// Stops after IEND; a file without one is rejected.
pub fn read_chunks(data: &[u8]) -> Result<Vec<Chunk<'_>>> {
    if data.len() < PNG_SIGNATURE.len() || data[..8] != PNG_SIGNATURE {
        return Err(Error::corrupt_image("missing png signature"));
    }
    let mut pos = PNG_SIGNATURE.len();
    let mut chunks = Vec::new();
    loop {
        if data.len() - pos < 12 {
            return Err(Error::corrupt_image("truncated png chunk"));
        }
        let len = u32::from_be_bytes([data[pos], data[pos + 1], data[pos + 2], data[pos + 3]]) as usize;
        let kind = [data[pos + 4], data[pos + 5], data[pos + 6], data[pos + 7]];
        let body_start = pos + 8;
        if len > data.len() - body_start - 4 {
            return Err(Error::corrupt_image("png chunk overruns file"));
        }
        let body = &data[body_start..body_start + len];
        let crc_at = body_start + len;
        let stored = u32::from_be_bytes([data[crc_at], data[crc_at + 1], data[crc_at + 2], data[crc_at + 3]]);
        if stored != chunk_crc(&kind, body) {
            return Err(Error::corrupt_image(format!(
                "bad crc in {} chunk",
                String::from_utf8_lossy(&kind)
            )));
        }
        chunks.push(Chunk { kind, data: body });
        pos = crc_at + 4;
        if kind == IEND {
            return Ok(chunks);
        }
    }
}

/// Decoded IHDR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub width: u32,
    pub height: u32,
    pub bit_depth: u8,
    pub color_type: u8,
    pub interlace: u8,
}

impl Header {
    pub fn rgba(width: u32, height: u32) -> Self {
        Self { width, height, bit_depth: 8, color_type: COLOR_RGBA, interlace: 0 }
    }

    pub fn to_bytes(&self) -> [u8; 13] {
        let mut b = [0u8; 13];
        b[..4].copy_from_slice(&self.width.to_be_bytes());
        b[4..8].copy_from_slice(&self.height.to_be_bytes());
        b[8] = self.bit_depth;
        b[9] = self.color_type;
        // compression 0, filter method 0
        b[12] = self.interlace;
        b
    }

    /// Parse and restrict to 8-bit RGB/RGBA without interlacing.
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() != 13 {
            return Err(Error::corrupt_image("bad IHDR length"));
        }
        let width = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        let height = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let h = Self { width, height, bit_depth: data[8], color_type: data[9], interlace: data[12] };
        if width == 0 || height == 0 || width > i32::MAX as u32 || height > i32::MAX as u32 {
            return Err(Error::corrupt_image("bad png dimensions"));
        }
        if data[10] != 0 || data[11] != 0 {
            return Err(Error::corrupt_image("unknown png compression or filter method"));
        }
        if h.bit_depth != 8 || !matches!(h.color_type, COLOR_RGB | COLOR_RGBA) {
            return Err(Error::corrupt_image("only 8-bit RGB/RGBA png is supported"));
        }
        if h.interlace != 0 {
            return Err(Error::corrupt_image("interlaced png is not supported"));
        }
        Ok(h)
    }

    /// Bytes per pixel.
    pub fn channels(&self) -> usize {
        if self.color_type == COLOR_RGBA { 4 } else { 3 }
    }

    /// Unfiltered bytes in one scanline (without the filter byte).
    pub fn row_len(&self) -> usize {
        self.width as usize * self.channels()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_file(header: &Header) -> Vec<u8> {
        let mut out = PNG_SIGNATURE.to_vec();
        write_chunk(&mut out, IHDR, &header.to_bytes()).unwrap();
        write_chunk(&mut out, IEND, &[]).unwrap();
        out
    }

    #[test]
    fn chunks_are_read_back() {
        let file = minimal_file(&Header::rgba(3, 2));
        let chunks = read_chunks(&file).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].kind, IHDR);
        assert!(chunks[0].is_critical());
        assert_eq!(Header::parse(chunks[0].data).unwrap(), Header::rgba(3, 2));
    }

    #[test]
    fn iend_crc_is_the_well_known_value() {
        let mut out = Vec::new();
        write_chunk(&mut out, IEND, &[]).unwrap();
        assert_eq!(&out[8..], &[0xAE, 0x42, 0x60, 0x82]);
    }

    #[test]
    fn corrupted_crc_is_rejected() {
        let mut file = minimal_file(&Header::rgba(3, 2));
        file[20] ^= 1;
        assert!(matches!(read_chunks(&file), Err(Error::InvalidSecureImage(_))));
    }

    #[test]
    fn missing_iend_is_rejected() {
        let mut file = PNG_SIGNATURE.to_vec();
        write_chunk(&mut file, IHDR, &Header::rgba(1, 1).to_bytes()).unwrap();
        assert!(read_chunks(&file).is_err());
        assert!(read_chunks(b"GIF89a").is_err());
    }

    #[test]
    fn unsupported_headers() {
        let mut b = Header::rgba(4, 4).to_bytes();
        b[8] = 16;
        assert!(Header::parse(&b).is_err());
        let mut b = Header::rgba(4, 4).to_bytes();
        b[12] = 1;
        assert!(Header::parse(&b).is_err());
        let mut b = Header::rgba(4, 4).to_bytes();
        b[9] = COLOR_RGB;
        assert_eq!(Header::parse(&b).unwrap().channels(), 3);
    }
}
