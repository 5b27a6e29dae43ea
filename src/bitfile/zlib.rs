// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Deflate-backed stream variant (zlib container).
//!
//! Used for PNG `IDAT` data. The writer compresses incrementally; the reader
//! inflates on demand so a scanline can be pulled out at a time.

use std::io::{Read, Write};

use flate2::read::ZlibDecoder;
use flate2::write::ZlibEncoder;
use flate2::Compression;

use crate::error::{Error, Result};

/// Internal buffer size for inflate reads.
pub const ZLIB_BUFLEN: usize = 32768;

/// Compression level, mirroring the classic zlib constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ZlibLevel {
    None,
    Fast,
    Best,
    #[default]
    Default,
}

impl ZlibLevel {
    fn compression(self) -> Compression {
        match self {
            Self::None => Compression::none(),
            Self::Fast => Compression::fast(),
            Self::Best => Compression::best(),
            Self::Default => Compression::default(),
        }
    }
}

/// Incremental zlib compressor.
pub struct ZlibWriter {
    enc: ZlibEncoder<Vec<u8>>,
}

impl ZlibWriter {
    pub fn new(level: ZlibLevel) -> Self {
        Self { enc: ZlibEncoder::new(Vec::new(), level.compression()) }
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.enc
            .write_all(bytes)
            .map_err(|_| Error::ImageOutputFailure("deflate failed"))
    }

    pub fn put_u8(&mut self, value: u8) -> Result<()> {
        self.write(&[value])
    }

    /// Finish the stream and return the compressed bytes.
    pub fn finish(self) -> Result<Vec<u8>> {
        self.enc
            .finish()
            .map_err(|_| Error::ImageOutputFailure("deflate failed"))
    }
}

/// Incremental zlib decompressor over a borrowed compressed buffer.
pub struct ZlibReader<'a> {
    dec: ZlibDecoder<&'a [u8]>,
}

impl<'a> ZlibReader<'a> {
    pub fn new(compressed: &'a [u8]) -> Self {
        Self { dec: ZlibDecoder::new(compressed) }
    }

    /// Fill `buf` completely or fail.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        self.dec.read_exact(buf).map_err(inflate_error)
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.try_reserve_exact(count)?;
        out.resize(count, 0);
        self.read_exact(&mut out)?;
        Ok(out)
    }

    pub fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(ZLIB_BUFLEN);
        self.dec.read_to_end(&mut out).map_err(inflate_error)?;
        Ok(out)
    }
}

fn inflate_error(e: std::io::Error) -> Error {
    Error::corrupt_image(format!("inflate failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compress_then_inflate_in_pieces() {
        let payload: Vec<u8> = (0..5000u32).map(|i| (i % 7) as u8).collect();
        let mut w = ZlibWriter::new(ZlibLevel::Best);
        w.write(&payload[..1234]).unwrap();
        w.put_u8(payload[1234]).unwrap();
        w.write(&payload[1235..]).unwrap();
        let packed = w.finish().unwrap();
        assert!(packed.len() < payload.len());

        let mut r = ZlibReader::new(&packed);
        let head = r.read_bytes(100).unwrap();
        assert_eq!(&head[..], &payload[..100]);
        let tail = r.read_to_end().unwrap();
        assert_eq!(&tail[..], &payload[100..]);
    }

    #[test]
    fn impossible_length_is_out_of_memory() {
        let packed = ZlibWriter::new(ZlibLevel::Best).finish().unwrap();
        let mut r = ZlibReader::new(&packed);
        assert!(matches!(r.read_bytes(usize::MAX), Err(Error::OutOfMemory)));
    }

    #[test]
    fn garbage_is_rejected() {
        let mut r = ZlibReader::new(&[1, 2, 3, 4]);
        assert!(matches!(r.read_bytes(10), Err(Error::InvalidSecureImage(_))));
    }
}
