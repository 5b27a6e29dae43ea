// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Marker-oriented, bit-granular byte stream.
//!
//! [`BitFile`] is the one stream type shared by the JPEG packer (marker
//! segments plus byte-stuffed entropy data), the payload embedder (bit-by-bit
//! reads of the framed ciphertext) and the property serializer (plain
//! big-endian fields). Bits are always MSB-first.
//!
//! A file is either in write mode ([`BitFile::for_write`]) or read mode
//! ([`BitFile::for_read`]); calling the other side's operations is an error.
//!
//! Inside an entropy-coded segment every emitted `0xFF` byte is followed by a
//! stuffed `0x00`, and committing the segment pads the last byte with 1-bits,
//! exactly as JPEG requires. Outside of one, partial bytes are zero-padded.

pub mod zlib;

use zeroize::Zeroize;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Write,
    Read,
}

/// Bit-level reader/writer over an owned byte buffer.
pub struct BitFile {
    data: Vec<u8>,
    mode: Mode,
    /// Pending output bits, right-aligned.
    acc: u8,
    acc_bits: u8,
    /// Offset of the length field of the open marker segment.
    segment_len_at: Option<usize>,
    in_entropy: bool,
    /// Read cursor in bits.
    cursor: usize,
}

impl BitFile {
    /// Empty file ready for writing.
    pub fn for_write() -> Self {
        Self {
            data: Vec::new(),
            mode: Mode::Write,
            acc: 0,
            acc_bits: 0,
            segment_len_at: None,
            in_entropy: false,
            cursor: 0,
        }
    }

    /// Read over an owned copy of `data`.
    pub fn for_read(data: Vec<u8>) -> Self {
        Self {
            data,
            mode: Mode::Read,
            acc: 0,
            acc_bits: 0,
            segment_len_at: None,
            in_entropy: false,
            cursor: 0,
        }
    }

    // ---------------------------------------------------------------------
    // Write side
    // ---------------------------------------------------------------------

    /// Number of complete bytes written so far.
    pub fn bytes_written(&self) -> usize {
        self.data.len()
    }

    /// Standalone two-byte marker (e.g. `0xFFD8`). Must be byte aligned and
    /// outside of any segment.
    pub fn write_marker(&mut self, marker: u16) -> Result<()> {
        self.ensure_write()?;
        if self.in_entropy || self.segment_len_at.is_some() {
            return Err(Error::InvalidArgument("marker inside an open segment"));
        }
        self.ensure_aligned()?;
        self.data.extend_from_slice(&marker.to_be_bytes());
        Ok(())
    }

    /// Start a length-prefixed marker segment. The length is back-patched by
    /// [`commit_marker_segment`](Self::commit_marker_segment).
    pub fn begin_marker_segment(&mut self, marker: u16) -> Result<()> {
        self.write_marker(marker)?;
        self.segment_len_at = Some(self.data.len());
        self.data.extend_from_slice(&[0, 0]);
        Ok(())
    }

    pub fn commit_marker_segment(&mut self) -> Result<()> {
        self.ensure_write()?;
        let at = self
            .segment_len_at
            .take()
            .ok_or(Error::InvalidArgument("no marker segment is open"))?;
        self.ensure_aligned()?;
        let len = self.data.len() - at;
        if len > u16::MAX as usize {
            return Err(Error::InvalidArgument("marker segment longer than 65535 bytes"));
        }
        self.data[at..at + 2].copy_from_slice(&(len as u16).to_be_bytes());
        Ok(())
    }

    pub fn put_u8(&mut self, value: u8) -> Result<()> {
        self.write_bits(value as u32, 8)
    }

    /// Big-endian 16-bit word.
    pub fn put_u16(&mut self, value: u16) -> Result<()> {
        self.write_bits(value as u32, 16)
    }

    /// Big-endian 32-bit word.
    pub fn put_u32(&mut self, value: u32) -> Result<()> {
        self.write_bits(value, 32)
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        self.ensure_write()?;
        if self.acc_bits == 0 && !self.in_entropy {
            self.data.extend_from_slice(bytes);
            return Ok(());
        }
        for &b in bytes {
            self.write_bits(b as u32, 8)?;
        }
        Ok(())
    }

    pub fn begin_entropy_segment(&mut self) -> Result<()> {
        self.ensure_write()?;
        if self.in_entropy || self.segment_len_at.is_some() {
            return Err(Error::InvalidArgument("entropy segment inside an open segment"));
        }
        self.ensure_aligned()?;
        self.in_entropy = true;
        Ok(())
    }

    /// Pad the final byte with 1-bits and leave entropy mode.
    pub fn commit_entropy_segment(&mut self) -> Result<()> {
        self.ensure_write()?;
        if !self.in_entropy {
            return Err(Error::InvalidArgument("no entropy segment is open"));
        }
        if self.acc_bits > 0 {
            let pad = 8 - self.acc_bits;
            let byte = (self.acc << pad) | ((1u8 << pad) - 1);
            self.acc = 0;
            self.acc_bits = 0;
            self.emit(byte);
        }
        self.in_entropy = false;
        Ok(())
    }

    /// Write the low `count` bits (0–32) of `value`, MSB first.
    pub fn write_bits(&mut self, value: u32, count: u8) -> Result<()> {
        self.ensure_write()?;
        if count > 32 {
            return Err(Error::InvalidArgument("at most 32 bits per write"));
        }
        for i in (0..count).rev() {
            let bit = ((value >> i) & 1) as u8;
            self.acc = (self.acc << 1) | bit;
            self.acc_bits += 1;
            if self.acc_bits == 8 {
                let byte = self.acc;
                self.acc = 0;
                self.acc_bits = 0;
                self.emit(byte);
            }
        }
        Ok(())
    }

    /// Write the first `num_bits` bits of `buffer`, MSB first.
    pub fn write_bits_from_buffer(&mut self, buffer: &[u8], num_bits: usize) -> Result<()> {
        if num_bits > buffer.len() * 8 {
            return Err(Error::InvalidArgument("bit count exceeds buffer"));
        }
        let whole = num_bits / 8;
        self.write(&buffer[..whole])?;
        let rest = (num_bits % 8) as u8;
        if rest > 0 {
            self.write_bits((buffer[whole] >> (8 - rest)) as u32, rest)?;
        }
        Ok(())
    }

    /// Drop everything after the first `len` bytes, including pending bits.
    pub fn truncate_to(&mut self, len: usize) -> Result<()> {
        self.ensure_write()?;
        if len > self.data.len() {
            return Err(Error::InvalidArgument("cannot truncate beyond the end"));
        }
        if let Some(at) = self.segment_len_at {
            if len < at + 2 {
                self.segment_len_at = None;
            }
        }
        self.data[len..].zeroize();
        self.data.truncate(len);
        self.acc = 0;
        self.acc_bits = 0;
        Ok(())
    }

    /// Complete bytes written so far (pending bits excluded).
    pub fn file_data(&self) -> &[u8] {
        &self.data
    }

    /// Zero-pad pending bits and return all bytes written.
    pub fn flushed_file_data(&mut self) -> Result<&[u8]> {
        self.flush()?;
        Ok(&self.data)
    }

    /// Finish writing and take the bytes.
    pub fn into_data(mut self) -> Result<Vec<u8>> {
        if self.mode == Mode::Write {
            if self.in_entropy || self.segment_len_at.is_some() {
                return Err(Error::InvalidArgument("segment left open"));
            }
            self.flush()?;
        }
        Ok(std::mem::take(&mut self.data))
    }

    /// Wipe the buffer contents in place.
    pub fn zero_file_data(&mut self) {
        self.data.zeroize();
        self.acc = 0;
        self.acc_bits = 0;
        self.cursor = 0;
    }

    fn flush(&mut self) -> Result<()> {
        if self.in_entropy {
            return Err(Error::InvalidArgument("flush inside an entropy segment"));
        }
        if self.acc_bits > 0 {
            let byte = self.acc << (8 - self.acc_bits);
            self.acc = 0;
            self.acc_bits = 0;
            self.data.push(byte);
        }
        Ok(())
    }

    fn emit(&mut self, byte: u8) {
        self.data.push(byte);
        if self.in_entropy && byte == 0xFF {
            self.data.push(0x00);
        }
    }

    fn ensure_write(&self) -> Result<()> {
        if self.mode != Mode::Write {
            return Err(Error::InvalidArgument("file is open for reading"));
        }
        Ok(())
    }

    fn ensure_aligned(&self) -> Result<()> {
        if self.acc_bits != 0 {
            return Err(Error::InvalidArgument("stream is not byte aligned"));
        }
        Ok(())
    }

    // ---------------------------------------------------------------------
    // Read side
    // ---------------------------------------------------------------------

    pub fn bits_remaining(&self) -> usize {
        (self.data.len() * 8).saturating_sub(self.cursor)
    }

    pub fn is_eof(&self) -> bool {
        self.bits_remaining() == 0
    }

    /// Rewind to the first bit.
    pub fn reset(&mut self) {
        self.cursor = 0;
    }

    /// Move the read cursor by `delta` bits in either direction.
    pub fn seek_bits(&mut self, delta: isize) -> Result<()> {
        self.ensure_read()?;
        let target = self.cursor as isize + delta;
        if target < 0 || target as usize > self.data.len() * 8 {
            return Err(Error::EndOfStream);
        }
        self.cursor = target as usize;
        Ok(())
    }

    /// Read `count` bits (0–32), MSB first, right-aligned in the result.
    pub fn read_bits(&mut self, count: u8) -> Result<u32> {
        let v = self.peek_bits(count)?;
        self.cursor += count as usize;
        Ok(v)
    }

    pub fn peek_bits(&self, count: u8) -> Result<u32> {
        self.ensure_read()?;
        if count > 32 {
            return Err(Error::InvalidArgument("at most 32 bits per read"));
        }
        if (count as usize) > self.bits_remaining() {
            return Err(Error::EndOfStream);
        }
        let mut v = 0u32;
        let mut pos = self.cursor;
        for _ in 0..count {
            let bit = (self.data[pos / 8] >> (7 - (pos % 8))) & 1;
            v = (v << 1) | bit as u32;
            pos += 1;
        }
        Ok(v)
    }

    pub fn get_u8(&mut self) -> Result<u8> {
        Ok(self.read_bits(8)? as u8)
    }

    pub fn get_u16(&mut self) -> Result<u16> {
        Ok(self.read_bits(16)? as u16)
    }

    pub fn peek_u16(&self) -> Result<u16> {
        Ok(self.peek_bits(16)? as u16)
    }

    pub fn get_u32(&mut self) -> Result<u32> {
        self.read_bits(32)
    }

    /// Read `count` whole bytes starting at the current bit position.
    pub fn read_bytes(&mut self, count: usize) -> Result<Vec<u8>> {
        self.ensure_read()?;
        if count * 8 > self.bits_remaining() {
            return Err(Error::EndOfStream);
        }
        if self.cursor % 8 == 0 {
            let start = self.cursor / 8;
            self.cursor += count * 8;
            return Ok(self.data[start..start + count].to_vec());
        }
        (0..count).map(|_| self.get_u8()).collect()
    }

    /// Read exactly `num_bits` bits into a zero-padded byte buffer.
    pub fn read_bits_into(&mut self, num_bits: usize) -> Result<Vec<u8>> {
        if num_bits > self.bits_remaining() {
            return Err(Error::EndOfStream);
        }
        let (buf, _) = self.read_up_to(num_bits)?;
        Ok(buf)
    }

    /// Read up to `num_bits` bits, stopping early at end of stream. Returns the
    /// zero-padded bytes and the number of bits actually read.
    pub fn read_up_to(&mut self, num_bits: usize) -> Result<(Vec<u8>, usize)> {
        self.ensure_read()?;
        let n = num_bits.min(self.bits_remaining());
        let mut out = self.read_bytes(n / 8)?;
        let rest = (n % 8) as u8;
        if rest > 0 {
            let bits = self.read_bits(rest)? as u8;
            out.push(bits << (8 - rest));
        }
        Ok((out, n))
    }

    fn ensure_read(&self) -> Result<()> {
        if self.mode != Mode::Read {
            return Err(Error::InvalidArgument("file is open for writing"));
        }
        Ok(())
    }
}

impl Drop for BitFile {
    fn drop(&mut self) {
        self.data.zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn marker_segment_length_is_patched() {
        let mut f = BitFile::for_write();
        f.write_marker(0xFFD8).unwrap();
        f.begin_marker_segment(0xFFFE).unwrap();
        f.write(b"hi").unwrap();
        f.commit_marker_segment().unwrap();
        let out = f.into_data().unwrap();
        assert_eq!(out, vec![0xFF, 0xD8, 0xFF, 0xFE, 0x00, 0x04, b'h', b'i']);
    }

    #[test]
    fn entropy_segment_stuffs_and_pads() {
        let mut f = BitFile::for_write();
        f.begin_entropy_segment().unwrap();
        f.write_bits(0xFF, 8).unwrap();
        f.write_bits(0b110, 3).unwrap();
        f.commit_entropy_segment().unwrap();
        assert_eq!(f.into_data().unwrap(), vec![0xFF, 0x00, 0xDF]);
    }

    #[test]
    fn plain_bits_are_zero_padded() {
        let mut f = BitFile::for_write();
        f.write_bits(0b101, 3).unwrap();
        assert_eq!(f.into_data().unwrap(), vec![0b1010_0000]);
    }

    #[test]
    fn unaligned_marker_is_rejected() {
        let mut f = BitFile::for_write();
        f.write_bits(1, 1).unwrap();
        assert!(f.write_marker(0xFFD9).is_err());
    }

    #[test]
    fn read_words_and_bits() {
        let mut f = BitFile::for_read(vec![0xA5, 0x12, 0x34, 0xFF]);
        assert_eq!(f.read_bits(4).unwrap(), 0b1010);
        assert_eq!(f.read_bits(4).unwrap(), 0b0101);
        assert_eq!(f.peek_u16().unwrap(), 0x1234);
        assert_eq!(f.get_u16().unwrap(), 0x1234);
        assert_eq!(f.bits_remaining(), 8);
        assert_eq!(f.get_u8().unwrap(), 0xFF);
        assert!(f.is_eof());
        assert!(matches!(f.read_bits(1), Err(Error::EndOfStream)));
    }

    #[test]
    fn seek_and_reset() {
        let mut f = BitFile::for_read(vec![0b1000_0001]);
        f.seek_bits(7).unwrap();
        assert_eq!(f.read_bits(1).unwrap(), 1);
        f.seek_bits(-8).unwrap();
        assert_eq!(f.read_bits(1).unwrap(), 1);
        assert!(f.seek_bits(-5).is_err());
        f.reset();
        assert_eq!(f.bits_remaining(), 8);
    }

    #[test]
    fn read_up_to_stops_at_end() {
        let mut f = BitFile::for_read(vec![0xF0]);
        let (buf, n) = f.read_up_to(12).unwrap();
        assert_eq!(n, 8);
        assert_eq!(buf, vec![0xF0]);
    }

    #[test]
    fn unaligned_byte_reads() {
        let mut w = BitFile::for_write();
        w.write_bits(1, 1).unwrap();
        w.write(&[0xAB, 0xCD]).unwrap();
        let mut r = BitFile::for_read(w.into_data().unwrap());
        assert_eq!(r.read_bits(1).unwrap(), 1);
        assert_eq!(r.read_bytes(2).unwrap(), vec![0xAB, 0xCD]);
    }

    #[test]
    fn bits_from_buffer() {
        let mut w = BitFile::for_write();
        w.write_bits_from_buffer(&[0xAB, 0xC0], 12).unwrap();
        let mut r = BitFile::for_read(w.into_data().unwrap());
        assert_eq!(r.read_bits(12).unwrap(), 0xABC);
    }

    #[test]
    fn truncate_discards_tail() {
        let mut w = BitFile::for_write();
        w.write(&[1, 2, 3, 4]).unwrap();
        w.truncate_to(2).unwrap();
        assert_eq!(w.file_data(), &[1, 2]);
    }
}
