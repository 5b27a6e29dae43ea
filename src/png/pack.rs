// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Write RGBA PNGs with a payload in the low bits of the color channels.
//!
//! Bit `i` of the stream `[u32 BE length][payload][random fill]` goes into
//! the low bit of channel `i % 3` (R, G, B) of pixel `i / 3` in raster
//! order. Alpha is never touched.

use image::RgbaImage;
use log::debug;

use super::chunk::{write_chunk, Header, IDAT, IEND, IHDR, MAX_IDAT_LEN, PNG_SIGNATURE};
use super::scanline::choose_filter;
use super::unpack::read_image;
use crate::bitfile::zlib::{ZlibLevel, ZlibWriter};
use crate::bitfile::BitFile;
use crate::crypto::fill_random;
use crate::error::{Error, Result};

/// Bytes of the big-endian length in front of the payload.
pub(crate) const LENGTH_PREFIX: usize = 4;

/// Payload bits stored per pixel.
pub fn bits_per_pixel() -> usize {
    3
}

/// Payload bytes a `width`×`height` PNG can carry.
pub fn max_data_for_image(width: u32, height: u32) -> usize {
    (width as usize * height as usize * bits_per_pixel() / 8).saturating_sub(LENGTH_PREFIX)
}

fn embed(img: &mut RgbaImage, payload: &[u8]) -> Result<()> {
    let capacity = max_data_for_image(img.width(), img.height());
    let slots = img.width() as usize * img.height() as usize * bits_per_pixel();
    if payload.len() > capacity || slots < LENGTH_PREFIX * 8 {
        return Err(Error::PackedDataOverflow { needed: payload.len(), capacity });
    }
    let mut stream = vec![0u8; slots.div_ceil(8)];
    stream[..LENGTH_PREFIX].copy_from_slice(&(payload.len() as u32).to_be_bytes());
    let end = LENGTH_PREFIX + payload.len();
    stream[LENGTH_PREFIX..end].copy_from_slice(payload);
    fill_random(&mut stream[end..]);

    let mut bits = BitFile::for_read(stream);
    for px in img.pixels_mut() {
        for channel in &mut px.0[..3] {
            let bit = bits.read_bits(1)? as u8;
            *channel = (*channel & !1) | bit;
        }
    }
    Ok(())
}

/// Serialize as 8-bit RGBA PNG.
pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>> {
    let header = Header::rgba(img.width(), img.height());
    let row_len = header.row_len();
    let raw = img.as_raw();

    let mut z = ZlibWriter::new(ZlibLevel::Default);
    let zero_row = vec![0u8; row_len];
    let mut filtered = vec![0u8; row_len];
    let mut scratch = vec![0u8; row_len];
    for (y, cur) in raw.chunks_exact(row_len).enumerate() {
        let prev = if y == 0 { &zero_row[..] } else { &raw[(y - 1) * row_len..y * row_len] };
        let filter = choose_filter(4, prev, cur, &mut filtered, &mut scratch);
        z.put_u8(filter as u8)?;
        z.write(&filtered)?;
    }
    let compressed = z.finish()?;

    let mut out = PNG_SIGNATURE.to_vec();
    write_chunk(&mut out, IHDR, &header.to_bytes())?;
    for part in compressed.chunks(MAX_IDAT_LEN) {
        write_chunk(&mut out, IDAT, part)?;
    }
    write_chunk(&mut out, IEND, &[])?;
    Ok(out)
}

/// Hide `payload` in a copy of `img` and encode it.
pub fn pack(img: &RgbaImage, payload: &[u8]) -> Result<Vec<u8>> {
    if img.width() == 0 || img.height() == 0 {
        return Err(Error::InvalidArgument("image dimensions must be non-zero"));
    }
    debug!(
        "png pack: {}x{}, {} of {} bytes",
        img.width(),
        img.height(),
        payload.len(),
        max_data_for_image(img.width(), img.height())
    );
    let mut carrier = img.clone();
    embed(&mut carrier, payload)?;
    encode_png(&carrier)
}

/// Replace the payload of an existing PNG.
pub fn repack(data: &[u8], payload: &[u8]) -> Result<Vec<u8>> {
    let mut img = read_image(data)?;
    embed(&mut img, payload)?;
    encode_png(&img)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn capacity_formula() {
        assert_eq!(max_data_for_image(512, 512), 512 * 512 * 3 / 8 - 4);
        assert_eq!(max_data_for_image(3, 3), 0);
        assert_eq!(max_data_for_image(4, 4), 2);
    }

    #[test]
    fn encode_decodes_exactly() {
        let img = RgbaImage::from_fn(17, 9, |x, y| Rgba([x as u8 * 13, y as u8 * 29, (x ^ y) as u8, 200]));
        let bytes = encode_png(&img).unwrap();
        assert_eq!(read_image(&bytes).unwrap(), img);
    }

    #[test]
    fn only_low_bits_change() {
        let img = RgbaImage::from_fn(8, 8, |x, y| Rgba([(x * 30) as u8, (y * 30) as u8, 77, 128]));
        let out = pack(&img, b"hi").unwrap();
        let back = read_image(&out).unwrap();
        for (a, b) in img.pixels().zip(back.pixels()) {
            for c in 0..3 {
                assert_eq!(a.0[c] & !1, b.0[c] & !1);
            }
            assert_eq!(a.0[3], b.0[3]);
        }
    }

    #[test]
    fn overflow_and_empty_images() {
        let img = RgbaImage::new(4, 4);
        assert!(matches!(pack(&img, b"abc"), Err(Error::PackedDataOverflow { needed: 3, capacity: 2 })));
        assert!(matches!(pack(&RgbaImage::new(0, 3), b""), Err(Error::InvalidArgument(_))));
        assert!(matches!(pack(&RgbaImage::new(2, 2), b""), Err(Error::PackedDataOverflow { .. })));
    }
}
