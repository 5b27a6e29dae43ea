// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Decode PNG carriers and read their payload.

use image::RgbaImage;
use log::debug;

use super::chunk::{read_chunks, Header, IDAT, IEND, IHDR, PNG_SIGNATURE};
use super::pack::{max_data_for_image, LENGTH_PREFIX};
use super::scanline::{unfilter_row, Filter};
use crate::bitfile::zlib::ZlibReader;
use crate::bitfile::BitFile;
use crate::crypto::hash::{SecureHash, SecureHasher};
use crate::error::{Error, Result};

/// Bytes needed by [`is_data_png`].
pub const MIN_IDENTIFICATION_LEN: usize = 8;

pub fn is_data_png(data: &[u8]) -> bool {
    data.len() >= MIN_IDENTIFICATION_LEN && data[..8] == PNG_SIGNATURE
}

/// Decode an 8-bit RGB or RGBA PNG. RGB input gets opaque alpha.
pub fn read_image(data: &[u8]) -> Result<RgbaImage> {
    let chunks = read_chunks(data)?;
    let first = chunks.first().ok_or_else(|| Error::corrupt_image("empty png"))?;
    if first.kind != IHDR {
        return Err(Error::corrupt_image("png does not start with IHDR"));
    }
    let header = Header::parse(first.data)?;

    let mut compressed = Vec::new();
    for chunk in &chunks[1..] {
        match chunk.kind {
            IDAT => compressed.extend_from_slice(chunk.data),
            IEND => {}
            _ if chunk.is_critical() => {
                return Err(Error::corrupt_image(format!(
                    "unsupported critical chunk {}",
                    String::from_utf8_lossy(&chunk.kind)
                )))
            }
            _ => {}
        }
    }

    let row_len = header.row_len();
    let expected = (row_len + 1)
        .checked_mul(header.height as usize)
        .ok_or_else(|| Error::corrupt_image("png too large"))?;
    let mut raw = ZlibReader::new(&compressed).read_bytes(expected)?;

    let bpp = header.channels();
    let mut pixels = Vec::new();
    pixels.try_reserve_exact(header.width as usize * header.height as usize * 4)?;
    let mut prev = vec![0u8; row_len];
    for row in raw.chunks_exact_mut(row_len + 1) {
        let (filter, cur) = row.split_at_mut(1);
        unfilter_row(Filter::from_u8(filter[0])?, bpp, &prev, cur);
        if bpp == 4 {
            pixels.extend_from_slice(cur);
        } else {
            for px in cur.chunks_exact(3) {
                pixels.extend_from_slice(&[px[0], px[1], px[2], 255]);
            }
        }
        prev.copy_from_slice(cur);
    }
    RgbaImage::from_raw(header.width, header.height, pixels)
        .ok_or_else(|| Error::corrupt_image("png pixel buffer size mismatch"))
}

fn low_bits(img: &RgbaImage) -> impl Iterator<Item = u32> + '_ {
    img.pixels().flat_map(|p| [p.0[0] & 1, p.0[1] & 1, p.0[2] & 1]).map(u32::from)
}

/// Extract the payload; a declared length above `max_len` or the capacity
/// is rejected as `InvalidSecureImage`.
pub fn unpack(data: &[u8], max_len: usize) -> Result<Vec<u8>> {
    let img = read_image(data)?;
    let capacity = max_data_for_image(img.width(), img.height());
    if (img.width() as usize * img.height() as usize * 3) < LENGTH_PREFIX * 8 {
        return Err(Error::corrupt_image("image too small to carry a payload"));
    }
    let mut bits = low_bits(&img);
    let mut len = 0u32;
    for bit in bits.by_ref().take(LENGTH_PREFIX * 8) {
        len = (len << 1) | bit;
    }
    let len = len as usize;
    if len > max_len || len > capacity {
        return Err(Error::corrupt_image(format!("declared payload length {len} is out of range")));
    }
    let mut out = BitFile::for_write();
    for bit in bits.take(len * 8) {
        out.write_bits(bit, 1)?;
    }
    debug!("png unpack: {len} bytes");
    out.into_data()
}

/// SHA-256 over the dimensions and pixels with the payload bits masked.
pub fn hash_image_data(data: &[u8]) -> Result<[u8; 32]> {
    let img = read_image(data)?;
    let mut hasher = SecureHash::new();
    hasher.update(&img.width().to_be_bytes());
    hasher.update(&img.height().to_be_bytes());
    for row in img.as_raw().chunks(4 * img.width() as usize) {
        let masked: Vec<u8> = row
            .iter()
            .enumerate()
            .map(|(i, &b)| if i % 4 == 3 { b } else { b & !1 })
            .collect();
        hasher.update(&masked);
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(hasher.hash().as_bytes());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bitfile::zlib::{ZlibLevel, ZlibWriter};
    use crate::png::chunk::{write_chunk, COLOR_RGB};
    use crate::png::pack::{pack, repack};
    use image::Rgba;

    fn picture() -> RgbaImage {
        RgbaImage::from_fn(20, 12, |x, y| Rgba([(x * 12) as u8, (y * 20) as u8, 99, 255]))
    }

    #[test]
    fn identification() {
        assert!(is_data_png(&PNG_SIGNATURE));
        assert!(!is_data_png(&PNG_SIGNATURE[..7]));
        assert!(!is_data_png(&[0xFF, 0xD8, 0xFF, 0, 0, 0, 0, 0]));
    }

    #[test]
    fn pack_unpack_repack() {
        let out = pack(&picture(), b"png payload").unwrap();
        assert!(is_data_png(&out));
        assert_eq!(unpack(&out, 64).unwrap(), b"png payload");
        let again = repack(&out, b"other").unwrap();
        assert_eq!(unpack(&again, 64).unwrap(), b"other");
        assert_eq!(hash_image_data(&out).unwrap(), hash_image_data(&again).unwrap());
        assert!(matches!(unpack(&out, 4), Err(Error::InvalidSecureImage(_))));
    }

    #[test]
    fn reads_rgb_input() {
        let header = Header { color_type: COLOR_RGB, ..Header::rgba(2, 1) };
        let mut z = ZlibWriter::new(ZlibLevel::Fast);
        z.write(&[0, 1, 2, 3, 4, 5, 6]).unwrap();
        let mut file = PNG_SIGNATURE.to_vec();
        write_chunk(&mut file, IHDR, &header.to_bytes()).unwrap();
        write_chunk(&mut file, IDAT, &z.finish().unwrap()).unwrap();
        write_chunk(&mut file, IEND, &[]).unwrap();
        let img = read_image(&file).unwrap();
        assert_eq!(img.get_pixel(0, 0).0, [1, 2, 3, 255]);
        assert_eq!(img.get_pixel(1, 0).0, [4, 5, 6, 255]);
    }

    #[test]
    fn truncated_pixel_data_is_rejected() {
        let mut z = ZlibWriter::new(ZlibLevel::Fast);
        z.write(&[0, 1, 2, 3]).unwrap();
        let mut file = PNG_SIGNATURE.to_vec();
        write_chunk(&mut file, IHDR, &Header::rgba(4, 4).to_bytes()).unwrap();
        write_chunk(&mut file, IDAT, &z.finish().unwrap()).unwrap();
        write_chunk(&mut file, IEND, &[]).unwrap();
        assert!(matches!(read_image(&file), Err(Error::InvalidSecureImage(_))));
    }
}
