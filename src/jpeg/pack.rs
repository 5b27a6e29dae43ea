// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Encode pixels plus payload into a baseline JPEG.
//!
//! Two quantization tables are in play per component class. The *effective*
//! table is the IJG-scaled Annex K table for the requested quality and
//! decides how much detail each coefficient keeps. The *container* table
//! written to DQT equals it except for a 1 at every slot position, so slot
//! values are stored in unit steps and their low bit is free for payload
//! while decoders still reconstruct the right magnitude.

use image::RgbaImage;
use log::debug;

use super::dct::{DctGrid, QuantTable};
use super::fdct::{encode_plane, rgba_to_planes, DctMethod};
use super::frame::FrameInfo;
use super::marker::{MarkerSegment, APP0, APP11};
use super::slots::{capacity_for_slots, embed_payload, embedded_group_size, SCRAMBLE_TAG, SCRAMBLE_VERSION, SLOT_NATURAL};
use super::tables::{quality_percent, scaled_quant_table, STD_CHROMINANCE_QUANT, STD_LUMINANCE_QUANT};
use super::JpegImage;
use crate::error::{Error, Result};
use crate::scrambler::ScramblerKey;

/// JFIF 1.01, no thumbnail, 1:1 aspect.
const JFIF_APP0: &[u8] = &[b'J', b'F', b'I', b'F', 0, 1, 1, 0, 0, 1, 0, 1, 0, 0];

/// Quality used for messaging carriers when the caller does not choose one.
pub fn default_quality_for_messaging() -> f32 {
    0.65
}

/// Payload bytes a `width`×`height` image packed by [`pack`] can carry.
pub fn max_data_for_image(width: u32, height: u32) -> usize {
    let blocks = width.div_ceil(8) as usize * height.div_ceil(8) as usize;
    capacity_for_slots(blocks * 3 * embedded_group_size())
}

pub(crate) fn check_dimensions(width: u32, height: u32) -> Result<(u16, u16)> {
    match (u16::try_from(width), u16::try_from(height)) {
        (Ok(w), Ok(h)) if w > 0 && h > 0 => Ok((w, h)),
        _ => Err(Error::InvalidArgument("image dimensions must be 1..=65535")),
    }
}

fn container_table(effective: &QuantTable) -> QuantTable {
    let mut values = effective.values;
    for &i in &SLOT_NATURAL {
        values[i] = 1;
    }
    QuantTable::new(values)
}

pub(crate) fn scramble_segment() -> Vec<u8> {
    let mut data = SCRAMBLE_TAG.to_vec();
    data.push(SCRAMBLE_VERSION);
    data
}

/// Encode `img` at `quality` (0.0–1.0) and hide `payload` in it.
///
/// With a scrambler key the slot order is permuted and the file is tagged,
/// so unpacking needs the same key.
pub fn pack(
    img: &RgbaImage,
    quality: f32,
    payload: &[u8],
    key: Option<&ScramblerKey>,
    method: DctMethod,
) -> Result<Vec<u8>> {
    let (w, h) = check_dimensions(img.width(), img.height())?;
    let capacity = max_data_for_image(img.width(), img.height());
    if payload.len() > capacity {
        return Err(Error::PackedDataOverflow { needed: payload.len(), capacity });
    }

    let percent = quality_percent(quality);
    let luma = scaled_quant_table(&STD_LUMINANCE_QUANT, percent);
    let chroma = scaled_quant_table(&STD_CHROMINANCE_QUANT, percent);
    debug!("jpeg pack: {w}x{h}, quality {percent}, {method:?}, {} of {capacity} bytes, scrambled={}",
        payload.len(), key.is_some());

    let frame = FrameInfo::ycbcr_444(w, h)?;
    let planes = rgba_to_planes(img);
    let mut grids = Vec::with_capacity(3);
    for (idx, plane) in planes.iter().enumerate() {
        let mut grid = DctGrid::new(frame.blocks_wide(idx), frame.blocks_tall(idx));
        let effective = if idx == 0 { &luma } else { &chroma };
        encode_plane(plane, &mut grid, method, effective);
        grids.push(grid);
    }

    let mut quant: [Option<QuantTable>; 4] = Default::default();
    quant[0] = Some(container_table(&luma));
    quant[1] = Some(container_table(&chroma));
    let mut segments = vec![MarkerSegment { marker: APP0, data: JFIF_APP0.to_vec() }];
    if key.is_some() {
        segments.push(MarkerSegment { marker: APP11, data: scramble_segment() });
    }

    let mut image = JpegImage::from_parts(frame, quant, grids, segments)?;
    embed_payload(image.grids_mut(), payload, key)?;
    image.to_bytes()
}

/// Replace the payload of an existing JPEG, keeping its coefficients.
///
/// The image keeps its scramble state: a tagged image needs `key` and is
/// re-embedded scrambled, an untagged one is re-embedded in plain order and
/// `key` is ignored.
pub fn repack(data: &[u8], payload: &[u8], key: Option<&ScramblerKey>) -> Result<Vec<u8>> {
    let mut image = JpegImage::from_bytes(data)?;
    let scrambled = image.find_segment(APP11, SCRAMBLE_TAG).is_some();
    let key = match (scrambled, key) {
        (true, None) => return Err(Error::AuthRequired),
        (true, Some(k)) => Some(k),
        (false, _) => None,
    };
    debug!("jpeg repack: {} bytes, scrambled={scrambled}", payload.len());
    embed_payload(image.grids_mut(), payload, key)?;
    image.to_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn gradient(w: u32, h: u32) -> RgbaImage {
        RgbaImage::from_fn(w, h, |x, y| Rgba([(x * 7 % 256) as u8, (y * 5 % 256) as u8, ((x + y) % 256) as u8, 255]))
    }

    #[test]
    fn capacity_formula() {
        assert_eq!(max_data_for_image(512, 512), 9212);
        assert_eq!(max_data_for_image(8, 8), 0);
        assert_eq!(max_data_for_image(9, 8), (2 * 18) / 8 - 4);
    }

    #[test]
    fn dimensions_are_checked() {
        assert!(check_dimensions(0, 5).is_err());
        assert!(check_dimensions(70_000, 5).is_err());
        assert_eq!(check_dimensions(3, 4).unwrap(), (3, 4));
    }

    #[test]
    fn container_table_has_unit_slots() {
        let eff = scaled_quant_table(&STD_LUMINANCE_QUANT, 65);
        let c = container_table(&eff);
        for i in 0..64 {
            if SLOT_NATURAL.contains(&i) {
                assert_eq!(c.values[i], 1);
            } else {
                assert_eq!(c.values[i], eff.values[i]);
            }
        }
    }

    #[test]
    fn output_starts_with_jfif() {
        let out = pack(&gradient(24, 16), 0.65, b"x", None, DctMethod::default()).unwrap();
        assert_eq!(&out[..4], &[0xFF, 0xD8, 0xFF, 0xE0]);
        assert_eq!(&out[6..11], b"JFIF\0");
    }

    #[test]
    fn oversize_payload_is_rejected() {
        let img = gradient(16, 16);
        let cap = max_data_for_image(16, 16);
        let err = pack(&img, 0.5, &vec![1u8; cap + 1], None, DctMethod::default()).unwrap_err();
        assert!(matches!(err, Error::PackedDataOverflow { needed, capacity } if needed == cap + 1 && capacity == cap));
    }

    #[test]
    fn repack_of_scrambled_image_needs_key() {
        let key = ScramblerKey::generate();
        let out = pack(&gradient(32, 32), 0.7, b"one", Some(&key), DctMethod::PracticalFast).unwrap();
        assert!(matches!(repack(&out, b"two", None), Err(Error::AuthRequired)));
        let again = repack(&out, b"two", Some(&key)).unwrap();
        assert_eq!(super::super::unpack(&again, 64, Some(&key)).unwrap(), b"two");
    }
}
