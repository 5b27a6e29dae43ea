// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Format-independent pack/unpack entry points.
//!
//! The format of an existing carrier is always detected from its leading
//! bytes. For new carriers the caller picks it through [`PackOptions`].

use image::RgbaImage;

use crate::error::{Error, Result};
use crate::jpeg::{self, DctMethod};
use crate::png;
use crate::scrambler::ScramblerKey;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ImageFormat {
    #[default]
    Jpeg,
    Png,
}

/// How a new carrier is produced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PackOptions {
    pub format: ImageFormat,
    /// JPEG quality in 0.0..=1.0. Ignored for PNG.
    pub quality: f32,
    /// Forward DCT used by the JPEG encoder. Ignored for PNG.
    pub dct: DctMethod,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            format: ImageFormat::Jpeg,
            quality: jpeg::default_quality_for_messaging(),
            dct: DctMethod::default(),
        }
    }
}

impl PackOptions {
    pub fn png() -> Self {
        Self { format: ImageFormat::Png, ..Self::default() }
    }
}

pub fn max_data_for_image(format: ImageFormat, width: u32, height: u32) -> usize {
    match format {
        ImageFormat::Jpeg => jpeg::max_data_for_image(width, height),
        ImageFormat::Png => png::max_data_for_image(width, height),
    }
}

/// Encode `img` with `payload` hidden in it. Scrambling is JPEG-only.
pub fn pack_image(
    img: &RgbaImage,
    payload: &[u8],
    options: &PackOptions,
    key: Option<&ScramblerKey>,
) -> Result<Vec<u8>> {
    match options.format {
        ImageFormat::Jpeg => jpeg::pack(img, options.quality, payload, key, options.dct),
        ImageFormat::Png if key.is_some() => Err(Error::InvalidArgument("png carriers cannot be scrambled")),
        ImageFormat::Png => png::pack(img, payload),
    }
}

fn require_format(data: &[u8]) -> Result<ImageFormat> {
    detect_format(data).ok_or_else(|| Error::corrupt_image("neither jpeg nor png"))
}

/// Extract the payload of a carrier in either format. The key only matters
/// for scrambled JPEGs.
pub fn unpack_image(data: &[u8], max_len: usize, key: Option<&ScramblerKey>) -> Result<Vec<u8>> {
    match require_format(data)? {
        ImageFormat::Jpeg => jpeg::unpack(data, max_len, key),
        ImageFormat::Png => png::unpack(data, max_len),
    }
}

/// A carrier decoded once for trying several keys. PNG payloads carry no
/// scrambling, so they are read right away.
pub enum Carrier {
    Jpeg(jpeg::Carrier),
    Png(Vec<u8>),
}

impl Carrier {
    pub fn parse(data: &[u8], max_len: usize) -> Result<Self> {
        Ok(match require_format(data)? {
            ImageFormat::Jpeg => Self::Jpeg(jpeg::Carrier::parse(data, max_len)?),
            ImageFormat::Png => Self::Png(png::unpack(data, max_len)?),
        })
    }

    pub fn is_scrambled(&self) -> bool {
        matches!(self, Self::Jpeg(c) if c.is_scrambled())
    }

    pub fn payload(&self, key: Option<&ScramblerKey>) -> Result<Vec<u8>> {
        match self {
            Self::Jpeg(c) => c.payload(key),
            Self::Png(payload) => Ok(payload.clone()),
        }
    }
}

/// Swap the payload of an existing carrier, keeping its format.
pub fn repack_image(data: &[u8], payload: &[u8], key: Option<&ScramblerKey>) -> Result<Vec<u8>> {
    match require_format(data)? {
        ImageFormat::Jpeg => jpeg::repack(data, payload, key),
        ImageFormat::Png => png::repack(data, payload),
    }
}

/// Payload-independent fingerprint of a carrier.
pub fn hash_image_data(data: &[u8]) -> Result<[u8; 32]> {
    match require_format(data)? {
        ImageFormat::Jpeg => jpeg::hash_image_data(data),
        ImageFormat::Png => png::hash_image_data(data),
    }
}

pub fn detect_format(data: &[u8]) -> Option<ImageFormat> {
    if jpeg::is_data_jpeg(data) {
        Some(ImageFormat::Jpeg)
    } else if png::is_data_png(data) {
        Some(ImageFormat::Png)
    } else {
        None
    }
}

pub fn is_data_jpeg(data: &[u8]) -> bool {
    jpeg::is_data_jpeg(data)
}

pub fn is_data_png(data: &[u8]) -> bool {
    png::is_data_png(data)
}

/// Bytes needed before [`detect_format`] can give a definite answer.
pub fn min_identification_len() -> usize {
    jpeg::MIN_IDENTIFICATION_LEN.max(png::MIN_IDENTIFICATION_LEN)
}

pub fn has_enough_data_for_type_identification(data: &[u8]) -> bool {
    data.len() >= min_identification_len()
}

/// Whether `data` looks like a carrier this crate can unpack.
pub fn is_supported_packed_file(data: &[u8]) -> bool {
    detect_format(data).is_some()
}
