// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Read payloads and fingerprints back out of JPEG carriers.

use log::debug;

use super::marker::{iterate_markers, APP11};
use super::slots::{extract_payload, SCRAMBLE_TAG, SLOT_NATURAL};
use super::JpegImage;
use crate::crypto::hash::{SecureHash, SecureHasher};
use crate::error::{Error, Result};
use crate::scrambler::ScramblerKey;

/// Bytes needed by [`is_data_jpeg`].
pub const MIN_IDENTIFICATION_LEN: usize = 3;

/// SOI followed by the start of another marker.
pub fn is_data_jpeg(data: &[u8]) -> bool {
    data.len() >= MIN_IDENTIFICATION_LEN && data[..3] == [0xFF, 0xD8, 0xFF]
}

/// Whether the image carries the scramble tag. Only the headers are read.
pub fn is_scrambled(data: &[u8]) -> Result<bool> {
    let (entries, _) = iterate_markers(data)?;
    Ok(entries.iter().any(|e| e.marker == APP11 && e.data.starts_with(SCRAMBLE_TAG)))
}

/// A JPEG carrier decoded once, so its payload can be tried under several
/// scrambler keys.
pub struct Carrier {
    image: JpegImage,
    scrambled: bool,
    max_len: usize,
}

impl Carrier {
    /// Decode `data`. `max_len` bounds the accepted declared length.
    pub fn parse(data: &[u8], max_len: usize) -> Result<Self> {
        let image = JpegImage::from_bytes(data)?;
        let scrambled = image.find_segment(APP11, SCRAMBLE_TAG).is_some();
        Ok(Self { image, scrambled, max_len })
    }

    pub fn is_scrambled(&self) -> bool {
        self.scrambled
    }

    /// A tagged image without `key` fails with `AuthRequired`; an untagged
    /// one is read in plain order whether or not a key is given.
    pub fn payload(&self, key: Option<&ScramblerKey>) -> Result<Vec<u8>> {
        let key = match (self.scrambled, key) {
            (true, None) => return Err(Error::AuthRequired),
            (true, key) => key,
            (false, _) => None,
        };
        let payload = extract_payload(self.image.grids(), self.max_len, key)?;
        debug!("jpeg unpack: {} bytes, scrambled={}", payload.len(), self.scrambled);
        Ok(payload)
    }
}

/// Extract the payload; see [`Carrier::payload`].
pub fn unpack(data: &[u8], max_len: usize, key: Option<&ScramblerKey>) -> Result<Vec<u8>> {
    Carrier::parse(data, max_len)?.payload(key)
}

/// SHA-256 over the dimensions and every quantized coefficient, with the
/// low bit of slot coefficients masked. Two carriers of the same picture
/// hash equal whatever payload they hold.
pub fn hash_image_data(data: &[u8]) -> Result<[u8; 32]> {
    let image = JpegImage::from_bytes(data)?;
    let frame = image.frame_info();
    let mut hasher = SecureHash::new();
    hasher.update(&frame.width.to_be_bytes());
    hasher.update(&frame.height.to_be_bytes());
    hasher.update(&[image.num_components() as u8]);

    let mut buf = Vec::with_capacity(128);
    for grid in image.grids() {
        for block in grid.coeffs().chunks_exact(64) {
            buf.clear();
            for (i, &c) in block.iter().enumerate() {
                let v = if SLOT_NATURAL.contains(&i) { c & !1 } else { c };
                buf.extend_from_slice(&v.to_be_bytes());
            }
            hasher.update(&buf);
        }
    }
    let digest = hasher.hash();
    let mut out = [0u8; 32];
    out.copy_from_slice(digest.as_bytes());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jpeg::{pack, repack, DctMethod};
    use image::{Rgba, RgbaImage};

    fn picture() -> RgbaImage {
        RgbaImage::from_fn(40, 24, |x, y| Rgba([(x * 6) as u8, (y * 10) as u8, 128, 255]))
    }

    #[test]
    fn identification() {
        assert!(is_data_jpeg(&[0xFF, 0xD8, 0xFF, 0xE0]));
        assert!(!is_data_jpeg(&[0xFF, 0xD8]));
        assert!(!is_data_jpeg(b"\x89PNG"));
    }

    #[test]
    fn plain_pack_unpack() {
        let out = pack(&picture(), 0.65, b"abc", None, DctMethod::Baseline).unwrap();
        assert!(!is_scrambled(&out).unwrap());
        assert_eq!(unpack(&out, 16, None).unwrap(), b"abc");
        // A key does not matter for an untagged image.
        assert_eq!(unpack(&out, 16, Some(&ScramblerKey::generate())).unwrap(), b"abc");
    }

    #[test]
    fn scrambled_needs_key() {
        let key = ScramblerKey::generate();
        let out = pack(&picture(), 0.65, b"abc", Some(&key), DctMethod::default()).unwrap();
        assert!(is_scrambled(&out).unwrap());
        assert!(matches!(unpack(&out, 16, None), Err(Error::AuthRequired)));
        assert_eq!(unpack(&out, 16, Some(&key)).unwrap(), b"abc");
    }

    #[test]
    fn one_parse_serves_several_keys() {
        let key = ScramblerKey::generate();
        let out = pack(&picture(), 0.65, b"abc", Some(&key), DctMethod::default()).unwrap();
        let carrier = Carrier::parse(&out, 16).unwrap();
        assert!(carrier.is_scrambled());
        assert!(matches!(carrier.payload(None), Err(Error::AuthRequired)));
        for _ in 0..3 {
            let wrong = carrier.payload(Some(&ScramblerKey::generate())).ok();
            assert_ne!(wrong.as_deref(), Some(&b"abc"[..]));
        }
        assert_eq!(carrier.payload(Some(&key)).unwrap(), b"abc");
    }

    #[test]
    fn declared_length_is_bounded() {
        let out = pack(&picture(), 0.65, b"abcdef", None, DctMethod::default()).unwrap();
        assert!(matches!(unpack(&out, 5, None), Err(Error::InvalidSecureImage(_))));
    }

    #[test]
    fn hash_ignores_payload() {
        let a = pack(&picture(), 0.65, b"first", None, DctMethod::default()).unwrap();
        let b = repack(&a, b"second payload", None).unwrap();
        assert_eq!(hash_image_data(&a).unwrap(), hash_image_data(&b).unwrap());
        let other = pack(&picture(), 0.3, b"first", None, DctMethod::default()).unwrap();
        assert_ne!(hash_image_data(&a).unwrap(), hash_image_data(&other).unwrap());
    }

    #[test]
    fn garbage_is_invalid_image() {
        assert!(matches!(unpack(b"\xFF\xD8\xFFnope", 10, None), Err(Error::InvalidSecureImage(_))));
    }
}
