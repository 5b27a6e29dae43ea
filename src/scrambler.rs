// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Keyed index permutation.
//!
//! A [`ScramblerKey`] drives a Fisher-Yates shuffle of an index range, using
//! ChaCha20 seeded from SHA-256 over the key and the range bounds. The same
//! (key, range, shift) always yields the same permutation, on every platform.
//!
//! # Cross-platform portability
//!
//! Draws use `u32` for `gen_range` rather than `usize`. `usize` is 32-bit on
//! WASM but 64-bit on native, and `rand` consumes a different amount of
//! entropy per draw for the two widths, which would yield different shuffles.
//!
//! Scrambling obstructs naive reading of embedded bits; it does not add
//! confidentiality.

use std::fmt;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::crypto::keystore::KeyStore;
use crate::crypto::{random_array, KeyKind};
use crate::error::{Error, Result};
use crate::securemem::SecureBuffer;

/// Scrambler key length in bytes.
pub const KEY_SIZE: usize = 32;

const SEED_DOMAIN: &[u8] = b"seal-core scrambler v1";

#[derive(Clone)]
pub struct ScramblerKey {
    key: Zeroizing<[u8; KEY_SIZE]>,
}

impl ScramblerKey {
    pub fn generate() -> Self {
        Self { key: Zeroizing::new(random_array()) }
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_SIZE {
            return Err(Error::InsufficientKey);
        }
        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        key.copy_from_slice(bytes);
        Ok(Self { key })
    }

    pub fn key_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }

    pub fn load(store: &KeyStore, tag: &str) -> Result<Self> {
        let (kind, material) = store.get(tag)?;
        if kind != KeyKind::Scramble {
            return Err(Error::InsufficientKey);
        }
        Self::from_bytes(&material)
    }

    pub fn store(&self, store: &KeyStore, tag: &str) -> Result<()> {
        store.insert(tag, KeyKind::Scramble, &self.key[..])
    }

    pub fn delete(store: &KeyStore, tag: &str) -> Result<()> {
        store.delete(tag)
    }

    pub fn rename(store: &KeyStore, old_tag: &str, new_tag: &str) -> Result<()> {
        store.rename(old_tag, new_tag)
    }

    fn rng_for(&self, start: u32, end: u32) -> ChaCha20Rng {
        let mut h = Sha256::new();
        h.update(SEED_DOMAIN);
        h.update(&self.key[..]);
        h.update(start.to_be_bytes());
        h.update(end.to_be_bytes());
        let seed: Zeroizing<[u8; 32]> = Zeroizing::new(h.finalize().into());
        ChaCha20Rng::from_seed(*seed)
    }

    /// Keyed permutation of `[start, end)`, each value shifted left by
    /// `shift_left` bits.
    pub fn random_indices(&self, start: u32, end: u32, shift_left: u8) -> Result<Vec<u32>> {
        if start > end {
            return Err(Error::InvalidArgument("index range is reversed"));
        }
        if end > start {
            let max = end - 1;
            if shift_left >= 32 || (max << shift_left) >> shift_left != max {
                return Err(Error::InvalidArgument("shifted index overflows"));
            }
        }
        let mut indices: Vec<u32> = (start..end).collect();
        let mut rng = self.rng_for(start, end);
        let n = indices.len();
        for i in (1..n).rev() {
            let j = rng.gen_range(0..=(i as u32)) as usize;
            indices.swap(i, j);
        }
        if shift_left > 0 {
            indices.iter_mut().for_each(|v| *v <<= shift_left);
        }
        Ok(indices)
    }

    /// Permute the bits of `data`: input bit `i` moves to position `perm[i]`.
    pub fn scramble(&self, data: &[u8]) -> Result<Vec<u8>> {
        let perm = self.bit_permutation(data.len())?;
        let mut out = vec![0u8; data.len()];
        for (i, &dst) in perm.iter().enumerate() {
            if get_bit(data, i) {
                set_bit(&mut out, dst as usize);
            }
        }
        Ok(out)
    }

    /// Inverse of [`scramble`](Self::scramble).
    pub fn descramble(&self, data: &[u8]) -> Result<SecureBuffer> {
        let perm = self.bit_permutation(data.len())?;
        let mut out = SecureBuffer::with_len(data.len());
        for (i, &src) in perm.iter().enumerate() {
            if get_bit(data, src as usize) {
                set_bit(out.as_mut_bytes(), i);
            }
        }
        Ok(out)
    }

    fn bit_permutation(&self, len: usize) -> Result<Vec<u32>> {
        let bits = len
            .checked_mul(8)
            .and_then(|b| u32::try_from(b).ok())
            .ok_or(Error::InvalidArgument("buffer too large to scramble"))?;
        self.random_indices(0, bits, 0)
    }
}

impl fmt::Debug for ScramblerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ScramblerKey([REDACTED])")
    }
}

#[inline]
fn get_bit(data: &[u8], i: usize) -> bool {
    (data[i / 8] >> (7 - (i % 8))) & 1 == 1
}

#[inline]
fn set_bit(data: &mut [u8], i: usize) {
    data[i / 8] |= 1 << (7 - (i % 8));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic() {
        let key = ScramblerKey::from_bytes(&[42u8; KEY_SIZE]).unwrap();
        assert_eq!(key.random_indices(0, 500, 0).unwrap(), key.random_indices(0, 500, 0).unwrap());
    }

    #[test]
    fn is_a_permutation_of_the_range() {
        let key = ScramblerKey::generate();
        let mut idx = key.random_indices(10, 260, 0).unwrap();
        idx.sort_unstable();
        assert_eq!(idx, (10..260).collect::<Vec<u32>>());
    }

    #[test]
    fn shift_left_scales_values() {
        let key = ScramblerKey::from_bytes(&[1u8; KEY_SIZE]).unwrap();
        let plain = key.random_indices(0, 64, 0).unwrap();
        let shifted = key.random_indices(0, 64, 3).unwrap();
        let expect: Vec<u32> = plain.iter().map(|v| v << 3).collect();
        assert_eq!(shifted, expect);
        assert!(key.random_indices(0, u32::MAX, 4).is_err());
    }

    #[test]
    fn empty_and_reversed_ranges() {
        let key = ScramblerKey::generate();
        assert!(key.random_indices(5, 5, 0).unwrap().is_empty());
        assert!(matches!(key.random_indices(6, 5, 0), Err(Error::InvalidArgument(_))));
    }

    #[test]
    fn different_keys_differ() {
        let a = ScramblerKey::from_bytes(&[1u8; KEY_SIZE]).unwrap();
        let b = ScramblerKey::from_bytes(&[2u8; KEY_SIZE]).unwrap();
        assert_ne!(a.random_indices(0, 256, 0).unwrap(), b.random_indices(0, 256, 0).unwrap());
    }

    #[test]
    fn scramble_descramble_is_identity() {
        let key = ScramblerKey::generate();
        let data: Vec<u8> = (0..200u32).map(|i| (i * 37 % 251) as u8).collect();
        let scrambled = key.scramble(&data).unwrap();
        assert_ne!(scrambled, data);
        assert_eq!(key.descramble(&scrambled).unwrap().as_bytes(), &data[..]);
    }

    #[test]
    fn wrong_length_key_rejected() {
        assert!(matches!(ScramblerKey::from_bytes(&[0u8; 31]), Err(Error::InsufficientKey)));
    }

    #[test]
    fn keystore_lifecycle() {
        let store = KeyStore::new();
        let key = ScramblerKey::generate();
        key.store(&store, "s").unwrap();
        ScramblerKey::rename(&store, "s", "t").unwrap();
        assert_eq!(ScramblerKey::load(&store, "t").unwrap().key_bytes(), key.key_bytes());
        ScramblerKey::delete(&store, "t").unwrap();
        assert!(ScramblerKey::load(&store, "t").is_err());
    }
}
