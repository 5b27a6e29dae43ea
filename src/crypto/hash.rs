// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Hash objects behind a common trait.
//!
//! Call sites that just need "the strong hash" use [`SecureHash`]; swapping
//! the alias upgrades all of them at once.

use sha1::Sha1;
use sha2::{Digest, Sha256};

use crate::securemem::SecureBuffer;

/// Incremental hash.
pub trait SecureHasher {
    fn update(&mut self, data: &[u8]);
    /// Discard everything absorbed so far.
    fn reset(&mut self);
    /// Finish, return the digest and reset for reuse.
    fn hash(&mut self) -> SecureBuffer;
    /// Digest length in bytes.
    fn hash_len(&self) -> usize;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashKind {
    Sha1,
    Sha256,
}

impl HashKind {
    pub fn hasher(self) -> Box<dyn SecureHasher + Send> {
        match self {
            Self::Sha1 => Box::new(Sha1Hash::new()),
            Self::Sha256 => Box::new(Sha256Hash::new()),
        }
    }
}

#[derive(Clone, Default)]
pub struct Sha1Hash(Sha1);

impl Sha1Hash {
    pub fn new() -> Self {
        Self(Sha1::new())
    }
}

impl SecureHasher for Sha1Hash {
    fn update(&mut self, data: &[u8]) {
        Digest::update(&mut self.0, data);
    }

    fn reset(&mut self) {
        Digest::reset(&mut self.0);
    }

    fn hash(&mut self) -> SecureBuffer {
        SecureBuffer::from_bytes(&self.0.finalize_reset())
    }

    fn hash_len(&self) -> usize {
        20
    }
}

#[derive(Clone, Default)]
pub struct Sha256Hash(Sha256);

impl Sha256Hash {
    pub fn new() -> Self {
        Self(Sha256::new())
    }
}

impl SecureHasher for Sha256Hash {
    fn update(&mut self, data: &[u8]) {
        Digest::update(&mut self.0, data);
    }

    fn reset(&mut self) {
        Digest::reset(&mut self.0);
    }

    fn hash(&mut self) -> SecureBuffer {
        SecureBuffer::from_bytes(&self.0.finalize_reset())
    }

    fn hash_len(&self) -> usize {
        32
    }
}

/// The strongest hash available.
pub type SecureHash = Sha256Hash;

/// One-shot SHA-256.
pub fn sha256(data: &[u8]) -> [u8; 32] {
    Sha256::digest(data).into()
}

/// One-shot secure hash, lowercase hex.
pub fn hash_hex(data: &[u8]) -> String {
    let mut h = SecureHash::new();
    h.update(data);
    hex::encode(h.hash().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vectors() {
        let mut h = Sha1Hash::new();
        h.update(b"abc");
        assert_eq!(hex::encode(h.hash().as_bytes()), "a9993e364706816aba3e25717850c26c9cd0d89d");

        let mut h = Sha256Hash::new();
        h.update(b"ab");
        h.update(b"c");
        assert_eq!(
            hex::encode(h.hash().as_bytes()),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn reset_discards_state() {
        let mut h = HashKind::Sha256.hasher();
        h.update(b"garbage");
        h.reset();
        h.update(b"abc");
        assert_eq!(h.hash().as_bytes(), &sha256(b"abc"));
        assert_eq!(h.hash_len(), 32);
    }

    #[test]
    fn hex_helper_uses_secure_hash() {
        assert_eq!(hash_hex(b"abc"), hex::encode(sha256(b"abc")));
    }
}
