// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Cryptographic primitives.
//!
//! - [`symmetric`]: AES-256-GCM-SIV key objects with nonce framing.
//! - [`asymmetric`]: role key pairs (X25519 sealed boxes + Ed25519 signatures).
//! - [`hash`]: SHA-1 / SHA-256 behind one hasher trait.
//! - [`kdf`]: Argon2id password → key derivation.
//! - [`keystore`]: tag-addressed key storage behind a reader-writer lock.
//!
//! Every key object is classified by a [`KeyKind`] and can be persisted to a
//! [`keystore::KeyStore`] under a caller-chosen tag.

pub mod asymmetric;
pub mod hash;
pub mod kdf;
pub mod keystore;
pub mod symmetric;

use rand::rngs::OsRng;
use rand::RngCore;

pub use asymmetric::{KeyPair, PublicKey};
pub use hash::{HashKind, SecureHash, SecureHasher, Sha1Hash, Sha256Hash};
pub use kdf::KdfParams;
pub use keystore::KeyStore;
pub use symmetric::SymmetricKey;

/// Purpose of a stored key. Persisted as its `u8` discriminant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum KeyKind {
    /// General-purpose AES key (local-only message cache).
    Aes = 0,
    /// Global disk-encryption key (the vault master key).
    SymGlobal = 1,
    /// Per-seal message key.
    SymSeal = 2,
    /// Per-response key.
    SymResponse = 3,
    /// Scrambler key.
    Scramble = 4,
    /// Single-use wrapping key.
    SymTransient = 5,
    /// Seal attribute encryption key.
    SymAttributes = 6,
    /// Stored salt.
    Salt = 7,
    /// Vault password verifier.
    VaultVerify = 8,
    PublicKey = 9,
    PrivateKey = 10,
    /// Encrypted seal attribute blob.
    AttributeData = 11,
}

impl KeyKind {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => Self::Aes,
            1 => Self::SymGlobal,
            2 => Self::SymSeal,
            3 => Self::SymResponse,
            4 => Self::Scramble,
            5 => Self::SymTransient,
            6 => Self::SymAttributes,
            7 => Self::Salt,
            8 => Self::VaultVerify,
            9 => Self::PublicKey,
            10 => Self::PrivateKey,
            11 => Self::AttributeData,
            _ => return None,
        })
    }

    /// Whether this kind holds a 256-bit symmetric key.
    pub fn is_symmetric(self) -> bool {
        matches!(
            self,
            Self::Aes
                | Self::SymGlobal
                | Self::SymSeal
                | Self::SymResponse
                | Self::SymTransient
                | Self::SymAttributes
                | Self::VaultVerify
        )
    }
}

/// Fill a fresh array from the OS CSPRNG.
pub(crate) fn random_array<const N: usize>() -> [u8; N] {
    let mut out = [0u8; N];
    OsRng.fill_bytes(&mut out);
    out
}

pub(crate) fn fill_random(buf: &mut [u8]) {
    OsRng.fill_bytes(buf);
}
