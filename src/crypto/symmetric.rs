// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! AES-256-GCM-SIV symmetric keys.
//!
//! Ciphertext framing is `[12-byte nonce][ciphertext][16-byte tag]`. The nonce
//! is random per call; GCM-SIV keeps a repeated nonce from being fatal.
//! Any decrypt problem (short input, wrong key, flipped bit, wrong associated
//! data) is reported as the same opaque [`Error::CryptoFailure`].

use std::fmt;

use aes_gcm_siv::aead::{Aead, KeyInit, Payload};
use aes_gcm_siv::{Aes256GcmSiv, Nonce};
use zeroize::Zeroizing;

use super::keystore::KeyStore;
use super::{random_array, KeyKind};
use crate::error::{Error, Result};
use crate::securemem::SecureBuffer;

/// Key length in bytes.
pub const KEY_LEN: usize = 32;
/// AES-GCM-SIV nonce length in bytes.
pub const NONCE_LEN: usize = 12;
/// Authentication tag length in bytes.
pub const TAG_LEN: usize = 16;
/// Bytes added to every plaintext.
pub const OVERHEAD: usize = NONCE_LEN + TAG_LEN;

/// A 256-bit symmetric key with its purpose.
#[derive(Clone)]
pub struct SymmetricKey {
    kind: KeyKind,
    key: Zeroizing<[u8; KEY_LEN]>,
}

impl SymmetricKey {
    /// Fresh random key.
    pub fn generate(kind: KeyKind) -> Self {
        Self { kind, key: Zeroizing::new(random_array()) }
    }

    /// Import raw key bytes. Anything other than exactly 32 bytes is rejected.
    pub fn from_bytes(kind: KeyKind, bytes: &[u8]) -> Result<Self> {
        if bytes.len() != KEY_LEN {
            return Err(Error::InsufficientKey);
        }
        let mut key = Zeroizing::new([0u8; KEY_LEN]);
        key.copy_from_slice(bytes);
        Ok(Self { kind, key })
    }

    /// Load a key previously stored under `tag`.
    pub fn load(store: &KeyStore, tag: &str) -> Result<Self> {
        let (kind, material) = store.get(tag)?;
        if !kind.is_symmetric() {
            return Err(Error::InsufficientKey);
        }
        Self::from_bytes(kind, &material)
    }

    /// Persist under `tag`; fails with `KeyExists` if the tag is taken.
    pub fn store(&self, store: &KeyStore, tag: &str) -> Result<()> {
        store.insert(tag, self.kind, &self.key[..])
    }

    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    pub fn key_bytes(&self) -> &[u8; KEY_LEN] {
        &self.key
    }

    pub(crate) fn cipher(&self) -> Result<Aes256GcmSiv> {
        Aes256GcmSiv::new_from_slice(&self.key[..]).map_err(|_| Error::InsufficientKey)
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.encrypt_with_aad(plaintext, &[])
    }

    /// Encrypt, binding `aad` into the tag without storing it.
    pub fn encrypt_with_aad(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        seal_with(&self.cipher()?, plaintext, aad)
    }

    pub fn decrypt(&self, data: &[u8]) -> Result<SecureBuffer> {
        self.decrypt_with_aad(data, &[])
    }

    pub fn decrypt_with_aad(&self, data: &[u8], aad: &[u8]) -> Result<SecureBuffer> {
        open_with(&self.cipher()?, data, aad)
    }
}

impl fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SymmetricKey")
            .field("kind", &self.kind)
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// Encrypt with an already-initialised cipher.
pub(crate) fn seal_with(cipher: &Aes256GcmSiv, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
    let nonce_bytes: [u8; NONCE_LEN] = random_array();
    let ciphertext = cipher
        .encrypt(Nonce::from_slice(&nonce_bytes), Payload { msg: plaintext, aad })
        .map_err(|_| Error::CryptoFailure)?;
    let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(out)
}

/// Decrypt with an already-initialised cipher.
pub(crate) fn open_with(cipher: &Aes256GcmSiv, data: &[u8], aad: &[u8]) -> Result<SecureBuffer> {
    if data.len() < OVERHEAD {
        return Err(Error::CryptoFailure);
    }
    let (nonce, body) = data.split_at(NONCE_LEN);
    cipher
        .decrypt(Nonce::from_slice(nonce), Payload { msg: body, aad })
        .map(SecureBuffer::from_vec)
        .map_err(|_| Error::CryptoFailure)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let key = SymmetricKey::generate(KeyKind::SymSeal);
        let ct = key.encrypt(b"attack at dawn").unwrap();
        assert_eq!(ct.len(), 14 + OVERHEAD);
        assert_eq!(key.decrypt(&ct).unwrap().as_bytes(), b"attack at dawn");
    }

    #[test]
    fn wrong_key_fails_opaquely() {
        let a = SymmetricKey::generate(KeyKind::Aes);
        let b = SymmetricKey::generate(KeyKind::Aes);
        let ct = a.encrypt(b"payload").unwrap();
        assert!(matches!(b.decrypt(&ct), Err(Error::CryptoFailure)));
    }

    #[test]
    fn tampering_is_detected() {
        let key = SymmetricKey::generate(KeyKind::Aes);
        let mut ct = key.encrypt(b"payload").unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0x01;
        assert!(matches!(key.decrypt(&ct), Err(Error::CryptoFailure)));
        assert!(matches!(key.decrypt(&ct[..10]), Err(Error::CryptoFailure)));
    }

    #[test]
    fn aad_must_match() {
        let key = SymmetricKey::generate(KeyKind::Aes);
        let ct = key.encrypt_with_aad(b"body", b"hdr1").unwrap();
        assert!(key.decrypt_with_aad(&ct, b"hdr1").is_ok());
        assert!(key.decrypt_with_aad(&ct, b"hdr2").is_err());
    }

    #[test]
    fn short_key_is_insufficient() {
        assert!(matches!(
            SymmetricKey::from_bytes(KeyKind::Aes, &[0u8; 16]),
            Err(Error::InsufficientKey)
        ));
    }

    #[test]
    fn keystore_round_trip() {
        let store = KeyStore::new();
        let key = SymmetricKey::generate(KeyKind::SymAttributes);
        key.store(&store, "k1").unwrap();
        assert!(matches!(key.store(&store, "k1"), Err(Error::KeyExists(_))));
        let loaded = SymmetricKey::load(&store, "k1").unwrap();
        assert_eq!(loaded.key_bytes(), key.key_bytes());
        assert_eq!(loaded.kind(), KeyKind::SymAttributes);
        assert!(matches!(SymmetricKey::load(&store, "nope"), Err(Error::KeyNotFound(_))));
    }
}
