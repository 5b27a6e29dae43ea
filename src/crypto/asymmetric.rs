// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Asymmetric role keys.
//!
//! A [`KeyPair`] combines an X25519 key (for sealed-box encryption to the
//! holder of the private half) and an Ed25519 key (for signatures by that
//! holder). The seal owner keeps the full pair; consumers only ever see the
//! [`PublicKey`].
//!
//! Encryption works like a classic public-key block cipher: one call handles
//! at most [`KeyPair::block_len`] plaintext bytes and adds
//! [`KeyPair::pad_len`] bytes of overhead. Larger payloads must be wrapped
//! under a symmetric key by the caller.
//!
//! Sealed-box layout: `[ephemeral X25519 public 32][nonce 12][ciphertext][tag 16]`.

use std::fmt;

use aes_gcm_siv::aead::{Aead, KeyInit};
use aes_gcm_siv::{Aes256GcmSiv, Nonce};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};
use x25519_dalek::{EphemeralSecret, StaticSecret};
use zeroize::Zeroizing;

use super::keystore::KeyStore;
use super::symmetric::{NONCE_LEN, TAG_LEN};
use super::{random_array, KeyKind};
use crate::error::{Error, Result};
use crate::securemem::SecureBuffer;

/// Exported public key length: X25519 public ‖ Ed25519 verifying key.
pub const PUBLIC_KEY_LEN: usize = 64;
/// Exported private key length: X25519 secret ‖ Ed25519 seed.
pub const PRIVATE_KEY_LEN: usize = 64;
pub const SIGNATURE_LEN: usize = 64;

const BLOCK_LEN: usize = 256;
const PAD_LEN: usize = 32 + NONCE_LEN + TAG_LEN;
const BOX_DOMAIN: &[u8] = b"seal-core sealed box v1";

/// The shareable half of a role key pair.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey {
    enc: x25519_dalek::PublicKey,
    verify: VerifyingKey,
}

impl PublicKey {
    pub fn to_bytes(&self) -> [u8; PUBLIC_KEY_LEN] {
        let mut out = [0u8; PUBLIC_KEY_LEN];
        out[..32].copy_from_slice(self.enc.as_bytes());
        out[32..].copy_from_slice(self.verify.as_bytes());
        out
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PUBLIC_KEY_LEN {
            return Err(Error::InsufficientKey);
        }
        let mut enc = [0u8; 32];
        enc.copy_from_slice(&bytes[..32]);
        let mut ver = [0u8; 32];
        ver.copy_from_slice(&bytes[32..]);
        let verify = VerifyingKey::from_bytes(&ver).map_err(|_| Error::InsufficientKey)?;
        Ok(Self { enc: x25519_dalek::PublicKey::from(enc), verify })
    }

    /// Sealed-box encrypt to the private-key holder.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        if plaintext.len() > BLOCK_LEN {
            return Err(Error::InvalidArgument("plaintext exceeds the asymmetric block length"));
        }
        let eph = EphemeralSecret::random_from_rng(OsRng);
        let eph_pub = x25519_dalek::PublicKey::from(&eph);
        let shared = eph.diffie_hellman(&self.enc);
        if !shared.was_contributory() {
            return Err(Error::CryptoFailure);
        }
        let key = box_key(shared.as_bytes(), eph_pub.as_bytes(), self.enc.as_bytes());
        let cipher = Aes256GcmSiv::new_from_slice(&key[..]).map_err(|_| Error::CryptoFailure)?;
        let nonce: [u8; NONCE_LEN] = random_array();
        let ct = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| Error::CryptoFailure)?;

        let mut out = Vec::with_capacity(PAD_LEN + plaintext.len());
        out.extend_from_slice(eph_pub.as_bytes());
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ct);
        Ok(out)
    }

    /// Verify an Ed25519 signature made by the private-key holder.
    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<()> {
        let sig: [u8; SIGNATURE_LEN] = signature.try_into().map_err(|_| Error::CryptoFailure)?;
        self.verify
            .verify(message, &Signature::from_bytes(&sig))
            .map_err(|_| Error::CryptoFailure)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PublicKey")
            .field("x25519", &hex::encode(self.enc.as_bytes()))
            .finish_non_exhaustive()
    }
}

struct SecretHalf {
    enc: StaticSecret,
    sign: SigningKey,
}

/// Role key pair; the private half is optional.
pub struct KeyPair {
    public: PublicKey,
    secret: Option<SecretHalf>,
}

impl KeyPair {
    pub fn generate() -> Self {
        let enc = StaticSecret::random_from_rng(OsRng);
        let sign = SigningKey::generate(&mut OsRng);
        let public = PublicKey {
            enc: x25519_dalek::PublicKey::from(&enc),
            verify: sign.verifying_key(),
        };
        Self { public, secret: Some(SecretHalf { enc, sign }) }
    }

    /// Public-only pair, able to encrypt and verify but not decrypt or sign.
    pub fn from_public(public: PublicKey) -> Self {
        Self { public, secret: None }
    }

    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    /// Whether the private half is present.
    pub fn is_full_key(&self) -> bool {
        self.secret.is_some()
    }

    /// Maximum plaintext bytes per [`encrypt`](Self::encrypt) call.
    pub fn block_len(&self) -> usize {
        BLOCK_LEN
    }

    /// Bytes added by one [`encrypt`](Self::encrypt) call.
    pub fn pad_len(&self) -> usize {
        PAD_LEN
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        self.public.encrypt(plaintext)
    }

    pub fn decrypt(&self, data: &[u8]) -> Result<SecureBuffer> {
        let secret = self.secret.as_ref().ok_or(Error::InsufficientKey)?;
        if data.len() < PAD_LEN || data.len() > PAD_LEN + BLOCK_LEN {
            return Err(Error::CryptoFailure);
        }
        let mut eph = [0u8; 32];
        eph.copy_from_slice(&data[..32]);
        let eph_pub = x25519_dalek::PublicKey::from(eph);
        let shared = secret.enc.diffie_hellman(&eph_pub);
        if !shared.was_contributory() {
            return Err(Error::CryptoFailure);
        }
        let key = box_key(shared.as_bytes(), &eph, self.public.enc.as_bytes());
        let cipher = Aes256GcmSiv::new_from_slice(&key[..]).map_err(|_| Error::CryptoFailure)?;
        cipher
            .decrypt(Nonce::from_slice(&data[32..32 + NONCE_LEN]), &data[32 + NONCE_LEN..])
            .map(SecureBuffer::from_vec)
            .map_err(|_| Error::CryptoFailure)
    }

    pub fn sign(&self, message: &[u8]) -> Result<[u8; SIGNATURE_LEN]> {
        let secret = self.secret.as_ref().ok_or(Error::InsufficientKey)?;
        Ok(secret.sign.sign(message).to_bytes())
    }

    pub fn verify(&self, message: &[u8], signature: &[u8]) -> Result<()> {
        self.public.verify(message, signature)
    }

    pub fn export_public(&self) -> [u8; PUBLIC_KEY_LEN] {
        self.public.to_bytes()
    }

    pub fn export_private(&self) -> Result<SecureBuffer> {
        let secret = self.secret.as_ref().ok_or(Error::InsufficientKey)?;
        let mut out = SecureBuffer::with_len(PRIVATE_KEY_LEN);
        out.as_mut_bytes()[..32].copy_from_slice(&secret.enc.to_bytes());
        out.as_mut_bytes()[32..].copy_from_slice(&secret.sign.to_bytes());
        Ok(out)
    }

    pub fn import_public(bytes: &[u8]) -> Result<Self> {
        Ok(Self::from_public(PublicKey::from_bytes(bytes)?))
    }

    /// Rebuild a full pair from an exported private key.
    pub fn import_private(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PRIVATE_KEY_LEN {
            return Err(Error::InsufficientKey);
        }
        let mut enc_bytes = Zeroizing::new([0u8; 32]);
        enc_bytes.copy_from_slice(&bytes[..32]);
        let mut sign_bytes = Zeroizing::new([0u8; 32]);
        sign_bytes.copy_from_slice(&bytes[32..]);
        let enc = StaticSecret::from(*enc_bytes);
        let sign = SigningKey::from_bytes(&sign_bytes);
        let public = PublicKey {
            enc: x25519_dalek::PublicKey::from(&enc),
            verify: sign.verifying_key(),
        };
        Ok(Self { public, secret: Some(SecretHalf { enc, sign }) })
    }

    /// Store under `<tag>.pub` and, for full keys, `<tag>.priv`.
    pub fn store(&self, store: &KeyStore, tag: &str) -> Result<()> {
        store.insert(&public_tag(tag), KeyKind::PublicKey, &self.export_public())?;
        if self.is_full_key() {
            let private = self.export_private()?;
            if let Err(e) = store.insert(&private_tag(tag), KeyKind::PrivateKey, &private) {
                store.delete(&public_tag(tag))?;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Load from the keystore; the private half is picked up when present.
    pub fn load(store: &KeyStore, tag: &str) -> Result<Self> {
        match store.get(&private_tag(tag)) {
            Ok((_, private)) => Self::import_private(&private),
            Err(Error::KeyNotFound(_)) => {
                let (_, public) = store.get(&public_tag(tag))?;
                Self::import_public(&public)
            }
            Err(e) => Err(e),
        }
    }

    pub fn rename(store: &KeyStore, old_tag: &str, new_tag: &str) -> Result<()> {
        store.rename(&public_tag(old_tag), &public_tag(new_tag))?;
        if store.contains(&private_tag(old_tag))? {
            store.rename(&private_tag(old_tag), &private_tag(new_tag))?;
        }
        Ok(())
    }

    pub fn delete(store: &KeyStore, tag: &str) -> Result<()> {
        store.delete(&public_tag(tag))?;
        if store.contains(&private_tag(tag))? {
            store.delete(&private_tag(tag))?;
        }
        Ok(())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public", &self.public)
            .field("full", &self.is_full_key())
            .finish()
    }
}

fn public_tag(tag: &str) -> String {
    format!("{tag}.pub")
}

fn private_tag(tag: &str) -> String {
    format!("{tag}.priv")
}

fn box_key(shared: &[u8; 32], eph_pub: &[u8; 32], recipient: &[u8; 32]) -> Zeroizing<[u8; 32]> {
    let mut h = Sha256::new();
    h.update(BOX_DOMAIN);
    h.update(shared);
    h.update(eph_pub);
    h.update(recipient);
    Zeroizing::new(h.finalize().into())
}
