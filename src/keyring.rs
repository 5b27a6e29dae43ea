// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Per-seal key rings and role-separated messages.
//!
//! A ring bundles everything one seal needs:
//!
//! - the seal key (shared with every consumer; producer messages),
//! - the attribute key plus the encrypted attribute blob,
//! - a local-only key that never leaves this device,
//! - the scrambler key for the seal's image carriers,
//! - the owner key pair (full for the producer, public for consumers).
//!
//! All of it lives in a [`KeyStore`] under tags prefixed with the seal id.
//!
//! ## Message layout
//!
//! ```text
//! [u8 version = 1][8 salt][16 hint][role payload]
//!   hint      = SHA-256(salt ‖ seal id)[..16]
//!   producer  = props(MsgProducer, seal key) ‖ Ed25519 signature over all preceding bytes
//!   consumer  = [u16 BE n][n bytes: transient key sealed to the owner] ‖ props(MsgConsumer, transient key)
//!   local     = props(MsgLocal, local key)
//! ```
//!
//! The hint lets a receiver find the right ring without trying every key.

use log::debug;
use zeroize::Zeroize;

use crate::crypto::asymmetric::SIGNATURE_LEN;
use crate::crypto::hash::{hash_hex, sha256};
use crate::crypto::{random_array, KeyKind, KeyPair, KeyStore, SymmetricKey};
use crate::error::{Error, Result};
use crate::props::{PropertyValue, PropsType, SecureProps, SECURE_VERSION};
use crate::scrambler::ScramblerKey;
use crate::securemem::SecureBuffer;

/// Plaintext length of the attribute blob.
pub const ATTRIBUTE_DATA_LEN: usize = 32;

const MESSAGE_VERSION: u8 = 1;
const SALT_LEN: usize = 8;
const HINT_LEN: usize = 16;
const MESSAGE_HEADER_LEN: usize = 1 + SALT_LEN + HINT_LEN;
const EXPORT_VERSION: i64 = 1;

const TAG_SEAL: &str = "seal";
const TAG_ATTR_KEY: &str = "attr";
const TAG_LOCAL: &str = "local";
const TAG_SCRAMBLE: &str = "scramble";
const TAG_OWNER: &str = "owner";
const TAG_ATTRIBUTES: &str = "attributes";

fn tag(seal_id: &str, part: &str) -> String {
    format!("{seal_id}:{part}")
}

/// Who produced a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRole {
    Producer,
    Consumer,
    LocalOnly,
}

/// A decrypted message.
#[derive(Debug, Clone)]
pub struct SecureMessage {
    pub seal_id: String,
    pub message: PropertyValue,
    /// [`hash_for_encrypted_message`] of the ciphertext.
    pub hash: String,
    pub role: MessageRole,
}

impl SecureMessage {
    pub fn is_producer_generated(&self) -> bool {
        self.role == MessageRole::Producer
    }
}

/// Result of matching a ciphertext against known rings by its hint alone.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MessageIdentification {
    pub seal_id: Option<String>,
    /// The bytes are not a sealed message at all, so no ring will ever match.
    pub will_never_match: bool,
}

/// Seal id: hex SHA-256 over the owner public key and the seal key.
fn compute_seal_id(owner_public: &[u8], seal_key: &[u8]) -> String {
    let mut buf = Vec::with_capacity(owner_public.len() + seal_key.len());
    buf.extend_from_slice(owner_public);
    buf.extend_from_slice(seal_key);
    let id = hash_hex(&buf);
    buf.zeroize();
    id
}

fn message_hint(salt: &[u8], seal_id: &str) -> [u8; HINT_LEN] {
    let mut buf = salt.to_vec();
    buf.extend_from_slice(seal_id.as_bytes());
    let digest = sha256(&buf);
    let mut hint = [0u8; HINT_LEN];
    hint.copy_from_slice(&digest[..HINT_LEN]);
    hint
}

/// Split a message into `(salt, hint, payload)` after checking its version.
fn split_message(data: &[u8]) -> Result<(&[u8], &[u8], &[u8])> {
    if data.len() <= MESSAGE_HEADER_LEN || data[0] != MESSAGE_VERSION {
        return Err(Error::InvalidSealedMessage);
    }
    Ok((&data[1..1 + SALT_LEN], &data[1 + SALT_LEN..MESSAGE_HEADER_LEN], &data[MESSAGE_HEADER_LEN..]))
}

/// Hex SHA-256 of an encrypted message, used to recognise it later.
pub fn hash_for_encrypted_message(data: &[u8]) -> String {
    hash_hex(data)
}

/// Find which of `rings` a message was written for, without decrypting it.
pub fn identify_encrypted_message(data: &[u8], rings: &[Keyring]) -> MessageIdentification {
    let Ok((salt, hint, _)) = split_message(data) else {
        return MessageIdentification { seal_id: None, will_never_match: true };
    };
    let seal_id = rings
        .iter()
        .find(|r| message_hint(salt, &r.seal_id) == hint)
        .map(|r| r.seal_id.clone());
    MessageIdentification { seal_id, will_never_match: false }
}

/// Key material of one seal.
pub struct Keyring {
    seal_id: String,
    /// `None` once the ring has been invalidated.
    seal_key: Option<SymmetricKey>,
    attr_key: SymmetricKey,
    local_key: SymmetricKey,
    scrambler: ScramblerKey,
    owner: KeyPair,
}

impl std::fmt::Debug for Keyring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keyring")
            .field("seal_id", &self.seal_id)
            .field("valid", &self.is_valid())
            .field("owner", &self.is_owners_keyring())
            .finish_non_exhaustive()
    }
}

impl Keyring {
    /// Create a brand-new producer ring and store it.
    pub fn alloc_new_ring(store: &KeyStore, scrambler_data: &[u8], attributes: &[u8]) -> Result<Self> {
        if attributes.len() != ATTRIBUTE_DATA_LEN {
            return Err(Error::InvalidArgument("attribute data has the wrong length"));
        }
        let scrambler = ScramblerKey::from_bytes(scrambler_data)?;
        let owner = KeyPair::generate();
        let seal_key = SymmetricKey::generate(KeyKind::SymSeal);
        let seal_id = compute_seal_id(&owner.export_public(), seal_key.key_bytes());
        let ring = Self {
            seal_id,
            seal_key: Some(seal_key),
            attr_key: SymmetricKey::generate(KeyKind::SymAttributes),
            local_key: SymmetricKey::generate(KeyKind::Aes),
            scrambler,
            owner,
        };
        ring.persist(store, attributes)?;
        debug!("keyring {} created", ring.seal_id);
        Ok(ring)
    }

    /// Write every part to the store; on failure nothing is left behind.
    fn persist(&self, store: &KeyStore, attributes: &[u8]) -> Result<()> {
        let id = &self.seal_id;
        if store.contains(&tag(id, TAG_SEAL))? || Self::exists(store, id)? {
            return Err(Error::KeyExists(id.clone()));
        }
        let result = (|| {
            if let Some(k) = &self.seal_key {
                k.store(store, &tag(id, TAG_SEAL))?;
            }
            self.attr_key.store(store, &tag(id, TAG_ATTR_KEY))?;
            self.local_key.store(store, &tag(id, TAG_LOCAL))?;
            self.scrambler.store(store, &tag(id, TAG_SCRAMBLE))?;
            self.owner.store(store, &tag(id, TAG_OWNER))?;
            let blob = self.attr_key.encrypt(attributes)?;
            store.insert(&tag(id, TAG_ATTRIBUTES), KeyKind::AttributeData, &blob)
        })();
        if result.is_err() {
            store.delete_prefix(&format!("{id}:"))?;
        }
        result
    }

    /// Load an existing ring.
    pub fn load(store: &KeyStore, seal_id: &str) -> Result<Self> {
        let owner = KeyPair::load(store, &tag(seal_id, TAG_OWNER))?;
        let seal_key = match SymmetricKey::load(store, &tag(seal_id, TAG_SEAL)) {
            Ok(k) => Some(k),
            Err(Error::KeyNotFound(_)) => None,
            Err(e) => return Err(e),
        };
        Ok(Self {
            seal_id: seal_id.to_string(),
            seal_key,
            attr_key: SymmetricKey::load(store, &tag(seal_id, TAG_ATTR_KEY))?,
            local_key: SymmetricKey::load(store, &tag(seal_id, TAG_LOCAL))?,
            scrambler: ScramblerKey::load(store, &tag(seal_id, TAG_SCRAMBLE))?,
            owner,
        })
    }

    pub fn exists(store: &KeyStore, seal_id: &str) -> Result<bool> {
        store.contains(&format!("{}.pub", tag(seal_id, TAG_OWNER)))
    }

    pub fn delete_ring(store: &KeyStore, seal_id: &str) -> Result<()> {
        if store.delete_prefix(&format!("{seal_id}:"))? == 0 {
            return Err(Error::KeyNotFound(seal_id.to_string()));
        }
        debug!("keyring {seal_id} deleted");
        Ok(())
    }

    /// Seal ids of every ring in the store, sorted.
    pub fn available_keyrings(store: &KeyStore) -> Result<Vec<String>> {
        let suffix = format!(":{TAG_OWNER}.pub");
        Ok(store
            .tags(Some(KeyKind::PublicKey))?
            .into_iter()
            .filter_map(|t| t.strip_suffix(&suffix).map(str::to_string))
            .collect())
    }

    pub fn delete_all(store: &KeyStore) -> Result<()> {
        for id in Self::available_keyrings(store)? {
            Self::delete_ring(store, &id)?;
        }
        Ok(())
    }

    pub fn seal_id(&self) -> &str {
        &self.seal_id
    }

    /// False once the seal key has been invalidated.
    pub fn is_valid(&self) -> bool {
        self.seal_key.is_some()
    }

    /// Whether this device owns (produced) the seal.
    pub fn is_owners_keyring(&self) -> bool {
        self.owner.is_full_key()
    }

    pub fn scrambler_key(&self) -> &ScramblerKey {
        &self.scrambler
    }

    pub fn attribute_data_length() -> usize {
        ATTRIBUTE_DATA_LEN
    }

    /// Decrypted attribute blob.
    pub fn attribute_data(&self, store: &KeyStore) -> Result<SecureBuffer> {
        let (_, blob) = store.get(&tag(&self.seal_id, TAG_ATTRIBUTES))?;
        let data = self.attr_key.decrypt(&blob)?;
        if data.len() != ATTRIBUTE_DATA_LEN {
            return Err(Error::InvalidSecureProps("attribute blob has the wrong length"));
        }
        Ok(data)
    }

    pub fn set_attributes(&self, store: &KeyStore, attributes: &[u8]) -> Result<()> {
        if attributes.len() != ATTRIBUTE_DATA_LEN {
            return Err(Error::InvalidArgument("attribute data has the wrong length"));
        }
        let blob = self.attr_key.encrypt(attributes)?;
        store.upsert(&tag(&self.seal_id, TAG_ATTRIBUTES), KeyKind::AttributeData, &blob)
    }

    /// Destroy the seal key here and in the store. Producer and consumer
    /// messages can no longer be written or read through this ring.
    pub fn invalidate_symmetric_key(&mut self, store: &KeyStore) -> Result<()> {
        match store.delete(&tag(&self.seal_id, TAG_SEAL)) {
            Ok(()) | Err(Error::KeyNotFound(_)) => {}
            Err(e) => return Err(e),
        }
        self.seal_key = None;
        debug!("keyring {} invalidated", self.seal_id);
        Ok(())
    }

    fn seal_key(&self) -> Result<&SymmetricKey> {
        self.seal_key.as_ref().ok_or(Error::InvalidSeal)
    }

    /// Property dictionary describing the ring. External exports carry the
    /// owner's public key only; the scrambler and local keys are never
    /// included. `alt_attributes` replaces the attribute plaintext in the
    /// export without touching the stored ring.
    pub fn export_for_external(
        &self,
        store: &KeyStore,
        for_external: bool,
        alt_attributes: Option<&[u8]>,
    ) -> Result<PropertyValue> {
        let attributes = match alt_attributes {
            Some(a) if a.len() != ATTRIBUTE_DATA_LEN => {
                return Err(Error::InvalidArgument("attribute data has the wrong length"))
            }
            Some(a) => self.attr_key.encrypt(a)?,
            None => store.get(&tag(&self.seal_id, TAG_ATTRIBUTES))?.1.into_vec(),
        };
        let mut export = PropertyValue::dict()
            .with("version", EXPORT_VERSION)
            .with("sealId", self.seal_id.as_str())
            .with("attrKey", &self.attr_key.key_bytes()[..])
            .with("attributes", attributes)
            .with("ownerPublic", &self.owner.export_public()[..]);
        // A revoked ring keeps no seal key; only local archives may describe one.
        match (&self.seal_key, for_external) {
            (Some(key), _) => export.set("sealKey", &key.key_bytes()[..]),
            (None, true) => return Err(Error::InvalidSeal),
            (None, false) => {}
        }
        if !for_external && self.owner.is_full_key() {
            export.set("ownerPrivate", self.owner.export_private()?.into_vec());
        }
        Ok(export)
    }

    /// Seal id an export describes, if its keys hash to the id it claims.
    pub fn seal_for_collection(export: &PropertyValue) -> Option<String> {
        let claimed = export.get("sealId")?.as_str()?;
        let owner = export.get("ownerPublic")?.as_data()?;
        let seal_key = export.get("sealKey")?.as_data()?;
        (compute_seal_id(owner, seal_key) == claimed).then(|| claimed.to_string())
    }

    /// Store a ring from an export; returns its seal id.
    pub fn import_from_collection(
        store: &KeyStore,
        export: &PropertyValue,
        scrambler_data: &[u8],
    ) -> Result<String> {
        if export.field_int("version")? != EXPORT_VERSION {
            return Err(Error::SealVersionMismatch);
        }
        let seal_id = Self::seal_for_collection(export).ok_or(Error::InvalidSeal)?;
        if Self::exists(store, &seal_id)? {
            return Err(Error::KeyExists(seal_id));
        }
        let owner = match export.get("ownerPrivate").and_then(PropertyValue::as_data) {
            Some(private) => KeyPair::import_private(private)?,
            None => KeyPair::import_public(export.field_data("ownerPublic")?)?,
        };
        if owner.export_public()[..] != *export.field_data("ownerPublic")? {
            return Err(Error::InvalidSeal);
        }
        let attr_key = SymmetricKey::from_bytes(KeyKind::SymAttributes, export.field_data("attrKey")?)?;
        let attributes = attr_key.decrypt(export.field_data("attributes")?)?;
        let ring = Self {
            seal_id: seal_id.clone(),
            seal_key: Some(SymmetricKey::from_bytes(KeyKind::SymSeal, export.field_data("sealKey")?)?),
            attr_key,
            local_key: SymmetricKey::generate(KeyKind::Aes),
            scrambler: ScramblerKey::from_bytes(scrambler_data)?,
            owner,
        };
        ring.persist(store, &attributes)?;
        debug!("keyring {seal_id} imported, owner={}", ring.is_owners_keyring());
        Ok(seal_id)
    }

    fn message_header(&self) -> Vec<u8> {
        let salt: [u8; SALT_LEN] = random_array();
        let mut out = Vec::with_capacity(256);
        out.push(MESSAGE_VERSION);
        out.extend_from_slice(&salt);
        out.extend_from_slice(&message_hint(&salt, &self.seal_id));
        out
    }

    /// Message from the seal owner to every consumer.
    pub fn encrypt_producer_message(&self, msg: &PropertyValue) -> Result<Vec<u8>> {
        if !self.is_owners_keyring() {
            return Err(Error::UnsupportedConsumerAction);
        }
        let key = self.seal_key()?;
        let mut out = self.message_header();
        out.extend_from_slice(&SecureProps::new(PropsType::MsgProducer, SECURE_VERSION, key).encrypt_properties(msg)?);
        let sig = self.owner.sign(&out)?;
        out.extend_from_slice(&sig);
        Ok(out)
    }

    /// Message from a consumer that only the owner can read.
    pub fn encrypt_consumer_message(&self, msg: &PropertyValue) -> Result<Vec<u8>> {
        if self.is_owners_keyring() {
            return Err(Error::UnsupportedProducerAction);
        }
        self.seal_key()?;
        let transient = SymmetricKey::generate(KeyKind::SymTransient);
        let sealed = self.owner.encrypt(transient.key_bytes())?;
        let sealed_len = u16::try_from(sealed.len()).map_err(|_| Error::CryptoFailure)?;
        let mut out = self.message_header();
        out.extend_from_slice(&sealed_len.to_be_bytes());
        out.extend_from_slice(&sealed);
        out.extend_from_slice(
            &SecureProps::new(PropsType::MsgConsumer, SECURE_VERSION, &transient).encrypt_properties(msg)?,
        );
        Ok(out)
    }

    /// Message only this device can read.
    pub fn encrypt_local_only_message(&self, msg: &PropertyValue) -> Result<Vec<u8>> {
        let mut out = self.message_header();
        out.extend_from_slice(
            &SecureProps::new(PropsType::MsgLocal, SECURE_VERSION, &self.local_key).encrypt_properties(msg)?,
        );
        Ok(out)
    }

    /// Producer message for the owner, consumer message for everyone else.
    pub fn encrypt_role_based_message(&self, msg: &PropertyValue) -> Result<Vec<u8>> {
        if self.is_owners_keyring() {
            self.encrypt_producer_message(msg)
        } else {
            self.encrypt_consumer_message(msg)
        }
    }

    /// Whether the hint of `data` points at this ring.
    pub fn matches_message(&self, data: &[u8]) -> bool {
        split_message(data).is_ok_and(|(salt, hint, _)| message_hint(salt, &self.seal_id) == hint)
    }

    pub fn decrypt_message(&self, data: &[u8]) -> Result<SecureMessage> {
        let (salt, hint, payload) = split_message(data)?;
        if message_hint(salt, &self.seal_id) != hint {
            return Err(Error::InvalidSealedMessage);
        }
        // Consumer payloads start with the sealed key length, which is
        // never a valid props type.
        let stored_type = payload.get(..2).and_then(|b| PropsType::from_u16(u16::from_be_bytes([b[0], b[1]])));
        let (role, message) = match stored_type {
            Some(PropsType::MsgProducer) => (MessageRole::Producer, self.decrypt_producer(data, payload)?),
            Some(PropsType::MsgLocal) => (
                MessageRole::LocalOnly,
                SecureProps::new(PropsType::MsgLocal, SECURE_VERSION, &self.local_key).decrypt_properties(payload)?,
            ),
            _ => (MessageRole::Consumer, self.decrypt_consumer(payload)?),
        };
        Ok(SecureMessage { seal_id: self.seal_id.clone(), message, hash: hash_for_encrypted_message(data), role })
    }

    fn decrypt_producer(&self, data: &[u8], payload: &[u8]) -> Result<PropertyValue> {
        let key = self.seal_key()?;
        if payload.len() <= SIGNATURE_LEN {
            return Err(Error::InvalidSealedMessage);
        }
        let (signed, sig) = data.split_at(data.len() - SIGNATURE_LEN);
        self.owner.verify(signed, sig)?;
        let body = &payload[..payload.len() - SIGNATURE_LEN];
        SecureProps::new(PropsType::MsgProducer, SECURE_VERSION, key).decrypt_properties(body)
    }

    fn decrypt_consumer(&self, payload: &[u8]) -> Result<PropertyValue> {
        self.seal_key()?;
        if !self.is_owners_keyring() {
            return Err(Error::UnsupportedConsumerAction);
        }
        if payload.len() < 2 {
            return Err(Error::InvalidSealedMessage);
        }
        let n = u16::from_be_bytes([payload[0], payload[1]]) as usize;
        if payload.len() < 2 + n {
            return Err(Error::InvalidSealedMessage);
        }
        let transient_bytes = self.owner.decrypt(&payload[2..2 + n])?;
        let transient = SymmetricKey::from_bytes(KeyKind::SymTransient, &transient_bytes)?;
        SecureProps::new(PropsType::MsgConsumer, SECURE_VERSION, &transient).decrypt_properties(&payload[2 + n..])
    }
}
