// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Seals: a key ring plus its picture and lifecycle.
//!
//! A seal is valid until it expires (consumer seals self-destruct after a
//! number of days without use) or is revoked. Expired seals still read old
//! messages but write nothing; revoked seals do neither.
//!
//! Password export layout:
//!
//! ```text
//! [magic "SEALX"][u8 version][16 salt][12 KDF params][u32 BE n][n bytes bundle][scrambler section]
//! ```
//!
//! Bundle and scrambler section are encrypted under different subkeys of the
//! password-derived key, with the clear header as associated data.

use std::time::{SystemTime, UNIX_EPOCH};

use image::RgbaImage;
use log::{debug, info};
use sha2::{Digest, Sha256};
use zeroize::Zeroizing;

use crate::crypto::kdf::{self, KdfParams, PARAMS_LEN, SALT_LEN};
use crate::crypto::{KeyKind, KeyStore, SymmetricKey};
use crate::error::{Error, Result};
use crate::jpeg::{self, DctMethod};
use crate::keyring::{Keyring, SecureMessage, ATTRIBUTE_DATA_LEN};
use crate::pack::{pack_image, unpack_image, PackOptions};
use crate::props::{build_archive, parse_archive, PropertyValue};
use crate::scrambler::ScramblerKey;
use crate::securemem::SecureBuffer;

pub const DEFAULT_SELF_DESTRUCT_DAYS: u16 = 30;
pub const MAX_SELF_DESTRUCT_DAYS: u16 = 365;

const SECS_PER_DAY: u64 = 86_400;
const ATTRIBUTES_VERSION: u8 = 1;
const ARCHIVE_VERSION: i64 = 1;
const EXPORT_MAGIC: &[u8; 5] = b"SEALX";
const EXPORT_VERSION: u8 = 1;
const EXPORT_HEADER_LEN: usize = EXPORT_MAGIC.len() + 1 + SALT_LEN + PARAMS_LEN;

const FLAG_INVALIDATE_ON_SNAPSHOT: u8 = 1;
const FLAG_INVALIDATED: u8 = 2;

pub(crate) fn unix_now() -> u64 {
    SystemTime::now().duration_since(UNIX_EPOCH).map_or(0, |d| d.as_secs())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum SealColor {
    Purple = 0,
    Orange = 1,
    #[default]
    Yellow = 2,
    Green = 3,
    Blue = 4,
}

impl SealColor {
    pub fn from_u8(v: u8) -> Option<Self> {
        Some(match v {
            0 => Self::Purple,
            1 => Self::Orange,
            2 => Self::Yellow,
            3 => Self::Green,
            4 => Self::Blue,
            _ => return None,
        })
    }
}

/// Settings stored in the ring's attribute blob.
///
/// Packed as `[u8 version][u8 color][u16 days][u64 expiration][u8 flags]`
/// big-endian, zero-padded to [`ATTRIBUTE_DATA_LEN`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SealAttributes {
    pub color: SealColor,
    pub self_destruct_days: u16,
    /// Unix seconds; 0 means the seal never expires.
    pub expiration: u64,
    pub invalidate_on_snapshot: bool,
    pub invalidated: bool,
}

impl SealAttributes {
    pub fn new(color: SealColor) -> Self {
        Self {
            color,
            self_destruct_days: DEFAULT_SELF_DESTRUCT_DAYS,
            expiration: 0,
            invalidate_on_snapshot: false,
            invalidated: false,
        }
    }

    pub fn to_bytes(&self) -> [u8; ATTRIBUTE_DATA_LEN] {
        let mut b = [0u8; ATTRIBUTE_DATA_LEN];
        b[0] = ATTRIBUTES_VERSION;
        b[1] = self.color as u8;
        b[2..4].copy_from_slice(&self.self_destruct_days.to_be_bytes());
        b[4..12].copy_from_slice(&self.expiration.to_be_bytes());
        let mut flags = 0;
        if self.invalidate_on_snapshot {
            flags |= FLAG_INVALIDATE_ON_SNAPSHOT;
        }
        if self.invalidated {
            flags |= FLAG_INVALIDATED;
        }
        b[12] = flags;
        b
    }

    pub fn from_bytes(b: &[u8]) -> Result<Self> {
        if b.len() != ATTRIBUTE_DATA_LEN || b[0] != ATTRIBUTES_VERSION {
            return Err(Error::InvalidSeal);
        }
        let mut exp = [0u8; 8];
        exp.copy_from_slice(&b[4..12]);
        Ok(Self {
            color: SealColor::from_u8(b[1]).ok_or(Error::InvalidSeal)?,
            self_destruct_days: u16::from_be_bytes([b[2], b[3]]),
            expiration: u64::from_be_bytes(exp),
            invalidate_on_snapshot: b[12] & FLAG_INVALIDATE_ON_SNAPSHOT != 0,
            invalidated: b[12] & FLAG_INVALIDATED != 0,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SealState {
    Valid,
    Expired,
    Revoked,
}

/// A seal bound to the key store that holds its ring.
pub struct Seal<'s> {
    store: &'s KeyStore,
    ring: Keyring,
    image: Vec<u8>,
    attrs: SealAttributes,
}

impl std::fmt::Debug for Seal<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Seal").field("ring", &self.ring).field("attrs", &self.attrs).finish_non_exhaustive()
    }
}

impl<'s> Seal<'s> {
    /// New producer seal whose picture is `img`. The picture carries a
    /// signed identity message scrambled with the seal's own key.
    pub fn create(store: &'s KeyStore, img: &RgbaImage, color: SealColor) -> Result<Self> {
        let scrambler = ScramblerKey::generate();
        let attrs = SealAttributes::new(color);
        let ring = Keyring::alloc_new_ring(store, scrambler.key_bytes(), &attrs.to_bytes())?;
        let identity = PropertyValue::dict()
            .with("sealId", ring.seal_id())
            .with("color", color as i64);
        let image = ring.encrypt_producer_message(&identity).and_then(|payload| {
            jpeg::pack(img, jpeg::default_quality_for_messaging(), &payload, Some(&scrambler), DctMethod::default())
        });
        let image = match image {
            Ok(image) => image,
            Err(e) => {
                Keyring::delete_ring(store, ring.seal_id())?;
                return Err(match e {
                    Error::PackedDataOverflow { .. } => Error::SealCreationFailed("seal image is too small"),
                    other => other,
                });
            }
        };
        info!("seal {} created", ring.seal_id());
        Ok(Self { store, ring, image, attrs })
    }

    /// Open a seal whose ring is already in `store`.
    pub fn load(store: &'s KeyStore, seal_id: &str, image: Vec<u8>) -> Result<Self> {
        let ring = Keyring::load(store, seal_id)?;
        let attrs = SealAttributes::from_bytes(&ring.attribute_data(store)?)?;
        Ok(Self { store, ring, image, attrs })
    }

    pub fn seal_id(&self) -> &str {
        self.ring.seal_id()
    }

    pub fn keyring(&self) -> &Keyring {
        &self.ring
    }

    pub fn is_producer_seal(&self) -> bool {
        self.ring.is_owners_keyring()
    }

    /// The seal's JPEG picture.
    pub fn seal_image(&self) -> &[u8] {
        &self.image
    }

    pub fn attributes(&self) -> &SealAttributes {
        &self.attrs
    }

    fn save_attributes(&mut self, attrs: SealAttributes) -> Result<()> {
        self.ring.set_attributes(self.store, &attrs.to_bytes())?;
        self.attrs = attrs;
        Ok(())
    }

    pub fn color(&self) -> SealColor {
        self.attrs.color
    }

    pub fn set_color(&mut self, color: SealColor) -> Result<()> {
        self.save_attributes(SealAttributes { color, ..self.attrs })
    }

    pub fn self_destruct_days(&self) -> u16 {
        self.attrs.self_destruct_days
    }

    /// Change the self-destruct period; the expiration restarts from now.
    /// 0 days turns self-destruct off.
    pub fn set_self_destruct(&mut self, days: u16) -> Result<()> {
        self.set_self_destruct_at(days, unix_now())
    }

    /// Only a valid seal takes a new period; expired and revoked seals stay
    /// that way.
    pub fn set_self_destruct_at(&mut self, days: u16, now: u64) -> Result<()> {
        if days > MAX_SELF_DESTRUCT_DAYS {
            return Err(Error::InvalidArgument("self-destruct days out of range"));
        }
        self.require_valid_at(now)?;
        let expiration = expiration_after(days, now);
        self.save_attributes(SealAttributes { self_destruct_days: days, expiration, ..self.attrs })
    }

    /// Restart the self-destruct clock, as after receiving a message.
    pub fn refresh_expiration_at(&mut self, now: u64) -> Result<()> {
        self.set_self_destruct_at(self.attrs.self_destruct_days, now)
    }

    /// Expiration in unix seconds pushed out by `day_padding` days, or
    /// `None` for seals that never expire.
    pub fn expiration_date(&self, day_padding: u16) -> Option<u64> {
        (self.attrs.expiration != 0).then(|| self.attrs.expiration + day_padding as u64 * SECS_PER_DAY)
    }

    /// Move the expiration of a valid seal. 0 disables expiry.
    pub fn set_expiration_date(&mut self, expiration: u64) -> Result<()> {
        self.require_valid_at(unix_now())?;
        self.set_expiration_date_unconditionally(expiration)
    }

    /// Like [`set_expiration_date`](Self::set_expiration_date) without the
    /// state check.
    pub fn set_expiration_date_unconditionally(&mut self, expiration: u64) -> Result<()> {
        self.save_attributes(SealAttributes { expiration, ..self.attrs })
    }

    pub fn is_expired_at(&self, now: u64, day_padding: u16) -> bool {
        self.expiration_date(day_padding).is_some_and(|exp| now >= exp)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(unix_now(), 0)
    }

    pub fn is_invalidated(&self) -> bool {
        self.attrs.invalidated || !self.ring.is_valid()
    }

    pub fn state_at(&self, now: u64) -> SealState {
        if self.is_invalidated() {
            SealState::Revoked
        } else if self.is_expired_at(now, 0) {
            SealState::Expired
        } else {
            SealState::Valid
        }
    }

    pub fn state(&self) -> SealState {
        self.state_at(unix_now())
    }

    /// Revoke an expired seal. A seal that has not expired yet is left
    /// alone and `SealStillValid` is returned.
    pub fn invalidate_expired_at(&mut self, now: u64) -> Result<()> {
        if !self.is_expired_at(now, 0) {
            return Err(Error::SealStillValid);
        }
        self.invalidate_unconditionally()
    }

    pub fn invalidate_unconditionally(&mut self) -> Result<()> {
        self.save_attributes(SealAttributes { invalidated: true, ..self.attrs })?;
        self.ring.invalidate_symmetric_key(self.store)?;
        info!("seal {} revoked", self.seal_id());
        Ok(())
    }

    pub fn set_invalidate_on_snapshot(&mut self, enabled: bool) -> Result<()> {
        self.save_attributes(SealAttributes { invalidate_on_snapshot: enabled, ..self.attrs })
    }

    /// Called when the user took a screenshot. Consumer seals that asked
    /// for it are revoked; returns whether that happened.
    pub fn invalidate_for_snapshot(&mut self) -> Result<bool> {
        if !self.attrs.invalidate_on_snapshot || self.is_producer_seal() || self.is_invalidated() {
            return Ok(false);
        }
        self.invalidate_unconditionally()?;
        Ok(true)
    }

    fn require_valid_at(&self, now: u64) -> Result<()> {
        match self.state_at(now) {
            SealState::Valid => Ok(()),
            _ => Err(Error::InvalidSeal),
        }
    }

    fn require_writable(&self) -> Result<()> {
        self.require_valid_at(unix_now())
    }

    pub fn encrypt_producer_message(&self, msg: &PropertyValue) -> Result<Vec<u8>> {
        self.require_writable()?;
        self.ring.encrypt_producer_message(msg)
    }

    pub fn encrypt_consumer_message(&self, msg: &PropertyValue) -> Result<Vec<u8>> {
        self.require_writable()?;
        self.ring.encrypt_consumer_message(msg)
    }

    pub fn encrypt_local_only_message(&self, msg: &PropertyValue) -> Result<Vec<u8>> {
        self.require_writable()?;
        self.ring.encrypt_local_only_message(msg)
    }

    pub fn encrypt_role_based_message(&self, msg: &PropertyValue) -> Result<Vec<u8>> {
        self.require_writable()?;
        self.ring.encrypt_role_based_message(msg)
    }

    /// Works on expired seals, not on revoked ones.
    pub fn decrypt_message(&self, data: &[u8]) -> Result<SecureMessage> {
        if self.is_invalidated() {
            return Err(Error::InvalidSeal);
        }
        self.ring.decrypt_message(data)
    }

    /// Encrypt `msg` for this seal's role and hide it in `img`. JPEG
    /// carriers are scrambled with the seal's key.
    pub fn pack_message(&self, img: &RgbaImage, msg: &PropertyValue, options: &PackOptions) -> Result<Vec<u8>> {
        let payload = self.encrypt_role_based_message(msg)?;
        let key = match options.format {
            crate::pack::ImageFormat::Jpeg => Some(self.ring.scrambler_key()),
            crate::pack::ImageFormat::Png => None,
        };
        pack_image(img, &payload, options, key)
    }

    /// Reverse of [`pack_message`](Self::pack_message).
    pub fn unpack_message(&self, data: &[u8]) -> Result<SecureMessage> {
        let payload = unpack_image(data, data.len(), Some(self.ring.scrambler_key()))?;
        self.decrypt_message(&payload)
    }

    fn archive_dict(&self, for_external: bool) -> Result<PropertyValue> {
        Ok(PropertyValue::dict()
            .with("version", ARCHIVE_VERSION)
            .with("ring", self.ring.export_for_external(self.store, for_external, None)?)
            .with("image", self.image.as_slice()))
    }

    /// Everything needed to rebuild this seal on this device, including the
    /// owner's private key and the scrambler key.
    pub fn seal_archive(&self) -> Result<SecureBuffer> {
        let dict = self
            .archive_dict(false)?
            .with("scrambler", &self.ring.scrambler_key().key_bytes()[..]);
        build_archive(&dict, true)
    }

    /// Rebuild a seal from [`seal_archive`](Self::seal_archive) output. The
    /// ring is imported unless the store already has it.
    pub fn from_archive(store: &'s KeyStore, data: &[u8]) -> Result<Self> {
        let dict = parse_archive(data, true)?;
        if dict.field_int("version")? != ARCHIVE_VERSION {
            return Err(Error::SealVersionMismatch);
        }
        let ring = dict.get("ring").ok_or(Error::InvalidSeal)?;
        let image = dict.field_data("image")?.to_vec();
        let seal_id = match Keyring::seal_for_collection(ring) {
            Some(id) => id,
            // Revoked rings carry no seal key to check the id against, so
            // they only load over a ring the store already holds.
            None if ring.get("sealKey").is_none() => {
                let claimed = ring.field_str("sealId")?;
                if !Keyring::exists(store, claimed)? {
                    return Err(Error::InvalidSeal);
                }
                return Self::load(store, claimed, image);
            }
            None => return Err(Error::InvalidSeal),
        };
        if !Keyring::exists(store, &seal_id)? {
            Keyring::import_from_collection(store, ring, dict.field_data("scrambler")?)?;
        }
        Self::load(store, &seal_id, image)
    }

    /// Share this seal, protected by `password`. The export carries the
    /// owner's public key only, so the importer becomes a consumer.
    pub fn export_with_password(&self, password: &str, params: &KdfParams) -> Result<Vec<u8>> {
        if !self.ring.is_valid() {
            return Err(Error::InvalidSeal);
        }
        self.write_export(&self.archive_dict(true)?, password, params)
    }

    fn write_export(&self, dict: &PropertyValue, password: &str, params: &KdfParams) -> Result<Vec<u8>> {
        let salt = kdf::random_salt();
        let mut out = Vec::with_capacity(EXPORT_HEADER_LEN + 4 + self.image.len() + 4096);
        out.extend_from_slice(EXPORT_MAGIC);
        out.push(EXPORT_VERSION);
        out.extend_from_slice(&salt);
        out.extend_from_slice(&params.to_bytes());

        let (bundle_key, scrambler_key) = export_keys(password, &salt, params)?;
        let header = out.clone();
        let bundle = bundle_key.encrypt_with_aad(&build_archive(dict, false)?, &header)?;
        let scrambler = scrambler_key.encrypt_with_aad(self.ring.scrambler_key().key_bytes(), &header)?;
        let bundle_len = u32::try_from(bundle.len()).map_err(|_| Error::SealFailure)?;
        out.extend_from_slice(&bundle_len.to_be_bytes());
        out.extend_from_slice(&bundle);
        out.extend_from_slice(&scrambler);
        debug!("seal {} exported ({} bytes)", self.seal_id(), out.len());
        Ok(out)
    }

    /// Import a password export as a consumer seal. The self-destruct clock
    /// starts now.
    pub fn import_with_password(store: &'s KeyStore, data: &[u8], password: &str) -> Result<Self> {
        if data.len() < EXPORT_MAGIC.len() || &data[..EXPORT_MAGIC.len()] != EXPORT_MAGIC {
            return Err(Error::InvalidSeal);
        }
        if data.len() < EXPORT_HEADER_LEN + 4 {
            return Err(Error::InvalidSeal);
        }
        if data[EXPORT_MAGIC.len()] != EXPORT_VERSION {
            return Err(Error::SealVersionMismatch);
        }
        let header = &data[..EXPORT_HEADER_LEN];
        let salt = &header[EXPORT_MAGIC.len() + 1..EXPORT_MAGIC.len() + 1 + SALT_LEN];
        let params = KdfParams::from_bytes(&header[EXPORT_HEADER_LEN - PARAMS_LEN..])?;
        let rest = &data[EXPORT_HEADER_LEN..];
        let bundle_len = u32::from_be_bytes([rest[0], rest[1], rest[2], rest[3]]) as usize;
        if rest.len() - 4 < bundle_len {
            return Err(Error::InvalidSeal);
        }
        let (bundle, scrambler) = rest[4..].split_at(bundle_len);

        let (bundle_key, scrambler_key) = export_keys(password, salt, &params)?;
        let bundle = bundle_key.decrypt_with_aad(bundle, header).map_err(|_| Error::BadPassword)?;
        let scrambler = scrambler_key.decrypt_with_aad(scrambler, header).map_err(|_| Error::BadPassword)?;

        let dict = parse_archive(&bundle, false)?;
        if dict.field_int("version")? != ARCHIVE_VERSION {
            return Err(Error::SealVersionMismatch);
        }
        let ring = dict.get("ring").ok_or(Error::InvalidSeal)?;
        let image = dict.field_data("image")?.to_vec();
        let seal_id = Keyring::import_from_collection(store, ring, &scrambler)?;
        match Self::finish_import(store, &seal_id, image) {
            Ok(seal) => {
                info!("seal {seal_id} imported");
                Ok(seal)
            }
            Err(e) => {
                Keyring::delete_ring(store, &seal_id)?;
                Err(e)
            }
        }
    }

    fn finish_import(store: &'s KeyStore, seal_id: &str, image: Vec<u8>) -> Result<Self> {
        let mut seal = Self::load(store, seal_id, image)?;
        if !seal.is_producer_seal() {
            let days = seal.attrs.self_destruct_days;
            seal.save_attributes(SealAttributes { expiration: expiration_after(days, unix_now()), ..seal.attrs })?;
        }
        Ok(seal)
    }
}

/// Expiration `days` after `now`; 0 days never expires.
fn expiration_after(days: u16, now: u64) -> u64 {
    match days {
        0 => 0,
        d => now + d as u64 * SECS_PER_DAY,
    }
}

/// Bundle and scrambler subkeys of a password.
fn export_keys(password: &str, salt: &[u8], params: &KdfParams) -> Result<(SymmetricKey, SymmetricKey)> {
    let master = kdf::derive_key(password, salt, params)?;
    let subkey = |label: &[u8]| {
        let mut h = Sha256::new();
        h.update(label);
        h.update(&master[..]);
        let bytes: Zeroizing<[u8; 32]> = Zeroizing::new(h.finalize().into());
        SymmetricKey::from_bytes(KeyKind::SymTransient, &bytes[..])
    };
    Ok((subkey(b"seal-core export bundle")?, subkey(b"seal-core export scrambler")?))
}
