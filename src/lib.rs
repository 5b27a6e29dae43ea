// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! # seal-core
//!
//! Pure-Rust sealed-messaging engine. Messages are encrypted for one of
//! three roles of a *seal* and hidden inside ordinary JPEG or PNG pictures:
//!
//! - **Producer** messages are written by the seal owner and signed; every
//!   consumer of the seal can read them.
//! - **Consumer** messages are written by a seal holder and only the owner
//!   can read them.
//! - **Local-only** messages never leave the device that wrote them.
//!
//! Key material lives in a [`crypto::KeyStore`] that a password-protected
//! [`vault::Vault`] persists to disk. The JPEG codec (`jpeg` module) is
//! written from scratch so payload bits can go straight into quantized DCT
//! coefficients; carriers of a seal are additionally scrambled with a
//! per-seal key.
//!
//! # Quick start
//!
//! ```rust,ignore
//! use seal_core::{PackOptions, PropertyValue, SealColor, Vault, VaultConfig};
//!
//! let mut vault = Vault::new(VaultConfig::new("/tmp/vault"));
//! vault.initialize("passphrase")?;
//! let seal = vault.create_seal(&picture, SealColor::Blue)?;
//! let msg = PropertyValue::dict().with("text", "hello");
//! let carrier = seal.pack_message(&photo, &msg, &PackOptions::default())?;
//! let read = vault.decrypt_packed_image(&carrier)?;
//! ```

pub mod bitfile;
pub mod crypto;
pub mod error;
pub mod jpeg;
pub mod keyring;
pub mod pack;
pub mod png;
pub mod props;
pub mod scrambler;
pub mod seal;
pub mod securemem;
pub mod vault;

pub use error::{Error, Result};
pub use jpeg::error::JpegError;
pub use jpeg::{DctMethod, JpegImage};
pub use crypto::{KdfParams, KeyKind, KeyPair, KeyStore, SymmetricKey};
pub use keyring::{Keyring, MessageIdentification, MessageRole, SecureMessage};
pub use pack::{
    detect_format, has_enough_data_for_type_identification, hash_image_data, is_data_jpeg, is_data_png,
    is_supported_packed_file, max_data_for_image, min_identification_len, pack_image, repack_image,
    unpack_image, ImageFormat, PackOptions,
};
pub use props::{PropertyValue, PropsType, SecureProps};
pub use scrambler::ScramblerKey;
pub use seal::{Seal, SealAttributes, SealColor, SealState};
pub use securemem::SecureBuffer;
pub use vault::{AppKey, KeyContext, SaltedEncoding, Vault, VaultConfig};
