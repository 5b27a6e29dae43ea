// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! The password-wrapped master key.
//!
//! `appkey.bin` layout:
//!
//! ```text
//! [magic "SAPK"][u8 version][16 salt][12 KDF params][wrapped master key]
//! ```
//!
//! The wrapping key is Argon2id(password, salt); the clear header is bound
//! in as associated data. Changing the password re-wraps the same master
//! key, so nothing encrypted under it has to be rewritten.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use log::warn;

use super::write_atomic;
use crate::crypto::kdf::{self, KdfParams, PARAMS_LEN, SALT_LEN};
use crate::crypto::{KeyKind, SymmetricKey};
use crate::error::{Error, Result};

pub const APPKEY_FILENAME: &str = "appkey.bin";

const MAGIC: &[u8; 4] = b"SAPK";
const VERSION: u8 = 1;
const HEADER_LEN: usize = MAGIC.len() + 1 + SALT_LEN + PARAMS_LEN;

/// Master key handle. Invalid once its credentials are dropped.
pub struct AppKey {
    path: PathBuf,
    master: Option<SymmetricKey>,
}

impl std::fmt::Debug for AppKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppKey").field("path", &self.path).field("valid", &self.is_valid()).finish()
    }
}

fn wrapping_key(password: &str, salt: &[u8], params: &KdfParams) -> Result<SymmetricKey> {
    let kek = kdf::derive_key(password, salt, params)?;
    SymmetricKey::from_bytes(KeyKind::SymTransient, &kek[..])
}

fn wrap(master: &SymmetricKey, password: &str, params: &KdfParams) -> Result<Vec<u8>> {
    let salt = kdf::random_salt();
    let mut out = Vec::with_capacity(HEADER_LEN + 64);
    out.extend_from_slice(MAGIC);
    out.push(VERSION);
    out.extend_from_slice(&salt);
    out.extend_from_slice(&params.to_bytes());
    let wrapped = wrapping_key(password, &salt, params)?.encrypt_with_aad(master.key_bytes(), &out)?;
    out.extend_from_slice(&wrapped);
    Ok(out)
}

impl AppKey {
    pub fn path_in(root: &Path) -> PathBuf {
        root.join(APPKEY_FILENAME)
    }

    pub fn is_installed(root: &Path) -> bool {
        Self::path_in(root).is_file()
    }

    /// Generate a master key and store it wrapped under `password`.
    pub fn create_new_key_with_password(root: &Path, password: &str, params: &KdfParams) -> Result<Self> {
        let path = Self::path_in(root);
        if path.exists() {
            return Err(Error::KeyExists(APPKEY_FILENAME.to_string()));
        }
        let master = SymmetricKey::generate(KeyKind::SymGlobal);
        write_atomic(&path, &wrap(&master, password, params)?).map_err(Error::AppKeySaveFailure)?;
        Ok(Self { path, master: Some(master) })
    }

    /// Unwrap the stored master key.
    pub fn authenticate(root: &Path, password: &str) -> Result<Self> {
        let path = Self::path_in(root);
        let data = fs::read(&path).map_err(Error::AppKeyLoadFailure)?;
        if data.len() < HEADER_LEN || &data[..MAGIC.len()] != MAGIC {
            warn!("application key file is incomplete");
            return Err(Error::PartialAppKey);
        }
        if data[MAGIC.len()] != VERSION {
            return Err(Error::AppKeyLoadFailure(io::Error::new(
                io::ErrorKind::InvalidData,
                "unknown application key version",
            )));
        }
        let (header, wrapped) = data.split_at(HEADER_LEN);
        let salt = &header[MAGIC.len() + 1..MAGIC.len() + 1 + SALT_LEN];
        let params = KdfParams::from_bytes(&header[HEADER_LEN - PARAMS_LEN..])?;
        let master = wrapping_key(password, salt, &params)?
            .decrypt_with_aad(wrapped, header)
            .map_err(|_| {
                warn!("application key rejected the password");
                Error::BadPassword
            })?;
        let master = SymmetricKey::from_bytes(KeyKind::SymGlobal, &master)?;
        Ok(Self { path, master: Some(master) })
    }

    /// Re-wrap the master key under a new password.
    pub fn change_password(&mut self, new_password: &str, params: &KdfParams) -> Result<()> {
        let wrapped = wrap(self.master_key()?, new_password, params)?;
        write_atomic(&self.path, &wrapped).map_err(Error::AppKeySaveFailure)
    }

    /// Forget the unwrapped master key.
    pub fn invalidate_credentials(&mut self) {
        self.master = None;
    }

    pub fn is_valid(&self) -> bool {
        self.master.is_some()
    }

    pub fn master_key(&self) -> Result<&SymmetricKey> {
        self.master.as_ref().ok_or(Error::AuthRequired)
    }
}
