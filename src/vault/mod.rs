// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Password-protected on-disk vault.
//!
//! Everything lives below [`VaultConfig::root`]:
//!
//! | path                  | contents                                        |
//! |-----------------------|-------------------------------------------------|
//! | `appkey.bin`          | master key wrapped under the password           |
//! | `vault.verify`        | App props under the master key (vault salt)     |
//! | `keychain.sec`        | the whole [`KeyStore`] under the master key      |
//! | `seals/<id>.seal`     | seal archives                                   |
//! | `files/<name>`        | caller files                                    |
//!
//! Files are replaced through a temp file and a rename. While the vault is
//! closed every seal or file operation fails with `AuthRequired`.

pub mod appkey;

use std::borrow::Cow;
use std::fs;
use std::io;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use aes_gcm_siv::Aes256GcmSiv;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::RgbaImage;
use log::{debug, info, warn};
use zeroize::Zeroize;

pub use appkey::AppKey;

use crate::crypto::hash::{hash_hex, sha256};
use crate::crypto::kdf::{self, KdfParams};
use crate::crypto::symmetric::{open_with, seal_with};
use crate::crypto::KeyStore;
use crate::error::{Error, Result};
use crate::keyring::{self, Keyring, MessageIdentification, SecureMessage};
use crate::pack::{detect_format, Carrier};
use crate::props::{PropertyValue, PropsType, SecureProps, SECURE_VERSION};
use crate::seal::{unix_now, Seal, SealColor, SealState};
use crate::securemem::SecureBuffer;

const VERIFY_FILENAME: &str = "vault.verify";
const KEYCHAIN_FILENAME: &str = "keychain.sec";
const SEALS_DIRNAME: &str = "seals";
const FILES_DIRNAME: &str = "files";
const SEAL_EXTENSION: &str = "seal";
const VERIFY_MARKER: &str = "seal-core vault";

/// Replace `path` with `bytes` through a sibling temp file.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> io::Result<()> {
    let tmp_path = PathBuf::from(format!("{}.tmp", path.to_string_lossy()));
    fs::write(&tmp_path, bytes)?;
    fs::rename(&tmp_path, path)
}

/// Where the vault lives and how passwords are stretched.
#[derive(Debug, Clone)]
pub struct VaultConfig {
    pub root: PathBuf,
    pub kdf: KdfParams,
}

impl VaultConfig {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into(), kdf: KdfParams::default() }
    }

    pub fn with_kdf(mut self, kdf: KdfParams) -> Self {
        self.kdf = kdf;
        self
    }
}

/// Text encoding for [`Vault::safe_salted_string`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaltedEncoding {
    Hex,
    Base64,
}

/// Cached cipher for a batch of vault crypto. Not `Send`; the cipher is
/// dropped with the guard.
pub struct KeyContext<'v> {
    cipher: Aes256GcmSiv,
    _vault: PhantomData<&'v Vault>,
    _not_send: PhantomData<*const ()>,
}

impl KeyContext<'_> {
    pub fn encrypt(&self, plaintext: &[u8], aad: &[u8]) -> Result<Vec<u8>> {
        seal_with(&self.cipher, plaintext, aad)
    }

    pub fn decrypt(&self, data: &[u8], aad: &[u8]) -> Result<SecureBuffer> {
        open_with(&self.cipher, data, aad)
    }
}

impl Drop for KeyContext<'_> {
    fn drop(&mut self) {
        debug!("key context released");
    }
}

struct OpenState {
    appkey: AppKey,
    /// Stable per-vault salt; survives password changes.
    salt: Vec<u8>,
}

/// The vault. Holds the key store while open.
pub struct Vault {
    config: VaultConfig,
    state: Option<OpenState>,
    store: KeyStore,
}

impl std::fmt::Debug for Vault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Vault").field("root", &self.config.root).field("open", &self.is_open()).finish()
    }
}

impl Vault {
    pub fn new(config: VaultConfig) -> Self {
        Self { config, state: None, store: KeyStore::new() }
    }

    pub fn config(&self) -> &VaultConfig {
        &self.config
    }

    fn path(&self, name: &str) -> PathBuf {
        self.config.root.join(name)
    }

    fn seal_path(&self, seal_id: &str) -> Result<PathBuf> {
        check_name(seal_id)?;
        Ok(self.config.root.join(SEALS_DIRNAME).join(format!("{seal_id}.{SEAL_EXTENSION}")))
    }

    pub fn has_vault(&self) -> bool {
        AppKey::is_installed(&self.config.root)
    }

    pub fn is_open(&self) -> bool {
        self.state.as_ref().is_some_and(|s| s.appkey.is_valid())
    }

    fn open_state(&self) -> Result<&OpenState> {
        self.state.as_ref().filter(|s| s.appkey.is_valid()).ok_or(Error::AuthRequired)
    }

    /// Key store of the open vault.
    pub fn key_store(&self) -> Result<&KeyStore> {
        self.open_state()?;
        Ok(&self.store)
    }

    /// Create a new vault protected by `password` and leave it open.
    pub fn initialize(&mut self, password: &str) -> Result<()> {
        if self.has_vault() {
            return Err(Error::KeyExists("vault".to_string()));
        }
        for dir in [SEALS_DIRNAME, FILES_DIRNAME] {
            fs::create_dir_all(self.path(dir)).map_err(Error::CouldNotAccessVault)?;
        }
        let appkey = AppKey::create_new_key_with_password(&self.config.root, password, &self.config.kdf)?;
        let salt = kdf::random_salt().to_vec();
        let verify = PropertyValue::dict()
            .with("marker", VERIFY_MARKER)
            .with("salt", salt.as_slice())
            .with("created", unix_now() as i64);
        let blob = SecureProps::new(PropsType::App, SECURE_VERSION, appkey.master_key()?).encrypt_properties(&verify)?;
        write_atomic(&self.path(VERIFY_FILENAME), &blob).map_err(Error::FileWriteFailed)?;

        self.store.clear()?;
        self.state = Some(OpenState { appkey, salt });
        self.save_keychain()?;
        info!("vault initialized at {}", self.config.root.display());
        Ok(())
    }

    /// Unlock with `password` and load the key store.
    pub fn open(&mut self, password: &str) -> Result<()> {
        if !self.has_vault() {
            return Err(Error::CouldNotAccessVault(io::Error::new(io::ErrorKind::NotFound, "no vault")));
        }
        self.close();
        let appkey = AppKey::authenticate(&self.config.root, password)?;
        let verify = match fs::read(self.path(VERIFY_FILENAME)) {
            Ok(v) => v,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("vault has an application key but no verifier");
                return Err(Error::PartialAppKey);
            }
            Err(e) => return Err(Error::CouldNotAccessVault(e)),
        };
        let master = appkey.master_key()?;
        let verify = SecureProps::new(PropsType::App, SECURE_VERSION, master)
            .decrypt_properties(&verify)
            .map_err(|_| {
                warn!("vault verifier does not match the application key");
                Error::StaleVaultCreds
            })?;
        if verify.field_str("marker")? != VERIFY_MARKER {
            return Err(Error::StaleVaultCreds);
        }
        let salt = verify.field_data("salt")?.to_vec();

        match fs::read(self.path(KEYCHAIN_FILENAME)) {
            Ok(blob) => self.store.import_encrypted(&blob, master)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => self.store.clear()?,
            Err(e) => return Err(Error::CouldNotAccessVault(e)),
        }
        self.state = Some(OpenState { appkey, salt });
        info!("vault opened");
        Ok(())
    }

    /// Forget the master key and every loaded secret.
    pub fn close(&mut self) {
        if let Some(mut state) = self.state.take() {
            state.appkey.invalidate_credentials();
            info!("vault closed");
        }
        if let Err(e) = self.store.clear() {
            warn!("key store could not be cleared: {e}");
        }
    }

    /// Close and delete every vault file.
    pub fn destroy(&mut self) -> Result<()> {
        self.close();
        for name in [appkey::APPKEY_FILENAME, VERIFY_FILENAME, KEYCHAIN_FILENAME] {
            match fs::remove_file(self.path(name)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::CouldNotAccessVault(e)),
            }
        }
        for dir in [SEALS_DIRNAME, FILES_DIRNAME] {
            match fs::remove_dir_all(self.path(dir)) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::CouldNotAccessVault(e)),
            }
        }
        info!("vault destroyed");
        Ok(())
    }

    /// Re-wrap the master key. Works open or closed; `old` must be right.
    pub fn change_password(&mut self, old: &str, new: &str) -> Result<()> {
        let mut appkey = AppKey::authenticate(&self.config.root, old)?;
        appkey.change_password(new, &self.config.kdf)?;
        if let Some(state) = self.state.as_mut() {
            state.appkey = appkey;
        }
        info!("vault password changed");
        Ok(())
    }

    /// Start a batch of master-key crypto.
    pub fn start_key_context(&self) -> Result<KeyContext<'_>> {
        let cipher = self.open_state()?.appkey.master_key()?.cipher()?;
        Ok(KeyContext { cipher, _vault: PhantomData, _not_send: PhantomData })
    }

    fn save_keychain(&self) -> Result<()> {
        let blob = self.store.export_encrypted(self.open_state()?.appkey.master_key()?)?;
        write_atomic(&self.path(KEYCHAIN_FILENAME), &blob).map_err(Error::FileWriteFailed)
    }

    /// Store `data` encrypted under `files/<name>`.
    pub fn write_file(&self, name: &str, data: &[u8]) -> Result<()> {
        check_name(name)?;
        let ctx = self.start_key_context()?;
        let blob = ctx.encrypt(data, file_aad(name).as_bytes())?;
        write_atomic(&self.path(FILES_DIRNAME).join(name), &blob).map_err(Error::FileWriteFailed)
    }

    pub fn read_file(&self, name: &str) -> Result<SecureBuffer> {
        check_name(name)?;
        let ctx = self.start_key_context()?;
        let blob = fs::read(self.path(FILES_DIRNAME).join(name)).map_err(Error::FileReadFailed)?;
        ctx.decrypt(&blob, file_aad(name).as_bytes()).map_err(|_| Error::FailedToReadEncrypted)
    }

    /// New producer seal, saved to disk.
    pub fn create_seal(&self, img: &RgbaImage, color: SealColor) -> Result<Seal<'_>> {
        self.open_state()?;
        let seal = Seal::create(&self.store, img, color)?;
        self.save_seal(&seal)?;
        Ok(seal)
    }

    pub fn available_seals(&self) -> Result<Vec<String>> {
        self.open_state()?;
        Keyring::available_keyrings(&self.store)
    }

    pub fn seal_exists(&self, seal_id: &str) -> Result<bool> {
        self.open_state()?;
        Keyring::exists(&self.store, seal_id)
    }

    pub fn seal_for_id(&self, seal_id: &str) -> Result<Seal<'_>> {
        let ctx = self.start_key_context()?;
        if !Keyring::exists(&self.store, seal_id)? {
            return Err(Error::KeyNotFound(seal_id.to_string()));
        }
        let blob = fs::read(self.seal_path(seal_id)?).map_err(Error::SealFileReadFailed)?;
        let archive = ctx
            .decrypt(&blob, seal_aad(seal_id).as_bytes())
            .map_err(|_| Error::FailedToReadEncrypted)?;
        Seal::from_archive(&self.store, &archive)
    }

    /// Persist a seal's archive and the key store.
    pub fn save_seal(&self, seal: &Seal<'_>) -> Result<()> {
        let ctx = self.start_key_context()?;
        let blob = ctx.encrypt(&seal.seal_archive()?, seal_aad(seal.seal_id()).as_bytes())?;
        write_atomic(&self.seal_path(seal.seal_id())?, &blob).map_err(Error::FileWriteFailed)?;
        drop(ctx);
        self.save_keychain()
    }

    /// Import a password export and save it.
    pub fn import_seal(&self, data: &[u8], password: &str) -> Result<Seal<'_>> {
        self.open_state()?;
        let seal = Seal::import_with_password(&self.store, data, password)?;
        if let Err(e) = self.save_seal(&seal) {
            Keyring::delete_ring(&self.store, seal.seal_id())?;
            return Err(e);
        }
        info!("seal {} imported into the vault", seal.seal_id());
        Ok(seal)
    }

    pub fn export_seal(&self, seal_id: &str, password: &str) -> Result<Vec<u8>> {
        self.seal_for_id(seal_id)?.export_with_password(password, &self.config.kdf)
    }

    pub fn delete_seal(&self, seal_id: &str) -> Result<()> {
        self.open_state()?;
        Keyring::delete_ring(&self.store, seal_id)?;
        match fs::remove_file(self.seal_path(seal_id)?) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(Error::SealFileDeletionError(e)),
        }
        self.save_keychain()?;
        info!("seal {seal_id} deleted");
        Ok(())
    }

    fn rings(&self) -> Result<Vec<Keyring>> {
        self.available_seals()?
            .iter()
            .map(|id| Keyring::load(&self.store, id))
            .collect()
    }

    /// Which seal of this vault a message was written for.
    pub fn identify_encrypted_message(&self, data: &[u8]) -> Result<MessageIdentification> {
        Ok(keyring::identify_encrypted_message(data, &self.rings()?))
    }

    /// Find the seal a packed image belongs to and decrypt its message. A
    /// producer message received on a consumer seal restarts that seal's
    /// self-destruct clock.
    pub fn decrypt_packed_image(&self, data: &[u8]) -> Result<SecureMessage> {
        if detect_format(data).is_none() {
            return Err(Error::corrupt_image("neither jpeg nor png"));
        }
        let carrier = Carrier::parse(data, data.len()).map_err(|_| Error::InvalidSealedMessage)?;
        // Only scrambled carriers read differently per ring.
        let plain = if carrier.is_scrambled() {
            None
        } else {
            Some(carrier.payload(None).map_err(|_| Error::InvalidSealedMessage)?)
        };
        for ring in self.rings()? {
            let payload = match &plain {
                Some(p) => Cow::Borrowed(p.as_slice()),
                None => match carrier.payload(Some(ring.scrambler_key())) {
                    Ok(p) => Cow::Owned(p),
                    Err(_) => continue,
                },
            };
            if !ring.matches_message(&payload) {
                continue;
            }
            let mut seal = self.seal_for_id(ring.seal_id())?;
            let message = seal.decrypt_message(&payload)?;
            if message.is_producer_generated() && !seal.is_producer_seal() && seal.state() == SealState::Valid {
                seal.refresh_expiration_at(unix_now())?;
                self.save_keychain()?;
            }
            return Ok(message);
        }
        Err(Error::InvalidSealedMessage)
    }

    /// Hash `s` with the vault salt so it can be stored without revealing it.
    pub fn safe_salted_string(&self, s: &str, encoding: SaltedEncoding) -> Result<String> {
        let mut buf = self.open_state()?.salt.clone();
        buf.extend_from_slice(s.as_bytes());
        let digest = sha256(&buf);
        Ok(match encoding {
            SaltedEncoding::Hex => hex::encode(digest),
            SaltedEncoding::Base64 => STANDARD.encode(digest),
        })
    }

    /// Short public identifier of the master key.
    pub fn master_key_fingerprint(&self) -> Result<String> {
        let key = self.open_state()?.appkey.master_key()?;
        let mut buf = b"seal-core fingerprint".to_vec();
        buf.extend_from_slice(key.key_bytes());
        let fp = hash_hex(&buf);
        buf.zeroize();
        Ok(fp[..16].to_string())
    }
}

impl Drop for Vault {
    fn drop(&mut self) {
        self.close();
    }
}

fn check_name(name: &str) -> Result<()> {
    let ok = !name.is_empty()
        && name != "."
        && name != ".."
        && !name.ends_with(".tmp")
        && !name.contains(|c| matches!(c, '/' | '\\' | '\0'));
    if ok {
        Ok(())
    } else {
        Err(Error::InvalidArgument("bad vault file name"))
    }
}

fn file_aad(name: &str) -> String {
    format!("file:{name}")
}

fn seal_aad(seal_id: &str) -> String {
    format!("seal:{seal_id}")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vault_in(dir: &Path) -> Vault {
        Vault::new(VaultConfig::new(dir).with_kdf(KdfParams::interactive_low()))
    }

    #[test]
    fn closed_vault_requires_auth() {
        let dir = tempfile::tempdir().unwrap();
        let vault = vault_in(dir.path());
        assert!(!vault.has_vault());
        assert!(matches!(vault.write_file("a", b"x"), Err(Error::AuthRequired)));
        assert!(matches!(vault.available_seals(), Err(Error::AuthRequired)));
        assert!(matches!(vault.start_key_context().err(), Some(Error::AuthRequired)));
    }

    #[test]
    fn files_roundtrip_and_are_bound_to_their_name() {
        let dir = tempfile::tempdir().unwrap();
        let mut vault = vault_in(dir.path());
        vault.initialize("pw").unwrap();
        vault.write_file("notes", b"remember this").unwrap();
        assert_eq!(&vault.read_file("notes").unwrap()[..], b"remember this");
        assert!(matches!(vault.write_file("../x", b""), Err(Error::InvalidArgument(_))));

        let files = dir.path().join(FILES_DIRNAME);
        fs::copy(files.join("notes"), files.join("other")).unwrap();
        assert!(matches!(vault.read_file("other"), Err(Error::FailedToReadEncrypted)));
        assert!(matches!(vault.read_file("missing"), Err(Error::FileReadFailed(_))));
    }

    #[test]
    fn salted_strings_survive_password_change() {
        let dir = tempfile::tempdir().unwrap();
        let mut vault = vault_in(dir.path());
        vault.initialize("pw").unwrap();
        let hex_form = vault.safe_salted_string("alice", SaltedEncoding::Hex).unwrap();
        let b64 = vault.safe_salted_string("alice", SaltedEncoding::Base64).unwrap();
        assert_eq!(hex_form.len(), 64);
        assert_eq!(b64.len(), 44);
        let fp = vault.master_key_fingerprint().unwrap();

        vault.change_password("pw", "new").unwrap();
        vault.close();
        vault.open("new").unwrap();
        assert_eq!(vault.safe_salted_string("alice", SaltedEncoding::Hex).unwrap(), hex_form);
        assert_eq!(vault.master_key_fingerprint().unwrap(), fp);
    }

    #[test]
    fn missing_verifier_is_partial() {
        let dir = tempfile::tempdir().unwrap();
        let mut vault = vault_in(dir.path());
        vault.initialize("pw").unwrap();
        vault.close();
        fs::remove_file(dir.path().join(VERIFY_FILENAME)).unwrap();
        assert!(matches!(vault.open("pw"), Err(Error::PartialAppKey)));
    }

    #[test]
    fn key_context_encrypts_under_the_master_key() {
        let dir = tempfile::tempdir().unwrap();
        let mut vault = vault_in(dir.path());
        vault.initialize("pw").unwrap();
        let ctx = vault.start_key_context().unwrap();
        let blob = ctx.encrypt(b"batch", b"aad").unwrap();
        assert_eq!(&ctx.decrypt(&blob, b"aad").unwrap()[..], b"batch");
        assert!(ctx.decrypt(&blob, b"other").is_err());
    }
}
