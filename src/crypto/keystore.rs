// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Tag-addressed key storage.
//!
//! One [`KeyStore`] holds every secret the engine knows about, keyed by a tag
//! string. Reads share the lock; create/delete/rename take it exclusively.
//! No method holds the lock while doing crypto or I/O: persistence snapshots
//! the entries first and encrypts after the guard is released.

use std::collections::BTreeMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use zeroize::Zeroize;

use super::symmetric::SymmetricKey;
use super::KeyKind;
use crate::error::{Error, Result};
use crate::props::{PropertyValue, PropsType, SecureProps, SECURE_VERSION};
use crate::securemem::SecureBuffer;

struct Entry {
    kind: KeyKind,
    label: String,
    material: SecureBuffer,
}

/// Reader-writer locked map of tag → key material.
#[derive(Default)]
pub struct KeyStore {
    entries: RwLock<BTreeMap<String, Entry>>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, BTreeMap<String, Entry>>> {
        self.entries.read().map_err(|_| Error::KeychainFailure("keystore lock poisoned"))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, BTreeMap<String, Entry>>> {
        self.entries.write().map_err(|_| Error::KeychainFailure("keystore lock poisoned"))
    }

    /// Add a new entry. Fails with `KeyExists` if `tag` is taken.
    pub fn insert(&self, tag: &str, kind: KeyKind, material: &[u8]) -> Result<()> {
        self.insert_labeled(tag, kind, "", material)
    }

    pub fn insert_labeled(&self, tag: &str, kind: KeyKind, label: &str, material: &[u8]) -> Result<()> {
        let mut entries = self.write()?;
        if entries.contains_key(tag) {
            return Err(Error::KeyExists(tag.to_string()));
        }
        entries.insert(
            tag.to_string(),
            Entry { kind, label: label.to_string(), material: SecureBuffer::from_bytes(material) },
        );
        Ok(())
    }

    /// Insert or replace.
    pub fn upsert(&self, tag: &str, kind: KeyKind, material: &[u8]) -> Result<()> {
        let mut entries = self.write()?;
        let label = entries.get(tag).map(|e| e.label.clone()).unwrap_or_default();
        entries.insert(
            tag.to_string(),
            Entry { kind, label, material: SecureBuffer::from_bytes(material) },
        );
        Ok(())
    }

    /// Copy of the material stored under `tag`.
    pub fn get(&self, tag: &str) -> Result<(KeyKind, SecureBuffer)> {
        let entries = self.read()?;
        let entry = entries.get(tag).ok_or_else(|| Error::KeyNotFound(tag.to_string()))?;
        Ok((entry.kind, entry.material.clone()))
    }

    pub fn label(&self, tag: &str) -> Result<String> {
        let entries = self.read()?;
        entries
            .get(tag)
            .map(|e| e.label.clone())
            .ok_or_else(|| Error::KeyNotFound(tag.to_string()))
    }

    pub fn contains(&self, tag: &str) -> Result<bool> {
        Ok(self.read()?.contains_key(tag))
    }

    pub fn delete(&self, tag: &str) -> Result<()> {
        self.write()?
            .remove(tag)
            .map(drop)
            .ok_or_else(|| Error::KeyNotFound(tag.to_string()))
    }

    /// Remove every entry whose tag starts with `prefix`; returns the count.
    pub fn delete_prefix(&self, prefix: &str) -> Result<usize> {
        let mut entries = self.write()?;
        let doomed: Vec<String> = entries.keys().filter(|t| t.starts_with(prefix)).cloned().collect();
        for tag in &doomed {
            entries.remove(tag);
        }
        Ok(doomed.len())
    }

    pub fn rename(&self, old_tag: &str, new_tag: &str) -> Result<()> {
        let mut entries = self.write()?;
        if entries.contains_key(new_tag) {
            return Err(Error::KeyExists(new_tag.to_string()));
        }
        let entry = entries.remove(old_tag).ok_or_else(|| Error::KeyNotFound(old_tag.to_string()))?;
        entries.insert(new_tag.to_string(), entry);
        Ok(())
    }

    /// Tags in sorted order, optionally filtered by kind.
    pub fn tags(&self, kind: Option<KeyKind>) -> Result<Vec<String>> {
        Ok(self
            .read()?
            .iter()
            .filter(|(_, e)| kind.map_or(true, |k| e.kind == k))
            .map(|(t, _)| t.clone())
            .collect())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read()?.is_empty())
    }

    /// Drop every entry; material is wiped as it is dropped.
    pub fn clear(&self) -> Result<()> {
        self.write()?.clear();
        Ok(())
    }

    /// Serialize all entries as an App-typed secure properties blob.
    pub fn export_encrypted(&self, key: &SymmetricKey) -> Result<Vec<u8>> {
        let mut snapshot = {
            let entries = self.read()?;
            let mut dict = PropertyValue::dict();
            for (tag, e) in entries.iter() {
                dict.set(
                    tag.clone(),
                    PropertyValue::dict()
                        .with("kind", e.kind as i64)
                        .with("label", e.label.as_str())
                        .with("data", e.material.as_bytes()),
                );
            }
            dict
        };
        let blob = SecureProps::new(PropsType::App, SECURE_VERSION, key).encrypt_properties(&snapshot);
        snapshot.zeroize();
        blob
    }

    /// Replace every entry with the contents of an exported blob. On error
    /// the store is left untouched.
    pub fn import_encrypted(&self, blob: &[u8], key: &SymmetricKey) -> Result<()> {
        let mut props = SecureProps::new(PropsType::App, SECURE_VERSION, key).decrypt_properties(blob)?;
        let parsed = parse_entries(&props);
        props.zeroize();
        let parsed = parsed?;
        *self.write()? = parsed;
        Ok(())
    }
}

fn parse_entries(props: &PropertyValue) -> Result<BTreeMap<String, Entry>> {
    let dict = props.as_dict().ok_or(Error::InvalidSecureProps("keystore is not a dictionary"))?;
    let mut out = BTreeMap::new();
    for (tag, v) in dict {
        let kind = u8::try_from(v.field_int("kind")?)
            .ok()
            .and_then(KeyKind::from_u8)
            .ok_or(Error::InvalidSecureProps("unknown key kind"))?;
        out.insert(
            tag.clone(),
            Entry {
                kind,
                label: v.field_str("label")?.to_string(),
                material: SecureBuffer::from_bytes(v.field_data("data")?),
            },
        );
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_delete() {
        let store = KeyStore::new();
        store.insert("a", KeyKind::Salt, b"salty").unwrap();
        assert!(matches!(store.insert("a", KeyKind::Salt, b"x"), Err(Error::KeyExists(_))));
        let (kind, data) = store.get("a").unwrap();
        assert_eq!(kind, KeyKind::Salt);
        assert_eq!(data.as_bytes(), b"salty");
        store.delete("a").unwrap();
        assert!(matches!(store.get("a"), Err(Error::KeyNotFound(_))));
        assert!(matches!(store.delete("a"), Err(Error::KeyNotFound(_))));
    }

    #[test]
    fn upsert_replaces() {
        let store = KeyStore::new();
        store.upsert("a", KeyKind::Aes, b"one").unwrap();
        store.upsert("a", KeyKind::Aes, b"two").unwrap();
        assert_eq!(store.get("a").unwrap().1.as_bytes(), b"two");
    }

    #[test]
    fn rename_refuses_collisions() {
        let store = KeyStore::new();
        store.insert("a", KeyKind::Aes, b"1").unwrap();
        store.insert("b", KeyKind::Aes, b"2").unwrap();
        assert!(matches!(store.rename("a", "b"), Err(Error::KeyExists(_))));
        store.rename("a", "c").unwrap();
        assert_eq!(store.tags(None).unwrap(), vec!["b".to_string(), "c".to_string()]);
    }

    #[test]
    fn tags_filter_by_kind_and_prefix_delete() {
        let store = KeyStore::new();
        store.insert("s1:seal", KeyKind::SymSeal, b"k").unwrap();
        store.insert("s1:attr", KeyKind::SymAttributes, b"k").unwrap();
        store.insert("s2:seal", KeyKind::SymSeal, b"k").unwrap();
        assert_eq!(store.tags(Some(KeyKind::SymSeal)).unwrap().len(), 2);
        assert_eq!(store.delete_prefix("s1:").unwrap(), 2);
        assert_eq!(store.len().unwrap(), 1);
    }

    #[test]
    fn encrypted_export_import() {
        let store = KeyStore::new();
        store.insert_labeled("x", KeyKind::Scramble, "scrambler", &[9u8; 32]).unwrap();
        store.insert("y", KeyKind::PublicKey, &[1u8; 64]).unwrap();
        let key = SymmetricKey::generate(KeyKind::SymGlobal);
        let blob = store.export_encrypted(&key).unwrap();

        let other = KeyStore::new();
        other.insert("stale", KeyKind::Aes, b"gone").unwrap();
        other.import_encrypted(&blob, &key).unwrap();
        assert!(!other.contains("stale").unwrap());
        assert_eq!(other.label("x").unwrap(), "scrambler");
        assert_eq!(other.get("y").unwrap().1.as_bytes(), &[1u8; 64]);

        let wrong = SymmetricKey::generate(KeyKind::SymGlobal);
        assert!(matches!(other.import_encrypted(&blob, &wrong), Err(Error::CryptoFailure)));
        assert_eq!(other.len().unwrap(), 2);
    }

    #[test]
    fn concurrent_readers() {
        let store = std::sync::Arc::new(KeyStore::new());
        store.insert("k", KeyKind::Aes, &[7u8; 32]).unwrap();
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let s = store.clone();
                std::thread::spawn(move || s.get("k").unwrap().1.len())
            })
            .collect();
        for h in handles {
            assert_eq!(h.join().unwrap(), 32);
        }
    }
}
