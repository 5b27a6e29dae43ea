// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Secure Properties codec.
//!
//! A property graph ([`PropertyValue`]) is serialized into a compact binary
//! archive and encrypted under a caller-supplied [`SymmetricKey`]. The blob is
//! typed and versioned so readers can tell "wrong kind of blob" apart from
//! "right kind, older format":
//!
//! ```text
//! [u16 type][u16 version][u32 CRC-32 of body][body]
//! body = AES-256-GCM-SIV( archive ), AAD = type ‖ version
//! ```
//!
//! Archive encoding (all integers big-endian):
//!
//! ```text
//! Bool   0x00 u8
//! Int    0x01 i64
//! Float  0x02 f64 bits
//! String 0x03 u32 len, UTF-8 bytes
//! Data   0x04 u32 len, bytes
//! Array  0x05 u32 count, values...
//! Dict   0x06 u32 count, (u32 key len, key bytes, value)...
//! ```

use std::collections::BTreeMap;

use zeroize::Zeroize;

use crate::bitfile::BitFile;
use crate::crypto::SymmetricKey;
use crate::error::{Error, Result};
use crate::securemem::SecureBuffer;

/// Current format version of every blob this crate writes.
pub const SECURE_VERSION: u16 = 1;

/// Length of the clear header in front of the encrypted body.
const HEADER_LEN: usize = 8;
/// Nested arrays/dicts deeper than this are rejected on parse.
const MAX_DEPTH: usize = 32;

const TAG_BOOL: u8 = 0;
const TAG_INT: u8 = 1;
const TAG_FLOAT: u8 = 2;
const TAG_STRING: u8 = 3;
const TAG_DATA: u8 = 4;
const TAG_ARRAY: u8 = 5;
const TAG_DICT: u8 = 6;

/// A node in a serializable property graph.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Data(Vec<u8>),
    Array(Vec<PropertyValue>),
    Dict(BTreeMap<String, PropertyValue>),
}

impl PropertyValue {
    /// Empty dictionary.
    pub fn dict() -> Self {
        Self::Dict(BTreeMap::new())
    }

    /// Set `key` in a dictionary. A non-dictionary value is replaced by one.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) {
        if !matches!(self, Self::Dict(_)) {
            *self = Self::dict();
        }
        if let Self::Dict(map) = self {
            map.insert(key.into(), value.into());
        }
    }

    /// Builder form of [`set`](Self::set).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Self {
        self.set(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&PropertyValue> {
        match self {
            Self::Dict(map) => map.get(key),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            Self::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_data(&self) -> Option<&[u8]> {
        match self {
            Self::Data(d) => Some(d),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[PropertyValue]> {
        match self {
            Self::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_dict(&self) -> Option<&BTreeMap<String, PropertyValue>> {
        match self {
            Self::Dict(m) => Some(m),
            _ => None,
        }
    }

    pub fn field_str(&self, key: &'static str) -> Result<&str> {
        self.get(key).and_then(Self::as_str).ok_or(Error::InvalidSecureProps(key))
    }

    pub fn field_data(&self, key: &'static str) -> Result<&[u8]> {
        self.get(key).and_then(Self::as_data).ok_or(Error::InvalidSecureProps(key))
    }

    pub fn field_int(&self, key: &'static str) -> Result<i64> {
        self.get(key).and_then(Self::as_int).ok_or(Error::InvalidSecureProps(key))
    }

    pub fn field_bool(&self, key: &'static str) -> Result<bool> {
        self.get(key).and_then(Self::as_bool).ok_or(Error::InvalidSecureProps(key))
    }
}

impl Zeroize for PropertyValue {
    fn zeroize(&mut self) {
        match self {
            Self::Bool(b) => *b = false,
            Self::Int(i) => *i = 0,
            Self::Float(f) => *f = 0.0,
            Self::String(s) => s.zeroize(),
            Self::Data(d) => d.zeroize(),
            Self::Array(items) => {
                items.iter_mut().for_each(Zeroize::zeroize);
                items.clear();
            }
            Self::Dict(map) => {
                for (mut k, mut v) in std::mem::take(map) {
                    k.zeroize();
                    v.zeroize();
                }
            }
        }
    }
}

impl From<bool> for PropertyValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for PropertyValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u32> for PropertyValue {
    fn from(v: u32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<f64> for PropertyValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for PropertyValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<Vec<u8>> for PropertyValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Data(v)
    }
}

impl From<&[u8]> for PropertyValue {
    fn from(v: &[u8]) -> Self {
        Self::Data(v.to_vec())
    }
}

impl From<Vec<PropertyValue>> for PropertyValue {
    fn from(v: Vec<PropertyValue>) -> Self {
        Self::Array(v)
    }
}

// ---------------------------------------------------------------------------
// Plain archive
// ---------------------------------------------------------------------------

/// Serialize a property graph, optionally prefixed by a CRC-32 of the rest.
pub fn build_archive(value: &PropertyValue, crc_prefix: bool) -> Result<SecureBuffer> {
    let mut bf = BitFile::for_write();
    write_value(&mut bf, value)?;
    let body = SecureBuffer::from_vec(bf.into_data()?);
    if !crc_prefix {
        return Ok(body);
    }
    let mut out = SecureBuffer::new();
    out.append(&crc32fast::hash(&body).to_be_bytes());
    out.append(&body);
    Ok(out)
}

/// Parse an archive produced by [`build_archive`].
pub fn parse_archive(data: &[u8], crc_prefix: bool) -> Result<PropertyValue> {
    let body = if crc_prefix {
        if data.len() < 4 {
            return Err(Error::InvalidSecureProps("archive too short"));
        }
        let stored = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
        if crc32fast::hash(&data[4..]) != stored {
            return Err(Error::InvalidSecureProps("archive checksum mismatch"));
        }
        &data[4..]
    } else {
        data
    };

    let mut bf = BitFile::for_read(body.to_vec());
    let value = read_value(&mut bf, 0).map_err(|e| match e {
        Error::EndOfStream => Error::InvalidSecureProps("truncated archive"),
        other => other,
    })?;
    if !bf.is_eof() {
        return Err(Error::InvalidSecureProps("trailing bytes after archive"));
    }
    Ok(value)
}

fn write_len(bf: &mut BitFile, len: usize) -> Result<()> {
    let len = u32::try_from(len).map_err(|_| Error::InvalidArgument("property too large"))?;
    bf.put_u32(len)
}

fn write_value(bf: &mut BitFile, value: &PropertyValue) -> Result<()> {
    match value {
        PropertyValue::Bool(b) => {
            bf.put_u8(TAG_BOOL)?;
            bf.put_u8(*b as u8)
        }
        PropertyValue::Int(i) => {
            bf.put_u8(TAG_INT)?;
            bf.write(&i.to_be_bytes())
        }
        PropertyValue::Float(f) => {
            bf.put_u8(TAG_FLOAT)?;
            bf.write(&f.to_bits().to_be_bytes())
        }
        PropertyValue::String(s) => {
            bf.put_u8(TAG_STRING)?;
            write_len(bf, s.len())?;
            bf.write(s.as_bytes())
        }
        PropertyValue::Data(d) => {
            bf.put_u8(TAG_DATA)?;
            write_len(bf, d.len())?;
            bf.write(d)
        }
        PropertyValue::Array(items) => {
            bf.put_u8(TAG_ARRAY)?;
            write_len(bf, items.len())?;
            items.iter().try_for_each(|item| write_value(bf, item))
        }
        PropertyValue::Dict(map) => {
            bf.put_u8(TAG_DICT)?;
            write_len(bf, map.len())?;
            for (k, v) in map {
                write_len(bf, k.len())?;
                bf.write(k.as_bytes())?;
                write_value(bf, v)?;
            }
            Ok(())
        }
    }
}

/// Read a length and make sure at least `len * min_item` bytes remain.
fn read_len(bf: &mut BitFile, min_item: usize) -> Result<usize> {
    let len = bf.get_u32()? as usize;
    if len.saturating_mul(min_item) > bf.bits_remaining() / 8 {
        return Err(Error::InvalidSecureProps("length exceeds archive"));
    }
    Ok(len)
}

fn read_string(bf: &mut BitFile) -> Result<String> {
    let len = read_len(bf, 1)?;
    String::from_utf8(bf.read_bytes(len)?).map_err(|_| Error::InvalidSecureProps("string is not UTF-8"))
}

fn read_value(bf: &mut BitFile, depth: usize) -> Result<PropertyValue> {
    if depth > MAX_DEPTH {
        return Err(Error::InvalidSecureProps("nesting too deep"));
    }
    let value = match bf.get_u8()? {
        TAG_BOOL => match bf.get_u8()? {
            0 => PropertyValue::Bool(false),
            1 => PropertyValue::Bool(true),
            _ => return Err(Error::InvalidSecureProps("bad boolean")),
        },
        TAG_INT => {
            let hi = bf.get_u32()? as u64;
            let lo = bf.get_u32()? as u64;
            PropertyValue::Int(((hi << 32) | lo) as i64)
        }
        TAG_FLOAT => {
            let hi = bf.get_u32()? as u64;
            let lo = bf.get_u32()? as u64;
            PropertyValue::Float(f64::from_bits((hi << 32) | lo))
        }
        TAG_STRING => PropertyValue::String(read_string(bf)?),
        TAG_DATA => {
            let len = read_len(bf, 1)?;
            PropertyValue::Data(bf.read_bytes(len)?)
        }
        TAG_ARRAY => {
            let count = read_len(bf, 2)?;
            let mut items = Vec::with_capacity(count);
            for _ in 0..count {
                items.push(read_value(bf, depth + 1)?);
            }
            PropertyValue::Array(items)
        }
        TAG_DICT => {
            let count = read_len(bf, 6)?;
            let mut map = BTreeMap::new();
            for _ in 0..count {
                let key = read_string(bf)?;
                let value = read_value(bf, depth + 1)?;
                map.insert(key, value);
            }
            PropertyValue::Dict(map)
        }
        _ => return Err(Error::InvalidSecureProps("unknown value tag")),
    };
    Ok(value)
}

// ---------------------------------------------------------------------------
// Encrypted blobs
// ---------------------------------------------------------------------------

/// Blob type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum PropsType {
    None = 0,
    Seal = 1,
    MsgProducer = 2,
    MsgConsumer = 3,
    MsgLocal = 4,
    App = 5,
}

impl PropsType {
    pub fn from_u16(v: u16) -> Option<Self> {
        Some(match v {
            0 => Self::None,
            1 => Self::Seal,
            2 => Self::MsgProducer,
            3 => Self::MsgConsumer,
            4 => Self::MsgLocal,
            5 => Self::App,
            _ => return None,
        })
    }
}

/// Encrypts and decrypts typed, versioned property blobs under one key.
pub struct SecureProps<'k> {
    ty: PropsType,
    version: u16,
    key: &'k SymmetricKey,
}

impl<'k> SecureProps<'k> {
    pub fn new(ty: PropsType, version: u16, key: &'k SymmetricKey) -> Self {
        Self { ty, version, key }
    }

    /// Bytes in front of the encrypted body.
    pub fn header_len() -> usize {
        HEADER_LEN
    }

    /// Type of a blob if it is one this build can read, else `PropsType::None`.
    pub fn is_supported(blob: &[u8]) -> PropsType {
        match parse_header(blob) {
            Ok((ty, version, _)) if version == SECURE_VERSION => ty,
            _ => PropsType::None,
        }
    }

    fn aad(&self, ty: PropsType) -> [u8; 4] {
        let mut aad = [0u8; 4];
        aad[..2].copy_from_slice(&(ty as u16).to_be_bytes());
        aad[2..].copy_from_slice(&self.version.to_be_bytes());
        aad
    }

    pub fn encrypt_data(&self, data: &[u8]) -> Result<Vec<u8>> {
        let aad = self.aad(self.ty);
        let body = self.key.encrypt_with_aad(data, &aad)?;
        let mut out = Vec::with_capacity(HEADER_LEN + body.len());
        out.extend_from_slice(&aad);
        out.extend_from_slice(&crc32fast::hash(&body).to_be_bytes());
        out.extend_from_slice(&body);
        Ok(out)
    }

    pub fn encrypt_properties(&self, value: &PropertyValue) -> Result<Vec<u8>> {
        let archive = build_archive(value, false)?;
        self.encrypt_data(&archive)
    }

    pub fn decrypt_data(&self, blob: &[u8]) -> Result<SecureBuffer> {
        let (ty, data) = self.decrypt_data_deferred(blob)?;
        if ty != self.ty {
            return Err(Error::InvalidSecureProps("unexpected blob type"));
        }
        Ok(data)
    }

    /// Decrypt without insisting on the configured type; the stored type is
    /// returned instead. The version must still match.
    pub fn decrypt_data_deferred(&self, blob: &[u8]) -> Result<(PropsType, SecureBuffer)> {
        let (ty, version, body) = parse_header(blob)?;
        if version != self.version {
            return Err(Error::SecurePropsVersionMismatch { expected: self.version, found: version });
        }
        let data = self.key.decrypt_with_aad(body, &self.aad(ty))?;
        Ok((ty, data))
    }

    pub fn decrypt_properties(&self, blob: &[u8]) -> Result<PropertyValue> {
        let data = self.decrypt_data(blob)?;
        parse_archive(&data, false)
    }

    pub fn decrypt_properties_deferred(&self, blob: &[u8]) -> Result<(PropsType, PropertyValue)> {
        let (ty, data) = self.decrypt_data_deferred(blob)?;
        Ok((ty, parse_archive(&data, false)?))
    }
}

/// Validate length, CRC and type tag; returns the body slice.
fn parse_header(blob: &[u8]) -> Result<(PropsType, u16, &[u8])> {
    if blob.len() < HEADER_LEN {
        return Err(Error::InvalidSecureProps("blob too short"));
    }
    let raw_type = u16::from_be_bytes([blob[0], blob[1]]);
    let version = u16::from_be_bytes([blob[2], blob[3]]);
    let crc = u32::from_be_bytes([blob[4], blob[5], blob[6], blob[7]]);
    let body = &blob[HEADER_LEN..];
    if crc32fast::hash(body) != crc {
        return Err(Error::InvalidSecureProps("checksum mismatch"));
    }
    let ty = PropsType::from_u16(raw_type)
        .filter(|t| *t != PropsType::None)
        .ok_or(Error::InvalidSecureProps("unknown blob type"))?;
    Ok((ty, version, body))
}
