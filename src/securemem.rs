// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Wipe-capable byte buffer.
//!
//! Every secret in the engine (key bytes, decrypted payloads, archives)
//! travels in a [`SecureBuffer`]. The backing allocation is zeroized when the
//! buffer is dropped, and growth never leaves an unwiped copy behind in a
//! freed allocation.

use std::fmt;
use std::ops::Deref;

use subtle::ConstantTimeEq;
use zeroize::Zeroize;

/// An owned byte region that is overwritten before its memory is released.
pub struct SecureBuffer {
    data: Vec<u8>,
    secure: bool,
}

impl SecureBuffer {
    /// Empty buffer.
    pub fn new() -> Self {
        Self { data: Vec::new(), secure: true }
    }

    /// Zero-filled buffer of `len` bytes.
    pub fn with_len(len: usize) -> Self {
        Self { data: vec![0u8; len], secure: true }
    }

    /// Copy `bytes` into a new secure buffer.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self { data: bytes.to_vec(), secure: true }
    }

    /// Take ownership of an existing vector.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self { data, secure: true }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn as_mut_bytes(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Append bytes, relocating through a fresh allocation when the current
    /// one is too small so the old region can be wiped.
    pub fn append(&mut self, bytes: &[u8]) {
        self.reserve_secure(bytes.len());
        self.data.extend_from_slice(bytes);
    }

    /// Resize to `len`. Growth is zero-filled; shrinking wipes the dropped tail.
    pub fn set_len(&mut self, len: usize) {
        if len <= self.data.len() {
            if self.secure {
                self.data[len..].zeroize();
            }
            self.data.truncate(len);
        } else {
            let extra = len - self.data.len();
            self.reserve_secure(extra);
            self.data.resize(len, 0);
        }
    }

    /// Stop wiping on drop. Used when the content is no longer sensitive and
    /// ownership is handed to code outside the engine.
    pub fn disable_security(&mut self) {
        self.secure = false;
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Hand out the bytes as a plain vector. The buffer stops being wiped.
    pub fn into_vec(mut self) -> Vec<u8> {
        self.disable_security();
        std::mem::take(&mut self.data)
    }

    fn reserve_secure(&mut self, additional: usize) {
        let needed = self.data.len() + additional;
        if needed <= self.data.capacity() {
            return;
        }
        let mut grown = Vec::with_capacity(needed.max(self.data.capacity() * 2));
        grown.extend_from_slice(&self.data);
        let mut old = std::mem::replace(&mut self.data, grown);
        if self.secure {
            old.zeroize();
        }
    }
}

impl Default for SecureBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SecureBuffer {
    fn drop(&mut self) {
        if self.secure {
            // Vec::zeroize also clears spare capacity.
            self.data.zeroize();
        }
    }
}

impl Clone for SecureBuffer {
    fn clone(&self) -> Self {
        Self { data: self.data.clone(), secure: true }
    }
}

impl Deref for SecureBuffer {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.data
    }
}

impl AsRef<[u8]> for SecureBuffer {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

impl PartialEq for SecureBuffer {
    fn eq(&self, other: &Self) -> bool {
        self.data.len() == other.data.len() && bool::from(self.data.as_slice().ct_eq(other.data.as_slice()))
    }
}

impl Eq for SecureBuffer {}

impl fmt::Debug for SecureBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureBuffer")
            .field("len", &self.data.len())
            .field("data", &"[REDACTED]")
            .finish()
    }
}

impl From<Vec<u8>> for SecureBuffer {
    fn from(data: Vec<u8>) -> Self {
        Self::from_vec(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_by_content() {
        let a = SecureBuffer::from_bytes(b"secret");
        let b = SecureBuffer::from_vec(b"secret".to_vec());
        let c = SecureBuffer::from_bytes(b"secreT");
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert_ne!(a, SecureBuffer::from_bytes(b"secre"));
    }

    #[test]
    fn append_and_set_len() {
        let mut buf = SecureBuffer::with_len(2);
        buf.append(&[1, 2, 3]);
        assert_eq!(buf.as_bytes(), &[0, 0, 1, 2, 3]);
        buf.set_len(3);
        assert_eq!(buf.as_bytes(), &[0, 0, 1]);
        buf.set_len(6);
        assert_eq!(buf.as_bytes(), &[0, 0, 1, 0, 0, 0]);
    }

    #[test]
    fn disable_security_hands_out_bytes() {
        let mut buf = SecureBuffer::from_bytes(b"public now");
        assert!(buf.is_secure());
        buf.disable_security();
        assert!(!buf.is_secure());
        assert_eq!(buf.into_vec(), b"public now".to_vec());
    }

    #[test]
    fn debug_is_redacted() {
        let buf = SecureBuffer::from_bytes(b"hunter2");
        let s = format!("{buf:?}");
        assert!(!s.contains("hunter2"));
        assert!(s.contains("REDACTED"));
    }
}
