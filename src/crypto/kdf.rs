// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Password-based key derivation (Argon2id).
//!
//! Parameters travel with every salt they were used with, so stored data
//! keeps opening after the defaults change.

use argon2::{Algorithm, Argon2, Params, Version};
use zeroize::Zeroizing;

use super::random_array;
use crate::error::{Error, Result};

/// Argon2 salt length in bytes.
pub const SALT_LEN: usize = 16;
/// Serialized [`KdfParams`] length.
pub const PARAMS_LEN: usize = 12;

const MAX_MEMORY_KIB: u32 = 1 << 21;
const MAX_ITERATIONS: u32 = 64;
const MAX_LANES: u32 = 16;

/// Argon2id cost parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KdfParams {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for KdfParams {
    /// 19 MiB, 2 passes, 1 lane.
    fn default() -> Self {
        Self { memory_kib: 19 * 1024, iterations: 2, parallelism: 1 }
    }
}

impl KdfParams {
    /// Cheap profile for constrained devices and test suites.
    pub fn interactive_low() -> Self {
        Self { memory_kib: 8 * 1024, iterations: 1, parallelism: 1 }
    }

    pub fn to_bytes(&self) -> [u8; PARAMS_LEN] {
        let mut out = [0u8; PARAMS_LEN];
        out[..4].copy_from_slice(&self.memory_kib.to_be_bytes());
        out[4..8].copy_from_slice(&self.iterations.to_be_bytes());
        out[8..].copy_from_slice(&self.parallelism.to_be_bytes());
        out
    }

    /// Parse stored parameters, rejecting values no honest writer produces.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != PARAMS_LEN {
            return Err(Error::InvalidArgument("bad KDF parameter block"));
        }
        let word = |i: usize| u32::from_be_bytes([bytes[i], bytes[i + 1], bytes[i + 2], bytes[i + 3]]);
        let params = Self { memory_kib: word(0), iterations: word(4), parallelism: word(8) };
        params.validate()?;
        Ok(params)
    }

    fn validate(&self) -> Result<()> {
        let lanes_ok = (1..=MAX_LANES).contains(&self.parallelism);
        let iters_ok = (1..=MAX_ITERATIONS).contains(&self.iterations);
        let mem_ok = self.memory_kib >= 8 * self.parallelism && self.memory_kib <= MAX_MEMORY_KIB;
        if lanes_ok && iters_ok && mem_ok {
            Ok(())
        } else {
            Err(Error::InvalidArgument("KDF parameters out of range"))
        }
    }
}

/// Fresh random salt.
pub fn random_salt() -> [u8; SALT_LEN] {
    random_array()
}

/// Derive a 256-bit key from `password` and `salt`.
pub fn derive_key(password: &str, salt: &[u8], params: &KdfParams) -> Result<Zeroizing<[u8; 32]>> {
    params.validate()?;
    let argon_params = Params::new(params.memory_kib, params.iterations, params.parallelism, Some(32))
        .map_err(|_| Error::InvalidArgument("KDF parameters rejected"))?;
    let argon = Argon2::new(Algorithm::Argon2id, Version::V0x13, argon_params);
    let mut key = Zeroizing::new([0u8; 32]);
    argon
        .hash_password_into(password.as_bytes(), salt, &mut *key)
        .map_err(|_| Error::CryptoFailure)?;
    Ok(key)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_for_same_inputs() {
        let p = KdfParams::interactive_low();
        let salt = [7u8; SALT_LEN];
        let a = derive_key("correct horse", &salt, &p).unwrap();
        let b = derive_key("correct horse", &salt, &p).unwrap();
        let c = derive_key("correct horse!", &salt, &p).unwrap();
        assert_eq!(*a, *b);
        assert_ne!(*a, *c);
    }

    #[test]
    fn salt_changes_key() {
        let p = KdfParams::interactive_low();
        let a = derive_key("pw", &[1u8; SALT_LEN], &p).unwrap();
        let b = derive_key("pw", &[2u8; SALT_LEN], &p).unwrap();
        assert_ne!(*a, *b);
    }

    #[test]
    fn params_serialize() {
        let p = KdfParams::default();
        assert_eq!(KdfParams::from_bytes(&p.to_bytes()).unwrap(), p);
    }

    #[test]
    fn hostile_params_are_rejected() {
        let p = KdfParams { memory_kib: u32::MAX, iterations: 1, parallelism: 1 };
        assert!(KdfParams::from_bytes(&p.to_bytes()).is_err());
        let p = KdfParams { memory_kib: 1024, iterations: 0, parallelism: 1 };
        assert!(derive_key("pw", &[0u8; SALT_LEN], &p).is_err());
    }
}
