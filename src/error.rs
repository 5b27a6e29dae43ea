// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Crate-wide error type.
//!
//! Every failure the engine can report is a variant of [`Error`], and every
//! variant carries a stable numeric code (see [`Error::code`]) so callers on
//! the other side of an FFI or persistence boundary can match on it.
//!
//! Cryptographic failures are deliberately opaque: [`Error::CryptoFailure`]
//! never says *why* a decrypt or verify failed.

use std::collections::TryReserveError;

use thiserror::Error;

use crate::jpeg::error::JpegError;

/// Errors produced by the sealed-messaging engine.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),
    #[error("operation aborted")]
    Aborted,
    #[error("payload exceeds the image capacity ({needed} > {capacity} bytes)")]
    PackedDataOverflow { needed: usize, capacity: usize },
    #[error("failed to produce image output: {0}")]
    ImageOutputFailure(&'static str),
    #[error("not a valid packed image: {0}")]
    InvalidSecureImage(String),
    #[error("key already exists: {0}")]
    KeyExists(String),
    #[error("key not found: {0}")]
    KeyNotFound(String),
    #[error("keystore failure: {0}")]
    KeychainFailure(&'static str),
    #[error("out of memory")]
    OutOfMemory,
    #[error("cryptographic operation failed")]
    CryptoFailure,
    #[error("key material is too short or malformed")]
    InsufficientKey,
    #[error("authentication required")]
    AuthRequired,
    #[error("authentication failed")]
    AuthFailed,
    #[error("failed to save application key")]
    AppKeySaveFailure(#[source] std::io::Error),
    #[error("failed to load application key")]
    AppKeyLoadFailure(#[source] std::io::Error),
    #[error("failed to write encrypted data")]
    FailedToWriteEncrypted,
    #[error("failed to read encrypted data")]
    FailedToReadEncrypted,
    #[error("image scrambling failed")]
    ImageScramblingFailed,
    #[error("seal creation failed: {0}")]
    SealCreationFailed(&'static str),
    #[error("file write failed")]
    FileWriteFailed(#[source] std::io::Error),
    #[error("seal file could not be read")]
    SealFileReadFailed(#[source] std::io::Error),
    #[error("seal format version mismatch")]
    SealVersionMismatch,
    #[error("file read failed")]
    FileReadFailed(#[source] std::io::Error),
    #[error("read past the end of a bit stream")]
    EndOfStream,
    #[error("invalid secure properties: {0}")]
    InvalidSecureProps(&'static str),
    #[error("operation is not available to a seal consumer")]
    UnsupportedConsumerAction,
    #[error("operation is not available to the seal producer")]
    UnsupportedProducerAction,
    #[error("secure properties version mismatch (expected {expected}, found {found})")]
    SecurePropsVersionMismatch { expected: u16, found: u16 },
    #[error("seal is no longer usable")]
    InvalidSeal,
    #[error("not a sealed message for this seal")]
    InvalidSealedMessage,
    #[error("unknown payload format")]
    UnknownPayload,
    #[error("invalid seal image")]
    InvalidSealImage,
    #[error("seal operation failed")]
    SealFailure,
    #[error("bad password")]
    BadPassword,
    #[error("could not access the vault")]
    CouldNotAccessVault(#[source] std::io::Error),
    #[error("vault credentials are stale")]
    StaleVaultCreds,
    #[error("application key installation is incomplete")]
    PartialAppKey,
    #[error("seal file could not be deleted")]
    SealFileDeletionError(#[source] std::io::Error),
    #[error("seal is still valid")]
    SealStillValid,
}

impl Error {
    /// Stable numeric code for this error.
    pub fn code(&self) -> i32 {
        match self {
            Self::InvalidArgument(_) => -1,
            Self::Aborted => -2,
            Self::PackedDataOverflow { .. } => -3,
            Self::ImageOutputFailure(_) => -4,
            Self::InvalidSecureImage(_) => -5,
            Self::KeyExists(_) => -6,
            Self::KeyNotFound(_) => -7,
            Self::KeychainFailure(_) => -8,
            Self::OutOfMemory => -9,
            Self::CryptoFailure => -10,
            Self::InsufficientKey => -11,
            Self::AuthRequired => -12,
            Self::AuthFailed => -13,
            Self::AppKeySaveFailure(_) => -14,
            Self::AppKeyLoadFailure(_) => -15,
            Self::FailedToWriteEncrypted => -16,
            Self::FailedToReadEncrypted => -17,
            Self::ImageScramblingFailed => -18,
            Self::SealCreationFailed(_) => -19,
            Self::FileWriteFailed(_) => -20,
            Self::SealFileReadFailed(_) => -21,
            Self::SealVersionMismatch => -22,
            Self::FileReadFailed(_) | Self::EndOfStream => -25,
            Self::InvalidSecureProps(_) => -26,
            Self::UnsupportedConsumerAction => -27,
            Self::UnsupportedProducerAction => -28,
            Self::SecurePropsVersionMismatch { .. } => -29,
            Self::InvalidSeal => -30,
            Self::InvalidSealedMessage => -31,
            Self::UnknownPayload => -32,
            Self::InvalidSealImage => -33,
            Self::SealFailure => -34,
            Self::BadPassword => -35,
            Self::CouldNotAccessVault(_) => -36,
            Self::StaleVaultCreds => -37,
            Self::PartialAppKey => -38,
            Self::SealFileDeletionError(_) => -40,
            Self::SealStillValid => 41,
        }
    }

    pub(crate) fn corrupt_image(what: impl Into<String>) -> Self {
        Self::InvalidSecureImage(what.into())
    }
}

/// Buffers sized from untrusted headers are reserved fallibly.
impl From<TryReserveError> for Error {
    fn from(_: TryReserveError) -> Self {
        Self::OutOfMemory
    }
}

impl From<JpegError> for Error {
    fn from(e: JpegError) -> Self {
        Self::InvalidSecureImage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_match_table() {
        assert_eq!(Error::InvalidArgument("x").code(), -1);
        assert_eq!(Error::PackedDataOverflow { needed: 2, capacity: 1 }.code(), -3);
        assert_eq!(Error::CryptoFailure.code(), -10);
        assert_eq!(Error::BadPassword.code(), -35);
        assert_eq!(Error::SealStillValid.code(), 41);
        assert_eq!(Error::EndOfStream.code(), -25);
    }

    #[test]
    fn failed_reservation_is_out_of_memory() {
        let e: Error = Vec::<u8>::new().try_reserve_exact(usize::MAX).unwrap_err().into();
        assert!(matches!(e, Error::OutOfMemory));
        assert_eq!(e.code(), -9);
    }

    #[test]
    fn crypto_failure_is_opaque() {
        assert_eq!(Error::CryptoFailure.to_string(), "cryptographic operation failed");
    }

    #[test]
    fn jpeg_errors_become_invalid_image() {
        let e: Error = JpegError::InvalidSoi.into();
        assert_eq!(e.code(), -5);
    }
}
