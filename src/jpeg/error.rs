// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Low-level JPEG codec errors.
//!
//! These never cross the crate boundary as-is: they become
//! [`crate::Error::InvalidSecureImage`] through a `From` impl.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JpegError {
    /// Input data is too short or truncated.
    UnexpectedEof,
    /// Missing SOI (0xFFD8) at start of data.
    InvalidSoi,
    /// Progressive, lossless, hierarchical and arithmetic-coded frames.
    UnsupportedMarker(u8),
    /// A marker segment has invalid or inconsistent length/content.
    InvalidMarkerData(&'static str),
    /// Invalid code encountered in scan data.
    HuffmanDecode,
    InvalidQuantTableId(u8),
    InvalidHuffmanTableId(u8),
    /// Component ID referenced in SOS not found in SOF.
    UnknownComponentId(u8),
    InvalidDimensions,
    /// Only 8-bit samples are handled.
    UnsupportedPrecision(u8),
}

impl fmt::Display for JpegError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedEof => write!(f, "unexpected end of JPEG data"),
            Self::InvalidSoi => write!(f, "missing SOI marker (not a JPEG)"),
            Self::UnsupportedMarker(m) => write!(f, "unsupported JPEG marker: 0xFF{m:02X}"),
            Self::InvalidMarkerData(msg) => write!(f, "invalid marker data: {msg}"),
            Self::HuffmanDecode => write!(f, "Huffman decode error"),
            Self::InvalidQuantTableId(id) => write!(f, "invalid quantization table id: {id}"),
            Self::InvalidHuffmanTableId(id) => write!(f, "invalid Huffman table id: {id}"),
            Self::UnknownComponentId(id) => write!(f, "unknown component id in scan: {id}"),
            Self::InvalidDimensions => write!(f, "invalid image dimensions or sampling factors"),
            Self::UnsupportedPrecision(p) => write!(f, "unsupported sample precision: {p} bits"),
        }
    }
}

impl std::error::Error for JpegError {}

pub type Result<T> = std::result::Result<T, JpegError>;
