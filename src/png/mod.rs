// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Lossless PNG carriers.
//!
//! A minimal PNG codec (8-bit RGB/RGBA, no interlacing) plus LSB embedding
//! in the color channels. PNG carriers are never scrambled.

pub mod chunk;
pub mod pack;
pub mod scanline;
pub mod unpack;

pub use pack::{bits_per_pixel, encode_png, max_data_for_image, pack, repack};
pub use unpack::{hash_image_data, is_data_png, read_image, unpack, MIN_IDENTIFICATION_LEN};
