// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! PNG carrier tests: LSB capacity limits and pixel fidelity.

use image::{Rgba, RgbaImage};
use seal_core::{png, Error, ImageFormat, PackOptions};

fn test_picture(w: u32, h: u32, alpha: u8) -> RgbaImage {
    RgbaImage::from_fn(w, h, |x, y| Rgba([(x * 9) as u8, (y * 5) as u8, (x ^ y) as u8, alpha]))
}

#[test]
fn exact_capacity_fits_and_one_more_overflows() {
    let img = test_picture(40, 30, 255);
    let cap = png::max_data_for_image(40, 30);
    assert_eq!(cap, 40 * 30 * 3 / 8 - 4);

    let payload: Vec<u8> = (0..cap).map(|i| (i % 256) as u8).collect();
    let data = png::pack(&img, &payload).unwrap();
    assert_eq!(png::unpack(&data, cap).unwrap(), payload);

    let too_big = vec![0x5a; cap + 1];
    assert!(matches!(png::pack(&img, &too_big), Err(Error::PackedDataOverflow { needed, capacity })
        if needed == cap + 1 && capacity == cap));
}

#[test]
fn only_low_bits_of_color_change() {
    let img = test_picture(24, 24, 200);
    let data = png::pack(&img, b"pixel fidelity").unwrap();
    let back = png::read_image(&data).unwrap();
    assert_eq!(back.dimensions(), img.dimensions());
    for (a, b) in img.pixels().zip(back.pixels()) {
        for c in 0..3 {
            assert_eq!(a.0[c] & !1, b.0[c] & !1);
        }
        assert_eq!(a.0[3], b.0[3], "alpha must be untouched");
    }
}

#[test]
fn facade_routes_png_and_rejects_scrambling() {
    let img = test_picture(32, 32, 255);
    let data = seal_core::pack_image(&img, b"via facade", &PackOptions::png(), None).unwrap();
    assert_eq!(seal_core::detect_format(&data), Some(ImageFormat::Png));
    assert!(seal_core::is_supported_packed_file(&data));
    assert_eq!(seal_core::unpack_image(&data, data.len(), None).unwrap(), b"via facade");

    let key = seal_core::ScramblerKey::generate();
    assert!(matches!(
        seal_core::pack_image(&img, b"x", &PackOptions::png(), Some(&key)),
        Err(Error::InvalidArgument(_))
    ));
}

#[test]
fn repack_keeps_picture_hash() {
    let img = test_picture(32, 16, 255);
    let first = png::pack(&img, b"one").unwrap();
    let second = seal_core::repack_image(&first, b"two, longer", None).unwrap();
    assert_eq!(png::unpack(&second, 64).unwrap(), b"two, longer");
    assert_eq!(
        seal_core::hash_image_data(&first).unwrap(),
        seal_core::hash_image_data(&second).unwrap()
    );
}

#[test]
fn truncated_file_is_rejected() {
    let img = test_picture(16, 16, 255);
    let data = png::pack(&img, b"abc").unwrap();
    assert!(png::unpack(&data[..data.len() - 20], 64).is_err());
    assert!(!seal_core::has_enough_data_for_type_identification(&data[..4]));
}
