// Copyright (c) 2026 Christoph Gaffga
// SPDX-License-Identifier: GPL-3.0-only
// https://github.com/cgaffga/phasmcore

//! Producer and consumer seals talking through packed pictures, from
//! creation through export, expiry and revocation.

use image::{Rgba, RgbaImage};
use seal_core::{
    Error, KdfParams, KeyStore, MessageRole, PackOptions, PropertyValue, Seal, SealColor, SealState,
};

const DAY: u64 = 86_400;

fn picture(w: u32, h: u32) -> RgbaImage {
    RgbaImage::from_fn(w, h, |x, y| {
        let v = ((x * 3 + y * 5) % 256) as u8;
        Rgba([v, v.wrapping_add(40), 255 - v, 255])
    })
}

fn text(msg: &seal_core::SecureMessage) -> &str {
    msg.message.field_str("text").unwrap()
}

fn note(s: &str) -> PropertyValue {
    PropertyValue::dict().with("text", s)
}

fn producer_and_consumer<'p, 'c>(pstore: &'p KeyStore, cstore: &'c KeyStore) -> (Seal<'p>, Seal<'c>) {
    let producer = Seal::create(pstore, &picture(128, 128), SealColor::Green).unwrap();
    let export = producer.export_with_password("shared", &KdfParams::interactive_low()).unwrap();
    let consumer = Seal::import_with_password(cstore, &export, "shared").unwrap();
    (producer, consumer)
}

#[test]
fn seal_picture_identifies_its_seal() {
    let (pstore, cstore) = (KeyStore::new(), KeyStore::new());
    let (producer, consumer) = producer_and_consumer(&pstore, &cstore);
    assert!(seal_core::is_data_jpeg(consumer.seal_image()));
    let identity = consumer.unpack_message(consumer.seal_image()).unwrap();
    assert_eq!(identity.role, MessageRole::Producer);
    assert_eq!(identity.message.field_str("sealId").unwrap(), producer.seal_id());
    assert_eq!(identity.message.field_int("color").unwrap(), SealColor::Green as i64);
}

#[test]
fn producer_and_consumer_exchange_pictures() {
    let (pstore, cstore) = (KeyStore::new(), KeyStore::new());
    let (producer, consumer) = producer_and_consumer(&pstore, &cstore);
    let photo = picture(256, 192);

    for options in [PackOptions::default(), PackOptions::png()] {
        let outbound = producer.pack_message(&photo, &note("to all holders"), &options).unwrap();
        let got = consumer.unpack_message(&outbound).unwrap();
        assert_eq!(got.role, MessageRole::Producer);
        assert!(got.is_producer_generated());
        assert_eq!(text(&got), "to all holders");

        let reply = consumer.pack_message(&photo, &note("only the owner"), &options).unwrap();
        let got = producer.unpack_message(&reply).unwrap();
        assert_eq!(got.role, MessageRole::Consumer);
        assert_eq!(text(&got), "only the owner");
        assert!(matches!(consumer.unpack_message(&reply), Err(Error::UnsupportedConsumerAction)));
    }
}

#[test]
fn local_messages_do_not_cross_devices() {
    let (pstore, cstore) = (KeyStore::new(), KeyStore::new());
    let (producer, consumer) = producer_and_consumer(&pstore, &cstore);
    let local = consumer.encrypt_local_only_message(&note("diary")).unwrap();
    let got = consumer.decrypt_message(&local).unwrap();
    assert_eq!(got.role, MessageRole::LocalOnly);
    assert_eq!(text(&got), "diary");
    assert!(producer.decrypt_message(&local).is_err());
}

#[test]
fn roles_cannot_be_impersonated() {
    let (pstore, cstore) = (KeyStore::new(), KeyStore::new());
    let (producer, consumer) = producer_and_consumer(&pstore, &cstore);
    assert!(matches!(consumer.encrypt_producer_message(&note("x")), Err(Error::UnsupportedConsumerAction)));
    assert!(matches!(producer.encrypt_consumer_message(&note("x")), Err(Error::UnsupportedProducerAction)));
}

#[test]
fn consumer_seal_expires_and_is_revoked() {
    let (pstore, cstore) = (KeyStore::new(), KeyStore::new());
    let (producer, mut consumer) = producer_and_consumer(&pstore, &cstore);
    assert_eq!(producer.expiration_date(0), None);
    assert_eq!(consumer.self_destruct_days(), seal_core::seal::DEFAULT_SELF_DESTRUCT_DAYS);

    let before = producer.encrypt_producer_message(&note("sent while valid")).unwrap();
    consumer.set_self_destruct_at(2, 1_000).unwrap();
    assert_eq!(consumer.expiration_date(0), Some(1_000 + 2 * DAY));
    assert_eq!(consumer.expiration_date(1), Some(1_000 + 3 * DAY));
    assert_eq!(consumer.state_at(1_000 + DAY), SealState::Valid);
    assert_eq!(consumer.state_at(1_000 + 2 * DAY), SealState::Expired);
    assert!(matches!(consumer.invalidate_expired_at(1_000 + DAY), Err(Error::SealStillValid)));

    // Expired seals still read, but no longer write.
    assert_eq!(text(&consumer.decrypt_message(&before).unwrap()), "sent while valid");
    assert!(matches!(consumer.encrypt_consumer_message(&note("late")), Err(Error::InvalidSeal)));
    assert!(matches!(consumer.set_self_destruct(30), Err(Error::InvalidSeal)));
    assert!(matches!(consumer.set_expiration_date(0), Err(Error::InvalidSeal)));
    assert_eq!(consumer.expiration_date(0), Some(1_000 + 2 * DAY));

    consumer.invalidate_expired_at(1_000 + 5 * DAY).unwrap();
    assert_eq!(consumer.state(), SealState::Revoked);
    assert!(matches!(consumer.decrypt_message(&before), Err(Error::InvalidSeal)));
}

#[test]
fn self_destruct_range_is_checked() {
    let (pstore, cstore) = (KeyStore::new(), KeyStore::new());
    let (_producer, mut consumer) = producer_and_consumer(&pstore, &cstore);
    assert!(matches!(
        consumer.set_self_destruct(seal_core::seal::MAX_SELF_DESTRUCT_DAYS + 1),
        Err(Error::InvalidArgument(_))
    ));
    consumer.set_self_destruct(7).unwrap();
    assert_eq!(consumer.self_destruct_days(), 7);
    assert_eq!(consumer.state(), SealState::Valid);

    // Zero days never expires.
    consumer.set_self_destruct(0).unwrap();
    assert_eq!(consumer.self_destruct_days(), 0);
    assert_eq!(consumer.expiration_date(0), None);
    assert_eq!(consumer.state_at(u64::MAX), SealState::Valid);
}

#[test]
fn attribute_changes_survive_reload() {
    let (pstore, cstore) = (KeyStore::new(), KeyStore::new());
    let (_producer, mut consumer) = producer_and_consumer(&pstore, &cstore);
    consumer.set_color(SealColor::Orange).unwrap();
    consumer.set_invalidate_on_snapshot(true).unwrap();
    let image = consumer.seal_image().to_vec();
    let reloaded = Seal::load(&cstore, consumer.seal_id(), image).unwrap();
    assert_eq!(reloaded.color(), SealColor::Orange);
    assert!(reloaded.attributes().invalidate_on_snapshot);
}

#[test]
fn snapshot_revokes_only_when_asked() {
    let (pstore, cstore) = (KeyStore::new(), KeyStore::new());
    let (mut producer, mut consumer) = producer_and_consumer(&pstore, &cstore);
    assert!(!consumer.invalidate_for_snapshot().unwrap());
    consumer.set_invalidate_on_snapshot(true).unwrap();
    producer.set_invalidate_on_snapshot(true).unwrap();
    assert!(!producer.invalidate_for_snapshot().unwrap());
    assert!(consumer.invalidate_for_snapshot().unwrap());
    assert_eq!(consumer.state(), SealState::Revoked);
    assert_eq!(producer.state(), SealState::Valid);
}
