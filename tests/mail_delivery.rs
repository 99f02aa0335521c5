//! Mail delivery and the finished + read gate on attached gold.

mod common;

use std::sync::Arc;

use chrono::Duration;
use common::*;
use pigeonbot::pigeon::{GuardViolation, PigeonStatus, RetrieveOutcome};

#[test]
fn gold_reaches_the_recipient_only_once_delivered_and_read() {
    let mut w = world_with_geo(201, Arc::new(FixedGeo));
    owner(&mut w.engine, 1, "HOME");
    w.engine.set_country(2, "FAR").unwrap();

    let mail = w.engine.start_mail(1, 2, "See you\nsoon", 100).unwrap();
    assert!(!mail.finished);
    assert!(!mail.read);
    assert_eq!(mail.destination.as_deref(), Some("FAR"));
    assert_eq!(mail.end_date - mail.start_date, Duration::minutes(180));
    assert_eq!(gold(&w.engine, 1), 350);

    // Not delivered yet: nothing in the inbox.
    assert!(w.engine.read_inbox(2).unwrap().mail.is_empty());
    assert_eq!(gold(&w.engine, 2), 0);

    w.clock.advance(Duration::minutes(180));
    let report = match w.engine.retrieve(1).unwrap() {
        RetrieveOutcome::Mail(report) => report,
        other => panic!("expected mail settlement, got {:?}", other),
    };
    assert!(report.mail.finished);
    assert!(!report.mail.read);
    assert_eq!(report.rewards.experience, 40);
    assert_eq!(gold(&w.engine, 2), 0);
    let pigeon = w.engine.store().pigeon_of(1).unwrap().unwrap();
    assert_eq!(pigeon.status, PigeonStatus::Idle);
    assert_eq!(pigeon.experience, 40);

    let inbox = w.engine.read_inbox(2).unwrap();
    assert_eq!(inbox.gold_received, 100);
    assert_eq!(inbox.mail[0].message, "See you\nsoon");
    assert_eq!(gold(&w.engine, 2), 100);
    assert_eq!(w.engine.unread_mail_count(2).unwrap(), 0);

    assert_eq!(w.engine.read_inbox(2).unwrap().gold_received, 0);
    assert_eq!(gold(&w.engine, 2) + gold(&w.engine, 1), 450);
}

#[test]
fn recipient_without_country_gets_the_shortest_trip() {
    let mut w = world(202);
    owner(&mut w.engine, 1, "NL");
    let mail = w.engine.start_mail(1, 77, "hoi", 0).unwrap();
    assert_eq!(mail.destination, None);
    assert_eq!(mail.distance_km, 0);
    assert_eq!(mail.end_date - mail.start_date, Duration::minutes(15));
}

#[test]
fn failed_send_changes_nothing() {
    let mut w = world(203);
    owner(&mut w.engine, 1, "NL");
    let err = w.engine.start_mail(1, 2, "too generous", 451).unwrap_err();
    assert!(matches!(
        err.guard(),
        Some(GuardViolation::InsufficientGold { required: 451, available: 450, .. })
    ));
    assert!(w.engine.store().list_mail().unwrap().is_empty());
    assert_eq!(gold(&w.engine, 1), 450);
    assert_eq!(
        w.engine.store().pigeon_of(1).unwrap().unwrap().status,
        PigeonStatus::Idle
    );
    assert!(matches!(
        w.engine.start_mail(1, 2, "negative", -5).unwrap_err().guard(),
        Some(GuardViolation::InvalidAmount { amount: -5 })
    ));
}
