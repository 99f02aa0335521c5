//! Death is terminal and announced exactly once.

mod common;

use std::sync::Arc;

use chrono::Duration;
use common::*;
use pigeonbot::pigeon::{
    CareAction, CountryAtlas, GuardViolation, PigeonCondition, PigeonError, PigeonSettings,
};

fn brutal_world(seed: u64) -> World {
    let settings = PigeonSettings {
        fight_loser_health: -20,
        ..PigeonSettings::default()
    };
    world_with(seed, Arc::new(CountryAtlas::default()), settings)
}

/// Both pigeons enter at 15 health; the loser drops to 0 and dies.
fn kill_in_a_fight(w: &mut World) -> u64 {
    owner(&mut w.engine, 1, "NL");
    owner(&mut w.engine, 2, "FR");
    set_all_stats(&w.engine, 1, 15);
    set_all_stats(&w.engine, 2, 15);
    w.engine.challenge(1, 2, 0).unwrap();
    w.engine.accept(2).unwrap();
    w.clock.advance(Duration::minutes(5));
    let report = w.engine.resolve_fights().unwrap().remove(0);
    assert!(report.loser_died);
    assert!(!report.winner_died);

    let dead = w.engine.store().pigeon_of(report.loser_owner).unwrap().unwrap();
    assert_eq!(dead.condition, PigeonCondition::Dead);
    assert_eq!(dead.health, 0);
    assert!(!dead.condition_notified);
    report.loser_owner
}

#[test]
fn death_notice_is_delivered_once_then_dead_forever() {
    let mut w = brutal_world(301);
    let loser = kill_in_a_fight(&mut w);

    let first = w.engine.start_exploration(loser).unwrap_err();
    assert!(matches!(first.guard(), Some(GuardViolation::Died { .. })));
    assert!(w.engine.store().pigeon_of(loser).unwrap().unwrap().condition_notified);

    for attempt in [
        w.engine.start_exploration(loser).unwrap_err(),
        w.engine.start_mail(loser, 99, "boo", 0).unwrap_err(),
        w.engine.care(loser, CareAction::Heal).unwrap_err(),
        w.engine.retrieve(loser).unwrap_err(),
        w.engine.pigeon_profile(loser).unwrap_err(),
    ] {
        assert!(matches!(attempt.guard(), Some(GuardViolation::Dead { .. })), "{:?}", attempt);
    }
}

#[test]
fn others_cannot_consume_the_owners_notice() {
    let mut w = brutal_world(302);
    let loser = kill_in_a_fight(&mut w);
    let other = if loser == 1 { 2 } else { 1 };

    let err = w.engine.challenge(other, loser, 0).unwrap_err();
    assert!(matches!(err.guard(), Some(GuardViolation::Dead { .. })));
    assert!(!w.engine.store().pigeon_of(loser).unwrap().unwrap().condition_notified);

    assert!(matches!(
        w.engine.pigeon_profile(loser).unwrap_err().guard(),
        Some(GuardViolation::Died { .. })
    ));
}

#[test]
fn dead_pigeon_is_replaced_by_buying_a_new_one() {
    let mut w = brutal_world(303);
    let loser = kill_in_a_fight(&mut w);
    let _ = w.engine.pigeon_profile(loser);

    let fresh = w.engine.buy_pigeon(loser, "Phoenix").unwrap();
    assert!(fresh.is_alive());
    assert_eq!(w.engine.pigeon_profile(loser).unwrap().id, fresh.id);
    w.engine.start_exploration(loser).unwrap();
}

#[test]
fn missing_pigeon_is_not_found() {
    let mut w = brutal_world(304);
    match w.engine.start_exploration(5) {
        Err(PigeonError::NotFound(msg)) => assert!(msg.contains('5')),
        other => panic!("unexpected {:?}", other),
    }
}
