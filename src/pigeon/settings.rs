use serde::{Deserialize, Serialize};

use crate::pigeon::errors::PigeonError;

/// Longest delay any timer may be configured to, one leap year.
const MAX_DELAY_MINUTES: i64 = 366 * 24 * 60;
const MAX_DELAY_HOURS: i64 = 366 * 24;

/// Tunables for the pigeon game. Loaded from the `[pigeon]` config section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PigeonSettings {
    /// Every percentage stat must be strictly above this to start an activity
    pub stat_floor: u8,
    /// Gold charged for a new pigeon
    pub pigeon_price: i64,
    /// Minutes between fight acceptance and resolution
    pub fight_delay_minutes: i64,
    /// Seconds between fight settlement ticks
    pub resolve_interval_seconds: u64,
    /// Destination rerolls before giving up on an exploration
    pub max_destination_attempts: u32,
    /// Travel speed used to turn distance into duration
    pub travel_speed_kmh: f64,
    /// Shortest possible trip
    pub min_travel_minutes: i64,
    /// Kilometres flown per gold of exploration base reward
    pub exploration_km_per_gold: f64,
    /// Base reward floor for very short explorations
    pub exploration_min_reward: i64,
    pub language_bonus_chance: f64,
    pub language_bonus_multiplier: f64,
    pub item_drop_chance: f64,
    pub item_drop_multiplier: f64,
    /// Every n-th finished exploration earns the streak bonus
    pub streak_interval: usize,
    pub streak_multiplier: f64,
    pub mail_base_experience: i64,
    pub fight_winner_experience: i64,
    pub fight_winner_health: i32,
    pub fight_loser_experience: i64,
    pub fight_loser_health: i32,
    pub care_cost: i64,
    pub heal_cost: i64,
    pub care_amount: i32,
    pub care_cooldown_hours: i64,
}

impl Default for PigeonSettings {
    fn default() -> Self {
        Self {
            stat_floor: 10,
            pigeon_price: 50,
            fight_delay_minutes: 5,
            resolve_interval_seconds: 30,
            max_destination_attempts: 50,
            travel_speed_kmh: 1000.0,
            min_travel_minutes: 15,
            exploration_km_per_gold: 50.0,
            exploration_min_reward: 10,
            language_bonus_chance: 0.10,
            language_bonus_multiplier: 0.5,
            item_drop_chance: 1.0 / 3.0,
            item_drop_multiplier: 0.25,
            streak_interval: 10,
            streak_multiplier: 1.0,
            mail_base_experience: 10,
            fight_winner_experience: 30,
            fight_winner_health: -2,
            fight_loser_experience: 5,
            fight_loser_health: -10,
            care_cost: 5,
            heal_cost: 20,
            care_amount: 25,
            care_cooldown_hours: 4,
        }
    }
}

impl PigeonSettings {
    /// Reject tunables that would stall travel, break the odds or overflow timers.
    pub fn validate(&self) -> Result<(), PigeonError> {
        let mut problems = Vec::new();

        for (name, value) in [
            ("travel_speed_kmh", self.travel_speed_kmh),
            ("exploration_km_per_gold", self.exploration_km_per_gold),
        ] {
            if !(value.is_finite() && value > 0.0) {
                problems.push(format!("{} must be a positive number, got {}", name, value));
            }
        }
        for (name, value) in [
            ("language_bonus_chance", self.language_bonus_chance),
            ("item_drop_chance", self.item_drop_chance),
        ] {
            if !(0.0..=1.0).contains(&value) {
                problems.push(format!("{} must be within 0..=1, got {}", name, value));
            }
        }
        for (name, value) in [
            ("language_bonus_multiplier", self.language_bonus_multiplier),
            ("item_drop_multiplier", self.item_drop_multiplier),
            ("streak_multiplier", self.streak_multiplier),
        ] {
            if !(value.is_finite() && value >= 0.0) {
                problems.push(format!("{} must not be negative, got {}", name, value));
            }
        }
        for (name, value) in [
            ("min_travel_minutes", self.min_travel_minutes),
            ("fight_delay_minutes", self.fight_delay_minutes),
        ] {
            if !(0..=MAX_DELAY_MINUTES).contains(&value) {
                problems.push(format!("{} must be within 0..={}, got {}", name, MAX_DELAY_MINUTES, value));
            }
        }
        if !(0..=MAX_DELAY_HOURS).contains(&self.care_cooldown_hours) {
            problems.push(format!(
                "care_cooldown_hours must be within 0..={}, got {}",
                MAX_DELAY_HOURS, self.care_cooldown_hours
            ));
        }
        for (name, value) in [
            ("pigeon_price", self.pigeon_price),
            ("exploration_min_reward", self.exploration_min_reward),
            ("care_cost", self.care_cost),
            ("heal_cost", self.heal_cost),
        ] {
            if value < 0 {
                problems.push(format!("{} must not be negative, got {}", name, value));
            }
        }
        if self.resolve_interval_seconds == 0 {
            problems.push("resolve_interval_seconds must be at least 1".to_string());
        }
        if self.max_destination_attempts == 0 {
            problems.push("max_destination_attempts must be at least 1".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(PigeonError::Settings(problems.join("; ")))
        }
    }
}
