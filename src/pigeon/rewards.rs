//! Shared stat and ledger update pipeline.
//!
//! Percentage stats clamp to 0..=100, experience never drops below zero, gold
//! goes to the owner's ledger, and a pigeon whose health reaches zero dies.

use serde::{Deserialize, Serialize};

use crate::pigeon::errors::GuardViolation;
use crate::pigeon::types::{HumanRecord, PigeonCondition, PigeonRecord, Stat};

/// A bundle of deltas applied in one go.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rewards {
    pub gold: i64,
    pub experience: i64,
    pub food: i32,
    pub cleanliness: i32,
    pub happiness: i32,
    pub health: i32,
}

impl Rewards {
    pub fn with_gold(mut self, gold: i64) -> Self {
        self.gold = gold;
        self
    }

    pub fn with_experience(mut self, experience: i64) -> Self {
        self.experience = experience;
        self
    }

    pub fn with_stat(mut self, stat: Stat, delta: i32) -> Self {
        match stat {
            Stat::Food => self.food = delta,
            Stat::Cleanliness => self.cleanliness = delta,
            Stat::Happiness => self.happiness = delta,
            Stat::Health => self.health = delta,
        }
        self
    }

    pub fn stat(&self, stat: Stat) -> i32 {
        match stat {
            Stat::Food => self.food,
            Stat::Cleanliness => self.cleanliness,
            Stat::Happiness => self.happiness,
            Stat::Health => self.health,
        }
    }

    /// Scale gold and experience; stat deltas are unaffected.
    pub fn scaled(self, multiplier: f64) -> Self {
        Self {
            gold: (self.gold as f64 * multiplier).round() as i64,
            experience: (self.experience as f64 * multiplier).round() as i64,
            ..self
        }
    }
}

pub fn clamp_percentage(current: u8, delta: i32) -> u8 {
    (i32::from(current).saturating_add(delta)).clamp(0, 100) as u8
}

/// Apply the pigeon side of `rewards`. Returns true when this update killed the pigeon.
pub fn apply_to_pigeon(pigeon: &mut PigeonRecord, rewards: &Rewards) -> bool {
    for stat in Stat::ALL {
        let value = clamp_percentage(pigeon.stat(stat), rewards.stat(stat));
        pigeon.set_stat(stat, value);
    }
    pigeon.experience = if rewards.experience >= 0 {
        pigeon.experience.saturating_add(rewards.experience as u64)
    } else {
        pigeon.experience.saturating_sub(rewards.experience.unsigned_abs())
    };

    if pigeon.health == 0 && pigeon.is_alive() {
        pigeon.condition = PigeonCondition::Dead;
        pigeon.condition_notified = false;
        return true;
    }
    false
}

/// Credit (or, for negative rewards, debit down to zero) the owner's ledger.
pub fn apply_to_owner(human: &mut HumanRecord, rewards: &Rewards) {
    human.gold = human.gold.saturating_add(rewards.gold).max(0);
}

/// Validated spend: refuses instead of letting the ledger go negative.
pub fn debit(human: &mut HumanRecord, amount: i64) -> Result<(), GuardViolation> {
    if amount < 0 {
        return Err(GuardViolation::InvalidAmount { amount });
    }
    if human.gold < amount {
        return Err(GuardViolation::InsufficientGold {
            user_id: human.user_id,
            required: amount,
            available: human.gold,
        });
    }
    human.gold -= amount;
    Ok(())
}

pub fn credit(human: &mut HumanRecord, amount: i64) {
    human.gold = human.gold.saturating_add(amount.max(0));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pigeon::types::Gender;

    #[test]
    fn percentages_stay_within_bounds() {
        let mut pigeon = PigeonRecord::new("p", 1, "Bep", Gender::Female);
        pigeon.food = 95;
        pigeon.happiness = 3;
        let died = apply_to_pigeon(
            &mut pigeon,
            &Rewards::default()
                .with_stat(Stat::Food, 1_000)
                .with_stat(Stat::Happiness, -1_000)
                .with_stat(Stat::Cleanliness, i32::MIN),
        );
        assert!(!died);
        assert_eq!(pigeon.food, 100);
        assert_eq!(pigeon.happiness, 0);
        assert_eq!(pigeon.cleanliness, 0);
    }

    #[test]
    fn zero_health_kills() {
        let mut pigeon = PigeonRecord::new("p", 1, "Bep", Gender::Female);
        pigeon.health = 8;
        pigeon.condition_notified = true;
        assert!(apply_to_pigeon(&mut pigeon, &Rewards::default().with_stat(Stat::Health, -10)));
        assert_eq!(pigeon.condition, PigeonCondition::Dead);
        assert!(!pigeon.condition_notified);
        // Already dead: no second death.
        assert!(!apply_to_pigeon(&mut pigeon, &Rewards::default().with_stat(Stat::Health, -10)));
    }

    #[test]
    fn experience_never_underflows() {
        let mut pigeon = PigeonRecord::new("p", 1, "Bep", Gender::Male);
        pigeon.experience = 4;
        apply_to_pigeon(&mut pigeon, &Rewards::default().with_experience(-20));
        assert_eq!(pigeon.experience, 0);
    }

    #[test]
    fn debit_is_validated() {
        let mut human = HumanRecord::new(9);
        human.gold = 30;
        assert!(matches!(
            debit(&mut human, 31),
            Err(GuardViolation::InsufficientGold { required: 31, available: 30, .. })
        ));
        assert_eq!(human.gold, 30);
        debit(&mut human, 30).unwrap();
        assert_eq!(human.gold, 0);
        assert!(debit(&mut human, -1).is_err());
    }

    #[test]
    fn scaling_rounds_gold_and_experience_only() {
        let rewards = Rewards::default()
            .with_gold(60)
            .with_experience(30)
            .with_stat(Stat::Food, -20)
            .scaled(1.75);
        assert_eq!(rewards.gold, 105);
        assert_eq!(rewards.experience, 53);
        assert_eq!(rewards.food, -20);
    }
}
