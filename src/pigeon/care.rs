//! Owner care actions with a per-action cooldown.

use chrono::Duration;
use log::info;
use rand::Rng;

use crate::logutil::escape_log;
use crate::pigeon::clock::Clock;
use crate::pigeon::engine::PigeonEngine;
use crate::pigeon::errors::{GuardViolation, PigeonError};
use crate::pigeon::rewards::{self, Rewards};
use crate::pigeon::storage::Changeset;
use crate::pigeon::types::{CareAction, PigeonRecord, UserId};

#[derive(Debug, Clone, PartialEq)]
pub struct CareReport {
    pub pigeon: PigeonRecord,
    pub action: CareAction,
    pub cost: i64,
    /// Points actually gained after clamping.
    pub gained: u8,
}

impl<C: Clock, R: Rng> PigeonEngine<C, R> {
    pub fn care_cost(&self, action: CareAction) -> i64 {
        match action {
            CareAction::Heal => self.settings.heal_cost,
            _ => self.settings.care_cost,
        }
    }

    /// Feed, clean, play with or heal the owner's pigeon.
    pub fn care(&mut self, owner: UserId, action: CareAction) -> Result<CareReport, PigeonError> {
        let mut pigeon = self.living_pigeon(owner)?;
        if !pigeon.status.is_idle() {
            return Err(GuardViolation::Busy {
                name: pigeon.name.clone(),
                status: pigeon.status,
            }
            .into());
        }

        let now = self.now();
        if let Some(last) = pigeon.last_care.get(&action) {
            let hours = self.settings.care_cooldown_hours;
            let ready_at = Duration::try_hours(hours)
                .and_then(|cooldown| last.checked_add_signed(cooldown))
                .ok_or_else(|| PigeonError::Settings(format!("a {} hour care cooldown cannot be scheduled", hours)))?;
            if now < ready_at {
                let seconds = (ready_at - now).num_seconds();
                return Err(GuardViolation::Cooldown {
                    action,
                    remaining_minutes: (seconds + 59) / 60,
                }
                .into());
            }
        }

        let cost = self.care_cost(action);
        let mut human = self.store.get_human(owner)?;
        rewards::debit(&mut human, cost)?;

        let stat = action.stat();
        let before = pigeon.stat(stat);
        pigeon.last_care.insert(action, now);
        let delta = Rewards::default().with_stat(stat, self.settings.care_amount);
        self.apply_rewards(&mut pigeon, &mut human, &delta);
        self.store
            .commit(Changeset::new().put_pigeon(pigeon.clone()).put_human(human))?;
        let gained = pigeon.stat(stat).saturating_sub(before);

        info!(
            "User {} used {} on {} for {} gold (+{} {})",
            owner,
            action,
            escape_log(&pigeon.name),
            cost,
            gained,
            stat
        );
        Ok(CareReport {
            pigeon,
            action,
            cost,
            gained,
        })
    }
}
