//! Pigeon availability state machine.
//!
//! ```text
//!          ┌──────────► Exploring ──┐
//!   Idle ──┼──────────► Mailing ────┼──► Idle
//!          └──────────► Fighting ───┘
//! ```
//!
//! There are no transitions between the busy states; a pigeon only returns to
//! `Idle` when its activity is settled.

use crate::pigeon::errors::{GuardViolation, PigeonError};
use crate::pigeon::types::{PigeonRecord, PigeonStatus, Stat};

impl PigeonStatus {
    pub fn is_idle(&self) -> bool {
        *self == PigeonStatus::Idle
    }

    pub fn can_transition_to(&self, next: PigeonStatus) -> bool {
        use PigeonStatus::*;
        matches!(
            (self, next),
            (Idle, Exploring) | (Idle, Mailing) | (Idle, Fighting)
                | (Exploring, Idle) | (Mailing, Idle) | (Fighting, Idle)
        )
    }
}

/// Move the pigeon to `next`, refusing transitions the state machine does not allow.
pub fn transition(pigeon: &mut PigeonRecord, next: PigeonStatus) -> Result<(), PigeonError> {
    if !pigeon.status.can_transition_to(next) {
        if pigeon.status.is_idle() {
            return Err(PigeonError::Conflict(format!(
                "{} is already idle",
                pigeon.name
            )));
        }
        return Err(GuardViolation::Busy {
            name: pigeon.name.clone(),
            status: pigeon.status,
        }
        .into());
    }
    pigeon.status = next;
    Ok(())
}

/// Entry guard for every new activity: alive, idle and all stats above `floor`.
pub fn ensure_available(pigeon: &PigeonRecord, floor: u8) -> Result<(), GuardViolation> {
    if !pigeon.is_alive() {
        return Err(GuardViolation::Dead {
            name: pigeon.name.clone(),
        });
    }
    if !pigeon.status.is_idle() {
        return Err(GuardViolation::Busy {
            name: pigeon.name.clone(),
            status: pigeon.status,
        });
    }
    for stat in Stat::ALL {
        let actual = pigeon.stat(stat);
        if actual <= floor {
            return Err(GuardViolation::StatTooLow {
                name: pigeon.name.clone(),
                stat,
                floor,
                actual,
            });
        }
    }
    Ok(())
}

/// Death notice bookkeeping. For a dead pigeon this flips `condition_notified`
/// the first time and returns [`GuardViolation::Died`]; afterwards it returns
/// [`GuardViolation::Dead`]. The caller persists the pigeon when the flag flipped.
pub fn death_notice(pigeon: &mut PigeonRecord) -> Option<GuardViolation> {
    if pigeon.is_alive() {
        return None;
    }
    let name = pigeon.name.clone();
    if pigeon.condition_notified {
        Some(GuardViolation::Dead { name })
    } else {
        pigeon.condition_notified = true;
        Some(GuardViolation::Died { name })
    }
}
