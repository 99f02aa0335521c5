use thiserror::Error;

use crate::pigeon::types::{CareAction, PigeonStatus, Stat, UserId};

/// Errors that can arise while running the pigeon game.
#[derive(Debug, Error)]
pub enum PigeonError {
    /// Wrapper around sled's error type.
    #[error("sled error: {0}")]
    Sled(#[from] sled::Error),

    /// Wrapper around bincode serialization and deserialization errors.
    #[error("serialization error: {0}")]
    Bincode(#[from] bincode::Error),

    /// Wrapper around IO errors (directory creation, atlas files).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Wrapper around JSON errors when loading a country atlas.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Returned when fetching a record or activity that is not present.
    #[error("not found: {0}")]
    NotFound(String),

    /// A precondition for the requested action does not hold. Nothing was changed.
    #[error("{0}")]
    Guard(#[from] GuardViolation),

    /// Another settlement claimed the record first.
    #[error("concurrent update lost: {0}")]
    Conflict(String),

    /// Tunables that would make the game misbehave.
    #[error("invalid pigeon settings: {0}")]
    Settings(String),

    /// Returned when deserializing a record with an unexpected schema version.
    #[error("schema mismatch for {entity}: expected {expected}, got {found}")]
    SchemaMismatch {
        entity: &'static str,
        expected: u8,
        found: u8,
    },
}

impl PigeonError {
    /// True for errors meant to be shown to the user as-is.
    pub fn is_user_facing(&self) -> bool {
        matches!(self, PigeonError::Guard(_) | PigeonError::NotFound(_))
    }

    pub fn guard(&self) -> Option<&GuardViolation> {
        match self {
            PigeonError::Guard(violation) => Some(violation),
            _ => None,
        }
    }
}

/// Why an action was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardViolation {
    #[error("{name} is {status} and cannot do anything else right now")]
    Busy { name: String, status: PigeonStatus },

    /// First report after death. Delivered exactly once per pigeon.
    #[error("{name} has died. You can buy a new pigeon")]
    Died { name: String },

    #[error("{name} is dead")]
    Dead { name: String },

    #[error("{name}'s {stat} is too low ({actual}, must be above {floor})")]
    StatTooLow {
        name: String,
        stat: Stat,
        floor: u8,
        actual: u8,
    },

    #[error("user {user_id} needs {required} gold but has {available}")]
    InsufficientGold {
        user_id: UserId,
        required: i64,
        available: i64,
    },

    #[error("you already have a pigeon named {name}")]
    AlreadyOwned { name: String },

    #[error("a pigeon needs a name")]
    EmptyName,

    #[error("user {user_id} has no country of residence set")]
    NoResidence { user_id: UserId },

    #[error("unknown country: {code}")]
    UnknownCountry { code: String },

    #[error("no reachable destination found after {attempts} attempts")]
    NoReachableDestination { attempts: u32 },

    #[error("{name} is already involved in a fight")]
    AlreadyFighting { name: String },

    #[error("you cannot target yourself")]
    SelfTarget,

    #[error("invalid amount: {amount}")]
    InvalidAmount { amount: i64 },

    #[error("a mail needs a message")]
    EmptyMessage,

    #[error("{action} is on cooldown for another {remaining_minutes} minutes")]
    Cooldown {
        action: CareAction,
        remaining_minutes: i64,
    },

    #[error("fight participants cannot wager on their own fight")]
    OwnFight,

    #[error("you already placed a wager on this fight")]
    DuplicateWager,

    #[error("this fight is not open for wagers")]
    WagersClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_messages_name_the_culprit() {
        let err = PigeonError::from(GuardViolation::StatTooLow {
            name: "Gerrit".to_string(),
            stat: Stat::Food,
            floor: 10,
            actual: 4,
        });
        assert!(err.is_user_facing());
        let text = err.to_string();
        assert!(text.contains("Gerrit"));
        assert!(text.contains("food"));
        assert!(text.contains('4'));
    }

    #[test]
    fn conflicts_are_not_user_facing() {
        let err = PigeonError::Conflict("fight abc".to_string());
        assert!(!err.is_user_facing());
        assert!(err.guard().is_none());
    }
}
