//! Pigeon virtual-pet economy: data model, Sled-backed persistence, the
//! availability state machine, timed activities, fights and the settlement
//! ticker.

pub mod activity;
pub mod care;
pub mod clock;
pub mod engine;
pub mod errors;
pub mod fight;
pub mod geo;
pub mod rewards;
pub mod settings;
pub mod status;
pub mod storage;
pub mod ticker;
pub mod types;

pub use activity::{
    ActivityProgress, ExplorationBonus, ExplorationReport, InboxReport, MailReport, Rarity,
    RetrieveOutcome, EXPLORATION_ITEMS,
};
pub use care::CareReport;
pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::PigeonEngine;
pub use errors::{GuardViolation, PigeonError};
pub use fight::{AcceptOutcome, FightReport};
pub use geo::{Coordinates, CountryAtlas, CountryInfo, GeoProvider};
pub use rewards::Rewards;
pub use settings::PigeonSettings;
pub use status::{ensure_available, transition};
pub use storage::{Changeset, PigeonStore, PigeonStoreBuilder};
pub use ticker::{FightTicker, LogNotifier, Notifier, NotifyError, TickerStats};
pub use types::*;
