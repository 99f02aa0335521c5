use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub const HUMAN_SCHEMA_VERSION: u8 = 1;
pub const PIGEON_SCHEMA_VERSION: u8 = 1;
pub const EXPLORATION_SCHEMA_VERSION: u8 = 1;
pub const MAIL_SCHEMA_VERSION: u8 = 1;
pub const FIGHT_SCHEMA_VERSION: u8 = 1;
pub const WAGER_SCHEMA_VERSION: u8 = 1;

/// Chat platform user identifier (snowflake).
pub type UserId = u64;

/// What the pigeon is currently occupied with. Exactly one at a time.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PigeonStatus {
    Idle,
    Exploring,
    Mailing,
    Fighting,
}

impl fmt::Display for PigeonStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            PigeonStatus::Idle => "idle",
            PigeonStatus::Exploring => "exploring",
            PigeonStatus::Mailing => "delivering mail",
            PigeonStatus::Fighting => "fighting",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PigeonCondition {
    Active,
    Dead,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Gender {
    Male,
    Female,
}

/// Percentage stats, each kept within 0..=100.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Stat {
    Food,
    Cleanliness,
    Happiness,
    Health,
}

impl Stat {
    pub const ALL: [Stat; 4] = [Stat::Food, Stat::Cleanliness, Stat::Happiness, Stat::Health];

    pub fn name(&self) -> &'static str {
        match self {
            Stat::Food => "food",
            Stat::Cleanliness => "cleanliness",
            Stat::Happiness => "happiness",
            Stat::Health => "health",
        }
    }
}

impl fmt::Display for Stat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Owner-initiated care actions, each restoring one stat for a fee.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum CareAction {
    Feed,
    Clean,
    Play,
    Heal,
}

impl CareAction {
    pub fn stat(&self) -> Stat {
        match self {
            CareAction::Feed => Stat::Food,
            CareAction::Clean => Stat::Cleanliness,
            CareAction::Play => Stat::Happiness,
            CareAction::Heal => Stat::Health,
        }
    }

    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            "feed" | "food" => Some(CareAction::Feed),
            "clean" | "wash" => Some(CareAction::Clean),
            "play" => Some(CareAction::Play),
            "heal" => Some(CareAction::Heal),
            _ => None,
        }
    }
}

impl fmt::Display for CareAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            CareAction::Feed => "feed",
            CareAction::Clean => "clean",
            CareAction::Play => "play",
            CareAction::Heal => "heal",
        };
        f.write_str(label)
    }
}

/// A pigeon owner. Holds the gold ledger and the residence used for travel.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HumanRecord {
    pub user_id: UserId,
    pub gold: i64,
    #[serde(default)]
    pub country_code: Option<String>,
    /// Current pigeon. Dead pigeons stay referenced until replaced.
    #[serde(default)]
    pub pigeon_id: Option<String>,
    /// Items found on explorations, keyed by item id.
    #[serde(default)]
    pub items: HashMap<String, u32>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl HumanRecord {
    pub fn new(user_id: UserId) -> Self {
        let now = Utc::now();
        Self {
            user_id,
            gold: 0,
            country_code: None,
            pigeon_id: None,
            items: HashMap::new(),
            created_at: now,
            updated_at: now,
            schema_version: HUMAN_SCHEMA_VERSION,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PigeonRecord {
    pub id: String,
    pub owner: UserId,
    pub name: String,
    pub gender: Gender,
    pub status: PigeonStatus,
    pub condition: PigeonCondition,
    /// Set once the owner has been told about the death.
    pub condition_notified: bool,
    pub food: u8,
    pub cleanliness: u8,
    pub happiness: u8,
    pub health: u8,
    pub experience: u64,
    /// Language mastery picked up abroad, keyed by language name.
    #[serde(default)]
    pub languages: HashMap<String, u32>,
    #[serde(default)]
    pub last_care: HashMap<CareAction, DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub schema_version: u8,
}

impl PigeonRecord {
    pub fn new(id: &str, owner: UserId, name: &str, gender: Gender) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            owner,
            name: name.to_string(),
            gender,
            status: PigeonStatus::Idle,
            condition: PigeonCondition::Active,
            condition_notified: false,
            food: 100,
            cleanliness: 100,
            happiness: 100,
            health: 100,
            experience: 0,
            languages: HashMap::new(),
            last_care: HashMap::new(),
            created_at: now,
            updated_at: now,
            schema_version: PIGEON_SCHEMA_VERSION,
        }
    }

    pub fn stat(&self, stat: Stat) -> u8 {
        match stat {
            Stat::Food => self.food,
            Stat::Cleanliness => self.cleanliness,
            Stat::Happiness => self.happiness,
            Stat::Health => self.health,
        }
    }

    pub fn set_stat(&mut self, stat: Stat, value: u8) {
        let value = value.min(100);
        match stat {
            Stat::Food => self.food = value,
            Stat::Cleanliness => self.cleanliness = value,
            Stat::Happiness => self.happiness = value,
            Stat::Health => self.health = value,
        }
    }

    pub fn is_alive(&self) -> bool {
        self.condition == PigeonCondition::Active
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExplorationRecord {
    pub id: String,
    pub pigeon_id: String,
    pub residence: String,
    pub destination: String,
    pub distance_km: u32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub finished: bool,
    pub schema_version: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MailRecord {
    pub id: String,
    pub sender_pigeon_id: String,
    pub sender: UserId,
    pub recipient: UserId,
    pub message: String,
    /// Gold escrowed from the sender, released to the recipient when read.
    pub gold: i64,
    pub residence: String,
    /// Recipient country, if they have one set.
    #[serde(default)]
    pub destination: Option<String>,
    pub distance_km: u32,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub read: bool,
    pub finished: bool,
    pub schema_version: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FightRecord {
    pub id: String,
    pub challenger: String,
    pub challengee: String,
    pub challenger_owner: UserId,
    pub challengee_owner: UserId,
    pub bet: i64,
    pub accepted: bool,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    pub finished: bool,
    /// True when the challenger won. Only meaningful once finished.
    #[serde(default)]
    pub won: Option<bool>,
    pub schema_version: u8,
}

impl FightRecord {
    pub fn involves(&self, pigeon_id: &str) -> bool {
        self.challenger == pigeon_id || self.challengee == pigeon_id
    }

    pub fn involves_owner(&self, user_id: UserId) -> bool {
        self.challenger_owner == user_id || self.challengee_owner == user_id
    }

    pub fn is_pending(&self) -> bool {
        !self.accepted && !self.finished
    }
}

/// A spectator's stake on one side of an accepted fight.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WagerRecord {
    pub fight_id: String,
    pub spectator: UserId,
    pub backs_challenger: bool,
    pub amount: i64,
    pub settled: bool,
    pub created_at: DateTime<Utc>,
    pub schema_version: u8,
}
