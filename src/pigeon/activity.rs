//! Timed activities: explorations abroad and mail delivery.
//!
//! Both follow the same lifecycle. Starting one moves the pigeon out of `Idle`
//! and stores an open record with an `end_date`. Retrieving before that date is
//! read-only; retrieving after it settles the record exactly once, runs the
//! reward pipeline and brings the pigeon home.
//!
//! Exploration rewards scale with distance and are multiplied by bonuses rolled
//! as independent trials in a fixed order:
//! 1. language bonus (`language_bonus_chance`)
//! 2. item drop (`item_drop_chance`, item picked by rarity weight)
//! 3. streak bonus on every `streak_interval`-th finished exploration (no roll)

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use log::{debug, info};
use rand::distributions::{Distribution, WeightedIndex};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::logutil::escape_log;
use crate::pigeon::clock::Clock;
use crate::pigeon::engine::PigeonEngine;
use crate::pigeon::errors::{GuardViolation, PigeonError};
use crate::pigeon::rewards::{self, Rewards};
use crate::pigeon::status::{ensure_available, transition};
use crate::pigeon::storage::Changeset;
use crate::pigeon::types::{
    ExplorationRecord, HumanRecord, MailRecord, PigeonRecord, PigeonStatus, Stat, UserId,
    EXPLORATION_SCHEMA_VERSION, MAIL_SCHEMA_VERSION,
};

const EXPLORATION_FOOD: i32 = -20;
const EXPLORATION_CLEANLINESS: i32 = -15;
const EXPLORATION_HAPPINESS: i32 = 10;
const MAIL_FOOD: i32 = -10;
const MAIL_CLEANLINESS: i32 = -5;
const MAIL_HAPPINESS: i32 = 5;
/// Extra mail experience per this many kilometres flown
const MAIL_KM_PER_EXPERIENCE: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rarity {
    Common,
    Uncommon,
    Rare,
    Legendary,
}

impl Rarity {
    pub fn weight(&self) -> u32 {
        match self {
            Rarity::Common => 60,
            Rarity::Uncommon => 25,
            Rarity::Rare => 10,
            Rarity::Legendary => 5,
        }
    }
}

/// Things a pigeon can bring back from abroad: (id, rarity).
pub const EXPLORATION_ITEMS: &[(&str, Rarity)] = &[
    ("shiny_pebble", Rarity::Common),
    ("bread_crust", Rarity::Common),
    ("feather", Rarity::Common),
    ("bottle_cap", Rarity::Uncommon),
    ("postcard", Rarity::Uncommon),
    ("foreign_coin", Rarity::Rare),
    ("tiny_flag", Rarity::Rare),
    ("golden_seed", Rarity::Legendary),
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExplorationBonus {
    Language { language: String },
    ItemDrop { item: String },
    Streak { completed: usize },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActivityProgress {
    pub status: PigeonStatus,
    pub destination: Option<String>,
    pub end_date: DateTime<Utc>,
    pub remaining: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExplorationReport {
    pub exploration: ExplorationRecord,
    /// Display name of the destination country.
    pub destination_name: String,
    pub bonuses: Vec<ExplorationBonus>,
    pub multiplier: f64,
    pub rewards: Rewards,
    pub died: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MailReport {
    pub mail: MailRecord,
    pub rewards: Rewards,
    pub died: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum RetrieveOutcome {
    /// Still travelling; nothing changed.
    InProgress(ActivityProgress),
    Exploration(ExplorationReport),
    Mail(MailReport),
    /// A concurrent retrieval settled the activity first.
    AlreadySettled,
}

/// Result of opening the inbox: newly read mail and the gold they carried.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InboxReport {
    pub mail: Vec<MailRecord>,
    pub gold_received: i64,
}

impl ExplorationBonus {
    pub fn multiplier(&self, settings: &crate::pigeon::settings::PigeonSettings) -> f64 {
        match self {
            ExplorationBonus::Language { .. } => settings.language_bonus_multiplier,
            ExplorationBonus::ItemDrop { .. } => settings.item_drop_multiplier,
            ExplorationBonus::Streak { .. } => settings.streak_multiplier,
        }
    }
}

impl<C: Clock, R: Rng> PigeonEngine<C, R> {
    /// Base gold and experience for an exploration of `distance_km`.
    pub fn exploration_base_reward(&self, distance_km: u32) -> i64 {
        let base = (f64::from(distance_km) / self.settings.exploration_km_per_gold).round() as i64;
        base.max(self.settings.exploration_min_reward)
    }

    fn ensure_no_open_activity(&self, pigeon: &PigeonRecord) -> Result<(), PigeonError> {
        let busy = |status| GuardViolation::Busy {
            name: pigeon.name.clone(),
            status,
        };
        if self.store.open_exploration(&pigeon.id)?.is_some() {
            return Err(busy(PigeonStatus::Exploring).into());
        }
        if self.store.open_mail(&pigeon.id)?.is_some() {
            return Err(busy(PigeonStatus::Mailing).into());
        }
        if self.store.open_fight(&pigeon.id)?.is_some() {
            return Err(busy(PigeonStatus::Fighting).into());
        }
        Ok(())
    }

    fn residence_of(&self, owner: UserId) -> Result<String, PigeonError> {
        let human = self.store.get_human(owner)?;
        let residence = human
            .country_code
            .ok_or(GuardViolation::NoResidence { user_id: owner })?;
        if self.geo.locate(&residence).is_none() {
            return Err(GuardViolation::UnknownCountry { code: residence }.into());
        }
        Ok(residence)
    }

    /// Uniformly random destination other than `residence`, rerolling codes
    /// the geo provider cannot resolve.
    fn pick_destination(&mut self, residence: &str) -> Result<(String, f64), PigeonError> {
        let candidates: Vec<String> = self
            .geo
            .country_codes()
            .into_iter()
            .filter(|code| !code.eq_ignore_ascii_case(residence))
            .collect();
        let attempts = self.settings.max_destination_attempts;
        if candidates.is_empty() {
            return Err(GuardViolation::NoReachableDestination { attempts: 0 }.into());
        }
        for attempt in 1..=attempts {
            let Some(code) = candidates.choose(&mut self.rng) else {
                break;
            };
            match self.geo.distance_km(residence, code) {
                Some(km) => return Ok((code.clone(), km)),
                None => debug!("Destination {} unresolvable (attempt {}), rerolling", code, attempt),
            }
        }
        Err(GuardViolation::NoReachableDestination { attempts }.into())
    }

    /// Send the owner's pigeon exploring a random country.
    pub fn start_exploration(&mut self, owner: UserId) -> Result<ExplorationRecord, PigeonError> {
        let mut pigeon = self.living_pigeon(owner)?;
        ensure_available(&pigeon, self.settings.stat_floor)?;
        self.ensure_no_open_activity(&pigeon)?;
        let residence = self.residence_of(owner)?;
        let (destination, distance) = self.pick_destination(&residence)?;

        let now = self.now();
        let exploration = ExplorationRecord {
            id: uuid::Uuid::new_v4().to_string(),
            pigeon_id: pigeon.id.clone(),
            residence,
            destination,
            distance_km: distance.round() as u32,
            start_date: now,
            end_date: self.arrival(now, distance)?,
            finished: false,
            schema_version: EXPLORATION_SCHEMA_VERSION,
        };
        transition(&mut pigeon, PigeonStatus::Exploring)?;
        self.store.commit(
            Changeset::new()
                .put_exploration(exploration.clone())
                .put_pigeon(pigeon.clone()),
        )?;
        info!(
            "Pigeon {} left {} for {} ({} km, back at {})",
            escape_log(&pigeon.name),
            exploration.residence,
            exploration.destination,
            exploration.distance_km,
            exploration.end_date
        );
        Ok(exploration)
    }

    /// Send a message (and optionally gold) to another user by pigeon.
    /// The gold leaves the sender immediately and reaches the recipient when read.
    pub fn start_mail(
        &mut self,
        owner: UserId,
        recipient: UserId,
        message: &str,
        gold: i64,
    ) -> Result<MailRecord, PigeonError> {
        if recipient == owner {
            return Err(GuardViolation::SelfTarget.into());
        }
        let message = message.trim();
        if message.is_empty() {
            return Err(GuardViolation::EmptyMessage.into());
        }
        if gold < 0 {
            return Err(GuardViolation::InvalidAmount { amount: gold }.into());
        }
        let mut pigeon = self.living_pigeon(owner)?;
        ensure_available(&pigeon, self.settings.stat_floor)?;
        self.ensure_no_open_activity(&pigeon)?;
        let residence = self.residence_of(owner)?;

        let mut sender = self.store.get_human(owner)?;
        if sender.gold < gold {
            return Err(GuardViolation::InsufficientGold {
                user_id: owner,
                required: gold,
                available: sender.gold,
            }
            .into());
        }
        let mut changes = Changeset::new();
        // First contact registers the recipient along with the mail.
        let receiver = match self.store.find_human(recipient)? {
            Some(receiver) => receiver,
            None => {
                let receiver = HumanRecord::new(recipient);
                changes.put_human(receiver.clone());
                receiver
            }
        };
        // A recipient without a (resolvable) country gets the shortest trip.
        let distance = receiver
            .country_code
            .as_deref()
            .and_then(|code| self.geo.distance_km(&residence, code))
            .unwrap_or(0.0);
        rewards::debit(&mut sender, gold)?;

        let now = self.now();
        let mail = MailRecord {
            id: uuid::Uuid::new_v4().to_string(),
            sender_pigeon_id: pigeon.id.clone(),
            sender: owner,
            recipient,
            message: message.to_string(),
            gold,
            residence,
            destination: receiver.country_code.clone(),
            distance_km: distance.round() as u32,
            start_date: now,
            end_date: self.arrival(now, distance)?,
            read: false,
            finished: false,
            schema_version: MAIL_SCHEMA_VERSION,
        };
        transition(&mut pigeon, PigeonStatus::Mailing)?;
        self.store.commit(
            changes
                .put_mail(mail.clone())
                .put_pigeon(pigeon.clone())
                .put_human(sender),
        )?;
        info!(
            "Pigeon {} carries mail from {} to {} with {} gold: \"{}\"",
            escape_log(&pigeon.name),
            owner,
            recipient,
            gold,
            escape_log(&mail.message)
        );
        Ok(mail)
    }

    /// Check on the pigeon's current exploration or mail delivery, settling it
    /// when it has arrived.
    pub fn retrieve(&mut self, owner: UserId) -> Result<RetrieveOutcome, PigeonError> {
        let pigeon = self.living_pigeon(owner)?;
        let now = self.now();

        if let Some(exploration) = self.store.open_exploration(&pigeon.id)? {
            if now < exploration.end_date {
                return Ok(RetrieveOutcome::InProgress(ActivityProgress {
                    status: PigeonStatus::Exploring,
                    destination: Some(self.country_name(&exploration.destination)),
                    end_date: exploration.end_date,
                    remaining: exploration.end_date - now,
                }));
            }
            return self.settle_exploration(pigeon, exploration);
        }

        if let Some(mail) = self.store.open_mail(&pigeon.id)? {
            if now < mail.end_date {
                return Ok(RetrieveOutcome::InProgress(ActivityProgress {
                    status: PigeonStatus::Mailing,
                    destination: mail.destination.as_deref().map(|code| self.country_name(code)),
                    end_date: mail.end_date,
                    remaining: mail.end_date - now,
                }));
            }
            return self.settle_mail(pigeon, mail);
        }

        Err(PigeonError::NotFound(format!(
            "{} has nothing to retrieve",
            pigeon.name
        )))
    }

    fn roll_exploration_bonuses(&mut self, completed: usize, language: Option<String>) -> Vec<ExplorationBonus> {
        let mut bonuses = Vec::new();

        if let Some(language) = language {
            if self.rng.gen_bool(self.settings.language_bonus_chance.clamp(0.0, 1.0)) {
                bonuses.push(ExplorationBonus::Language { language });
            }
        }

        if self.rng.gen_bool(self.settings.item_drop_chance.clamp(0.0, 1.0)) {
            let weights = EXPLORATION_ITEMS.iter().map(|(_, rarity)| rarity.weight());
            if let Ok(dist) = WeightedIndex::new(weights) {
                let (item, _) = EXPLORATION_ITEMS[dist.sample(&mut self.rng)];
                bonuses.push(ExplorationBonus::ItemDrop {
                    item: item.to_string(),
                });
            }
        }

        let interval = self.settings.streak_interval;
        if interval > 0 && completed > 0 && completed % interval == 0 {
            bonuses.push(ExplorationBonus::Streak { completed });
        }

        bonuses
    }

    fn settle_exploration(
        &mut self,
        mut pigeon: PigeonRecord,
        exploration: ExplorationRecord,
    ) -> Result<RetrieveOutcome, PigeonError> {
        // This trip is the next finished one once the claim below commits.
        let completed = self.store.finished_exploration_count(&pigeon.id)? + 1;
        let language = self.geo.language(&exploration.destination);
        let bonuses = self.roll_exploration_bonuses(completed, language);
        let multiplier = 1.0
            + bonuses
                .iter()
                .map(|b| b.multiplier(&self.settings))
                .sum::<f64>();

        let base = self.exploration_base_reward(exploration.distance_km);
        let rewards = Rewards::default()
            .with_gold(base)
            .with_experience(base)
            .with_stat(Stat::Food, EXPLORATION_FOOD)
            .with_stat(Stat::Cleanliness, EXPLORATION_CLEANLINESS)
            .with_stat(Stat::Happiness, EXPLORATION_HAPPINESS)
            .scaled(multiplier);

        let mut owner = self.store.get_human(pigeon.owner)?;
        for bonus in &bonuses {
            match bonus {
                ExplorationBonus::Language { language } => {
                    *pigeon.languages.entry(language.clone()).or_insert(0) += 1;
                }
                ExplorationBonus::ItemDrop { item } => {
                    *owner.items.entry(item.clone()).or_insert(0) += 1;
                }
                ExplorationBonus::Streak { .. } => {}
            }
        }

        transition(&mut pigeon, PigeonStatus::Idle)?;
        let died = self.apply_rewards(&mut pigeon, &mut owner, &rewards);
        let mut effects = Changeset::new();
        effects.put_pigeon(pigeon.clone()).put_human(owner);
        let settle = |e: &ExplorationRecord| {
            (!e.finished).then(|| ExplorationRecord {
                finished: true,
                ..e.clone()
            })
        };
        let claimed = match self.store.claim_exploration(&exploration, settle, &effects) {
            Ok(claimed) => claimed,
            Err(PigeonError::Conflict(reason)) => {
                debug!("Exploration {} settled elsewhere: {}", exploration.id, reason);
                return Ok(RetrieveOutcome::AlreadySettled);
            }
            Err(e) => return Err(e),
        };

        self.log_death(&pigeon, died);
        info!(
            "Pigeon {} returned from {}: {} gold, {} xp (x{:.2})",
            escape_log(&pigeon.name),
            claimed.destination,
            rewards.gold,
            rewards.experience,
            multiplier
        );
        Ok(RetrieveOutcome::Exploration(ExplorationReport {
            destination_name: self.country_name(&claimed.destination),
            exploration: claimed,
            bonuses,
            multiplier,
            rewards,
            died,
        }))
    }

    fn settle_mail(&mut self, mut pigeon: PigeonRecord, mail: MailRecord) -> Result<RetrieveOutcome, PigeonError> {
        let experience =
            self.settings.mail_base_experience + i64::from(mail.distance_km / MAIL_KM_PER_EXPERIENCE);
        let rewards = Rewards::default()
            .with_experience(experience)
            .with_stat(Stat::Food, MAIL_FOOD)
            .with_stat(Stat::Cleanliness, MAIL_CLEANLINESS)
            .with_stat(Stat::Happiness, MAIL_HAPPINESS);

        let mut owner = self.store.get_human(pigeon.owner)?;
        transition(&mut pigeon, PigeonStatus::Idle)?;
        let died = self.apply_rewards(&mut pigeon, &mut owner, &rewards);
        let mut effects = Changeset::new();
        effects.put_pigeon(pigeon.clone()).put_human(owner);
        let settle = |m: &MailRecord| {
            (!m.finished).then(|| MailRecord {
                finished: true,
                ..m.clone()
            })
        };
        let claimed = match self.store.claim_mail(&mail, settle, &effects) {
            Ok(claimed) => claimed,
            Err(PigeonError::Conflict(reason)) => {
                debug!("Mail {} settled elsewhere: {}", mail.id, reason);
                return Ok(RetrieveOutcome::AlreadySettled);
            }
            Err(e) => return Err(e),
        };

        self.log_death(&pigeon, died);
        info!(
            "Pigeon {} delivered mail {} to {}",
            escape_log(&pigeon.name),
            claimed.id,
            claimed.recipient
        );
        Ok(RetrieveOutcome::Mail(MailReport {
            mail: claimed,
            rewards,
            died,
        }))
    }

    /// Read delivered mail. Marks each unread letter read and releases its gold
    /// to the recipient.
    pub fn read_inbox(&mut self, owner: UserId) -> Result<InboxReport, PigeonError> {
        let unread: Vec<MailRecord> = self
            .store
            .inbox(owner)?
            .into_iter()
            .filter(|m| !m.read)
            .collect();
        let mut report = InboxReport::default();
        if unread.is_empty() {
            return Ok(report);
        }

        let mut human = self.store.get_or_create_human(owner)?;
        for mail in unread {
            // Each letter commits together with the gold it releases.
            let mut credited = human.clone();
            rewards::credit(&mut credited, mail.gold);
            let mut effects = Changeset::new();
            effects.put_human(credited.clone());
            let claimed = self.store.claim_mail(
                &mail,
                |m| {
                    (m.finished && !m.read).then(|| MailRecord {
                        read: true,
                        ..m.clone()
                    })
                },
                &effects,
            );
            match claimed {
                Ok(read) => {
                    human = credited;
                    report.gold_received += read.gold;
                    report.mail.push(read);
                }
                Err(PigeonError::Conflict(reason)) => {
                    debug!("Mail {} already read: {}", mail.id, reason);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    pub fn unread_mail_count(&self, owner: UserId) -> Result<usize, PigeonError> {
        self.store.unread_count(owner)
    }
}

impl fmt::Display for RetrieveOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetrieveOutcome::InProgress(progress) => {
                let minutes = progress.remaining.num_minutes().max(1);
                match &progress.destination {
                    Some(dest) => write!(f, "Still {} ({}), back in {} min", progress.status, dest, minutes),
                    None => write!(f, "Still {}, back in {} min", progress.status, minutes),
                }
            }
            RetrieveOutcome::Exploration(report) => {
                write!(
                    f,
                    "Back from {} ({} km): +{} gold, +{} xp",
                    report.destination_name,
                    report.exploration.distance_km,
                    report.rewards.gold,
                    report.rewards.experience
                )?;
                for bonus in &report.bonuses {
                    match bonus {
                        ExplorationBonus::Language { language } => write!(f, ", picked up some {}", language)?,
                        ExplorationBonus::ItemDrop { item } => write!(f, ", found a {}", item.replace('_', " "))?,
                        ExplorationBonus::Streak { completed } => write!(f, ", exploration #{} streak bonus", completed)?,
                    }
                }
                if report.died {
                    write!(f, ". The trip was too much: your pigeon died")?;
                }
                Ok(())
            }
            RetrieveOutcome::Mail(report) => {
                write!(f, "Mail delivered to {}: +{} xp", report.mail.recipient, report.rewards.experience)?;
                if report.died {
                    write!(f, ". The trip was too much: your pigeon died")?;
                }
                Ok(())
            }
            RetrieveOutcome::AlreadySettled => f.write_str("Nothing to retrieve"),
        }
    }
}
