//! The pigeon game engine: owns the store and the injected collaborators
//! (clock, random source, geo provider) and exposes every game operation.
//!
//! Operations are split over several modules (`activity`, `fight`, `care`) that
//! each add an `impl` block to [`PigeonEngine`].

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::logutil::escape_log;
use crate::pigeon::clock::{Clock, SystemClock};
use crate::pigeon::errors::{GuardViolation, PigeonError};
use crate::pigeon::geo::{CountryAtlas, GeoProvider};
use crate::pigeon::rewards::{self, Rewards};
use crate::pigeon::settings::PigeonSettings;
use crate::pigeon::status::death_notice;
use crate::pigeon::storage::{Changeset, PigeonStore};
use crate::pigeon::types::{Gender, HumanRecord, PigeonRecord, UserId};

pub struct PigeonEngine<C = SystemClock, R = StdRng> {
    pub(crate) store: PigeonStore,
    pub(crate) settings: PigeonSettings,
    pub(crate) geo: Arc<dyn GeoProvider>,
    pub(crate) clock: C,
    pub(crate) rng: R,
}

impl PigeonEngine<SystemClock, StdRng> {
    /// Production engine: system clock, entropy-seeded RNG, built-in atlas.
    pub fn new(store: PigeonStore, settings: PigeonSettings) -> Self {
        Self::with_parts(
            store,
            settings,
            Arc::new(CountryAtlas::default()),
            SystemClock,
            StdRng::from_entropy(),
        )
    }
}

impl<C: Clock, R: Rng> PigeonEngine<C, R> {
    pub fn with_parts(
        store: PigeonStore,
        settings: PigeonSettings,
        geo: Arc<dyn GeoProvider>,
        clock: C,
        rng: R,
    ) -> Self {
        Self {
            store,
            settings,
            geo,
            clock,
            rng,
        }
    }

    pub fn with_geo(mut self, geo: Arc<dyn GeoProvider>) -> Self {
        self.geo = geo;
        self
    }

    pub fn store(&self) -> &PigeonStore {
        &self.store
    }

    pub fn settings(&self) -> &PigeonSettings {
        &self.settings
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Trip duration for a distance, never shorter than the configured minimum.
    pub fn travel_duration(&self, distance_km: f64) -> Result<Duration, PigeonError> {
        let minutes = (distance_km.max(0.0) / self.settings.travel_speed_kmh * 60.0).ceil();
        let minutes = if minutes.is_finite() { minutes as i64 } else { i64::MAX };
        Duration::try_minutes(minutes.max(self.settings.min_travel_minutes)).ok_or_else(|| {
            PigeonError::Settings(format!("a {:.0} km trip cannot be scheduled", distance_km))
        })
    }

    /// When a trip of `distance_km` starting at `start` arrives.
    pub(crate) fn arrival(&self, start: DateTime<Utc>, distance_km: f64) -> Result<DateTime<Utc>, PigeonError> {
        let duration = self.travel_duration(distance_km)?;
        start
            .checked_add_signed(duration)
            .ok_or_else(|| PigeonError::Settings(format!("a {:.0} km trip ends past the calendar", distance_km)))
    }

    /// Display name of a country, falling back to its code.
    pub fn country_name(&self, code: &str) -> String {
        self.geo.country_name(code).unwrap_or_else(|| code.to_string())
    }

    /// The owner's pigeon for a command. A dead pigeon is reported once with
    /// [`GuardViolation::Died`] and with [`GuardViolation::Dead`] afterwards.
    pub(crate) fn living_pigeon(&self, owner: UserId) -> Result<PigeonRecord, PigeonError> {
        let mut pigeon = self
            .store
            .pigeon_of(owner)?
            .ok_or_else(|| PigeonError::NotFound(format!("user {} has no pigeon", owner)))?;
        let was_notified = pigeon.condition_notified;
        if let Some(violation) = death_notice(&mut pigeon) {
            if pigeon.condition_notified != was_notified {
                self.store.put_pigeon(pigeon)?;
            }
            return Err(violation.into());
        }
        Ok(pigeon)
    }

    /// Run the reward pipeline on a pigeon and its owner. The caller commits
    /// both records, then reports the death through [`Self::log_death`].
    pub(crate) fn apply_rewards(&self, pigeon: &mut PigeonRecord, owner: &mut HumanRecord, rewards: &Rewards) -> bool {
        let died = rewards::apply_to_pigeon(pigeon, rewards);
        rewards::apply_to_owner(owner, rewards);
        died
    }

    pub(crate) fn log_death(&self, pigeon: &PigeonRecord, died: bool) {
        if died {
            info!("Pigeon {} ({}) died", escape_log(&pigeon.name), pigeon.id);
        }
    }

    /// Buy a pigeon for `owner`. A dead pigeon may be replaced; a living one may not.
    pub fn buy_pigeon(&mut self, owner: UserId, name: &str) -> Result<PigeonRecord, PigeonError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(GuardViolation::EmptyName.into());
        }
        let mut human = self.store.get_or_create_human(owner)?;
        if let Some(current) = self.store.pigeon_of(owner)? {
            if current.is_alive() {
                return Err(GuardViolation::AlreadyOwned { name: current.name }.into());
            }
        }
        rewards::debit(&mut human, self.settings.pigeon_price)?;

        let gender = if self.rng.gen_bool(0.5) {
            Gender::Male
        } else {
            Gender::Female
        };
        let pigeon = PigeonRecord::new(&uuid::Uuid::new_v4().to_string(), owner, name, gender);
        human.pigeon_id = Some(pigeon.id.clone());
        self.store
            .commit(Changeset::new().put_pigeon(pigeon.clone()).put_human(human))?;
        info!(
            "User {} bought pigeon {} ({})",
            owner,
            escape_log(&pigeon.name),
            pigeon.id
        );
        Ok(pigeon)
    }

    /// Set the owner's country of residence. The code must resolve.
    pub fn set_country(&mut self, owner: UserId, code: &str) -> Result<HumanRecord, PigeonError> {
        let code = code.trim().to_ascii_uppercase();
        if self.geo.locate(&code).is_none() {
            return Err(GuardViolation::UnknownCountry { code }.into());
        }
        let mut human = self.store.get_or_create_human(owner)?;
        human.country_code = Some(code);
        self.store.put_human(human.clone())?;
        Ok(human)
    }

    /// Credit gold earned elsewhere (other games, admin grants).
    pub fn grant_gold(&mut self, owner: UserId, amount: i64) -> Result<HumanRecord, PigeonError> {
        if amount < 0 {
            return Err(GuardViolation::InvalidAmount { amount }.into());
        }
        let mut human = self.store.get_or_create_human(owner)?;
        rewards::credit(&mut human, amount);
        self.store.put_human(human.clone())?;
        Ok(human)
    }

    /// Read-only view of the owner's pigeon, subject to the death notice.
    pub fn pigeon_profile(&self, owner: UserId) -> Result<PigeonRecord, PigeonError> {
        self.living_pigeon(owner)
    }
}
