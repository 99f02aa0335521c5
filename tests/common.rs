//! Test utilities & fixtures shared by the pigeon integration tests.

use std::sync::Arc;

use pigeonbot::pigeon::{
    Coordinates, CountryAtlas, GeoProvider, ManualClock, PigeonEngine, PigeonRecord,
    PigeonSettings, PigeonStore, Stat, UserId,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::TempDir;

pub type TestEngine = PigeonEngine<ManualClock, StdRng>;

pub struct World {
    pub engine: TestEngine,
    pub clock: ManualClock,
    _dir: TempDir,
}

/// Engine over a throwaway store, a manual clock and a seeded RNG.
pub fn world_with(seed: u64, geo: Arc<dyn GeoProvider>, settings: PigeonSettings) -> World {
    let dir = tempfile::tempdir().expect("tempdir");
    let store = PigeonStore::open(dir.path()).expect("store");
    let clock = ManualClock::default();
    let engine = PigeonEngine::with_parts(
        store,
        settings,
        geo,
        clock.clone(),
        StdRng::seed_from_u64(seed),
    );
    World {
        engine,
        clock,
        _dir: dir,
    }
}

#[allow(dead_code)]
pub fn world_with_geo(seed: u64, geo: Arc<dyn GeoProvider>) -> World {
    world_with(seed, geo, PigeonSettings::default())
}

#[allow(dead_code)]
pub fn world(seed: u64) -> World {
    world_with_geo(seed, Arc::new(CountryAtlas::default()))
}

/// Owner with 500 gold, a residence and a new pigeon (450 gold left).
pub fn owner(engine: &mut TestEngine, user: UserId, country: &str) -> PigeonRecord {
    engine.grant_gold(user, 500).expect("grant");
    engine.set_country(user, country).expect("country");
    engine.buy_pigeon(user, &format!("pigeon-{}", user)).expect("buy")
}

#[allow(dead_code)]
pub fn set_all_stats(engine: &TestEngine, user: UserId, value: u8) {
    let mut pigeon = engine.store().pigeon_of(user).unwrap().unwrap();
    for stat in Stat::ALL {
        pigeon.set_stat(stat, value);
    }
    engine.store().put_pigeon(pigeon).unwrap();
}

#[allow(dead_code)]
pub fn gold(engine: &TestEngine, user: UserId) -> i64 {
    engine.store().get_human(user).unwrap().gold
}

/// Three-country world: `HOME`, `FAR` exactly 3000 km away, and `VOID`
/// which has no coordinates.
#[allow(dead_code)]
pub struct FixedGeo;

impl GeoProvider for FixedGeo {
    fn country_codes(&self) -> Vec<String> {
        ["HOME", "VOID", "FAR"].iter().map(|c| c.to_string()).collect()
    }

    fn locate(&self, code: &str) -> Option<Coordinates> {
        match code {
            "HOME" => Some(Coordinates::new(0.0, 0.0)),
            "FAR" => Some(Coordinates::new(0.0, 27.0)),
            _ => None,
        }
    }

    fn language(&self, code: &str) -> Option<String> {
        (code == "FAR").then(|| "Farish".to_string())
    }

    fn country_name(&self, code: &str) -> Option<String> {
        Some(code.to_string())
    }

    fn distance_km(&self, from: &str, to: &str) -> Option<f64> {
        self.locate(from)?;
        self.locate(to)?;
        Some(if from == to { 0.0 } else { 3000.0 })
    }
}
