use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError, TransactionalTree};
use sled::Transactional;

use crate::pigeon::errors::PigeonError;
use crate::pigeon::types::{
    ExplorationRecord, FightRecord, HumanRecord, MailRecord, PigeonRecord, UserId, WagerRecord,
    EXPLORATION_SCHEMA_VERSION, FIGHT_SCHEMA_VERSION, HUMAN_SCHEMA_VERSION, MAIL_SCHEMA_VERSION,
    PIGEON_SCHEMA_VERSION, WAGER_SCHEMA_VERSION,
};

const TREE_HUMANS: &str = "pigeonbot_humans";
const TREE_PIGEONS: &str = "pigeonbot_pigeons";
const TREE_EXPLORATIONS: &str = "pigeonbot_explorations";
const TREE_MAIL: &str = "pigeonbot_mail";
const TREE_FIGHTS: &str = "pigeonbot_fights";
const TREE_WAGERS: &str = "pigeonbot_wagers";
const TREE_INDEX: &str = "pigeonbot_index";

/// Index entries point at the key of a record that is still open.
const OPEN_EXPLORATION: &str = "open_exploration";
const OPEN_MAIL: &str = "open_mail";
const OPEN_FIGHT: &str = "open_fight";
const DUE_FIGHT: &str = "due_fight";

type TxResult<T> = Result<T, ConflictableTransactionError<PigeonError>>;

fn abort<T>(err: PigeonError) -> TxResult<T> {
    Err(ConflictableTransactionError::Abort(err))
}

fn human_key(user_id: UserId) -> Vec<u8> {
    format!("humans:{:020}", user_id).into_bytes()
}

fn pigeon_key(id: &str) -> Vec<u8> {
    format!("pigeons:{}", id).into_bytes()
}

fn exploration_key(pigeon_id: &str, id: &str) -> Vec<u8> {
    format!("explorations:{}:{}", pigeon_id, id).into_bytes()
}

fn mail_key(recipient: UserId, id: &str) -> Vec<u8> {
    format!("mail:{:020}:{}", recipient, id).into_bytes()
}

fn fight_key(id: &str) -> Vec<u8> {
    format!("fights:{}", id).into_bytes()
}

fn wager_key(fight_id: &str, spectator: UserId) -> Vec<u8> {
    format!("wagers:{}:{:020}", fight_id, spectator).into_bytes()
}

fn open_key(kind: &str, pigeon_id: &str) -> Vec<u8> {
    format!("{}:{}", kind, pigeon_id).into_bytes()
}

fn due_millis(at: DateTime<Utc>) -> u64 {
    at.timestamp_millis().max(0) as u64
}

/// Due fights sort by start time, then id.
fn due_key(start: DateTime<Utc>, fight_id: &str) -> Vec<u8> {
    format!("{}:{:020}:{}", DUE_FIGHT, due_millis(start), fight_id).into_bytes()
}

/// Versioned record persisted in one of the store trees.
trait Record: Serialize + DeserializeOwned {
    const ENTITY: &'static str;
    const SCHEMA_VERSION: u8;
    fn schema_version(&self) -> u8;
    fn stamp(&mut self);
    fn key(&self) -> Vec<u8>;
}

macro_rules! impl_record {
    ($ty:ty, $entity:literal, $version:expr, $key:expr) => {
        impl Record for $ty {
            const ENTITY: &'static str = $entity;
            const SCHEMA_VERSION: u8 = $version;

            fn schema_version(&self) -> u8 {
                self.schema_version
            }

            fn stamp(&mut self) {
                self.schema_version = $version;
            }

            fn key(&self) -> Vec<u8> {
                ($key)(self)
            }
        }
    };
}

impl_record!(HumanRecord, "human", HUMAN_SCHEMA_VERSION, |r: &HumanRecord| human_key(r.user_id));
impl_record!(PigeonRecord, "pigeon", PIGEON_SCHEMA_VERSION, |r: &PigeonRecord| pigeon_key(&r.id));
impl_record!(
    ExplorationRecord,
    "exploration",
    EXPLORATION_SCHEMA_VERSION,
    |r: &ExplorationRecord| exploration_key(&r.pigeon_id, &r.id)
);
impl_record!(MailRecord, "mail", MAIL_SCHEMA_VERSION, |r: &MailRecord| mail_key(r.recipient, &r.id));
impl_record!(FightRecord, "fight", FIGHT_SCHEMA_VERSION, |r: &FightRecord| fight_key(&r.id));
impl_record!(WagerRecord, "wager", WAGER_SCHEMA_VERSION, |r: &WagerRecord| wager_key(
    &r.fight_id,
    r.spectator
));

fn serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, PigeonError> {
    Ok(bincode::serialize(value)?)
}

fn deserialize<T: Record>(bytes: &[u8]) -> Result<T, PigeonError> {
    let record: T = bincode::deserialize(bytes)?;
    if record.schema_version() != T::SCHEMA_VERSION {
        return Err(PigeonError::SchemaMismatch {
            entity: T::ENTITY,
            expected: T::SCHEMA_VERSION,
            found: record.schema_version(),
        });
    }
    Ok(record)
}

#[derive(Debug, Clone)]
enum Write {
    Human(HumanRecord),
    Pigeon(PigeonRecord),
    Exploration(ExplorationRecord),
    Mail(MailRecord),
    Fight(FightRecord),
    Wager(WagerRecord),
    RemoveFight(String),
}

/// Record writes that commit together or not at all.
#[derive(Debug, Clone, Default)]
pub struct Changeset {
    writes: Vec<Write>,
}

impl Changeset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_human(&mut self, human: HumanRecord) -> &mut Self {
        self.writes.push(Write::Human(human));
        self
    }

    pub fn put_pigeon(&mut self, pigeon: PigeonRecord) -> &mut Self {
        self.writes.push(Write::Pigeon(pigeon));
        self
    }

    pub fn put_exploration(&mut self, exploration: ExplorationRecord) -> &mut Self {
        self.writes.push(Write::Exploration(exploration));
        self
    }

    pub fn put_mail(&mut self, mail: MailRecord) -> &mut Self {
        self.writes.push(Write::Mail(mail));
        self
    }

    pub fn put_fight(&mut self, fight: FightRecord) -> &mut Self {
        self.writes.push(Write::Fight(fight));
        self
    }

    pub fn put_wager(&mut self, wager: WagerRecord) -> &mut Self {
        self.writes.push(Write::Wager(wager));
        self
    }

    pub fn remove_fight(&mut self, id: &str) -> &mut Self {
        self.writes.push(Write::RemoveFight(id.to_string()));
        self
    }

    pub fn len(&self) -> usize {
        self.writes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.writes.is_empty()
    }
}

/// The store trees as seen from inside one transaction.
struct Trees<'a> {
    humans: &'a TransactionalTree,
    pigeons: &'a TransactionalTree,
    explorations: &'a TransactionalTree,
    mail: &'a TransactionalTree,
    fights: &'a TransactionalTree,
    wagers: &'a TransactionalTree,
    index: &'a TransactionalTree,
}

impl Trees<'_> {
    fn insert<T: Record>(tree: &TransactionalTree, mut record: T) -> TxResult<()> {
        record.stamp();
        let bytes = serialize(&record).map_err(ConflictableTransactionError::Abort)?;
        tree.insert(record.key(), bytes)?;
        Ok(())
    }

    /// Point `index_key` at `record_key` while open; drop the entry once it closes.
    fn index_open(&self, index_key: Vec<u8>, record_key: &[u8], open: bool) -> TxResult<()> {
        if open {
            self.index.insert(index_key, record_key)?;
        } else if self.index.get(&index_key)?.as_deref() == Some(record_key) {
            self.index.remove(index_key)?;
        }
        Ok(())
    }

    fn index_fight(&self, fight: &FightRecord, open: bool) -> TxResult<()> {
        let key = fight.key();
        for pigeon_id in [&fight.challenger, &fight.challengee] {
            self.index_open(open_key(OPEN_FIGHT, pigeon_id), &key, open && !fight.finished)?;
        }
        if let Some(start) = fight.start_date {
            let due = open && fight.accepted && !fight.finished;
            self.index_open(due_key(start, &fight.id), &key, due)?;
        }
        Ok(())
    }

    fn apply(&self, write: &Write) -> TxResult<()> {
        match write.clone() {
            Write::Human(mut human) => {
                human.touch();
                Self::insert(self.humans, human)
            }
            Write::Pigeon(mut pigeon) => {
                pigeon.touch();
                Self::insert(self.pigeons, pigeon)
            }
            Write::Exploration(exploration) => {
                let index_key = open_key(OPEN_EXPLORATION, &exploration.pigeon_id);
                self.index_open(index_key, &exploration.key(), !exploration.finished)?;
                Self::insert(self.explorations, exploration)
            }
            Write::Mail(mail) => {
                let index_key = open_key(OPEN_MAIL, &mail.sender_pigeon_id);
                self.index_open(index_key, &mail.key(), !mail.finished)?;
                Self::insert(self.mail, mail)
            }
            Write::Fight(fight) => {
                self.index_fight(&fight, true)?;
                Self::insert(self.fights, fight)
            }
            Write::Wager(wager) => Self::insert(self.wagers, wager),
            Write::RemoveFight(id) => {
                let key = fight_key(&id);
                if let Some(bytes) = self.fights.get(&key)? {
                    let fight: FightRecord =
                        deserialize(&bytes).map_err(ConflictableTransactionError::Abort)?;
                    self.index_fight(&fight, false)?;
                    self.fights.remove(key)?;
                }
                Ok(())
            }
        }
    }

    fn apply_all(&self, changes: &Changeset) -> TxResult<()> {
        for write in &changes.writes {
            self.apply(write)?;
        }
        Ok(())
    }

    /// Read the record at `key` and let `settle` decide whether it may change.
    /// `None` means it was already settled and aborts the whole transaction.
    fn claim<T, F>(tree: &TransactionalTree, key: &[u8], settle: &F) -> TxResult<T>
    where
        T: Record,
        F: Fn(&T) -> Option<T>,
    {
        let Some(current) = tree.get(key)? else {
            return abort(PigeonError::NotFound(format!(
                "{}: {}",
                T::ENTITY,
                String::from_utf8_lossy(key)
            )));
        };
        let record: T = deserialize(&current).map_err(ConflictableTransactionError::Abort)?;
        match settle(&record) {
            Some(updated) => Ok(updated),
            None => abort(PigeonError::Conflict(format!("{} already settled", T::ENTITY))),
        }
    }
}

/// Helper builder so tests can easily create throwaway stores with custom paths.
pub struct PigeonStoreBuilder {
    path: PathBuf,
    temporary: bool,
}

impl PigeonStoreBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            temporary: false,
        }
    }

    /// Remove the database files when the store is dropped.
    pub fn temporary(mut self) -> Self {
        self.temporary = true;
        self
    }

    pub fn open(self) -> Result<PigeonStore, PigeonError> {
        std::fs::create_dir_all(&self.path)?;
        let db = sled::Config::new()
            .path(&self.path)
            .temporary(self.temporary)
            .open()?;
        PigeonStore::from_db(db)
    }
}

/// Sled-backed persistence for owners, pigeons and their activities.
///
/// Every write goes through a transaction that also maintains the index tree,
/// so open activities and due fights are found without scanning history.
#[derive(Clone)]
pub struct PigeonStore {
    db: sled::Db,
    humans: sled::Tree,
    pigeons: sled::Tree,
    explorations: sled::Tree,
    mail: sled::Tree,
    fights: sled::Tree,
    wagers: sled::Tree,
    index: sled::Tree,
}

impl PigeonStore {
    /// Open (or create) the pigeon store rooted at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, PigeonError> {
        PigeonStoreBuilder::new(path.as_ref()).open()
    }

    fn from_db(db: sled::Db) -> Result<Self, PigeonError> {
        Ok(Self {
            humans: db.open_tree(TREE_HUMANS)?,
            pigeons: db.open_tree(TREE_PIGEONS)?,
            explorations: db.open_tree(TREE_EXPLORATIONS)?,
            mail: db.open_tree(TREE_MAIL)?,
            fights: db.open_tree(TREE_FIGHTS)?,
            wagers: db.open_tree(TREE_WAGERS)?,
            index: db.open_tree(TREE_INDEX)?,
            db,
        })
    }

    fn get<T: Record>(tree: &sled::Tree, key: &[u8]) -> Result<Option<T>, PigeonError> {
        match tree.get(key)? {
            Some(bytes) => Ok(Some(deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn scan<T: Record>(tree: &sled::Tree, prefix: &str) -> Result<Vec<T>, PigeonError> {
        tree.scan_prefix(prefix.as_bytes())
            .map(|entry| {
                entry
                    .map_err(PigeonError::from)
                    .and_then(|(_key, value)| deserialize(&value))
            })
            .collect()
    }

    /// Follow an index entry to the record it points at.
    fn indexed<T: Record>(&self, tree: &sled::Tree, index_key: &[u8]) -> Result<Option<T>, PigeonError> {
        match self.index.get(index_key)? {
            Some(record_key) => Self::get(tree, &record_key),
            None => Ok(None),
        }
    }

    fn transact<T, F>(&self, body: F) -> Result<T, PigeonError>
    where
        F: Fn(&Trees<'_>) -> TxResult<T>,
    {
        let outcome = (
            &self.humans,
            &self.pigeons,
            &self.explorations,
            &self.mail,
            &self.fights,
            &self.wagers,
            &self.index,
        )
            .transaction(|(humans, pigeons, explorations, mail, fights, wagers, index)| {
                body(&Trees {
                    humans,
                    pigeons,
                    explorations,
                    mail,
                    fights,
                    wagers,
                    index,
                })
            });
        match outcome {
            Ok(value) => {
                self.db.flush()?;
                Ok(value)
            }
            Err(TransactionError::Abort(err)) => {
                if let PigeonError::Conflict(reason) = &err {
                    debug!("Claim rejected: {}", reason);
                }
                Err(err)
            }
            Err(TransactionError::Storage(err)) => Err(err.into()),
        }
    }

    /// Write every record in `changes` atomically.
    pub fn commit(&self, changes: &Changeset) -> Result<(), PigeonError> {
        if changes.is_empty() {
            return Ok(());
        }
        self.transact(|trees| trees.apply_all(changes))
    }

    fn commit_one(&self, write: Write) -> Result<(), PigeonError> {
        self.commit(&Changeset {
            writes: vec![write],
        })
    }

    // ------------------------------------------------------------------
    // Humans
    // ------------------------------------------------------------------

    /// Insert or update an owner record.
    pub fn put_human(&self, human: HumanRecord) -> Result<(), PigeonError> {
        self.commit_one(Write::Human(human))
    }

    pub fn get_human(&self, user_id: UserId) -> Result<HumanRecord, PigeonError> {
        self.find_human(user_id)?
            .ok_or_else(|| PigeonError::NotFound(format!("human: {}", user_id)))
    }

    pub fn find_human(&self, user_id: UserId) -> Result<Option<HumanRecord>, PigeonError> {
        Self::get(&self.humans, &human_key(user_id))
    }

    /// Fetch an owner, inserting a fresh zero-gold record on first contact.
    pub fn get_or_create_human(&self, user_id: UserId) -> Result<HumanRecord, PigeonError> {
        if let Some(human) = self.find_human(user_id)? {
            return Ok(human);
        }
        let human = HumanRecord::new(user_id);
        self.put_human(human.clone())?;
        Ok(human)
    }

    pub fn list_humans(&self) -> Result<Vec<HumanRecord>, PigeonError> {
        Self::scan(&self.humans, "humans:")
    }

    // ------------------------------------------------------------------
    // Pigeons
    // ------------------------------------------------------------------

    pub fn put_pigeon(&self, pigeon: PigeonRecord) -> Result<(), PigeonError> {
        self.commit_one(Write::Pigeon(pigeon))
    }

    pub fn get_pigeon(&self, id: &str) -> Result<PigeonRecord, PigeonError> {
        Self::get(&self.pigeons, &pigeon_key(id))?
            .ok_or_else(|| PigeonError::NotFound(format!("pigeon: {}", id)))
    }

    /// The owner's current pigeon, dead or alive.
    pub fn pigeon_of(&self, user_id: UserId) -> Result<Option<PigeonRecord>, PigeonError> {
        let Some(human) = self.find_human(user_id)? else {
            return Ok(None);
        };
        match human.pigeon_id {
            Some(id) => Self::get(&self.pigeons, &pigeon_key(&id)),
            None => Ok(None),
        }
    }

    pub fn list_pigeons(&self) -> Result<Vec<PigeonRecord>, PigeonError> {
        Self::scan(&self.pigeons, "pigeons:")
    }

    // ------------------------------------------------------------------
    // Explorations
    // ------------------------------------------------------------------

    pub fn get_exploration(&self, pigeon_id: &str, id: &str) -> Result<ExplorationRecord, PigeonError> {
        Self::get(&self.explorations, &exploration_key(pigeon_id, id))?
            .ok_or_else(|| PigeonError::NotFound(format!("exploration: {}", id)))
    }

    pub fn list_explorations(&self) -> Result<Vec<ExplorationRecord>, PigeonError> {
        Self::scan(&self.explorations, "explorations:")
    }

    /// Every exploration of one pigeon, finished or not.
    pub fn explorations_of(&self, pigeon_id: &str) -> Result<Vec<ExplorationRecord>, PigeonError> {
        Self::scan(&self.explorations, &format!("explorations:{}:", pigeon_id))
    }

    /// The unfinished exploration of a pigeon, if any.
    pub fn open_exploration(&self, pigeon_id: &str) -> Result<Option<ExplorationRecord>, PigeonError> {
        let open: Option<ExplorationRecord> =
            self.indexed(&self.explorations, &open_key(OPEN_EXPLORATION, pigeon_id))?;
        Ok(open.filter(|e| !e.finished))
    }

    pub fn finished_exploration_count(&self, pigeon_id: &str) -> Result<usize, PigeonError> {
        Ok(self
            .explorations_of(pigeon_id)?
            .iter()
            .filter(|e| e.finished)
            .count())
    }

    /// Settle an exploration exactly once, committing `effects` with it.
    pub fn claim_exploration<F>(
        &self,
        exploration: &ExplorationRecord,
        settle: F,
        effects: &Changeset,
    ) -> Result<ExplorationRecord, PigeonError>
    where
        F: Fn(&ExplorationRecord) -> Option<ExplorationRecord>,
    {
        let key = exploration.key();
        self.transact(|trees| {
            let settled: ExplorationRecord = Trees::claim(trees.explorations, &key, &settle)?;
            trees.apply(&Write::Exploration(settled.clone()))?;
            trees.apply_all(effects)?;
            Ok(settled)
        })
    }

    // ------------------------------------------------------------------
    // Mail
    // ------------------------------------------------------------------

    pub fn get_mail(&self, recipient: UserId, id: &str) -> Result<MailRecord, PigeonError> {
        Self::get(&self.mail, &mail_key(recipient, id))?
            .ok_or_else(|| PigeonError::NotFound(format!("mail: {}", id)))
    }

    pub fn list_mail(&self) -> Result<Vec<MailRecord>, PigeonError> {
        Self::scan(&self.mail, "mail:")
    }

    /// Mail the pigeon is still carrying.
    pub fn open_mail(&self, pigeon_id: &str) -> Result<Option<MailRecord>, PigeonError> {
        let open: Option<MailRecord> = self.indexed(&self.mail, &open_key(OPEN_MAIL, pigeon_id))?;
        Ok(open.filter(|m| !m.finished))
    }

    /// Delivered mail addressed to `user_id`, oldest first.
    pub fn inbox(&self, user_id: UserId) -> Result<Vec<MailRecord>, PigeonError> {
        let mut mail: Vec<MailRecord> = Self::scan::<MailRecord>(&self.mail, &format!("mail:{:020}:", user_id))?
            .into_iter()
            .filter(|m| m.finished)
            .collect();
        mail.sort_by_key(|m| m.end_date);
        Ok(mail)
    }

    pub fn unread_count(&self, user_id: UserId) -> Result<usize, PigeonError> {
        Ok(self.inbox(user_id)?.iter().filter(|m| !m.read).count())
    }

    /// Settle (or mark read) a mail exactly once, committing `effects` with it.
    pub fn claim_mail<F>(&self, mail: &MailRecord, settle: F, effects: &Changeset) -> Result<MailRecord, PigeonError>
    where
        F: Fn(&MailRecord) -> Option<MailRecord>,
    {
        let key = mail.key();
        self.transact(|trees| {
            let settled: MailRecord = Trees::claim(trees.mail, &key, &settle)?;
            trees.apply(&Write::Mail(settled.clone()))?;
            trees.apply_all(effects)?;
            Ok(settled)
        })
    }

    // ------------------------------------------------------------------
    // Fights
    // ------------------------------------------------------------------

    pub fn get_fight(&self, id: &str) -> Result<FightRecord, PigeonError> {
        Self::get(&self.fights, &fight_key(id))?
            .ok_or_else(|| PigeonError::NotFound(format!("fight: {}", id)))
    }

    pub fn list_fights(&self) -> Result<Vec<FightRecord>, PigeonError> {
        Self::scan(&self.fights, "fights:")
    }

    /// Pending or accepted fight the pigeon takes part in.
    pub fn open_fight(&self, pigeon_id: &str) -> Result<Option<FightRecord>, PigeonError> {
        let open: Option<FightRecord> = self.indexed(&self.fights, &open_key(OPEN_FIGHT, pigeon_id))?;
        Ok(open.filter(|f| !f.finished && f.involves(pigeon_id)))
    }

    /// Unanswered challenge addressed to the pigeon.
    pub fn pending_challenge(&self, challengee_id: &str) -> Result<Option<FightRecord>, PigeonError> {
        Ok(self
            .open_fight(challengee_id)?
            .filter(|f| f.is_pending() && f.challengee == challengee_id))
    }

    /// Accepted, unresolved fights whose start date is at or before `now`, earliest first.
    pub fn due_fights(&self, now: DateTime<Utc>) -> Result<Vec<FightRecord>, PigeonError> {
        let start = format!("{}:", DUE_FIGHT);
        // ';' sorts right after ':', so this bound covers every id due at `now`.
        let end = format!("{}:{:020};", DUE_FIGHT, due_millis(now));
        let mut due = Vec::new();
        for entry in self.index.range(start.as_bytes()..end.as_bytes()) {
            let (_key, record_key) = entry?;
            if let Some(fight) = Self::get::<FightRecord>(&self.fights, &record_key)? {
                if fight.accepted && !fight.finished && fight.start_date.is_some_and(|s| s <= now) {
                    due.push(fight);
                }
            }
        }
        Ok(due)
    }

    /// Answer or resolve a fight exactly once, committing `effects` with it.
    pub fn claim_fight<F>(&self, id: &str, settle: F, effects: &Changeset) -> Result<FightRecord, PigeonError>
    where
        F: Fn(&FightRecord) -> Option<FightRecord>,
    {
        let key = fight_key(id);
        self.transact(|trees| {
            let settled: FightRecord = Trees::claim(trees.fights, &key, &settle)?;
            trees.apply(&Write::Fight(settled.clone()))?;
            trees.apply_all(effects)?;
            Ok(settled)
        })
    }

    // ------------------------------------------------------------------
    // Wagers
    // ------------------------------------------------------------------

    pub fn get_wager(&self, fight_id: &str, spectator: UserId) -> Result<Option<WagerRecord>, PigeonError> {
        Self::get(&self.wagers, &wager_key(fight_id, spectator))
    }

    pub fn wagers_for(&self, fight_id: &str) -> Result<Vec<WagerRecord>, PigeonError> {
        Self::scan(&self.wagers, &format!("wagers:{}:", fight_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pigeon::types::Gender;
    use chrono::Duration;
    use tempfile::TempDir;

    fn fight(id: &str, accepted: bool, start: Option<DateTime<Utc>>) -> FightRecord {
        FightRecord {
            id: id.to_string(),
            challenger: format!("{}-a", id),
            challengee: format!("{}-b", id),
            challenger_owner: 1,
            challengee_owner: 2,
            bet: 10,
            accepted,
            created_at: Utc::now(),
            start_date: start,
            finished: false,
            won: None,
            schema_version: FIGHT_SCHEMA_VERSION,
        }
    }

    fn save_fight(store: &PigeonStore, fight: FightRecord) -> Result<(), PigeonError> {
        store.commit(Changeset::new().put_fight(fight))
    }

    fn save_exploration(store: &PigeonStore, exploration: ExplorationRecord) -> Result<(), PigeonError> {
        store.commit(Changeset::new().put_exploration(exploration))
    }

    fn save_mail(store: &PigeonStore, mail: MailRecord) -> Result<(), PigeonError> {
        store.commit(Changeset::new().put_mail(mail))
    }

    fn exploration(id: &str, pigeon_id: &str, finished: bool) -> ExplorationRecord {
        let now = Utc::now();
        ExplorationRecord {
            id: id.to_string(),
            pigeon_id: pigeon_id.to_string(),
            residence: "NL".to_string(),
            destination: "FR".to_string(),
            distance_km: 430,
            start_date: now,
            end_date: now + Duration::minutes(26),
            finished,
            schema_version: EXPLORATION_SCHEMA_VERSION,
        }
    }

    #[test]
    fn store_round_trip_human_and_pigeon() {
        let dir = TempDir::new().expect("tempdir");
        let store = PigeonStoreBuilder::new(dir.path()).open().expect("store");
        let mut human = store.get_or_create_human(42).expect("human");
        assert_eq!(human.gold, 0);
        human.gold = 120;
        human.pigeon_id = Some("p1".to_string());
        store.put_human(human).expect("put human");
        store
            .put_pigeon(PigeonRecord::new("p1", 42, "Duif", Gender::Male))
            .expect("put pigeon");

        let fetched = store.get_human(42).expect("get");
        assert_eq!(fetched.gold, 120);
        let pigeon = store.pigeon_of(42).expect("lookup").expect("pigeon");
        assert_eq!(pigeon.name, "Duif");
        assert!(store.pigeon_of(99).expect("lookup").is_none());
    }

    #[test]
    fn temporary_store_works_like_a_regular_one() {
        let dir = TempDir::new().expect("tempdir");
        let store = PigeonStoreBuilder::new(dir.path().join("scratch"))
            .temporary()
            .open()
            .expect("store");
        store.get_or_create_human(7).expect("human");
        assert_eq!(store.get_human(7).expect("get").gold, 0);
    }

    #[test]
    fn missing_human_is_not_found() {
        let dir = TempDir::new().expect("tempdir");
        let store = PigeonStore::open(dir.path()).expect("store");
        assert!(matches!(store.get_human(5), Err(PigeonError::NotFound(_))));
        assert!(store.find_human(5).unwrap().is_none());
    }

    #[test]
    fn due_fights_filters_by_acceptance_and_date() {
        let dir = TempDir::new().expect("tempdir");
        let store = PigeonStore::open(dir.path()).expect("store");
        let now = Utc::now();
        save_fight(&store, fight("pending", false, None)).unwrap();
        save_fight(&store, fight("later", true, Some(now + Duration::minutes(5))))
            .unwrap();
        save_fight(&store, fight("due", true, Some(now - Duration::seconds(1))))
            .unwrap();
        save_fight(&store, fight("sharp", true, Some(now))).unwrap();

        let due = store.due_fights(now).unwrap();
        let ids: Vec<&str> = due.iter().map(|f| f.id.as_str()).collect();
        assert_eq!(ids, vec!["due", "sharp"]);
        assert_eq!(
            store.pending_challenge("pending-b").unwrap().unwrap().id,
            "pending"
        );
        assert!(store.pending_challenge("pending-a").unwrap().is_none());
    }

    #[test]
    fn finished_and_removed_fights_leave_the_indexes() {
        let dir = TempDir::new().expect("tempdir");
        let store = PigeonStore::open(dir.path()).expect("store");
        let now = Utc::now();
        let mut done = fight("done", true, Some(now - Duration::minutes(1)));
        save_fight(&store, done.clone()).unwrap();
        assert!(store.open_fight("done-a").unwrap().is_some());

        done.finished = true;
        save_fight(&store, done).unwrap();
        assert!(store.open_fight("done-a").unwrap().is_none());
        assert!(store.due_fights(now).unwrap().is_empty());

        save_fight(&store, fight("gone", false, None)).unwrap();
        store.commit(Changeset::new().remove_fight("gone")).unwrap();
        assert!(store.open_fight("gone-b").unwrap().is_none());
        assert!(store.get_fight("gone").is_err());
        assert_eq!(store.list_fights().unwrap().len(), 1);
    }

    #[test]
    fn open_exploration_comes_from_the_index() {
        let dir = TempDir::new().expect("tempdir");
        let store = PigeonStore::open(dir.path()).expect("store");
        for n in 0..3 {
            save_exploration(&store, exploration(&format!("old{}", n), "p1", true))
                .unwrap();
        }
        save_exploration(&store, exploration("other", "p10", false)).unwrap();
        assert!(store.open_exploration("p1").unwrap().is_none());
        assert_eq!(store.finished_exploration_count("p1").unwrap(), 3);

        save_exploration(&store, exploration("new", "p1", false)).unwrap();
        assert_eq!(store.open_exploration("p1").unwrap().unwrap().id, "new");
        assert_eq!(store.open_exploration("p10").unwrap().unwrap().id, "other");
        assert_eq!(store.explorations_of("p1").unwrap().len(), 4);
    }

    #[test]
    fn claim_settles_only_once() {
        let dir = TempDir::new().expect("tempdir");
        let store = PigeonStore::open(dir.path()).expect("store");
        save_fight(&store, fight("f1", true, Some(Utc::now()))).unwrap();

        let settle = |f: &FightRecord| {
            (!f.finished).then(|| FightRecord {
                finished: true,
                won: Some(true),
                ..f.clone()
            })
        };
        let first = store.claim_fight("f1", settle, &Changeset::new()).expect("first claim");
        assert!(first.finished);
        let second = store.claim_fight("f1", settle, &Changeset::new());
        assert!(matches!(second, Err(PigeonError::Conflict(_))));
    }

    #[test]
    fn rejected_claim_discards_its_effects() {
        let dir = TempDir::new().expect("tempdir");
        let store = PigeonStore::open(dir.path()).expect("store");
        let mut human = HumanRecord::new(1);
        human.gold = 10;
        store.put_human(human.clone()).unwrap();
        save_exploration(&store, exploration("e1", "p1", true)).unwrap();

        human.gold = 500;
        let mut effects = Changeset::new();
        effects.put_human(human);
        let err = store
            .claim_exploration(
                &exploration("e1", "p1", true),
                |e| (!e.finished).then(|| e.clone()),
                &effects,
            )
            .unwrap_err();
        assert!(matches!(err, PigeonError::Conflict(_)));
        assert_eq!(store.get_human(1).unwrap().gold, 10);
    }

    #[test]
    fn claim_commits_record_and_effects_together() {
        let dir = TempDir::new().expect("tempdir");
        let store = PigeonStore::open(dir.path()).expect("store");
        let trip = exploration("e1", "p1", false);
        save_exploration(&store, trip.clone()).unwrap();
        let mut pigeon = PigeonRecord::new("p1", 1, "Duif", Gender::Female);
        pigeon.experience = 12;
        let mut effects = Changeset::new();
        effects.put_pigeon(pigeon).put_human(HumanRecord::new(1));
        assert_eq!(effects.len(), 2);

        let settled = store
            .claim_exploration(
                &trip,
                |e| {
                    (!e.finished).then(|| ExplorationRecord {
                        finished: true,
                        ..e.clone()
                    })
                },
                &effects,
            )
            .unwrap();
        assert!(settled.finished);
        assert!(store.get_exploration("p1", "e1").unwrap().finished);
        assert!(store.open_exploration("p1").unwrap().is_none());
        assert_eq!(store.get_pigeon("p1").unwrap().experience, 12);
        assert!(store.find_human(1).unwrap().is_some());
    }

    #[test]
    fn inbox_only_lists_the_recipients_delivered_mail() {
        let dir = TempDir::new().expect("tempdir");
        let store = PigeonStore::open(dir.path()).expect("store");
        let now = Utc::now();
        let letter = |id: &str, recipient: UserId, finished: bool| MailRecord {
            id: id.to_string(),
            sender_pigeon_id: format!("sender-{}", id),
            sender: 1,
            recipient,
            message: "hoi".to_string(),
            gold: 0,
            residence: "NL".to_string(),
            destination: None,
            distance_km: 0,
            start_date: now,
            end_date: now,
            read: false,
            finished,
            schema_version: MAIL_SCHEMA_VERSION,
        };
        save_mail(&store, letter("m1", 2, true)).unwrap();
        save_mail(&store, letter("m2", 2, false)).unwrap();
        save_mail(&store, letter("m3", 20, true)).unwrap();

        let inbox = store.inbox(2).unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].id, "m1");
        assert_eq!(store.open_mail("sender-m2").unwrap().unwrap().id, "m2");
        assert!(store.open_mail("sender-m1").unwrap().is_none());
        assert_eq!(store.get_mail(20, "m3").unwrap().recipient, 20);
    }
}
