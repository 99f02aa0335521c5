//! Pigeon fights: challenge, accept/decline, spectator wagers and the periodic
//! resolution run by the ticker.
//!
//! A fight moves Pending -> Accepted -> Finished. Both pigeons are reserved
//! (`Fighting`) from the moment of the challenge. Stakes are taken from both
//! owners only at acceptance; the winner's owner receives both stakes.

use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::fmt;

use chrono::Duration;
use log::{debug, error, info, warn};
use rand::Rng;

use crate::logutil::escape_log;
use crate::pigeon::clock::Clock;
use crate::pigeon::engine::PigeonEngine;
use crate::pigeon::errors::{GuardViolation, PigeonError};
use crate::pigeon::rewards::{self, Rewards};
use crate::pigeon::status::{ensure_available, transition};
use crate::pigeon::storage::Changeset;
use crate::pigeon::types::{
    FightRecord, HumanRecord, PigeonRecord, PigeonStatus, Stat, UserId, WagerRecord, FIGHT_SCHEMA_VERSION,
    WAGER_SCHEMA_VERSION,
};

#[derive(Debug, Clone, PartialEq)]
pub enum AcceptOutcome {
    Accepted { fight: FightRecord },
    /// One side could no longer cover the bet; the fight was deleted.
    Cancelled {
        short_user: UserId,
        required: i64,
        available: i64,
    },
    /// The challenge was answered or withdrawn concurrently.
    AlreadyAnswered,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FightReport {
    pub fight: FightRecord,
    pub winner_name: String,
    pub loser_name: String,
    pub winner_owner: UserId,
    pub loser_owner: UserId,
    pub pot: i64,
    pub winner_died: bool,
    pub loser_died: bool,
    /// Spectators paid out, with the amount each received.
    pub wager_payouts: Vec<(UserId, i64)>,
}

impl fmt::Display for FightReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} defeated {}", self.winner_name, self.loser_name)?;
        if self.pot > 0 {
            write!(f, " and won {} gold", self.pot)?;
        }
        if self.loser_died {
            write!(f, ". {} did not survive", self.loser_name)?;
        }
        if self.winner_died {
            write!(f, ". {} died of its wounds", self.winner_name)?;
        }
        Ok(())
    }
}

impl<C: Clock, R: Rng> PigeonEngine<C, R> {
    /// Another owner's pigeon. Their death notice is left for them to receive.
    fn opponent_pigeon(&self, owner: UserId) -> Result<PigeonRecord, PigeonError> {
        self.store
            .pigeon_of(owner)?
            .ok_or_else(|| PigeonError::NotFound(format!("user {} has no pigeon", owner)))
    }

    fn ensure_not_fighting(&self, pigeon: &PigeonRecord) -> Result<(), PigeonError> {
        if self.store.open_fight(&pigeon.id)?.is_some() {
            return Err(GuardViolation::AlreadyFighting {
                name: pigeon.name.clone(),
            }
            .into());
        }
        Ok(())
    }

    /// Challenge another owner's pigeon. Both pigeons are reserved immediately.
    pub fn challenge(
        &mut self,
        challenger_owner: UserId,
        challengee_owner: UserId,
        bet: i64,
    ) -> Result<FightRecord, PigeonError> {
        if challenger_owner == challengee_owner {
            return Err(GuardViolation::SelfTarget.into());
        }
        if bet < 0 {
            return Err(GuardViolation::InvalidAmount { amount: bet }.into());
        }
        let mut challenger = self.living_pigeon(challenger_owner)?;
        let mut challengee = self.opponent_pigeon(challengee_owner)?;

        for pigeon in [&challenger, &challengee] {
            self.ensure_not_fighting(pigeon)?;
            ensure_available(pigeon, self.settings.stat_floor)?;
        }
        for owner in [challenger_owner, challengee_owner] {
            let human = self.store.get_or_create_human(owner)?;
            if human.gold < bet {
                return Err(GuardViolation::InsufficientGold {
                    user_id: owner,
                    required: bet,
                    available: human.gold,
                }
                .into());
            }
        }

        let fight = FightRecord {
            id: uuid::Uuid::new_v4().to_string(),
            challenger: challenger.id.clone(),
            challengee: challengee.id.clone(),
            challenger_owner,
            challengee_owner,
            bet,
            accepted: false,
            created_at: self.now(),
            start_date: None,
            finished: false,
            won: None,
            schema_version: FIGHT_SCHEMA_VERSION,
        };
        transition(&mut challenger, PigeonStatus::Fighting)?;
        transition(&mut challengee, PigeonStatus::Fighting)?;
        self.store.commit(
            Changeset::new()
                .put_fight(fight.clone())
                .put_pigeon(challenger.clone())
                .put_pigeon(challengee.clone()),
        )?;
        info!(
            "{} challenged {} for {} gold (fight {})",
            escape_log(&challenger.name),
            escape_log(&challengee.name),
            bet,
            fight.id
        );
        Ok(fight)
    }

    fn pending_for(&self, challengee_owner: UserId) -> Result<(PigeonRecord, FightRecord), PigeonError> {
        let pigeon = self.living_pigeon(challengee_owner)?;
        let fight = self
            .store
            .pending_challenge(&pigeon.id)?
            .ok_or_else(|| PigeonError::NotFound(format!("{} has no pending challenge", pigeon.name)))?;
        Ok((pigeon, fight))
    }

    /// Drop an unaccepted fight and release both pigeons.
    fn cancel_fight(&self, fight: &FightRecord) -> Result<(), PigeonError> {
        let mut changes = Changeset::new();
        changes.remove_fight(&fight.id);
        for id in [&fight.challenger, &fight.challengee] {
            let mut pigeon = self.store.get_pigeon(id)?;
            if pigeon.status == PigeonStatus::Fighting {
                transition(&mut pigeon, PigeonStatus::Idle)?;
                changes.put_pigeon(pigeon);
            }
        }
        self.store.commit(&changes)
    }

    /// Accept the pending challenge addressed to this owner's pigeon.
    pub fn accept(&mut self, challengee_owner: UserId) -> Result<AcceptOutcome, PigeonError> {
        let (_, fight) = self.pending_for(challengee_owner)?;

        let mut challenger_human = self.store.get_or_create_human(fight.challenger_owner)?;
        let mut challengee_human = self.store.get_or_create_human(fight.challengee_owner)?;
        for human in [&challenger_human, &challengee_human] {
            if human.gold < fight.bet {
                info!(
                    "Fight {} cancelled: user {} cannot cover {} gold",
                    fight.id, human.user_id, fight.bet
                );
                self.cancel_fight(&fight)?;
                return Ok(AcceptOutcome::Cancelled {
                    short_user: human.user_id,
                    required: fight.bet,
                    available: human.gold,
                });
            }
        }

        let delay = self.settings.fight_delay_minutes;
        let start_date = Duration::try_minutes(delay)
            .and_then(|delay| self.now().checked_add_signed(delay))
            .ok_or_else(|| PigeonError::Settings(format!("a {} minute fight delay cannot be scheduled", delay)))?;

        // Both stakes leave with the acceptance or not at all.
        rewards::debit(&mut challenger_human, fight.bet)?;
        rewards::debit(&mut challengee_human, fight.bet)?;
        let mut stakes = Changeset::new();
        stakes.put_human(challenger_human).put_human(challengee_human);
        let settle = |f: &FightRecord| {
            f.is_pending().then(|| FightRecord {
                accepted: true,
                start_date: Some(start_date),
                ..f.clone()
            })
        };
        let accepted = match self.store.claim_fight(&fight.id, settle, &stakes) {
            Ok(accepted) => accepted,
            Err(PigeonError::Conflict(reason)) => {
                debug!("Fight {} answered elsewhere: {}", fight.id, reason);
                return Ok(AcceptOutcome::AlreadyAnswered);
            }
            Err(e) => return Err(e),
        };

        info!("Fight {} accepted, starts at {}", accepted.id, start_date);
        Ok(AcceptOutcome::Accepted { fight: accepted })
    }

    /// Refuse the pending challenge. A timed-out prompt counts as a refusal.
    pub fn decline(&mut self, challengee_owner: UserId) -> Result<FightRecord, PigeonError> {
        let (_, fight) = self.pending_for(challengee_owner)?;
        self.cancel_fight(&fight)?;
        info!("Fight {} declined", fight.id);
        Ok(fight)
    }

    /// Bet on the fighter owned by `fighter_owner` in their accepted fight.
    pub fn place_wager(
        &mut self,
        spectator: UserId,
        fighter_owner: UserId,
        amount: i64,
    ) -> Result<WagerRecord, PigeonError> {
        if amount <= 0 {
            return Err(GuardViolation::InvalidAmount { amount }.into());
        }
        let fighter = self.opponent_pigeon(fighter_owner)?;
        let fight = self
            .store
            .open_fight(&fighter.id)?
            .ok_or_else(|| PigeonError::NotFound(format!("{} is not in a fight", fighter.name)))?;
        if fight.involves_owner(spectator) {
            return Err(GuardViolation::OwnFight.into());
        }
        if !fight.accepted {
            return Err(GuardViolation::WagersClosed.into());
        }
        if self.store.get_wager(&fight.id, spectator)?.is_some() {
            return Err(GuardViolation::DuplicateWager.into());
        }

        let mut human = self
            .store
            .find_human(spectator)?
            .unwrap_or_else(|| HumanRecord::new(spectator));
        rewards::debit(&mut human, amount)?;
        let wager = WagerRecord {
            fight_id: fight.id.clone(),
            spectator,
            backs_challenger: fight.challenger == fighter.id,
            amount,
            settled: false,
            created_at: self.now(),
            schema_version: WAGER_SCHEMA_VERSION,
        };
        self.store
            .commit(Changeset::new().put_wager(wager.clone()).put_human(human))?;
        info!(
            "User {} wagered {} on {} in fight {}",
            spectator,
            amount,
            escape_log(&fighter.name),
            fight.id
        );
        Ok(wager)
    }

    /// Settle every accepted fight whose start date has passed.
    /// Fights settled concurrently elsewhere are skipped.
    pub fn resolve_fights(&mut self) -> Result<Vec<FightReport>, PigeonError> {
        let due = self.store.due_fights(self.now())?;
        let mut reports = Vec::with_capacity(due.len());
        for fight in due {
            let id = fight.id.clone();
            match self.resolve_fight(fight) {
                Ok(report) => reports.push(report),
                Err(PigeonError::Conflict(reason)) => {
                    debug!("Fight {} already resolved: {}", id, reason);
                }
                Err(e) => error!("Failed to resolve fight {}: {}", id, e),
            }
        }
        Ok(reports)
    }

    /// Settle one due fight. The outcome, both fighters, both owners and every
    /// wager commit in one transaction guarded by the fight claim.
    fn resolve_fight(&mut self, fight: FightRecord) -> Result<FightReport, PigeonError> {
        let challenger_won = self.rng.gen_bool(0.5);
        let (winner_id, loser_id, winner_owner, loser_owner) = if challenger_won {
            (&fight.challenger, &fight.challengee, fight.challenger_owner, fight.challengee_owner)
        } else {
            (&fight.challengee, &fight.challenger, fight.challengee_owner, fight.challenger_owner)
        };
        let pot = fight.bet.saturating_mul(2);

        let winner_rewards = Rewards::default()
            .with_gold(pot)
            .with_experience(self.settings.fight_winner_experience)
            .with_stat(Stat::Health, self.settings.fight_winner_health);
        let loser_rewards = Rewards::default()
            .with_experience(self.settings.fight_loser_experience)
            .with_stat(Stat::Health, self.settings.fight_loser_health);

        let mut humans = HashMap::new();
        let mut effects = Changeset::new();
        let (winner, winner_died) = self.settle_fighter(winner_id, winner_owner, &winner_rewards, &mut humans)?;
        let (loser, loser_died) = self.settle_fighter(loser_id, loser_owner, &loser_rewards, &mut humans)?;
        let wager_payouts = self.settle_wagers(&fight.id, challenger_won, &mut humans, &mut effects)?;
        effects.put_pigeon(winner.clone()).put_pigeon(loser.clone());
        for human in humans.into_values() {
            effects.put_human(human);
        }

        let settle = |f: &FightRecord| {
            (f.accepted && !f.finished).then(|| FightRecord {
                finished: true,
                won: Some(challenger_won),
                ..f.clone()
            })
        };
        let fight = self.store.claim_fight(&fight.id, settle, &effects)?;

        self.log_death(&winner, winner_died);
        self.log_death(&loser, loser_died);
        info!(
            "Fight {} resolved: {} beat {} ({} gold to user {})",
            fight.id,
            escape_log(&winner.name),
            escape_log(&loser.name),
            pot,
            winner_owner
        );
        Ok(FightReport {
            fight,
            winner_name: winner.name,
            loser_name: loser.name,
            winner_owner,
            loser_owner,
            pot,
            winner_died,
            loser_died,
            wager_payouts,
        })
    }

    fn human_entry<'a>(
        &self,
        humans: &'a mut HashMap<UserId, HumanRecord>,
        user_id: UserId,
    ) -> Result<&'a mut HumanRecord, PigeonError> {
        Ok(match humans.entry(user_id) {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => {
                let human = self.store.find_human(user_id)?.unwrap_or_else(|| HumanRecord::new(user_id));
                entry.insert(human)
            }
        })
    }

    fn settle_fighter(
        &self,
        pigeon_id: &str,
        owner: UserId,
        rewards: &Rewards,
        humans: &mut HashMap<UserId, HumanRecord>,
    ) -> Result<(PigeonRecord, bool), PigeonError> {
        let mut pigeon = self.store.get_pigeon(pigeon_id)?;
        if pigeon.status == PigeonStatus::Fighting {
            transition(&mut pigeon, PigeonStatus::Idle)?;
        } else {
            warn!(
                "Pigeon {} was {} at fight resolution",
                pigeon.id, pigeon.status
            );
        }
        let human = self.human_entry(humans, owner)?;
        let died = self.apply_rewards(&mut pigeon, human, rewards);
        Ok((pigeon, died))
    }

    fn settle_wagers(
        &self,
        fight_id: &str,
        challenger_won: bool,
        humans: &mut HashMap<UserId, HumanRecord>,
        effects: &mut Changeset,
    ) -> Result<Vec<(UserId, i64)>, PigeonError> {
        let mut payouts = Vec::new();
        for wager in self.store.wagers_for(fight_id)? {
            if wager.settled {
                continue;
            }
            if wager.backs_challenger == challenger_won {
                let payout = wager.amount.saturating_mul(2);
                rewards::credit(self.human_entry(humans, wager.spectator)?, payout);
                payouts.push((wager.spectator, payout));
            }
            effects.put_wager(WagerRecord {
                settled: true,
                ..wager
            });
        }
        Ok(payouts)
    }
}
