//! Periodic fight settlement and outcome notification.
//!
//! [`FightTicker`] drives [`PigeonEngine::resolve_fights`] on a fixed interval
//! and hands every outcome to a [`Notifier`]. Delivery is fire-and-forget:
//! a failed notification is logged and counted, the settlement stands.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use rand::rngs::StdRng;
use rand::Rng;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::logutil::escape_log;
use crate::pigeon::clock::{Clock, SystemClock};
use crate::pigeon::engine::PigeonEngine;
use crate::pigeon::errors::PigeonError;
use crate::pigeon::fight::FightReport;
use crate::pigeon::types::UserId;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("recipient {0} unreachable")]
    Unreachable(UserId),
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Outbound message sink for settlement outcomes.
pub trait Notifier: Send + Sync {
    fn notify(&self, user: UserId, message: &str) -> Result<(), NotifyError>;
}

/// Writes notifications to the log. Used when no chat transport is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, user: UserId, message: &str) -> Result<(), NotifyError> {
        info!("[notify {}] {}", user, escape_log(message));
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickerStats {
    pub ticks: u64,
    pub fights_resolved: u64,
    pub notify_failures: u64,
    pub last_tick: Option<DateTime<Utc>>,
}

pub struct FightTicker<C: Clock = SystemClock, R: Rng = StdRng> {
    engine: Arc<Mutex<PigeonEngine<C, R>>>,
    notifier: Arc<dyn Notifier>,
    interval: Duration,
    stats: TickerStats,
}

impl<C: Clock, R: Rng> FightTicker<C, R> {
    /// Ticker using the engine's configured `resolve_interval_seconds`.
    pub async fn new(engine: Arc<Mutex<PigeonEngine<C, R>>>, notifier: Arc<dyn Notifier>) -> Self {
        let seconds = engine.lock().await.settings().resolve_interval_seconds.max(1);
        Self::with_interval(engine, notifier, Duration::from_secs(seconds))
    }

    pub fn with_interval(
        engine: Arc<Mutex<PigeonEngine<C, R>>>,
        notifier: Arc<dyn Notifier>,
        interval: Duration,
    ) -> Self {
        Self {
            engine,
            notifier,
            interval,
            stats: TickerStats::default(),
        }
    }

    pub fn stats(&self) -> &TickerStats {
        &self.stats
    }

    /// One settlement pass. The engine lock is released before notifying.
    pub async fn tick(&mut self) -> Result<Vec<FightReport>, PigeonError> {
        let (reports, now) = {
            let mut engine = self.engine.lock().await;
            (engine.resolve_fights()?, engine.now())
        };
        self.stats.ticks += 1;
        self.stats.fights_resolved += reports.len() as u64;
        self.stats.last_tick = Some(now);
        if !reports.is_empty() {
            debug!("Tick resolved {} fight(s)", reports.len());
        }
        for report in &reports {
            self.announce(report);
        }
        Ok(reports)
    }

    fn announce(&mut self, report: &FightReport) {
        let message = report.to_string();
        let mut deliveries = vec![(report.winner_owner, message.clone()), (report.loser_owner, message)];
        for (spectator, payout) in &report.wager_payouts {
            deliveries.push((
                *spectator,
                format!("{} won! Your wager paid {} gold", report.winner_name, payout),
            ));
        }
        for (user, text) in deliveries {
            if let Err(e) = self.notifier.notify(user, &text) {
                self.stats.notify_failures += 1;
                warn!("Failed to notify user {} about fight {}: {}", user, report.fight.id, e);
            }
        }
    }

    /// Tick until `shutdown` completes, then return the accumulated stats.
    pub async fn run<F>(mut self, shutdown: F) -> TickerStats
    where
        F: Future<Output = ()>,
    {
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        tokio::pin!(shutdown);
        info!("Fight ticker running every {:?}", self.interval);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Fight ticker stopping after {} tick(s)", self.stats.ticks);
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        error!("Fight resolution failed: {}", e);
                    }
                }
            }
        }
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pigeon::engine::test_support::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Recorder {
        sent: StdMutex<Vec<(UserId, String)>>,
    }

    impl Notifier for Recorder {
        fn notify(&self, user: UserId, message: &str) -> Result<(), NotifyError> {
            self.sent.lock().unwrap().push((user, message.to_string()));
            Ok(())
        }
    }

    struct Unreachable;

    impl Notifier for Unreachable {
        fn notify(&self, user: UserId, _message: &str) -> Result<(), NotifyError> {
            Err(NotifyError::Unreachable(user))
        }
    }

    fn accepted_fight(seed: u64) -> (Harness, chrono::Duration) {
        let mut h = harness(seed);
        owner_with_pigeon(&mut h.engine, 1, "NL");
        owner_with_pigeon(&mut h.engine, 2, "DE");
        h.engine.challenge(1, 2, 25).unwrap();
        h.engine.accept(2).unwrap();
        (h, chrono::Duration::minutes(5))
    }

    #[tokio::test]
    async fn tick_notifies_both_owners() {
        let (h, delay) = accepted_fight(41);
        let (engine, clock, _dir) = h.into_parts();
        let engine = Arc::new(Mutex::new(engine));
        let recorder = Arc::new(Recorder::default());
        let mut ticker = FightTicker::with_interval(engine.clone(), recorder.clone(), Duration::from_millis(10));

        assert!(ticker.tick().await.unwrap().is_empty());
        clock.advance(delay);
        let reports = ticker.tick().await.unwrap();
        assert_eq!(reports.len(), 1);

        let sent = recorder.sent.lock().unwrap();
        let mut users: Vec<UserId> = sent.iter().map(|(u, _)| *u).collect();
        users.sort();
        assert_eq!(users, vec![1, 2]);
        assert!(sent[0].1.contains("defeated"));
        assert_eq!(ticker.stats().ticks, 2);
        assert_eq!(ticker.stats().fights_resolved, 1);
    }

    #[tokio::test]
    async fn failed_notifications_do_not_undo_settlement() {
        let (h, delay) = accepted_fight(42);
        let (engine, clock, _dir) = h.into_parts();
        clock.advance(delay);
        let engine = Arc::new(Mutex::new(engine));
        let mut ticker = FightTicker::with_interval(engine.clone(), Arc::new(Unreachable), Duration::from_millis(10));

        let reports = ticker.tick().await.unwrap();
        assert_eq!(ticker.stats().notify_failures, 2);
        let engine = engine.lock().await;
        let fight = engine.store().get_fight(&reports[0].fight.id).unwrap();
        assert!(fight.finished);
        let total: i64 = [1, 2].iter().map(|u| engine.store().get_human(*u).unwrap().gold).sum();
        assert_eq!(total, 900);
    }

    #[tokio::test]
    async fn run_stops_on_shutdown() {
        let (h, delay) = accepted_fight(43);
        let (engine, clock, _dir) = h.into_parts();
        clock.advance(delay);
        let engine = Arc::new(Mutex::new(engine));
        let ticker = FightTicker::with_interval(engine.clone(), Arc::new(LogNotifier), Duration::from_millis(5));

        let stats = ticker.run(tokio::time::sleep(Duration::from_millis(40))).await;
        assert!(stats.ticks >= 1);
        assert_eq!(stats.fights_resolved, 1);
    }

    #[test]
    fn default_interval_comes_from_settings() {
        let (engine, _clock, _dir) = harness(44).into_parts();
        let engine = Arc::new(Mutex::new(engine));
        let ticker = tokio_test::block_on(FightTicker::new(engine, Arc::new(LogNotifier)));
        assert_eq!(ticker.interval, Duration::from_secs(30));
    }
}
