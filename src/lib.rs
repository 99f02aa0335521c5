//! # Pigeonbot - community chat-bot pigeon game
//!
//! Pigeonbot hosts a virtual-pet economy for a chat community. Members buy a
//! pigeon, keep it fed and happy, send it exploring abroad, let it carry mail
//! (and gold) to other members, and pit it against other pigeons in fights
//! that spectators can bet on.
//!
//! ## Features
//!
//! - **Status State Machine**: a pigeon does one thing at a time; guards check it is idle, alive and healthy enough.
//! - **Timed Activities**: explorations and mail deliveries take real time based on great-circle distance.
//! - **Fights**: challenge/accept protocol with symmetric stake escrow, resolved by a periodic ticker.
//! - **Reward Pipeline**: clamped percentage stats, a gold ledger and a one-time death notice.
//! - **Persistence**: Sled trees per entity with schema-versioned bincode records, an index tree for open activities and transactional settlement.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pigeonbot::pigeon::{PigeonEngine, PigeonSettings, PigeonStore};
//!
//! fn main() -> anyhow::Result<()> {
//!     let store = PigeonStore::open("data/pigeons")?;
//!     let mut engine = PigeonEngine::new(store, PigeonSettings::default());
//!
//!     engine.grant_gold(42, 100)?;
//!     engine.set_country(42, "NL")?;
//!     engine.buy_pigeon(42, "Gerrit")?;
//!     let trip = engine.start_exploration(42)?;
//!     println!("Back at {}", trip.end_date);
//!     Ok(())
//! }
//! ```
//!
//! ## Module Organization
//!
//! - [`pigeon`] - game engine, store, activities, fights and ticker
//! - [`config`] - configuration loading and defaults
//! - [`console`] - command parsing and the stdin console used by `start`
//! - [`logutil`] - single-line log sanitizing for user text

pub mod config;
pub mod console;
pub mod logutil;
pub mod pigeon;
