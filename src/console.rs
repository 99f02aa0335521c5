//! Line-oriented command layer.
//!
//! The same [`PigeonCommand`] set backs the one-shot `pigeon --user <id> ...`
//! subcommand and the console that `start` reads from stdin while the fight
//! ticker runs. Console lines are `<user> <command> [args]`, e.g. `42 explore`,
//! and go through the engine shared with the ticker, so commands never need a
//! second handle on the database.

use std::io::BufRead;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use log::{debug, info, warn};
use rand::Rng;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, Mutex};

use crate::logutil::{escape_log, preview};
use crate::pigeon::{AcceptOutcome, CareAction, Clock, PigeonEngine, PigeonError, UserId};

/// Pending console lines buffered between the stdin reader and the engine.
const CONSOLE_BACKLOG: usize = 32;

#[derive(Debug, Subcommand)]
pub enum PigeonCommand {
    /// Buy a pigeon
    Buy { name: String },
    /// Set your country of residence (ISO code)
    Country { code: String },
    /// Send your pigeon exploring
    Explore,
    /// Send mail (and optionally gold) to another user
    Mail {
        recipient: UserId,
        #[arg(short, long, default_value_t = 0)]
        gold: i64,
        #[arg(trailing_var_arg = true, required = true)]
        message: Vec<String>,
    },
    /// Check on or settle your pigeon's current trip
    Retrieve,
    /// Read delivered mail
    Inbox,
    /// Challenge another user's pigeon to a fight
    Challenge {
        opponent: UserId,
        #[arg(default_value_t = 0)]
        bet: i64,
    },
    /// Accept the challenge addressed to your pigeon
    Accept,
    /// Decline the challenge addressed to your pigeon
    Decline,
    /// Wager on the pigeon of a user in an accepted fight
    Bet { fighter: UserId, amount: i64 },
    /// Feed, clean, play with or heal your pigeon
    Care { action: String },
    /// Settle all due fights now
    Resolve,
    /// Show your pigeon
    Profile,
    /// Credit gold to the user (admin)
    Grant { amount: i64 },
}

/// One console line: the acting user followed by a command.
#[derive(Debug, Parser)]
#[command(name = "console", no_binary_name = true)]
pub struct ConsoleLine {
    /// Acting user id
    pub user: UserId,
    #[command(subcommand)]
    pub action: PigeonCommand,
}

/// Run one command for `user` and render the reply.
pub fn execute<C: Clock, R: Rng>(
    engine: &mut PigeonEngine<C, R>,
    user: UserId,
    action: PigeonCommand,
) -> Result<String, PigeonError> {
    let reply = match action {
        PigeonCommand::Buy { name } => {
            let pigeon = engine.buy_pigeon(user, &name)?;
            format!("You bought {} for {} gold", pigeon.name, engine.settings().pigeon_price)
        }
        PigeonCommand::Country { code } => {
            let human = engine.set_country(user, &code)?;
            let code = human.country_code.unwrap_or_default();
            format!("Residence set to {} ({})", engine.country_name(&code), code)
        }
        PigeonCommand::Explore => {
            let trip = engine.start_exploration(user)?;
            let minutes = (trip.end_date - trip.start_date).num_minutes();
            format!(
                "Your pigeon is off to {} ({} km), back in {} min",
                engine.country_name(&trip.destination),
                trip.distance_km,
                minutes
            )
        }
        PigeonCommand::Mail { recipient, gold, message } => {
            let mail = engine.start_mail(user, recipient, &message.join(" "), gold)?;
            format!("Mail for {} is on its way, arriving at {}", mail.recipient, mail.end_date)
        }
        PigeonCommand::Retrieve => engine.retrieve(user)?.to_string(),
        PigeonCommand::Inbox => {
            let inbox = engine.read_inbox(user)?;
            if inbox.mail.is_empty() {
                "No new mail".to_string()
            } else {
                let mut lines: Vec<String> = inbox
                    .mail
                    .iter()
                    .map(|m| format!("From {}: {} ({} gold)", m.sender, preview(&m.message, 120), m.gold))
                    .collect();
                lines.push(format!("Total gold received: {}", inbox.gold_received));
                lines.join("\n")
            }
        }
        PigeonCommand::Challenge { opponent, bet } => {
            let fight = engine.challenge(user, opponent, bet)?;
            format!("Challenge sent to {} for {} gold", fight.challengee_owner, fight.bet)
        }
        PigeonCommand::Accept => match engine.accept(user)? {
            AcceptOutcome::Accepted { fight } => match fight.start_date {
                Some(start) => format!("Fight accepted, it starts at {}", start),
                None => "Fight accepted".to_string(),
            },
            AcceptOutcome::Cancelled { short_user, required, available } => format!(
                "Fight cancelled: user {} has {} of the {} gold needed",
                short_user, available, required
            ),
            AcceptOutcome::AlreadyAnswered => "This challenge was already answered".to_string(),
        },
        PigeonCommand::Decline => {
            let fight = engine.decline(user)?;
            format!("You declined the challenge from {}", fight.challenger_owner)
        }
        PigeonCommand::Bet { fighter, amount } => {
            let wager = engine.place_wager(user, fighter, amount)?;
            format!("You bet {} gold on the pigeon of {}", wager.amount, fighter)
        }
        PigeonCommand::Care { action } => {
            let Some(action) = CareAction::parse(&action) else {
                return Ok(format!("Unknown care action '{}'; use feed, clean, play or heal", action));
            };
            let report = engine.care(user, action)?;
            format!(
                "{} +{} {} for {} gold",
                report.pigeon.name,
                report.gained,
                action.stat(),
                report.cost
            )
        }
        PigeonCommand::Resolve => {
            let reports = engine.resolve_fights()?;
            if reports.is_empty() {
                "No fights due".to_string()
            } else {
                reports.iter().map(|r| r.to_string()).collect::<Vec<_>>().join("\n")
            }
        }
        PigeonCommand::Profile => {
            let pigeon = engine.pigeon_profile(user)?;
            let human = engine.store().get_human(user)?;
            let mut lines = vec![
                format!("{} ({:?}), {}", pigeon.name, pigeon.gender, pigeon.status),
                format!(
                    "food {} | cleanliness {} | happiness {} | health {}",
                    pigeon.food, pigeon.cleanliness, pigeon.happiness, pigeon.health
                ),
                format!(
                    "experience {} | gold {} | unread mail {}",
                    pigeon.experience,
                    human.gold,
                    engine.unread_mail_count(user)?
                ),
            ];
            if !pigeon.languages.is_empty() {
                let mut languages: Vec<_> = pigeon.languages.iter().collect();
                languages.sort();
                let languages: Vec<String> = languages
                    .into_iter()
                    .map(|(language, level)| format!("{} {}", language, level))
                    .collect();
                lines.push(format!("languages: {}", languages.join(", ")));
            }
            if !human.items.is_empty() {
                let mut items: Vec<_> = human.items.iter().collect();
                items.sort();
                let items: Vec<String> = items
                    .into_iter()
                    .map(|(item, count)| format!("{} x{}", item.replace('_', " "), count))
                    .collect();
                lines.push(format!("items: {}", items.join(", ")));
            }
            lines.join("\n")
        }
        PigeonCommand::Grant { amount } => {
            let human = engine.grant_gold(user, amount)?;
            format!("User {} now has {} gold", user, human.gold)
        }
    };
    Ok(reply)
}

/// Parse and run one console line. Blank lines and `#` comments get no reply.
pub fn handle_line<C: Clock, R: Rng>(engine: &mut PigeonEngine<C, R>, line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let parsed = match ConsoleLine::try_parse_from(line.split_whitespace()) {
        Ok(parsed) => parsed,
        Err(e) => return Some(e.render().to_string().trim_end().to_string()),
    };
    debug!("Console: user {} runs {:?}", parsed.user, parsed.action);
    Some(match execute(engine, parsed.user, parsed.action) {
        Ok(reply) => reply,
        Err(e) if e.is_user_facing() => e.to_string(),
        Err(e) => {
            warn!("Console command '{}' failed: {}", escape_log(line), e);
            format!("error: {}", e)
        }
    })
}

/// Forward stdin lines from a dedicated reader thread. The channel closes at EOF.
pub fn stdin_lines() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel(CONSOLE_BACKLOG);
    let reader = std::thread::Builder::new()
        .name("pigeon-console".to_string())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                match line {
                    Ok(line) => {
                        if tx.blocking_send(line).is_err() {
                            break;
                        }
                    }
                    Err(e) => {
                        warn!("Console input error: {}", e);
                        break;
                    }
                }
            }
        });
    if let Err(e) = reader {
        warn!("Console reader not started: {}", e);
    }
    rx
}

/// Answer console lines against the shared engine until the input closes.
/// Returns how many lines got a reply.
pub async fn serve<C, R, W>(
    engine: Arc<Mutex<PigeonEngine<C, R>>>,
    mut lines: mpsc::Receiver<String>,
    mut output: W,
) -> std::io::Result<u64>
where
    C: Clock,
    R: Rng,
    W: AsyncWrite + Unpin,
{
    let mut answered = 0;
    while let Some(line) = lines.recv().await {
        let reply = {
            let mut engine = engine.lock().await;
            handle_line(&mut engine, &line)
        };
        if let Some(reply) = reply {
            answered += 1;
            output.write_all(reply.as_bytes()).await?;
            output.write_all(b"\n").await?;
            output.flush().await?;
        }
    }
    info!("Console input closed after {} command(s)", answered);
    Ok(answered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pigeon::engine::test_support::*;
    use crate::pigeon::{FightTicker, LogNotifier};
    use std::time::Duration;

    #[test]
    fn bad_lines_get_a_usage_reply() {
        let mut h = harness(61);
        assert!(handle_line(&mut h.engine, "   ").is_none());
        assert!(handle_line(&mut h.engine, "# comment").is_none());

        let reply = handle_line(&mut h.engine, "pigeon explore").unwrap();
        assert!(reply.contains("invalid value"), "{}", reply);
        let reply = handle_line(&mut h.engine, "1 fly").unwrap();
        assert!(reply.contains("unrecognized subcommand"), "{}", reply);

        let reply = handle_line(&mut h.engine, "1 explore").unwrap();
        assert_eq!(reply, "not found: user 1 has no pigeon");
    }

    #[test]
    fn mail_words_are_joined_back_together() {
        let mut h = harness(62);
        owner_with_pigeon(&mut h.engine, 1, "NL");
        let reply = handle_line(&mut h.engine, "1 mail 2 -g 5 see you  soon").unwrap();
        assert!(reply.starts_with("Mail for 2 is on its way"), "{}", reply);
        let mail = h.engine.store().open_mail(&h.engine.store().pigeon_of(1).unwrap().unwrap().id);
        let mail = mail.unwrap().unwrap();
        assert_eq!(mail.message, "see you soon");
        assert_eq!(mail.gold, 5);
    }

    #[test]
    fn profile_and_retrieve_show_names_items_and_languages() {
        let mut h = harness(63);
        let pigeon = owner_with_pigeon(&mut h.engine, 1, "NL");

        let reply = handle_line(&mut h.engine, "1 explore").unwrap();
        let trip = h.engine.store().open_exploration(&pigeon.id).unwrap().unwrap();
        let name = h.engine.country_name(&trip.destination);
        assert_ne!(name, trip.destination);
        assert!(reply.contains(&name), "{}", reply);

        h.clock.advance(trip.end_date - trip.start_date);
        let reply = handle_line(&mut h.engine, "1 retrieve").unwrap();
        assert!(reply.starts_with(&format!("Back from {}", name)), "{}", reply);

        let mut human = h.engine.store().get_human(1).unwrap();
        human.items.clear();
        human.items.insert("golden_seed".to_string(), 2);
        human.items.insert("feather".to_string(), 1);
        h.engine.store().put_human(human).unwrap();
        let mut pigeon = h.engine.store().get_pigeon(&pigeon.id).unwrap();
        pigeon.languages.clear();
        pigeon.languages.insert("Dutch".to_string(), 3);
        h.engine.store().put_pigeon(pigeon).unwrap();

        let profile = handle_line(&mut h.engine, "1 profile").unwrap();
        assert!(profile.contains("languages: Dutch 3"), "{}", profile);
        assert!(profile.contains("items: feather x1, golden seed x2"), "{}", profile);
    }

    #[tokio::test]
    async fn console_shares_the_engine_with_the_ticker() {
        let mut h = harness(64);
        owner_with_pigeon(&mut h.engine, 1, "NL");
        owner_with_pigeon(&mut h.engine, 2, "DE");
        h.engine.challenge(1, 2, 0).unwrap();
        h.engine.accept(2).unwrap();
        let (engine, clock, _dir) = h.into_parts();
        let engine = Arc::new(Mutex::new(engine));
        let mut ticker = FightTicker::with_interval(engine.clone(), Arc::new(LogNotifier), Duration::from_millis(10));

        let (tx, rx) = mpsc::channel(4);
        for line in ["7 grant 100", "7 bet 1 40", "", "1 explore"] {
            tx.send(line.to_string()).await.unwrap();
        }
        drop(tx);
        let mut output = Vec::new();
        let answered = serve(engine.clone(), rx, &mut output).await.unwrap();
        assert_eq!(answered, 3);
        let output = String::from_utf8(output).unwrap();
        let replies: Vec<&str> = output.lines().collect();
        assert_eq!(replies[0], "User 7 now has 100 gold");
        assert_eq!(replies[1], "You bet 40 gold on the pigeon of 1");
        assert!(replies[2].contains("cannot do anything else"), "{}", replies[2]);

        clock.advance(chrono::Duration::minutes(5));
        let reports = ticker.tick().await.unwrap();
        assert_eq!(reports.len(), 1);
        let expected = if reports[0].winner_owner == 1 { 140 } else { 60 };
        assert_eq!(engine.lock().await.store().get_human(7).unwrap().gold, expected);
    }
}
