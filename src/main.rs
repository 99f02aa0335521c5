//! Binary entrypoint for the Pigeonbot CLI.
//!
//! Commands:
//! - `init` - write a starter `config.toml` and create the pigeon database
//! - `start` - run the fight settlement ticker and the stdin console until Ctrl-C
//! - `status` - print a summary of the pigeon database
//! - `pigeon --user <id> <action>` - run a game command as a user (local command layer)
//!
//! See the library crate docs for module-level details: `pigeonbot::`.
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use log::{debug, info, warn};
use tokio::sync::Mutex;

use pigeonbot::config::Config;
use pigeonbot::console::{self, PigeonCommand};
use pigeonbot::pigeon::{CountryAtlas, FightTicker, LogNotifier, PigeonEngine, PigeonStore, UserId};

#[derive(Parser)]
#[command(name = "pigeonbot")]
#[command(about = "Community chat-bot pigeon game")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (can be used before or after subcommand)
    #[arg(short, long, default_value = "config.toml", global = true)]
    config: String,

    /// Verbose logging (-v, -vv for more; may appear before or after subcommand)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a default configuration and an empty pigeon database
    Init,
    /// Run the periodic fight settlement and read `<user> <command>` lines from stdin
    Start,
    /// Show pigeon database statistics
    Status,
    /// Run a pigeon command on behalf of a user
    Pigeon {
        /// Acting user id
        #[arg(short, long)]
        user: UserId,
        #[command(subcommand)]
        action: PigeonCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone();

    match cli.command {
        Commands::Init => {
            init_logging(&None, cli.verbose);
            info!("Initializing new Pigeonbot configuration");
            Config::create_default(&cli.config).await?;
            info!("Configuration file created at {}", cli.config);
            let config = Config::load(&cli.config).await?;
            tokio::fs::create_dir_all(&config.storage.data_dir).await?;
            PigeonStore::open(config.storage.pigeon_db_path())?;
            info!("Pigeon database ready at {}", config.storage.pigeon_db_path().display());
        }
        Commands::Start => {
            let config = load_config(&config_path, cli.verbose).await?;
            info!("Starting {} v{}", config.bot.name, env!("CARGO_PKG_VERSION"));
            let engine = Arc::new(Mutex::new(open_engine(&config)?));
            let ticker = FightTicker::new(engine.clone(), Arc::new(LogNotifier)).await;
            let ticker = ticker.run(async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!("Failed to listen for shutdown signal: {}", e);
                }
                info!("Received shutdown signal");
            });
            tokio::pin!(ticker);
            let console = console::serve(engine, console::stdin_lines(), tokio::io::stdout());
            tokio::pin!(console);
            info!("Console ready: enter '<user> <command>', e.g. '42 explore'");

            let mut console_open = true;
            let stats = loop {
                tokio::select! {
                    stats = &mut ticker => break stats,
                    answered = &mut console, if console_open => {
                        console_open = false;
                        match answered {
                            Ok(count) => debug!("Console finished after {} command(s), ticker keeps running", count),
                            Err(e) => warn!("Console output failed: {}", e),
                        }
                    }
                }
            };
            info!(
                "Stopped after {} tick(s), {} fight(s) resolved, {} failed notification(s)",
                stats.ticks, stats.fights_resolved, stats.notify_failures
            );
        }
        Commands::Status => {
            let config = load_config(&config_path, cli.verbose).await?;
            show_status(&config)?;
        }
        Commands::Pigeon { user, action } => {
            let config = load_config(&config_path, cli.verbose).await?;
            let mut engine = open_engine(&config)?;
            match console::execute(&mut engine, user, action) {
                Ok(reply) => println!("{}", reply),
                Err(e) if e.is_user_facing() => println!("{}", e),
                Err(e) => return Err(e.into()),
            }
        }
    }

    Ok(())
}

/// Load the config file and start logging from it.
async fn load_config(path: &str, verbosity: u8) -> Result<Config> {
    let config = Config::load(path).await?;
    init_logging(&Some(config.clone()), verbosity);
    Ok(config)
}

fn open_engine(config: &Config) -> Result<PigeonEngine> {
    std::fs::create_dir_all(&config.storage.data_dir)?;
    let store = PigeonStore::open(config.storage.pigeon_db_path())?;
    let mut engine = PigeonEngine::new(store, config.pigeon.clone());
    if let Some(path) = &config.storage.atlas_file {
        let atlas = CountryAtlas::load(std::path::Path::new(path))?;
        info!("Loaded {} countries from {}", atlas.len(), path);
        engine = engine.with_geo(Arc::new(atlas));
    }
    Ok(engine)
}

fn show_status(config: &Config) -> Result<()> {
    let store = PigeonStore::open(config.storage.pigeon_db_path())?;
    let pigeons = store.list_pigeons()?;
    let alive = pigeons.iter().filter(|p| p.is_alive()).count();
    let fights = store.list_fights()?;
    let open_fights = fights.iter().filter(|f| !f.finished).count();
    let exploring = store.list_explorations()?.iter().filter(|e| !e.finished).count();
    let mail = store.list_mail()?;
    let in_flight = mail.iter().filter(|m| !m.finished).count();
    let unread = mail.iter().filter(|m| m.finished && !m.read).count();

    println!("{} v{}", config.bot.name, env!("CARGO_PKG_VERSION"));
    println!("Database: {}", config.storage.pigeon_db_path().display());
    println!("Owners: {}", store.list_humans()?.len());
    println!("Pigeons: {} ({} alive)", pigeons.len(), alive);
    println!("Explorations underway: {}", exploring);
    println!("Mail in flight: {} (unread delivered: {})", in_flight, unread);
    println!("Open fights: {}", open_fights);
    Ok(())
}

fn init_logging(config: &Option<Config>, verbosity: u8) {
    use std::io::Write;
    let mut builder = env_logger::Builder::new();
    // CLI verbosity overrides the configured level
    let base_level = match (verbosity, config) {
        (0, Some(cfg)) => cfg.logging.level_filter(),
        (0, None) => log::LevelFilter::Info,
        (1, _) => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    builder.filter_level(base_level);
    // sled is chatty at debug
    builder.filter_module("sled", log::LevelFilter::Warn);

    let log_file = config
        .as_ref()
        .and_then(|cfg| cfg.logging.file.as_ref())
        .and_then(|file| {
            std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(file)
                .ok()
        });

    if let Some(f) = log_file {
        let write_mutex = std::sync::Arc::new(std::sync::Mutex::new(f));
        let is_tty = atty::is(atty::Stream::Stdout);
        builder.format(move |fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            let line = format!("{} [{}] {}", ts, record.level(), record.args());
            if let Ok(mut guard) = write_mutex.lock() {
                let _ = writeln!(guard, "{}", line);
            }
            if is_tty {
                writeln!(fmt, "{}", line)
            } else {
                Ok(())
            }
        });
    } else {
        builder.format(|fmt, record| {
            let ts = chrono::Utc::now().format("%Y-%m-%dT%H:%M:%SZ");
            writeln!(fmt, "{} [{}] {}", ts, record.level(), record.args())
        });
    }
    let _ = builder.try_init();
}
