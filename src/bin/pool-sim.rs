//! Pool Simulator CLI Tool
//!
//! Drives an in-process waiting room with simulated users, or replays the
//! reference matching scenarios against the in-memory stores.
//!
//! Usage:
//!   cargo run --bin pool-sim -- --help
//!   cargo run --bin pool-sim run --users 40 --categories football,history --duration-secs 10
//!   cargo run --bin pool-sim scenario --name race

use anyhow::{anyhow, Result};
use chrono::{DateTime, TimeZone, Utc};
use clap::{Parser, Subcommand};
use std::sync::Arc;
use std::time::Duration;
use waiting_room::config::AppConfig;
use waiting_room::matching::MatchingEngine;
use waiting_room::presence::PresenceTracker;
use waiting_room::service::AppState;
use waiting_room::store::{InMemoryPresenceStore, InMemoryWaitingPoolStore, WaitingPoolStore};
use waiting_room::types::{Category, Match, UserId};
use waiting_room::utils::{Clock, ManualClock};
use waiting_room::RecordingMatchHandler;

#[derive(Parser)]
#[command(name = "pool-sim")]
#[command(about = "Simulation tool for the waiting-room matchmaker")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full service in-process with simulated users
    Run {
        /// Number of simulated users
        #[arg(short, long, default_value = "20")]
        users: usize,
        /// Comma separated categories
        #[arg(short, long, default_value = "football,history")]
        categories: String,
        /// How long to run
        #[arg(short, long, default_value = "5")]
        duration_secs: u64,
        /// Share of users that never send heartbeats (0.0 to 1.0)
        #[arg(short, long, default_value = "0.0")]
        offline_ratio: f64,
        /// Users per match
        #[arg(short, long, default_value = "2")]
        group_size: usize,
    },
    /// Replay a reference scenario (basic, timeout, race)
    Scenario {
        #[arg(short, long)]
        name: String,
    },
}

fn print_match(formed: &Match) {
    let members: Vec<&str> = formed.user_ids.iter().map(|u| u.as_str()).collect();
    println!(
        "  match {} [{}] -> {}",
        formed.match_id,
        formed.category,
        members.join(", ")
    );
}

async fn run_simulation(
    users: usize,
    categories: &str,
    duration_secs: u64,
    offline_ratio: f64,
    group_size: usize,
) -> Result<()> {
    if !(0.0..=1.0).contains(&offline_ratio) {
        return Err(anyhow!("offline ratio must be between 0.0 and 1.0"));
    }

    let categories: Vec<String> = categories
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();
    if categories.is_empty() {
        return Err(anyhow!("at least one category is required"));
    }

    let mut config = AppConfig::default();
    config.matchmaking.categories = categories.clone();
    config.matchmaking.group_size = group_size;
    config.matchmaking.waiting_timeout_seconds = duration_secs.max(1);
    config.presence.ttl_seconds = 2;
    config.scheduler.tick_interval_ms = 250;
    config.scheduler.shutdown_grace_seconds = 1;
    waiting_room::config::validate_config(&config)?;

    let recorder = Arc::new(RecordingMatchHandler::new());
    let app = Arc::new(AppState::with_handler(config, recorder.clone())?);
    let service = app.matchmaking();

    let offline = (users as f64 * offline_ratio).round() as usize;
    let user_ids: Vec<String> = (0..users).map(|i| format!("sim-user-{}", i)).collect();
    let online_ids: Vec<String> = user_ids[offline..].to_vec();

    println!(
        "Simulating {} users ({} offline) over {:?} for {}s",
        users, offline, categories, duration_secs
    );

    app.start().await?;

    // Heartbeats for the online share
    let heartbeat_task = {
        let service = service.clone();
        let online_ids = online_ids.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_millis(500));
            loop {
                interval.tick().await;
                for user in &online_ids {
                    if let Err(e) = service.heartbeat(user).await {
                        eprintln!("heartbeat for {} failed: {}", user, e);
                    }
                }
            }
        })
    };

    for (i, user) in user_ids.iter().enumerate() {
        let category = &categories[i % categories.len()];
        service.add_to_waiting_list(user, category).await?;
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    tokio::time::sleep(Duration::from_secs(duration_secs)).await;

    heartbeat_task.abort();
    app.shutdown().await?;

    let delivered = recorder.delivered();
    println!("Formed {} matches:", delivered.len());
    for formed in &delivered {
        print_match(formed);
    }

    let stats = app.scheduler_stats();
    println!(
        "Ticks: {}, evicted: {}, discarded: {}, still waiting: {:?}",
        stats.ticks_completed,
        stats.users_evicted,
        stats.matches_discarded,
        app.pool_sizes().await?
    );

    Ok(())
}

struct ScenarioBed {
    store: Arc<InMemoryWaitingPoolStore>,
    presence: PresenceTracker,
    clock: Arc<ManualClock>,
    engine: MatchingEngine,
    category: Category,
    t0: DateTime<Utc>,
}

impl ScenarioBed {
    fn new() -> Result<Self> {
        let t0 = Utc
            .with_ymd_and_hms(2024, 1, 1, 0, 0, 0)
            .single()
            .ok_or_else(|| anyhow!("invalid scenario start time"))?;
        let clock = Arc::new(ManualClock::new(t0));
        let presence = PresenceTracker::new(
            Arc::new(InMemoryPresenceStore::new()),
            clock.clone(),
            Duration::from_secs(60),
        );

        Ok(Self {
            store: Arc::new(InMemoryWaitingPoolStore::new()),
            presence,
            clock,
            engine: MatchingEngine::new(2),
            category: Category::new("scenario")?,
            t0,
        })
    }

    fn at(&self, secs: i64) {
        self.clock.set(self.t0 + chrono::Duration::seconds(secs));
    }

    async fn enqueue(&self, user: &str, timeout_secs: u64, present: bool) -> Result<()> {
        let user = UserId::new(user)?;
        if present {
            self.presence.heartbeat(&user).await?;
        }
        self.store
            .enqueue(
                &user,
                &self.category,
                self.clock.now(),
                Duration::from_secs(timeout_secs),
            )
            .await?;
        Ok(())
    }

    async fn run_once(&self) -> Result<waiting_room::matching::RunOutcome> {
        let snapshot = self.store.snapshot(&self.category).await?;
        let ids: Vec<UserId> = snapshot.iter().map(|e| e.user_id.clone()).collect();
        let online = self.presence.online_among(&ids).await?;
        Ok(self
            .engine
            .run_once(&self.category, &snapshot, &online, self.clock.now()))
    }
}

async fn run_scenario(name: &str) -> Result<()> {
    let bed = ScenarioBed::new()?;

    match name {
        "basic" => {
            for (t, user) in [(0, "A"), (1, "B"), (2, "C")] {
                bed.at(t);
                bed.enqueue(user, 30, true).await?;
            }
            let outcome = bed.run_once().await?;
            println!("t=2: {} match(es)", outcome.matches.len());
            for formed in &outcome.matches {
                print_match(formed);
                let members: Vec<_> = bed
                    .store
                    .snapshot(&bed.category)
                    .await?
                    .into_iter()
                    .filter(|e| formed.contains(&e.user_id))
                    .collect();
                bed.store.remove_group_if_unchanged(&members).await?;
            }
            println!("  waiting: {:?}", outcome.waiting);

            bed.at(3);
            bed.enqueue("D", 30, true).await?;
            let outcome = bed.run_once().await?;
            println!("t=3: {} match(es)", outcome.matches.len());
            outcome.matches.iter().for_each(print_match);
        }
        "timeout" => {
            bed.enqueue("A", 10, false).await?;
            bed.at(11);
            let outcome = bed.run_once().await?;
            println!(
                "t=11: {} match(es), evicted {:?}",
                outcome.matches.len(),
                outcome.evicted_user_ids()
            );
        }
        "race" => {
            bed.enqueue("A", 30, true).await?;
            bed.enqueue("B", 30, true).await?;

            let snapshot = bed.store.snapshot(&bed.category).await?;
            let outcome = bed.run_once().await?;
            println!("planned {} match(es)", outcome.matches.len());

            // A cancels between planning and commit
            bed.store.remove(&UserId::new("A")?, &bed.category).await?;

            for formed in &outcome.matches {
                let members: Vec<_> = snapshot
                    .iter()
                    .filter(|e| formed.contains(&e.user_id))
                    .cloned()
                    .collect();
                let committed = bed.store.remove_group_if_unchanged(&members).await?;
                println!(
                    "  match {} committed: {} (B still waiting: {})",
                    formed.match_id,
                    committed,
                    bed.store
                        .snapshot(&bed.category)
                        .await?
                        .iter()
                        .any(|e| e.user_id.as_str() == "B")
                );
            }
        }
        other => {
            return Err(anyhow!(
                "Unknown scenario '{}'. Use basic, timeout or race",
                other
            ))
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "warn".into()),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            users,
            categories,
            duration_secs,
            offline_ratio,
            group_size,
        } => {
            run_simulation(users, &categories, duration_secs, offline_ratio, group_size).await
        }
        Commands::Scenario { name } => run_scenario(&name).await,
    }
}
