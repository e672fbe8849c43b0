//! Main entry point for the waiting-room matchmaking service
//!
//! This is the production entry point that initializes and runs the
//! waiting pools, the background matching scheduler and the health server,
//! with structured logging and graceful shutdown.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, warn};
use waiting_room::config::{validate_config, AppConfig};
use waiting_room::metrics::{HealthServer, HealthServerConfig};
use waiting_room::service::{AppState, HealthCheck};

/// Waiting Room - category-scoped waiting pools and periodic group matching
#[derive(Parser)]
#[command(
    name = "waiting-room",
    version,
    about = "Matchmaking service that groups present, waiting users per category",
    long_about = "Waiting Room admits users into per-category waiting pools, tracks their \
                 presence through heartbeats, and periodically groups eligible users into \
                 fixed-size matches oldest first, evicting entries that wait too long."
)]
struct Args {
    /// Configuration file path
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Log level override
    #[arg(
        short,
        long,
        value_name = "LEVEL",
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    /// Health server port override
    #[arg(long, value_name = "PORT", help = "Override health and metrics port")]
    health_port: Option<u16>,

    /// Group size override
    #[arg(long, value_name = "N", help = "Override the number of users per match")]
    group_size: Option<usize>,

    /// Tick interval override
    #[arg(long, value_name = "MS", help = "Override the matching tick interval")]
    tick_interval_ms: Option<u64>,

    /// Enable debug mode
    #[arg(short, long, help = "Enable debug mode with verbose logging")]
    debug: bool,

    /// Dry run mode (validate config and exit)
    #[arg(
        long,
        help = "Validate configuration and exit without starting service"
    )]
    dry_run: bool,
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

/// Log a health summary periodically
async fn health_check_task(app_state: Arc<AppState>) {
    let mut interval = tokio::time::interval(std::time::Duration::from_secs(30));

    while app_state.is_running().await {
        interval.tick().await;

        match HealthCheck::check(app_state.clone()).await {
            Ok(health) => {
                info!(
                    "Health check: {} - {} users waiting, {} matches formed, {} evicted",
                    health.status,
                    health.stats.users_waiting,
                    health.stats.matches_formed,
                    health.stats.users_evicted
                );
            }
            Err(e) => {
                warn!("Health check failed: {}", e);
            }
        }
    }
}

/// Display startup banner with service information
fn display_startup_banner(config: &AppConfig) {
    info!("🚀 Waiting Room Matchmaking Service");
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!("   Health port: {}", config.service.health_port);
    if config.matchmaking.categories.is_empty() {
        info!("   Categories: any");
    } else {
        info!(
            "   Categories: {}",
            config.matchmaking.categories.join(", ")
        );
    }
    info!("   Group size: {}", config.matchmaking.group_size);
    info!(
        "   Waiting timeout: {}s",
        config.matchmaking.waiting_timeout_seconds
    );
    info!("   Presence TTL: {}s", config.presence.ttl_seconds);
    info!("   Tick interval: {}ms", config.scheduler.tick_interval_ms);
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

/// Load and merge configuration from environment and CLI arguments
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    // Apply CLI overrides
    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    if let Some(port) = args.health_port {
        config.service.health_port = port;
    }

    if let Some(group_size) = args.group_size {
        config.matchmaking.group_size = group_size;
    }

    if let Some(interval) = args.tick_interval_ms {
        config.scheduler.tick_interval_ms = interval;
    }

    // Overrides are validated like everything else
    validate_config(&config)?;

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command line arguments
    let args = Args::parse();

    // Load configuration (CLI args can override environment/config file)
    let config = load_config(&args).unwrap_or_else(|e| {
        eprintln!("Configuration error: {:#}", e);
        std::process::exit(1);
    });

    // Initialize logging early (before any other operations)
    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    if args.dry_run {
        info!("Configuration validation successful");
        display_startup_banner(&config);
        info!("Dry run completed - exiting without starting service");
        return Ok(());
    }

    // Display startup information
    display_startup_banner(&config);

    // Initialize application state
    info!("Initializing service components...");
    let app_state = match AppState::new(config.clone()) {
        Ok(state) => Arc::new(state),
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            std::process::exit(1);
        }
    };

    // Start the service
    info!("Starting service...");
    if let Err(e) = app_state.start().await {
        error!("Failed to start service: {}", e);
        std::process::exit(1);
    }

    // Health and metrics endpoints
    let health_server = Arc::new(
        HealthServer::new(
            HealthServerConfig {
                port: config.service.health_port,
                host: "0.0.0.0".to_string(),
            },
            app_state.metrics_collector(),
        )
        .with_app_state(app_state.clone()),
    );
    let server_task = {
        let health_server = health_server.clone();
        tokio::spawn(async move {
            if let Err(e) = health_server.start().await {
                error!("Health server failed: {:#}", e);
            }
        })
    };

    // Start health check monitoring
    let health_task = {
        let app_state = app_state.clone();
        tokio::spawn(async move {
            health_check_task(app_state).await;
        })
    };

    info!("✅ Waiting Room Matchmaking Service is running");
    info!("Press Ctrl+C to shutdown gracefully...");

    // Wait for shutdown signal
    wait_for_shutdown_signal().await;

    // Begin graceful shutdown
    info!("🛑 Shutdown signal received, beginning graceful shutdown...");

    // Cancel health check task
    health_task.abort();

    let shutdown_timeout = config.shutdown_timeout();
    let shutdown = async {
        if let Err(e) = app_state.shutdown().await {
            error!("Service shutdown failed: {}", e);
        }
        if let Err(e) = health_server.stop().await {
            warn!("Failed to stop health server: {}", e);
        }
        // Server exit result is logged by the task itself
        let _ = server_task.await;
    };

    match tokio::time::timeout(shutdown_timeout, shutdown).await {
        Ok(()) => {
            info!("✅ Graceful shutdown completed successfully");
        }
        Err(_) => {
            warn!("⚠️  Shutdown timeout exceeded, forcing exit");
        }
    }

    info!("🛑 Waiting Room Matchmaking Service stopped");
    Ok(())
}
