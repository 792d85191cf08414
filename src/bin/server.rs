use std::sync::Arc;

use chrono::Utc;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use watchdog::alerting::EvaluationService;
use watchdog::checks::HealthCheckExecutor;
use watchdog::db::services::{InMemoryStore, PgStore};
use watchdog::db::store::MonitorStore;
use watchdog::notifications::NotificationRegistry;
use watchdog::scheduler::MonitorScheduler;
use watchdog::server::ServerConfig;
use watchdog::server::seed::seed_monitors;
use watchdog::version::VERSION;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long)]
    config: Option<String>,
}

fn init_logging(log_dir: &str) {
    // Log to a file: JSON format, daily rotation
    let file_appender = rolling::daily(log_dir, "watchdog.log");
    let file_layer = fmt::layer()
        .with_writer(file_appender)
        .with_ansi(false)
        .json();

    let stdout_layer = fmt::layer().with_writer(std::io::stdout);

    // Default to `info,sqlx::query=warn` if RUST_LOG is not set.
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,sqlx::query=warn"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();
}

async fn open_store(
    config: &ServerConfig,
) -> Result<Arc<dyn MonitorStore>, Box<dyn std::error::Error + Send + Sync>> {
    match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url, config.max_db_connections).await?;
            store.migrate().await?;
            info!(max_connections = config.max_db_connections, "Connected to PostgreSQL.");
            Ok(Arc::new(store))
        }
        None => {
            warn!("No DATABASE_URL configured, using the in-memory store. State is lost on exit.");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    if std::env::args().any(|arg| arg == "--version") {
        println!("Watchdog version: {VERSION}");
        return Ok(());
    }

    let args = Args::parse();

    // Logging depends on log_dir, so config errors before init go to stderr.
    let server_config = match ServerConfig::load(args.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load server configuration: {e}");
            return Err(e.into());
        }
    };

    init_logging(&server_config.log_dir);
    info!("Starting watchdog, version: {}", VERSION);

    // --- Storage ---
    let store = open_store(&server_config).await?;

    if !server_config.monitors.is_empty() {
        let created = seed_monitors(
            store.as_ref(),
            &server_config.monitors,
            server_config.default_timeout_seconds,
            Utc::now(),
        )
        .await?;
        info!(created, declared = server_config.monitors.len(), "Monitor seeding finished.");
    }

    // --- Notifications and alerting ---
    let registry = Arc::new(NotificationRegistry::from_settings(
        &server_config.notification_settings(),
    ));
    info!(channels = ?registry.registered_types(), "Notification channels ready.");
    let alerting = Arc::new(EvaluationService::new(
        store.clone(),
        registry,
        server_config.alerting_settings(),
    ));

    // --- Checks and scheduler ---
    let executor = Arc::new(HealthCheckExecutor::new()?);
    let scheduler = Arc::new(MonitorScheduler::new(
        store,
        executor,
        alerting,
        server_config.scheduler_config(),
    ));
    let handle = scheduler.start();

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal.");
    }
    info!("Shutting down, waiting for in-flight checks.");
    handle.stop().await?;
    info!("Watchdog stopped.");
    Ok(())
}
