//! Botcast Server
//!
//! Hosts the bot event dispatch core: keeps the bot registry warm, delivers
//! platform events to bot endpoints and serves the admin API.
//!
//! Channel joins and leaves come in through the admin API. The other
//! platform events (messages, users, channels, stamps, ping requests) are
//! published by the platform services sharing the process through
//! `BotRegistry::events`.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use botcast_core::bot::{
    BotEventHandlers, BotIngress, BotRegistry, BotService, Dispatcher, EventLog, HttpDelivery,
    Liveness, PayloadCodec, TargetResolver,
};
use botcast_core::events::event_bus;
use botcast_core::message::MessageParser;
use botcast_core::store::{PgStore, RandomTokenIssuer, StaticIcon};
use clap::Parser;
use config::{ConfigLoader, get_database_url};
use server::{build_router, run_server};
use shutdown::spawn_config_reload_handler;
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Botcast - bot event dispatch server
#[derive(Parser, Debug)]
#[command(name = "botcast-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./botcast-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Tracing is configured by the file, so it starts after loading it.
    let config_loader = Arc::new(ConfigLoader::new(&args.config, args.listen));
    let loaded_config = config_loader.load().inspect_err(|e| {
        eprintln!("Failed to load configuration: {e}");
    })?;
    init_tracing(loaded_config.logging.json);

    tracing::info!("Starting botcast-server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("Configuration loaded from {:?}", args.config);
    if loaded_config.secret_rehashed {
        tracing::info!("Admin secret hashed and config file updated");
    }

    let listen_addr = loaded_config.server.listen;

    let database_url = get_database_url().inspect_err(|_| {
        tracing::error!("DATABASE_URL environment variable not set");
    })?;

    tracing::info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await
        .inspect_err(|e| {
            tracing::error!("Failed to connect to database: {}", e);
        })?;
    tracing::info!("Database connection established");

    if args.migrate {
        tracing::info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&db_pool)
            .await
            .inspect_err(|e| {
                tracing::error!("Failed to run migrations: {}", e);
            })?;
        tracing::info!("Migrations completed successfully");
    }

    let store = Arc::new(PgStore::new(db_pool.clone()));
    let (event_senders, event_receivers) = event_bus();

    let registry = Arc::new(BotRegistry::new(store.clone(), event_senders));
    registry.load().await.inspect_err(|e| {
        tracing::error!("Failed to load bots: {}", e);
    })?;

    let event_log = EventLog::new(store.clone());
    let delivery = HttpDelivery::new(loaded_config.delivery)?;
    let dispatcher = Dispatcher::new(Arc::new(PayloadCodec::new()), delivery, event_log.clone());
    let liveness = Arc::new(Liveness::new(registry.clone(), dispatcher.clone()));
    let parser = Arc::new(MessageParser::new(&loaded_config.message_origin)?);

    let handlers = BotEventHandlers::new(
        TargetResolver::new(registry.clone()),
        dispatcher,
        liveness.clone(),
        store.clone(),
        parser,
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let ingress = tokio::spawn(BotIngress::new(handlers, event_receivers, shutdown_rx).run());

    let bots = Arc::new(BotService::new(
        registry,
        liveness,
        event_log,
        store,
        Arc::new(RandomTokenIssuer),
        Arc::new(StaticIcon(loaded_config.default_icon)),
        loaded_config.policy,
    ));
    let state = AppState::new(bots, loaded_config.admin);

    // Spawn config reload handler (listens for SIGHUP)
    let reload_notify = spawn_config_reload_handler(state.clone(), config_loader);

    let router = build_router(state);

    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr).await;

    // Let running deliveries finish before the pool goes away.
    if shutdown_tx.send(true).is_err() {
        tracing::warn!("BotIngress already stopped");
    }
    if let Err(e) = ingress.await {
        tracing::error!(error = %e, "BotIngress task failed");
    }
    reload_notify.notify_one();

    tracing::info!("Closing database connections...");
    db_pool.close().await;
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    let (plain, json) = if json {
        (None, Some(fmt::layer().json()))
    } else {
        (Some(fmt::layer()), None)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(plain)
        .with(json)
        .init();
}
