mod config;
mod errors;
mod init;
mod models;
mod routes;
mod schema;
mod seed;
mod state;
mod store;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::init::{initialize, with_retry};
use crate::routes::build_router;
use crate::schema::CatalogSchema;
use crate::seed::{run_seed, SeedGate};
use crate::state::AppState;
use crate::store::memory::DEFAULT_REAPER_INTERVAL;
use crate::store::{DocumentStore, MemoryStore, MongoStore};

#[derive(Parser)]
#[command(name = "proxima-store")]
#[command(about = "Provision the Proxima document store and serve the API gateway")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create collections, validators and indexes (safe to re-run)
    Init {
        /// Insert development fixtures (same as SEED_FIXTURES=true)
        #[arg(long)]
        seed: bool,
        /// Provision an in-memory store and print the report
        #[arg(long)]
        dry_run: bool,
    },
    /// Forward /api/* to the backend service
    Gateway,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("proxima_store={}", &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Proxima store v{}", env!("CARGO_PKG_VERSION"));

    match cli.command {
        Command::Init { seed, dry_run } => run_init(&config, seed, dry_run).await,
        Command::Gateway => run_gateway(config).await,
    }
}

async fn run_init(config: &Config, seed: bool, dry_run: bool) -> Result<()> {
    let catalog = CatalogSchema::load()?;
    let options = config.init_options();

    let store: Box<dyn DocumentStore> = if dry_run {
        info!("Dry run: provisioning an in-memory store");
        let memory = MemoryStore::new();
        memory.spawn_reaper(DEFAULT_REAPER_INTERVAL);
        Box::new(memory)
    } else {
        let uri = config.require_mongodb_uri()?;
        let db_name = config.mongodb_database.as_str();
        let mongo = with_retry(&options, "connect", || MongoStore::connect(uri, db_name)).await?;
        Box::new(mongo)
    };

    let report = initialize(store.as_ref(), &catalog, &options).await?;
    info!(
        "Database initialization completed: {} collections",
        report.collections.len()
    );
    if dry_run {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    let gate = SeedGate::from_config(config, seed);
    if let Some(seeded) = run_seed(store.as_ref(), &gate).await? {
        if dry_run && !seeded.skipped {
            println!("{}", serde_json::to_string_pretty(&seeded)?);
        }
    }

    Ok(())
}

async fn run_gateway(config: Config) -> Result<()> {
    info!("Forwarding /api/* to {}", config.api_base_url);
    let port = config.port;
    let state = AppState::new(config)?;

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{port}").parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
