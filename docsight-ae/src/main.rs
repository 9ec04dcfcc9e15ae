//! docsight-ae - Analysis Engine Microservice
//!
//! Turns one submitted artifact into a deterministic, cached,
//! multi-source-enriched assessment through an ordered stage pipeline.
//! Clients submit an artifact reference, poll the execution until a
//! terminal status, and optionally follow SSE progress events.

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use docsight_ae::artifact::ArtifactStore;
use docsight_ae::pipeline::Coordinator;
use docsight_ae::AppState;
use docsight_common::config::TomlConfig;
use docsight_common::events::EventBus;

#[derive(Debug, Parser)]
#[command(name = "docsight-ae", about = "DocSight analysis engine")]
struct Args {
    /// Root folder holding artifacts and the database
    #[arg(long, env = "DOCSIGHT_ROOT_FOLDER")]
    root_folder: Option<String>,

    /// Listen port
    #[arg(long, default_value_t = 5731)]
    port: u16,

    /// Explicit config file path (defaults to the platform config dir)
    #[arg(long)]
    config: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let args = Args::parse();

    info!("Starting docsight-ae (Analysis Engine) microservice");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    // Configuration: file + env overrides
    let config = match &args.config {
        Some(path) => TomlConfig::load_from(path)?,
        None => TomlConfig::load()?,
    };

    // Root folder resolution: CLI → env → TOML → platform default
    let root_folder =
        docsight_common::config::resolve_root_folder(args.root_folder.as_deref(), &config);
    std::fs::create_dir_all(&root_folder)?;
    info!("Root folder: {}", root_folder.display());

    let db_path = root_folder.join("docsight.db");
    info!("Database: {}", db_path.display());
    let db_pool = docsight_ae::db::init_database_pool(&db_path).await?;
    info!("Database connection established");

    let event_bus = EventBus::new(100);

    let (deps, gateway_states) = docsight_ae::build_gateways(&config);
    let artifacts = ArtifactStore::new(root_folder);
    let coordinator = std::sync::Arc::new(Coordinator::new(
        db_pool.clone(),
        artifacts,
        deps,
        event_bus.clone(),
        config.pipeline.clone(),
        config.similarity.top_k,
    ));

    let state = AppState::new(db_pool, event_bus, coordinator, gateway_states);
    let app = docsight_ae::build_router(state);

    let addr = format!("127.0.0.1:{}", args.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
