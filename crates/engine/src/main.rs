//! ContextForge rehydrate binary
//!
//! Builds one context bundle for the query given on the command line and
//! prints it as JSON on stdout. Logs go to stderr.

use anyhow::{bail, Context};
use contextforge_common::config::{AppConfig, BackendKind};
use contextforge_common::db::DbPool;
use contextforge_common::{embeddings, metrics, VERSION};
use contextforge_engine::{
    FilePinSource, FixtureBackend, PinSource, Rehydrator, RetrievalBackend, StaticPinSource,
    StoreBackend,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // An explicit file replaces the config/ directory lookup
    let config = match std::env::var("CONTEXTFORGE_CONFIG") {
        Ok(path) => AppConfig::from_file(&path),
        Err(_) => AppConfig::load(),
    }
    .context("failed to load configuration")?;
    init_tracing(&config);
    metrics::register_metrics();

    info!(
        service = %config.observability.service_name,
        backend = ?config.backend.kind,
        "Starting ContextForge rehydrate v{}",
        VERSION
    );

    let query = std::env::args().skip(1).collect::<Vec<_>>().join(" ");
    if query.trim().is_empty() {
        bail!("usage: rehydrate <query>");
    }

    let backend = build_backend(&config).await?;
    let pins: Arc<dyn PinSource> = match &config.pins.path {
        Some(path) => Arc::new(FilePinSource::new(path)),
        None => Arc::new(StaticPinSource::empty()),
    };

    let rehydrator = Rehydrator::new(backend, pins).with_pins_title(config.pins.title.clone());
    let bundle = rehydrator
        .rehydrate(&query, &config.rehydrate)
        .await
        .context("rehydration failed")?;

    println!("{}", serde_json::to_string_pretty(&bundle)?);
    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if config.observability.json_logging {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

async fn build_backend(config: &AppConfig) -> anyhow::Result<Arc<dyn RetrievalBackend>> {
    match config.backend.kind {
        BackendKind::Store => {
            info!("Connecting to database...");
            let db = Arc::new(DbPool::new(&config.database).await?);
            db.ping().await?;
            let embedder = embeddings::create_embedder(&config.embedding)?;
            Ok(Arc::new(StoreBackend::new(db, embedder)))
        }
        BackendKind::Fixture => {
            let path = config
                .backend
                .fixture_path
                .as_deref()
                .context("backend.fixture_path is required for the fixture backend")?;
            Ok(Arc::new(FixtureBackend::from_json_file(path).await?))
        }
    }
}
