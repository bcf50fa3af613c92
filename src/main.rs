use std::sync::Arc;

use tracing::info;
use tracing_subscriber::EnvFilter;

use stayd::config::{Config, StoreKind};
use stayd::engine::Engine;
use stayd::repository::{BookingRepository, InMemoryRepository, WalRepository};
use stayd::{compactor, host, observability};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout carries responses; logs go to stderr.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let config = Config::from_env();
    observability::init(config.metrics_port)?;

    let repo: Arc<dyn BookingRepository> = match config.store {
        StoreKind::Wal => {
            std::fs::create_dir_all(&config.data_dir)?;
            let wal = Arc::new(WalRepository::open(&config.wal_path())?);
            tokio::spawn(compactor::run_compactor(wal.clone(), config.compact_threshold));
            wal
        }
        StoreKind::Memory => Arc::new(InMemoryRepository::new()),
    };
    let engine = Arc::new(Engine::new(repo));

    info!("stayd ready");
    info!("  store: {:?}", config.store);
    if config.store == StoreKind::Wal {
        info!("  booking log: {}", config.wal_path().display());
    }
    info!("  max_in_flight: {}", config.max_in_flight);
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    // On interrupt, stop reading and let in-flight requests finish.
    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("interrupt received, draining in-flight requests");
        }
    };
    host::serve(
        engine,
        tokio::io::stdin(),
        tokio::io::stdout(),
        config.max_in_flight,
        shutdown,
    )
    .await?;
    info!("shut down");
    Ok(())
}
