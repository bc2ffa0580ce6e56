//! EquineX marketplace service — entry point.
//!
//! Restores the ledger from its SQLite journal, wires the services to the
//! configured evidence store and serves the REST API until Ctrl-C.

use std::sync::Arc;
use std::time::Duration;

use equinex_ledger::LedgerBook;
use reqwest::Client;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use marketplace::api::{self, ApiState};
use marketplace::clock::{Clock, SystemClock};
use marketplace::config::{Config, EvidenceBackend};
use marketplace::db;
use marketplace::evidence::{EvidenceStore, IpfsStore, MemoryEvidenceStore};
use marketplace::ledger::LocalLedger;
use marketplace::writer::Timeouts;
use marketplace::Marketplace;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;

    // Set up the SQLite journal and replay it into a fresh book.
    let pool = db::init_pool(&config.database_url).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let book = LedgerBook::with_verifiers(config.verifiers.iter().cloned());
    let ledger = LocalLedger::restore(pool, book, clock.clone()).await?;
    info!(verifiers = config.verifiers.len(), "Ledger restored");

    // ─── Evidence store ───────────────────────────────────
    let evidence: Arc<dyn EvidenceStore> = match config.evidence_backend {
        EvidenceBackend::Ipfs => {
            let client = Client::builder()
                .timeout(Duration::from_secs(30))
                .build()?;
            info!(
                api = %config.ipfs_api_url,
                gateway = %config.ipfs_gateway,
                "Using IPFS evidence store"
            );
            Arc::new(IpfsStore::new(
                client,
                &config.ipfs_api_url,
                &config.ipfs_gateway,
                config.ipfs_api_token.clone(),
            ))
        }
        EvidenceBackend::Memory => {
            info!("Using in-memory evidence store; uploads are lost on restart");
            Arc::new(MemoryEvidenceStore::new(&config.ipfs_gateway))
        }
    };

    // ─── REST API ─────────────────────────────────────────
    let market = Marketplace::new(
        Arc::new(ledger),
        evidence,
        clock,
        Timeouts::from_config(&config),
    );
    let app = api::router(Arc::new(ApiState { market }));

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received");
            }
            shutdown.cancel();
        }
    });

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    info!("Server stopped");
    Ok(())
}
