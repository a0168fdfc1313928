//! Contract Ledger Service: entry point.
//!
//! Persists contract movements, paid annotations, project expenses and
//! indirect-cost allocations in SQLite, and exposes them through an Axum REST
//! API. All ledger and allocation math is done by the `contract_ledger`
//! engine; this binary only stores its inputs and outputs.

mod api;
mod config;
mod db;
mod errors;
mod ledgers;
mod overhead;
mod records;
mod scheduler;

use std::sync::Arc;

use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use config::Config;
use scheduler::SchedulerState;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialise structured logging (RUST_LOG controls verbosity).
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // Load optional .env file (ignored if missing).
    let _ = dotenvy::dotenv();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("{e}"))?;
    info!(
        "Overrun policy: reductions {:?}, estimates {:?}",
        config.policy.reduction_overrun, config.policy.estimate_overrun
    );

    // Set up the SQLite connection pool and run migrations.
    let pool = db::init_pool(&config.database_url).await?;

    // ─── Background allocation refresh ────────────────────
    tokio::spawn(scheduler::run(Arc::new(SchedulerState {
        pool: pool.clone(),
        interval_secs: config.allocation_interval_secs,
    })));

    // ─── REST API ─────────────────────────────────────────
    let api_state = Arc::new(api::ApiState {
        pool,
        policy: config.policy,
    });

    let app = api::router(api_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.api_port);
    info!("API listening on http://{addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
