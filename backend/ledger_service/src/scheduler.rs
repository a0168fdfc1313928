//! Background task that keeps the current month's allocation up to date
//! as expenses arrive.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use contract_ledger::Period;
use sqlx::SqlitePool;
use tracing::{debug, error, info};

use crate::db;
use crate::overhead;

pub struct SchedulerState {
    pub pool: SqlitePool,
    pub interval_secs: u64,
}

/// Run the refresh loop forever. Returns immediately when the interval is 0.
pub async fn run(state: Arc<SchedulerState>) {
    if state.interval_secs == 0 {
        info!("Allocation refresh disabled");
        return;
    }
    info!("Allocation refresh every {}s", state.interval_secs);

    loop {
        let period = Period::containing(Utc::now().date_naive());
        if let Err(e) = refresh_once(&state.pool, period).await {
            error!("Allocation refresh for {period} failed: {e}");
        }
        tokio::time::sleep(Duration::from_secs(state.interval_secs)).await;
    }
}

/// Recompute `period` if an indirect cost is recorded for it.
///
/// Returns whether an allocation was saved.
async fn refresh_once(pool: &SqlitePool, period: Period) -> crate::errors::Result<bool> {
    if db::get_indirect_cost(pool, period).await?.is_none() {
        debug!("No indirect cost recorded for {period}; skipping refresh");
        return Ok(false);
    }
    overhead::compute_and_save(pool, period).await?;
    Ok(true)
}
