//! # tally-maintain
//!
//! Startup maintenance for a back-office database.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  load config ──► open database (runs migrations)                       │
//! │      │                                                                  │
//! │      ▼                                                                  │
//! │  for each owner with catalog rows:                                     │
//! │      SyncFromProducts   (failure: warn and continue with next owner)   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use anyhow::Context;
use tracing::info;

use tally_backoffice::services::StockService;
use tally_backoffice::{init_tracing, AppState, BackofficeConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = BackofficeConfig::load().context("Failed to load configuration")?;
    init_tracing(&config.log_filter);

    info!(
        database = %config.database_path.display(),
        free_quota_monthly = config.free_quota_monthly,
        "Starting tally-maintain"
    );

    let state = AppState::connect(config).await.context("Failed to open database")?;

    let (total, applied) = tally_db::migrations::migration_status(state.db.pool())
        .await
        .context("Failed to read migration status")?;
    info!(applied, total, "Database schema ready");

    if state.config.sync_stock_on_startup {
        let owners = state.db.products().owners().await.context("Failed to list owners")?;
        let stock = StockService::new(state.clone());

        let mut synced = 0usize;
        for owner in &owners {
            if stock.sync_best_effort(owner).await.is_some() {
                synced += 1;
            }
        }
        info!(owners = owners.len(), synced, "Stock reconciliation finished");
    }

    state.db.close().await;
    info!("Maintenance complete");
    Ok(())
}
