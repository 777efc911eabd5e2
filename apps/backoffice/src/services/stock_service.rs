//! Stock: manual adjustments, listings, history, catalog reconciliation.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::error::ServiceResult;
use crate::AppState;
use tally_core::validation::{validate_id, validate_note};
use tally_core::{Actor, OwnerId, StockHistoryEntry, StockMovement, StockRow, DEFAULT_LIST_LIMIT};
use tally_db::SyncReport;

/// A manual stock change as sent by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockAdjustment {
    pub stock_id: String,
    /// Signed delta, or the counted quantity for `recount`.
    pub change: i64,
    /// Movement tag; blank or missing means `adjust`.
    #[serde(default)]
    pub kind: Option<String>,
    pub note: Option<String>,
}

/// Stock service implementation.
pub struct StockService {
    state: Arc<AppState>,
}

impl StockService {
    pub fn new(state: Arc<AppState>) -> Self {
        StockService { state }
    }

    #[instrument(skip_all, fields(user = %actor.user_id, stock_id = %input.stock_id))]
    pub async fn adjust(&self, actor: &Actor, input: StockAdjustment) -> ServiceResult<StockRow> {
        validate_id("stock_id", &input.stock_id)?;
        validate_note(input.note.as_deref())?;
        let owner = self.state.owner_of(actor).await?;

        let movement = StockMovement::parse(input.kind.as_deref().unwrap_or_default());
        let stock = self.state.db.stock();
        let row = self
            .state
            .with_deadline(
                "adjust_stock",
                stock.adjust(&owner, &input.stock_id, input.change, &movement, input.note.as_deref(), Utc::now()),
            )
            .await?;

        info!(owner = %owner, kind = %movement, remaining = row.quantity, "Stock adjusted");
        Ok(row)
    }

    pub async fn list(&self, actor: &Actor) -> ServiceResult<Vec<StockRow>> {
        let owner = self.state.owner_of(actor).await?;
        let stock = self.state.db.stock();
        self.state
            .with_deadline("list_stock", stock.list(&owner, DEFAULT_LIST_LIMIT))
            .await
    }

    pub async fn history(
        &self,
        actor: &Actor,
        stock_id: &str,
        limit: Option<i64>,
    ) -> ServiceResult<Vec<StockHistoryEntry>> {
        validate_id("stock_id", stock_id)?;
        let owner = self.state.owner_of(actor).await?;

        let limit = limit.filter(|l| *l > 0).unwrap_or(DEFAULT_LIST_LIMIT);
        let stock = self.state.db.stock();
        self.state
            .with_deadline("stock_history", stock.history(&owner, stock_id, limit))
            .await
    }

    /// Reconciles the actor's stock rows with the catalog.
    pub async fn sync(&self, actor: &Actor) -> ServiceResult<SyncReport> {
        let owner = self.state.owner_of(actor).await?;
        self.sync_owner(&owner).await
    }

    pub async fn sync_owner(&self, owner: &OwnerId) -> ServiceResult<SyncReport> {
        let stock = self.state.db.stock();
        let report = self
            .state
            .with_deadline("sync_stock", stock.sync_from_products(owner, Utc::now()))
            .await?;

        if !report.is_noop() {
            info!(
                owner = %owner,
                created = report.created,
                revived = report.revived,
                refreshed = report.refreshed,
                retired = report.retired,
                "Stock reconciled with catalog"
            );
        }
        Ok(report)
    }

    /// Like [`StockService::sync_owner`], but a failure is logged and dropped.
    pub async fn sync_best_effort(&self, owner: &OwnerId) -> Option<SyncReport> {
        match self.sync_owner(owner).await {
            Ok(report) => Some(report),
            Err(e) => {
                warn!(owner = %owner, error = %e, "Stock reconciliation failed, continuing");
                None
            }
        }
    }
}
