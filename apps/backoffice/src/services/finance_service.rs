//! Finance ledger: manual entries and listings.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use crate::error::ServiceResult;
use crate::AppState;
use tally_core::validation::{validate_date_range, validate_finance_entry};
use tally_core::{Actor, DateRange, FinanceEntry, NewFinanceEntry, DEFAULT_LIST_LIMIT};

/// Finance service implementation.
pub struct FinanceService {
    state: Arc<AppState>,
}

impl FinanceService {
    pub fn new(state: Arc<AppState>) -> Self {
        FinanceService { state }
    }

    /// Records a manual revenue or expense entry.
    ///
    /// Sale links are reserved for refunds and are stripped from manual entries.
    pub async fn record_entry(&self, actor: &Actor, mut entry: NewFinanceEntry) -> ServiceResult<FinanceEntry> {
        validate_finance_entry(&entry)?;
        let owner = self.state.owner_of(actor).await?;
        entry.sale_id = None;
        entry.sale_code = None;

        let finance = self.state.db.finance();
        let created = self
            .state
            .with_deadline("record_entry", finance.record(&owner, &entry, Utc::now()))
            .await?;

        info!(owner = %owner, kind = created.kind.as_str(), "Finance entry recorded");
        Ok(created)
    }

    pub async fn list_entries(&self, actor: &Actor, range: DateRange) -> ServiceResult<Vec<FinanceEntry>> {
        validate_date_range(&range)?;
        let owner = self.state.owner_of(actor).await?;

        let finance = self.state.db.finance();
        self.state
            .with_deadline("list_entries", finance.list(&owner, &range, DEFAULT_LIST_LIMIT))
            .await
    }
}
