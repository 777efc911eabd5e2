//! Refunds and their undo. Manager-only.

use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};

use crate::error::ServiceResult;
use crate::owner::require_manager;
use crate::AppState;
use tally_core::validation::{validate_note, validate_sale_code};
use tally_core::{Actor, Sale};
use tally_db::RefundOptions;

/// Refund parameters as sent by the caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RefundRequest {
    pub note: Option<String>,
    /// Hide the refunded sale from default listings. Default: true.
    pub hide: Option<bool>,
}

/// Refund service implementation.
pub struct RefundService {
    state: Arc<AppState>,
}

impl RefundService {
    pub fn new(state: Arc<AppState>) -> Self {
        RefundService { state }
    }

    /// Refunds a paid sale: stock back, refund expense booked, quota restored.
    #[instrument(skip_all, fields(user = %actor.user_id, code = %code))]
    pub async fn refund_sale(&self, actor: &Actor, code: &str, request: RefundRequest) -> ServiceResult<Sale> {
        require_manager(actor, "refund a sale")?;
        validate_sale_code(code)?;
        validate_note(request.note.as_deref())?;
        let owner = self.state.owner_of(actor).await?;

        let options = RefundOptions {
            refunded_by: Some(actor.display_name().to_string()),
            note: request.note.filter(|n| !n.trim().is_empty()),
            hide: request.hide.unwrap_or(true),
        };

        let refunds = self.state.db.refunds(self.state.policy());
        let sale = self
            .state
            .with_deadline("refund_sale", refunds.refund(&owner, code.trim(), &options, Utc::now()))
            .await?;

        info!(owner = %owner, "Sale refunded");
        Ok(sale)
    }

    /// Returns a refunded sale to paid and retracts its refund expense.
    ///
    /// Stock and quota credited by the refund are left as they are.
    #[instrument(skip_all, fields(user = %actor.user_id, code = %code))]
    pub async fn undo_refund(&self, actor: &Actor, code: &str) -> ServiceResult<Sale> {
        require_manager(actor, "undo a refund")?;
        validate_sale_code(code)?;
        let owner = self.state.owner_of(actor).await?;

        let refunds = self.state.db.refunds(self.state.policy());
        let sale = self
            .state
            .with_deadline("undo_refund", refunds.undo_refund(&owner, code.trim(), Utc::now()))
            .await?;

        info!(owner = %owner, "Refund undone");
        Ok(sale)
    }
}
