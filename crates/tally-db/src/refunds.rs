//! # Refund / Void Workflow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  refund(code)                          undo_refund(code)               │
//! │  ────────────                          ─────────────────               │
//! │  lock sale (must be paid)              lock sale (must be refunded)    │
//! │  status → refunded, metadata, hide?    status → paid, metadata cleared │
//! │  stock   += qty per product line       finance refund expense retracted│
//! │  finance += "Refund <code>" expense                                     │
//! │  quota   += exact recorded charge      stock and quota NOT re-debited  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Undo is deliberately narrower than refund: it restores the sale and the
//! finance ledger only. A manager who undoes a refund by mistake corrects
//! stock and quota with an adjustment.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{info, instrument};

use crate::error::{DbError, DbResult};
use crate::repository::sale;
use crate::unit::{apply_effects, SideEffect, UnitContext};
use tally_core::quota::consumption_units;
use tally_core::{NewFinanceEntry, OwnerId, QuotaPolicy, Sale, SaleItem, SaleStatus, StockMovement};

/// How a refund should be recorded.
#[derive(Debug, Clone)]
pub struct RefundOptions {
    /// Operator name stamped on the sale.
    pub refunded_by: Option<String>,
    pub note: Option<String>,
    /// Hide the sale from default listings. Default: true.
    pub hide: bool,
}

impl Default for RefundOptions {
    fn default() -> Self {
        RefundOptions {
            refunded_by: None,
            note: None,
            hide: true,
        }
    }
}

/// Runs the refund and undo-refund units of work.
#[derive(Debug, Clone)]
pub struct RefundWorkflow {
    pool: SqlitePool,
    policy: QuotaPolicy,
}

impl RefundWorkflow {
    pub fn new(pool: SqlitePool, policy: QuotaPolicy) -> Self {
        RefundWorkflow { pool, policy }
    }

    /// Refunds a paid sale and reverses its ledger effects.
    ///
    /// ## Errors
    /// - `NotFound`: no sale with this code for the owner
    /// - `InvalidState`: the sale is already refunded
    #[instrument(skip_all, fields(owner = %owner, code = %code))]
    pub async fn refund(
        &self,
        owner: &OwnerId,
        code: &str,
        options: &RefundOptions,
        now: DateTime<Utc>,
    ) -> DbResult<Sale> {
        let mut tx = self.pool.begin().await?;

        let locked = sale::lock_by_code_in(&mut tx, owner, code).await?;
        if locked.status == SaleStatus::Refunded {
            return Err(DbError::invalid_state("Sale", &locked.code, "is already refunded"));
        }

        let items = sale::items_in(&mut tx, &locked.id).await?;
        let updated = sale::mark_refunded_in(
            &mut tx,
            &locked.id,
            options.refunded_by.as_deref(),
            options.note.as_deref(),
            options.hide,
            now,
        )
        .await?;
        let refunded = updated.into_sale(items);

        let ctx = UnitContext::new(owner.clone(), self.policy, now);
        let effects = plan_refund_effects(&refunded, options.note.clone(), now);
        apply_effects(&mut tx, &ctx, effects).await?;

        tx.commit().await?;

        info!(amount = %refunded.amount, hidden = options.hide, "Sale refunded");
        Ok(refunded)
    }

    /// Puts a refunded sale back to paid and retracts its refund expense.
    ///
    /// Stock and quota credited by the refund stay credited.
    ///
    /// ## Errors
    /// - `NotFound`: no sale with this code for the owner
    /// - `InvalidState`: the sale is paid
    #[instrument(skip_all, fields(owner = %owner, code = %code))]
    pub async fn undo_refund(&self, owner: &OwnerId, code: &str, now: DateTime<Utc>) -> DbResult<Sale> {
        let mut tx = self.pool.begin().await?;

        let locked = sale::lock_by_code_in(&mut tx, owner, code).await?;
        if locked.status == SaleStatus::Paid {
            return Err(DbError::invalid_state("Sale", &locked.code, "is not refunded"));
        }

        let updated = sale::mark_paid_in(&mut tx, &locked.id, now).await?;
        let items = sale::items_in(&mut tx, &updated.id).await?;

        let ctx = UnitContext::new(owner.clone(), self.policy, now);
        apply_effects(
            &mut tx,
            &ctx,
            vec![SideEffect::RetractRefundEntry {
                sale_id: updated.id.clone(),
            }],
        )
        .await?;

        tx.commit().await?;

        info!("Refund undone");
        Ok(updated.into_sale(items))
    }
}

/// The ledger effects of refunding `sale`, in application order.
pub fn plan_refund_effects(sale: &Sale, note: Option<String>, now: DateTime<Utc>) -> Vec<SideEffect> {
    let mut effects: Vec<SideEffect> = sale
        .items
        .iter()
        .filter_map(|item: &SaleItem| {
            item.product_id.as_ref().map(|product_id| SideEffect::AdjustStock {
                product_id: product_id.clone(),
                delta: item.quantity,
                movement: StockMovement::Refund,
                note: Some(sale.code.clone()),
            })
        })
        .collect();

    effects.push(SideEffect::RecordFinance(NewFinanceEntry::refund_of(
        sale,
        now.date_naive(),
        note,
    )));

    effects.push(SideEffect::RestoreQuota {
        units: consumption_units(sale.items.iter().map(|i| i.quantity)),
        charge: sale.quota_charge,
    });

    effects
}

// =============================================================================
// Unit Tests
// =============================================================================
