//! # Unit-of-Work Side Effects
//!
//! A sale or refund touches several ledgers. Rather than handing callbacks
//! into the transaction, the orchestrators describe what should happen as a
//! list of [`SideEffect`] values and apply them here, on the same
//! connection that holds the transaction.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  OrderManager / RefundWorkflow                                         │
//! │       │  BEGIN                                                          │
//! │       │  lock + write the sale                                          │
//! │       │  plan: Vec<SideEffect>                                          │
//! │       ▼                                                                 │
//! │  apply_effects(conn, ctx, effects)                                     │
//! │       ├── AdjustStock       → stock ledger                             │
//! │       ├── ConsumeQuota      → membership state                         │
//! │       ├── RestoreQuota      → membership state                         │
//! │       ├── RecordFinance     → finance ledger                           │
//! │       └── RetractRefundEntry→ finance ledger                           │
//! │       │                                                                 │
//! │       │  any error → the caller drops the transaction (rollback)       │
//! │       ▼                                                                 │
//! │  COMMIT                                                                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::error::DbResult;
use crate::repository::{finance, membership, stock};
use tally_core::{
    FinanceEntry, MembershipState, NewFinanceEntry, OwnerId, QuotaCharge, QuotaPolicy,
    StockChange, StockMovement,
};

/// One ledger change inside a unit of work.
#[derive(Debug, Clone, PartialEq)]
pub enum SideEffect {
    /// Change the stock of a product. Untracked products are skipped.
    AdjustStock {
        product_id: String,
        delta: i64,
        movement: StockMovement,
        note: Option<String>,
    },
    /// Debit membership units, free pool first.
    ConsumeQuota { units: i64 },
    /// Credit membership units back. With a recorded charge the reversal is
    /// exact; without one the units are split heuristically.
    RestoreQuota {
        units: i64,
        charge: Option<QuotaCharge>,
    },
    /// Append a finance entry.
    RecordFinance(NewFinanceEntry),
    /// Soft-delete the refund expense linked to a sale.
    RetractRefundEntry { sale_id: String },
}

/// What applying a [`SideEffect`] produced.
#[derive(Debug, Clone)]
pub enum EffectOutcome {
    Stock(Option<StockChange>),
    QuotaConsumed {
        charge: QuotaCharge,
        state: MembershipState,
    },
    QuotaRestored(MembershipState),
    FinanceRecorded(FinanceEntry),
    FinanceRetracted(u64),
}

/// Who and when, shared by every effect of a unit.
#[derive(Debug, Clone)]
pub struct UnitContext {
    pub owner: OwnerId,
    pub policy: QuotaPolicy,
    pub now: DateTime<Utc>,
}

impl UnitContext {
    pub fn new(owner: OwnerId, policy: QuotaPolicy, now: DateTime<Utc>) -> Self {
        UnitContext { owner, policy, now }
    }
}

/// Applies effects in order on `conn`. Stops at the first error.
pub async fn apply_effects(
    conn: &mut SqliteConnection,
    ctx: &UnitContext,
    effects: Vec<SideEffect>,
) -> DbResult<Vec<EffectOutcome>> {
    let mut outcomes = Vec::with_capacity(effects.len());
    for effect in effects {
        outcomes.push(apply_effect(conn, ctx, effect).await?);
    }
    Ok(outcomes)
}

async fn apply_effect(
    conn: &mut SqliteConnection,
    ctx: &UnitContext,
    effect: SideEffect,
) -> DbResult<EffectOutcome> {
    let today = ctx.now.date_naive();

    match effect {
        SideEffect::AdjustStock {
            product_id,
            delta,
            movement,
            note,
        } => {
            let change = stock::adjust_by_product_in(
                conn,
                &ctx.owner,
                &product_id,
                delta,
                &movement,
                note.as_deref(),
                ctx.now,
            )
            .await?;
            Ok(EffectOutcome::Stock(change))
        }

        SideEffect::ConsumeQuota { units } => {
            let mut state = membership::lock_state_in(conn, &ctx.owner, today, ctx.now).await?;
            let total = membership::topups_total_in(conn, &ctx.owner).await?;
            let charge = state.consume(units, &ctx.policy, total, today);
            membership::save_state_in(conn, &state, ctx.now).await?;
            Ok(EffectOutcome::QuotaConsumed { charge, state })
        }

        SideEffect::RestoreQuota { units, charge } => {
            let mut state = membership::lock_state_in(conn, &ctx.owner, today, ctx.now).await?;
            let total = membership::topups_total_in(conn, &ctx.owner).await?;
            match charge {
                Some(charge) => state.restore_charge(&charge, total, today),
                None => state.restore_units(units, total, today),
            }
            membership::save_state_in(conn, &state, ctx.now).await?;
            Ok(EffectOutcome::QuotaRestored(state))
        }

        SideEffect::RecordFinance(entry) => {
            let created = finance::insert_in(conn, &ctx.owner, &entry, ctx.now).await?;
            Ok(EffectOutcome::FinanceRecorded(created))
        }

        SideEffect::RetractRefundEntry { sale_id } => {
            let retracted = finance::retract_refund_in(conn, &ctx.owner, &sale_id, ctx.now).await?;
            Ok(EffectOutcome::FinanceRetracted(retracted))
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
