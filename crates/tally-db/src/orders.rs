//! # Order Transaction Manager
//!
//! Creating a sale is one unit of work:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  BEGIN                                                                  │
//! │   1. INSERT sale header (allocates ORD-<seq>)   ← takes writer lock    │
//! │   2. INSERT each line                                                   │
//! │   3. AdjustStock(−qty) for every line with a product                   │
//! │   4. ConsumeQuota(Σ qty, at least 1)                                   │
//! │   5. store the quota split on the sale                                 │
//! │  COMMIT                                                                 │
//! │                                                                         │
//! │  Any failure in 1-5 drops the transaction: nothing is visible.         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Validation happens in the service layer before this is called.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{info, instrument};

use crate::error::DbResult;
use crate::repository::sale;
use crate::unit::{apply_effects, EffectOutcome, SideEffect, UnitContext};
use tally_core::quota::consumption_units;
use tally_core::{NewSale, OwnerId, QuotaPolicy, Sale, StockMovement};

/// Runs the sale creation unit of work.
#[derive(Debug, Clone)]
pub struct OrderManager {
    pool: SqlitePool,
    policy: QuotaPolicy,
}

impl OrderManager {
    pub fn new(pool: SqlitePool, policy: QuotaPolicy) -> Self {
        OrderManager { pool, policy }
    }

    /// Persists a sale with its lines and applies its ledger effects.
    #[instrument(skip_all, fields(owner = %owner, lines = input.items.len()))]
    pub async fn create(&self, owner: &OwnerId, input: &NewSale, now: DateTime<Utc>) -> DbResult<Sale> {
        let mut tx = self.pool.begin().await?;

        let row = sale::insert_sale_in(&mut tx, owner, input, now).await?;

        let mut items = Vec::with_capacity(input.items.len());
        for line in &input.items {
            items.push(sale::insert_item_in(&mut tx, owner, &row.id, line, now).await?);
        }

        let ctx = UnitContext::new(owner.clone(), self.policy, now);
        let outcomes = apply_effects(&mut tx, &ctx, plan_sale_effects(input, &row.code)).await?;

        let charge = outcomes.iter().find_map(|o| match o {
            EffectOutcome::QuotaConsumed { charge, .. } => Some(*charge),
            _ => None,
        });
        if let Some(charge) = &charge {
            sale::record_quota_charge_in(&mut tx, &row.id, charge).await?;
        }

        tx.commit().await?;

        let mut sale = row.into_sale(items);
        sale.quota_charge = charge;

        info!(code = %sale.code, amount = %sale.amount, "Sale created");
        Ok(sale)
    }
}

/// The ledger effects of a new sale, in application order.
pub fn plan_sale_effects(input: &NewSale, code: &str) -> Vec<SideEffect> {
    let mut effects: Vec<SideEffect> = input
        .items
        .iter()
        .filter_map(|line| {
            line.product_id.as_ref().map(|product_id| SideEffect::AdjustStock {
                product_id: product_id.clone(),
                delta: -line.quantity,
                movement: StockMovement::Sale,
                note: Some(code.to_string()),
            })
        })
        .collect();

    effects.push(SideEffect::ConsumeQuota {
        units: consumption_units(input.items.iter().map(|l| l.quantity)),
    });

    effects
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::test_support::{insert_product, new_sale};
    use tally_core::{DateRange, MembershipState, NewTopup, SaleStatus};

    async fn setup() -> (Database, OwnerId) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        (db, OwnerId::from("manager-1"))
    }

    async fn quota(db: &Database, owner: &OwnerId) -> MembershipState {
        db.membership().state(owner, Utc::now().date_naive(), Utc::now()).await.unwrap()
    }

    #[test]
    fn test_plan_skips_lines_without_product() {
        let input = new_sale(&[(Some("p-1"), 2), (None, 1)]);
        let effects = plan_sale_effects(&input, "ORD-1");

        assert_eq!(effects.len(), 2);
        assert!(matches!(&effects[0], SideEffect::AdjustStock { delta: -2, .. }));
        assert_eq!(effects[1], SideEffect::ConsumeQuota { units: 3 });
    }

    #[tokio::test]
    async fn test_create_sale_debits_stock_and_quota() {
        let (db, owner) = setup().await;
        insert_product(&db, &owner, "p-1", "Pomade", true, 10).await;
        db.stock().sync_from_products(&owner, Utc::now()).await.unwrap();

        let sale = db
            .orders(QuotaPolicy::default())
            .create(&owner, &new_sale(&[(Some("p-1"), 2), (None, 1)]), Utc::now())
            .await
            .unwrap();

        assert!(sale.code.starts_with("ORD-"));
        assert_eq!(sale.code, format!("ORD-{}", sale.seq));
        assert_eq!(sale.status, SaleStatus::Paid);
        assert_eq!(sale.items.len(), 2);
        assert_eq!(sale.quota_charge.map(|c| c.free_units), Some(3));

        let row = db.stock().get_by_product(&owner, "p-1").await.unwrap().unwrap();
        assert_eq!(row.quantity, 8);

        let state = quota(&db, &owner).await;
        assert_eq!(state.free_used, 3);
        assert_eq!(state.used_quota, 3);

        let stored = db.sales().get_by_code(&owner, &sale.code).await.unwrap().unwrap();
        assert_eq!(stored.quota_charge, sale.quota_charge);
        assert_eq!(stored.items.len(), 2);
    }

    #[tokio::test]
    async fn test_codes_are_unique_and_increasing() {
        let (db, owner) = setup().await;
        let orders = db.orders(QuotaPolicy::default());
        let now = Utc::now();

        let a = orders.create(&owner, &new_sale(&[(None, 1)]), now).await.unwrap();
        let b = orders.create(&owner, &new_sale(&[(None, 1)]), now).await.unwrap();
        let c = orders
            .create(&OwnerId::from("manager-2"), &new_sale(&[(None, 1)]), now)
            .await
            .unwrap();

        assert!(a.seq >= now.timestamp_millis());
        assert_eq!(b.seq, a.seq + 1);
        assert_eq!(c.seq, b.seq + 1);
    }

    #[tokio::test]
    async fn test_quota_spills_into_topup() {
        let (db, owner) = setup().await;
        let today = Utc::now().date_naive();
        db.membership()
            .create_topup(
                &owner,
                &NewTopup { amount: 100, manager: "Rina".into(), note: None, date: None },
                today,
                Utc::now(),
            )
            .await
            .unwrap();
        db.membership()
            .set_used(&owner, 999, &QuotaPolicy::default(), today, Utc::now())
            .await
            .unwrap();

        let sale = db
            .orders(QuotaPolicy::default())
            .create(&owner, &new_sale(&[(None, 5)]), Utc::now())
            .await
            .unwrap();

        let charge = sale.quota_charge.unwrap();
        assert_eq!((charge.free_units, charge.topup_units), (1, 4));

        let state = quota(&db, &owner).await;
        assert_eq!(state.free_used, 1000);
        assert_eq!(state.topup_balance, 96);
        assert_eq!(state.used_quota, 1004);
    }

    #[tokio::test]
    async fn test_failed_sale_leaves_nothing_behind() {
        let (db, owner) = setup().await;
        insert_product(&db, &owner, "p-1", "Pomade", true, 10).await;
        db.stock().sync_from_products(&owner, Utc::now()).await.unwrap();

        // Force the quota step to fail after stock was debited.
        sqlx::query("DROP TABLE membership_state").execute(db.pool()).await.unwrap();

        let result = db
            .orders(QuotaPolicy::default())
            .create(&owner, &new_sale(&[(Some("p-1"), 2)]), Utc::now())
            .await;
        assert!(result.is_err());

        let row = db.stock().get_by_product(&owner, "p-1").await.unwrap().unwrap();
        assert_eq!(row.quantity, 10);
        let history = db.stock().history(&owner, &row.id, 10).await.unwrap();
        assert_eq!(history.len(), 1);

        let sales = db.sales().list(&owner, &DateRange::default(), true, 200).await.unwrap();
        assert!(sales.is_empty());
    }

    #[tokio::test]
    async fn test_stock_never_negative_from_sales() {
        let (db, owner) = setup().await;
        insert_product(&db, &owner, "p-1", "Pomade", true, 1).await;
        db.stock().sync_from_products(&owner, Utc::now()).await.unwrap();

        db.orders(QuotaPolicy::default())
            .create(&owner, &new_sale(&[(Some("p-1"), 4)]), Utc::now())
            .await
            .unwrap();

        let row = db.stock().get_by_product(&owner, "p-1").await.unwrap().unwrap();
        assert_eq!(row.quantity, 0);
        let history = db.stock().history(&owner, &row.id, 1).await.unwrap();
        assert_eq!(history[0].delta, -4);
        assert_eq!(history[0].kind, "sale");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_sales_and_syncs_serialize() {
        let path = std::env::temp_dir().join(format!("tally-orders-{}.db", uuid::Uuid::new_v4()));
        let db = Database::new(DbConfig::new(&path).max_connections(8)).await.unwrap();
        let owner = OwnerId::from("manager-1");

        insert_product(&db, &owner, "p-1", "Pomade", true, 100).await;
        db.stock().sync_from_products(&owner, Utc::now()).await.unwrap();
        // p-2 gets its stock row from whichever concurrent sync wins
        insert_product(&db, &owner, "p-2", "Wax", true, 7).await;

        const SALES: i64 = 20;
        let mut tasks = Vec::new();
        for _ in 0..SALES {
            let db = db.clone();
            let owner = owner.clone();
            tasks.push(tokio::spawn(async move {
                db.orders(QuotaPolicy::default())
                    .create(&owner, &new_sale(&[(Some("p-1"), 1)]), Utc::now())
                    .await
                    .map(|_| ())
            }));
        }
        for _ in 0..5 {
            let db = db.clone();
            let owner = owner.clone();
            tasks.push(tokio::spawn(async move {
                db.stock().sync_from_products(&owner, Utc::now()).await.map(|_| ())
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        let sold = db.stock().get_by_product(&owner, "p-1").await.unwrap().unwrap();
        assert_eq!(sold.quantity, 100 - SALES);

        let synced = db.stock().get_by_product(&owner, "p-2").await.unwrap().unwrap();
        assert_eq!(synced.quantity, 7);
        let history = db.stock().history(&owner, &synced.id, 10).await.unwrap();
        assert_eq!(history.len(), 1);

        assert_eq!(db.stock().list(&owner, 200).await.unwrap().len(), 2);
        assert_eq!(quota(&db, &owner).await.free_used, SALES);

        let codes: std::collections::HashSet<_> = db
            .sales()
            .list(&owner, &DateRange::default(), true, 200)
            .await
            .unwrap()
            .into_iter()
            .map(|s| s.code)
            .collect();
        assert_eq!(codes.len(), SALES as usize);

        db.close().await;
        let _ = std::fs::remove_file(&path);
    }
}
