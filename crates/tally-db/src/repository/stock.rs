//! # Stock Repository
//!
//! The stock ledger: one row per tracked product plus an append-only
//! history of every change.
//!
//! ## Write Paths
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Stock Writes                                    │
//! │                                                                         │
//! │  adjust_by_product_in  (inside sale / refund units)                    │
//! │     └── missing or untracked row → no-op                               │
//! │                                                                         │
//! │  adjust                (manager adjustment)                            │
//! │     └── reduce / recount / adjust resolved in tally-core               │
//! │                                                                         │
//! │  sync_from_products    (catalog reconciliation)                        │
//! │     ├── revive rows of re-tracked products                             │
//! │     ├── refresh changed names / categories                             │
//! │     ├── retire rows of untracked or deleted products                   │
//! │     └── create rows for new tracked products                           │
//! │                                                                         │
//! │  Every quantity change: clamp at 0, adjustments += 1, append history   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::stock::apply_delta;
use tally_core::{
    new_id, stock::plan_adjustment, OwnerId, Product, StockChange, StockHistoryEntry,
    StockMovement, StockRow,
};

const STOCK_COLUMNS: &str = "id, owner_id, product_id, name, category, quantity, adjustments, created_at, updated_at";

/// What a catalog sync changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncReport {
    pub created: u64,
    pub revived: u64,
    pub refreshed: u64,
    pub retired: u64,
}

impl SyncReport {
    pub fn is_noop(&self) -> bool {
        *self == SyncReport::default()
    }
}

/// Repository for stock operations.
#[derive(Debug, Clone)]
pub struct StockRepository {
    pool: SqlitePool,
}

impl StockRepository {
    /// Creates a new StockRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StockRepository { pool }
    }

    /// Lists live stock rows for an owner, by name.
    pub async fn list(&self, owner: &OwnerId, limit: i64) -> DbResult<Vec<StockRow>> {
        let rows = sqlx::query_as::<_, StockRow>(&format!(
            "SELECT {STOCK_COLUMNS} FROM stocks \
             WHERE owner_id = ?1 AND deleted_at IS NULL \
             ORDER BY name ASC LIMIT ?2"
        ))
        .bind(owner)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    /// Gets a live stock row by product.
    pub async fn get_by_product(&self, owner: &OwnerId, product_id: &str) -> DbResult<Option<StockRow>> {
        let row = sqlx::query_as::<_, StockRow>(&format!(
            "SELECT {STOCK_COLUMNS} FROM stocks \
             WHERE owner_id = ?1 AND product_id = ?2 AND deleted_at IS NULL"
        ))
        .bind(owner)
        .bind(product_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row)
    }

    /// Most recent history lines first.
    ///
    /// ## Errors
    /// `NotFound` if the stock row does not belong to `owner`.
    pub async fn history(
        &self,
        owner: &OwnerId,
        stock_id: &str,
        limit: i64,
    ) -> DbResult<Vec<StockHistoryEntry>> {
        let owned: Option<String> =
            sqlx::query_scalar("SELECT id FROM stocks WHERE id = ?1 AND owner_id = ?2")
                .bind(stock_id)
                .bind(owner)
                .fetch_optional(&self.pool)
                .await?;

        if owned.is_none() {
            return Err(DbError::not_found("Stock", stock_id));
        }

        let entries = sqlx::query_as::<_, StockHistoryEntry>(
            r#"
            SELECT id, owner_id, stock_id, delta, remaining, note, kind, created_at
            FROM stock_history
            WHERE stock_id = ?1
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?2
            "#,
        )
        .bind(stock_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }

    /// Manual adjustment in its own transaction.
    pub async fn adjust(
        &self,
        owner: &OwnerId,
        stock_id: &str,
        input: i64,
        movement: &StockMovement,
        note: Option<&str>,
        now: DateTime<Utc>,
    ) -> DbResult<StockRow> {
        let mut tx = self.pool.begin().await?;
        let row = adjust_in(&mut tx, owner, stock_id, input, movement, note, now).await?;
        tx.commit().await?;
        Ok(row)
    }

    /// Reconciles the owner's stock rows with the catalog.
    pub async fn sync_from_products(&self, owner: &OwnerId, now: DateTime<Utc>) -> DbResult<SyncReport> {
        let mut tx = self.pool.begin().await?;
        let report = sync_from_products_in(&mut tx, owner, now).await?;
        tx.commit().await?;
        Ok(report)
    }
}

// =============================================================================
// In-transaction operations
// =============================================================================

/// Applies `delta` to the live stock row of `product_id`.
///
/// Returns `None` when the product has no live row for this owner; sales of
/// untracked products and services pass through untouched.
pub async fn adjust_by_product_in(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    product_id: &str,
    delta: i64,
    movement: &StockMovement,
    note: Option<&str>,
    now: DateTime<Utc>,
) -> DbResult<Option<StockChange>> {
    // Write-first: takes the writer lock before the quantity is read.
    let locked: Option<(String, i64)> = sqlx::query_as(
        r#"
        UPDATE stocks SET updated_at = updated_at
        WHERE owner_id = ?1 AND product_id = ?2 AND deleted_at IS NULL
        RETURNING id, quantity
        "#,
    )
    .bind(owner)
    .bind(product_id)
    .fetch_optional(&mut *conn)
    .await?;

    let Some((stock_id, current)) = locked else {
        debug!(product_id, "No tracked stock row, skipping");
        return Ok(None);
    };

    let change = apply_delta(current, delta);
    write_change_in(conn, owner, &stock_id, change, movement, note, now).await?;
    Ok(Some(change))
}

/// Manual adjustment of a stock row by id.
///
/// ## Errors
/// `NotFound` if the row is missing, retired, or owned by someone else.
pub async fn adjust_in(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    stock_id: &str,
    input: i64,
    movement: &StockMovement,
    note: Option<&str>,
    now: DateTime<Utc>,
) -> DbResult<StockRow> {
    let current: Option<i64> = sqlx::query_scalar(
        r#"
        UPDATE stocks SET updated_at = updated_at
        WHERE id = ?1 AND owner_id = ?2 AND deleted_at IS NULL
        RETURNING quantity
        "#,
    )
    .bind(stock_id)
    .bind(owner)
    .fetch_optional(&mut *conn)
    .await?;

    let current = current.ok_or_else(|| DbError::not_found("Stock", stock_id))?;
    let change = plan_adjustment(movement, input, current);

    write_change_in(conn, owner, stock_id, change, movement, note, now).await
}

/// Stores the new quantity, bumps the counter and appends history.
async fn write_change_in(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    stock_id: &str,
    change: StockChange,
    movement: &StockMovement,
    note: Option<&str>,
    now: DateTime<Utc>,
) -> DbResult<StockRow> {
    let row = sqlx::query_as::<_, StockRow>(&format!(
        "UPDATE stocks SET quantity = ?1, adjustments = adjustments + 1, updated_at = ?2 \
         WHERE id = ?3 RETURNING {STOCK_COLUMNS}"
    ))
    .bind(change.remaining)
    .bind(now)
    .bind(stock_id)
    .fetch_one(&mut *conn)
    .await?;

    append_history_in(conn, owner, stock_id, change, movement, note, now).await?;

    debug!(
        stock_id,
        delta = change.delta,
        remaining = change.remaining,
        kind = movement.as_str(),
        "Stock changed"
    );

    Ok(row)
}

async fn append_history_in(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    stock_id: &str,
    change: StockChange,
    movement: &StockMovement,
    note: Option<&str>,
    now: DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query(
        r#"
        INSERT INTO stock_history (id, owner_id, stock_id, delta, remaining, note, kind, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
        "#,
    )
    .bind(new_id())
    .bind(owner)
    .bind(stock_id)
    .bind(change.delta)
    .bind(change.remaining)
    .bind(note)
    .bind(movement.as_str())
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Catalog reconciliation. Idempotent: a second run reports no changes.
///
/// Existing quantities and history are never touched; only rows created by
/// this run get a `catalog-sync` history line for their opening quantity.
pub async fn sync_from_products_in(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    now: DateTime<Utc>,
) -> DbResult<SyncReport> {
    let mut report = SyncReport::default();

    report.revived = sqlx::query(
        r#"
        UPDATE stocks SET deleted_at = NULL, updated_at = ?2
        WHERE owner_id = ?1
          AND deleted_at IS NOT NULL
          AND product_id IN (
              SELECT p.id FROM products p
              WHERE p.owner_id = ?1 AND p.track_stock = 1 AND p.deleted_at IS NULL
          )
        "#,
    )
    .bind(owner)
    .bind(now)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    report.refreshed = sqlx::query(
        r#"
        UPDATE stocks SET
            name = (SELECT p.name FROM products p WHERE p.id = stocks.product_id),
            category = (SELECT p.category FROM products p WHERE p.id = stocks.product_id),
            updated_at = ?2
        WHERE owner_id = ?1
          AND deleted_at IS NULL
          AND EXISTS (
              SELECT 1 FROM products p
              WHERE p.id = stocks.product_id
                AND p.owner_id = ?1
                AND p.track_stock = 1
                AND p.deleted_at IS NULL
                AND (p.name IS NOT stocks.name OR p.category IS NOT stocks.category)
          )
        "#,
    )
    .bind(owner)
    .bind(now)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    report.retired = sqlx::query(
        r#"
        UPDATE stocks SET deleted_at = ?2, updated_at = ?2
        WHERE owner_id = ?1
          AND deleted_at IS NULL
          AND product_id IS NOT NULL
          AND NOT EXISTS (
              SELECT 1 FROM products p
              WHERE p.id = stocks.product_id
                AND p.owner_id = ?1
                AND p.track_stock = 1
                AND p.deleted_at IS NULL
          )
        "#,
    )
    .bind(owner)
    .bind(now)
    .execute(&mut *conn)
    .await?
    .rows_affected();

    let missing = sqlx::query_as::<_, Product>(
        r#"
        SELECT p.id, p.owner_id, p.name, p.category, p.price, p.track_stock,
               p.initial_stock, p.created_at, p.updated_at, p.deleted_at
        FROM products p
        WHERE p.owner_id = ?1
          AND p.track_stock = 1
          AND p.deleted_at IS NULL
          AND NOT EXISTS (SELECT 1 FROM stocks s WHERE s.product_id = p.id)
        ORDER BY p.name
        "#,
    )
    .bind(owner)
    .fetch_all(&mut *conn)
    .await?;

    for product in missing {
        let opening = product.initial_stock.max(0);
        let adjustments = i64::from(opening > 0);

        let created: Option<String> = sqlx::query_scalar(
            r#"
            INSERT INTO stocks (id, owner_id, product_id, name, category, quantity, adjustments, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)
            ON CONFLICT (product_id) DO NOTHING
            RETURNING id
            "#,
        )
        .bind(new_id())
        .bind(owner)
        .bind(&product.id)
        .bind(&product.name)
        .bind(&product.category)
        .bind(opening)
        .bind(adjustments)
        .bind(now)
        .fetch_optional(&mut *conn)
        .await?;

        let Some(stock_id) = created else {
            continue;
        };
        report.created += 1;

        if opening > 0 {
            let change = StockChange {
                delta: opening,
                remaining: opening,
            };
            append_history_in(conn, owner, &stock_id, change, &StockMovement::CatalogSync, None, now)
                .await?;
        }
    }

    debug!(owner = %owner, ?report, "Stock synced from catalog");
    Ok(report)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::test_support::{insert_product, set_product};

    async fn setup() -> (Database, OwnerId) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        (db, OwnerId::from("manager-1"))
    }

    async fn synced_row(db: &Database, owner: &OwnerId, product_id: &str) -> StockRow {
        db.stock().sync_from_products(owner, Utc::now()).await.unwrap();
        db.stock().get_by_product(owner, product_id).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_sync_creates_rows_for_tracked_products() {
        let (db, owner) = setup().await;
        insert_product(&db, &owner, "p-pomade", "Pomade", true, 5).await;
        insert_product(&db, &owner, "p-cut", "Haircut", false, 0).await;

        let report = db.stock().sync_from_products(&owner, Utc::now()).await.unwrap();
        assert_eq!(report.created, 1);

        let rows = db.stock().list(&owner, 100).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].product_id.as_deref(), Some("p-pomade"));
        assert_eq!(rows[0].quantity, 5);

        let history = db.stock().history(&owner, &rows[0].id, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].movement(), StockMovement::CatalogSync);
    }

    #[tokio::test]
    async fn test_sync_is_idempotent() {
        let (db, owner) = setup().await;
        insert_product(&db, &owner, "p-1", "Pomade", true, 5).await;
        insert_product(&db, &owner, "p-2", "Wax", true, 0).await;

        db.stock().sync_from_products(&owner, Utc::now()).await.unwrap();
        let before = db.stock().list(&owner, 100).await.unwrap();

        let second = db.stock().sync_from_products(&owner, Utc::now()).await.unwrap();
        assert!(second.is_noop(), "second sync changed something: {:?}", second);

        let after = db.stock().list(&owner, 100).await.unwrap();
        assert_eq!(before.len(), after.len());
        for (b, a) in before.iter().zip(after.iter()) {
            assert_eq!(b.id, a.id);
            assert_eq!(b.quantity, a.quantity);
            assert_eq!(b.adjustments, a.adjustments);
        }
    }

    #[tokio::test]
    async fn test_sync_keeps_quantity_and_refreshes_name() {
        let (db, owner) = setup().await;
        insert_product(&db, &owner, "p-1", "Pomade", true, 5).await;
        let row = synced_row(&db, &owner, "p-1").await;

        db.stock()
            .adjust(&owner, &row.id, 3, &StockMovement::Reduce, None, Utc::now())
            .await
            .unwrap();
        set_product(&db, "p-1", "Pomade Strong", true, false).await;

        let report = db.stock().sync_from_products(&owner, Utc::now()).await.unwrap();
        assert_eq!(report.refreshed, 1);

        let row = db.stock().get_by_product(&owner, "p-1").await.unwrap().unwrap();
        assert_eq!(row.name, "Pomade Strong");
        assert_eq!(row.quantity, 2);
    }

    #[tokio::test]
    async fn test_sync_retires_and_revives() {
        let (db, owner) = setup().await;
        insert_product(&db, &owner, "p-1", "Pomade", true, 4).await;
        let row = synced_row(&db, &owner, "p-1").await;

        set_product(&db, "p-1", "Pomade", false, false).await;
        let report = db.stock().sync_from_products(&owner, Utc::now()).await.unwrap();
        assert_eq!(report.retired, 1);
        assert!(db.stock().get_by_product(&owner, "p-1").await.unwrap().is_none());

        set_product(&db, "p-1", "Pomade", true, false).await;
        let report = db.stock().sync_from_products(&owner, Utc::now()).await.unwrap();
        assert_eq!(report.revived, 1);
        assert_eq!(report.created, 0);

        let revived = db.stock().get_by_product(&owner, "p-1").await.unwrap().unwrap();
        assert_eq!(revived.id, row.id);
        assert_eq!(revived.quantity, 4);
    }

    #[tokio::test]
    async fn test_sync_retires_deleted_products() {
        let (db, owner) = setup().await;
        insert_product(&db, &owner, "p-1", "Pomade", true, 4).await;
        synced_row(&db, &owner, "p-1").await;

        set_product(&db, "p-1", "Pomade", true, true).await;
        let report = db.stock().sync_from_products(&owner, Utc::now()).await.unwrap();
        assert_eq!(report.retired, 1);
    }

    #[tokio::test]
    async fn test_adjust_kinds() {
        let (db, owner) = setup().await;
        insert_product(&db, &owner, "p-1", "Pomade", true, 10).await;
        let row = synced_row(&db, &owner, "p-1").await;
        let stock = db.stock();
        let now = Utc::now();

        let row = stock.adjust(&owner, &row.id, 3, &StockMovement::Reduce, None, now).await.unwrap();
        assert_eq!(row.quantity, 7);

        let row = stock.adjust(&owner, &row.id, 2, &StockMovement::Adjust, Some("found"), now).await.unwrap();
        assert_eq!(row.quantity, 9);

        let row = stock.adjust(&owner, &row.id, 4, &StockMovement::Recount, None, now).await.unwrap();
        assert_eq!(row.quantity, 4);

        let row = stock.adjust(&owner, &row.id, -3, &StockMovement::Recount, None, now).await.unwrap();
        assert_eq!(row.quantity, 0);
        // opening catalog-sync line + four manual changes
        assert_eq!(row.adjustments, 5);

        let history = stock.history(&owner, &row.id, 10).await.unwrap();
        assert_eq!(history.len(), 5);
        assert_eq!(history[0].kind, "recount");
        assert_eq!(history[0].delta, -4);
        assert_eq!(history[0].remaining, 0);
    }

    #[tokio::test]
    async fn test_quantity_never_negative() {
        let (db, owner) = setup().await;
        insert_product(&db, &owner, "p-1", "Pomade", true, 2).await;
        let row = synced_row(&db, &owner, "p-1").await;

        let row = db
            .stock()
            .adjust(&owner, &row.id, -5, &StockMovement::Adjust, None, Utc::now())
            .await
            .unwrap();
        assert_eq!(row.quantity, 0);

        let history = db.stock().history(&owner, &row.id, 1).await.unwrap();
        assert_eq!(history[0].delta, -5);
        assert_eq!(history[0].remaining, 0);
    }

    #[tokio::test]
    async fn test_adjust_foreign_row_is_not_found() {
        let (db, owner) = setup().await;
        insert_product(&db, &owner, "p-1", "Pomade", true, 2).await;
        let row = synced_row(&db, &owner, "p-1").await;

        let other = OwnerId::from("manager-2");
        let err = db
            .stock()
            .adjust(&other, &row.id, 1, &StockMovement::Adjust, None, Utc::now())
            .await
            .unwrap_err();
        assert!(err.is_not_found());

        let err = db.stock().history(&other, &row.id, 10).await.unwrap_err();
        assert!(err.is_not_found());

        let mut conn = db.pool().acquire().await.unwrap();
        let skipped = adjust_by_product_in(&mut conn, &other, "p-1", -1, &StockMovement::Sale, None, Utc::now())
            .await
            .unwrap();
        assert!(skipped.is_none());
    }

    #[tokio::test]
    async fn test_adjust_by_product_missing_row_is_noop() {
        let (db, owner) = setup().await;
        let mut conn = db.pool().acquire().await.unwrap();

        let result = adjust_by_product_in(&mut conn, &owner, "p-none", -1, &StockMovement::Sale, None, Utc::now())
            .await
            .unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn test_history_is_append_only() {
        let (db, owner) = setup().await;
        insert_product(&db, &owner, "p-1", "Pomade", true, 2).await;
        synced_row(&db, &owner, "p-1").await;

        let update = sqlx::query("UPDATE stock_history SET delta = 0").execute(db.pool()).await;
        assert!(update.is_err());
        let delete = sqlx::query("DELETE FROM stock_history").execute(db.pool()).await;
        assert!(delete.is_err());
    }
}
