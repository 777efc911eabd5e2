//! # Finance Repository
//!
//! Revenue and expense lines. Refunds write a compensating expense linked
//! to the sale; undoing a refund retracts it by soft delete.

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::DbResult;
use tally_core::{new_id, DateRange, FinanceEntry, FinanceKind, NewFinanceEntry, OwnerId, REFUND_CATEGORY};

const FINANCE_COLUMNS: &str =
    "id, owner_id, title, amount, category, entry_date, kind, note, sale_id, sale_code, created_at";

/// Repository for finance ledger operations.
#[derive(Debug, Clone)]
pub struct FinanceRepository {
    pool: SqlitePool,
}

impl FinanceRepository {
    /// Creates a new FinanceRepository.
    pub fn new(pool: SqlitePool) -> Self {
        FinanceRepository { pool }
    }

    pub async fn record(
        &self,
        owner: &OwnerId,
        entry: &NewFinanceEntry,
        now: DateTime<Utc>,
    ) -> DbResult<FinanceEntry> {
        let mut conn = self.pool.acquire().await?;
        insert_in(&mut conn, owner, entry, now).await
    }

    /// Live entries within `range` (inclusive), newest first.
    ///
    /// An unbounded range returns only the `limit` most recent entries.
    pub async fn list(&self, owner: &OwnerId, range: &DateRange, limit: i64) -> DbResult<Vec<FinanceEntry>> {
        let mut qb: QueryBuilder<Sqlite> = QueryBuilder::new(format!(
            "SELECT {FINANCE_COLUMNS} FROM finance_entries WHERE deleted_at IS NULL AND owner_id = "
        ));
        qb.push_bind(owner);

        if let Some(from) = range.from {
            qb.push(" AND entry_date >= ").push_bind(from);
        }
        if let Some(to) = range.to {
            qb.push(" AND entry_date <= ").push_bind(to);
        }
        qb.push(" ORDER BY entry_date DESC, created_at DESC");
        if range.is_unbounded() {
            qb.push(" LIMIT ").push_bind(limit);
        }

        let entries = qb
            .build_query_as::<FinanceEntry>()
            .fetch_all(&self.pool)
            .await?;

        Ok(entries)
    }

    /// Live entries linked to a sale.
    pub async fn for_sale(&self, owner: &OwnerId, sale_id: &str) -> DbResult<Vec<FinanceEntry>> {
        let entries = sqlx::query_as::<_, FinanceEntry>(&format!(
            "SELECT {FINANCE_COLUMNS} FROM finance_entries \
             WHERE owner_id = ?1 AND sale_id = ?2 AND deleted_at IS NULL \
             ORDER BY created_at"
        ))
        .bind(owner)
        .bind(sale_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(entries)
    }
}

// =============================================================================
// In-transaction operations
// =============================================================================

pub async fn insert_in(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    entry: &NewFinanceEntry,
    now: DateTime<Utc>,
) -> DbResult<FinanceEntry> {
    let created = sqlx::query_as::<_, FinanceEntry>(&format!(
        "INSERT INTO finance_entries \
         (id, owner_id, title, amount, category, entry_date, kind, note, sale_id, sale_code, created_at) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11) \
         RETURNING {FINANCE_COLUMNS}"
    ))
    .bind(new_id())
    .bind(owner)
    .bind(&entry.title)
    .bind(entry.amount)
    .bind(&entry.category)
    .bind(entry.entry_date)
    .bind(entry.kind)
    .bind(entry.note.as_deref())
    .bind(entry.sale_id.as_deref())
    .bind(entry.sale_code.as_deref())
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    debug!(id = %created.id, kind = created.kind.as_str(), amount = %created.amount, "Finance entry recorded");
    Ok(created)
}

/// Soft-deletes the refund expense of a sale. Returns rows retracted.
pub async fn retract_refund_in(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    sale_id: &str,
    now: DateTime<Utc>,
) -> DbResult<u64> {
    let result = sqlx::query(
        r#"
        UPDATE finance_entries SET deleted_at = ?4
        WHERE owner_id = ?1
          AND sale_id = ?2
          AND category = ?3
          AND kind = 'expense'
          AND deleted_at IS NULL
        "#,
    )
    .bind(owner)
    .bind(sale_id)
    .bind(REFUND_CATEGORY)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

// =============================================================================
// Unit Tests
// =============================================================================
