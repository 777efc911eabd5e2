//! # Sale Repository
//!
//! Database operations for sales and sale items.
//!
//! ## Sale Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sale Lifecycle                                    │
//! │                                                                         │
//! │  1. CREATE (OrderManager, one transaction)                             │
//! │     └── insert_sale_in() → code ORD-<seq>, status paid                 │
//! │     └── insert_item_in() × n                                           │
//! │     └── record_quota_charge_in()                                       │
//! │                                                                         │
//! │  2. REFUND (RefundWorkflow)                                            │
//! │     └── lock_by_code_in() → mark_refunded_in()                         │
//! │         status refunded, refund metadata, optionally hidden            │
//! │                                                                         │
//! │  3. UNDO REFUND (RefundWorkflow)                                       │
//! │     └── lock_by_code_in() → mark_paid_in()                             │
//! │         status paid, metadata cleared, visible again                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Sale Codes
//! `seq` is allocated inside the INSERT itself as
//! `max(MAX(seq) + 1, now_ms)`, so two sales can never share a code and
//! codes stay roughly time-ordered. `seq` and `code` are both UNIQUE.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{FromRow, QueryBuilder, Sqlite, SqliteConnection, SqlitePool};
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::{
    new_id, CustomerSnapshot, DateRange, Money, NewSale, NewSaleItem, OwnerId, PaymentMethod,
    QuotaCharge, RefundInfo, Sale, SaleItem, SaleStatus,
};

const SALE_COLUMNS: &str = "id, owner_id, seq, code, status, transacted_on, transacted_at, amount, \
     payment_method, stylist, stylist_id, customer_name, customer_phone, customer_email, \
     customer_address, customer_visits, customer_last_visit, operator_name, quota_free_units, \
     quota_topup_units, quota_window_start, refunded_at, refunded_by, refund_note, \
     created_at, updated_at, deleted_at";

const ITEM_COLUMNS: &str =
    "id, sale_id, owner_id, product_id, name, category, unit_price, quantity, created_at";

// =============================================================================
// Row Type
// =============================================================================

/// Flat `sales` row, before items are attached.
#[derive(Debug, Clone, FromRow)]
pub struct SaleRow {
    pub id: String,
    pub owner_id: OwnerId,
    pub seq: i64,
    pub code: String,
    pub status: SaleStatus,
    pub transacted_on: NaiveDate,
    pub transacted_at: DateTime<Utc>,
    pub amount: Money,
    pub payment_method: PaymentMethod,
    pub stylist: Option<String>,
    pub stylist_id: Option<String>,
    pub customer_name: Option<String>,
    pub customer_phone: Option<String>,
    pub customer_email: Option<String>,
    pub customer_address: Option<String>,
    pub customer_visits: Option<i64>,
    pub customer_last_visit: Option<String>,
    pub operator_name: Option<String>,
    pub quota_free_units: Option<i64>,
    pub quota_topup_units: Option<i64>,
    pub quota_window_start: Option<NaiveDate>,
    pub refunded_at: Option<DateTime<Utc>>,
    pub refunded_by: Option<String>,
    pub refund_note: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

impl SaleRow {
    /// The recorded quota split, if the sale has one.
    pub fn quota_charge(&self) -> Option<QuotaCharge> {
        match (self.quota_free_units, self.quota_topup_units, self.quota_window_start) {
            (Some(free_units), Some(topup_units), Some(window_start)) => Some(QuotaCharge {
                free_units,
                topup_units,
                window_start,
            }),
            _ => None,
        }
    }

    pub fn into_sale(self, items: Vec<SaleItem>) -> Sale {
        let quota_charge = self.quota_charge();
        let refund = self.refunded_at.map(|refunded_at| RefundInfo {
            refunded_at,
            refunded_by: self.refunded_by.clone(),
            note: self.refund_note.clone(),
        });

        Sale {
            id: self.id,
            owner_id: self.owner_id,
            code: self.code,
            seq: self.seq,
            status: self.status,
            transacted_on: self.transacted_on,
            transacted_at: self.transacted_at,
            amount: self.amount,
            payment_method: self.payment_method,
            stylist: self.stylist,
            stylist_id: self.stylist_id,
            customer: CustomerSnapshot {
                name: self.customer_name,
                phone: self.customer_phone,
                email: self.customer_email,
                address: self.customer_address,
                visits: self.customer_visits,
                last_visit: self.customer_last_visit,
            },
            operator_name: self.operator_name,
            items,
            quota_charge,
            refund,
            deleted_at: self.deleted_at,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

// =============================================================================
// Repository
// =============================================================================

/// Repository for sale reads.
///
/// Writes happen only inside the units of work in `orders` and `refunds`.
#[derive(Debug, Clone)]
pub struct SaleRepository {
    pool: SqlitePool,
}

impl SaleRepository {
    /// Creates a new SaleRepository.
    pub fn new(pool: SqlitePool) -> Self {
        SaleRepository { pool }
    }

    /// Gets a sale by code, hidden or not.
    pub async fn get_by_code(&self, owner: &OwnerId, code: &str) -> DbResult<Option<Sale>> {
        let row = sqlx::query_as::<_, SaleRow>(&format!(
            "SELECT {SALE_COLUMNS} FROM sales WHERE owner_id = ?1 AND code = ?2"
        ))
        .bind(owner)
        .bind(code.trim())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let mut conn = self.pool.acquire().await?;
                let items = items_in(&mut conn, &row.id).await?;
                Ok(Some(row.into_sale(items)))
            }
            None => Ok(None),
        }
    }

    /// Lists sales, newest first.
    ///
    /// ## Behavior
    /// - Unbounded range: the `limit` most recent
    /// - Bounded range: every sale whose business date is in range
    /// - Hidden (refunded-and-hidden) sales only with `include_hidden`
    pub async fn list(
        &self,
        owner: &OwnerId,
        range: &DateRange,
        include_hidden: bool,
        limit: i64,
    ) -> DbResult<Vec<Sale>> {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {SALE_COLUMNS} FROM sales WHERE owner_id = "));
        qb.push_bind(owner);

        if !include_hidden {
            qb.push(" AND deleted_at IS NULL");
        }
        if let Some(from) = range.from {
            qb.push(" AND transacted_on >= ").push_bind(from);
        }
        if let Some(to) = range.to {
            qb.push(" AND transacted_on <= ").push_bind(to);
        }
        qb.push(" ORDER BY transacted_at DESC, seq DESC");
        if range.is_unbounded() {
            qb.push(" LIMIT ").push_bind(limit);
        }

        let rows = qb.build_query_as::<SaleRow>().fetch_all(&self.pool).await?;
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let mut items = self.items_for(rows.iter().map(|r| r.id.as_str())).await?;
        let sales = rows
            .into_iter()
            .map(|row| {
                let lines = items.remove(&row.id).unwrap_or_default();
                row.into_sale(lines)
            })
            .collect();

        Ok(sales)
    }

    /// Loads items for many sales in one query, grouped by sale id.
    async fn items_for<'a, I>(&self, sale_ids: I) -> DbResult<HashMap<String, Vec<SaleItem>>>
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut qb: QueryBuilder<Sqlite> =
            QueryBuilder::new(format!("SELECT {ITEM_COLUMNS} FROM sale_items WHERE sale_id IN ("));
        let mut separated = qb.separated(", ");
        for id in sale_ids {
            separated.push_bind(id);
        }
        separated.push_unseparated(") ORDER BY created_at, rowid");

        let rows = qb.build_query_as::<SaleItem>().fetch_all(&self.pool).await?;

        let mut grouped: HashMap<String, Vec<SaleItem>> = HashMap::new();
        for item in rows {
            grouped.entry(item.sale_id.clone()).or_default().push(item);
        }
        Ok(grouped)
    }
}

// =============================================================================
// In-transaction operations
// =============================================================================

/// Inserts the sale header with a freshly allocated code.
///
/// Returns the new row as stored.
pub async fn insert_sale_in(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    input: &NewSale,
    now: DateTime<Utc>,
) -> DbResult<SaleRow> {
    let sql = format!(
        r#"
        INSERT INTO sales (
            id, owner_id, seq, code, status, transacted_on, transacted_at, amount,
            payment_method, stylist, stylist_id, customer_name, customer_phone,
            customer_email, customer_address, customer_visits, customer_last_visit,
            operator_name, created_at, updated_at
        )
        SELECT ?1, ?2, next.seq, 'ORD-' || next.seq, 'paid', ?3, ?4, ?5,
               ?6, ?7, ?8, ?9, ?10,
               ?11, ?12, ?13, ?14,
               ?15, ?4, ?4
        FROM (SELECT MAX(COALESCE(MAX(seq), 0) + 1, ?16) AS seq FROM sales) AS next
        RETURNING {SALE_COLUMNS}
        "#
    );

    let customer = &input.customer;
    let row = sqlx::query_as::<_, SaleRow>(&sql)
        .bind(new_id())
        .bind(owner)
        .bind(now.date_naive())
        .bind(now)
        .bind(input.amount)
        .bind(input.payment_method)
        .bind(input.stylist.as_deref())
        .bind(input.stylist_id.as_deref())
        .bind(customer.name.as_deref())
        .bind(customer.phone.as_deref())
        .bind(customer.email.as_deref())
        .bind(customer.address.as_deref())
        .bind(customer.visits)
        .bind(customer.last_visit.as_deref())
        .bind(input.operator_name.as_deref())
        .bind(now.timestamp_millis())
        .fetch_one(&mut *conn)
        .await?;

    debug!(id = %row.id, code = %row.code, "Sale inserted");
    Ok(row)
}

pub async fn insert_item_in(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    sale_id: &str,
    item: &NewSaleItem,
    now: DateTime<Utc>,
) -> DbResult<SaleItem> {
    let created = sqlx::query_as::<_, SaleItem>(&format!(
        "INSERT INTO sale_items ({ITEM_COLUMNS}) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9) \
         RETURNING {ITEM_COLUMNS}"
    ))
    .bind(new_id())
    .bind(sale_id)
    .bind(owner)
    .bind(item.product_id.as_deref())
    .bind(item.name.trim())
    .bind(item.category.as_deref())
    .bind(item.unit_price)
    .bind(item.quantity)
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    Ok(created)
}

pub async fn items_in(conn: &mut SqliteConnection, sale_id: &str) -> DbResult<Vec<SaleItem>> {
    let items = sqlx::query_as::<_, SaleItem>(&format!(
        "SELECT {ITEM_COLUMNS} FROM sale_items WHERE sale_id = ?1 ORDER BY created_at, rowid"
    ))
    .bind(sale_id)
    .fetch_all(&mut *conn)
    .await?;

    Ok(items)
}

pub async fn record_quota_charge_in(
    conn: &mut SqliteConnection,
    sale_id: &str,
    charge: &QuotaCharge,
) -> DbResult<()> {
    sqlx::query(
        r#"
        UPDATE sales SET quota_free_units = ?2, quota_topup_units = ?3, quota_window_start = ?4
        WHERE id = ?1
        "#,
    )
    .bind(sale_id)
    .bind(charge.free_units)
    .bind(charge.topup_units)
    .bind(charge.window_start)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Locks a sale by code for the rest of the transaction.
///
/// ## Errors
/// `NotFound` if no sale of `owner` has this code.
pub async fn lock_by_code_in(conn: &mut SqliteConnection, owner: &OwnerId, code: &str) -> DbResult<SaleRow> {
    let row = sqlx::query_as::<_, SaleRow>(&format!(
        "UPDATE sales SET updated_at = updated_at \
         WHERE owner_id = ?1 AND code = ?2 \
         RETURNING {SALE_COLUMNS}"
    ))
    .bind(owner)
    .bind(code.trim())
    .fetch_optional(&mut *conn)
    .await?;

    row.ok_or_else(|| DbError::not_found("Sale", code.trim()))
}

/// Flips a sale to refunded and stamps the refund metadata.
pub async fn mark_refunded_in(
    conn: &mut SqliteConnection,
    sale_id: &str,
    refunded_by: Option<&str>,
    note: Option<&str>,
    hide: bool,
    now: DateTime<Utc>,
) -> DbResult<SaleRow> {
    let row = sqlx::query_as::<_, SaleRow>(&format!(
        "UPDATE sales SET \
             status = 'refunded', \
             refunded_at = ?2, \
             refunded_by = ?3, \
             refund_note = ?4, \
             deleted_at = CASE WHEN ?5 THEN ?2 ELSE deleted_at END, \
             updated_at = ?2 \
         WHERE id = ?1 AND status = 'paid' \
         RETURNING {SALE_COLUMNS}"
    ))
    .bind(sale_id)
    .bind(now)
    .bind(refunded_by)
    .bind(note)
    .bind(hide)
    .fetch_optional(&mut *conn)
    .await?;

    row.ok_or_else(|| DbError::invalid_state("Sale", sale_id, "is not paid"))
}

/// Flips a refunded sale back to paid, clears refund metadata, unhides it.
pub async fn mark_paid_in(conn: &mut SqliteConnection, sale_id: &str, now: DateTime<Utc>) -> DbResult<SaleRow> {
    let row = sqlx::query_as::<_, SaleRow>(&format!(
        "UPDATE sales SET \
             status = 'paid', \
             refunded_at = NULL, \
             refunded_by = NULL, \
             refund_note = NULL, \
             deleted_at = NULL, \
             updated_at = ?2 \
         WHERE id = ?1 AND status = 'refunded' \
         RETURNING {SALE_COLUMNS}"
    ))
    .bind(sale_id)
    .bind(now)
    .fetch_optional(&mut *conn)
    .await?;

    row.ok_or_else(|| DbError::invalid_state("Sale", sale_id, "is not refunded"))
}
