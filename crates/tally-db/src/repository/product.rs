//! # Product Repository
//!
//! Catalog access. The catalog is owned by the product screens of the
//! back-office; the ledgers only read it, mainly through the stock sync.
//!
//! ## What the Ledgers Read
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  products                                                              │
//! │  ├── track_stock      → should a stock row exist?                      │
//! │  ├── initial_stock    → opening quantity of a new stock row            │
//! │  ├── name / category  → copied onto the stock row                      │
//! │  └── deleted_at       → deleted products lose their stock row          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::{DbError, DbResult};
use tally_core::{OwnerId, Product};

const PRODUCT_COLUMNS: &str =
    "id, owner_id, name, category, price, track_stock, initial_stock, created_at, updated_at, deleted_at";

/// Repository for product database operations.
#[derive(Debug, Clone)]
pub struct ProductRepository {
    pool: SqlitePool,
}

impl ProductRepository {
    /// Creates a new ProductRepository.
    pub fn new(pool: SqlitePool) -> Self {
        ProductRepository { pool }
    }

    /// Gets a live product by ID.
    pub async fn get(&self, owner: &OwnerId, id: &str) -> DbResult<Option<Product>> {
        let product = sqlx::query_as::<_, Product>(&format!(
            "SELECT {PRODUCT_COLUMNS} FROM products \
             WHERE id = ?1 AND owner_id = ?2 AND deleted_at IS NULL"
        ))
        .bind(id)
        .bind(owner)
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    /// Inserts a product.
    ///
    /// ## Returns
    /// * `Err(DbError::UniqueViolation)` - ID already exists
    pub async fn insert(&self, product: &Product) -> DbResult<Product> {
        debug!(id = %product.id, name = %product.name, "Inserting product");

        sqlx::query(
            r#"
            INSERT INTO products (
                id, owner_id, name, category, price,
                track_stock, initial_stock, created_at, updated_at, deleted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
        )
        .bind(&product.id)
        .bind(&product.owner_id)
        .bind(&product.name)
        .bind(&product.category)
        .bind(product.price)
        .bind(product.track_stock)
        .bind(product.initial_stock)
        .bind(product.created_at)
        .bind(product.updated_at)
        .bind(product.deleted_at)
        .execute(&self.pool)
        .await?;

        Ok(product.clone())
    }

    /// Updates name, category, price and tracking of a product.
    ///
    /// ## Returns
    /// * `Err(DbError::NotFound)` - Product doesn't exist for this owner
    pub async fn update(&self, product: &Product, now: DateTime<Utc>) -> DbResult<()> {
        debug!(id = %product.id, "Updating product");

        let result = sqlx::query(
            r#"
            UPDATE products SET
                name = ?3,
                category = ?4,
                price = ?5,
                track_stock = ?6,
                updated_at = ?7
            WHERE id = ?1 AND owner_id = ?2
            "#,
        )
        .bind(&product.id)
        .bind(&product.owner_id)
        .bind(&product.name)
        .bind(&product.category)
        .bind(product.price)
        .bind(product.track_stock)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", &product.id));
        }

        Ok(())
    }

    /// Soft-deletes a product.
    ///
    /// ## Why Soft Delete?
    /// - Historical sales still reference this product
    /// - The next stock sync retires its stock row instead of losing history
    pub async fn soft_delete(&self, owner: &OwnerId, id: &str, now: DateTime<Utc>) -> DbResult<()> {
        debug!(id = %id, "Soft-deleting product");

        let result = sqlx::query(
            r#"
            UPDATE products SET deleted_at = ?3, updated_at = ?3
            WHERE id = ?1 AND owner_id = ?2 AND deleted_at IS NULL
            "#,
        )
        .bind(id)
        .bind(owner)
        .bind(now)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("Product", id));
        }

        Ok(())
    }

    /// Owners with at least one catalog product, deleted or not.
    ///
    /// Owners whose products were all deleted still need a sync to retire
    /// their stock rows.
    pub async fn owners(&self) -> DbResult<Vec<OwnerId>> {
        let owners: Vec<OwnerId> =
            sqlx::query_scalar("SELECT DISTINCT owner_id FROM products ORDER BY owner_id")
                .fetch_all(&self.pool)
                .await?;

        Ok(owners)
    }

    /// Counts live products of an owner (for diagnostics).
    pub async fn count(&self, owner: &OwnerId) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM products WHERE owner_id = ?1 AND deleted_at IS NULL",
        )
        .bind(owner)
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};
    use crate::test_support::insert_product;

    #[tokio::test]
    async fn test_owners_and_count() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let a = OwnerId::from("manager-a");
        let b = OwnerId::from("manager-b");

        insert_product(&db, &a, "p-1", "Pomade", true, 1).await;
        insert_product(&db, &a, "p-2", "Wax", false, 0).await;
        insert_product(&db, &b, "p-3", "Shampoo", true, 3).await;

        assert_eq!(db.products().owners().await.unwrap(), vec![a.clone(), b.clone()]);
        assert_eq!(db.products().count(&a).await.unwrap(), 2);

        db.products().soft_delete(&a, "p-2", Utc::now()).await.unwrap();
        assert_eq!(db.products().count(&a).await.unwrap(), 1);
        assert!(db.products().get(&a, "p-2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_foreign_owner_cannot_touch_product() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let a = OwnerId::from("manager-a");
        insert_product(&db, &a, "p-1", "Pomade", true, 1).await;

        let b = OwnerId::from("manager-b");
        assert!(db.products().get(&b, "p-1").await.unwrap().is_none());
        let err = db.products().soft_delete(&b, "p-1", Utc::now()).await.unwrap_err();
        assert!(err.is_not_found());
    }
}
