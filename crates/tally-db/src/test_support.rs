//! Fixtures shared by the unit tests of this crate.

use chrono::Utc;

use crate::pool::Database;
use tally_core::{Money, NewSale, NewSaleItem, OwnerId, PaymentMethod, Product};

/// Inserts a catalog product for `owner`.
pub async fn insert_product(db: &Database, owner: &OwnerId, id: &str, name: &str, track_stock: bool, initial_stock: i64) {
    let now = Utc::now();
    db.products()
        .insert(&Product {
            id: id.to_string(),
            owner_id: owner.clone(),
            name: name.to_string(),
            category: Some("Retail".to_string()),
            price: Money::from_minor(25_000),
            track_stock,
            initial_stock,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
        .await
        .unwrap();
}

/// Rewrites a product's name, tracking flag and deletion mark in place.
pub async fn set_product(db: &Database, id: &str, name: &str, track_stock: bool, deleted: bool) {
    let now = Utc::now();
    let deleted_at = if deleted { Some(now) } else { None };
    sqlx::query("UPDATE products SET name = ?2, track_stock = ?3, deleted_at = ?4, updated_at = ?5 WHERE id = ?1")
        .bind(id)
        .bind(name)
        .bind(track_stock)
        .bind(deleted_at)
        .bind(now)
        .execute(db.pool())
        .await
        .unwrap();
}

/// A cash sale with one line per `(product_id, quantity)` pair.
pub fn new_sale(lines: &[(Option<&str>, i64)]) -> NewSale {
    NewSale {
        payment_method: PaymentMethod::Cash,
        amount: Money::from_minor(50_000),
        stylist: Some("Dimas".to_string()),
        stylist_id: None,
        customer: Default::default(),
        operator_name: Some("Front desk".to_string()),
        items: lines
            .iter()
            .map(|(product_id, quantity)| NewSaleItem {
                product_id: product_id.map(str::to_string),
                name: "Line".to_string(),
                category: None,
                unit_price: Money::from_minor(25_000),
                quantity: *quantity,
            })
            .collect(),
    }
}
