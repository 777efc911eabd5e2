//! Fixtures shared by the service tests.

use std::sync::Arc;

use chrono::Utc;

use crate::config::BackofficeConfig;
use crate::state::AppState;
use tally_core::{
    new_id, Actor, ActorRole, Money, NewSale, NewSaleItem, OwnerId, PaymentMethod, Product, StaffMember,
};
use tally_db::{Database, DbConfig};

pub async fn state_with(config: BackofficeConfig) -> Arc<AppState> {
    let db = Database::new(DbConfig::in_memory()).await.unwrap();
    AppState::new(db, config)
}

pub async fn state() -> Arc<AppState> {
    state_with(BackofficeConfig::default()).await
}

pub fn manager(user_id: &str) -> Actor {
    Actor {
        user_id: user_id.to_string(),
        role: ActorRole::Manager,
        email: Some(format!("{}@shop.test", user_id)),
        name: Some("Rina".to_string()),
    }
}

pub fn staff(email: &str) -> Actor {
    Actor {
        user_id: new_id(),
        role: ActorRole::Staff,
        email: Some(email.to_string()),
        name: Some("Ana".to_string()),
    }
}

pub async fn insert_staff(db: &Database, email: &str, owner: Option<&str>) {
    db.staff()
        .insert(&StaffMember {
            id: new_id(),
            owner_id: owner.map(OwnerId::from),
            name: "Ana".to_string(),
            email: email.to_string(),
            active: true,
            created_at: Utc::now(),
        })
        .await
        .unwrap();
}

pub async fn insert_product(db: &Database, owner: &str, id: &str, initial_stock: i64) {
    let now = Utc::now();
    db.products()
        .insert(&Product {
            id: id.to_string(),
            owner_id: OwnerId::from(owner),
            name: format!("Product {}", id),
            category: Some("Retail".to_string()),
            price: Money::from_minor(25_000),
            track_stock: true,
            initial_stock,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
        .await
        .unwrap();
}

/// A cash sale with one line per `(product_id, quantity)` pair.
pub fn sale_input(lines: &[(Option<&str>, i64)]) -> NewSale {
    NewSale {
        payment_method: PaymentMethod::Cash,
        amount: Money::from_minor(50_000),
        stylist: None,
        stylist_id: None,
        customer: Default::default(),
        operator_name: None,
        items: lines
            .iter()
            .map(|(product_id, quantity)| NewSaleItem {
                product_id: product_id.map(str::to_string),
                name: "Haircut".to_string(),
                category: None,
                unit_price: Money::from_minor(25_000),
                quantity: *quantity,
            })
            .collect(),
    }
}
