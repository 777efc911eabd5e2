//! # Domain Types
//!
//! Core domain types used throughout the Tally back-office.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │      Sale       │   │    SaleItem     │   │  FinanceEntry   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (UUID)      │   │  id (UUID)      │   │  id (UUID)      │       │
//! │  │  code ORD-<seq> │   │  sale_id (FK)   │   │  kind           │       │
//! │  │  status         │   │  name snapshot  │   │  sale_id / code │       │
//! │  │  amount         │   │  unit_price     │   │  amount         │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    OwnerId      │   │   SaleStatus    │   │ PaymentMethod   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  tenant scope   │   │  Paid           │   │  Cash  Card     │       │
//! │  │  of every row   │   │  Refunded       │   │  Qris  Transfer │       │
//! │  └─────────────────┘   └─────────────────┘   └─────────────────┘       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Stock types live in [`crate::stock`], membership types in [`crate::quota`].
//!
//! ## Dual-Key Identity Pattern
//! Every sale has:
//! - `id`: UUID v4, used for relations (items, finance links)
//! - `code`: `ORD-<seq>`, human-readable, what cashiers and managers type

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;

use crate::error::ValidationError;
use crate::money::Money;
use crate::quota::QuotaCharge;

/// Generates a new entity identifier (UUID v4, hyphenated).
pub fn new_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

// =============================================================================
// Owner
// =============================================================================

/// The tenant scope of a record: the manager account that owns it.
///
/// Every ledger row carries one and every query filters by it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(transparent))]
#[ts(export)]
pub struct OwnerId(String);

impl OwnerId {
    pub fn new(id: impl Into<String>) -> Self {
        OwnerId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for OwnerId {
    fn from(id: &str) -> Self {
        OwnerId(id.to_string())
    }
}

// =============================================================================
// Actor
// =============================================================================

/// Role of the authenticated user calling a back-office operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum ActorRole {
    Admin,
    Manager,
    Staff,
}

impl ActorRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActorRole::Admin => "admin",
            ActorRole::Manager => "manager",
            ActorRole::Staff => "staff",
        }
    }
}

impl fmt::Display for ActorRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated caller, as handed over by the HTTP layer.
///
/// Managers and admins own their data directly. Staff act on behalf of the
/// manager recorded on their employee row, found by email.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Actor {
    pub user_id: String,
    pub role: ActorRole,
    pub email: Option<String>,
    /// Display name, recorded as the operator of sales and refunds.
    pub name: Option<String>,
}

impl Actor {
    /// Manager-level privileges: refunds, top-ups, quota overrides.
    pub fn is_manager(&self) -> bool {
        matches!(self.role, ActorRole::Admin | ActorRole::Manager)
    }

    /// Name to stamp on records this actor creates.
    pub fn display_name(&self) -> &str {
        self.name
            .as_deref()
            .filter(|n| !n.trim().is_empty())
            .or(self.email.as_deref())
            .unwrap_or(&self.user_id)
    }
}

// =============================================================================
// Sale Status
// =============================================================================

/// The status of a sale. Refund flips `Paid → Refunded`, undo flips it back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    Paid,
    Refunded,
}

impl SaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Paid => "paid",
            SaleStatus::Refunded => "refunded",
        }
    }
}

impl Default for SaleStatus {
    fn default() -> Self {
        SaleStatus::Paid
    }
}

impl fmt::Display for SaleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Payment Method
// =============================================================================

#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    /// Debit or credit card on an external terminal.
    Card,
    /// QR payment (QRIS).
    Qris,
    /// Bank transfer.
    Transfer,
}

impl PaymentMethod {
    pub const ALL: [&'static str; 4] = ["cash", "card", "qris", "transfer"];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "cash",
            PaymentMethod::Card => "card",
            PaymentMethod::Qris => "qris",
            PaymentMethod::Transfer => "transfer",
        }
    }
}

impl FromStr for PaymentMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cash" => Ok(PaymentMethod::Cash),
            "card" | "debit" | "credit" => Ok(PaymentMethod::Card),
            "qris" | "qr" => Ok(PaymentMethod::Qris),
            "transfer" | "bank" => Ok(PaymentMethod::Transfer),
            _ => Err(ValidationError::NotAllowed {
                field: "payment_method".to_string(),
                allowed: PaymentMethod::ALL.iter().map(|s| s.to_string()).collect(),
            }),
        }
    }
}

// =============================================================================
// Customer Snapshot
// =============================================================================

/// Customer details frozen onto the sale at checkout.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CustomerSnapshot {
    pub name: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    /// Visit count at the time of the sale.
    pub visits: Option<i64>,
    pub last_visit: Option<String>,
}

impl CustomerSnapshot {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.phone.is_none()
            && self.email.is_none()
            && self.address.is_none()
            && self.visits.is_none()
            && self.last_visit.is_none()
    }
}

// =============================================================================
// Sale Item
// =============================================================================

/// A line item in a sale.
/// Uses snapshot pattern to freeze product data at time of sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct SaleItem {
    pub id: String,
    pub sale_id: String,
    pub owner_id: OwnerId,
    /// Catalog product, when the line is a product rather than a service.
    pub product_id: Option<String>,
    /// Name at time of sale (frozen).
    pub name: String,
    pub category: Option<String>,
    /// Unit price at time of sale (frozen).
    pub unit_price: Money,
    pub quantity: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl SaleItem {
    /// Returns unit price × quantity.
    #[inline]
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply_quantity(self.quantity)
    }
}

/// A line of a sale being created.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewSaleItem {
    pub product_id: Option<String>,
    pub name: String,
    pub category: Option<String>,
    pub unit_price: Money,
    pub quantity: i64,
}

// =============================================================================
// Sale
// =============================================================================

/// Who refunded a sale, when, and why.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RefundInfo {
    #[ts(as = "String")]
    pub refunded_at: DateTime<Utc>,
    pub refunded_by: Option<String>,
    pub note: Option<String>,
}

/// A persisted sale with its lines.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Sale {
    pub id: String,
    pub owner_id: OwnerId,
    /// `ORD-<seq>`, unique across all owners.
    pub code: String,
    pub seq: i64,
    pub status: SaleStatus,
    /// Business date of the sale (what date filters apply to).
    #[ts(as = "String")]
    pub transacted_on: NaiveDate,
    #[ts(as = "String")]
    pub transacted_at: DateTime<Utc>,
    pub amount: Money,
    pub payment_method: PaymentMethod,
    pub stylist: Option<String>,
    pub stylist_id: Option<String>,
    pub customer: CustomerSnapshot,
    pub operator_name: Option<String>,
    pub items: Vec<SaleItem>,
    /// How the sale's membership consumption was split between pools.
    pub quota_charge: Option<QuotaCharge>,
    pub refund: Option<RefundInfo>,
    /// Set when the sale was hidden from default listings.
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl Sale {
    pub fn is_refunded(&self) -> bool {
        self.status == SaleStatus::Refunded
    }

    pub fn is_hidden(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// Sum of line quantities.
    pub fn total_quantity(&self) -> i64 {
        self.items.iter().map(|i| i.quantity).sum()
    }
}

/// Input for creating a sale.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewSale {
    pub payment_method: PaymentMethod,
    /// Total charged. Taken as given; the POS already applied discounts.
    pub amount: Money,
    pub stylist: Option<String>,
    pub stylist_id: Option<String>,
    #[serde(default)]
    pub customer: CustomerSnapshot,
    pub operator_name: Option<String>,
    pub items: Vec<NewSaleItem>,
}

// =============================================================================
// Finance
// =============================================================================

/// Direction of a finance entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::Type))]
#[cfg_attr(feature = "sqlx", sqlx(rename_all = "lowercase"))]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum FinanceKind {
    Revenue,
    Expense,
}

impl FinanceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinanceKind::Revenue => "revenue",
            FinanceKind::Expense => "expense",
        }
    }
}

/// A revenue or expense line in the finance ledger.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct FinanceEntry {
    pub id: String,
    pub owner_id: OwnerId,
    pub title: String,
    /// Always non-negative; `kind` carries the direction.
    pub amount: Money,
    pub category: String,
    #[ts(as = "String")]
    pub entry_date: NaiveDate,
    pub kind: FinanceKind,
    pub note: Option<String>,
    /// The sale this entry accounts for, if any.
    pub sale_id: Option<String>,
    pub sale_code: Option<String>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Input for recording a finance entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewFinanceEntry {
    pub title: String,
    pub amount: Money,
    pub category: String,
    #[ts(as = "String")]
    pub entry_date: NaiveDate,
    pub kind: FinanceKind,
    pub note: Option<String>,
    pub sale_id: Option<String>,
    pub sale_code: Option<String>,
}

impl NewFinanceEntry {
    /// The compensating expense written when a sale is refunded.
    pub fn refund_of(sale: &Sale, entry_date: NaiveDate, note: Option<String>) -> Self {
        NewFinanceEntry {
            title: format!("Refund {}", sale.code),
            amount: sale.amount,
            category: crate::REFUND_CATEGORY.to_string(),
            entry_date,
            kind: FinanceKind::Expense,
            note,
            sale_id: Some(sale.id.clone()),
            sale_code: Some(sale.code.clone()),
        }
    }
}

// =============================================================================
// Catalog and Staff (read-only collaborators)
// =============================================================================

/// A catalog product, as the stock sync sees it.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct Product {
    pub id: String,
    pub owner_id: OwnerId,
    pub name: String,
    pub category: Option<String>,
    pub price: Money,
    /// Whether a stock row should exist for this product.
    pub track_stock: bool,
    /// Quantity a newly created stock row starts with.
    pub initial_stock: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
    #[ts(as = "Option<String>")]
    pub deleted_at: Option<DateTime<Utc>>,
}

/// An employee row; `owner_id` is the manager the employee works for.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StaffMember {
    pub id: String,
    pub owner_id: Option<OwnerId>,
    pub name: String,
    pub email: String,
    pub active: bool,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

// =============================================================================
// Date Range
// =============================================================================

/// Inclusive business-date filter. Either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DateRange {
    #[ts(as = "Option<String>")]
    pub from: Option<NaiveDate>,
    #[ts(as = "Option<String>")]
    pub to: Option<NaiveDate>,
}

impl DateRange {
    pub fn new(from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        DateRange { from, to }
    }

    pub fn is_unbounded(&self) -> bool {
        self.from.is_none() && self.to.is_none()
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.from.map_or(true, |f| date >= f) && self.to.map_or(true, |t| date <= t)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_payment_method_parsing() {
        assert_eq!("cash".parse::<PaymentMethod>().unwrap(), PaymentMethod::Cash);
        assert_eq!(" Debit ".parse::<PaymentMethod>().unwrap(), PaymentMethod::Card);
        assert_eq!("QRIS".parse::<PaymentMethod>().unwrap(), PaymentMethod::Qris);
        assert!("cheque".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn test_sale_status_serialization() {
        let json = serde_json::to_string(&SaleStatus::Refunded).unwrap();
        assert_eq!(json, "\"refunded\"");
        assert_eq!(SaleStatus::default(), SaleStatus::Paid);
    }

    #[test]
    fn test_actor_privileges() {
        let mut actor = Actor {
            user_id: "u-1".to_string(),
            role: ActorRole::Staff,
            email: Some("ana@shop.test".to_string()),
            name: None,
        };
        assert!(!actor.is_manager());
        assert_eq!(actor.display_name(), "ana@shop.test");

        actor.role = ActorRole::Admin;
        assert!(actor.is_manager());
        actor.role = ActorRole::Manager;
        assert!(actor.is_manager());
    }

    #[test]
    fn test_line_total() {
        let item = SaleItem {
            id: new_id(),
            sale_id: new_id(),
            owner_id: OwnerId::from("m-1"),
            product_id: None,
            name: "Haircut".to_string(),
            category: None,
            unit_price: Money::from_minor(50_000),
            quantity: 2,
            created_at: Utc::now(),
        };
        assert_eq!(item.line_total(), Money::from_minor(100_000));
    }

    #[test]
    fn test_date_range_contains_is_inclusive() {
        let range = DateRange::new(Some(date(2024, 3, 1)), Some(date(2024, 3, 31)));
        assert!(range.contains(date(2024, 3, 1)));
        assert!(range.contains(date(2024, 3, 31)));
        assert!(!range.contains(date(2024, 4, 1)));

        let open = DateRange::default();
        assert!(open.is_unbounded());
        assert!(open.contains(date(1999, 1, 1)));
    }

    #[test]
    fn test_customer_snapshot_empty() {
        assert!(CustomerSnapshot::default().is_empty());
        let c = CustomerSnapshot {
            phone: Some("0812".to_string()),
            ..Default::default()
        };
        assert!(!c.is_empty());
    }
}
