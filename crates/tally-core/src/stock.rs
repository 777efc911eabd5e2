//! # Stock
//!
//! Stock rows, movement tags and the delta arithmetic behind every change.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  adjust(type, input, current)                                          │
//! │                                                                         │
//! │    "reduce"   →  delta = −|input|                                      │
//! │    "recount"  →  delta = max(input, 0) − current                       │
//! │    otherwise  →  delta = input                                         │
//! │                                                                         │
//! │    remaining  = max(current + delta, 0)        (never below zero)      │
//! │    history   += (delta as requested, remaining, type)                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use ts_rs::TS;

use crate::types::OwnerId;

// =============================================================================
// Movement
// =============================================================================

/// Why a stock quantity changed. Stored as a lowercase tag.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum StockMovement {
    Sale,
    Refund,
    /// Manual change by the given delta.
    Adjust,
    /// Manual decrease; the sign of the input is ignored.
    Reduce,
    /// Manual count; the input is the new absolute quantity.
    Recount,
    /// Row created from the product catalog.
    CatalogSync,
    /// Any other caller-supplied tag, kept verbatim.
    Other(String),
}

impl StockMovement {
    /// Parses a caller-supplied tag. Blank means `Adjust`.
    pub fn parse(tag: &str) -> Self {
        let tag = tag.trim().to_ascii_lowercase();
        match tag.as_str() {
            "" | "adjust" | "manual-adjust" => StockMovement::Adjust,
            "sale" => StockMovement::Sale,
            "refund" => StockMovement::Refund,
            "reduce" => StockMovement::Reduce,
            "recount" => StockMovement::Recount,
            "catalog-sync" => StockMovement::CatalogSync,
            _ => StockMovement::Other(tag),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            StockMovement::Sale => "sale",
            StockMovement::Refund => "refund",
            StockMovement::Adjust => "adjust",
            StockMovement::Reduce => "reduce",
            StockMovement::Recount => "recount",
            StockMovement::CatalogSync => "catalog-sync",
            StockMovement::Other(tag) => tag,
        }
    }

    /// Turns the caller's input into a signed delta against `current`.
    pub fn resolve_delta(&self, input: i64, current: i64) -> i64 {
        match self {
            StockMovement::Reduce => -input.saturating_abs(),
            StockMovement::Recount => input.max(0) - current,
            _ => input,
        }
    }
}

impl fmt::Display for StockMovement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<StockMovement> for String {
    fn from(m: StockMovement) -> Self {
        m.as_str().to_string()
    }
}

impl From<String> for StockMovement {
    fn from(tag: String) -> Self {
        StockMovement::parse(&tag)
    }
}

// =============================================================================
// Change
// =============================================================================

/// Outcome of applying a delta to a quantity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct StockChange {
    /// The delta as requested, recorded in history even when clamped.
    pub delta: i64,
    /// Quantity after the change.
    pub remaining: i64,
}

/// Applies `delta` to `current`, clamping at zero.
pub fn apply_delta(current: i64, delta: i64) -> StockChange {
    StockChange {
        delta,
        remaining: current.saturating_add(delta).max(0),
    }
}

/// Resolves a manual adjustment and applies it.
pub fn plan_adjustment(movement: &StockMovement, input: i64, current: i64) -> StockChange {
    apply_delta(current, movement.resolve_delta(input, current))
}

// =============================================================================
// Rows
// =============================================================================

/// Current quantity of one stock item.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockRow {
    pub id: String,
    pub owner_id: OwnerId,
    /// At most one live row per product.
    pub product_id: Option<String>,
    pub name: String,
    pub category: Option<String>,
    pub quantity: i64,
    /// Number of changes applied to this row.
    pub adjustments: i64,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// One append-only line of stock history.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct StockHistoryEntry {
    pub id: String,
    pub owner_id: OwnerId,
    pub stock_id: String,
    pub delta: i64,
    pub remaining: i64,
    pub note: Option<String>,
    /// Movement tag, see [`StockMovement`].
    pub kind: String,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

impl StockHistoryEntry {
    pub fn movement(&self) -> StockMovement {
        StockMovement::parse(&self.kind)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
