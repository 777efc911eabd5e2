//! # tally-core: Pure Business Logic for the Tally Back-Office
//!
//! This crate holds every rule of the back-office ledgers that can be
//! expressed without touching storage: domain types, quota arithmetic,
//! stock delta resolution and boundary validation.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Tally Back-Office Architecture                     │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 HTTP layer (outside this workspace)             │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ Actor + request                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    apps/backoffice                              │   │
//! │  │    owner resolution, validation, deadlines, error taxonomy      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ tally-core (THIS CRATE) ★                       │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │   quota   │  │   stock   │  │ validation│  │   │
//! │  │   │   Sale    │  │ consume   │  │  deltas   │  │   rules   │  │   │
//! │  │   │  Finance  │  │ restore   │  │  clamp    │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO CLOCK • PURE FUNCTIONS             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    tally-db (Database Layer)                    │   │
//! │  │         SQLite ledgers, sale and refund units of work           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Sale, SaleItem, FinanceEntry, OwnerId, Actor
//! - [`money`] - Integer money in minor units
//! - [`quota`] - Membership quota pools and their arithmetic
//! - [`stock`] - Stock rows, movement tags, delta resolution
//! - [`error`] - Domain error types
//! - [`validation`] - Boundary validation
//!
//! ## Example Usage
//!
//! ```rust
//! use tally_core::stock::{plan_adjustment, StockMovement};
//!
//! // A recount to 4 when 10 are on the shelf.
//! let change = plan_adjustment(&StockMovement::Recount, 4, 10);
//! assert_eq!(change.delta, -6);
//! assert_eq!(change.remaining, 4);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod money;
pub mod quota;
pub mod stock;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use quota::{MembershipState, MembershipTopup, NewTopup, QuotaCharge, QuotaPolicy, QuotaSnapshot};
pub use stock::{StockChange, StockHistoryEntry, StockMovement, StockRow};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Free membership units per calendar month.
pub const DEFAULT_FREE_QUOTA_MONTHLY: i64 = 1000;

/// Rows returned by `ListSales` when no date range is given.
pub const DEFAULT_LIST_LIMIT: i64 = 200;

/// Finance category of the compensating entry written by a refund.
pub const REFUND_CATEGORY: &str = "Refund";

/// Maximum lines in a single sale.
pub const MAX_ORDER_LINES: usize = 100;

/// Maximum quantity on a single line
///
/// ## Business Reason
/// Catches typos such as 1000 instead of 10 before they drain stock.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Maximum length of refund, adjustment and top-up notes.
pub const MAX_NOTE_LENGTH: usize = 500;
