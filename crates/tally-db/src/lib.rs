//! # tally-db: Transactional Ledgers on SQLite
//!
//! Persistence and the multi-ledger units of work for the back office.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  tally-backoffice services (validation, roles, owner resolution)       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     tally-db (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   OrderManager ──┐                      ┌── SaleRepository      │   │
//! │  │   RefundWorkflow ┴─► unit::apply_effects ├── StockRepository     │   │
//! │  │                                          ├── MembershipRepository│   │
//! │  │   Database (pool.rs)                     ├── FinanceRepository   │   │
//! │  │   migrations (embedded)                  └── Staff / Product     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite (one file, WAL)                                                 │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`pool`] - Connection pool creation and configuration
//! - [`migrations`] - Embedded database migrations
//! - [`error`] - Database error types
//! - [`repository`] - Per-ledger reads and the `*_in` writers used inside units
//! - [`unit`] - Side effects applied on a transaction's connection
//! - [`orders`] - Sale creation
//! - [`refunds`] - Refund and undo-refund
//!
//! ## Usage
//!
//! ```rust,ignore
//! use tally_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("path/to/tally.db")).await?;
//! let sale = db.orders(policy).create(&owner, &input, Utc::now()).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod orders;
pub mod pool;
pub mod refunds;
pub mod repository;
pub mod unit;

#[cfg(test)]
pub(crate) mod test_support;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use orders::OrderManager;
pub use pool::{Database, DbConfig};
pub use refunds::{RefundOptions, RefundWorkflow};
pub use unit::{EffectOutcome, SideEffect, UnitContext};

// Repository re-exports for convenience
pub use repository::finance::FinanceRepository;
pub use repository::membership::MembershipRepository;
pub use repository::product::ProductRepository;
pub use repository::sale::SaleRepository;
pub use repository::staff::StaffRepository;
pub use repository::stock::{StockRepository, SyncReport};
