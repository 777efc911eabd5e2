//! # Repository Module
//!
//! One repository per ledger.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Two kinds of entry points                                              │
//! │                                                                         │
//! │  SaleRepository::list(&self, ..)       reads and single-ledger writes  │
//! │       └── runs on the pool                                             │
//! │                                                                         │
//! │  sale::lock_by_code_in(conn, ..)       steps of a larger unit of work  │
//! │       └── runs on the caller's transaction connection                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`finance::FinanceRepository`] - Revenue and expense entries
//! - [`membership::MembershipRepository`] - Quota state and top-ups
//! - [`product::ProductRepository`] - Catalog rows read by stock sync
//! - [`sale::SaleRepository`] - Sale headers and lines
//! - [`staff::StaffRepository`] - Employee lookup for owner resolution
//! - [`stock::StockRepository`] - Stock rows and their history

pub mod finance;
pub mod membership;
pub mod product;
pub mod sale;
pub mod staff;
pub mod stock;
