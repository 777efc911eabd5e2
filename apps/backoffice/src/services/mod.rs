//! Back-office service implementations.
//!
//! Each service holds the shared [`crate::AppState`] and takes the calling
//! [`tally_core::Actor`] on every operation.

pub mod finance_service;
pub mod membership_service;
pub mod order_service;
pub mod refund_service;
pub mod stock_service;

pub use finance_service::FinanceService;
pub use membership_service::MembershipService;
pub use order_service::OrderService;
pub use refund_service::{RefundRequest, RefundService};
pub use stock_service::{StockAdjustment, StockService};
