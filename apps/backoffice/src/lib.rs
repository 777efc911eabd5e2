//! # Tally Back-Office
//!
//! Service facade over the transactional core, consumed by an HTTP layer
//! that lives elsewhere.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Back-Office Services                              │
//! │                                                                         │
//! │  ┌────────────────┐  ┌────────────────┐  ┌────────────────────────────┐│
//! │  │  OrderService  │  │ RefundService  │  │  StockService              ││
//! │  │                │  │                │  │                            ││
//! │  │ • create_sale  │  │ • refund_sale  │  │ • adjust / list / history  ││
//! │  │ • list_sales   │  │ • undo_refund  │  │ • sync_from_products       ││
//! │  │ • get_sale     │  │  (managers)    │  │                            ││
//! │  └────────────────┘  └────────────────┘  └────────────────────────────┘│
//! │                                                                         │
//! │  ┌────────────────────┐  ┌────────────────┐                            │
//! │  │ MembershipService  │  │ FinanceService │                            │
//! │  │                    │  │                │                            │
//! │  │ • quota_state      │  │ • record_entry │                            │
//! │  │ • set_used_quota   │  │ • list_entries │                            │
//! │  │ • create_topup     │  │                │                            │
//! │  └────────────────────┘  └────────────────┘                            │
//! │                                                                         │
//! │  Every call: Actor ──► owner resolution ──► validation ──► deadline    │
//! │              ──► tally-db unit of work ──► ServiceError taxonomy       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration
//! See [`config::BackofficeConfig`]. Environment variables:
//! - `TALLY_CONFIG` - Path to a TOML file (default: `./backoffice.toml`)
//! - `TALLY_DATABASE_PATH` - SQLite file
//! - `TALLY_OPERATION_TIMEOUT_MS` - Per-operation deadline
//! - `TALLY_FREE_QUOTA_MONTHLY` - Free membership units per month
//! - `RUST_LOG` - Overrides `log_filter`

pub mod config;
pub mod error;
pub mod owner;
pub mod services;
pub mod state;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports
pub use config::BackofficeConfig;
pub use error::{ErrorBody, ErrorKind, ServiceError, ServiceResult};
pub use owner::{require_manager, OwnerResolver};
pub use state::AppState;

use tracing_subscriber::EnvFilter;

/// Installs the global fmt subscriber. `RUST_LOG` wins over `default_filter`.
pub fn init_tracing(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();
}
