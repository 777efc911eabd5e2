//! # Membership Quota
//!
//! Pure arithmetic for the two-pool membership quota.
//!
//! ## Pools
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Quota Accounting                                  │
//! │                                                                         │
//! │   Free pool                        Top-up pool                          │
//! │   ─────────                        ───────────                          │
//! │   cap = policy.monthly_free        total   = Σ top-up amounts           │
//! │   free_used, reset on the 1st      balance = what is left to spend      │
//! │                                                                         │
//! │   consume(u):  free first ──► then top-up ──► overflow absorbed        │
//! │   restore(c):  exact reverse of a recorded QuotaCharge                 │
//! │                                                                         │
//! │   used_quota = free_used + (total − balance)      (always)             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Monthly Window
//! The free window starts on the first day of the current month. Any call
//! with a `today` in a later month zeroes `free_used` before doing its own
//! work. Callers pass `today` explicitly.
//!
//! ## Example
//! ```rust
//! use chrono::{NaiveDate, Utc};
//! use tally_core::quota::{MembershipState, QuotaPolicy};
//! use tally_core::types::OwnerId;
//!
//! let today = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
//! let policy = QuotaPolicy::default();
//! let mut state = MembershipState::fresh(OwnerId::from("m-1"), today, Utc::now());
//! state.topup_balance = 100;
//!
//! state.free_used = 999;
//! let charge = state.consume(5, &policy, 100, today);
//! assert_eq!((charge.free_units, charge.topup_units), (1, 4));
//! assert_eq!(state.topup_balance, 96);
//! ```

use chrono::{DateTime, Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::types::OwnerId;
use crate::DEFAULT_FREE_QUOTA_MONTHLY;

// =============================================================================
// Policy
// =============================================================================

/// Quota settings for a deployment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct QuotaPolicy {
    /// Size of the free pool per calendar month.
    pub monthly_free: i64,
}

impl Default for QuotaPolicy {
    fn default() -> Self {
        QuotaPolicy {
            monthly_free: DEFAULT_FREE_QUOTA_MONTHLY,
        }
    }
}

// =============================================================================
// Charge
// =============================================================================

/// How one sale's consumption was split between the pools.
///
/// Stored on the sale so a refund can put back exactly what was taken.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct QuotaCharge {
    pub free_units: i64,
    pub topup_units: i64,
    /// Free window the free units were taken from.
    #[ts(as = "String")]
    pub window_start: NaiveDate,
}

impl QuotaCharge {
    pub fn none(window_start: NaiveDate) -> Self {
        QuotaCharge {
            free_units: 0,
            topup_units: 0,
            window_start,
        }
    }

    pub fn total(&self) -> i64 {
        self.free_units + self.topup_units
    }
}

/// First day of the month containing `today`.
pub fn window_start(today: NaiveDate) -> NaiveDate {
    today.with_day(1).unwrap_or(today)
}

/// Units a sale consumes: the sum of its line quantities, at least 1.
pub fn consumption_units<I>(quantities: I) -> i64
where
    I: IntoIterator<Item = i64>,
{
    quantities.into_iter().sum::<i64>().max(1)
}

// =============================================================================
// Membership State
// =============================================================================

/// One row per owner.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct MembershipState {
    pub owner_id: OwnerId,
    /// Derived: `free_used + (topups_total − topup_balance)`.
    pub used_quota: i64,
    pub free_used: i64,
    #[ts(as = "String")]
    pub free_window_start: NaiveDate,
    pub topup_balance: i64,
    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

/// What `GetQuotaState` reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct QuotaSnapshot {
    pub used_quota: i64,
    pub free_used: i64,
    pub free_quota: i64,
    pub free_remaining: i64,
    pub topup_balance: i64,
}

impl MembershipState {
    /// A state with nothing used, windowed at `today`'s month.
    pub fn fresh(owner_id: OwnerId, today: NaiveDate, now: DateTime<Utc>) -> Self {
        MembershipState {
            owner_id,
            used_quota: 0,
            free_used: 0,
            free_window_start: window_start(today),
            topup_balance: 0,
            updated_at: now,
        }
    }

    /// Zeroes `free_used` if `today` is in a later month than the window.
    ///
    /// Returns true when the window moved.
    pub fn roll_window(&mut self, today: NaiveDate) -> bool {
        let start = window_start(today);
        if start > self.free_window_start {
            self.free_window_start = start;
            self.free_used = 0;
            return true;
        }
        false
    }

    /// Free units still available this window.
    pub fn free_available(&self, policy: &QuotaPolicy) -> i64 {
        (policy.monthly_free - self.free_used).max(0)
    }

    /// Recomputes `used_quota` from the two pools.
    pub fn reconcile(&mut self, topups_total: i64) {
        self.used_quota = self.free_used + (topups_total - self.topup_balance);
    }

    /// Debits `units`, free pool first, then top-up.
    ///
    /// Units beyond both pools are absorbed: the sale still goes through and
    /// nothing goes negative.
    pub fn consume(
        &mut self,
        units: i64,
        policy: &QuotaPolicy,
        topups_total: i64,
        today: NaiveDate,
    ) -> QuotaCharge {
        self.roll_window(today);
        let mut charge = QuotaCharge::none(self.free_window_start);

        if units > 0 {
            let from_free = units.min(self.free_available(policy));
            let from_topup = (units - from_free).min(self.topup_balance.max(0));

            self.free_used += from_free;
            self.topup_balance -= from_topup;

            charge.free_units = from_free;
            charge.topup_units = from_topup;
        }

        self.reconcile(topups_total);
        charge
    }

    /// Reverses a recorded charge.
    ///
    /// Top-up units always go back to the balance, capped at the total ever
    /// bought. Free units go back only if the charge's window is still the
    /// current one; a new month already reset them.
    pub fn restore_charge(&mut self, charge: &QuotaCharge, topups_total: i64, today: NaiveDate) {
        self.roll_window(today);

        let spent = (topups_total - self.topup_balance).max(0);
        self.topup_balance += charge.topup_units.max(0).min(spent);

        if charge.window_start == self.free_window_start {
            self.free_used = (self.free_used - charge.free_units.max(0)).max(0);
        }

        self.reconcile(topups_total);
    }

    /// Gives back `units` without knowing how they were originally split.
    ///
    /// Used for sales recorded without a charge. Credits the top-up pool up
    /// to what has been spent from it; the rest reduces `free_used`, never
    /// below zero.
    pub fn restore_units(&mut self, units: i64, topups_total: i64, today: NaiveDate) {
        self.roll_window(today);

        if units > 0 {
            let spent = (topups_total - self.topup_balance).max(0);
            let to_topup = units.min(spent);
            self.topup_balance += to_topup;
            self.free_used = (self.free_used - (units - to_topup)).max(0);
        }

        self.reconcile(topups_total);
    }

    /// Administrative override: splits `used` across the pools the way
    /// consumption would have, free first.
    pub fn set_used(&mut self, used: i64, policy: &QuotaPolicy, topups_total: i64, today: NaiveDate) {
        self.roll_window(today);

        let used = used.max(0);
        let free = used.min(policy.monthly_free.max(0));
        let topup_used = (used - free).min(topups_total.max(0));

        self.free_used = free;
        self.topup_balance = topups_total - topup_used;
        self.reconcile(topups_total);
    }

    pub fn snapshot(&self, policy: &QuotaPolicy) -> QuotaSnapshot {
        QuotaSnapshot {
            used_quota: self.used_quota,
            free_used: self.free_used,
            free_quota: policy.monthly_free,
            free_remaining: self.free_available(policy),
            topup_balance: self.topup_balance,
        }
    }
}

// =============================================================================
// Top-ups
// =============================================================================

/// A purchase of extra quota units.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct MembershipTopup {
    pub id: String,
    pub owner_id: OwnerId,
    pub amount: i64,
    pub manager: String,
    pub note: Option<String>,
    #[ts(as = "String")]
    pub topup_date: DateTime<Utc>,
    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,
}

/// Input for `CreateTopup`.
#[derive(Debug, Clone, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct NewTopup {
    pub amount: i64,
    pub manager: String,
    pub note: Option<String>,
    /// Defaults to now.
    #[ts(as = "Option<String>")]
    pub date: Option<DateTime<Utc>>,
}

// =============================================================================
// Unit Tests
// =============================================================================
