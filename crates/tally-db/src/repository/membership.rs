//! # Membership Repository
//!
//! Persistence for the per-owner quota state and top-up purchases. The
//! arithmetic lives in `tally_core::quota`; this module only loads, locks
//! and stores.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{debug, info};

use crate::error::DbResult;
use tally_core::quota::window_start;
use tally_core::{new_id, MembershipState, MembershipTopup, NewTopup, OwnerId, QuotaPolicy};

/// Repository for membership quota operations.
#[derive(Debug, Clone)]
pub struct MembershipRepository {
    pool: SqlitePool,
}

impl MembershipRepository {
    /// Creates a new MembershipRepository.
    pub fn new(pool: SqlitePool) -> Self {
        MembershipRepository { pool }
    }

    /// Current state, created on first access and rolled into the current
    /// month if a new month has started.
    pub async fn state(&self, owner: &OwnerId, today: NaiveDate, now: DateTime<Utc>) -> DbResult<MembershipState> {
        let mut tx = self.pool.begin().await?;

        let mut state = lock_state_in(&mut tx, owner, today, now).await?;
        if state.roll_window(today) {
            let total = topups_total_in(&mut tx, owner).await?;
            state.reconcile(total);
            save_state_in(&mut tx, &state, now).await?;
        }

        tx.commit().await?;
        Ok(state)
    }

    /// Administrative override of `used_quota`.
    pub async fn set_used(
        &self,
        owner: &OwnerId,
        used: i64,
        policy: &QuotaPolicy,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> DbResult<MembershipState> {
        let mut tx = self.pool.begin().await?;

        let mut state = lock_state_in(&mut tx, owner, today, now).await?;
        let total = topups_total_in(&mut tx, owner).await?;
        state.set_used(used, policy, total, today);
        save_state_in(&mut tx, &state, now).await?;

        tx.commit().await?;
        info!(owner = %owner, used, "Quota usage overridden");
        Ok(state)
    }

    /// Records a purchase and credits the balance in the same transaction.
    pub async fn create_topup(
        &self,
        owner: &OwnerId,
        topup: &NewTopup,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> DbResult<MembershipTopup> {
        let mut tx = self.pool.begin().await?;

        let mut state = lock_state_in(&mut tx, owner, today, now).await?;
        let created = insert_topup_in(&mut tx, owner, topup, now).await?;
        let total = topups_total_in(&mut tx, owner).await?;

        state.roll_window(today);
        state.topup_balance += created.amount;
        state.reconcile(total);
        save_state_in(&mut tx, &state, now).await?;

        tx.commit().await?;
        info!(owner = %owner, amount = created.amount, "Quota top-up recorded");
        Ok(created)
    }

    /// Most recent top-ups first.
    pub async fn list_topups(&self, owner: &OwnerId, limit: i64) -> DbResult<Vec<MembershipTopup>> {
        let topups = sqlx::query_as::<_, MembershipTopup>(
            r#"
            SELECT id, owner_id, amount, manager, note, topup_date, created_at
            FROM membership_topups
            WHERE owner_id = ?1 AND deleted_at IS NULL
            ORDER BY topup_date DESC, created_at DESC
            LIMIT ?2
            "#,
        )
        .bind(owner)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        Ok(topups)
    }

    /// Sum of all live top-ups ever bought.
    pub async fn topups_total(&self, owner: &OwnerId) -> DbResult<i64> {
        let mut conn = self.pool.acquire().await?;
        topups_total_in(&mut conn, owner).await
    }
}

// =============================================================================
// In-transaction operations
// =============================================================================

/// Fetches the owner's state row, creating it if absent.
///
/// The upsert is a write, so the row is locked against other units of work
/// for the rest of the transaction.
pub async fn lock_state_in(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    today: NaiveDate,
    now: DateTime<Utc>,
) -> DbResult<MembershipState> {
    let state = sqlx::query_as::<_, MembershipState>(
        r#"
        INSERT INTO membership_state (owner_id, used_quota, free_used, free_window_start, topup_balance, updated_at)
        VALUES (?1, 0, 0, ?2, 0, ?3)
        ON CONFLICT (owner_id) DO UPDATE SET updated_at = membership_state.updated_at
        RETURNING owner_id, used_quota, free_used, free_window_start, topup_balance, updated_at
        "#,
    )
    .bind(owner)
    .bind(window_start(today))
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    Ok(state)
}

pub async fn save_state_in(
    conn: &mut SqliteConnection,
    state: &MembershipState,
    now: DateTime<Utc>,
) -> DbResult<()> {
    sqlx::query(
        r#"
        UPDATE membership_state SET
            used_quota = ?2,
            free_used = ?3,
            free_window_start = ?4,
            topup_balance = ?5,
            updated_at = ?6
        WHERE owner_id = ?1
        "#,
    )
    .bind(&state.owner_id)
    .bind(state.used_quota)
    .bind(state.free_used)
    .bind(state.free_window_start)
    .bind(state.topup_balance)
    .bind(now)
    .execute(&mut *conn)
    .await?;

    debug!(
        owner = %state.owner_id,
        used_quota = state.used_quota,
        free_used = state.free_used,
        topup_balance = state.topup_balance,
        "Membership state saved"
    );
    Ok(())
}

pub async fn topups_total_in(conn: &mut SqliteConnection, owner: &OwnerId) -> DbResult<i64> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(amount), 0) FROM membership_topups WHERE owner_id = ?1 AND deleted_at IS NULL",
    )
    .bind(owner)
    .fetch_one(&mut *conn)
    .await?;

    Ok(total)
}

async fn insert_topup_in(
    conn: &mut SqliteConnection,
    owner: &OwnerId,
    topup: &NewTopup,
    now: DateTime<Utc>,
) -> DbResult<MembershipTopup> {
    let created = sqlx::query_as::<_, MembershipTopup>(
        r#"
        INSERT INTO membership_topups (id, owner_id, amount, manager, note, topup_date, created_at)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
        RETURNING id, owner_id, amount, manager, note, topup_date, created_at
        "#,
    )
    .bind(new_id())
    .bind(owner)
    .bind(topup.amount)
    .bind(topup.manager.trim())
    .bind(topup.note.as_deref())
    .bind(topup.date.unwrap_or(now))
    .bind(now)
    .fetch_one(&mut *conn)
    .await?;

    Ok(created)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::{Database, DbConfig};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn topup(amount: i64) -> NewTopup {
        NewTopup {
            amount,
            manager: "Rina".to_string(),
            note: None,
            date: None,
        }
    }

    async fn setup() -> (Database, OwnerId) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        (db, OwnerId::from("manager-1"))
    }

    #[tokio::test]
    async fn test_state_created_on_first_access() {
        let (db, owner) = setup().await;

        let state = db.membership().state(&owner, date(2024, 3, 9), Utc::now()).await.unwrap();

        assert_eq!(state.used_quota, 0);
        assert_eq!(state.free_used, 0);
        assert_eq!(state.topup_balance, 0);
        assert_eq!(state.free_window_start, date(2024, 3, 1));
    }

    #[tokio::test]
    async fn test_topup_credits_balance_without_changing_usage() {
        let (db, owner) = setup().await;
        let repo = db.membership();
        let today = date(2024, 3, 9);

        repo.set_used(&owner, 10, &QuotaPolicy::default(), today, Utc::now()).await.unwrap();
        repo.create_topup(&owner, &topup(100), today, Utc::now()).await.unwrap();

        let state = repo.state(&owner, today, Utc::now()).await.unwrap();
        assert_eq!(state.topup_balance, 100);
        assert_eq!(state.used_quota, 10);
        assert_eq!(repo.topups_total(&owner).await.unwrap(), 100);

        let listed = repo.list_topups(&owner, 10).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].manager, "Rina");
    }

    #[tokio::test]
    async fn test_set_used_conserves() {
        let (db, owner) = setup().await;
        let repo = db.membership();
        let today = date(2024, 3, 9);
        repo.create_topup(&owner, &topup(50), today, Utc::now()).await.unwrap();

        let state = repo
            .set_used(&owner, 1020, &QuotaPolicy::default(), today, Utc::now())
            .await
            .unwrap();

        assert_eq!(state.free_used, 1000);
        assert_eq!(state.topup_balance, 30);
        assert_eq!(state.used_quota, state.free_used + (50 - state.topup_balance));
    }

    #[tokio::test]
    async fn test_state_rolls_into_new_month() {
        let (db, owner) = setup().await;
        let repo = db.membership();

        repo.set_used(&owner, 700, &QuotaPolicy::default(), date(2024, 1, 31), Utc::now())
            .await
            .unwrap();

        let state = repo.state(&owner, date(2024, 2, 1), Utc::now()).await.unwrap();
        assert_eq!(state.free_used, 0);
        assert_eq!(state.used_quota, 0);
        assert_eq!(state.free_window_start, date(2024, 2, 1));
    }

    #[tokio::test]
    async fn test_owners_are_isolated() {
        let (db, owner) = setup().await;
        let repo = db.membership();
        let today = date(2024, 3, 9);
        repo.create_topup(&owner, &topup(20), today, Utc::now()).await.unwrap();

        let other = OwnerId::from("manager-2");
        let state = repo.state(&other, today, Utc::now()).await.unwrap();
        assert_eq!(state.topup_balance, 0);
        assert!(repo.list_topups(&other, 10).await.unwrap().is_empty());
    }
}
