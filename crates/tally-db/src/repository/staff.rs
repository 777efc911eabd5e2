//! # Staff Repository
//!
//! Employee lookups for owner resolution: a staff user acts for the manager
//! recorded on their employee row.

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use tally_core::StaffMember;

/// Repository for employee rows.
#[derive(Debug, Clone)]
pub struct StaffRepository {
    pool: SqlitePool,
}

impl StaffRepository {
    /// Creates a new StaffRepository.
    pub fn new(pool: SqlitePool) -> Self {
        StaffRepository { pool }
    }

    /// Finds a live employee by email, case-insensitively.
    ///
    /// If several rows share the email, active ones win, then the newest.
    pub async fn find_by_email(&self, email: &str) -> DbResult<Option<StaffMember>> {
        let email = email.trim();
        debug!(email, "Looking up employee");

        let member = sqlx::query_as::<_, StaffMember>(
            r#"
            SELECT id, owner_id, name, email, active, created_at
            FROM staff
            WHERE email = ?1 COLLATE NOCASE
              AND deleted_at IS NULL
            ORDER BY active DESC, created_at DESC
            LIMIT 1
            "#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;

        Ok(member)
    }

    /// Inserts an employee row.
    pub async fn insert(&self, member: &StaffMember) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO staff (id, owner_id, name, email, active, created_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&member.id)
        .bind(&member.owner_id)
        .bind(&member.name)
        .bind(&member.email)
        .bind(member.active)
        .bind(member.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
