//! Shared application state and per-operation deadlines.

use std::future::Future;
use std::sync::Arc;

use tracing::warn;

use crate::config::BackofficeConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::owner::OwnerResolver;
use tally_core::{Actor, OwnerId, QuotaPolicy};
use tally_db::Database;

/// Shared application state.
#[derive(Debug)]
pub struct AppState {
    pub db: Database,
    pub config: BackofficeConfig,
    owners: OwnerResolver,
}

impl AppState {
    pub fn new(db: Database, config: BackofficeConfig) -> Arc<Self> {
        let owners = OwnerResolver::new(db.staff());
        Arc::new(AppState { db, config, owners })
    }

    /// Opens the database described by `config` (migrating it) and wraps it.
    pub async fn connect(config: BackofficeConfig) -> ServiceResult<Arc<Self>> {
        let db = Database::new(config.db_config()).await?;
        Ok(Self::new(db, config))
    }

    pub fn policy(&self) -> QuotaPolicy {
        self.config.quota_policy()
    }

    /// The owner whose ledgers `actor` works on.
    pub async fn owner_of(&self, actor: &Actor) -> ServiceResult<OwnerId> {
        self.with_deadline("resolve_owner", self.owners.resolve(actor)).await
    }

    /// Runs `operation` under the configured deadline.
    ///
    /// On expiry the future is dropped, which drops any open transaction
    /// and rolls it back.
    pub async fn with_deadline<T, E, F>(&self, operation: &'static str, fut: F) -> ServiceResult<T>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<ServiceError>,
    {
        let limit = self.config.operation_timeout();
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => result.map_err(Into::into),
            Err(_) => {
                warn!(operation, timeout_ms = self.config.operation_timeout_ms, "Operation deadline exceeded");
                Err(ServiceError::DeadlineExceeded {
                    operation,
                    after_ms: self.config.operation_timeout_ms,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::state_with;
    use chrono::Utc;
    use std::time::Duration;
    use tally_core::{DateRange, FinanceKind, Money, NewFinanceEntry};
    use tally_db::DbError;

    fn short_deadline() -> BackofficeConfig {
        BackofficeConfig {
            operation_timeout_ms: 20,
            ..BackofficeConfig::default()
        }
    }

    #[tokio::test]
    async fn test_deadline_exceeded() {
        let state = state_with(short_deadline()).await;

        let err = state
            .with_deadline("slow", async {
                tokio::time::sleep(Duration::from_millis(500)).await;
                Ok::<_, DbError>(())
            })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::DeadlineExceeded);
    }

    #[tokio::test]
    async fn test_deadline_rolls_back_open_transaction() {
        let state = state_with(short_deadline()).await;
        let owner = OwnerId::from("manager-1");

        let result = state
            .with_deadline("slow_write", async {
                let mut tx = state.db.begin().await?;
                tally_db::repository::finance::insert_in(
                    &mut tx,
                    &owner,
                    &NewFinanceEntry {
                        title: "Supplies".to_string(),
                        amount: Money::from_minor(5_000),
                        category: "Operations".to_string(),
                        entry_date: Utc::now().date_naive(),
                        kind: FinanceKind::Expense,
                        note: None,
                        sale_id: None,
                        sale_code: None,
                    },
                    Utc::now(),
                )
                .await?;
                tokio::time::sleep(Duration::from_millis(500)).await;
                tx.commit().await?;
                Ok::<_, DbError>(())
            })
            .await;
        assert!(result.is_err());

        let entries = state.db.finance().list(&owner, &DateRange::default(), 200).await.unwrap();
        assert!(entries.is_empty());
    }

    #[tokio::test]
    async fn test_errors_pass_through() {
        let state = state_with(BackofficeConfig::default()).await;
        let err = state
            .with_deadline("lookup", async { Err::<(), _>(DbError::not_found("Sale", "ORD-1")) })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
