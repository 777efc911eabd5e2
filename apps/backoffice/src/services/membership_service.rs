//! Membership quota: state, overrides, top-ups.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};

use crate::error::ServiceResult;
use crate::owner::require_manager;
use crate::AppState;
use tally_core::validation::{validate_topup, validate_used_quota};
use tally_core::{Actor, MembershipTopup, NewTopup, QuotaSnapshot, DEFAULT_LIST_LIMIT};

/// Membership service implementation.
pub struct MembershipService {
    state: Arc<AppState>,
}

impl MembershipService {
    pub fn new(state: Arc<AppState>) -> Self {
        MembershipService { state }
    }

    /// Current quota figures; a new month's window is applied first.
    pub async fn quota_state(&self, actor: &Actor) -> ServiceResult<QuotaSnapshot> {
        let owner = self.state.owner_of(actor).await?;
        let now = Utc::now();

        let membership = self.state.db.membership();
        let state = self
            .state
            .with_deadline("quota_state", membership.state(&owner, now.date_naive(), now))
            .await?;
        Ok(state.snapshot(&self.state.policy()))
    }

    /// Administrative override of total units used.
    #[instrument(skip_all, fields(user = %actor.user_id, used = used))]
    pub async fn set_used_quota(&self, actor: &Actor, used: i64) -> ServiceResult<QuotaSnapshot> {
        require_manager(actor, "override quota usage")?;
        validate_used_quota(used)?;
        let owner = self.state.owner_of(actor).await?;
        let now = Utc::now();
        let policy = self.state.policy();

        let membership = self.state.db.membership();
        let state = self
            .state
            .with_deadline(
                "set_used_quota",
                membership.set_used(&owner, used, &policy, now.date_naive(), now),
            )
            .await?;
        Ok(state.snapshot(&policy))
    }

    #[instrument(skip_all, fields(user = %actor.user_id, amount = input.amount))]
    pub async fn create_topup(&self, actor: &Actor, input: NewTopup) -> ServiceResult<MembershipTopup> {
        require_manager(actor, "record a top-up")?;
        validate_topup(&input)?;
        let owner = self.state.owner_of(actor).await?;
        let now = Utc::now();

        let membership = self.state.db.membership();
        let topup = self
            .state
            .with_deadline(
                "create_topup",
                membership.create_topup(&owner, &input, now.date_naive(), now),
            )
            .await?;

        info!(owner = %owner, topup = %topup.id, "Top-up recorded");
        Ok(topup)
    }

    pub async fn list_topups(&self, actor: &Actor, limit: Option<i64>) -> ServiceResult<Vec<MembershipTopup>> {
        let owner = self.state.owner_of(actor).await?;
        let limit = limit.filter(|l| *l > 0).unwrap_or(DEFAULT_LIST_LIMIT);

        let membership = self.state.db.membership();
        self.state
            .with_deadline("list_topups", membership.list_topups(&owner, limit))
            .await
    }
}
