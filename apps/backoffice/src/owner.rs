//! # Ownership Resolver
//!
//! Every ledger row is scoped to an owner. The caller arrives as an
//! [`Actor`]; this module decides whose books it is working on.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  role = admin | manager   ──►  owner = actor.user_id                   │
//! │                                                                         │
//! │  role = staff             ──►  staff row by e-mail (case-insensitive,  │
//! │                                 live rows, active first)               │
//! │                                 └── owner = staff.owner_id             │
//! │                                                                         │
//! │  no e-mail / no row / no manager on the row  ──►  Unauthorized         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Resolution is fresh per request; nothing is cached.

use tracing::debug;

use crate::error::ServiceResult;
use tally_core::{Actor, ActorRole, CoreError, OwnerId};
use tally_db::StaffRepository;

/// Maps actors to the owner whose ledgers they operate on.
#[derive(Debug, Clone)]
pub struct OwnerResolver {
    staff: StaffRepository,
}

impl OwnerResolver {
    pub fn new(staff: StaffRepository) -> Self {
        OwnerResolver { staff }
    }

    pub async fn resolve(&self, actor: &Actor) -> ServiceResult<OwnerId> {
        match actor.role {
            ActorRole::Admin | ActorRole::Manager => {
                if actor.user_id.trim().is_empty() {
                    return Err(CoreError::OwnerUnresolved("actor has no user id".to_string()).into());
                }
                Ok(OwnerId::new(actor.user_id.clone()))
            }
            ActorRole::Staff => {
                let email = actor
                    .email
                    .as_deref()
                    .map(str::trim)
                    .filter(|e| !e.is_empty())
                    .ok_or_else(|| CoreError::OwnerUnresolved("staff account has no e-mail".to_string()))?;

                let member = self
                    .staff
                    .find_by_email(email)
                    .await?
                    .ok_or_else(|| CoreError::OwnerUnresolved(format!("no employee record for {}", email)))?;

                let owner = member.owner_id.ok_or_else(|| {
                    CoreError::OwnerUnresolved(format!("employee {} has no manager", member.id))
                })?;

                debug!(employee = %member.id, owner = %owner, "Resolved staff owner");
                Ok(owner)
            }
        }
    }
}

/// Fails unless the actor has manager-level privileges.
pub fn require_manager(actor: &Actor, operation: &str) -> ServiceResult<()> {
    if actor.is_manager() {
        return Ok(());
    }
    Err(CoreError::Forbidden {
        role: actor.role.to_string(),
        operation: operation.to_string(),
    }
    .into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::{insert_staff, manager, staff};
    use tally_db::{Database, DbConfig};

    async fn resolver() -> (Database, OwnerResolver) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let resolver = OwnerResolver::new(db.staff());
        (db, resolver)
    }

    #[tokio::test]
    async fn test_manager_owns_itself() {
        let (_db, resolver) = resolver().await;
        let owner = resolver.resolve(&manager("manager-1")).await.unwrap();
        assert_eq!(owner, OwnerId::from("manager-1"));
    }

    #[tokio::test]
    async fn test_staff_resolves_to_manager() {
        let (db, resolver) = resolver().await;
        insert_staff(&db, "Ana@Shop.test", Some("manager-1")).await;

        let owner = resolver.resolve(&staff("ana@shop.test")).await.unwrap();
        assert_eq!(owner, OwnerId::from("manager-1"));
    }

    #[tokio::test]
    async fn test_unresolvable_staff_is_unauthorized() {
        let (db, resolver) = resolver().await;
        insert_staff(&db, "orphan@shop.test", None).await;

        let mut no_email = staff("x@shop.test");
        no_email.email = None;

        for actor in [staff("nobody@shop.test"), staff("orphan@shop.test"), no_email] {
            let err = resolver.resolve(&actor).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Unauthorized);
        }
    }

    #[test]
    fn test_require_manager() {
        assert!(require_manager(&manager("manager-1"), "refund a sale").is_ok());
        let err = require_manager(&staff("ana@shop.test"), "refund a sale").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
        assert!(err.to_string().contains("staff"));
    }
}
