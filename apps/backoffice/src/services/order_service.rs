//! Sales: create, list, look up.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, instrument};

use crate::error::{ServiceError, ServiceResult};
use crate::AppState;
use tally_core::validation::{validate_date_range, validate_new_sale, validate_sale_code};
use tally_core::{Actor, DateRange, NewSale, Sale, DEFAULT_LIST_LIMIT};

/// Order service implementation.
pub struct OrderService {
    state: Arc<AppState>,
}

impl OrderService {
    pub fn new(state: Arc<AppState>) -> Self {
        OrderService { state }
    }

    /// Validates and records a sale, debiting stock and membership quota.
    ///
    /// The operator defaults to the actor's display name.
    #[instrument(skip_all, fields(user = %actor.user_id))]
    pub async fn create_sale(&self, actor: &Actor, mut input: NewSale) -> ServiceResult<Sale> {
        validate_new_sale(&input)?;
        let owner = self.state.owner_of(actor).await?;

        if input.operator_name.as_deref().map_or(true, |n| n.trim().is_empty()) {
            input.operator_name = Some(actor.display_name().to_string());
        }

        let orders = self.state.db.orders(self.state.policy());
        let sale = self
            .state
            .with_deadline("create_sale", orders.create(&owner, &input, Utc::now()))
            .await?;

        info!(owner = %owner, code = %sale.code, "Sale recorded");
        Ok(sale)
    }

    /// Sales in `range`, newest first. An unbounded range returns the most
    /// recent [`DEFAULT_LIST_LIMIT`].
    pub async fn list_sales(
        &self,
        actor: &Actor,
        range: DateRange,
        include_hidden: bool,
    ) -> ServiceResult<Vec<Sale>> {
        validate_date_range(&range)?;
        let owner = self.state.owner_of(actor).await?;

        let sales = self.state.db.sales();
        self.state
            .with_deadline(
                "list_sales",
                sales.list(&owner, &range, include_hidden, DEFAULT_LIST_LIMIT),
            )
            .await
    }

    /// One sale by code, hidden or not.
    pub async fn get_sale(&self, actor: &Actor, code: &str) -> ServiceResult<Sale> {
        validate_sale_code(code)?;
        let owner = self.state.owner_of(actor).await?;

        let sales = self.state.db.sales();
        self.state
            .with_deadline("get_sale", sales.get_by_code(&owner, code))
            .await?
            .ok_or_else(|| ServiceError::not_found("Sale", code.trim()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::test_support::{insert_product, insert_staff, manager, sale_input, staff, state};

    #[tokio::test]
    async fn test_staff_sale_lands_in_managers_books() {
        let state = state().await;
        insert_staff(&state.db, "ana@shop.test", Some("manager-1")).await;
        insert_product(&state.db, "manager-1", "p-1", 5).await;
        state.db.stock().sync_from_products(&"manager-1".into(), Utc::now()).await.unwrap();

        let service = OrderService::new(state.clone());
        let sale = service
            .create_sale(&staff("ana@shop.test"), sale_input(&[(Some("p-1"), 2)]))
            .await
            .unwrap();

        assert_eq!(sale.owner_id.as_str(), "manager-1");
        assert_eq!(sale.operator_name.as_deref(), Some("Ana"));

        let fetched = service.get_sale(&manager("manager-1"), &sale.code).await.unwrap();
        assert_eq!(fetched.id, sale.id);

        let stock = state.db.stock().get_by_product(&"manager-1".into(), "p-1").await.unwrap().unwrap();
        assert_eq!(stock.quantity, 3);
    }

    #[tokio::test]
    async fn test_invalid_sale_rejected_before_any_write() {
        let state = state().await;
        let service = OrderService::new(state.clone());

        let err = service.create_sale(&manager("manager-1"), sale_input(&[])).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);

        let err = service
            .create_sale(&manager("manager-1"), sale_input(&[(None, 0)]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);

        let listed = service
            .list_sales(&manager("manager-1"), DateRange::default(), true)
            .await
            .unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn test_get_sale_does_not_leak_other_owners() {
        let state = state().await;
        let service = OrderService::new(state);

        let sale = service
            .create_sale(&manager("manager-1"), sale_input(&[(None, 1)]))
            .await
            .unwrap();

        let err = service.get_sale(&manager("manager-2"), &sale.code).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let listed = service
            .list_sales(&manager("manager-2"), DateRange::default(), false)
            .await
            .unwrap();
        assert!(listed.is_empty());
    }

    #[tokio::test]
    async fn test_list_sales_filters_by_business_date() {
        let state = state().await;
        let service = OrderService::new(state);
        let actor = manager("manager-1");
        service.create_sale(&actor, sale_input(&[(None, 1)])).await.unwrap();

        let today = Utc::now().date_naive();
        let listed = service
            .list_sales(&actor, DateRange::new(Some(today), Some(today)), false)
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);

        let yesterday = today.pred_opt().unwrap();
        let listed = service
            .list_sales(&actor, DateRange::new(None, Some(yesterday)), false)
            .await
            .unwrap();
        assert!(listed.is_empty());

        let err = service
            .list_sales(&actor, DateRange::new(Some(today), Some(yesterday)), false)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ValidationError);
    }

    #[tokio::test]
    async fn test_unknown_staff_cannot_sell() {
        let state = state().await;
        let service = OrderService::new(state);

        let err = service
            .create_sale(&staff("ghost@shop.test"), sale_input(&[(None, 1)]))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unauthorized);
    }
}
