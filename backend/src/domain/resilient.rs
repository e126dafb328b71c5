//! Retry-wrapped decorators for the order source and CRM ports.
//!
//! Each operation gets its own attempt ceiling: reads retry less
//! aggressively than creates. Only errors the ports classify as retryable
//! trigger another attempt.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::retry::{Retrier, RetryPolicy};
use crate::domain::ports::{
    CrmContact, CrmDeal, CrmGateway, CrmGatewayError, DealSnapshot, DealUpdate, NewContact,
    NewDeal, OrderPage, OrderPageRequest, OrderSource, OrderSourceError, UnlinkTarget,
};
use crate::domain::{CrmDealId, LineItem, PhoneNumber};

/// Per-operation retry policies for CRM calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrmRetryPolicies {
    pub find_contact: RetryPolicy,
    pub create_contact: RetryPolicy,
    pub create_deal: RetryPolicy,
    pub update_deal: RetryPolicy,
    pub get_deal: RetryPolicy,
    pub link_items: RetryPolicy,
    pub add_note: RetryPolicy,
}

impl Default for CrmRetryPolicies {
    fn default() -> Self {
        Self {
            find_contact: RetryPolicy::with_attempts(2),
            create_contact: RetryPolicy::with_attempts(3),
            create_deal: RetryPolicy::with_attempts(3),
            update_deal: RetryPolicy::with_attempts(2),
            get_deal: RetryPolicy::with_attempts(2),
            link_items: RetryPolicy::with_attempts(2),
            add_note: RetryPolicy::with_attempts(2),
        }
    }
}

/// [`CrmGateway`] decorator applying [`CrmRetryPolicies`].
pub struct RetryingCrmGateway {
    inner: Arc<dyn CrmGateway>,
    retrier: Retrier,
    policies: CrmRetryPolicies,
}

impl RetryingCrmGateway {
    pub fn new(inner: Arc<dyn CrmGateway>, retrier: Retrier, policies: CrmRetryPolicies) -> Self {
        Self {
            inner,
            retrier,
            policies,
        }
    }
}

#[async_trait]
impl CrmGateway for RetryingCrmGateway {
    async fn find_contact_by_phone(
        &self,
        phone: &PhoneNumber,
    ) -> Result<Option<CrmContact>, CrmGatewayError> {
        self.retrier
            .run(
                &self.policies.find_contact,
                "find_contact_by_phone",
                CrmGatewayError::is_retryable,
                || self.inner.find_contact_by_phone(phone),
            )
            .await
    }

    async fn create_contact(&self, contact: &NewContact) -> Result<CrmContact, CrmGatewayError> {
        self.retrier
            .run(
                &self.policies.create_contact,
                "create_contact",
                CrmGatewayError::is_retryable,
                || self.inner.create_contact(contact),
            )
            .await
    }

    async fn create_deal_complex(&self, deal: &NewDeal) -> Result<CrmDeal, CrmGatewayError> {
        self.retrier
            .run(
                &self.policies.create_deal,
                "create_deal_complex",
                CrmGatewayError::is_retryable,
                || self.inner.create_deal_complex(deal),
            )
            .await
    }

    async fn update_deal(&self, id: CrmDealId, update: &DealUpdate) -> Result<(), CrmGatewayError> {
        self.retrier
            .run(
                &self.policies.update_deal,
                "update_deal",
                CrmGatewayError::is_retryable,
                || self.inner.update_deal(id, update),
            )
            .await
    }

    async fn get_deal(&self, id: CrmDealId) -> Result<DealSnapshot, CrmGatewayError> {
        self.retrier
            .run(
                &self.policies.get_deal,
                "get_deal",
                CrmGatewayError::is_retryable,
                || self.inner.get_deal(id),
            )
            .await
    }

    async fn unlink_line_items(
        &self,
        id: CrmDealId,
        items: &[UnlinkTarget],
    ) -> Result<(), CrmGatewayError> {
        self.retrier
            .run(
                &self.policies.link_items,
                "unlink_line_items",
                CrmGatewayError::is_retryable,
                || self.inner.unlink_line_items(id, items),
            )
            .await
    }

    async fn link_line_items(&self, id: CrmDealId, items: &[LineItem]) -> Result<(), CrmGatewayError> {
        self.retrier
            .run(
                &self.policies.link_items,
                "link_line_items",
                CrmGatewayError::is_retryable,
                || self.inner.link_line_items(id, items),
            )
            .await
    }

    async fn add_note(&self, id: CrmDealId, text: &str) -> Result<(), CrmGatewayError> {
        self.retrier
            .run(
                &self.policies.add_note,
                "add_note",
                CrmGatewayError::is_retryable,
                || self.inner.add_note(id, text),
            )
            .await
    }
}

/// [`OrderSource`] decorator retrying page fetches.
pub struct RetryingOrderSource {
    inner: Arc<dyn OrderSource>,
    retrier: Retrier,
    policy: RetryPolicy,
}

impl RetryingOrderSource {
    pub fn new(inner: Arc<dyn OrderSource>, retrier: Retrier, policy: RetryPolicy) -> Self {
        Self {
            inner,
            retrier,
            policy,
        }
    }
}

#[async_trait]
impl OrderSource for RetryingOrderSource {
    async fn list_orders(&self, request: &OrderPageRequest) -> Result<OrderPage, OrderSourceError> {
        self.retrier
            .run(
                &self.policy,
                "list_orders",
                OrderSourceError::is_retryable,
                || self.inner.list_orders(request),
            )
            .await
    }

    async fn list_orders_updated_after(
        &self,
        updated_after: DateTime<Utc>,
        request: &OrderPageRequest,
    ) -> Result<OrderPage, OrderSourceError> {
        self.retrier
            .run(
                &self.policy,
                "list_orders_updated_after",
                OrderSourceError::is_retryable,
                || self.inner.list_orders_updated_after(updated_after, request),
            )
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CrmContactId;
    use crate::domain::ports::{MockCrmGateway, MockOrderSource, OrderSort};
    use crate::test_support::clock::{ImmediateSleeper, NoJitter};

    fn retrier() -> Retrier {
        Retrier::new(Arc::new(ImmediateSleeper), Arc::new(NoJitter))
    }

    fn phone() -> PhoneNumber {
        PhoneNumber::parse("+77010000000").expect("phone")
    }

    #[tokio::test]
    async fn find_contact_gives_up_after_two_attempts() {
        let mut crm = MockCrmGateway::new();
        crm.expect_find_contact_by_phone()
            .times(2)
            .returning(|_| Err(CrmGatewayError::timeout("slow")));
        let gateway = RetryingCrmGateway::new(Arc::new(crm), retrier(), CrmRetryPolicies::default());

        let error = gateway
            .find_contact_by_phone(&phone())
            .await
            .expect_err("exhausted");
        assert!(matches!(error, CrmGatewayError::Timeout { .. }));
    }

    #[tokio::test]
    async fn create_contact_retries_up_to_three_times() {
        let mut crm = MockCrmGateway::new();
        let mut sequence = mockall::Sequence::new();
        crm.expect_create_contact()
            .times(2)
            .in_sequence(&mut sequence)
            .returning(|_| Err(CrmGatewayError::rate_limited("429")));
        crm.expect_create_contact()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|contact| {
                Ok(CrmContact {
                    id: CrmContactId::new(7),
                    name: contact.name.clone(),
                })
            });
        let gateway = RetryingCrmGateway::new(Arc::new(crm), retrier(), CrmRetryPolicies::default());

        let contact = gateway
            .create_contact(&NewContact {
                name: "Buyer".to_owned(),
                phone: phone(),
            })
            .await
            .expect("third attempt succeeds");
        assert_eq!(contact.id, CrmContactId::new(7));
    }

    #[tokio::test]
    async fn rejected_requests_are_not_retried() {
        let mut crm = MockCrmGateway::new();
        crm.expect_update_deal()
            .times(1)
            .returning(|_, _| Err(CrmGatewayError::rejected("400")));
        let gateway = RetryingCrmGateway::new(Arc::new(crm), retrier(), CrmRetryPolicies::default());

        assert!(
            gateway
                .update_deal(CrmDealId::new(1), &DealUpdate { price: 10 })
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn order_listing_retries_transport_failures() {
        let mut source = MockOrderSource::new();
        let mut sequence = mockall::Sequence::new();
        source
            .expect_list_orders()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Err(OrderSourceError::transport("reset")));
        source
            .expect_list_orders()
            .times(1)
            .in_sequence(&mut sequence)
            .returning(|_| Ok(OrderPage::default()));
        let retrying =
            RetryingOrderSource::new(Arc::new(source), retrier(), RetryPolicy::with_attempts(3));

        let page = retrying
            .list_orders(&OrderPageRequest {
                states: Vec::new(),
                page: 1,
                page_size: 50,
                sort: OrderSort::CreatedAtDesc,
            })
            .await
            .expect("second attempt succeeds");
        assert!(page.orders.is_empty());
    }
}
