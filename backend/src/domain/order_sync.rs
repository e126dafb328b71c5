//! Deal creation and outcome recording shared by polling and reconciliation.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use mockable::Clock;
use tracing::{debug, info};

use super::daily_stats::DailyStatsDelta;
use super::deal_draft::{DealOrigin, NoteTemplate, contact_name, new_deal};
use super::fingerprint::OrderFingerprint;
use super::order::UpstreamOrder;
use super::phone::{PhoneError, PhoneNumber};
use super::processed_order::{CrmDealId, ProcessedOrder, ProcessedOrderUpsert};
use crate::domain::ports::{
    CrmGateway, CrmGatewayError, NewContact, ProcessedOrderRepository, StoreError,
};

/// Why a single order could not be synced.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderSyncError {
    #[error(transparent)]
    Phone(#[from] PhoneError),
    #[error(transparent)]
    Crm(#[from] CrmGatewayError),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl OrderSyncError {
    /// Fold this failure's API error counters into `delta`.
    pub fn count_into(&self, delta: &mut DailyStatsDelta) {
        if let Self::Crm(err) = self {
            delta.api_errors_crm += 1;
            if err.is_rate_limited() {
                delta.rate_limit_hits += 1;
            }
        }
    }
}

/// Result of a successful creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CreatedDeal {
    pub deal_id: CrmDealId,
    pub contact_created: bool,
}

/// What a creation would do, computed without calling the CRM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DealPreview {
    pub contact_name: String,
    pub masked_phone: String,
    pub price: i64,
}

/// Finds or creates the buyer contact and creates the deal in one
/// complex call.
pub struct DealCreator {
    crm: Arc<dyn CrmGateway>,
    template: NoteTemplate,
}

impl DealCreator {
    pub fn new(crm: Arc<dyn CrmGateway>, template: NoteTemplate) -> Self {
        Self { crm, template }
    }

    pub fn crm(&self) -> &Arc<dyn CrmGateway> {
        &self.crm
    }

    /// Validate `order` the way [`DealCreator::create`] would.
    pub fn preview(&self, order: &UpstreamOrder) -> Result<DealPreview, OrderSyncError> {
        let phone = PhoneNumber::from_buyer(&order.buyer)?;
        Ok(DealPreview {
            contact_name: contact_name(&order.buyer, Some(&phone)),
            masked_phone: phone.masked(),
            price: order.rounded_price(),
        })
    }

    /// Create the CRM deal for `order`.
    ///
    /// A missing or malformed buyer phone fails before any CRM call.
    pub async fn create(
        &self,
        order: &UpstreamOrder,
        origin: DealOrigin,
    ) -> Result<CreatedDeal, OrderSyncError> {
        let phone = PhoneNumber::from_buyer(&order.buyer)?;
        let name = contact_name(&order.buyer, Some(&phone));

        let (contact, contact_created) = match self.crm.find_contact_by_phone(&phone).await? {
            Some(contact) => {
                debug!(order_code = %order.code, contact_id = %contact.id, "reusing existing contact");
                (contact, false)
            }
            None => {
                info!(order_code = %order.code, phone = %phone.masked(), "creating contact");
                let contact = self
                    .crm
                    .create_contact(&NewContact {
                        name: name.clone(),
                        phone,
                    })
                    .await?;
                (contact, true)
            }
        };

        let deal = self
            .crm
            .create_deal_complex(&new_deal(order, contact.id, &name, &self.template, origin))
            .await?;
        Ok(CreatedDeal {
            deal_id: deal.id,
            contact_created,
        })
    }
}

/// Reads and writes processed-order records, timing each attempt.
#[derive(Clone)]
pub struct OrderLedger {
    repository: Arc<dyn ProcessedOrderRepository>,
    clock: Arc<dyn Clock>,
}

impl OrderLedger {
    pub fn new(repository: Arc<dyn ProcessedOrderRepository>, clock: Arc<dyn Clock>) -> Self {
        Self { repository, clock }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.utc()
    }

    /// Milliseconds elapsed since `started_at`, never negative.
    pub fn elapsed_ms(&self, started_at: DateTime<Utc>) -> u64 {
        u64::try_from(
            self.clock
                .utc()
                .signed_duration_since(started_at)
                .num_milliseconds(),
        )
        .unwrap_or(0)
    }

    pub async fn find(&self, order: &UpstreamOrder) -> Result<Option<ProcessedOrder>, StoreError> {
        self.repository.find_by_code(&order.code).await
    }

    /// Persist a successful create or repair; returns the processing time.
    pub async fn record_success(
        &self,
        order: &UpstreamOrder,
        deal_id: CrmDealId,
        started_at: DateTime<Utc>,
    ) -> Result<u64, StoreError> {
        let elapsed = self.elapsed_ms(started_at);
        self.repository
            .upsert(&ProcessedOrderUpsert::succeeded(
                order.code.clone(),
                deal_id,
                order.state.clone(),
                OrderFingerprint::of(order),
                elapsed,
                self.clock.utc(),
            ))
            .await?;
        Ok(elapsed)
    }

    /// Persist a failed attempt on top of `previous`.
    pub async fn record_failure(
        &self,
        previous: Option<&ProcessedOrder>,
        order: &UpstreamOrder,
        started_at: DateTime<Utc>,
        error: &OrderSyncError,
    ) -> Result<(), StoreError> {
        self.repository
            .upsert(&ProcessedOrderUpsert::failed(
                previous,
                order.code.clone(),
                order.state.clone(),
                OrderFingerprint::of(order),
                self.elapsed_ms(started_at),
                error.to_string(),
                self.clock.utc(),
            ))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::CrmContactId;
    use crate::domain::ports::{CrmContact, CrmDeal, MockCrmGateway};
    use crate::test_support::orders::order;

    fn gateway_with_existing_contact() -> MockCrmGateway {
        let mut crm = MockCrmGateway::new();
        crm.expect_find_contact_by_phone()
            .times(1)
            .returning(|_| {
                Ok(Some(CrmContact {
                    id: CrmContactId::new(11),
                    name: "Existing".to_owned(),
                }))
            });
        crm
    }

    #[tokio::test]
    async fn reuses_contact_found_by_phone() {
        let mut crm = gateway_with_existing_contact();
        crm.expect_create_contact().never();
        crm.expect_create_deal_complex()
            .withf(|deal| deal.contact_id == CrmContactId::new(11) && deal.tags == ["kaspi", "new"])
            .times(1)
            .returning(|_| Ok(CrmDeal { id: CrmDealId::new(90) }));
        let creator = DealCreator::new(Arc::new(crm), NoteTemplate::default());

        let created = creator
            .create(&order("ORDER-1"), DealOrigin::Poll)
            .await
            .expect("created");

        assert_eq!(
            created,
            CreatedDeal {
                deal_id: CrmDealId::new(90),
                contact_created: false
            }
        );
    }

    #[tokio::test]
    async fn creates_contact_with_normalised_phone() {
        let mut crm = MockCrmGateway::new();
        crm.expect_find_contact_by_phone()
            .withf(|phone| phone.as_str() == "+77012345678")
            .times(1)
            .returning(|_| Ok(None));
        crm.expect_create_contact()
            .withf(|contact| contact.phone.as_str() == "+77012345678")
            .times(1)
            .returning(|contact| {
                Ok(CrmContact {
                    id: CrmContactId::new(12),
                    name: contact.name.clone(),
                })
            });
        crm.expect_create_deal_complex()
            .times(1)
            .returning(|_| Ok(CrmDeal { id: CrmDealId::new(91) }));
        let creator = DealCreator::new(Arc::new(crm), NoteTemplate::default());

        let created = creator
            .create(&order("ORDER-2"), DealOrigin::Poll)
            .await
            .expect("created");

        assert!(created.contact_created);
    }

    #[tokio::test]
    async fn missing_phone_fails_before_any_crm_call() {
        let mut crm = MockCrmGateway::new();
        crm.expect_find_contact_by_phone().never();
        let creator = DealCreator::new(Arc::new(crm), NoteTemplate::default());
        let mut order = order("ORDER-3");
        order.buyer.phone = None;

        let error = creator
            .create(&order, DealOrigin::Poll)
            .await
            .expect_err("no phone");

        assert_eq!(error, OrderSyncError::Phone(PhoneError::Missing));
    }

    #[test]
    fn rate_limited_crm_failures_count_twice() {
        let mut delta = DailyStatsDelta::default();
        OrderSyncError::from(CrmGatewayError::rate_limited("429")).count_into(&mut delta);
        OrderSyncError::from(PhoneError::Missing).count_into(&mut delta);

        assert_eq!(delta.api_errors_crm, 1);
        assert_eq!(delta.rate_limit_hits, 1);
    }
}
