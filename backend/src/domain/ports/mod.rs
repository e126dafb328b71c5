//! Domain ports and supporting types for the hexagonal boundary.
//!
//! Driven ports cover the persistent sync-state store, the marketplace order
//! source, the CRM gateway, and alert delivery channels. Adapters live under
//! `crate::outbound`; in-memory doubles live in `crate::test_support`.

mod macros;
pub(crate) use macros::define_port_error;

mod alert_channel;
mod crm_gateway;
mod crm_token_repository;
mod daily_stats_repository;
mod error_log_repository;
mod lock_repository;
mod order_source;
mod processed_order_repository;
mod store_error;
mod sync_meta_repository;

#[cfg(test)]
pub use alert_channel::MockAlertChannel;
pub use alert_channel::{AlertChannel, AlertChannelError};
#[cfg(test)]
pub use crm_gateway::MockCrmGateway;
pub use crm_gateway::{
    CrmContact, CrmDeal, CrmGateway, CrmGatewayError, DealSnapshot, DealUpdate, LinkedLineItem,
    NewContact, NewDeal, UnlinkTarget,
};
#[cfg(test)]
pub use crm_token_repository::MockCrmTokenRepository;
pub use crm_token_repository::{CrmTokenRepository, CrmTokens};
#[cfg(test)]
pub use daily_stats_repository::MockDailyStatsRepository;
pub use daily_stats_repository::DailyStatsRepository;
#[cfg(test)]
pub use error_log_repository::MockErrorLogRepository;
pub use error_log_repository::ErrorLogRepository;
#[cfg(test)]
pub use lock_repository::MockLockRepository;
pub use lock_repository::{LockRecord, LockRepository};
#[cfg(test)]
pub use order_source::MockOrderSource;
pub use order_source::{
    OrderPage, OrderPageRequest, OrderSort, OrderSource, OrderSourceError, PageMeta,
};
#[cfg(test)]
pub use processed_order_repository::MockProcessedOrderRepository;
pub use processed_order_repository::ProcessedOrderRepository;
pub use store_error::StoreError;
#[cfg(test)]
pub use sync_meta_repository::MockSyncMetaRepository;
pub use sync_meta_repository::SyncMetaRepository;
