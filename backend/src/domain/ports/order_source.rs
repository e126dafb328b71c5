//! Driven port for the marketplace order API.
//!
//! The domain owns paging requests and the decoded order shape; transport,
//! authentication, and wire format stay in the adapter.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::define_port_error;
use crate::domain::{OrderState, UpstreamOrder};

/// Sort order requested from the marketplace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSort {
    /// Newest orders first; used by polling.
    CreatedAtDesc,
    /// Oldest modifications first; used by reconciliation.
    UpdatedAtAsc,
}

impl OrderSort {
    pub const fn as_query_value(self) -> &'static str {
        match self {
            Self::CreatedAtDesc => "createdAt:desc",
            Self::UpdatedAtAsc => "updatedAt:asc",
        }
    }
}

/// One page request against the order listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderPageRequest {
    /// States to include; empty means every state.
    pub states: Vec<OrderState>,
    /// One-based page number.
    pub page: u32,
    pub page_size: u32,
    pub sort: OrderSort,
}

/// Pagination metadata, when the marketplace reports it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PageMeta {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub total_count: Option<u32>,
    pub total_pages: Option<u32>,
}

/// One page of decoded orders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderPage {
    pub orders: Vec<UpstreamOrder>,
    pub meta: Option<PageMeta>,
}

impl OrderPage {
    /// Whether another page should be requested after `request`.
    ///
    /// Reported page counts win; without them a short page is the last one.
    pub fn has_next(&self, request: &OrderPageRequest) -> bool {
        if self.orders.is_empty() {
            return false;
        }
        match self.meta.and_then(|meta| meta.total_pages) {
            Some(total_pages) => request.page < total_pages,
            None => self.orders.len() >= request.page_size as usize,
        }
    }
}

define_port_error! {
    /// Errors surfaced while calling the marketplace.
    pub enum OrderSourceError {
        /// Network transport failed or the server answered with a 5xx.
        Transport => "order source transport failed",
        /// The call exceeded its timeout.
        Timeout => "order source timeout",
        /// The marketplace throttled the request.
        RateLimited => "order source rate limited request",
        /// Credentials were rejected.
        Unauthorized => "order source rejected credentials",
        /// The marketplace refused the request as invalid.
        Rejected => "order source rejected request",
        /// The response could not be decoded.
        Decode => "order source response decode failed",
    }
}

impl OrderSourceError {
    /// Return whether retrying this error is expected to help.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport { .. } | Self::Timeout { .. } | Self::RateLimited { .. }
        )
    }

    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }
}

/// Port for listing marketplace orders.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrderSource: Send + Sync {
    /// List orders filtered by state.
    async fn list_orders(&self, request: &OrderPageRequest) -> Result<OrderPage, OrderSourceError>;

    /// List orders modified at or after `updated_after`.
    async fn list_orders_updated_after(
        &self,
        updated_after: DateTime<Utc>,
        request: &OrderPageRequest,
    ) -> Result<OrderPage, OrderSourceError>;
}
