//! Marketplace double serving a fixed order set page by page.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::UpstreamOrder;
use crate::domain::ports::{
    OrderPage, OrderPageRequest, OrderSource, OrderSourceError, PageMeta,
};

/// One call the pipelines made.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedRequest {
    pub updated_after: Option<DateTime<Utc>>,
    pub request: OrderPageRequest,
}

#[derive(Default)]
struct SourceState {
    orders: Vec<UpstreamOrder>,
    failures: VecDeque<OrderSourceError>,
    requests: Vec<RecordedRequest>,
    omit_meta: bool,
}

#[derive(Default)]
pub struct ScriptedOrderSource {
    state: Mutex<SourceState>,
}

impl ScriptedOrderSource {
    pub fn with_orders(orders: Vec<UpstreamOrder>) -> Self {
        let source = Self::default();
        source.set_orders(orders);
        source
    }

    fn state(&self) -> std::sync::MutexGuard<'_, SourceState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(_) => panic!("order source mutex"),
        }
    }

    pub fn set_orders(&self, orders: Vec<UpstreamOrder>) {
        self.state().orders = orders;
    }

    /// Answer without pagination metadata, like older API versions.
    pub fn omit_meta(&self) {
        self.state().omit_meta = true;
    }

    /// Fail the next listing call with `error`.
    pub fn fail_next(&self, error: OrderSourceError) {
        self.state().failures.push_back(error);
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state().requests.clone()
    }

    fn serve(
        &self,
        updated_after: Option<DateTime<Utc>>,
        request: &OrderPageRequest,
    ) -> Result<OrderPage, OrderSourceError> {
        let mut state = self.state();
        state.requests.push(RecordedRequest {
            updated_after,
            request: request.clone(),
        });
        if let Some(error) = state.failures.pop_front() {
            return Err(error);
        }

        let mut matching: Vec<UpstreamOrder> = state
            .orders
            .iter()
            .filter(|order| {
                request.states.is_empty() || request.states.contains(&order.state)
            })
            .filter(|order| updated_after.is_none_or(|after| order.last_modified_at() >= after))
            .cloned()
            .collect();
        if updated_after.is_some() {
            matching.sort_by_key(UpstreamOrder::last_modified_at);
        }

        let page_size = request.page_size.max(1) as usize;
        let start = (request.page.saturating_sub(1) as usize).saturating_mul(page_size);
        let total = matching.len();
        let orders: Vec<UpstreamOrder> = matching.into_iter().skip(start).take(page_size).collect();
        let total_pages = u32::try_from(total.div_ceil(page_size)).unwrap_or(u32::MAX);
        let meta = (!state.omit_meta).then(|| PageMeta {
            page: Some(request.page),
            page_size: Some(request.page_size),
            total_count: u32::try_from(total).ok(),
            total_pages: Some(total_pages),
        });
        Ok(OrderPage { orders, meta })
    }
}

#[async_trait]
impl OrderSource for ScriptedOrderSource {
    async fn list_orders(&self, request: &OrderPageRequest) -> Result<OrderPage, OrderSourceError> {
        self.serve(None, request)
    }

    async fn list_orders_updated_after(
        &self,
        updated_after: DateTime<Utc>,
        request: &OrderPageRequest,
    ) -> Result<OrderPage, OrderSourceError> {
        self.serve(Some(updated_after), request)
    }
}
