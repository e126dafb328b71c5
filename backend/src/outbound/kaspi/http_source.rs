//! Reqwest-backed marketplace order source.
//!
//! This adapter owns transport details only: query building, the auth header,
//! timeout and HTTP error mapping, and JSON decoding into domain orders.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{Client, Url};
use tracing::{debug, warn};

use super::dto::OrdersResponseDto;
use crate::domain::ports::{OrderPage, OrderPageRequest, OrderSource, OrderSourceError};
use crate::outbound::http_support::{StatusClass, join_path, status_message};

const AUTH_HEADER: &str = "X-Auth-Token";

/// Connection settings for the order API.
pub struct KaspiHttpConfig {
    /// API root, e.g. `https://kaspi.kz/shop/api/v2`.
    pub base_url: Url,
    pub api_token: String,
    pub timeout: Duration,
}

pub struct KaspiHttpSource {
    client: Client,
    orders_url: Url,
    api_token: String,
}

impl KaspiHttpSource {
    /// # Errors
    ///
    /// Returns an error when the reqwest client cannot be constructed.
    pub fn new(config: KaspiHttpConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout).build()?;
        // Joining a fixed relative segment onto a parsed URL cannot fail.
        let orders_url = join_path(&config.base_url, "orders").unwrap_or(config.base_url);
        Ok(Self {
            client,
            orders_url,
            api_token: config.api_token,
        })
    }

    async fn fetch(
        &self,
        request: &OrderPageRequest,
        updated_after: Option<DateTime<Utc>>,
    ) -> Result<OrderPage, OrderSourceError> {
        let query = build_query(request, updated_after);
        debug!(page = request.page, sort = request.sort.as_query_value(), "listing orders");
        let response = self
            .client
            .get(self.orders_url.clone())
            .header(AUTH_HEADER, self.api_token.as_str())
            .header(reqwest::header::ACCEPT, "application/json")
            .query(&query)
            .send()
            .await
            .map_err(map_transport_error)?;

        let status = response.status();
        let body = response.bytes().await.map_err(map_transport_error)?;
        if !status.is_success() {
            return Err(map_status_error(status, body.as_ref()));
        }

        let decoded: OrdersResponseDto = serde_json::from_slice(body.as_ref()).map_err(|error| {
            OrderSourceError::decode(format!("invalid order listing payload: {error}"))
        })?;
        let decoded = decoded.into_domain();
        for reason in &decoded.rejected {
            warn!(page = request.page, reason = %reason, "skipping undecodable order");
        }
        debug!(
            page = request.page,
            orders = decoded.page.orders.len(),
            "order page received"
        );
        Ok(decoded.page)
    }
}

#[async_trait]
impl OrderSource for KaspiHttpSource {
    async fn list_orders(&self, request: &OrderPageRequest) -> Result<OrderPage, OrderSourceError> {
        self.fetch(request, None).await
    }

    async fn list_orders_updated_after(
        &self,
        updated_after: DateTime<Utc>,
        request: &OrderPageRequest,
    ) -> Result<OrderPage, OrderSourceError> {
        self.fetch(request, Some(updated_after)).await
    }
}

fn build_query(
    request: &OrderPageRequest,
    updated_after: Option<DateTime<Utc>>,
) -> Vec<(&'static str, String)> {
    let mut query = vec![
        ("page", request.page.to_string()),
        ("pageSize", request.page_size.to_string()),
        ("sort", request.sort.as_query_value().to_owned()),
    ];
    if !request.states.is_empty() {
        let states = request
            .states
            .iter()
            .map(|state| state.as_str())
            .collect::<Vec<_>>()
            .join(",");
        query.push(("state", states));
    }
    if let Some(at) = updated_after {
        query.push(("updatedAfter", at.to_rfc3339_opts(SecondsFormat::Millis, true)));
    }
    query
}

fn map_transport_error(error: reqwest::Error) -> OrderSourceError {
    if error.is_timeout() {
        OrderSourceError::timeout(error.to_string())
    } else {
        OrderSourceError::transport(error.to_string())
    }
}

fn map_status_error(status: reqwest::StatusCode, body: &[u8]) -> OrderSourceError {
    let message = status_message(status, body);
    match StatusClass::of(status) {
        StatusClass::RateLimited => OrderSourceError::rate_limited(message),
        StatusClass::Timeout => OrderSourceError::timeout(message),
        StatusClass::Unauthorized => OrderSourceError::unauthorized(message),
        StatusClass::Rejected => OrderSourceError::rejected(message),
        StatusClass::Transport => OrderSourceError::transport(message),
    }
}
