//! OAuth token lifecycle for the CRM account.
//!
//! Tokens live in the sync-state store so that refreshed pairs survive process
//! restarts. The first run seeds the store from configuration.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::TimeDelta;
use mockable::Clock;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::domain::ports::{CrmGatewayError, CrmTokenRepository, CrmTokens};
use crate::outbound::http_support::status_message;

/// Token pair returned by a refresh.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct RefreshedTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_in: Option<i64>,
}

impl std::fmt::Debug for RefreshedTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshedTokens")
            .field("expires_in", &self.expires_in)
            .finish_non_exhaustive()
    }
}

/// Exchanges a refresh token for a new pair.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, CrmGatewayError>;
}

/// OAuth client registration.
#[derive(Clone)]
pub struct OAuthClientConfig {
    /// `{account}/oauth2/access_token`.
    pub token_url: Url,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    grant_type: &'static str,
    refresh_token: &'a str,
    redirect_uri: &'a str,
}

/// Refresher calling the account's token endpoint.
pub struct HttpTokenRefresher {
    client: Client,
    config: OAuthClientConfig,
}

impl HttpTokenRefresher {
    pub fn new(client: Client, config: OAuthClientConfig) -> Self {
        Self { client, config }
    }
}

#[async_trait]
impl TokenRefresher for HttpTokenRefresher {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedTokens, CrmGatewayError> {
        let response = self
            .client
            .post(self.config.token_url.clone())
            .json(&RefreshRequest {
                client_id: &self.config.client_id,
                client_secret: &self.config.client_secret,
                grant_type: "refresh_token",
                refresh_token,
                redirect_uri: &self.config.redirect_uri,
            })
            .send()
            .await
            .map_err(|error| CrmGatewayError::transport(format!("token refresh: {error}")))?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|error| CrmGatewayError::transport(format!("token refresh: {error}")))?;
        if !status.is_success() {
            return Err(CrmGatewayError::transport(format!(
                "token refresh: {}",
                status_message(status, body.as_ref())
            )));
        }
        serde_json::from_slice(body.as_ref())
            .map_err(|error| CrmGatewayError::decode(format!("token refresh payload: {error}")))
    }
}

/// Hands out access tokens and refreshes them on expiry or rejection.
pub struct TokenManager {
    repository: Arc<dyn CrmTokenRepository>,
    refresher: Arc<dyn TokenRefresher>,
    seed: CrmTokens,
    clock: Arc<dyn Clock>,
    refresh_lock: Mutex<()>,
}

impl TokenManager {
    pub fn new(
        repository: Arc<dyn CrmTokenRepository>,
        refresher: Arc<dyn TokenRefresher>,
        seed: CrmTokens,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            refresher,
            seed,
            clock,
            refresh_lock: Mutex::new(()),
        }
    }

    /// Current access token, refreshing first when the stored one expired.
    pub async fn access_token(&self) -> Result<String, CrmGatewayError> {
        let tokens = self.current().await?;
        let expired = tokens
            .expires_at
            .is_some_and(|expires_at| expires_at <= self.clock.utc());
        if expired {
            info!("crm access token expired; refreshing");
            return self.refresh(&tokens.access_token).await;
        }
        Ok(tokens.access_token)
    }

    /// Refresh the pair unless another caller already replaced `rejected`.
    pub async fn refresh(&self, rejected: &str) -> Result<String, CrmGatewayError> {
        let _guard = self.refresh_lock.lock().await;
        let tokens = self.current().await?;
        if tokens.access_token != rejected {
            return Ok(tokens.access_token);
        }
        let refreshed = self.refresher.refresh(&tokens.refresh_token).await?;
        let stored = CrmTokens {
            access_token: refreshed.access_token,
            refresh_token: refreshed.refresh_token,
            expires_at: refreshed
                .expires_in
                .map(|seconds| self.clock.utc() + TimeDelta::seconds(seconds)),
        };
        self.repository.store(&stored).await.map_err(store_error)?;
        info!("crm tokens refreshed");
        Ok(stored.access_token)
    }

    /// Run `call` with a token; a rejection triggers one refresh and one retry.
    pub async fn with_token<T, F, Fut>(&self, mut call: F) -> Result<T, CrmGatewayError>
    where
        F: FnMut(String) -> Fut,
        Fut: Future<Output = Result<T, CrmGatewayError>>,
    {
        let token = self.access_token().await?;
        match call(token.clone()).await {
            Err(CrmGatewayError::Unauthorized { message }) => {
                warn!(error = %message, "crm rejected access token; refreshing once");
                let token = self.refresh(&token).await?;
                call(token).await
            }
            other => other,
        }
    }

    async fn current(&self) -> Result<CrmTokens, CrmGatewayError> {
        if let Some(tokens) = self.repository.load().await.map_err(store_error)? {
            return Ok(tokens);
        }
        self.repository.store(&self.seed).await.map_err(store_error)?;
        Ok(self.seed.clone())
    }
}

fn store_error(error: crate::domain::ports::StoreError) -> CrmGatewayError {
    CrmGatewayError::transport(format!("token store: {error}"))
}
