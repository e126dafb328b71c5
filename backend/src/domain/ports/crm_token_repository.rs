//! Port for persisted CRM OAuth tokens.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::StoreError;

/// Current OAuth token pair for the CRM account.
#[derive(Clone, PartialEq, Eq)]
pub struct CrmTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl std::fmt::Debug for CrmTokens {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrmTokens")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Token storage used by the CRM adapter across process runs.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CrmTokenRepository: Send + Sync {
    async fn load(&self) -> Result<Option<CrmTokens>, StoreError>;

    async fn store(&self, tokens: &CrmTokens) -> Result<(), StoreError>;
}
