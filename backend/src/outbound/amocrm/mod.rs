//! CRM adapter: REST gateway, OAuth token handling, and wire DTOs.

mod dto;
mod http_gateway;
mod oauth;

pub use dto::DealPlacement;
pub use http_gateway::AmoHttpGateway;
pub use oauth::{HttpTokenRefresher, OAuthClientConfig, RefreshedTokens, TokenManager, TokenRefresher};
