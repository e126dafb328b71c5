//! HTTP surface of the sync service: the authenticated health endpoint.

mod health;

pub use health::{HealthCredentials, HealthEndpoint, health_routes};
