//! Outbound adapters implementing domain ports.
//!
//! - **kaspi**: marketplace order source over the Kaspi REST API
//! - **amocrm**: CRM gateway with OAuth token refresh and request pacing
//! - **alerts**: log and Telegram alert channels
//! - **persistence**: PostgreSQL-backed sync-state store using Diesel
//!
//! Adapters translate between domain types and wire or row representations.
//! They contain no sync logic.

pub mod alerts;
pub mod amocrm;
pub(crate) mod http_support;
pub mod kaspi;
pub mod persistence;
pub mod rate_gate;
