//! Kaspi marketplace to amoCRM order synchronisation.
//!
//! Polls marketplace orders, creates one CRM deal per order exactly once,
//! and reconciles deals whose orders changed upstream. State lives in
//! PostgreSQL; see [`domain`] for the pipelines and [`app`] for wiring.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

pub mod app;
pub mod domain;
pub mod inbound;
pub mod outbound;
pub mod settings;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
