//! Test doubles shared by unit tests and the integration suite.
//!
//! Compiled for `cfg(test)` and behind the `test-support` feature.
#![expect(
    clippy::expect_used,
    reason = "fixtures fail loudly on invalid literals"
)]

pub mod alerts;
pub mod clock;
pub mod crm;
pub mod harness;
pub mod order_source;
pub mod orders;
pub mod store;
