//! Composition root.
//!
//! Turns validated [`Settings`](crate::settings::Settings) into wired
//! pipelines and the health reporter. The binary and the integration suite
//! both build through here; tests swap the HTTP adapters and the store for
//! doubles via [`SyncApp::from_parts`] and [`StoreAdapters`].

mod error;
mod shutdown;
mod store;
mod wiring;

pub use error::AppError;
pub use shutdown::{Interrupted, run_until_shutdown, shutdown_signal};
pub use store::StoreAdapters;
pub use wiring::{SyncApp, build_alert_service, build_health_reporter};
