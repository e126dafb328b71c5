//! Startup and run failures surfaced to the binary.

use crate::domain::SyncError;
use crate::domain::ports::{AlertChannelError, StoreError};
use crate::outbound::persistence::PoolError;
use crate::settings::SettingsError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Settings(#[from] SettingsError),
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Sync(#[from] SyncError),
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[from] reqwest::Error),
    #[error("failed to set up alert channel: {0}")]
    AlertChannel(#[from] AlertChannelError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
