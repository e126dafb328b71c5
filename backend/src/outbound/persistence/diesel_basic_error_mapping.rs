//! Shared Diesel error mapping for the sync-state repositories.

use tracing::debug;

use super::pool::PoolError;
use crate::domain::ports::StoreError;

/// Map pool errors into store connection errors.
pub(super) fn map_pool_error(error: PoolError) -> StoreError {
    match error {
        PoolError::Checkout { message } => StoreError::connection(message),
        PoolError::Connect { database, message } => {
            StoreError::connection(format!("{database}: {message}"))
        }
    }
}

/// Map Diesel errors into store query or connection errors.
pub(super) fn map_diesel_error(error: diesel::result::Error) -> StoreError {
    use diesel::result::{DatabaseErrorKind, Error as DieselError};

    match &error {
        DieselError::DatabaseError(kind, info) => {
            debug!(?kind, message = info.message(), "diesel operation failed");
        }
        _ => debug!(
            error_type = %std::any::type_name_of_val(&error),
            "diesel operation failed"
        ),
    }

    match error {
        DieselError::NotFound => StoreError::query("record not found"),
        DieselError::QueryBuilderError(_) => StoreError::query("database query error"),
        DieselError::DatabaseError(DatabaseErrorKind::ClosedConnection, _) => {
            StoreError::connection("database connection error")
        }
        DieselError::DatabaseError(_, info) => {
            StoreError::query(format!("database error: {}", info.message()))
        }
        DieselError::DeserializationError(source) => {
            StoreError::corrupt(format!("row decode failed: {source}"))
        }
        _ => StoreError::query("database error"),
    }
}
