//! Embedded schema migrations for the sync-state store.

use diesel::Connection;
use diesel::pg::PgConnection;
use diesel_migrations::{EmbeddedMigrations, MigrationHarness, embed_migrations};
use tracing::info;

use crate::domain::ports::StoreError;

const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Apply every pending migration and return the versions that ran.
///
/// Diesel's harness is synchronous, so the work runs on the blocking pool.
pub async fn run_migrations(database_url: &str) -> Result<Vec<String>, StoreError> {
    let url = database_url.to_owned();
    tokio::task::spawn_blocking(move || {
        let mut conn = PgConnection::establish(&url)
            .map_err(|err| StoreError::connection(format!("migrations: {err}")))?;
        let applied = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|err| StoreError::query(format!("migrations: {err}")))?;
        Ok::<_, StoreError>(
            applied
                .into_iter()
                .map(|version| version.to_string())
                .collect::<Vec<_>>(),
        )
    })
    .await
    .map_err(|err| StoreError::query(format!("migration task: {err}")))?
    .inspect(|applied| info!(count = applied.len(), "migrations applied"))
}
