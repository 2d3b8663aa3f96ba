// Diesel migration runner
// diesel_migrations requires a sync connection, so migrations run inside
// spawn_blocking against a short-lived PgConnection

use diesel::{Connection, PgConnection};
use diesel_migrations::MigrationHarness;
use std::error::Error;
use tracing::info;

use crate::db::diesel_pool::MIGRATIONS;

/// Apply all pending migrations; returns how many ran
pub async fn run_migrations(database_url: &str) -> Result<usize, Box<dyn Error + Send + Sync>> {
    let url = database_url.to_string();

    let applied = tokio::task::spawn_blocking(move || -> Result<usize, Box<dyn Error + Send + Sync>> {
        let mut conn = PgConnection::establish(&url)
            .map_err(|e| format!("Failed to establish sync connection: {}", e))?;

        let versions = conn
            .run_pending_migrations(MIGRATIONS)
            .map_err(|e| format!("Migration failed: {}", e))?;

        Ok(versions.len())
    })
    .await
    .map_err(|e| format!("Migration task panicked: {}", e))??;

    if applied > 0 {
        info!("Applied {} pending migrations", applied);
    }

    Ok(applied)
}
