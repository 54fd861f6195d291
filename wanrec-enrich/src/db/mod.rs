//! Database access for wanrec-enrich
//!
//! Shares the SQLite database created by `wanrec_common::db`. The telemetry
//! and circuit tables are written by their collectors and only read here.

pub mod circuits;
pub mod enriched;
pub mod provider_mappings;
pub mod registry_cache;
pub mod runs;
pub mod settings;
pub mod telemetry;

use anyhow::Result;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::path::Path;

/// Open (creating if needed) the database at `db_path` with the full schema
pub async fn init_database_pool(db_path: &Path) -> Result<SqlitePool> {
    tracing::debug!("Connecting to database: {}", db_path.display());
    let pool = wanrec_common::db::init_database(db_path).await?;
    Ok(pool)
}

/// Parse an RFC 3339 column value
pub(crate) fn parse_timestamp(column: &str, value: &str) -> wanrec_common::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| wanrec_common::Error::Internal(format!("Failed to parse {}: {}", column, e)))
}

#[cfg(test)]
pub(crate) mod test_support {
    use sqlx::sqlite::SqlitePoolOptions;
    use sqlx::SqlitePool;

    /// Single-connection in-memory database with the full schema
    pub async fn memory_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        wanrec_common::db::create_schema(&pool).await.unwrap();
        pool
    }
}
