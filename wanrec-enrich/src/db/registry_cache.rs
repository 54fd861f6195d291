//! Persisted registry cache
//!
//! Loaded in full at the start of a run; entries learned during the run are
//! written back in one transaction at the end.

use sqlx::{Row, SqlitePool};
use tracing::warn;
use wanrec_common::{Error, Result};

use crate::models::RegistryCacheEntry;
use crate::utils::retry_on_lock;

use super::parse_timestamp;

pub async fn load_entries(pool: &SqlitePool) -> Result<Vec<RegistryCacheEntry>> {
    let rows = sqlx::query("SELECT ip_address, organization_name, last_queried_at FROM registry_cache")
        .fetch_all(pool)
        .await?;

    let mut entries = Vec::with_capacity(rows.len());
    for row in rows {
        let ip_address: String = row.get("ip_address");
        let last_queried_at: String = row.get("last_queried_at");
        match parse_timestamp("last_queried_at", &last_queried_at) {
            Ok(last_queried_at) => entries.push(RegistryCacheEntry {
                ip_address,
                organization_name: row.get("organization_name"),
                last_queried_at,
            }),
            // Treated as never queried
            Err(e) => warn!(ip = %ip_address, "Ignoring cache row: {}", e),
        }
    }

    Ok(entries)
}

/// Upsert `entries` in a single transaction
pub async fn upsert_entries(pool: &SqlitePool, entries: &[RegistryCacheEntry], max_wait_ms: u64) -> Result<()> {
    if entries.is_empty() {
        return Ok(());
    }

    retry_on_lock("registry cache flush", max_wait_ms, move || async move {
        let mut tx = pool.begin().await.map_err(Error::Database)?;
        for entry in entries {
            sqlx::query(
                r#"
                INSERT INTO registry_cache (ip_address, organization_name, last_queried_at)
                VALUES (?, ?, ?)
                ON CONFLICT(ip_address) DO UPDATE SET
                    organization_name = excluded.organization_name,
                    last_queried_at = excluded.last_queried_at
                "#,
            )
            .bind(&entry.ip_address)
            .bind(&entry.organization_name)
            .bind(entry.last_queried_at.to_rfc3339())
            .execute(&mut *tx)
            .await
            .map_err(Error::Database)?;
        }
        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    })
    .await
}
