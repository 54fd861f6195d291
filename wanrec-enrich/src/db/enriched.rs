//! Enriched circuit records, one row per network

use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use tracing::warn;
use wanrec_common::{Error, Result};

use crate::models::{CircuitPurpose, EnrichedCircuitRecord, WanState};
use crate::utils::retry_on_lock;

use super::parse_timestamp;

const SELECT_COLUMNS: &str = r#"
    SELECT network_name,
           wan1_provider, wan1_speed, wan1_monthly_cost, wan1_circuit_role,
           wan1_confirmed, wan1_ip, wan1_registry_org,
           wan2_provider, wan2_speed, wan2_monthly_cost, wan2_circuit_role,
           wan2_confirmed, wan2_ip, wan2_registry_org,
           last_updated
    FROM enriched_circuits
"#;

/// Every readable persisted record, ordered by network name
///
/// A row that cannot be decoded is skipped with a warning; its site is then
/// treated as never reconciled and recomputed on the next run.
pub async fn load_all(pool: &SqlitePool) -> Result<Vec<EnrichedCircuitRecord>> {
    let sql = format!("{} ORDER BY network_name", SELECT_COLUMNS);
    let rows = sqlx::query(&sql).fetch_all(pool).await?;

    let mut records = Vec::with_capacity(rows.len());
    for row in &rows {
        match record_from_row(row) {
            Ok(record) => records.push(record),
            Err(e) => {
                let network_name: String = row.get("network_name");
                warn!(site = %network_name, "Skipping unreadable enriched record: {}", e);
            }
        }
    }
    Ok(records)
}

pub async fn load_one(pool: &SqlitePool, network_name: &str) -> Result<Option<EnrichedCircuitRecord>> {
    let sql = format!("{} WHERE network_name = ?", SELECT_COLUMNS);
    let row = sqlx::query(&sql).bind(network_name).fetch_optional(pool).await?;
    row.as_ref().map(record_from_row).transpose()
}

/// Full-record upsert for one site, in its own transaction
pub async fn upsert_record(pool: &SqlitePool, record: &EnrichedCircuitRecord, max_wait_ms: u64) -> Result<()> {
    let last_updated = record.last_updated.to_rfc3339();
    let last_updated = last_updated.as_str();

    retry_on_lock("enriched record upsert", max_wait_ms, move || async move {
        let mut tx = pool.begin().await.map_err(Error::Database)?;

        sqlx::query(
            r#"
            INSERT INTO enriched_circuits (
                network_name,
                wan1_provider, wan1_speed, wan1_monthly_cost, wan1_circuit_role,
                wan1_confirmed, wan1_ip, wan1_registry_org,
                wan2_provider, wan2_speed, wan2_monthly_cost, wan2_circuit_role,
                wan2_confirmed, wan2_ip, wan2_registry_org,
                last_updated
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(network_name) DO UPDATE SET
                wan1_provider = excluded.wan1_provider,
                wan1_speed = excluded.wan1_speed,
                wan1_monthly_cost = excluded.wan1_monthly_cost,
                wan1_circuit_role = excluded.wan1_circuit_role,
                wan1_confirmed = excluded.wan1_confirmed,
                wan1_ip = excluded.wan1_ip,
                wan1_registry_org = excluded.wan1_registry_org,
                wan2_provider = excluded.wan2_provider,
                wan2_speed = excluded.wan2_speed,
                wan2_monthly_cost = excluded.wan2_monthly_cost,
                wan2_circuit_role = excluded.wan2_circuit_role,
                wan2_confirmed = excluded.wan2_confirmed,
                wan2_ip = excluded.wan2_ip,
                wan2_registry_org = excluded.wan2_registry_org,
                last_updated = excluded.last_updated
            "#,
        )
        .bind(&record.network_name)
        .bind(&record.wan1.provider)
        .bind(&record.wan1.speed)
        .bind(record.wan1.monthly_cost)
        .bind(record.wan1.circuit_role.as_str())
        .bind(record.wan1.confirmed)
        .bind(&record.wan1.ip)
        .bind(&record.wan1.registry_org)
        .bind(&record.wan2.provider)
        .bind(&record.wan2.speed)
        .bind(record.wan2.monthly_cost)
        .bind(record.wan2.circuit_role.as_str())
        .bind(record.wan2.confirmed)
        .bind(&record.wan2.ip)
        .bind(&record.wan2.registry_org)
        .bind(last_updated)
        .execute(&mut *tx)
        .await
        .map_err(Error::Database)?;

        tx.commit().await.map_err(Error::Database)?;
        Ok(())
    })
    .await
}

fn record_from_row(row: &SqliteRow) -> Result<EnrichedCircuitRecord> {
    let last_updated: String = row.get("last_updated");
    Ok(EnrichedCircuitRecord {
        network_name: row.get("network_name"),
        wan1: wan_from_row(row, "wan1")?,
        wan2: wan_from_row(row, "wan2")?,
        last_updated: parse_timestamp("last_updated", &last_updated)?,
    })
}

fn wan_from_row(row: &SqliteRow, prefix: &str) -> Result<WanState> {
    let column = |name: &str| format!("{}_{}", prefix, name);

    let role: String = row.get(column("circuit_role").as_str());
    let circuit_role = role
        .parse::<CircuitPurpose>()
        .map_err(|e| Error::Internal(format!("Failed to parse {}: {}", column("circuit_role"), e)))?;

    Ok(WanState {
        provider: row.get(column("provider").as_str()),
        speed: row.get(column("speed").as_str()),
        monthly_cost: row.get(column("monthly_cost").as_str()),
        circuit_role,
        confirmed: row.get(column("confirmed").as_str()),
        ip: row.get(column("ip").as_str()),
        registry_org: row.get(column("registry_org").as_str()),
    })
}
