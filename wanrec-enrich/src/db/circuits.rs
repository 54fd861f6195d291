//! Circuit table (authoritative feed plus synced non-feed rows)

use sqlx::{Row, SqlitePool};
use tracing::warn;
use wanrec_common::Result;

use crate::models::{CircuitPurpose, CircuitRecord};

/// Enabled circuits in feed (insertion) order
///
/// Rows whose purpose is neither Primary nor Secondary cannot be placed on an
/// interface and are skipped with a warning.
pub async fn load_enabled_circuits(pool: &SqlitePool) -> Result<Vec<CircuitRecord>> {
    let rows = sqlx::query(
        r#"
        SELECT id, site_name, purpose, provider_name, speed, monthly_cost,
               ip_address, status, data_source
        FROM circuits
        WHERE lower(trim(status)) = 'enabled'
        ORDER BY id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let mut circuits = Vec::with_capacity(rows.len());
    for row in rows {
        let id: i64 = row.get("id");
        let purpose: String = row.get("purpose");
        let purpose = match purpose.parse::<CircuitPurpose>() {
            Ok(p) => p,
            Err(e) => {
                warn!(circuit_id = id, "Skipping circuit: {}", e);
                continue;
            }
        };

        circuits.push(CircuitRecord {
            id,
            site_name: row.get("site_name"),
            purpose,
            provider_name: row.get("provider_name"),
            speed: row.get("speed"),
            monthly_cost: row.get("monthly_cost"),
            ip_address: row.get("ip_address"),
            status: row.get("status"),
            data_source: row.get("data_source"),
        });
    }

    Ok(circuits)
}

/// Insert a circuit row, returning its id (`record.id` is ignored)
pub async fn insert_circuit(pool: &SqlitePool, record: &CircuitRecord) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO circuits (
            site_name, purpose, provider_name, speed, monthly_cost, ip_address, status, data_source
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&record.site_name)
    .bind(record.purpose.as_str())
    .bind(&record.provider_name)
    .bind(&record.speed)
    .bind(record.monthly_cost)
    .bind(&record.ip_address)
    .bind(&record.status)
    .bind(&record.data_source)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}
