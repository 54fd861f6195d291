//! Device telemetry table

use sqlx::{Row, SqlitePool};
use wanrec_common::Result;

use crate::models::DeviceTelemetry;

/// Every gateway snapshot, ordered by network name
pub async fn load_devices(pool: &SqlitePool) -> Result<Vec<DeviceTelemetry>> {
    let rows = sqlx::query(
        r#"
        SELECT network_name, device_serial, wan1_ip, wan2_ip, notes, ddns_hostname
        FROM device_telemetry
        ORDER BY network_name
        "#,
    )
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|row| DeviceTelemetry {
            network_name: row.get("network_name"),
            device_serial: row.get("device_serial"),
            wan1_ip: row.get("wan1_ip"),
            wan2_ip: row.get("wan2_ip"),
            notes: row.get::<Option<String>, _>("notes").unwrap_or_default(),
            ddns_hostname: row.get("ddns_hostname"),
        })
        .collect())
}

/// Insert or replace one snapshot
pub async fn upsert_device(pool: &SqlitePool, device: &DeviceTelemetry) -> Result<()> {
    sqlx::query(
        r#"
        INSERT INTO device_telemetry (
            network_name, device_serial, wan1_ip, wan2_ip, notes, ddns_hostname, collected_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(network_name) DO UPDATE SET
            device_serial = excluded.device_serial,
            wan1_ip = excluded.wan1_ip,
            wan2_ip = excluded.wan2_ip,
            notes = excluded.notes,
            ddns_hostname = excluded.ddns_hostname,
            collected_at = excluded.collected_at
        "#,
    )
    .bind(&device.network_name)
    .bind(&device.device_serial)
    .bind(&device.wan1_ip)
    .bind(&device.wan2_ip)
    .bind(&device.notes)
    .bind(&device.ddns_hostname)
    .bind(chrono::Utc::now().to_rfc3339())
    .execute(pool)
    .await?;

    Ok(())
}
