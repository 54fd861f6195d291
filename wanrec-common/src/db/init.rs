//! Database initialization
//!
//! Opens (creating if needed) the SQLite database and applies the schema.
//! Every table is created with `CREATE TABLE IF NOT EXISTS`, so calling
//! [`create_schema`] repeatedly is safe.

use crate::Result;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use std::path::Path;
use tracing::info;

/// Default SQLite busy timeout, in milliseconds
const BUSY_TIMEOUT_MS: u32 = 5000;

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Per-site writes run from the worker pool, so allow several writers to queue
    let db_url = format!("sqlite://{}?mode=rwc", db_path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(16)
        .min_connections(2)
        .connect(&db_url)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    // WAL lets the HTTP readers proceed while a run is writing
    sqlx::query("PRAGMA journal_mode = WAL")
        .execute(&pool)
        .await?;

    let pragma_sql = format!("PRAGMA busy_timeout = {}", BUSY_TIMEOUT_MS);
    sqlx::query(&pragma_sql).execute(&pool).await?;

    create_schema(&pool).await?;

    Ok(pool)
}

/// Create every table used by wanrec (idempotent)
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_device_telemetry_table(pool).await?;
    create_circuits_table(pool).await?;
    create_provider_mappings_table(pool).await?;
    create_registry_cache_table(pool).await?;
    create_enriched_circuits_table(pool).await?;
    create_recon_runs_table(pool).await?;
    Ok(())
}

async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Latest gateway telemetry per network, written by the device collector
async fn create_device_telemetry_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS device_telemetry (
            network_name TEXT PRIMARY KEY,
            device_serial TEXT,
            wan1_ip TEXT,
            wan2_ip TEXT,
            notes TEXT,
            ddns_hostname TEXT,
            collected_at TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Circuit rows from the authoritative feed, written by the feed importer
async fn create_circuits_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS circuits (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            site_name TEXT NOT NULL,
            purpose TEXT NOT NULL,
            provider_name TEXT NOT NULL DEFAULT '',
            speed TEXT NOT NULL DEFAULT '',
            monthly_cost REAL NOT NULL DEFAULT 0.0,
            ip_address TEXT,
            status TEXT NOT NULL DEFAULT 'Enabled',
            data_source TEXT NOT NULL DEFAULT 'dsr'
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_circuits_site_name ON circuits(site_name)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_provider_mappings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS provider_mappings (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            source_provider TEXT NOT NULL,
            canonical_provider TEXT NOT NULL,
            mapping_type TEXT NOT NULL DEFAULT 'alias' CHECK (mapping_type IN ('alias', 'ignore')),
            confidence_score INTEGER NOT NULL DEFAULT 100
                CHECK (confidence_score BETWEEN 0 AND 100),
            UNIQUE (source_provider, canonical_provider)
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_registry_cache_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS registry_cache (
            ip_address TEXT PRIMARY KEY,
            organization_name TEXT NOT NULL,
            last_queried_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

async fn create_enriched_circuits_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS enriched_circuits (
            network_name TEXT PRIMARY KEY,
            wan1_provider TEXT NOT NULL DEFAULT 'Unknown',
            wan1_speed TEXT NOT NULL DEFAULT '',
            wan1_monthly_cost REAL,
            wan1_circuit_role TEXT NOT NULL DEFAULT 'Primary',
            wan1_confirmed INTEGER NOT NULL DEFAULT 0,
            wan1_ip TEXT NOT NULL DEFAULT '',
            wan1_registry_org TEXT NOT NULL DEFAULT '',
            wan2_provider TEXT NOT NULL DEFAULT 'Unknown',
            wan2_speed TEXT NOT NULL DEFAULT '',
            wan2_monthly_cost REAL,
            wan2_circuit_role TEXT NOT NULL DEFAULT 'Secondary',
            wan2_confirmed INTEGER NOT NULL DEFAULT 0,
            wan2_ip TEXT NOT NULL DEFAULT '',
            wan2_registry_org TEXT NOT NULL DEFAULT '',
            last_updated TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// One row per reconciliation run; the report is a JSON document
async fn create_recon_runs_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS recon_runs (
            run_id TEXT PRIMARY KEY,
            state TEXT NOT NULL,
            report TEXT NOT NULL,
            started_at TEXT NOT NULL,
            ended_at TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
