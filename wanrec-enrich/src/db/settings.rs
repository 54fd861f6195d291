//! Key/value settings table
//!
//! Values are stored as text and parsed on read. The settings table is the
//! highest-priority source for reconciliation settings.

use sqlx::{Pool, Sqlite};
use wanrec_common::{Error, Result};

/// Setting key for the `retry_on_lock` bound
pub const DB_MAX_LOCK_WAIT_MS_KEY: &str = "db_max_lock_wait_ms";

const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

/// Raw text value of a setting
pub async fn get_setting_raw(db: &Pool<Sqlite>, key: &str) -> Result<Option<String>> {
    let row: Option<(Option<String>,)> = sqlx::query_as("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(db)
        .await
        .map_err(Error::Database)?;

    Ok(row.and_then(|(value,)| value).filter(|v| !v.trim().is_empty()))
}

/// Typed value of a setting, `None` when unset
pub async fn get_setting<T>(db: &Pool<Sqlite>, key: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match get_setting_raw(db, key).await? {
        Some(value) => value
            .trim()
            .parse::<T>()
            .map(Some)
            .map_err(|e| Error::Config(format!("Setting '{}' has invalid value '{}': {}", key, value, e))),
        None => Ok(None),
    }
}

pub async fn set_setting<T>(db: &Pool<Sqlite>, key: &str, value: T) -> Result<()>
where
    T: std::fmt::Display,
{
    sqlx::query(
        "INSERT INTO settings (key, value) VALUES (?, ?)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value",
    )
    .bind(key)
    .bind(value.to_string())
    .execute(db)
    .await
    .map_err(Error::Database)?;

    Ok(())
}

/// Lock-wait bound for writes, 5000 ms when unset or unparsable
pub async fn get_max_lock_wait_ms(db: &Pool<Sqlite>) -> u64 {
    match get_setting::<u64>(db, DB_MAX_LOCK_WAIT_MS_KEY).await {
        Ok(Some(ms)) => ms,
        Ok(None) => DEFAULT_MAX_LOCK_WAIT_MS,
        Err(e) => {
            tracing::warn!("{}; using {} ms", e, DEFAULT_MAX_LOCK_WAIT_MS);
            DEFAULT_MAX_LOCK_WAIT_MS
        }
    }
}
