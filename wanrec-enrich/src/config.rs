//! Reconciliation settings
//!
//! Every key is resolved independently with priority Database → ENV → TOML →
//! compiled default. Environment variables are the key upper-cased with a
//! `WANREC_` prefix (`worker_concurrency` → `WANREC_WORKER_CONCURRENCY`); TOML
//! values live in the `[recon]` table.

use serde::Serialize;
use sqlx::{Pool, Sqlite};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};
use wanrec_common::config::TomlConfig;
use wanrec_common::{Error, Result};

use crate::db::settings::get_setting_raw;
use crate::services::circuit_sync::CircuitSyncPolicy;
use crate::services::fuzzy::FuzzyThresholds;
use crate::services::registry_client::DEFAULT_RDAP_BASE_URL;
use crate::services::registry_resolver::{default_static_ranges, ResolverSettings, StaticRange};

const ENV_PREFIX: &str = "WANREC_";

/// Patterns of network names that are never reconciled
pub const DEFAULT_EXCLUDED_SITE_PATTERNS: &[&str] =
    &["hub", "lab", "voice", "datacenter", "test", "store in a box"];

#[derive(Debug, Clone, Serialize)]
pub struct ReconSettings {
    pub worker_concurrency: usize,
    pub registry_min_interval_ms: u64,
    pub registry_max_attempts: u32,
    pub registry_backoff_ms: u64,
    pub registry_timeout_secs: u64,
    pub registry_base_url: String,
    pub unknown_retry_days: i64,
    pub fuzzy_match_threshold: u8,
    pub fuzzy_possible_threshold: u8,
    /// 0 disables the run deadline
    pub run_timeout_secs: u64,
    pub db_max_lock_wait_ms: u64,
    pub dns_timeout_ms: u64,
    pub circuit_sync_policy: CircuitSyncPolicy,
    pub excluded_site_patterns: Vec<String>,
    pub static_ranges: Vec<StaticRange>,
}

impl Default for ReconSettings {
    fn default() -> Self {
        Self {
            worker_concurrency: 8,
            registry_min_interval_ms: 500,
            registry_max_attempts: 3,
            registry_backoff_ms: 500,
            registry_timeout_secs: 15,
            registry_base_url: DEFAULT_RDAP_BASE_URL.to_string(),
            unknown_retry_days: 7,
            fuzzy_match_threshold: 80,
            fuzzy_possible_threshold: 60,
            run_timeout_secs: 3600,
            db_max_lock_wait_ms: 5000,
            dns_timeout_ms: 3000,
            circuit_sync_policy: CircuitSyncPolicy::Disabled,
            excluded_site_patterns: DEFAULT_EXCLUDED_SITE_PATTERNS
                .iter()
                .map(|p| p.to_string())
                .collect(),
            static_ranges: default_static_ranges(),
        }
    }
}

impl ReconSettings {
    /// Resolve every key from the database, environment and TOML config
    pub async fn resolve(db: &Pool<Sqlite>, toml_config: &TomlConfig) -> Result<Self> {
        let defaults = Self::default();

        let settings = Self {
            worker_concurrency: resolve_key(db, toml_config, "worker_concurrency", defaults.worker_concurrency).await?,
            registry_min_interval_ms: resolve_key(db, toml_config, "registry_min_interval_ms", defaults.registry_min_interval_ms).await?,
            registry_max_attempts: resolve_key(db, toml_config, "registry_max_attempts", defaults.registry_max_attempts).await?,
            registry_backoff_ms: resolve_key(db, toml_config, "registry_backoff_ms", defaults.registry_backoff_ms).await?,
            registry_timeout_secs: resolve_key(db, toml_config, "registry_timeout_secs", defaults.registry_timeout_secs).await?,
            registry_base_url: resolve_key(db, toml_config, "registry_base_url", defaults.registry_base_url).await?,
            unknown_retry_days: resolve_key(db, toml_config, "unknown_retry_days", defaults.unknown_retry_days).await?,
            fuzzy_match_threshold: resolve_key(db, toml_config, "fuzzy_match_threshold", defaults.fuzzy_match_threshold).await?,
            fuzzy_possible_threshold: resolve_key(db, toml_config, "fuzzy_possible_threshold", defaults.fuzzy_possible_threshold).await?,
            run_timeout_secs: resolve_key(db, toml_config, "run_timeout_secs", defaults.run_timeout_secs).await?,
            db_max_lock_wait_ms: resolve_key(db, toml_config, "db_max_lock_wait_ms", defaults.db_max_lock_wait_ms).await?,
            dns_timeout_ms: resolve_key(db, toml_config, "dns_timeout_ms", defaults.dns_timeout_ms).await?,
            circuit_sync_policy: resolve_key(db, toml_config, "circuit_sync_policy", defaults.circuit_sync_policy).await?,
            excluded_site_patterns: match resolve_raw(db, toml_config, "excluded_site_patterns").await? {
                Some(raw) => split_patterns(&raw),
                None => defaults.excluded_site_patterns,
            },
            static_ranges: toml_static_ranges(toml_config)?,
        };

        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.worker_concurrency == 0 {
            return Err(Error::Config("worker_concurrency must be at least 1".into()));
        }
        if self.registry_max_attempts == 0 {
            return Err(Error::Config("registry_max_attempts must be at least 1".into()));
        }
        if self.fuzzy_match_threshold > 100 || self.fuzzy_possible_threshold > self.fuzzy_match_threshold {
            return Err(Error::Config(format!(
                "fuzzy thresholds must satisfy possible ({}) <= match ({}) <= 100",
                self.fuzzy_possible_threshold, self.fuzzy_match_threshold
            )));
        }
        if self.unknown_retry_days < 0 {
            return Err(Error::Config("unknown_retry_days cannot be negative".into()));
        }
        Ok(())
    }

    pub fn resolver_settings(&self) -> ResolverSettings {
        ResolverSettings {
            max_attempts: self.registry_max_attempts,
            initial_backoff: Duration::from_millis(self.registry_backoff_ms),
            min_interval: Duration::from_millis(self.registry_min_interval_ms),
            static_ranges: self.static_ranges.clone(),
        }
    }

    pub fn fuzzy_thresholds(&self) -> FuzzyThresholds {
        FuzzyThresholds {
            match_at: self.fuzzy_match_threshold,
            possible_at: self.fuzzy_possible_threshold,
        }
    }

    pub fn unknown_retry_after(&self) -> chrono::Duration {
        chrono::Duration::days(self.unknown_retry_days)
    }

    pub fn run_timeout(&self) -> Option<Duration> {
        (self.run_timeout_secs > 0).then(|| Duration::from_secs(self.run_timeout_secs))
    }

    pub fn registry_timeout(&self) -> Duration {
        Duration::from_secs(self.registry_timeout_secs)
    }

    pub fn dns_timeout(&self) -> Duration {
        Duration::from_millis(self.dns_timeout_ms)
    }
}

/// Environment variable consulted for `key`
pub fn env_var_name(key: &str) -> String {
    format!("{}{}", ENV_PREFIX, key.to_ascii_uppercase())
}

/// Highest-priority raw value for `key`, warning when several sources set it
async fn resolve_raw(db: &Pool<Sqlite>, toml_config: &TomlConfig, key: &str) -> Result<Option<String>> {
    let db_value = get_setting_raw(db, key).await?;
    let env_value = std::env::var(env_var_name(key))
        .ok()
        .filter(|v| !v.trim().is_empty());
    let toml_value = toml_config.recon_value(key).filter(|v| !v.trim().is_empty());

    let sources: Vec<&str> = [
        db_value.as_ref().map(|_| "database"),
        env_value.as_ref().map(|_| "environment"),
        toml_value.as_ref().map(|_| "TOML"),
    ]
    .into_iter()
    .flatten()
    .collect();

    if sources.len() > 1 {
        warn!(
            "Setting '{}' found in multiple sources: {}. Using {} (highest priority).",
            key,
            sources.join(", "),
            sources[0]
        );
    } else if let Some(source) = sources.first() {
        debug!(key, source, "Setting resolved");
    }

    Ok(db_value.or(env_value).or(toml_value))
}

async fn resolve_key<T>(db: &Pool<Sqlite>, toml_config: &TomlConfig, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match resolve_raw(db, toml_config, key).await? {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|e| Error::Config(format!("Setting '{}' has invalid value '{}': {}", key, raw, e))),
        None => Ok(default),
    }
}

fn split_patterns(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|p| p.trim().to_lowercase())
        .filter(|p| !p.is_empty())
        .collect()
}

/// Built-in ranges plus `[recon] static_ranges`
///
/// Entries are either `"a.b.c.d/len=Organization"` strings or
/// `{ network = "a.b.c.d/len", organization = "..." }` tables.
fn toml_static_ranges(toml_config: &TomlConfig) -> Result<Vec<StaticRange>> {
    let mut ranges = default_static_ranges();

    let Some(value) = toml_config.recon.get("static_ranges") else {
        return Ok(ranges);
    };
    let items = value
        .as_array()
        .ok_or_else(|| Error::Config("[recon] static_ranges must be an array".into()))?;

    for item in items {
        let entry = match item {
            toml::Value::String(s) => s.clone(),
            toml::Value::Table(t) => {
                let field = |name: &str| t.get(name).and_then(toml::Value::as_str).unwrap_or("");
                format!("{}={}", field("network"), field("organization"))
            }
            other => {
                return Err(Error::Config(format!("Unsupported static range entry: {}", other)));
            }
        };
        ranges.push(entry.parse::<StaticRange>().map_err(Error::Config)?);
    }

    Ok(ranges)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_names_are_prefixed_upper_case() {
        assert_eq!(env_var_name("worker_concurrency"), "WANREC_WORKER_CONCURRENCY");
    }

    #[test]
    fn patterns_are_split_and_lowercased() {
        assert_eq!(split_patterns(" Hub, ,Store In A Box "), vec!["hub", "store in a box"]);
    }

    #[test]
    fn static_ranges_from_toml() {
        let config: TomlConfig = toml::from_str(
            r#"
            [recon]
            static_ranges = [
                "192.0.2.0/24=Example Carrier",
                { network = "198.51.100.0/25", organization = "Other Carrier" },
            ]
            "#,
        )
        .unwrap();

        let ranges = toml_static_ranges(&config).unwrap();
        assert_eq!(ranges.len(), 3);
        assert_eq!(ranges[1].organization, "Example Carrier");
        assert!(ranges[2].contains("198.51.100.100".parse().unwrap()));
        assert!(!ranges[2].contains("198.51.100.200".parse().unwrap()));
    }

    #[test]
    fn bad_static_range_is_config_error() {
        let config: TomlConfig = toml::from_str("[recon]\nstatic_ranges = [\"192.0.2.0=Nobody\"]").unwrap();
        assert!(matches!(toml_static_ranges(&config), Err(Error::Config(_))));
    }

    #[test]
    fn threshold_ordering_is_validated() {
        let settings = ReconSettings {
            fuzzy_possible_threshold: 90,
            ..ReconSettings::default()
        };
        assert!(settings.validate().is_err());
        assert!(ReconSettings::default().validate().is_ok());
        assert_eq!(ReconSettings::default().run_timeout(), Some(Duration::from_secs(3600)));
    }
}
