//! Bootstrap configuration loading and root folder resolution
//!
//! The TOML file carries only what must be known before the database is
//! open: where the root folder lives, how to log, and the `[recon]` table
//! whose keys act as the lowest-priority source for reconciliation settings.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming an explicit config file
pub const CONFIG_ENV_VAR: &str = "WANREC_CONFIG";

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV_VAR: &str = "WANREC_ROOT_FOLDER";

/// Database file name inside the root folder
pub const DATABASE_FILE_NAME: &str = "wanrec.db";

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Explicit database path, overrides `<root_folder>/wanrec.db`
    #[serde(default)]
    pub database_path: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Raw `[recon]` table, interpreted by the reconciliation crate
    #[serde(default)]
    pub recon: toml::Table,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (trace, debug, info, warn, error or an EnvFilter directive)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

impl TomlConfig {
    /// Parse a TOML config file
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
        toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))
    }

    /// Locate and load the config file, falling back to defaults when none exists
    ///
    /// An explicitly named file (CLI or environment) that cannot be read is an
    /// error; a missing file in the default locations is not.
    pub fn load_or_default(cli_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = cli_path {
            return Self::load(path);
        }
        if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
            return Self::load(Path::new(&path));
        }
        match default_config_file() {
            Some(path) => {
                debug!("Using config file {}", path.display());
                Self::load(&path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Look up a key of the `[recon]` table as a string
    ///
    /// Scalars are stringified so they can share one `FromStr` parsing path
    /// with database and environment values; arrays of strings are joined
    /// with commas.
    pub fn recon_value(&self, key: &str) -> Option<String> {
        match self.recon.get(key)? {
            toml::Value::String(s) => Some(s.clone()),
            toml::Value::Integer(i) => Some(i.to_string()),
            toml::Value::Float(f) => Some(f.to_string()),
            toml::Value::Boolean(b) => Some(b.to_string()),
            toml::Value::Array(items) => {
                let parts: Vec<&str> = items.iter().filter_map(|v| v.as_str()).collect();
                Some(parts.join(","))
            }
            other => {
                warn!(key, value = %other, "Unsupported TOML value type in [recon]");
                None
            }
        }
    }
}

/// Root folder resolution priority:
/// 1. Command-line argument
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent default
pub fn resolve_root_folder(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV_VAR) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// Database path: explicit CLI value, then TOML `database_path`, then `<root>/wanrec.db`
pub fn resolve_database_path(
    cli_arg: Option<&Path>,
    root_folder: &Path,
    config: &TomlConfig,
) -> PathBuf {
    cli_arg
        .map(Path::to_path_buf)
        .or_else(|| config.database_path.clone())
        .unwrap_or_else(|| root_folder.join(DATABASE_FILE_NAME))
}

/// First existing config file among the per-user and system locations
fn default_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("wanrec").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/wanrec/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/wanrec (or /var/lib/wanrec when no home is set)
        dirs::data_local_dir()
            .map(|d| d.join("wanrec"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/wanrec"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("wanrec"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/wanrec"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("wanrec"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\wanrec"))
    } else {
        PathBuf::from("./wanrec_data")
    }
}
