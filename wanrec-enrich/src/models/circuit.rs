//! Circuit rows from the authoritative feed

use serde::{Deserialize, Serialize};

use super::CircuitPurpose;

/// Status value of circuits that take part in matching
pub const ENABLED_STATUS: &str = "Enabled";

/// `data_source` of rows that came from the authoritative feed itself
pub const DSR_DATA_SOURCE: &str = "dsr";

/// Key used to join circuits to telemetry networks
pub fn site_key(name: &str) -> String {
    name.trim().to_lowercase()
}

/// A contracted circuit; read-only to this crate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitRecord {
    pub id: i64,
    pub site_name: String,
    pub purpose: CircuitPurpose,
    pub provider_name: String,
    pub speed: String,
    pub monthly_cost: f64,
    pub ip_address: Option<String>,
    pub status: String,
    pub data_source: String,
}

impl CircuitRecord {
    pub fn is_enabled(&self) -> bool {
        self.status.trim().eq_ignore_ascii_case(ENABLED_STATUS)
    }

    pub fn is_dsr(&self) -> bool {
        self.data_source.trim().eq_ignore_ascii_case(DSR_DATA_SOURCE)
    }

    /// True when the circuit's recorded IP equals `ip` exactly (after trimming)
    pub fn has_ip(&self, ip: &str) -> bool {
        let ip = ip.trim();
        !ip.is_empty()
            && self
                .ip_address
                .as_deref()
                .map(|own| own.trim() == ip)
                .unwrap_or(false)
    }
}
