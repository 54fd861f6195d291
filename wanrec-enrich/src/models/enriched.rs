//! Canonical per-site output record

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CircuitPurpose, WanInterface, UNKNOWN_ORG};

/// Final state of one WAN interface
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WanState {
    pub provider: String,
    pub speed: String,
    pub monthly_cost: Option<f64>,
    pub circuit_role: CircuitPurpose,
    /// True only when provider and speed came from a matched feed circuit
    pub confirmed: bool,
    pub ip: String,
    pub registry_org: String,
}

impl WanState {
    pub fn unknown(role: CircuitPurpose) -> Self {
        Self {
            provider: UNKNOWN_ORG.to_string(),
            speed: String::new(),
            monthly_cost: None,
            circuit_role: role,
            confirmed: false,
            ip: String::new(),
            registry_org: String::new(),
        }
    }

    /// Registry organization was resolved to something usable
    pub fn has_registry_org(&self) -> bool {
        let org = self.registry_org.trim();
        !org.is_empty() && org != UNKNOWN_ORG
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedCircuitRecord {
    pub network_name: String,
    pub wan1: WanState,
    pub wan2: WanState,
    pub last_updated: DateTime<Utc>,
}

impl EnrichedCircuitRecord {
    /// Record for a site nothing could be learned about; it is still emitted
    /// so that absence keeps meaning "site does not exist".
    pub fn unknown(network_name: &str) -> Self {
        Self {
            network_name: network_name.to_string(),
            wan1: WanState::unknown(CircuitPurpose::Primary),
            wan2: WanState::unknown(CircuitPurpose::Secondary),
            last_updated: Utc::now(),
        }
    }

    pub fn wan(&self, wan: WanInterface) -> &WanState {
        match wan {
            WanInterface::Wan1 => &self.wan1,
            WanInterface::Wan2 => &self.wan2,
        }
    }

    /// Equal apart from `last_updated`
    pub fn same_content(&self, other: &EnrichedCircuitRecord) -> bool {
        self.network_name == other.network_name && self.wan1 == other.wan1 && self.wan2 == other.wan2
    }
}
