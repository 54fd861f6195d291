//! Proposals for non-feed circuit rows
//!
//! Circuit rows that did not come from the authoritative feed drift as sites
//! change carriers. After a run, confirmed enriched state can be offered as an
//! update for them. Nothing is written here: the caller receives proposals.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::models::{site_key, CircuitPurpose, CircuitRecord, CircuitSyncProposal, EnrichedCircuitRecord};
use crate::services::provider_matcher::ProviderMatcher;

/// Which sites may receive non-feed circuit proposals
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CircuitSyncPolicy {
    /// No proposals
    #[default]
    Disabled,
    /// Skip sites that have an enabled feed Primary circuit
    ExcludeDsrPrimary,
    /// Every site with non-feed circuits
    SyncRegardless,
}

impl CircuitSyncPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            CircuitSyncPolicy::Disabled => "disabled",
            CircuitSyncPolicy::ExcludeDsrPrimary => "exclude_dsr_primary",
            CircuitSyncPolicy::SyncRegardless => "sync_regardless",
        }
    }
}

impl fmt::Display for CircuitSyncPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CircuitSyncPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "disabled" | "off" => Ok(CircuitSyncPolicy::Disabled),
            "exclude_dsr_primary" => Ok(CircuitSyncPolicy::ExcludeDsrPrimary),
            "sync_regardless" => Ok(CircuitSyncPolicy::SyncRegardless),
            other => Err(format!("unrecognized circuit sync policy '{}'", other)),
        }
    }
}

/// Proposals for enabled non-feed circuits whose provider or speed differs
/// from the confirmed enriched state of the interface carrying their role
pub fn plan_circuit_sync(
    records: &[EnrichedCircuitRecord],
    circuits: &[CircuitRecord],
    policy: CircuitSyncPolicy,
    matcher: &ProviderMatcher,
) -> Vec<CircuitSyncProposal> {
    if policy == CircuitSyncPolicy::Disabled {
        return Vec::new();
    }

    let mut by_site: HashMap<String, Vec<&CircuitRecord>> = HashMap::new();
    for circuit in circuits.iter().filter(|c| c.is_enabled()) {
        by_site.entry(site_key(&circuit.site_name)).or_default().push(circuit);
    }

    let mut proposals = Vec::new();
    for record in records {
        let Some(site_circuits) = by_site.get(&site_key(&record.network_name)) else {
            continue;
        };

        let has_dsr_primary = site_circuits
            .iter()
            .any(|c| c.is_dsr() && c.purpose == CircuitPurpose::Primary);
        if policy == CircuitSyncPolicy::ExcludeDsrPrimary && has_dsr_primary {
            continue;
        }

        for circuit in site_circuits.iter().filter(|c| !c.is_dsr()) {
            let Some(state) = [&record.wan1, &record.wan2]
                .into_iter()
                .find(|s| s.confirmed && s.circuit_role == circuit.purpose)
            else {
                continue;
            };

            let provider_differs = !matcher
                .is_match(&circuit.provider_name, &state.provider, circuit.purpose)
                .is_match;
            let speed_differs =
                !state.speed.trim().is_empty() && state.speed.trim() != circuit.speed.trim();

            if provider_differs || speed_differs {
                proposals.push(CircuitSyncProposal {
                    site_name: circuit.site_name.clone(),
                    circuit_id: circuit.id,
                    purpose: circuit.purpose,
                    current_provider: circuit.provider_name.clone(),
                    current_speed: circuit.speed.clone(),
                    proposed_provider: state.provider.clone(),
                    proposed_speed: state.speed.clone(),
                });
            }
        }
    }

    proposals
}
