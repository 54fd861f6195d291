//! Reconciliation run lifecycle and summary

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CircuitPurpose, WanInterface};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunState {
    Running,
    Completed,
    /// Dispatch stopped by cancellation or run timeout
    Cancelled,
    /// Run-fatal collaborator failure
    Failed,
}

impl RunState {
    pub fn as_str(self) -> &'static str {
        match self {
            RunState::Running => "RUNNING",
            RunState::Completed => "COMPLETED",
            RunState::Cancelled => "CANCELLED",
            RunState::Failed => "FAILED",
        }
    }
}

/// Proposed update for a non-feed circuit row; never applied by this crate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CircuitSyncProposal {
    pub site_name: String,
    pub circuit_id: i64,
    pub purpose: CircuitPurpose,
    pub current_provider: String,
    pub current_speed: String,
    pub proposed_provider: String,
    pub proposed_speed: String,
}

/// Feed circuit whose provider scored in the possible band against an
/// interface that stayed unconfirmed; a candidate for a manual mapping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PossibleProviderMatch {
    pub site: String,
    pub wan: WanInterface,
    pub circuit_provider: String,
    /// Notes provider or registry organization the circuit was compared with
    pub candidate: String,
    pub score: u8,
}

/// Per-run summary; non-fatal problems are counted here instead of raised
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub state: RunState,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,

    pub sites_total: usize,
    pub sites_excluded: usize,
    pub sites_dispatched: usize,
    pub sites_not_dispatched: usize,
    /// Skipped before any lookup: IPs unchanged and persisted data healthy
    pub sites_skipped_unchanged: usize,
    /// Recomputed but identical to the persisted record
    pub sites_unchanged: usize,
    pub sites_written: usize,
    pub persistence_failures: usize,

    pub unresolved_ips: usize,
    pub unmatched_circuits: usize,
    pub unconfirmed_interfaces: usize,
    pub malformed_speed_corrections: usize,
    pub wan_flips_detected: usize,
    #[serde(default)]
    pub possible_match_count: usize,

    pub registry_lookups: usize,
    pub registry_cache_hits: usize,
    pub registry_failures: usize,
    pub ddns_resolutions: usize,

    pub failed_sites: Vec<String>,
    pub circuit_sync_proposals: Vec<CircuitSyncProposal>,
    #[serde(default)]
    pub possible_matches: Vec<PossibleProviderMatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl RunReport {
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            state: RunState::Running,
            started_at: Utc::now(),
            ended_at: None,
            sites_total: 0,
            sites_excluded: 0,
            sites_dispatched: 0,
            sites_not_dispatched: 0,
            sites_skipped_unchanged: 0,
            sites_unchanged: 0,
            sites_written: 0,
            persistence_failures: 0,
            unresolved_ips: 0,
            unmatched_circuits: 0,
            unconfirmed_interfaces: 0,
            malformed_speed_corrections: 0,
            wan_flips_detected: 0,
            possible_match_count: 0,
            registry_lookups: 0,
            registry_cache_hits: 0,
            registry_failures: 0,
            ddns_resolutions: 0,
            failed_sites: Vec::new(),
            circuit_sync_proposals: Vec::new(),
            possible_matches: Vec::new(),
            error: None,
        }
    }

    pub fn finish(&mut self, state: RunState) {
        self.state = state;
        self.ended_at = Some(Utc::now());
    }
}
