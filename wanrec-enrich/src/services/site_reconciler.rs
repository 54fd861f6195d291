//! Per-site reconciliation rules
//!
//! Pure decision logic: given one site's telemetry, parsed notes, registry
//! resolutions and enabled feed circuits, produce the enriched record. No I/O
//! happens here; the orchestrator gathers the inputs and persists the output.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;

use crate::models::{
    CircuitPurpose, CircuitRecord, DeviceTelemetry, EnrichedCircuitRecord, PossibleProviderMatch,
    WanInterface, WanState, UNKNOWN_ORG,
};
use crate::services::note_parser::{ParsedInterfaceNote, ParsedNotes};
use crate::services::provider_matcher::{MatchOutcome, MatchReason, ProviderMatcher};
use crate::services::registry_resolver::Resolution;

/// Legacy corruption: one bare number and unit, e.g. "20.0 M"
static BARE_SPEED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\d+(?:\.\d+)?\s+[KMG]$").expect("bare speed regex"));

/// Legacy corruption: paired values without units, e.g. "300 x 30"
static UNITLESS_SPEED: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+(?:\.\d+)?\s*x\s*\d+(?:\.\d+)?$").expect("unitless speed regex"));

pub const CELL_SPEED: &str = "Cell";
pub const SATELLITE_SPEED: &str = "Satellite";

/// Single-word provider tokens that identify a cellular uplink
const CELL_TOKENS: &[&str] = &["cell", "vzw", "digi", "inseego", "accelerated", "t-mobile", "tmobile"];

/// Multi-word provider phrases that identify a cellular uplink
const CELL_PHRASES: &[&str] = &["verizon cell", "verizon wireless", "at&t cell", "vz gateway"];

const SATELLITE_TOKENS: &[&str] = &["starlink"];

/// Flip evidence weights
const FLIP_IP_WEIGHT: u32 = 2;
const FLIP_PROVIDER_WEIGHT: u32 = 1;
const FLIP_THRESHOLD: u32 = 2;

/// Evidence sources in strict precedence order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PrecedenceTier {
    /// Feed circuit whose IP equals the live uplink IP
    CircuitIp,
    /// Feed circuit whose provider matches the notes provider
    NotesProvider,
    /// Feed circuit whose provider matches the registry organization
    RegistryOrganization,
    /// Notes provider and speed, unconfirmed
    NotesFallback,
    /// Registry organization, unconfirmed
    RegistryFallback,
    Unknown,
}

impl PrecedenceTier {
    pub const ORDER: [PrecedenceTier; 6] = [
        PrecedenceTier::CircuitIp,
        PrecedenceTier::NotesProvider,
        PrecedenceTier::RegistryOrganization,
        PrecedenceTier::NotesFallback,
        PrecedenceTier::RegistryFallback,
        PrecedenceTier::Unknown,
    ];

    pub fn is_confirmed(self) -> bool {
        matches!(
            self,
            PrecedenceTier::CircuitIp
                | PrecedenceTier::NotesProvider
                | PrecedenceTier::RegistryOrganization
        )
    }
}

/// Everything known about one uplink before deciding
#[derive(Debug, Clone)]
pub struct InterfaceEvidence {
    pub wan: WanInterface,
    pub ip: String,
    pub note: ParsedInterfaceNote,
    /// `None` when the uplink reported no address
    pub registry: Option<Resolution>,
}

impl InterfaceEvidence {
    fn registry_org(&self) -> Option<&str> {
        self.registry
            .as_ref()
            .filter(|r| r.is_known())
            .map(|r| r.organization.as_str())
    }
}

/// Per-site evidence bundle
#[derive(Debug, Clone)]
pub struct SiteEvidence {
    pub network_name: String,
    pub wan1: InterfaceEvidence,
    pub wan2: InterfaceEvidence,
}

impl SiteEvidence {
    pub fn new(
        telemetry: &DeviceTelemetry,
        notes: &ParsedNotes,
        wan1_registry: Option<Resolution>,
        wan2_registry: Option<Resolution>,
    ) -> Self {
        Self {
            network_name: telemetry.network_name.clone(),
            wan1: InterfaceEvidence {
                wan: WanInterface::Wan1,
                ip: telemetry.ip(WanInterface::Wan1).to_string(),
                note: notes.wan1.clone(),
                registry: wan1_registry,
            },
            wan2: InterfaceEvidence {
                wan: WanInterface::Wan2,
                ip: telemetry.ip(WanInterface::Wan2).to_string(),
                note: notes.wan2.clone(),
                registry: wan2_registry,
            },
        }
    }

    pub fn get(&self, wan: WanInterface) -> &InterfaceEvidence {
        match wan {
            WanInterface::Wan1 => &self.wan1,
            WanInterface::Wan2 => &self.wan2,
        }
    }
}

/// How one interface was decided
#[derive(Debug, Clone, Serialize)]
pub struct InterfaceDecision {
    pub tier: PrecedenceTier,
    pub circuit_id: Option<i64>,
    pub match_outcome: Option<MatchOutcome>,
}

/// Output of [`reconcile_site`]
#[derive(Debug, Clone)]
pub struct SiteReconciliation {
    pub record: EnrichedCircuitRecord,
    pub wan1: InterfaceDecision,
    pub wan2: InterfaceDecision,
    pub flipped: bool,
    /// Enabled circuits no interface claimed
    pub unmatched_circuits: usize,
    /// Possible-band provider scores seen by interfaces that stayed unconfirmed
    pub possible_matches: Vec<PossibleProviderMatch>,
}

impl SiteReconciliation {
    pub fn decision(&self, wan: WanInterface) -> &InterfaceDecision {
        match wan {
            WanInterface::Wan1 => &self.wan1,
            WanInterface::Wan2 => &self.wan2,
        }
    }

    pub fn unconfirmed_interfaces(&self) -> usize {
        [&self.record.wan1, &self.record.wan2]
            .iter()
            .filter(|w| !w.confirmed)
            .count()
    }
}

/// Speed strings known to be legacy corruption and that force a refresh
pub fn is_malformed_speed(speed: &str) -> bool {
    let speed = speed.trim();
    BARE_SPEED.is_match(speed) || UNITLESS_SPEED.is_match(speed)
}

/// "Cell" / "Satellite" for providers that are cellular or satellite uplinks
pub fn speed_override(provider: &str) -> Option<&'static str> {
    let lower = provider.trim().to_lowercase();
    if lower.is_empty() {
        return None;
    }
    let tokens: Vec<&str> = lower.split_whitespace().collect();

    if tokens.iter().any(|t| SATELLITE_TOKENS.contains(t)) {
        return Some(SATELLITE_SPEED);
    }
    if tokens.iter().any(|t| CELL_TOKENS.contains(t))
        || CELL_PHRASES.iter().any(|p| lower.contains(p))
    {
        return Some(CELL_SPEED);
    }
    None
}

/// Whether a previously persisted record can be kept without any lookup
///
/// True when both uplink IPs are unchanged, both persisted registry
/// organizations are present and not "Unknown", and neither persisted speed
/// is malformed.
pub fn can_skip(previous: &EnrichedCircuitRecord, telemetry: &DeviceTelemetry) -> bool {
    WanInterface::BOTH.iter().all(|&wan| {
        let state = previous.wan(wan);
        state.ip.trim() == telemetry.ip(wan)
            && state.has_registry_org()
            && !is_malformed_speed(&state.speed)
    })
}

/// Detect a site whose WAN1 carries the Secondary circuit and WAN2 the Primary
pub fn detect_flip(
    evidence: &SiteEvidence,
    circuits: &[CircuitRecord],
    matcher: &ProviderMatcher,
) -> bool {
    let mut straight = 0;
    let mut flipped = 0;

    for wan in WanInterface::BOTH {
        let iface = evidence.get(wan);
        let expected = wan.default_purpose();

        for circuit in circuits {
            let weight = if circuit.has_ip(&iface.ip) {
                FLIP_IP_WEIGHT
            } else if iface.note.has_provider()
                && matcher
                    .is_match(&circuit.provider_name, &iface.note.provider_raw, circuit.purpose)
                    .is_match
            {
                FLIP_PROVIDER_WEIGHT
            } else {
                0
            };

            if circuit.purpose == expected {
                straight += weight;
            } else {
                flipped += weight;
            }
        }
    }

    flipped >= FLIP_THRESHOLD && flipped > straight
}

/// Decide both interfaces of one site
///
/// `circuits` must already be restricted to the site's enabled circuits, in
/// feed order. Tiers are applied across both interfaces before moving to the
/// next tier, and a circuit claimed by one interface is not offered to the other.
pub fn reconcile_site(
    evidence: &SiteEvidence,
    circuits: &[CircuitRecord],
    matcher: &ProviderMatcher,
) -> SiteReconciliation {
    let flipped = detect_flip(evidence, circuits, matcher);
    let expected_role = |wan: WanInterface| {
        if flipped {
            wan.other().default_purpose()
        } else {
            wan.default_purpose()
        }
    };

    let mut claimed: HashSet<usize> = HashSet::new();
    let mut decided: [Option<(InterfaceDecision, WanState)>; 2] = [None, None];
    let mut near_misses: [Vec<NearMiss>; 2] = [Vec::new(), Vec::new()];

    for tier in PrecedenceTier::ORDER {
        for wan in WanInterface::BOTH {
            let slot = wan_index(wan);
            if decided[slot].is_some() {
                continue;
            }
            let iface = evidence.get(wan);
            let role = expected_role(wan);

            let attempt = attempt_tier(
                tier,
                iface,
                role,
                circuits,
                &claimed,
                matcher,
                &mut near_misses[slot],
            );
            if let Some((decision, state, circuit_idx)) = attempt {
                if let Some(idx) = circuit_idx {
                    claimed.insert(idx);
                }
                decided[slot] = Some((decision, state));
            }
        }
    }

    let [wan1, wan2] = decided;
    let (wan1_decision, wan1_state) = wan1
        .unwrap_or_else(|| unknown_decision(&evidence.wan1, expected_role(WanInterface::Wan1)));
    let (wan2_decision, wan2_state) = wan2
        .unwrap_or_else(|| unknown_decision(&evidence.wan2, expected_role(WanInterface::Wan2)));

    let mut possible_matches = Vec::new();
    for (wan, state) in [(WanInterface::Wan1, &wan1_state), (WanInterface::Wan2, &wan2_state)] {
        if !state.confirmed {
            collect_possible(
                &mut possible_matches,
                &evidence.network_name,
                wan,
                &near_misses[wan_index(wan)],
                circuits,
            );
        }
    }

    SiteReconciliation {
        record: EnrichedCircuitRecord {
            network_name: evidence.network_name.clone(),
            wan1: wan1_state,
            wan2: wan2_state,
            last_updated: chrono::Utc::now(),
        },
        wan1: wan1_decision,
        wan2: wan2_decision,
        flipped,
        unmatched_circuits: circuits.len().saturating_sub(claimed.len()),
        possible_matches,
    }
}

/// A circuit that scored in the possible band against one candidate name
#[derive(Debug, Clone)]
struct NearMiss {
    circuit_idx: usize,
    candidate: String,
    score: u8,
}

/// One entry per (circuit provider, candidate) pair, keeping the best score
fn collect_possible(
    out: &mut Vec<PossibleProviderMatch>,
    site: &str,
    wan: WanInterface,
    near_misses: &[NearMiss],
    circuits: &[CircuitRecord],
) {
    let start = out.len();
    for miss in near_misses {
        let circuit_provider = circuits[miss.circuit_idx].provider_name.trim();
        let existing = out[start..].iter_mut().find(|p| {
            p.circuit_provider.eq_ignore_ascii_case(circuit_provider)
                && p.candidate.eq_ignore_ascii_case(&miss.candidate)
        });
        match existing {
            Some(p) => p.score = p.score.max(miss.score),
            None => out.push(PossibleProviderMatch {
                site: site.to_string(),
                wan,
                circuit_provider: circuit_provider.to_string(),
                candidate: miss.candidate.clone(),
                score: miss.score,
            }),
        }
    }
}

fn wan_index(wan: WanInterface) -> usize {
    match wan {
        WanInterface::Wan1 => 0,
        WanInterface::Wan2 => 1,
    }
}

fn attempt_tier(
    tier: PrecedenceTier,
    iface: &InterfaceEvidence,
    role: CircuitPurpose,
    circuits: &[CircuitRecord],
    claimed: &HashSet<usize>,
    matcher: &ProviderMatcher,
    near_misses: &mut Vec<NearMiss>,
) -> Option<(InterfaceDecision, WanState, Option<usize>)> {
    match tier {
        PrecedenceTier::CircuitIp => {
            let idx = circuits
                .iter()
                .enumerate()
                .filter(|(i, _)| !claimed.contains(i))
                .find(|(_, c)| c.has_ip(&iface.ip))
                .map(|(i, _)| i)?;
            Some(confirmed(tier, iface, &circuits[idx], idx, None))
        }
        PrecedenceTier::NotesProvider => {
            if !iface.note.has_provider() {
                return None;
            }
            let (idx, outcome) = best_provider_match(
                &iface.note.provider_raw,
                role,
                circuits,
                claimed,
                matcher,
                near_misses,
            )?;
            Some(confirmed(tier, iface, &circuits[idx], idx, Some(outcome)))
        }
        PrecedenceTier::RegistryOrganization => {
            let org = iface.registry_org()?;
            let (idx, outcome) =
                best_provider_match(org, role, circuits, claimed, matcher, near_misses)?;
            Some(confirmed(tier, iface, &circuits[idx], idx, Some(outcome)))
        }
        PrecedenceTier::NotesFallback => {
            if !iface.note.has_provider() {
                return None;
            }
            let provider = matcher.canonical(&iface.note.provider_raw);
            let state = unconfirmed_state(iface, role, &provider, &iface.note.speed_raw);
            Some((decision(tier, None, None), state, None))
        }
        PrecedenceTier::RegistryFallback => {
            let org = iface.registry_org()?;
            let state = unconfirmed_state(iface, role, org, "");
            Some((decision(tier, None, None), state, None))
        }
        PrecedenceTier::Unknown => {
            let (d, s) = unknown_decision(iface, role);
            Some((d, s, None))
        }
    }
}

/// Highest-confidence matching unclaimed circuit; ties prefer the circuit whose
/// purpose equals the interface's expected role, then feed order. Possible-band
/// scores are appended to `near_misses`.
fn best_provider_match(
    provider: &str,
    role: CircuitPurpose,
    circuits: &[CircuitRecord],
    claimed: &HashSet<usize>,
    matcher: &ProviderMatcher,
    near_misses: &mut Vec<NearMiss>,
) -> Option<(usize, MatchOutcome)> {
    let mut best: Option<(usize, MatchOutcome)> = None;

    for (idx, circuit) in circuits.iter().enumerate() {
        if claimed.contains(&idx) {
            continue;
        }
        let outcome = matcher.is_match(&circuit.provider_name, provider, circuit.purpose);
        if !outcome.is_match {
            if outcome.reason == MatchReason::PossibleMatch {
                near_misses.push(NearMiss {
                    circuit_idx: idx,
                    candidate: provider.trim().to_string(),
                    score: outcome.confidence,
                });
            }
            continue;
        }

        let better = match &best {
            None => true,
            Some((best_idx, best_outcome)) => {
                let best_role = circuits[*best_idx].purpose == role;
                let this_role = circuit.purpose == role;
                (outcome.confidence, this_role) > (best_outcome.confidence, best_role)
            }
        };
        if better {
            best = Some((idx, outcome));
        }
    }

    best
}

fn confirmed(
    tier: PrecedenceTier,
    iface: &InterfaceEvidence,
    circuit: &CircuitRecord,
    idx: usize,
    outcome: Option<MatchOutcome>,
) -> (InterfaceDecision, WanState, Option<usize>) {
    let speed = if circuit.speed.trim().is_empty() {
        iface.note.speed_raw.clone()
    } else {
        circuit.speed.trim().to_string()
    };

    let state = WanState {
        provider: circuit.provider_name.trim().to_string(),
        speed: apply_speed_override(&circuit.provider_name, speed),
        monthly_cost: Some(circuit.monthly_cost),
        circuit_role: circuit.purpose,
        confirmed: true,
        ip: iface.ip.clone(),
        registry_org: registry_org_field(iface),
    };

    (decision(tier, Some(circuit.id), outcome), state, Some(idx))
}

fn unconfirmed_state(
    iface: &InterfaceEvidence,
    role: CircuitPurpose,
    provider: &str,
    speed: &str,
) -> WanState {
    WanState {
        provider: provider.to_string(),
        speed: apply_speed_override(provider, speed.trim().to_string()),
        monthly_cost: None,
        circuit_role: role,
        confirmed: false,
        ip: iface.ip.clone(),
        registry_org: registry_org_field(iface),
    }
}

fn unknown_decision(iface: &InterfaceEvidence, role: CircuitPurpose) -> (InterfaceDecision, WanState) {
    (
        decision(PrecedenceTier::Unknown, None, None),
        unconfirmed_state(iface, role, UNKNOWN_ORG, ""),
    )
}

fn decision(
    tier: PrecedenceTier,
    circuit_id: Option<i64>,
    match_outcome: Option<MatchOutcome>,
) -> InterfaceDecision {
    InterfaceDecision {
        tier,
        circuit_id,
        match_outcome,
    }
}

fn apply_speed_override(provider: &str, speed: String) -> String {
    speed_override(provider)
        .map(str::to_string)
        .unwrap_or(speed)
}

/// Registry organization as persisted: the resolved name, or empty when no address was reported
fn registry_org_field(iface: &InterfaceEvidence) -> String {
    iface
        .registry
        .as_ref()
        .map(|r| r.organization.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_speed_detection() {
        assert!(is_malformed_speed("20.0 M"));
        assert!(is_malformed_speed("300 M"));
        assert!(is_malformed_speed("300 x 30"));
        assert!(!is_malformed_speed("20.0M x 20.0M"));
        assert!(!is_malformed_speed("Cell"));
        assert!(!is_malformed_speed("Satellite"));
        assert!(!is_malformed_speed(""));
    }

    #[test]
    fn cellular_and_satellite_overrides() {
        assert_eq!(speed_override("VZW Cell"), Some("Cell"));
        assert_eq!(speed_override("Verizon Wireless"), Some("Cell"));
        assert_eq!(speed_override("Digi"), Some("Cell"));
        assert_eq!(speed_override("Inseego"), Some("Cell"));
        assert_eq!(speed_override("AT&T Cell"), Some("Cell"));
        assert_eq!(speed_override("Starlink"), Some("Satellite"));
        assert_eq!(speed_override("Digital West Networks"), None);
        assert_eq!(speed_override("Verizon Business"), None);
        assert_eq!(speed_override("Comcast"), None);
        assert_eq!(speed_override(""), None);
    }
}
