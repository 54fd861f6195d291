//! Provider identity matching
//!
//! Decides whether two provider names denote the same real-world provider.
//! Tiers are tried in order and the first success wins:
//!
//! 1. empty input: no match
//! 2. case-insensitive equality ("direct", 100)
//! 3. alias table on the raw lowercased names ("mapped", stored score)
//! 4. equality / alias table on normalized names ("normalized" 95, "normalized mapped")
//! 5. secondary-circuit conflict pairs ("secondary conflict override", 70)
//! 6. same provider family ("provider family", 90)
//! 7. fuzzy similarity ("fuzzy" at or above the match threshold, "possible match" in the band below)

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;

use crate::models::{CircuitPurpose, MappingType, ProviderMapping};
use crate::services::fuzzy::{self, FuzzyThresholds, FuzzyVerdict};

/// Confidence of a match on normalized equality
pub const NORMALIZED_CONFIDENCE: u8 = 95;

/// Confidence of a same-family match
pub const FAMILY_CONFIDENCE: u8 = 90;

/// Confidence of a secondary-circuit conflict override
pub const SECONDARY_OVERRIDE_CONFIDENCE: u8 = 70;

/// Alias candidates below this score are never returned as canonical names
pub const CANONICAL_MIN_CONFIDENCE: u8 = 90;

static VENDOR_PREFIX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^eb2-\s*").expect("vendor prefix regex"));

static ACCESS_QUALIFIER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*\b(?:dsl|fiber|cable|kinetic)$").expect("access qualifier regex"));

static LEADING_NOISE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:(?:dsr|agg|comcastagg|not\s+dsr|--|-)\s+)+").expect("leading noise regex")
});

static TRAILING_TIER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s*(?:extended\s+cable|workplace|broadband\s+ii|fiber\s+plus|/boi|/embarq|/qwest)$")
        .expect("trailing tier regex")
});

static PUNCTUATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s&/-]").expect("punctuation regex"));

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

/// Pairs the registry habitually attributes to the wrong provider on backup
/// circuits. Left side is matched as a substring, right side exactly, both normalized.
const SECONDARY_CONFLICTS: &[(&str, &str)] = &[
    ("comcast", "at&t"),
    ("cox", "at&t"),
    ("cox", "verizon"),
    ("spectrum", "at&t"),
];

/// Provider families; a name belongs to a family when it contains one of the
/// family's words.
const PROVIDER_FAMILIES: &[(&str, &[&str])] = &[
    ("Frontier", &["frontier"]),
    ("AT&T", &["at&t", "att", "sbc"]),
    ("Comcast", &["comcast", "xfinity"]),
    ("Charter", &["charter", "spectrum"]),
    ("Cox", &["cox"]),
    ("CenturyLink", &["centurylink", "lumen", "embarq", "qwest"]),
    ("Verizon", &["verizon", "vzw"]),
];

/// Why a pair did or did not match
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchReason {
    EmptyInput,
    Direct,
    Mapped,
    Normalized,
    NormalizedMapped,
    SecondaryConflictOverride,
    ProviderFamily,
    Fuzzy,
    PossibleMatch,
    NoMatch,
}

impl fmt::Display for MatchReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            MatchReason::EmptyInput => "empty input",
            MatchReason::Direct => "direct",
            MatchReason::Mapped => "mapped",
            MatchReason::Normalized => "normalized",
            MatchReason::NormalizedMapped => "normalized mapped",
            MatchReason::SecondaryConflictOverride => "secondary conflict override",
            MatchReason::ProviderFamily => "provider family",
            MatchReason::Fuzzy => "fuzzy",
            MatchReason::PossibleMatch => "possible match",
            MatchReason::NoMatch => "no match",
        };
        f.write_str(text)
    }
}

/// Result of comparing two provider names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MatchOutcome {
    pub is_match: bool,
    pub confidence: u8,
    pub reason: MatchReason,
}

impl MatchOutcome {
    fn matched(confidence: u8, reason: MatchReason) -> Self {
        Self {
            is_match: true,
            confidence,
            reason,
        }
    }

    fn unmatched(confidence: u8, reason: MatchReason) -> Self {
        Self {
            is_match: false,
            confidence,
            reason,
        }
    }
}

/// Immutable alias table, built once per run
///
/// Each alias is reachable under its lowercased source and its normalized
/// source. Candidates per key are ordered by descending confidence.
/// `ignore` rows are dropped on construction.
#[derive(Debug, Clone, Default)]
pub struct MappingTable {
    by_source: HashMap<String, Vec<ProviderMapping>>,
}

impl MappingTable {
    pub fn new(mappings: impl IntoIterator<Item = ProviderMapping>) -> Self {
        let mut by_source: HashMap<String, Vec<ProviderMapping>> = HashMap::new();

        for mapping in mappings {
            if mapping.mapping_type == MappingType::Ignore {
                continue;
            }
            let raw_key = mapping.source_provider.trim().to_lowercase();
            let normalized_key = normalize(&mapping.source_provider);

            let mut keys = vec![raw_key];
            if !keys.contains(&normalized_key) {
                keys.push(normalized_key);
            }
            for key in keys.into_iter().filter(|k| !k.is_empty()) {
                let entries = by_source.entry(key).or_default();
                if !entries.iter().any(|e| {
                    e.canonical_provider.eq_ignore_ascii_case(&mapping.canonical_provider)
                }) {
                    entries.push(mapping.clone());
                }
            }
        }

        for entries in by_source.values_mut() {
            entries.sort_by(|a, b| b.confidence_score.cmp(&a.confidence_score));
        }

        Self { by_source }
    }

    pub fn candidates(&self, key: &str) -> &[ProviderMapping] {
        self.by_source.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.by_source.is_empty()
    }

    /// Number of distinct lookup keys
    pub fn len(&self) -> usize {
        self.by_source.len()
    }
}

/// Canonical form of a provider name used by every tier after tier 3
///
/// Applied until it stops changing, which makes it idempotent. After the
/// first pass the input is lowercase and punctuation-free, so every later
/// pass either strips something or returns its input unchanged.
pub fn normalize(name: &str) -> String {
    let mut current = normalize_pass(name);
    loop {
        let next = normalize_pass(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn normalize_pass(name: &str) -> String {
    let mut s = name.trim().to_lowercase();

    if VENDOR_PREFIX.is_match(&s) {
        s = VENDOR_PREFIX.replace(&s, "").into_owned();
        s = ACCESS_QUALIFIER.replace(&s, "").into_owned();
    }

    s = LEADING_NOISE.replace(&s, "").into_owned();
    s = TRAILING_TIER.replace(&s, "").into_owned();
    s = PUNCTUATION.replace_all(&s, " ").into_owned();

    WHITESPACE.replace_all(&s, " ").trim().to_string()
}

/// Family a normalized name belongs to, if any
pub fn provider_family(normalized: &str) -> Option<&'static str> {
    let padded = format!(" {} ", normalized.replace(['/', '-'], " "));
    PROVIDER_FAMILIES
        .iter()
        .find(|(_, words)| words.iter().any(|w| padded.contains(&format!(" {} ", w))))
        .map(|(family, _)| *family)
}

/// Provider matcher over one run's alias table
#[derive(Debug, Clone, Default)]
pub struct ProviderMatcher {
    mappings: MappingTable,
    thresholds: FuzzyThresholds,
}

impl ProviderMatcher {
    pub fn new(mappings: MappingTable, thresholds: FuzzyThresholds) -> Self {
        Self {
            mappings,
            thresholds,
        }
    }

    pub fn mappings(&self) -> &MappingTable {
        &self.mappings
    }

    pub fn thresholds(&self) -> FuzzyThresholds {
        self.thresholds
    }

    /// Compare two provider names; `role` is the purpose of the circuit side
    pub fn is_match(&self, name_a: &str, name_b: &str, role: CircuitPurpose) -> MatchOutcome {
        let a = name_a.trim();
        let b = name_b.trim();
        if a.is_empty() || b.is_empty() {
            return MatchOutcome::unmatched(0, MatchReason::EmptyInput);
        }

        let a_lower = a.to_lowercase();
        let b_lower = b.to_lowercase();
        if a_lower == b_lower {
            return MatchOutcome::matched(100, MatchReason::Direct);
        }

        if let Some(score) = self.mapped_score(&a_lower, &b_lower, |c| c.trim().to_lowercase()) {
            return MatchOutcome::matched(score, MatchReason::Mapped);
        }

        let a_norm = normalize(a);
        let b_norm = normalize(b);
        if a_norm.is_empty() || b_norm.is_empty() {
            return MatchOutcome::unmatched(0, MatchReason::NoMatch);
        }
        if a_norm == b_norm {
            return MatchOutcome::matched(NORMALIZED_CONFIDENCE, MatchReason::Normalized);
        }
        if let Some(score) = self.mapped_score(&a_norm, &b_norm, normalize) {
            return MatchOutcome::matched(score, MatchReason::NormalizedMapped);
        }

        if role == CircuitPurpose::Secondary && is_secondary_conflict(&a_norm, &b_norm) {
            return MatchOutcome::matched(
                SECONDARY_OVERRIDE_CONFIDENCE,
                MatchReason::SecondaryConflictOverride,
            );
        }

        if let (Some(fa), Some(fb)) = (provider_family(&a_norm), provider_family(&b_norm)) {
            if fa == fb {
                return MatchOutcome::matched(FAMILY_CONFIDENCE, MatchReason::ProviderFamily);
            }
        }

        let score = fuzzy::combined_score(&a_norm, &b_norm);
        match self.thresholds.classify(score) {
            FuzzyVerdict::Match => MatchOutcome::matched(score, MatchReason::Fuzzy),
            FuzzyVerdict::PossibleMatch => {
                MatchOutcome::unmatched(score, MatchReason::PossibleMatch)
            }
            FuzzyVerdict::NoMatch => MatchOutcome::unmatched(0, MatchReason::NoMatch),
        }
    }

    /// Canonical provider for `name`, or `name` itself when no confident alias exists
    pub fn canonical(&self, name: &str) -> String {
        let raw = name.trim().to_lowercase();
        let normalized = normalize(name);

        [raw.as_str(), normalized.as_str()]
            .iter()
            .flat_map(|key| self.mappings.candidates(key))
            .find(|m| m.confidence_score >= CANONICAL_MIN_CONFIDENCE)
            .map(|m| m.canonical_provider.clone())
            .unwrap_or_else(|| name.to_string())
    }

    /// Score of an alias linking the two keys in either direction
    fn mapped_score(&self, a: &str, b: &str, form: impl Fn(&str) -> String) -> Option<u8> {
        let forward = self
            .mappings
            .candidates(a)
            .iter()
            .find(|m| form(&m.canonical_provider) == b)
            .map(|m| m.confidence_score);
        let backward = self
            .mappings
            .candidates(b)
            .iter()
            .find(|m| form(&m.canonical_provider) == a)
            .map(|m| m.confidence_score);

        forward.max(backward)
    }
}

fn is_secondary_conflict(a: &str, b: &str) -> bool {
    SECONDARY_CONFLICTS.iter().any(|(cable, telco)| {
        (a.contains(cable) && b == *telco) || (b.contains(cable) && a == *telco)
    })
}
