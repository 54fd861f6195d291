//! Device notes parser
//!
//! Gateway notes are free text typed by field technicians, usually shaped like
//! `WAN 1 Comcast 300.0M x 30.0M WAN 2 AT&T Cell`. This module splits the blob
//! into one segment per interface and pulls a provider name and a normalized
//! `<down>M x <up>M` speed out of each segment. Parsing never fails: text it
//! cannot interpret becomes the provider with an empty speed.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::models::WanInterface;

static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("whitespace regex"));

static WAN1_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)WAN\s*1\s*:?\s*").expect("WAN1 marker regex"));

static WAN2_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)WAN\s*2\s*:?\s*").expect("WAN2 marker regex"));

static SPEED_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+(?:\.\d+)?)\s*([MG]B?)\s*x\s*(\d+(?:\.\d+)?)\s*([MG]B?)")
        .expect("speed token regex")
});

/// Anything that is not a word character, whitespace, `&`, `/` or `-`
static PROVIDER_NOISE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^\w\s&/-]").expect("provider noise regex"));

/// Segments longer than this are not treated as a bare "Verizon Business" tag
const SHORT_SEGMENT_LEN: usize = 20;

/// Provider and speed parsed from one interface's notes segment
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedInterfaceNote {
    pub interface: WanInterface,
    pub provider_raw: String,
    pub speed_raw: String,
}

impl ParsedInterfaceNote {
    fn empty(interface: WanInterface) -> Self {
        Self::new(interface, "", "")
    }

    fn new(interface: WanInterface, provider: &str, speed: &str) -> Self {
        Self {
            interface,
            provider_raw: provider.to_string(),
            speed_raw: speed.to_string(),
        }
    }

    /// A provider name was found
    pub fn has_provider(&self) -> bool {
        !self.provider_raw.trim().is_empty()
    }

    /// A speed (numeric or Cell/Satellite) was found
    pub fn has_speed(&self) -> bool {
        !self.speed_raw.trim().is_empty()
    }
}

/// Both interfaces' parsed notes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParsedNotes {
    pub wan1: ParsedInterfaceNote,
    pub wan2: ParsedInterfaceNote,
}

impl ParsedNotes {
    pub fn get(&self, wan: WanInterface) -> &ParsedInterfaceNote {
        match wan {
            WanInterface::Wan1 => &self.wan1,
            WanInterface::Wan2 => &self.wan2,
        }
    }
}

/// Parse a notes blob into per-interface provider/speed pairs
pub fn parse_raw_notes(notes: &str) -> ParsedNotes {
    let text = collapse_whitespace(notes);
    if text.is_empty() {
        return ParsedNotes {
            wan1: ParsedInterfaceNote::empty(WanInterface::Wan1),
            wan2: ParsedInterfaceNote::empty(WanInterface::Wan2),
        };
    }

    let (wan1_text, wan2_text) = split_segments(&text);

    ParsedNotes {
        wan1: parse_segment(WanInterface::Wan1, wan1_text),
        wan2: parse_segment(WanInterface::Wan2, wan2_text),
    }
}

/// Split collapsed notes into (WAN1, WAN2) segments
///
/// Without any marker the whole text describes WAN1. With a single marker,
/// the other interface gets an empty segment.
fn split_segments(text: &str) -> (&str, &str) {
    let wan1 = WAN1_MARKER.find(text);
    let wan2 = WAN2_MARKER.find(text);

    match (wan1, wan2) {
        (Some(m1), Some(m2)) if m1.start() < m2.start() => {
            (&text[m1.end()..m2.start()], &text[m2.end()..])
        }
        (Some(m1), Some(m2)) => (&text[m1.end()..], &text[m2.end()..m1.start()]),
        (Some(m1), None) => (&text[m1.end()..], ""),
        (None, Some(m2)) => ("", &text[m2.end()..]),
        (None, None) => (text, ""),
    }
}

fn parse_segment(interface: WanInterface, segment: &str) -> ParsedInterfaceNote {
    let segment = segment.trim();
    if segment.is_empty() {
        return ParsedInterfaceNote::empty(interface);
    }

    if let Some(caps) = SPEED_TOKEN.captures(segment) {
        let down = format_speed_side(&caps[1], &caps[2]);
        let up = format_speed_side(&caps[3], &caps[4]);
        let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
        let provider = clean_provider(&segment[..start]);
        return ParsedInterfaceNote::new(interface, &provider, &format!("{} x {}", down, up));
    }

    let lower = segment.to_lowercase();

    if let Some(provider) = segment.strip_suffix(" Cell") {
        return ParsedInterfaceNote::new(interface, &clean_provider(provider), "Cell");
    }
    if lower.contains("starlink") && lower.contains("satellite") {
        return ParsedInterfaceNote::new(interface, "Starlink", "Satellite");
    }
    if lower.contains("verizon business") && segment.len() < SHORT_SEGMENT_LEN {
        return ParsedInterfaceNote::new(interface, "Verizon Business", "Cell");
    }
    if lower.contains("vz gateway") || lower.contains("vzg") {
        return ParsedInterfaceNote::new(interface, "VZW Cell", "Cell");
    }
    let upper = segment.to_uppercase();
    if upper == "DIG" || upper == "DIGI" {
        return ParsedInterfaceNote::new(interface, "Digi", "Cell");
    }
    if lower.contains("accelerated") {
        return ParsedInterfaceNote::new(interface, "Accelerated", "Cell");
    }
    if lower == "unknown" {
        return ParsedInterfaceNote::empty(interface);
    }

    ParsedInterfaceNote::new(interface, &clean_provider(segment), "")
}

/// One side of a speed token, in megabits with one decimal
fn format_speed_side(value: &str, unit: &str) -> String {
    let mut mbps: f64 = value.parse().unwrap_or(0.0);
    if unit.to_ascii_uppercase().starts_with('G') {
        mbps *= 1000.0;
    }
    format!("{:.1}M", mbps)
}

fn clean_provider(text: &str) -> String {
    let cleaned = PROVIDER_NOISE.replace_all(text, " ");
    collapse_whitespace(&cleaned)
}

fn collapse_whitespace(text: &str) -> String {
    WHITESPACE.replace_all(text, " ").trim().to_string()
}
