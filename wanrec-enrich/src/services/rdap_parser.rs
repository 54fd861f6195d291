//! Organization name extraction from RDAP IP network documents
//!
//! An RDAP response nests entities (registrant, abuse contact, NOC, parent
//! org, ...) each with a jCard `vcardArray`. The owning organization is the
//! most recently registered or changed entity of kind `org` that is not a
//! person or a role mailbox.

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::models::UNKNOWN_ORG;
use crate::services::registry_client::RegistryError;

const PERSONAL_TITLES: &[&str] = &["Mr.", "Ms.", "Mrs.", "Dr.", "Miss"];

const ROLE_WORDS: &[&str] = &["admin", "technical", "abuse", "noc"];

const CORPORATE_SUFFIXES: &[&str] = &[
    ", LLC", " LLC", ", L.L.C.", ", Inc.", " Inc.", ", Inc", " Inc", " Corporation",
    ", Corp.", " Corp.", " Corp", " Co.", ", Ltd.", " Ltd.", " Ltd",
];

const PRIVATE_CUSTOMER_PREFIX: &str = "private customer -";

/// Registered names that differ from the brand operators know the provider by
const BRAND_OVERRIDES: &[(&str, &str)] = &[
    ("spacex", "Starlink"),
    ("space exploration", "Starlink"),
    ("cellco", "Verizon"),
];

/// Canonical company names and the lowercase fragments that identify them
const COMPANY_NAMES: &[(&str, &[&str])] = &[
    ("AT&T", &["at&t", "ipadmin-att"]),
    ("Charter Communications", &["charter communications"]),
    ("Comcast", &["comcast"]),
    ("Cox Communications", &["cox communications"]),
    ("CenturyLink", &["centurylink", "lumen technologies", "level 3", "level3"]),
    ("Frontier Communications", &["frontier communications"]),
    ("Verizon", &["verizon"]),
    ("Optimum", &["optimum", "altice usa", "suddenlink"]),
    ("Crown Castle", &["crown castle"]),
    ("Cable One", &["cable one"]),
];

/// Handle fragments of the top-level network name, used when no entity qualifies
const NETWORK_NAME_PATTERNS: &[(&str, &str)] = &[
    ("CHARTER", "Charter Communications"),
    ("CC04", "Charter Communications"),
    ("COMCAST", "Comcast"),
    ("COX", "Cox Communications"),
    ("VERIZON", "Verizon"),
    ("CENTURYLINK", "CenturyLink"),
    ("FRONTIER", "Frontier Communications"),
];

struct Candidate {
    name: String,
    latest_event: Option<DateTime<Utc>>,
}

/// Pick the owning organization from an RDAP document
///
/// Returns "Unknown" for a well-formed document that names nobody; returns
/// `MalformedResponse` when the document is not an RDAP object at all.
pub fn extract_organization(doc: &Value) -> Result<String, RegistryError> {
    let object = doc
        .as_object()
        .ok_or_else(|| RegistryError::MalformedResponse("response is not a JSON object".into()))?;

    let mut candidates = Vec::new();
    match object.get("entities") {
        None | Some(Value::Null) => {}
        Some(Value::Array(entities)) => collect_candidates(entities, &mut candidates),
        Some(_) => {
            return Err(RegistryError::MalformedResponse(
                "'entities' is not an array".into(),
            ))
        }
    }

    // Stable sort keeps document order between equally dated entities
    candidates.sort_by(|a, b| b.latest_event.cmp(&a.latest_event));

    if let Some(best) = candidates.first() {
        return Ok(canonical_org_name(&best.name));
    }

    let network_name = object
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|n| !n.is_empty());

    Ok(network_name
        .map(network_name_fallback)
        .unwrap_or_else(|| UNKNOWN_ORG.to_string()))
}

fn collect_candidates(entities: &[Value], out: &mut Vec<Candidate>) {
    for entity in entities {
        if let Some((name, kind)) = vcard_name_and_kind(entity) {
            if kind.eq_ignore_ascii_case("org") && is_organization_name(&name) {
                out.push(Candidate {
                    latest_event: latest_event(entity),
                    name,
                });
            }
        }

        if let Some(children) = entity.get("entities").and_then(Value::as_array) {
            collect_candidates(children, out);
        }
    }
}

/// `fn` and `kind` properties of an entity's jCard
fn vcard_name_and_kind(entity: &Value) -> Option<(String, String)> {
    let props = entity.get("vcardArray")?.get(1)?.as_array()?;

    let mut name = None;
    let mut kind = None;
    for prop in props {
        let label = prop.get(0).and_then(Value::as_str);
        let value = prop.get(3).and_then(Value::as_str);
        match (label, value) {
            (Some("fn"), Some(v)) => name = Some(v.trim().to_string()),
            (Some("kind"), Some(v)) => kind = Some(v.trim().to_string()),
            _ => {}
        }
    }

    match (name, kind) {
        (Some(n), Some(k)) if !n.is_empty() => Some((n, k)),
        _ => None,
    }
}

/// Excludes personal names and role mailboxes
fn is_organization_name(name: &str) -> bool {
    if name
        .split_whitespace()
        .any(|token| PERSONAL_TITLES.contains(&token))
    {
        return false;
    }

    let lower = name.to_lowercase();
    !lower
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| ROLE_WORDS.iter().any(|role| word.starts_with(role)))
}

fn latest_event(entity: &Value) -> Option<DateTime<Utc>> {
    entity
        .get("events")?
        .as_array()?
        .iter()
        .filter(|event| {
            event
                .get("eventAction")
                .and_then(Value::as_str)
                .map(|action| {
                    let action = action.to_lowercase();
                    action == "registration" || action == "last changed"
                })
                .unwrap_or(false)
        })
        .filter_map(|event| event.get("eventDate").and_then(Value::as_str))
        .filter_map(|date| DateTime::parse_from_rfc3339(date).ok())
        .map(|date| date.with_timezone(&Utc))
        .max()
}

/// Strip prefixes and corporate suffixes, then apply brand and company overrides
pub fn canonical_org_name(raw: &str) -> String {
    let mut name = raw.trim().to_string();

    if let Some(rest) = strip_prefix_ignore_case(&name, PRIVATE_CUSTOMER_PREFIX) {
        name = rest.trim().to_string();
    }

    name = strip_corporate_suffixes(&name);

    let lower = name.to_lowercase();
    if let Some((_, brand)) = BRAND_OVERRIDES.iter().find(|(frag, _)| lower.contains(frag)) {
        return brand.to_string();
    }
    if let Some((company, _)) = COMPANY_NAMES
        .iter()
        .find(|(_, fragments)| fragments.iter().any(|f| lower.contains(f)))
    {
        return company.to_string();
    }

    if name.is_empty() {
        UNKNOWN_ORG.to_string()
    } else {
        name
    }
}

fn strip_corporate_suffixes(name: &str) -> String {
    let mut current = name.trim().to_string();
    loop {
        let stripped = CORPORATE_SUFFIXES
            .iter()
            .find_map(|suffix| strip_suffix_ignore_case(&current, suffix));
        match stripped {
            Some(rest) => current = rest.trim_end().to_string(),
            None => return current,
        }
    }
}

fn strip_prefix_ignore_case<'a>(s: &'a str, prefix: &str) -> Option<&'a str> {
    let head = s.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix).then(|| &s[prefix.len()..])
}

fn strip_suffix_ignore_case<'a>(s: &'a str, suffix: &str) -> Option<&'a str> {
    let split = s.len().checked_sub(suffix.len())?;
    let tail = s.get(split..)?;
    tail.eq_ignore_ascii_case(suffix).then(|| &s[..split])
}

fn network_name_fallback(network_name: &str) -> String {
    if network_name.starts_with("SBC-") {
        return "AT&T".to_string();
    }
    let upper = network_name.to_uppercase();
    NETWORK_NAME_PATTERNS
        .iter()
        .find(|(fragment, _)| upper.contains(fragment))
        .map(|(_, company)| company.to_string())
        .unwrap_or_else(|| network_name.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entity(name: &str, kind: &str, events: Value) -> Value {
        json!({
            "vcardArray": ["vcard", [
                ["version", {}, "text", "4.0"],
                ["fn", {}, "text", name],
                ["kind", {}, "text", kind]
            ]],
            "events": events
        })
    }

    fn dated(action: &str, date: &str) -> Value {
        json!([{ "eventAction": action, "eventDate": date }])
    }

    #[test]
    fn newest_organization_wins() {
        let doc = json!({
            "name": "NET-1",
            "entities": [
                entity("Old Holdings LLC", "org", dated("registration", "2004-01-01T00:00:00Z")),
                entity("Windstream Communications, Inc.", "org", dated("last changed", "2021-06-01T12:00:00-04:00")),
            ]
        });
        assert_eq!(extract_organization(&doc).unwrap(), "Windstream Communications");
    }

    #[test]
    fn people_and_role_mailboxes_are_skipped() {
        let doc = json!({
            "entities": [
                entity("Mr. John Smith", "org", dated("registration", "2023-01-01T00:00:00Z")),
                entity("Network Abuse Desk", "org", dated("registration", "2023-01-01T00:00:00Z")),
                entity("NOC Team", "org", dated("registration", "2023-01-01T00:00:00Z")),
                entity("Jane Roe", "individual", dated("registration", "2023-01-01T00:00:00Z")),
                entity("Ziply Fiber", "org", dated("registration", "2001-01-01T00:00:00Z")),
            ]
        });
        assert_eq!(extract_organization(&doc).unwrap(), "Ziply Fiber");
    }

    #[test]
    fn nested_entities_are_searched() {
        let doc = json!({
            "entities": [{
                "vcardArray": ["vcard", [["fn", {}, "text", "Technical Contact"], ["kind", {}, "text", "group"]]],
                "entities": [entity("Comcast Cable Communications, LLC", "org", json!([]))]
            }]
        });
        assert_eq!(extract_organization(&doc).unwrap(), "Comcast");
    }

    #[test]
    fn brand_overrides_apply() {
        assert_eq!(canonical_org_name("Space Exploration Technologies Corporation"), "Starlink");
        assert_eq!(canonical_org_name("SpaceX Services, Inc."), "Starlink");
        assert_eq!(canonical_org_name("Cellco Partnership DBA Verizon Wireless"), "Verizon");
        assert_eq!(canonical_org_name("Private Customer - AT&T Internet Services"), "AT&T");
        assert_eq!(canonical_org_name("IPAdmin-ATT Internet Services"), "AT&T");
        assert_eq!(canonical_org_name("Lumen Technologies Inc."), "CenturyLink");
    }

    #[test]
    fn corporate_suffixes_stripped_repeatedly() {
        assert_eq!(canonical_org_name("Acme Networks Corp., Inc."), "Acme Networks");
        assert_eq!(canonical_org_name("Wave Broadband LLC"), "Wave Broadband");
    }

    #[test]
    fn network_name_fallback_when_no_entities_qualify() {
        assert_eq!(extract_organization(&json!({"name": "SBC-99-1-2-3"})).unwrap(), "AT&T");
        assert_eq!(
            extract_organization(&json!({"name": "CC04-RRCS", "entities": []})).unwrap(),
            "Charter Communications"
        );
        assert_eq!(extract_organization(&json!({"name": "WISP-NET"})).unwrap(), "WISP-NET");
        assert_eq!(extract_organization(&json!({})).unwrap(), "Unknown");
    }

    #[test]
    fn malformed_documents_are_errors() {
        assert!(matches!(
            extract_organization(&json!("not an object")),
            Err(RegistryError::MalformedResponse(_))
        ));
        assert!(matches!(
            extract_organization(&json!({"entities": "oops"})),
            Err(RegistryError::MalformedResponse(_))
        ));
    }
}
