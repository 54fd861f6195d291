//! Registry cache entries

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Organization recorded for addresses the registry could not attribute
pub const UNKNOWN_ORG: &str = "Unknown";

/// Organization reported for addresses in private ranges
pub const PRIVATE_IP_ORG: &str = "Private IP";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistryCacheEntry {
    pub ip_address: String,
    pub organization_name: String,
    pub last_queried_at: DateTime<Utc>,
}

impl RegistryCacheEntry {
    /// An entry is authoritative unless it records "Unknown" and is older than
    /// the retry window, in which case it is eligible for a fresh lookup.
    pub fn is_fresh(&self, now: DateTime<Utc>, unknown_retry_after: Duration) -> bool {
        self.organization_name != UNKNOWN_ORG
            || now.signed_duration_since(self.last_queried_at) < unknown_retry_after
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(org: &str, age_days: i64) -> (RegistryCacheEntry, DateTime<Utc>) {
        let now = Utc::now();
        (
            RegistryCacheEntry {
                ip_address: "203.0.113.9".to_string(),
                organization_name: org.to_string(),
                last_queried_at: now - Duration::days(age_days),
            },
            now,
        )
    }

    #[test]
    fn known_organizations_never_go_stale() {
        let (e, now) = entry("Comcast", 400);
        assert!(e.is_fresh(now, Duration::days(7)));
    }

    #[test]
    fn unknown_entries_expire_after_window() {
        let (recent, now) = entry(UNKNOWN_ORG, 6);
        assert!(recent.is_fresh(now, Duration::days(7)));

        let (old, now) = entry(UNKNOWN_ORG, 7);
        assert!(!old.is_fresh(now, Duration::days(7)));
    }
}
