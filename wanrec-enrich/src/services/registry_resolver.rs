//! Registry resolver: IP address → owning organization
//!
//! One resolver is built per run and shared (cheaply cloned) by every worker.
//! Per call:
//!
//! 1. empty or unparsable input → "Unknown", no I/O
//! 2. private address → "Private IP", no I/O
//! 3. static assignment (e.g. 166.80.0.0/16) → its organization, no I/O
//! 4. fresh cache entry → cached organization
//! 5. external lookup, retried with exponential backoff; success is cached,
//!    failure returns "Unknown" and is not cached
//!
//! Concurrent lookups of the same address share one in-flight request, and
//! every request waits on one run-wide rate limiter.

use chrono::{DateTime, Utc};
use futures::future::{BoxFuture, FutureExt, Shared};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::net::{IpAddr, Ipv4Addr};
use std::str::FromStr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::models::{RegistryCacheEntry, WanInterface, PRIVATE_IP_ORG, UNKNOWN_ORG};
use crate::services::ddns::{candidate_hostnames, HostResolver};
use crate::services::rdap_parser::extract_organization;
use crate::services::registry_client::RegistryClient;

/// Address block attributed to a fixed organization without asking the registry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaticRange {
    network: Ipv4Addr,
    prefix_len: u8,
    pub organization: String,
}

impl StaticRange {
    pub fn new(network: Ipv4Addr, prefix_len: u8, organization: &str) -> Option<Self> {
        if prefix_len > 32 {
            return None;
        }
        Some(Self {
            network: Ipv4Addr::from(u32::from(network) & mask(prefix_len)),
            prefix_len,
            organization: organization.trim().to_string(),
        })
    }

    pub fn contains(&self, ip: IpAddr) -> bool {
        match ip {
            IpAddr::V4(v4) => u32::from(v4) & mask(self.prefix_len) == u32::from(self.network),
            IpAddr::V6(_) => false,
        }
    }
}

impl FromStr for StaticRange {
    type Err = String;

    /// `a.b.c.d/len=Organization`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (cidr, org) = s
            .split_once('=')
            .ok_or_else(|| format!("static range '{}' is missing '=organization'", s))?;
        let (addr, len) = cidr
            .trim()
            .split_once('/')
            .ok_or_else(|| format!("static range '{}' is missing a prefix length", s))?;
        let addr: Ipv4Addr = addr
            .parse()
            .map_err(|e| format!("static range '{}': {}", s, e))?;
        let len: u8 = len
            .parse()
            .map_err(|e| format!("static range '{}': {}", s, e))?;
        if org.trim().is_empty() {
            return Err(format!("static range '{}' has an empty organization", s));
        }
        StaticRange::new(addr, len, org).ok_or_else(|| format!("static range '{}': bad prefix", s))
    }
}

fn mask(prefix_len: u8) -> u32 {
    if prefix_len == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix_len))
    }
}

/// Addresses that must never be sent to the registry
pub fn is_private_address(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => is_private_v4(v4),
        IpAddr::V6(v6) => {
            if let Some(v4) = v6.to_ipv4_mapped() {
                return is_private_v4(v4);
            }
            let first = v6.segments()[0];
            v6.is_loopback()
                || v6.is_unspecified()
                || (first & 0xfe00) == 0xfc00 // unique local
                || (first & 0xffc0) == 0xfe80 // link local
        }
    }
}

fn is_private_v4(v4: Ipv4Addr) -> bool {
    let octets = v4.octets();
    v4.is_private()
        || v4.is_loopback()
        || v4.is_link_local()
        || v4.is_unspecified()
        || v4.is_broadcast()
        // carrier-grade NAT, 100.64.0.0/10
        || (octets[0] == 100 && (octets[1] & 0xc0) == 64)
}

/// Shared registry cache
///
/// Loaded from the database at run start; new entries are tracked so the
/// run can upsert them in one pass at the end.
pub struct RegistryCache {
    entries: RwLock<HashMap<IpAddr, RegistryCacheEntry>>,
    dirty: Mutex<HashSet<IpAddr>>,
    unknown_retry_after: chrono::Duration,
}

impl RegistryCache {
    pub fn new(unknown_retry_after: chrono::Duration) -> Self {
        Self::from_entries(Vec::new(), unknown_retry_after)
    }

    /// Rows with unparsable addresses are dropped
    pub fn from_entries(
        entries: Vec<RegistryCacheEntry>,
        unknown_retry_after: chrono::Duration,
    ) -> Self {
        let map = entries
            .into_iter()
            .filter_map(|e| e.ip_address.trim().parse::<IpAddr>().ok().map(|ip| (ip, e)))
            .collect();
        Self {
            entries: RwLock::new(map),
            dirty: Mutex::new(HashSet::new()),
            unknown_retry_after,
        }
    }

    /// Entry for `ip` if it is still authoritative at `now`
    pub async fn get_fresh(&self, ip: IpAddr, now: DateTime<Utc>) -> Option<RegistryCacheEntry> {
        self.entries
            .read()
            .await
            .get(&ip)
            .filter(|e| e.is_fresh(now, self.unknown_retry_after))
            .cloned()
    }

    pub async fn store(&self, ip: IpAddr, organization: &str, now: DateTime<Utc>) {
        let entry = RegistryCacheEntry {
            ip_address: ip.to_string(),
            organization_name: organization.to_string(),
            last_queried_at: now,
        };
        self.entries.write().await.insert(ip, entry);
        self.dirty.lock().await.insert(ip);
    }

    /// Entries written since the last call
    pub async fn take_dirty(&self) -> Vec<RegistryCacheEntry> {
        let dirty: Vec<IpAddr> = self.dirty.lock().await.drain().collect();
        let entries = self.entries.read().await;
        dirty.iter().filter_map(|ip| entries.get(ip).cloned()).collect()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

/// Retry, pacing and static-assignment settings
#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    /// Minimum gap between consecutive registry requests across all workers
    pub min_interval: Duration,
    pub static_ranges: Vec<StaticRange>,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            min_interval: Duration::from_millis(500),
            static_ranges: default_static_ranges(),
        }
    }
}

/// Ranges whose registry records do not name the operating carrier
pub fn default_static_ranges() -> Vec<StaticRange> {
    StaticRange::new(Ipv4Addr::new(166, 80, 0, 0), 16, "Verizon Business")
        .into_iter()
        .collect()
}

/// Where a resolution came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionSource {
    InvalidAddress,
    PrivateAddress,
    StaticRange,
    Cache,
    Registry,
    /// Every attempt failed; not cached
    Failed,
    /// Private address and no DDNS hostname yielded a public one
    DdnsFailed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub organization: String,
    pub from_cache: bool,
    pub source: ResolutionSource,
    /// Public address looked up, when it differs from the reported one
    pub resolved_ip: Option<IpAddr>,
    pub ddns_hostname: Option<String>,
}

impl Resolution {
    fn new(organization: &str, source: ResolutionSource) -> Self {
        Self {
            organization: organization.to_string(),
            from_cache: source == ResolutionSource::Cache,
            source,
            resolved_ip: None,
            ddns_hostname: None,
        }
    }

    /// Organization is usable as provider evidence
    pub fn is_known(&self) -> bool {
        !matches!(
            self.source,
            ResolutionSource::InvalidAddress
                | ResolutionSource::PrivateAddress
                | ResolutionSource::Failed
                | ResolutionSource::DdnsFailed
        ) && self.organization != UNKNOWN_ORG
    }
}

/// Counter snapshot for the run report
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolverStats {
    pub registry_lookups: usize,
    pub cache_hits: usize,
    pub failures: usize,
    pub ddns_resolutions: usize,
}

#[derive(Default)]
struct Counters {
    registry_lookups: AtomicUsize,
    cache_hits: AtomicUsize,
    failures: AtomicUsize,
    ddns_resolutions: AtomicUsize,
}

type InFlight = Shared<BoxFuture<'static, Option<String>>>;

struct ResolverInner {
    client: Arc<dyn RegistryClient>,
    hosts: Arc<dyn HostResolver>,
    cache: Arc<RegistryCache>,
    limiter: Option<DefaultDirectRateLimiter>,
    settings: ResolverSettings,
    in_flight: Mutex<HashMap<IpAddr, InFlight>>,
    counters: Counters,
}

/// Cloneable handle; clones share cache, limiter and in-flight table
#[derive(Clone)]
pub struct RegistryResolver {
    inner: Arc<ResolverInner>,
}

impl RegistryResolver {
    pub fn new(
        client: Arc<dyn RegistryClient>,
        hosts: Arc<dyn HostResolver>,
        cache: Arc<RegistryCache>,
        settings: ResolverSettings,
    ) -> Self {
        let limiter = Quota::with_period(settings.min_interval).map(RateLimiter::direct);

        Self {
            inner: Arc::new(ResolverInner {
                client,
                hosts,
                cache,
                limiter,
                settings,
                in_flight: Mutex::new(HashMap::new()),
                counters: Counters::default(),
            }),
        }
    }

    pub fn cache(&self) -> &Arc<RegistryCache> {
        &self.inner.cache
    }

    pub fn stats(&self) -> ResolverStats {
        let c = &self.inner.counters;
        ResolverStats {
            registry_lookups: c.registry_lookups.load(Ordering::Relaxed),
            cache_hits: c.cache_hits.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
            ddns_resolutions: c.ddns_resolutions.load(Ordering::Relaxed),
        }
    }

    /// Resolve a textual address
    pub async fn resolve(&self, ip: &str) -> Resolution {
        match ip.trim().parse::<IpAddr>() {
            Ok(addr) => self.resolve_addr(addr).await,
            Err(_) => Resolution::new(UNKNOWN_ORG, ResolutionSource::InvalidAddress),
        }
    }

    /// Resolve an uplink address, looking through NAT via DDNS when it is private
    pub async fn resolve_interface(
        &self,
        ip: &str,
        ddns_hostname: Option<&str>,
        wan: WanInterface,
    ) -> Resolution {
        let addr = match ip.trim().parse::<IpAddr>() {
            Ok(addr) => addr,
            Err(_) => return Resolution::new(UNKNOWN_ORG, ResolutionSource::InvalidAddress),
        };

        let hostname = ddns_hostname.map(str::trim).filter(|h| !h.is_empty());
        let hostname = match hostname {
            Some(h) if is_private_address(addr) => h,
            _ => return self.resolve_addr(addr).await,
        };

        for candidate in candidate_hostnames(hostname, wan) {
            match self.inner.hosts.resolve_host(&candidate).await {
                Some(public) if !is_private_address(public) => {
                    self.inner
                        .counters
                        .ddns_resolutions
                        .fetch_add(1, Ordering::Relaxed);
                    debug!(%addr, hostname = %candidate, %public, %wan, "Private uplink resolved via DDNS");

                    let mut resolution = self.resolve_addr(public).await;
                    resolution.resolved_ip = Some(public);
                    resolution.ddns_hostname = Some(candidate);
                    return resolution;
                }
                Some(other) => {
                    debug!(hostname = %candidate, resolved = %other, "DDNS hostname resolved to a private address");
                }
                None => {
                    debug!(hostname = %candidate, "DDNS hostname did not resolve");
                }
            }
        }

        Resolution::new(UNKNOWN_ORG, ResolutionSource::DdnsFailed)
    }

    async fn resolve_addr(&self, addr: IpAddr) -> Resolution {
        if is_private_address(addr) {
            return Resolution::new(PRIVATE_IP_ORG, ResolutionSource::PrivateAddress);
        }

        if let Some(range) = self.inner.settings.static_ranges.iter().find(|r| r.contains(addr)) {
            return Resolution::new(&range.organization, ResolutionSource::StaticRange);
        }

        if let Some(entry) = self.inner.cache.get_fresh(addr, Utc::now()).await {
            self.inner.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Resolution::new(&entry.organization_name, ResolutionSource::Cache);
        }

        match self.lookup_single_flight(addr).await {
            Some(org) => Resolution::new(&org, ResolutionSource::Registry),
            None => Resolution::new(UNKNOWN_ORG, ResolutionSource::Failed),
        }
    }

    /// Join the in-flight request for `addr` or start one
    async fn lookup_single_flight(&self, addr: IpAddr) -> Option<String> {
        let flight = {
            let mut in_flight = self.inner.in_flight.lock().await;
            match in_flight.get(&addr) {
                Some(existing) => existing.clone(),
                None => {
                    let inner = Arc::clone(&self.inner);
                    let flight = async move { inner.fetch_and_cache(addr).await }
                        .boxed()
                        .shared();
                    in_flight.insert(addr, flight.clone());
                    flight
                }
            }
        };

        let outcome = flight.clone().await;

        let mut in_flight = self.inner.in_flight.lock().await;
        if in_flight
            .get(&addr)
            .map(|current| Shared::ptr_eq(current, &flight))
            .unwrap_or(false)
        {
            in_flight.remove(&addr);
        }

        outcome
    }
}

impl ResolverInner {
    async fn fetch_and_cache(&self, addr: IpAddr) -> Option<String> {
        // A flight that finished just before this one started may have filled the cache
        if let Some(entry) = self.cache.get_fresh(addr, Utc::now()).await {
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            return Some(entry.organization_name);
        }

        let attempts = self.settings.max_attempts.max(1);
        let mut backoff = self.settings.initial_backoff;

        for attempt in 1..=attempts {
            if let Some(limiter) = &self.limiter {
                limiter.until_ready().await;
            }
            self.counters.registry_lookups.fetch_add(1, Ordering::Relaxed);

            let result = self
                .client
                .lookup(addr)
                .await
                .and_then(|doc| extract_organization(&doc));

            match result {
                Ok(org) => {
                    self.cache.store(addr, &org, Utc::now()).await;
                    info!(ip = %addr, organization = %org, attempt, "Registry lookup succeeded");
                    return Some(org);
                }
                Err(e) if attempt < attempts => {
                    debug!(ip = %addr, attempt, error = %e, backoff_ms = backoff.as_millis() as u64, "Registry lookup failed, retrying");
                    tokio::time::sleep(backoff).await;
                    backoff *= 2;
                }
                Err(e) => {
                    warn!(ip = %addr, attempts, error = %e, "Registry lookup failed");
                }
            }
        }

        self.counters.failures.fetch_add(1, Ordering::Relaxed);
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn private_ranges() {
        for ip in [
            "10.1.2.3",
            "172.16.0.1",
            "172.31.255.254",
            "192.168.0.151",
            "127.0.0.1",
            "169.254.10.10",
            "100.64.0.1",
            "100.127.255.255",
            "::1",
            "fd00::1",
            "fe80::1",
            "::ffff:192.168.1.1",
        ] {
            let addr: IpAddr = ip.parse().unwrap();
            assert!(is_private_address(addr), "{} should be private", ip);
        }

        for ip in ["8.8.8.8", "100.128.0.1", "172.32.0.1", "166.80.1.1", "2001:db8::1"] {
            let addr: IpAddr = ip.parse().unwrap();
            assert!(!is_private_address(addr), "{} should be public", ip);
        }
    }

    #[test]
    fn static_range_parsing_and_membership() {
        let range: StaticRange = "166.80.0.0/16=Verizon Business".parse().unwrap();
        assert_eq!(range.organization, "Verizon Business");
        assert!(range.contains("166.80.200.4".parse().unwrap()));
        assert!(!range.contains("166.81.0.1".parse().unwrap()));

        assert!("166.80.0.0=Verizon".parse::<StaticRange>().is_err());
        assert!("166.80.0.0/40=Verizon".parse::<StaticRange>().is_err());
        assert!("166.80.0.0/16".parse::<StaticRange>().is_err());
    }

    #[test]
    fn static_range_normalizes_host_bits() {
        let range = StaticRange::new(Ipv4Addr::new(203, 0, 113, 77), 24, "Example").unwrap();
        assert!(range.contains("203.0.113.1".parse().unwrap()));
    }
}
