//! Shared fixtures for wanrec-enrich integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use serde_json::{json, Value};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::collections::{HashMap, HashSet};
use std::net::IpAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use wanrec_enrich::config::ReconSettings;
use wanrec_enrich::models::{CircuitPurpose, CircuitRecord, DeviceTelemetry};
use wanrec_enrich::services::{
    HostResolver, ReconciliationOrchestrator, RegistryCache, RegistryClient, RegistryError,
    RegistryResolver, ResolverSettings,
};

/// In-memory database with the full schema
pub async fn memory_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    wanrec_common::db::create_schema(&pool).await.unwrap();
    pool
}

/// Minimal RDAP document naming `org`
pub fn rdap_doc(org: &str) -> Value {
    json!({
        "objectClassName": "ip network",
        "name": "NET-TEST",
        "entities": [{
            "vcardArray": ["vcard", [
                ["version", {}, "text", "4.0"],
                ["fn", {}, "text", org],
                ["kind", {}, "text", "org"]
            ]],
            "events": [{ "eventAction": "registration", "eventDate": "2015-03-01T00:00:00Z" }]
        }]
    })
}

/// Registry that answers from a table and records every call
#[derive(Default)]
pub struct FakeRegistry {
    responses: HashMap<IpAddr, String>,
    failing: Mutex<HashSet<IpAddr>>,
    calls: AtomicUsize,
    seen: Mutex<Vec<IpAddr>>,
    delay: Duration,
}

impl FakeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_org(mut self, ip: &str, org: &str) -> Self {
        self.responses.insert(ip.parse().unwrap(), org.to_string());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fail(&self, ip: &str) {
        self.failing.lock().unwrap().insert(ip.parse().unwrap());
    }

    pub fn recover(&self, ip: &str) {
        self.failing.lock().unwrap().remove(&ip.parse().unwrap());
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn seen(&self) -> Vec<IpAddr> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl RegistryClient for FakeRegistry {
    async fn lookup(&self, ip: IpAddr) -> Result<Value, RegistryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().unwrap().push(ip);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if self.failing.lock().unwrap().contains(&ip) {
            return Err(RegistryError::Unavailable("simulated outage".into()));
        }
        match self.responses.get(&ip) {
            Some(org) => Ok(rdap_doc(org)),
            None => Err(RegistryError::Unavailable(format!("HTTP 404 for {}", ip))),
        }
    }
}

/// DNS answers from a table
#[derive(Default)]
pub struct FakeHosts {
    answers: HashMap<String, IpAddr>,
    queries: Mutex<Vec<String>>,
}

impl FakeHosts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_host(mut self, host: &str, ip: &str) -> Self {
        self.answers.insert(host.to_string(), ip.parse().unwrap());
        self
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl HostResolver for FakeHosts {
    async fn resolve_host(&self, hostname: &str) -> Option<IpAddr> {
        self.queries.lock().unwrap().push(hostname.to_string());
        self.answers.get(hostname).copied()
    }
}

/// Resolver settings without pacing and with millisecond backoff
pub fn fast_resolver_settings(max_attempts: u32) -> ResolverSettings {
    ResolverSettings {
        max_attempts,
        initial_backoff: Duration::from_millis(1),
        min_interval: Duration::ZERO,
        ..ResolverSettings::default()
    }
}

pub fn resolver(registry: Arc<FakeRegistry>, hosts: Arc<FakeHosts>, max_attempts: u32) -> RegistryResolver {
    RegistryResolver::new(
        registry,
        hosts,
        Arc::new(RegistryCache::new(chrono::Duration::days(7))),
        fast_resolver_settings(max_attempts),
    )
}

pub fn fast_recon_settings() -> ReconSettings {
    ReconSettings {
        worker_concurrency: 4,
        registry_min_interval_ms: 0,
        registry_max_attempts: 1,
        registry_backoff_ms: 1,
        db_max_lock_wait_ms: 1000,
        ..ReconSettings::default()
    }
}

pub fn orchestrator(
    pool: &SqlitePool,
    registry: Arc<FakeRegistry>,
    hosts: Arc<FakeHosts>,
) -> ReconciliationOrchestrator {
    ReconciliationOrchestrator::new(pool.clone(), fast_recon_settings(), registry, hosts)
}

pub fn device(name: &str, wan1_ip: &str, wan2_ip: &str, notes: &str) -> DeviceTelemetry {
    let ip = |s: &str| (!s.is_empty()).then(|| s.to_string());
    DeviceTelemetry {
        network_name: name.to_string(),
        device_serial: Some(format!("Q2XX-{}", name.len())),
        wan1_ip: ip(wan1_ip),
        wan2_ip: ip(wan2_ip),
        notes: notes.to_string(),
        ddns_hostname: None,
    }
}

pub fn circuit(site: &str, purpose: CircuitPurpose, provider: &str, speed: &str, cost: f64) -> CircuitRecord {
    CircuitRecord {
        id: 0,
        site_name: site.to_string(),
        purpose,
        provider_name: provider.to_string(),
        speed: speed.to_string(),
        monthly_cost: cost,
        ip_address: None,
        status: "Enabled".to_string(),
        data_source: "dsr".to_string(),
    }
}
