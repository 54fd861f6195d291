//! Reconciliation run orchestration
//!
//! A run loads every input once, builds the per-run services (alias table,
//! registry cache and resolver), then pushes sites through a bounded worker
//! pool. Each worker decides one site and, when the result differs from the
//! persisted record, writes it in its own transaction. Cancellation and the
//! run deadline stop dispatch only; sites already in flight finish.

use futures::stream::{self, StreamExt};
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::ReconSettings;
use crate::db;
use crate::error::ReconError;
use crate::models::{
    site_key, CircuitRecord, DeviceTelemetry, EnrichedCircuitRecord, PossibleProviderMatch, RunReport,
    RunState, WanInterface,
};
use crate::services::circuit_sync::plan_circuit_sync;
use crate::services::ddns::{HostResolver, SystemHostResolver};
use crate::services::note_parser::parse_raw_notes;
use crate::services::provider_matcher::{MappingTable, ProviderMatcher};
use crate::services::registry_client::{RdapClient, RegistryClient};
use crate::services::registry_resolver::{RegistryCache, RegistryResolver, Resolution, ResolutionSource};
use crate::services::site_reconciler::{can_skip, is_malformed_speed, reconcile_site, SiteEvidence};

/// True when `network_name` contains any pattern as a run of whole words
pub fn is_excluded_site(network_name: &str, patterns: &[String]) -> bool {
    let words: Vec<String> = split_words(network_name);
    patterns.iter().any(|pattern| {
        let needle = split_words(pattern);
        !needle.is_empty() && words.windows(needle.len()).any(|w| w == needle.as_slice())
    })
}

fn split_words(text: &str) -> Vec<String> {
    text.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SiteStatus {
    SkippedUnchanged,
    Unchanged,
    Written,
    WriteFailed,
}

/// What one worker reports back
#[derive(Debug)]
struct SiteOutcome {
    network_name: String,
    status: SiteStatus,
    /// Record now considered current for the site (persisted or retained)
    record: Option<EnrichedCircuitRecord>,
    unresolved_ips: usize,
    unmatched_circuits: usize,
    unconfirmed_interfaces: usize,
    malformed_speed_corrections: usize,
    flipped: bool,
    possible_matches: Vec<PossibleProviderMatch>,
}

impl SiteOutcome {
    fn skipped(previous: &EnrichedCircuitRecord) -> Self {
        Self {
            network_name: previous.network_name.clone(),
            status: SiteStatus::SkippedUnchanged,
            record: Some(previous.clone()),
            unresolved_ips: 0,
            unmatched_circuits: 0,
            unconfirmed_interfaces: 0,
            malformed_speed_corrections: 0,
            flipped: false,
            possible_matches: Vec::new(),
        }
    }
}

/// Inputs shared read-only by every worker of one run
struct RunContext {
    db: SqlitePool,
    max_lock_wait_ms: u64,
    resolver: RegistryResolver,
    matcher: ProviderMatcher,
    circuits_by_site: HashMap<String, Vec<CircuitRecord>>,
    previous: HashMap<String, EnrichedCircuitRecord>,
}

/// Runs reconciliation passes against one database
pub struct ReconciliationOrchestrator {
    db: SqlitePool,
    settings: ReconSettings,
    registry: Arc<dyn RegistryClient>,
    hosts: Arc<dyn HostResolver>,
}

impl ReconciliationOrchestrator {
    pub fn new(
        db: SqlitePool,
        settings: ReconSettings,
        registry: Arc<dyn RegistryClient>,
        hosts: Arc<dyn HostResolver>,
    ) -> Self {
        Self {
            db,
            settings,
            registry,
            hosts,
        }
    }

    /// Orchestrator using RDAP over HTTPS and the system resolver
    pub fn with_default_clients(db: SqlitePool, settings: ReconSettings) -> Result<Self, ReconError> {
        let registry = RdapClient::new(&settings.registry_base_url, settings.registry_timeout())
            .map_err(|e| ReconError::Config(wanrec_common::Error::Config(e.to_string())))?;
        let hosts = SystemHostResolver::new(settings.dns_timeout());
        Ok(Self::new(db, settings, Arc::new(registry), Arc::new(hosts)))
    }

    pub fn settings(&self) -> &ReconSettings {
        &self.settings
    }

    /// Resolver over the persisted registry cache
    pub async fn build_resolver(&self) -> Result<RegistryResolver, ReconError> {
        let entries = db::registry_cache::load_entries(&self.db)
            .await
            .map_err(|e| ReconError::PersistenceUnavailable(format!("registry cache: {}", e)))?;
        let cache = RegistryCache::from_entries(entries, self.settings.unknown_retry_after());

        Ok(RegistryResolver::new(
            Arc::clone(&self.registry),
            Arc::clone(&self.hosts),
            Arc::new(cache),
            self.settings.resolver_settings(),
        ))
    }

    /// Write registry entries learned since the last flush
    pub async fn flush_registry_cache(&self, resolver: &RegistryResolver) -> wanrec_common::Result<usize> {
        let dirty = resolver.cache().take_dirty().await;
        db::registry_cache::upsert_entries(&self.db, &dirty, self.settings.db_max_lock_wait_ms).await?;
        Ok(dirty.len())
    }

    /// Execute one full reconciliation run
    ///
    /// The report is persisted at start and at end. Run-fatal failures are
    /// returned as errors after a FAILED report has been saved.
    pub async fn run(&self, run_id: Uuid, cancel: CancellationToken) -> Result<RunReport, ReconError> {
        let mut report = RunReport::new(run_id);
        info!(%run_id, "Reconciliation run started");
        self.save_report(&report).await;

        match self.execute(&mut report, cancel).await {
            Ok(()) => {
                self.save_report(&report).await;
                info!(
                    %run_id,
                    state = report.state.as_str(),
                    sites_total = report.sites_total,
                    sites_written = report.sites_written,
                    sites_unchanged = report.sites_unchanged + report.sites_skipped_unchanged,
                    persistence_failures = report.persistence_failures,
                    registry_lookups = report.registry_lookups,
                    "Reconciliation run finished"
                );
                Ok(report)
            }
            Err(err) => {
                error!(%run_id, "Reconciliation run failed: {}", err);
                report.error = Some(err.to_string());
                report.finish(RunState::Failed);
                self.save_report(&report).await;
                Err(err)
            }
        }
    }

    async fn execute(&self, report: &mut RunReport, cancel: CancellationToken) -> Result<(), ReconError> {
        let devices = db::telemetry::load_devices(&self.db)
            .await
            .map_err(|e| ReconError::TelemetryUnavailable(e.to_string()))?;

        let circuits = db::circuits::load_enabled_circuits(&self.db)
            .await
            .map_err(|e| ReconError::PersistenceUnavailable(format!("circuits: {}", e)))?;
        let mappings = db::provider_mappings::load_mappings(&self.db)
            .await
            .map_err(|e| ReconError::PersistenceUnavailable(format!("provider mappings: {}", e)))?;
        let previous = db::enriched::load_all(&self.db)
            .await
            .map_err(|e| ReconError::PersistenceUnavailable(format!("enriched records: {}", e)))?;
        let resolver = self.build_resolver().await?;

        let matcher = ProviderMatcher::new(MappingTable::new(mappings), self.settings.fuzzy_thresholds());
        debug!(
            devices = devices.len(),
            circuits = circuits.len(),
            mappings = matcher.mappings().len(),
            previous = previous.len(),
            "Run inputs loaded"
        );

        let mut circuits_by_site: HashMap<String, Vec<CircuitRecord>> = HashMap::new();
        for circuit in &circuits {
            circuits_by_site
                .entry(site_key(&circuit.site_name))
                .or_default()
                .push(circuit.clone());
        }

        report.sites_total = devices.len();
        let (excluded, eligible): (Vec<DeviceTelemetry>, Vec<DeviceTelemetry>) = devices
            .into_iter()
            .partition(|d| is_excluded_site(&d.network_name, &self.settings.excluded_site_patterns));
        report.sites_excluded = excluded.len();
        for device in &excluded {
            debug!(site = %device.network_name, "Site excluded by name pattern");
        }

        let ctx = Arc::new(RunContext {
            db: self.db.clone(),
            max_lock_wait_ms: self.settings.db_max_lock_wait_ms,
            resolver: resolver.clone(),
            matcher,
            circuits_by_site,
            previous: previous
                .into_iter()
                .map(|r| (site_key(&r.network_name), r))
                .collect(),
        });

        let run_token = cancel.child_token();
        let deadline = self.settings.run_timeout().map(|timeout| {
            let token = run_token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(timeout) => {
                        warn!(timeout_secs = timeout.as_secs(), "Run deadline reached, stopping dispatch");
                        token.cancel();
                    }
                    _ = token.cancelled() => {}
                }
            })
        });

        let eligible_count = eligible.len();
        let dispatch_token = run_token.clone();
        let outcomes: Vec<SiteOutcome> = stream::iter(eligible)
            .take_while(move |_| futures::future::ready(!dispatch_token.is_cancelled()))
            .map(|device| {
                let ctx = Arc::clone(&ctx);
                async move { reconcile_one(&ctx, device).await }
            })
            .buffer_unordered(self.settings.worker_concurrency)
            .collect()
            .await;

        if let Some(handle) = deadline {
            handle.abort();
        }

        report.sites_dispatched = outcomes.len();
        report.sites_not_dispatched = eligible_count - outcomes.len();
        fold_outcomes(report, &outcomes);
        if report.possible_match_count > 0 {
            info!(
                possible_matches = report.possible_match_count,
                "Provider names close to feed circuits need a manual mapping"
            );
        }

        match self.flush_registry_cache(&resolver).await {
            Ok(count) => debug!(entries = count, "Registry cache flushed"),
            Err(e) => warn!("Registry cache flush failed: {}", e),
        }

        let stats = resolver.stats();
        report.registry_lookups = stats.registry_lookups;
        report.registry_cache_hits = stats.cache_hits;
        report.registry_failures = stats.failures;
        report.ddns_resolutions = stats.ddns_resolutions;

        let current: Vec<EnrichedCircuitRecord> = outcomes.into_iter().filter_map(|o| o.record).collect();
        report.circuit_sync_proposals =
            plan_circuit_sync(&current, &circuits, self.settings.circuit_sync_policy, &ctx.matcher);
        if !report.circuit_sync_proposals.is_empty() {
            info!(
                proposals = report.circuit_sync_proposals.len(),
                policy = %self.settings.circuit_sync_policy,
                "Non-feed circuit updates proposed"
            );
        }

        let state = if report.sites_not_dispatched > 0 {
            warn!(not_dispatched = report.sites_not_dispatched, "Run cancelled before all sites were dispatched");
            RunState::Cancelled
        } else {
            RunState::Completed
        };
        report.finish(state);
        Ok(())
    }

    async fn save_report(&self, report: &RunReport) {
        if let Err(e) = db::runs::save_report(&self.db, report, self.settings.db_max_lock_wait_ms).await {
            warn!(run_id = %report.run_id, "Failed to persist run report: {}", e);
        }
    }
}

fn fold_outcomes(report: &mut RunReport, outcomes: &[SiteOutcome]) {
    for outcome in outcomes {
        match outcome.status {
            SiteStatus::SkippedUnchanged => report.sites_skipped_unchanged += 1,
            SiteStatus::Unchanged => report.sites_unchanged += 1,
            SiteStatus::Written => report.sites_written += 1,
            SiteStatus::WriteFailed => {
                report.persistence_failures += 1;
                report.failed_sites.push(outcome.network_name.clone());
            }
        }
        report.unresolved_ips += outcome.unresolved_ips;
        report.unmatched_circuits += outcome.unmatched_circuits;
        report.unconfirmed_interfaces += outcome.unconfirmed_interfaces;
        report.malformed_speed_corrections += outcome.malformed_speed_corrections;
        if outcome.flipped {
            report.wan_flips_detected += 1;
        }
        report.possible_matches.extend(outcome.possible_matches.iter().cloned());
    }
    report.failed_sites.sort();
    report
        .possible_matches
        .sort_by(|a, b| (&a.site, a.wan).cmp(&(&b.site, b.wan)));
    report.possible_match_count = report.possible_matches.len();
}

async fn reconcile_one(ctx: &RunContext, device: DeviceTelemetry) -> SiteOutcome {
    let key = site_key(&device.network_name);
    let previous = ctx.previous.get(&key);

    if let Some(previous) = previous {
        if can_skip(previous, &device) {
            debug!(site = %device.network_name, "IPs unchanged and persisted data healthy, skipping");
            return SiteOutcome::skipped(previous);
        }
    }

    let notes = parse_raw_notes(&device.notes);
    let wan1 = resolve_uplink(ctx, &device, WanInterface::Wan1).await;
    let wan2 = resolve_uplink(ctx, &device, WanInterface::Wan2).await;
    let unresolved_ips = [&wan1, &wan2]
        .into_iter()
        .flatten()
        .filter(|r| is_unresolved(r))
        .count();

    let evidence = SiteEvidence::new(&device, &notes, wan1, wan2);
    let circuits = ctx.circuits_by_site.get(&key).map(Vec::as_slice).unwrap_or(&[]);
    let decided = reconcile_site(&evidence, circuits, &ctx.matcher);

    for wan in WanInterface::BOTH {
        let decision = decided.decision(wan);
        let state = decided.record.wan(wan);
        debug!(
            site = %device.network_name,
            %wan,
            tier = ?decision.tier,
            circuit_id = ?decision.circuit_id,
            provider = %state.provider,
            speed = %state.speed,
            confirmed = state.confirmed,
            "Interface decided"
        );
    }
    if decided.flipped {
        info!(site = %device.network_name, "WAN roles flipped: WAN1 carries the Secondary circuit");
    }
    for possible in &decided.possible_matches {
        debug!(
            site = %possible.site,
            wan = %possible.wan,
            circuit_provider = %possible.circuit_provider,
            candidate = %possible.candidate,
            score = possible.score,
            "Possible provider match"
        );
    }

    let malformed_speed_corrections = previous
        .map(|prev| {
            WanInterface::BOTH
                .iter()
                .filter(|&&wan| {
                    is_malformed_speed(&prev.wan(wan).speed) && !is_malformed_speed(&decided.record.wan(wan).speed)
                })
                .count()
        })
        .unwrap_or(0);

    let mut outcome = SiteOutcome {
        network_name: device.network_name.clone(),
        status: SiteStatus::Unchanged,
        record: None,
        unresolved_ips,
        unmatched_circuits: decided.unmatched_circuits,
        unconfirmed_interfaces: decided.unconfirmed_interfaces(),
        malformed_speed_corrections,
        flipped: decided.flipped,
        possible_matches: decided.possible_matches.clone(),
    };

    if previous.map(|p| p.same_content(&decided.record)).unwrap_or(false) {
        debug!(site = %device.network_name, "Recomputed record identical, no write");
        outcome.record = previous.cloned();
        return outcome;
    }

    match db::enriched::upsert_record(&ctx.db, &decided.record, ctx.max_lock_wait_ms).await {
        Ok(()) => {
            outcome.status = SiteStatus::Written;
            outcome.record = Some(decided.record);
        }
        Err(e) => {
            warn!(site = %device.network_name, "Failed to persist enriched record: {}", e);
            outcome.status = SiteStatus::WriteFailed;
            outcome.record = previous.cloned();
        }
    }
    outcome
}

async fn resolve_uplink(ctx: &RunContext, device: &DeviceTelemetry, wan: WanInterface) -> Option<Resolution> {
    let ip = device.ip(wan);
    if ip.is_empty() {
        return None;
    }
    let resolution = ctx
        .resolver
        .resolve_interface(ip, device.ddns_hostname.as_deref(), wan)
        .await;
    debug!(
        site = %device.network_name,
        %wan,
        ip,
        organization = %resolution.organization,
        source = ?resolution.source,
        "Uplink resolved"
    );
    Some(resolution)
}

fn is_unresolved(resolution: &Resolution) -> bool {
    matches!(
        resolution.source,
        ResolutionSource::InvalidAddress | ResolutionSource::Failed | ResolutionSource::DdnsFailed
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns() -> Vec<String> {
        ReconSettings::default().excluded_site_patterns
    }

    #[test]
    fn exclusion_matches_whole_words_only() {
        assert!(is_excluded_site("NOC Hub 01", &patterns()));
        assert!(is_excluded_site("Corp-Lab", &patterns()));
        assert!(is_excluded_site("Store In A Box 7", &patterns()));
        assert!(!is_excluded_site("Hubbard 12", &patterns()));
        assert!(!is_excluded_site("Testa Rosa 03", &patterns()));
        assert!(!is_excluded_site("Box Store 9", &patterns()));
    }
}
