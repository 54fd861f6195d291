//! End-to-end reconciliation runs against an in-memory database

mod common;

use common::{circuit, device, fast_recon_settings, memory_pool, orchestrator, FakeHosts, FakeRegistry};
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;
use wanrec_enrich::config::ReconSettings;
use wanrec_enrich::db::{circuits, enriched, registry_cache, runs, telemetry};
use wanrec_enrich::models::{CircuitPurpose, EnrichedCircuitRecord, RunState, WanInterface};
use wanrec_enrich::services::ReconciliationOrchestrator;
use wanrec_enrich::ReconError;

const ALB_NOTES: &str = "WAN 1 Comcast 300.0M x 30.0M WAN 2 AT&T Cell";

async fn seed_alb01(pool: &SqlitePool) {
    telemetry::upsert_device(pool, &device("ALB 01", "203.0.113.10", "198.51.100.20", ALB_NOTES))
        .await
        .unwrap();
    circuits::insert_circuit(pool, &circuit("ALB 01", CircuitPurpose::Primary, "Comcast", "300.0M x 30.0M", 109.99))
        .await
        .unwrap();
    circuits::insert_circuit(pool, &circuit("ALB 01", CircuitPurpose::Secondary, "AT&T", "", 65.0))
        .await
        .unwrap();
}

fn alb01_registry() -> Arc<FakeRegistry> {
    Arc::new(
        FakeRegistry::new()
            .with_org("203.0.113.10", "Comcast")
            .with_org("198.51.100.20", "AT&T"),
    )
}

#[tokio::test]
async fn full_run_writes_confirmed_record() {
    let pool = memory_pool().await;
    seed_alb01(&pool).await;
    let registry = alb01_registry();

    let report = orchestrator(&pool, registry.clone(), Arc::new(FakeHosts::new()))
        .run(Uuid::new_v4(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.sites_total, 1);
    assert_eq!(report.sites_written, 1);
    assert_eq!(report.unconfirmed_interfaces, 0);
    assert_eq!(report.unmatched_circuits, 0);
    assert_eq!(report.registry_lookups, 2);
    assert!(report.ended_at.is_some());

    let record = enriched::load_one(&pool, "ALB 01").await.unwrap().unwrap();
    assert!(record.wan1.confirmed);
    assert_eq!(record.wan1.provider, "Comcast");
    assert_eq!(record.wan1.speed, "300.0M x 30.0M");
    assert_eq!(record.wan1.monthly_cost, Some(109.99));
    assert_eq!(record.wan1.registry_org, "Comcast");
    assert!(record.wan2.confirmed);
    assert_eq!(record.wan2.provider, "AT&T");
    assert_eq!(record.wan2.speed, "Cell");
    assert_eq!(record.wan2.circuit_role, CircuitPurpose::Secondary);

    // Both lookups were flushed to the persistent cache
    assert_eq!(registry_cache::load_entries(&pool).await.unwrap().len(), 2);
}

#[tokio::test]
async fn unchanged_site_is_skipped_on_second_run() {
    let pool = memory_pool().await;
    seed_alb01(&pool).await;
    let registry = alb01_registry();
    let orch = orchestrator(&pool, registry.clone(), Arc::new(FakeHosts::new()));

    orch.run(Uuid::new_v4(), CancellationToken::new()).await.unwrap();
    let before = enriched::load_one(&pool, "ALB 01").await.unwrap().unwrap();
    let calls = registry.calls();

    let second = orch.run(Uuid::new_v4(), CancellationToken::new()).await.unwrap();

    assert_eq!(second.sites_skipped_unchanged, 1);
    assert_eq!(second.sites_written, 0);
    assert_eq!(second.registry_lookups, 0);
    assert_eq!(second.registry_cache_hits, 0);
    assert_eq!(registry.calls(), calls);

    let after = enriched::load_one(&pool, "ALB 01").await.unwrap().unwrap();
    assert_eq!(before.last_updated, after.last_updated);
}

#[tokio::test]
async fn changed_ip_is_recomputed_from_cache_for_the_other_uplink() {
    let pool = memory_pool().await;
    seed_alb01(&pool).await;
    let registry = Arc::new(
        FakeRegistry::new()
            .with_org("203.0.113.10", "Comcast")
            .with_org("198.51.100.20", "AT&T")
            .with_org("198.51.100.21", "AT&T"),
    );
    let orch = orchestrator(&pool, registry.clone(), Arc::new(FakeHosts::new()));
    orch.run(Uuid::new_v4(), CancellationToken::new()).await.unwrap();

    telemetry::upsert_device(&pool, &device("ALB 01", "203.0.113.10", "198.51.100.21", ALB_NOTES))
        .await
        .unwrap();
    let second = orch.run(Uuid::new_v4(), CancellationToken::new()).await.unwrap();

    assert_eq!(second.sites_written, 1);
    assert_eq!(second.registry_lookups, 1);
    assert_eq!(second.registry_cache_hits, 1);
    let record = enriched::load_one(&pool, "ALB 01").await.unwrap().unwrap();
    assert_eq!(record.wan2.ip, "198.51.100.21");
}

#[tokio::test]
async fn site_without_evidence_is_written_as_unknown() {
    let pool = memory_pool().await;
    telemetry::upsert_device(&pool, &device("ALB 09", "", "", "")).await.unwrap();

    let report = orchestrator(&pool, Arc::new(FakeRegistry::new()), Arc::new(FakeHosts::new()))
        .run(Uuid::new_v4(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.sites_written, 1);
    assert_eq!(report.unconfirmed_interfaces, 2);
    assert_eq!(report.unresolved_ips, 0);
    let record = enriched::load_one(&pool, "ALB 09").await.unwrap().unwrap();
    assert!(record.same_content(&EnrichedCircuitRecord::unknown("ALB 09")));
}

#[tokio::test]
async fn excluded_sites_are_never_reconciled() {
    let pool = memory_pool().await;
    seed_alb01(&pool).await;
    telemetry::upsert_device(&pool, &device("Lab 01", "203.0.113.99", "", "WAN 1 Comcast"))
        .await
        .unwrap();
    let registry = alb01_registry();

    let report = orchestrator(&pool, registry.clone(), Arc::new(FakeHosts::new()))
        .run(Uuid::new_v4(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.sites_total, 2);
    assert_eq!(report.sites_excluded, 1);
    assert_eq!(report.sites_dispatched, 1);
    assert!(enriched::load_one(&pool, "Lab 01").await.unwrap().is_none());
    assert!(!registry.seen().contains(&"203.0.113.99".parse().unwrap()));
}

#[tokio::test]
async fn cancelled_before_dispatch_writes_nothing() {
    let pool = memory_pool().await;
    seed_alb01(&pool).await;
    telemetry::upsert_device(&pool, &device("ALB 02", "", "", "WAN 1 Cox")).await.unwrap();
    let registry = alb01_registry();

    let cancel = CancellationToken::new();
    cancel.cancel();
    let report = orchestrator(&pool, registry.clone(), Arc::new(FakeHosts::new()))
        .run(Uuid::new_v4(), cancel)
        .await
        .unwrap();

    assert_eq!(report.state, RunState::Cancelled);
    assert_eq!(report.sites_dispatched, 0);
    assert_eq!(report.sites_not_dispatched, 2);
    assert_eq!(registry.calls(), 0);
    assert!(enriched::load_all(&pool).await.unwrap().is_empty());
}

#[tokio::test]
async fn report_is_persisted_at_end_of_run() {
    let pool = memory_pool().await;
    seed_alb01(&pool).await;
    let run_id = Uuid::new_v4();

    let report = orchestrator(&pool, alb01_registry(), Arc::new(FakeHosts::new()))
        .run(run_id, CancellationToken::new())
        .await
        .unwrap();

    let stored = runs::latest_report(&pool).await.unwrap().unwrap();
    assert_eq!(stored.run_id, run_id);
    assert_eq!(stored.state, RunState::Completed);
    assert_eq!(stored.sites_written, report.sites_written);
    assert_eq!(stored.registry_lookups, report.registry_lookups);
}

#[tokio::test]
async fn missing_telemetry_fails_the_run() {
    let pool = memory_pool().await;
    seed_alb01(&pool).await;
    sqlx::query("DROP TABLE device_telemetry").execute(&pool).await.unwrap();
    let run_id = Uuid::new_v4();

    let result = orchestrator(&pool, alb01_registry(), Arc::new(FakeHosts::new()))
        .run(run_id, CancellationToken::new())
        .await;

    assert!(matches!(result, Err(ReconError::TelemetryUnavailable(_))));
    assert!(enriched::load_all(&pool).await.unwrap().is_empty());
    let stored = runs::load_report(&pool, run_id).await.unwrap().unwrap();
    assert_eq!(stored.state, RunState::Failed);
    assert!(stored.error.is_some());
}

#[tokio::test]
async fn malformed_persisted_speed_is_corrected() {
    let pool = memory_pool().await;
    telemetry::upsert_device(&pool, &device("ALB 03", "203.0.113.40", "", "")).await.unwrap();
    circuits::insert_circuit(&pool, &circuit("ALB 03", CircuitPurpose::Primary, "Comcast", "300.0M x 30.0M", 99.0))
        .await
        .unwrap();

    let mut previous = EnrichedCircuitRecord::unknown("ALB 03");
    previous.wan1.provider = "Comcast".into();
    previous.wan1.speed = "300 x 30".into();
    previous.wan1.ip = "203.0.113.40".into();
    previous.wan1.registry_org = "Comcast".into();
    enriched::upsert_record(&pool, &previous, 1000).await.unwrap();

    let registry = Arc::new(FakeRegistry::new().with_org("203.0.113.40", "Comcast"));
    let report = orchestrator(&pool, registry, Arc::new(FakeHosts::new()))
        .run(Uuid::new_v4(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.malformed_speed_corrections, 1);
    assert_eq!(report.sites_written, 1);
    let record = enriched::load_one(&pool, "ALB 03").await.unwrap().unwrap();
    assert_eq!(record.wan1.speed, "300.0M x 30.0M");
    assert!(record.wan1.confirmed);
}

#[tokio::test]
async fn registry_outage_is_counted_and_retried_next_run() {
    let pool = memory_pool().await;
    telemetry::upsert_device(&pool, &device("ALB 04", "203.0.113.50", "", "WAN 1 Wave 500.0M x 20.0M"))
        .await
        .unwrap();
    let registry = Arc::new(FakeRegistry::new().with_org("203.0.113.50", "Wave Broadband LLC"));
    registry.fail("203.0.113.50");
    let orch = orchestrator(&pool, registry.clone(), Arc::new(FakeHosts::new()));

    let first = orch.run(Uuid::new_v4(), CancellationToken::new()).await.unwrap();

    assert_eq!(first.state, RunState::Completed);
    assert_eq!(first.unresolved_ips, 1);
    assert!(first.registry_failures >= 1);
    assert_eq!(first.sites_written, 1);
    let record = enriched::load_one(&pool, "ALB 04").await.unwrap().unwrap();
    assert_eq!(record.wan1.provider, "Wave");
    assert_eq!(record.wan1.speed, "500.0M x 20.0M");
    assert!(!record.wan1.has_registry_org());
    assert!(registry_cache::load_entries(&pool).await.unwrap().is_empty());

    registry.recover("203.0.113.50");
    let second = orch.run(Uuid::new_v4(), CancellationToken::new()).await.unwrap();

    assert_eq!(second.sites_skipped_unchanged, 0);
    assert_eq!(second.unresolved_ips, 0);
    let record = enriched::load_one(&pool, "ALB 04").await.unwrap().unwrap();
    assert_eq!(record.wan1.registry_org, "Wave Broadband");
}

#[tokio::test]
async fn on_disk_database_keeps_records_and_cache_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("wanrec.db");

    let pool = wanrec_enrich::db::init_database_pool(&db_path).await.unwrap();
    seed_alb01(&pool).await;
    let registry = alb01_registry();
    orchestrator(&pool, registry.clone(), Arc::new(FakeHosts::new()))
        .run(Uuid::new_v4(), CancellationToken::new())
        .await
        .unwrap();
    pool.close().await;

    let reopened = wanrec_enrich::db::init_database_pool(&db_path).await.unwrap();
    let report = orchestrator(&reopened, registry.clone(), Arc::new(FakeHosts::new()))
        .run(Uuid::new_v4(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.sites_skipped_unchanged, 1);
    assert_eq!(registry.calls(), 2);
    assert_eq!(registry_cache::load_entries(&reopened).await.unwrap().len(), 2);
}

#[tokio::test]
async fn unreadable_persisted_row_does_not_block_the_run() {
    let pool = memory_pool().await;
    seed_alb01(&pool).await;
    telemetry::upsert_device(&pool, &device("ALB 02", "", "", "WAN 1 Cox 150.0M x 10.0M"))
        .await
        .unwrap();
    enriched::upsert_record(&pool, &EnrichedCircuitRecord::unknown("ALB 02"), 1000)
        .await
        .unwrap();
    sqlx::query("UPDATE enriched_circuits SET wan1_circuit_role = 'Tertiary' WHERE network_name = 'ALB 02'")
        .execute(&pool)
        .await
        .unwrap();

    let report = orchestrator(&pool, alb01_registry(), Arc::new(FakeHosts::new()))
        .run(Uuid::new_v4(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.sites_written, 2);
    assert!(enriched::load_one(&pool, "ALB 01").await.unwrap().is_some());
    let rewritten = enriched::load_one(&pool, "ALB 02").await.unwrap().unwrap();
    assert_eq!(rewritten.wan1.provider, "Cox");
    assert_eq!(rewritten.wan1.circuit_role, CircuitPurpose::Primary);
}

#[tokio::test]
async fn failed_write_keeps_previous_row_and_run_completes() {
    let pool = memory_pool().await;
    seed_alb01(&pool).await;
    telemetry::upsert_device(&pool, &device("ALB 02", "", "", "WAN 1 Cox 150.0M x 10.0M"))
        .await
        .unwrap();
    let previous = EnrichedCircuitRecord::unknown("ALB 02");
    enriched::upsert_record(&pool, &previous, 1000).await.unwrap();
    sqlx::query(
        "CREATE TRIGGER block_alb02 BEFORE UPDATE ON enriched_circuits \
         WHEN OLD.network_name = 'ALB 02' \
         BEGIN SELECT RAISE(ABORT, 'blocked'); END",
    )
    .execute(&pool)
    .await
    .unwrap();

    let report = orchestrator(&pool, alb01_registry(), Arc::new(FakeHosts::new()))
        .run(Uuid::new_v4(), CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.state, RunState::Completed);
    assert_eq!(report.sites_written, 1);
    assert_eq!(report.persistence_failures, 1);
    assert_eq!(report.failed_sites, vec!["ALB 02".to_string()]);
    assert!(enriched::load_one(&pool, "ALB 01").await.unwrap().is_some());
    let kept = enriched::load_one(&pool, "ALB 02").await.unwrap().unwrap();
    assert!(kept.same_content(&previous));
}

#[tokio::test]
async fn possible_provider_matches_are_reported() {
    let pool = memory_pool().await;
    telemetry::upsert_device(&pool, &device("ALB 10", "", "", "WAN 1 Lumos Networks 500.0M x 500.0M"))
        .await
        .unwrap();
    circuits::insert_circuit(&pool, &circuit("ALB 10", CircuitPurpose::Primary, "Lumos Fiber", "500.0M x 500.0M", 180.0))
        .await
        .unwrap();
    let settings = ReconSettings {
        fuzzy_match_threshold: 100,
        fuzzy_possible_threshold: 1,
        ..fast_recon_settings()
    };
    let run_id = Uuid::new_v4();

    let report = ReconciliationOrchestrator::new(
        pool.clone(),
        settings,
        Arc::new(FakeRegistry::new()),
        Arc::new(FakeHosts::new()),
    )
    .run(run_id, CancellationToken::new())
    .await
    .unwrap();

    assert_eq!(report.unconfirmed_interfaces, 2);
    assert_eq!(report.possible_match_count, 1);
    let possible = &report.possible_matches[0];
    assert_eq!(possible.site, "ALB 10");
    assert_eq!(possible.wan, WanInterface::Wan1);
    assert_eq!(possible.circuit_provider, "Lumos Fiber");
    assert_eq!(possible.candidate, "Lumos Networks");

    let stored = runs::load_report(&pool, run_id).await.unwrap().unwrap();
    assert_eq!(stored.possible_matches, report.possible_matches);
}
