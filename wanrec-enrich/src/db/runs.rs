//! Reconciliation run reports

use sqlx::{Row, SqlitePool};
use uuid::Uuid;
use wanrec_common::{Error, Result};

use crate::models::RunReport;
use crate::utils::retry_on_lock;

/// Insert or update the report row for `report.run_id`
pub async fn save_report(pool: &SqlitePool, report: &RunReport, max_wait_ms: u64) -> Result<()> {
    let run_id = report.run_id.to_string();
    let state = report.state.as_str();
    let body = serde_json::to_string(report)
        .map_err(|e| Error::Internal(format!("Failed to serialize run report: {}", e)))?;
    let started_at = report.started_at.to_rfc3339();
    let ended_at = report.ended_at.map(|dt| dt.to_rfc3339());

    let (run_id, body, started_at, ended_at) = (&run_id, &body, &started_at, &ended_at);
    retry_on_lock("save_report", max_wait_ms, move || async move {
        sqlx::query(
            r#"
            INSERT INTO recon_runs (run_id, state, report, started_at, ended_at)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(run_id) DO UPDATE SET
                state = excluded.state,
                report = excluded.report,
                ended_at = excluded.ended_at
            "#,
        )
        .bind(run_id)
        .bind(state)
        .bind(body)
        .bind(started_at)
        .bind(ended_at)
        .execute(pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    })
    .await
}

/// Most recently started run
pub async fn latest_report(pool: &SqlitePool) -> Result<Option<RunReport>> {
    let row = sqlx::query("SELECT report FROM recon_runs ORDER BY started_at DESC LIMIT 1")
        .fetch_optional(pool)
        .await?;
    row.map(|row| parse_report(row.get("report"))).transpose()
}

pub async fn load_report(pool: &SqlitePool, run_id: Uuid) -> Result<Option<RunReport>> {
    let row = sqlx::query("SELECT report FROM recon_runs WHERE run_id = ?")
        .bind(run_id.to_string())
        .fetch_optional(pool)
        .await?;
    row.map(|row| parse_report(row.get("report"))).transpose()
}

fn parse_report(body: String) -> Result<RunReport> {
    serde_json::from_str(&body)
        .map_err(|e| Error::Internal(format!("Failed to deserialize run report: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::test_support::memory_pool;
    use crate::models::RunState;
    use chrono::Duration;

    #[tokio::test]
    async fn latest_is_most_recently_started() {
        let pool = memory_pool().await;

        let mut older = RunReport::new(Uuid::new_v4());
        older.started_at = older.started_at - Duration::hours(1);
        older.finish(RunState::Completed);
        save_report(&pool, &older, 1000).await.unwrap();

        let mut newer = RunReport::new(Uuid::new_v4());
        newer.sites_total = 42;
        save_report(&pool, &newer, 1000).await.unwrap();

        let latest = latest_report(&pool).await.unwrap().unwrap();
        assert_eq!(latest.run_id, newer.run_id);
        assert_eq!(latest.state, RunState::Running);

        newer.finish(RunState::Cancelled);
        save_report(&pool, &newer, 1000).await.unwrap();
        let reloaded = load_report(&pool, newer.run_id).await.unwrap().unwrap();
        assert_eq!(reloaded.state, RunState::Cancelled);
        assert_eq!(reloaded.sites_total, 42);
        assert!(reloaded.ended_at.is_some());
    }

    #[tokio::test]
    async fn empty_table_has_no_latest() {
        let pool = memory_pool().await;
        assert!(latest_report(&pool).await.unwrap().is_none());
    }
}
