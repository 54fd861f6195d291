//! Retry of SQLite writes that hit a held lock
//!
//! Site writes come from many workers at once. SQLite serializes writers, so
//! a write can fail with "database is locked" (SQLITE_BUSY) even with a busy
//! timeout set. Such failures are retried with exponential backoff until
//! `max_wait_ms` has elapsed; every other error is returned immediately.

use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, error, warn};
use wanrec_common::{Error, Result};

const INITIAL_BACKOFF_MS: u64 = 10;
const MAX_BACKOFF_MS: u64 = 1000;

/// True for SQLITE_BUSY / SQLITE_LOCKED failures
pub fn is_lock_error(err: &Error) -> bool {
    match err {
        Error::Database(db_err) => {
            let message = db_err.to_string();
            message.contains("database is locked") || message.contains("database table is locked")
        }
        _ => false,
    }
}

/// Run `operation` until it succeeds, fails with a non-lock error, or
/// `max_wait_ms` is exhausted
///
/// Backoff starts at 10 ms and doubles up to 1 s between attempts.
pub async fn retry_on_lock<F, Fut, T>(operation_name: &str, max_wait_ms: u64, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let started = Instant::now();
    let max_wait = Duration::from_millis(max_wait_ms);
    let mut backoff_ms = INITIAL_BACKOFF_MS;
    let mut attempt: u32 = 0;

    loop {
        attempt += 1;

        let err = match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(
                        operation = operation_name,
                        attempt,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "Database write succeeded after retry"
                    );
                }
                return Ok(value);
            }
            Err(err) => err,
        };

        if !is_lock_error(&err) {
            return Err(err);
        }

        let elapsed = started.elapsed();
        if elapsed >= max_wait {
            error!(
                operation = operation_name,
                attempt,
                elapsed_ms = elapsed.as_millis() as u64,
                max_wait_ms,
                "Giving up on locked database"
            );
            return Err(Error::Internal(format!(
                "{}: database locked after {} attempts ({} ms)",
                operation_name,
                attempt,
                elapsed.as_millis()
            )));
        }

        warn!(
            operation = operation_name,
            attempt,
            backoff_ms,
            "Database locked, retrying"
        );
        tokio::time::sleep(Duration::from_millis(backoff_ms)).await;
        backoff_ms = (backoff_ms * 2).min(MAX_BACKOFF_MS);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn first_success_is_returned() {
        let value = retry_on_lock("test", 100, || async { Ok::<_, Error>(7) })
            .await
            .unwrap();
        assert_eq!(value, 7);
    }

    #[tokio::test]
    async fn other_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = retry_on_lock("test", 5000, || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(Error::Internal("constraint failed".into())) }
        })
        .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn only_database_errors_count_as_locks() {
        assert!(!is_lock_error(&Error::Internal("database is locked".into())));
        assert!(is_lock_error(&Error::Database(sqlx::Error::Protocol(
            "database is locked".into()
        ))));
    }
}
