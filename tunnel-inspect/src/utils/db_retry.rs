//! Lock-contention retry for SQLite writes
//!
//! Concurrent submissions and alert advances share one database file; a
//! writer that finds it locked backs off and tries again, bounded by the
//! `db_max_lock_wait_ms` setting.

use sqlx::SqlitePool;
use std::time::{Duration, Instant};
use tunnel_common::db::init::get_setting_i64;
use tunnel_common::{Error, Result};

/// Max total lock wait, read from settings (default 5000 ms)
pub async fn max_lock_wait_ms(pool: &SqlitePool) -> Result<u64> {
    let value = get_setting_i64(pool, "db_max_lock_wait_ms", 5000).await?;
    Ok(value.max(0) as u64)
}

/// Run `operation` until it stops failing with lock contention
///
/// Backoff starts at 10 ms and doubles up to 1 s. Errors other than lock
/// contention return immediately. Once `max_wait_ms` has elapsed the last
/// lock error is reported as `Error::Internal`.
pub async fn retry_on_lock<F, Fut, T>(
    operation_name: &str,
    max_wait_ms: u64,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    const INITIAL_BACKOFF: Duration = Duration::from_millis(10);
    const MAX_BACKOFF: Duration = Duration::from_secs(1);

    let started = Instant::now();
    let deadline = started + Duration::from_millis(max_wait_ms);
    let mut backoff = INITIAL_BACKOFF;
    let mut attempts: u32 = 0;

    loop {
        attempts += 1;
        let err = match operation().await {
            Ok(value) => {
                if attempts > 1 {
                    let waited_ms = started.elapsed().as_millis();
                    if waited_ms > 2000 {
                        tracing::warn!(
                            operation = operation_name,
                            attempts,
                            waited_ms,
                            "Write landed after a long lock wait"
                        );
                    } else {
                        tracing::debug!(
                            operation = operation_name,
                            attempts,
                            waited_ms,
                            "Write landed after lock retry"
                        );
                    }
                }
                return Ok(value);
            }
            Err(err) if err.is_lock_contention() => err,
            Err(err) => return Err(err),
        };

        if Instant::now() >= deadline {
            let waited_ms = started.elapsed().as_millis();
            tracing::error!(
                operation = operation_name,
                attempts,
                waited_ms,
                max_wait_ms,
                error = %err,
                "Giving up on locked database"
            );
            return Err(Error::Internal(format!(
                "Database locked: {} gave up after {} attempts ({} ms, limit {} ms)",
                operation_name, attempts, waited_ms, max_wait_ms
            )));
        }

        tracing::warn!(
            operation = operation_name,
            attempts,
            backoff_ms = backoff.as_millis(),
            "Database locked, backing off"
        );
        tokio::time::sleep(backoff).await;
        backoff = (backoff * 2).min(MAX_BACKOFF);
    }
}
