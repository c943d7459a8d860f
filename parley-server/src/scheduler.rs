//! Midnight quota reset
//!
//! Sleeps until the next 00:00 UTC, zeroes every counter, repeats. The wait
//! is recomputed from the clock on every iteration so late wake-ups never
//! accumulate into drift.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;

use parley_core::quota;
use parley_core::UserStore;

/// Time left until the next 00:00 UTC strictly after `now`.
pub fn duration_until_next_midnight(now: DateTime<Utc>) -> Duration {
    let today = now.date_naive();
    let next = today
        .succ_opt()
        .and_then(|tomorrow| tomorrow.and_hms_opt(0, 0, 0))
        .map(|midnight| midnight.and_utc());

    match next {
        Some(next) => (next - now).to_std().unwrap_or(Duration::ZERO),
        None => Duration::from_secs(24 * 60 * 60),
    }
}

/// Called from main.rs to start the daily reset loop.
pub async fn run_midnight_reset_loop(
    store: Arc<dyn UserStore>,
    shutdown: broadcast::Receiver<()>,
) {
    run_reset_loop_with_clock(store, Utc::now, shutdown).await
}

pub async fn run_reset_loop_with_clock<C>(
    store: Arc<dyn UserStore>,
    clock: C,
    mut shutdown: broadcast::Receiver<()>,
) where
    C: Fn() -> DateTime<Utc> + Send + Sync,
{
    tracing::info!("Midnight reset loop started (store: {})", store.name());

    loop {
        let wait = duration_until_next_midnight(clock());
        tracing::debug!(seconds = wait.as_secs(), "Sleeping until next counter reset");

        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                // A failed reset is retried at the next midnight.
                if let Err(e) = quota::reset_all_counters(store.as_ref(), clock()).await {
                    tracing::error!(error = %e, "Counter reset failed");
                }
            }
            _ = shutdown.recv() => {
                tracing::info!("Midnight reset loop shutting down");
                break;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use parley_core::{MemoryUserStore, UserSession};

    #[test]
    fn test_duration_from_noon() {
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap();
        assert_eq!(
            duration_until_next_midnight(now),
            Duration::from_secs(12 * 60 * 60)
        );
    }

    #[test]
    fn test_duration_at_exact_midnight_is_full_day() {
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 0, 0, 0).unwrap();
        assert_eq!(
            duration_until_next_midnight(now),
            Duration::from_secs(24 * 60 * 60)
        );
    }

    #[test]
    fn test_duration_crosses_month_and_year() {
        let now = Utc.with_ymd_and_hms(2026, 12, 31, 23, 59, 30).unwrap();
        assert_eq!(duration_until_next_midnight(now), Duration::from_secs(30));
    }

    #[test]
    fn test_duration_keeps_subsecond_precision() {
        let now = Utc.with_ymd_and_hms(2026, 10, 17, 23, 59, 59).unwrap()
            + chrono::Duration::milliseconds(950);
        assert_eq!(duration_until_next_midnight(now), Duration::from_millis(50));
    }

    #[tokio::test]
    async fn test_loop_resets_counters_at_midnight_and_stops_on_shutdown() {
        let store = Arc::new(MemoryUserStore::new());
        let mut session = UserSession::empty(1, Utc::now());
        session.message_count = 57;
        session.transcript = "User: hi\nBot: hello".to_string();
        store.put(&session).await.unwrap();

        let (tx, rx) = broadcast::channel(1);
        let almost_midnight = || {
            Utc.with_ymd_and_hms(2026, 10, 17, 23, 59, 59).unwrap()
                + chrono::Duration::milliseconds(980)
        };
        let handle = tokio::spawn(run_reset_loop_with_clock(
            store.clone(),
            almost_midnight,
            rx,
        ));

        tokio::time::sleep(Duration::from_millis(200)).await;

        let after = store.get(1).await.unwrap().unwrap();
        assert_eq!(after.message_count, 0);
        assert_eq!(after.transcript, "User: hi\nBot: hello");

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop should stop on shutdown")
            .unwrap();
    }

    #[tokio::test]
    async fn test_loop_survives_store_failure() {
        let store = Arc::new(MemoryUserStore::new());
        store.set_unavailable(true);

        let (tx, rx) = broadcast::channel(1);
        let almost_midnight = || {
            Utc.with_ymd_and_hms(2026, 10, 17, 23, 59, 59).unwrap()
                + chrono::Duration::milliseconds(990)
        };
        let handle = tokio::spawn(run_reset_loop_with_clock(
            store.clone(),
            almost_midnight,
            rx,
        ));

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!handle.is_finished(), "loop keeps running after a failed reset");

        tx.send(()).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("loop should stop on shutdown")
            .unwrap();
    }
}
