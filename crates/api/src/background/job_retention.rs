//! Periodic removal of old jobs.
//!
//! The job store lives in memory, so jobs are dropped once they started
//! longer ago than the retention period, whatever their status. Clients
//! are expected to have collected their results by then.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use clipforge_pipeline::JobStore;
use tokio_util::sync::CancellationToken;

/// How often the sweep runs.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(3600); // 1 hour

/// Run the retention loop until `cancel` is triggered.
///
/// Removes jobs that started more than `retention_hours` ago.
pub async fn run(
    store: Arc<dyn JobStore>,
    retention_hours: i64,
    interval: Duration,
    cancel: CancellationToken,
) {
    tracing::info!(
        retention_hours,
        interval_secs = interval.as_secs(),
        "Job retention task started"
    );

    let mut ticker = tokio::time::interval(interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Job retention task stopping");
                break;
            }
            _ = ticker.tick() => {
                let cutoff = Utc::now() - chrono::Duration::hours(retention_hours);
                match store.sweep(cutoff).await {
                    Ok(0) => tracing::debug!("Job retention: nothing to remove"),
                    Ok(removed) => tracing::info!(removed, "Job retention: removed old jobs"),
                    Err(e) => tracing::error!(error = %e, "Job retention: sweep failed"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use clipforge_core::job::Job;
    use clipforge_core::types::new_job_id;
    use clipforge_pipeline::InMemoryJobStore;

    use super::*;

    #[tokio::test]
    async fn sweeps_old_jobs_and_stops_on_cancel() {
        let store = Arc::new(InMemoryJobStore::new());
        // Started 30 hours ago and never finished.
        let stale = Job::with_id(
            new_job_id(),
            Utc::now() - chrono::Duration::hours(30),
            [("a.png", "a")],
            false,
        );
        let stale_id = stale.id();
        store.create(stale).await.unwrap();
        let fresh = Job::new([("b.png", "b")], false);
        let fresh_id = fresh.id();
        store.create(fresh).await.unwrap();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(run(
            store.clone(),
            24,
            Duration::from_millis(10),
            cancel.clone(),
        ));

        for _ in 0..100 {
            if store.get(stale_id).await.unwrap().is_none() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();
        task.await.unwrap();

        assert!(store.get(stale_id).await.unwrap().is_none());
        assert!(store.get(fresh_id).await.unwrap().is_some());
    }
}
