//! Cooperative periodic job scheduling.

use std::{future::Future, sync::Arc, time::Duration};

use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tracing::{debug, warn};

use crate::{
    gateway::HistoryConnector,
    services::{
        game_aggregates,
        materializer::{self, MaterializeKind},
        reconciliation,
    },
    state::{SharedState, SyncKind},
};

/// Spawn a task running `job` every `period`; the first run fires right away.
///
/// Ticks missed while a run executes are delayed rather than burst, so a slow
/// run is followed by one run, not a backlog.
pub fn spawn_periodic<F, Fut>(name: &'static str, period: Duration, mut job: F) -> JoinHandle<()>
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send,
{
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            debug!(job = name, "periodic job tick");
            job().await;
        }
    })
}

/// Spawn the engine's periodic jobs: snapshot materialization, light and full
/// history syncs, and aggregate cleanup.
///
/// Every job logs its own failures; a failed run never cancels the schedule.
/// Dropping or aborting the returned handles stops the jobs.
pub fn start_background_jobs(
    state: &SharedState,
    connector: Arc<dyn HistoryConnector>,
) -> Vec<JoinHandle<()>> {
    let config = state.config();

    let materialize_state = state.clone();
    let materialize = spawn_periodic("materialize", config.materialize_interval, move || {
        let state = materialize_state.clone();
        async move {
            if let Err(err) = materializer::materialize(&state, MaterializeKind::Scheduled).await {
                warn!(error = %err, "scheduled materialization failed");
            }
        }
    });

    let light_state = state.clone();
    let light_connector = connector.clone();
    let light_sync = spawn_periodic("light_sync", config.light_sync_interval, move || {
        let state = light_state.clone();
        let connector = light_connector.clone();
        async move {
            if let Err(err) =
                reconciliation::run_sync(&state, connector.as_ref(), SyncKind::Light).await
            {
                warn!(error = %err, "light history sync failed");
            }
        }
    });

    let full_state = state.clone();
    let full_connector = connector;
    let full_sync = spawn_periodic("full_sync", config.full_sync_interval, move || {
        let state = full_state.clone();
        let connector = full_connector.clone();
        async move {
            if let Err(err) =
                reconciliation::run_sync(&state, connector.as_ref(), SyncKind::Full).await
            {
                warn!(error = %err, "full history sync failed");
            }
        }
    });

    let cleanup_state = state.clone();
    let cleanup = spawn_periodic("cleanup", config.cleanup_interval, move || {
        let state = cleanup_state.clone();
        async move {
            if let Err(err) = game_aggregates::run_cleanup(&state).await {
                warn!(error = %err, "aggregate cleanup failed");
            }
        }
    });

    vec![materialize, light_sync, full_sync, cleanup]
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use futures::future::BoxFuture;

    use super::*;
    use crate::{
        config::EngineConfig,
        dao::stats_store::memory::MemoryStatsStore,
        gateway::{HistoryError, HistoryMessage, HistorySource},
        state::EngineState,
    };

    struct NullHistory;

    impl HistorySource for NullHistory {
        fn list_channels(&self) -> BoxFuture<'static, Result<Vec<String>, HistoryError>> {
            Box::pin(async { Ok(Vec::new()) })
        }

        fn fetch_page(
            &self,
            _channel_id: String,
            _before: Option<String>,
            _limit: usize,
        ) -> BoxFuture<'static, Result<Vec<HistoryMessage>, HistoryError>> {
            Box::pin(async { Ok(Vec::new()) })
        }
    }

    struct NullConnector;

    impl HistoryConnector for NullConnector {
        fn connect(&self) -> BoxFuture<'static, Result<Arc<dyn HistorySource>, HistoryError>> {
            Box::pin(async { Ok(Arc::new(NullHistory) as Arc<dyn HistorySource>) })
        }
    }

    #[tokio::test(start_paused = true)]
    async fn periodic_job_fires_immediately_then_on_schedule() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        let handle = spawn_periodic("test", Duration::from_secs(60), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
            }
        });

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 1);

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(runs.load(Ordering::SeqCst), 2);

        handle.abort();
    }

    #[tokio::test(start_paused = true)]
    async fn background_jobs_materialize_at_startup() {
        let state = EngineState::new(EngineConfig::default());
        state
            .install_store(Arc::new(MemoryStatsStore::new()))
            .await;

        let handles = start_background_jobs(&state, Arc::new(NullConnector));
        assert_eq!(handles.len(), 4);

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(state.snapshot().await.is_some());
        assert!(state.last_sync(SyncKind::Light).await.is_some());
        assert!(state.last_sync(SyncKind::Full).await.is_some());

        for handle in handles {
            handle.abort();
        }
    }
}
