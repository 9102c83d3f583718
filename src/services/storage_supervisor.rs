use std::{future::Future, sync::Arc, time::Duration};

use tokio::time::sleep;
use tracing::{info, warn};

use crate::{
    dao::{stats_store::StatsStore, storage::StorageError},
    state::SharedState,
};

const INITIAL_DELAY: Duration = Duration::from_millis(1_000);
const MAX_DELAY: Duration = Duration::from_secs(10);
const HEALTH_POLL_INTERVAL: Duration = Duration::from_secs(5);
const MAX_RECONNECT_ATTEMPTS: u32 = 3;

/// Connect to the storage backend, poll its health, and toggle the engine's
/// degraded mode while it is unavailable.
pub async fn run<F, Fut>(state: SharedState, mut connect: F)
where
    F: FnMut() -> Fut + Send + 'static,
    Fut: Future<Output = Result<Arc<dyn StatsStore>, StorageError>> + Send,
{
    let mut delay = INITIAL_DELAY;

    loop {
        match connect().await {
            Ok(store) => {
                state.install_store(store.clone()).await;
                info!("storage connection established, leaving degraded mode");
                delay = INITIAL_DELAY;

                watch_health(&state, store.as_ref()).await;

                state.clear_store().await;
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
            Err(err) => {
                warn!(error = %err, "storage connection attempt failed");
                sleep(delay).await;
                delay = (delay * 2).min(MAX_DELAY);
            }
        }
    }
}

/// Poll the store until its reconnect attempts are exhausted.
async fn watch_health(state: &SharedState, store: &dyn StatsStore) {
    loop {
        match store.health_check().await {
            Ok(()) => {
                if state.is_degraded() {
                    info!("storage healthy again, leaving degraded mode");
                    state.update_degraded(false);
                }
                sleep(HEALTH_POLL_INTERVAL).await;
            }
            Err(_) => {
                if reconnect(state, store).await {
                    state.update_degraded(false);
                    sleep(HEALTH_POLL_INTERVAL).await;
                } else {
                    warn!("exhausted storage reconnect attempts, abandoning this connection");
                    return;
                }
            }
        }
    }
}

/// Bounded reconnect attempts with exponential backoff. Degraded mode starts
/// on the first failed attempt, not on the triggering health check.
async fn reconnect(state: &SharedState, store: &dyn StatsStore) -> bool {
    let mut reconnect_delay = INITIAL_DELAY;
    for attempt in 0..MAX_RECONNECT_ATTEMPTS {
        match store.try_reconnect().await {
            Ok(()) => {
                info!("storage reconnection succeeded after health check failure");
                return true;
            }
            Err(err) => {
                if attempt == 0 {
                    warn!(
                        attempt,
                        error = %err,
                        "storage reconnect failed, entering degraded mode"
                    );
                    state.update_degraded(true);
                } else {
                    warn!(attempt, error = %err, "storage reconnect attempt failed");
                }
                sleep(reconnect_delay).await;
                reconnect_delay = (reconnect_delay * 2).min(MAX_DELAY);
            }
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::{
        config::EngineConfig, dao::stats_store::memory::MemoryStatsStore, state::EngineState,
    };

    #[tokio::test(start_paused = true)]
    async fn retries_until_a_connection_succeeds() {
        let state = EngineState::new(EngineConfig::default());
        assert!(state.is_degraded());

        let attempts = Arc::new(AtomicUsize::new(0));
        let counter = attempts.clone();
        let connect = move || {
            let attempt = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 0 {
                    Err(StorageError::unavailable(
                        "connect".into(),
                        std::io::Error::other("connection refused"),
                    ))
                } else {
                    Ok(Arc::new(MemoryStatsStore::new()) as Arc<dyn StatsStore>)
                }
            }
        };

        let supervisor = tokio::spawn(run(state.clone(), connect));

        // The first attempt fails, the retry one backoff step later sticks.
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(!state.is_degraded());
        assert!(state.store().await.is_some());
        assert_eq!(attempts.load(Ordering::SeqCst), 2);

        supervisor.abort();
    }
}
