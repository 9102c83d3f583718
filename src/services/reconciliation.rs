//! Historical message backfill merged additively into live counters.

use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, SystemTime},
};

use async_stream::stream;
use futures::{Stream, StreamExt};
use tracing::{info, warn};

use crate::{
    dao::models::UserCounterDelta,
    dto::status::{HealthReport, SyncReport, SyncStatus},
    error::ServiceError,
    gateway::{HistoryConnector, HistoryError, HistoryMessage, HistorySource},
    state::{SharedState, SyncKind},
};

/// Scan the history source back to the sync watermark and merge the tallied
/// message counts into the stored counters.
///
/// Commits are additive increments only; a backfill is a partial recount and
/// must never overwrite counts accrued by live tracking. The watermark
/// advances to this run's start instant once the run commits. A run that
/// collides with one already in flight reports [`SyncReport::Skipped`].
pub async fn run_sync(
    state: &SharedState,
    connector: &dyn HistoryConnector,
    kind: SyncKind,
) -> Result<SyncReport, ServiceError> {
    let Some(_permit) = state.sync_flight().try_acquire() else {
        info!(kind = kind.as_str(), "history sync already running, skipping");
        return Ok(SyncReport::Skipped);
    };

    let store = state.require_store().await?;
    let config = state.config();
    let run_started = SystemTime::now();
    let lookback = match kind {
        SyncKind::Light => config.light_sync_lookback,
        SyncKind::Full => config.full_sync_lookback,
    };
    let watermark = state
        .last_sync(kind)
        .await
        .unwrap_or(run_started - lookback);

    info!(kind = kind.as_str(), "history sync started");

    let source = connector.connect().await?;
    let channels = source.list_channels().await?;

    let mut tally: HashMap<String, u64> = HashMap::new();
    let mut channels_scanned = 0u64;
    let mut channels_skipped = 0u64;
    let mut messages_tallied = 0u64;

    for channel_id in channels {
        match scan_channel(&source, &channel_id, watermark, state).await {
            Ok(channel_tally) => {
                channels_scanned += 1;
                for (author_id, count) in channel_tally {
                    messages_tallied += count;
                    *tally.entry(author_id).or_insert(0) += count;
                }
            }
            Err(err) => {
                warn!(channel = %channel_id, error = %err, "channel scan failed, skipping");
                channels_skipped += 1;
            }
        }
    }

    let mut users_updated = 0u64;
    for (user_id, count) in tally {
        // No last-seen touch: a historical message says nothing about when
        // the member was last active.
        let delta = UserCounterDelta {
            messages_sent: count,
            ..UserCounterDelta::default()
        };
        store.apply_user_delta(user_id, delta).await?;
        users_updated += 1;
    }

    let repaired_counters = store.repair_counter_fields().await?;
    state.record_sync(kind, run_started).await;

    info!(
        kind = kind.as_str(),
        channels = channels_scanned,
        skipped = channels_skipped,
        messages = messages_tallied,
        users = users_updated,
        repaired = repaired_counters,
        "history sync finished"
    );

    Ok(SyncReport::Completed {
        kind,
        channels_scanned,
        channels_skipped,
        messages_tallied,
        users_updated,
        repaired_counters,
    })
}

/// Tally one channel's messages newer than the watermark, newest-backward.
///
/// The whole channel is dropped on a page failure so a skipped channel
/// contributes nothing rather than a partial count.
async fn scan_channel(
    source: &Arc<dyn HistorySource>,
    channel_id: &str,
    watermark: SystemTime,
    state: &SharedState,
) -> Result<HashMap<String, u64>, HistoryError> {
    let config = state.config();
    let pages = channel_pages(
        source.clone(),
        channel_id.to_owned(),
        config.history_page_size,
        config.history_page_delay,
    );
    tokio::pin!(pages);

    let mut tally: HashMap<String, u64> = HashMap::new();
    while let Some(page) = pages.next().await {
        let page = page?;
        for message in page {
            // Pages arrive newest first, so the first message behind the
            // watermark ends the channel.
            if message.sent_at < watermark {
                return Ok(tally);
            }
            *tally.entry(message.author_id).or_insert(0) += 1;
        }
    }
    Ok(tally)
}

/// Page stream over one channel's history, sleeping between fetches so the
/// source's throughput limits are respected.
fn channel_pages(
    source: Arc<dyn HistorySource>,
    channel_id: String,
    page_size: usize,
    page_delay: Duration,
) -> impl Stream<Item = Result<Vec<HistoryMessage>, HistoryError>> {
    stream! {
        let mut cursor: Option<String> = None;
        let mut first = true;
        loop {
            if !first {
                tokio::time::sleep(page_delay).await;
            }
            first = false;

            match source.fetch_page(channel_id.clone(), cursor.clone(), page_size).await {
                Ok(page) => {
                    let exhausted = page.len() < page_size;
                    cursor = page.last().map(|message| message.id.clone());
                    yield Ok(page);
                    if exhausted {
                        break;
                    }
                }
                Err(err) => {
                    yield Err(err);
                    break;
                }
            }
        }
    }
}

/// Freshness of both sync flavors.
///
/// A flavor is healthy while its last run is younger than twice its interval,
/// so one missed tick does not flap the report.
pub async fn status(state: &SharedState) -> SyncStatus {
    let config = state.config();
    let in_progress = state.sync_flight().is_busy();
    SyncStatus {
        light: HealthReport::from_last_run(
            state.last_sync(SyncKind::Light).await,
            config.light_sync_interval * 2,
            in_progress,
        ),
        full: HealthReport::from_last_run(
            state.last_sync(SyncKind::Full).await,
            config.full_sync_interval * 2,
            in_progress,
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use futures::future::BoxFuture;

    use super::*;
    use crate::{
        config::EngineConfig,
        dao::stats_store::memory::MemoryStatsStore,
        state::EngineState,
    };

    struct FixedHistory {
        channels: Vec<String>,
        messages: HashMap<String, Vec<HistoryMessage>>,
        fetches: Arc<AtomicUsize>,
        fail_channel: Option<String>,
    }

    impl HistorySource for FixedHistory {
        fn list_channels(&self) -> BoxFuture<'static, Result<Vec<String>, HistoryError>> {
            let channels = self.channels.clone();
            Box::pin(async move { Ok(channels) })
        }

        fn fetch_page(
            &self,
            channel_id: String,
            before: Option<String>,
            limit: usize,
        ) -> BoxFuture<'static, Result<Vec<HistoryMessage>, HistoryError>> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            if self.fail_channel.as_deref() == Some(channel_id.as_str()) {
                return Box::pin(async move {
                    Err(HistoryError::page_fetch(
                        channel_id,
                        std::io::Error::other("page unavailable"),
                    ))
                });
            }
            let all = self.messages.get(&channel_id).cloned().unwrap_or_default();
            let start = match before {
                None => 0,
                Some(id) => all
                    .iter()
                    .position(|message| message.id == id)
                    .map(|index| index + 1)
                    .unwrap_or(all.len()),
            };
            let page: Vec<HistoryMessage> = all.into_iter().skip(start).take(limit).collect();
            Box::pin(async move { Ok(page) })
        }
    }

    struct FixedConnector(Arc<FixedHistory>);

    impl HistoryConnector for FixedConnector {
        fn connect(&self) -> BoxFuture<'static, Result<Arc<dyn HistorySource>, HistoryError>> {
            let source: Arc<dyn HistorySource> = self.0.clone();
            Box::pin(async move { Ok(source) })
        }
    }

    fn message(id: usize, author: &str, minutes_ago: u64) -> HistoryMessage {
        HistoryMessage {
            id: id.to_string(),
            author_id: author.to_owned(),
            sent_at: SystemTime::now() - Duration::from_secs(minutes_ago * 60),
        }
    }

    fn quick_config() -> EngineConfig {
        EngineConfig {
            history_page_size: 2,
            history_page_delay: Duration::ZERO,
            ..EngineConfig::default()
        }
    }

    async fn engine_with_store(config: EngineConfig) -> crate::state::SharedState {
        let state = EngineState::new(config);
        state
            .install_store(Arc::new(MemoryStatsStore::new()))
            .await;
        state
    }

    #[tokio::test]
    async fn backfill_adds_on_top_of_live_counts() {
        let state = engine_with_store(quick_config()).await;
        let store = state.require_store().await.expect("store");

        // Live tracking already accrued seven messages.
        store
            .apply_user_delta(
                "ada".into(),
                UserCounterDelta {
                    messages_sent: 7,
                    ..UserCounterDelta::default()
                },
            )
            .await
            .expect("seed");

        let history = Arc::new(FixedHistory {
            channels: vec!["general".into()],
            messages: HashMap::from([(
                "general".into(),
                vec![
                    message(3, "ada", 5),
                    message(2, "ada", 10),
                    message(1, "ada", 15),
                ],
            )]),
            fetches: Arc::new(AtomicUsize::new(0)),
            fail_channel: None,
        });
        let connector = FixedConnector(history.clone());

        let report = run_sync(&state, &connector, SyncKind::Light)
            .await
            .expect("sync");
        match report {
            SyncReport::Completed {
                messages_tallied,
                users_updated,
                ..
            } => {
                assert_eq!(messages_tallied, 3);
                assert_eq!(users_updated, 1);
            }
            SyncReport::Skipped => panic!("sync was skipped"),
        }

        let ada = store
            .find_user("ada".into())
            .await
            .expect("find")
            .expect("user");
        assert_eq!(ada.messages_sent, 10);

        // The watermark advanced, so an immediate rerun finds nothing new.
        let rerun = run_sync(&state, &connector, SyncKind::Light)
            .await
            .expect("rerun");
        match rerun {
            SyncReport::Completed {
                messages_tallied, ..
            } => assert_eq!(messages_tallied, 0),
            SyncReport::Skipped => panic!("rerun was skipped"),
        }
        let ada = store
            .find_user("ada".into())
            .await
            .expect("find")
            .expect("user");
        assert_eq!(ada.messages_sent, 10);
    }

    #[tokio::test]
    async fn pages_stop_at_the_watermark() {
        let state = engine_with_store(quick_config()).await;

        // Pretend a light sync finished an hour ago.
        state
            .record_sync(
                SyncKind::Light,
                SystemTime::now() - Duration::from_secs(3600),
            )
            .await;

        let history = Arc::new(FixedHistory {
            channels: vec!["general".into()],
            messages: HashMap::from([(
                "general".into(),
                vec![
                    message(4, "ada", 10),
                    message(3, "grace", 30),
                    // Older than the watermark, must not be counted and must
                    // stop the scan before further pages are fetched.
                    message(2, "ada", 90),
                    message(1, "ada", 120),
                ],
            )]),
            fetches: Arc::new(AtomicUsize::new(0)),
            fail_channel: None,
        });
        let connector = FixedConnector(history.clone());

        let report = run_sync(&state, &connector, SyncKind::Light)
            .await
            .expect("sync");
        match report {
            SyncReport::Completed {
                messages_tallied, ..
            } => assert_eq!(messages_tallied, 2),
            SyncReport::Skipped => panic!("sync was skipped"),
        }
        assert_eq!(history.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failing_channel_is_skipped_not_fatal() {
        let state = engine_with_store(quick_config()).await;
        let store = state.require_store().await.expect("store");

        let history = Arc::new(FixedHistory {
            channels: vec!["general".into(), "memes".into()],
            messages: HashMap::from([
                ("general".into(), vec![message(1, "ada", 5)]),
                ("memes".into(), vec![message(2, "grace", 5)]),
            ]),
            fetches: Arc::new(AtomicUsize::new(0)),
            fail_channel: Some("memes".into()),
        });
        let connector = FixedConnector(history);

        let report = run_sync(&state, &connector, SyncKind::Light)
            .await
            .expect("sync");
        match report {
            SyncReport::Completed {
                channels_scanned,
                channels_skipped,
                messages_tallied,
                ..
            } => {
                assert_eq!(channels_scanned, 1);
                assert_eq!(channels_skipped, 1);
                assert_eq!(messages_tallied, 1);
            }
            SyncReport::Skipped => panic!("sync was skipped"),
        }

        assert!(
            store
                .find_user("grace".into())
                .await
                .expect("find")
                .is_none()
        );
    }

    #[tokio::test]
    async fn colliding_run_reports_skipped() {
        let state = engine_with_store(quick_config()).await;
        let _permit = state.sync_flight().try_acquire().expect("permit");

        let history = Arc::new(FixedHistory {
            channels: vec![],
            messages: HashMap::new(),
            fetches: Arc::new(AtomicUsize::new(0)),
            fail_channel: None,
        });
        let connector = FixedConnector(history);

        let report = run_sync(&state, &connector, SyncKind::Light)
            .await
            .expect("sync");
        assert!(report.is_skipped());
    }

    #[tokio::test]
    async fn status_reports_both_flavors() {
        let state = engine_with_store(quick_config()).await;
        state.record_sync(SyncKind::Light, SystemTime::now()).await;

        let status = status(&state).await;
        assert!(status.light.healthy);
        assert!(!status.full.healthy);
        assert!(!status.light.in_progress);
    }
}
