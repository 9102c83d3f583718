//! End-to-end engine tests driving gateway events through the tracker and
//! background services against the in-memory store.

use std::{
    sync::Arc,
    time::{Duration, SystemTime},
};

use futures::future::BoxFuture;
use tokio::sync::Notify;

use uuid::Uuid;

use guild_pulse::config::EngineConfig;
use guild_pulse::dao::models::{EventFilter, VoiceSessionEntity};
use guild_pulse::dao::stats_store::memory::MemoryStatsStore;
use guild_pulse::gateway::{
    GatewayEvent, HistoryConnector, HistoryError, HistoryMessage, HistorySource, MessageCreated,
    PresenceUpdate, RosterError, VoiceOccupant, VoiceRoster, VoiceStateChange,
};
use guild_pulse::logging;
use guild_pulse::services::{
    materializer::{self, MaterializeKind},
    reconciliation, recovery, session_tracker,
};
use guild_pulse::state::{EngineState, SharedState, SyncKind, sessions::CloseReason};

async fn engine() -> SharedState {
    let state = EngineState::new(EngineConfig {
        history_page_delay: Duration::ZERO,
        ..EngineConfig::default()
    });
    state
        .install_store(Arc::new(MemoryStatsStore::new()))
        .await;
    state
}

fn voice(user: &str, from: Option<&str>, to: Option<&str>) -> GatewayEvent {
    GatewayEvent::Voice(VoiceStateChange {
        user_id: user.into(),
        guild_id: "guild".into(),
        previous_channel: from.map(Into::into),
        new_channel: to.map(Into::into),
    })
}

fn playing(user: &str, games: &[&str]) -> GatewayEvent {
    GatewayEvent::Presence(PresenceUpdate {
        user_id: user.into(),
        previous_games: Vec::new(),
        current_games: games.iter().map(|game| game.to_string()).collect(),
    })
}

fn message(user: &str) -> GatewayEvent {
    GatewayEvent::Message(MessageCreated {
        user_id: user.into(),
        channel_id: "general".into(),
    })
}

fn rewind_voice(state: &SharedState, user: &str, minutes: u64) {
    if let Some(mut session) = state.voice_sessions().get_mut(user) {
        session.started_at = session.started_at - Duration::from_secs(minutes * 60);
    }
}

async fn count_kind(state: &SharedState, kind: &'static str) -> u64 {
    let store = state.require_store().await.expect("store");
    store
        .count_events(EventFilter {
            kind: Some(kind),
            ..EventFilter::default()
        })
        .await
        .expect("count")
}

#[tokio::test]
async fn voice_pipeline_credits_switch_and_leave() {
    logging::init_test();
    let state = engine().await;
    let store = state.require_store().await.expect("store");

    session_tracker::handle_event(&state, voice("ada", None, Some("general"))).await;
    rewind_voice(&state, "ada", 30);
    session_tracker::handle_event(&state, voice("ada", Some("general"), Some("gaming"))).await;
    rewind_voice(&state, "ada", 20);
    session_tracker::handle_event(&state, voice("ada", Some("gaming"), None)).await;

    let ada = store
        .find_user("ada".into())
        .await
        .expect("find")
        .expect("user");
    assert_eq!(ada.voice_minutes, 50);

    assert_eq!(count_kind(&state, "voice_switch").await, 1);
    assert_eq!(count_kind(&state, "voice_leave").await, 1);
    assert_eq!(count_kind(&state, "voice_join").await, 0);

    let rows = store.find_active_voice_sessions().await.expect("rows");
    assert!(rows.is_empty());
    assert!(state.voice_sessions().is_empty());
}

#[tokio::test]
async fn switching_back_to_a_game_keeps_daily_unique_dedup() {
    logging::init_test();
    let state = engine().await;
    let store = state.require_store().await.expect("store");

    session_tracker::handle_event(&state, playing("ada", &["Valorant"])).await;
    session_tracker::handle_event(&state, playing("ada", &["Minecraft"])).await;
    session_tracker::handle_event(&state, playing("ada", &["Valorant"])).await;

    let valorant = store
        .find_game_aggregate("valorant".into())
        .await
        .expect("find")
        .expect("aggregate");
    assert_eq!(valorant.total_sessions, 2);
    assert_eq!(valorant.unique_players, 1);
    assert_eq!(valorant.current_players, vec!["ada".to_string()]);

    let minecraft = store
        .find_game_aggregate("minecraft".into())
        .await
        .expect("find")
        .expect("aggregate");
    assert_eq!(minecraft.unique_players, 1);
    assert!(minecraft.current_players.is_empty());

    assert_eq!(count_kind(&state, "game_start").await, 1);
    assert_eq!(count_kind(&state, "game_switch").await, 2);
}

struct FixedHistory(Vec<HistoryMessage>);

impl HistorySource for FixedHistory {
    fn list_channels(&self) -> BoxFuture<'static, Result<Vec<String>, HistoryError>> {
        Box::pin(async { Ok(vec!["general".to_string()]) })
    }

    fn fetch_page(
        &self,
        _channel_id: String,
        before: Option<String>,
        limit: usize,
    ) -> BoxFuture<'static, Result<Vec<HistoryMessage>, HistoryError>> {
        let all = self.0.clone();
        Box::pin(async move {
            let start = match before {
                None => 0,
                Some(id) => all
                    .iter()
                    .position(|message| message.id == id)
                    .map(|index| index + 1)
                    .unwrap_or(all.len()),
            };
            Ok(all.into_iter().skip(start).take(limit).collect())
        })
    }
}

struct FixedConnector(Arc<FixedHistory>);

impl HistoryConnector for FixedConnector {
    fn connect(&self) -> BoxFuture<'static, Result<Arc<dyn HistorySource>, HistoryError>> {
        let source: Arc<dyn HistorySource> = self.0.clone();
        Box::pin(async move { Ok(source) })
    }
}

#[tokio::test]
async fn live_and_backfilled_counts_add_up() {
    logging::init_test();
    let state = engine().await;

    for _ in 0..7 {
        session_tracker::handle_event(&state, message("ada")).await;
    }

    let history: Vec<HistoryMessage> = (0..3u64)
        .map(|index| HistoryMessage {
            id: index.to_string(),
            author_id: "ada".into(),
            sent_at: SystemTime::now() - Duration::from_secs(600 + index * 60),
        })
        .collect();
    let connector = FixedConnector(Arc::new(FixedHistory(history)));

    let report = reconciliation::run_sync(&state, &connector, SyncKind::Light)
        .await
        .expect("sync");
    assert!(!report.is_skipped());

    // Scanning the same window again adds nothing.
    reconciliation::run_sync(&state, &connector, SyncKind::Light)
        .await
        .expect("rerun");

    materializer::materialize(&state, MaterializeKind::Manual)
        .await
        .expect("materialize");
    let snapshot = state.snapshot().await.expect("snapshot");
    assert_eq!(snapshot.communication.messages_sent, 10);
    assert_eq!(snapshot.community.tracked_users, 1);
}

struct FixedRoster(Vec<VoiceOccupant>);

impl VoiceRoster for FixedRoster {
    fn occupants(&self) -> BoxFuture<'static, Result<Vec<VoiceOccupant>, RosterError>> {
        let occupants = self.0.clone();
        Box::pin(async move { Ok(occupants) })
    }
}

#[tokio::test]
async fn restart_recovers_sessions_from_the_store() {
    logging::init_test();
    let state = engine().await;
    let store = state.require_store().await.expect("store");

    // Row persisted by a process that crashed mid-session.
    store
        .insert_voice_session(VoiceSessionEntity {
            id: Uuid::new_v4(),
            user_id: "ada".into(),
            guild_id: "guild".into(),
            channel_id: "general".into(),
            started_at: SystemTime::now() - Duration::from_secs(45 * 60),
            active: true,
        })
        .await
        .expect("insert");

    // A fresh engine on the same store stands in for the restarted process.
    let revived = EngineState::new(EngineConfig::default());
    revived.install_store(store.clone()).await;

    let roster = FixedRoster(vec![VoiceOccupant {
        user_id: "ada".into(),
        guild_id: "guild".into(),
        channel_id: "general".into(),
    }]);
    let report = recovery::recover_abandoned_sessions(&revived, &roster, CloseReason::Restart)
        .await
        .expect("recover");

    assert_eq!(report.closed, 1);
    assert_eq!(report.minutes_credited, 45);
    assert_eq!(report.reopened, 1);
    assert_eq!(revived.voice_sessions().len(), 1);
    assert_eq!(count_kind(&revived, "voice_join").await, 1);

    let second = recovery::recover_abandoned_sessions(&revived, &roster, CloseReason::Restart)
        .await
        .expect("second run");
    assert_eq!(second.minutes_credited, 0);
}

struct GatedHistory {
    started: Arc<Notify>,
    release: Arc<Notify>,
}

impl HistorySource for GatedHistory {
    fn list_channels(&self) -> BoxFuture<'static, Result<Vec<String>, HistoryError>> {
        Box::pin(async { Ok(vec!["general".to_string()]) })
    }

    fn fetch_page(
        &self,
        _channel_id: String,
        _before: Option<String>,
        _limit: usize,
    ) -> BoxFuture<'static, Result<Vec<HistoryMessage>, HistoryError>> {
        let started = self.started.clone();
        let release = self.release.clone();
        Box::pin(async move {
            started.notify_one();
            release.notified().await;
            Ok(Vec::new())
        })
    }
}

#[derive(Clone)]
struct GatedConnector(Arc<GatedHistory>);

impl HistoryConnector for GatedConnector {
    fn connect(&self) -> BoxFuture<'static, Result<Arc<dyn HistorySource>, HistoryError>> {
        let source: Arc<dyn HistorySource> = self.0.clone();
        Box::pin(async move { Ok(source) })
    }
}

#[tokio::test]
async fn concurrent_sync_reports_skipped() {
    logging::init_test();
    let state = engine().await;

    let started = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let connector = GatedConnector(Arc::new(GatedHistory {
        started: started.clone(),
        release: release.clone(),
    }));

    let background_state = state.clone();
    let background_connector = connector.clone();
    let runner = tokio::spawn(async move {
        reconciliation::run_sync(&background_state, &background_connector, SyncKind::Full).await
    });

    // The first run holds the guard while it waits on its page fetch.
    started.notified().await;
    let second = reconciliation::run_sync(&state, &connector, SyncKind::Light)
        .await
        .expect("second run");
    assert!(second.is_skipped());

    release.notify_one();
    let first = runner.await.expect("join").expect("first run");
    assert!(!first.is_skipped());
}

#[tokio::test]
async fn snapshot_advances_once_per_completed_run() {
    logging::init_test();
    let state = engine().await;

    materializer::materialize(&state, MaterializeKind::Manual)
        .await
        .expect("first run");
    let first_stamp = state.snapshot().await.expect("snapshot").generated_at;

    {
        let _permit = state.materialize_flight().try_acquire().expect("permit");
        let skipped = materializer::materialize(&state, MaterializeKind::Scheduled)
            .await
            .expect("overlapping run");
        assert!(skipped.is_skipped());
        assert_eq!(
            state.snapshot().await.expect("snapshot").generated_at,
            first_stamp
        );
    }

    materializer::materialize(&state, MaterializeKind::Manual)
        .await
        .expect("third run");
    assert!(state.snapshot().await.expect("snapshot").generated_at > first_stamp);
}

#[tokio::test]
async fn degraded_engine_swallows_events_until_a_store_arrives() {
    logging::init_test();
    let state = EngineState::new(EngineConfig::default());
    assert!(state.is_degraded());

    // No store installed: the event is logged and dropped, nothing panics.
    session_tracker::handle_event(&state, message("ada")).await;

    state
        .install_store(Arc::new(MemoryStatsStore::new()))
        .await;
    session_tracker::handle_event(&state, message("ada")).await;

    let store = state.require_store().await.expect("store");
    let ada = store
        .find_user("ada".into())
        .await
        .expect("find")
        .expect("user");
    assert_eq!(ada.messages_sent, 1);
}
