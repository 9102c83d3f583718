//! Periodic recomputation of the server-wide stats snapshot.

use std::time::{Duration, SystemTime};

use tracing::info;

use crate::{
    dao::models::{
        CommunicationTotals, CommunityTotals, GameLeader, GamingTotals, MemberLeader,
        ServerStatsSnapshot,
    },
    dto::{
        format_system_time,
        status::{HealthReport, MaterializeReport, MaterializerStatus},
    },
    error::ServiceError,
    state::SharedState,
};

/// Snapshot age after which the materializer reports unhealthy.
const SNAPSHOT_STALE_AFTER: Duration = Duration::from_secs(60 * 60);

/// What triggered a materialization run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaterializeKind {
    /// Fired by the periodic schedule.
    Scheduled,
    /// Requested by an operator surface.
    Manual,
}

impl MaterializeKind {
    /// Stable label for structured logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            MaterializeKind::Scheduled => "scheduled",
            MaterializeKind::Manual => "manual",
        }
    }
}

/// Rebuild the stats snapshot from stored counters and live session counts,
/// persist it, and swap it into the shared slot.
///
/// Readers only ever see a complete snapshot. A run that collides with one
/// already in flight reports [`MaterializeReport::Skipped`].
pub async fn materialize(
    state: &SharedState,
    kind: MaterializeKind,
) -> Result<MaterializeReport, ServiceError> {
    let Some(_permit) = state.materialize_flight().try_acquire() else {
        info!(trigger = kind.as_str(), "materialization already running, skipping");
        return Ok(MaterializeReport::Skipped);
    };

    let store = state.require_store().await?;
    let config = state.config();
    let now = SystemTime::now();

    let tracked_users = store.count_users().await?;
    let active_last_day = store
        .count_users_active_since(now - Duration::from_secs(24 * 60 * 60))
        .await?;
    let (live_voice_sessions, live_game_sessions) = state.live_counts();

    let user_totals = store.sum_user_counters().await?;
    let game_totals = store.sum_game_counters().await?;
    let distinct_games = store.count_game_aggregates().await?;

    let top_members: Vec<MemberLeader> = store
        .top_users_by_activity(config.activity_weights, config.leaderboard_size)
        .await?
        .iter()
        .map(|user| MemberLeader {
            user_id: user.user_id.clone(),
            activity_score: config.activity_weights.score(user),
            messages_sent: user.messages_sent,
            voice_minutes: user.voice_minutes,
            games_played: user.games_played,
        })
        .collect();

    let top_games: Vec<GameLeader> = store
        .top_game_aggregates(config.leaderboard_size)
        .await?
        .iter()
        .map(|aggregate| GameLeader {
            game_id: aggregate.game_id.clone(),
            display_name: aggregate.display_name.clone(),
            total_sessions: aggregate.total_sessions,
            total_hours: aggregate.total_minutes / 60,
        })
        .collect();

    let snapshot = ServerStatsSnapshot {
        community: CommunityTotals {
            tracked_users,
            active_last_day,
            live_voice_sessions,
        },
        gaming: GamingTotals {
            total_sessions: game_totals.total_sessions,
            total_minutes: game_totals.total_minutes,
            distinct_games,
            live_players: live_game_sessions,
        },
        communication: CommunicationTotals {
            messages_sent: user_totals.messages_sent,
            voice_minutes: user_totals.voice_minutes,
        },
        events_attended: user_totals.events_attended,
        top_members,
        top_games,
        generated_at: now,
    };

    store.save_snapshot(snapshot.clone()).await?;

    let report = MaterializeReport::Completed {
        tracked_users,
        tracked_games: distinct_games,
        top_members: snapshot.top_members.len(),
        top_games: snapshot.top_games.len(),
        generated_at: format_system_time(now),
    };
    state.install_snapshot(snapshot).await;

    info!(
        trigger = kind.as_str(),
        users = tracked_users,
        games = distinct_games,
        "stats snapshot materialized"
    );
    Ok(report)
}

/// Load the persisted snapshot into the shared slot.
///
/// Runs at startup so status surfaces serve the last known good snapshot
/// until the first materialization completes. Returns whether one was found.
pub async fn restore_snapshot(state: &SharedState) -> Result<bool, ServiceError> {
    let store = state.require_store().await?;
    match store.load_snapshot().await? {
        Some(snapshot) => {
            info!("restored persisted stats snapshot");
            state.install_snapshot(snapshot).await;
            Ok(true)
        }
        None => Ok(false),
    }
}

/// Materializer status for monitoring surfaces.
pub async fn status(state: &SharedState) -> MaterializerStatus {
    let generated_at = state
        .snapshot()
        .await
        .map(|snapshot| snapshot.generated_at);
    let (live_voice_sessions, live_game_sessions) = state.live_counts();
    MaterializerStatus {
        snapshot: HealthReport::from_last_run(
            generated_at,
            SNAPSHOT_STALE_AFTER,
            state.materialize_flight().is_busy(),
        ),
        live_voice_sessions,
        live_game_sessions,
    }
}

/// Whether the current snapshot is fresh enough to serve.
///
/// Unhealthy when no snapshot exists or its age exceeds one hour, regardless
/// of whether a run is in progress.
pub async fn health_check(state: &SharedState) -> bool {
    match state.snapshot().await {
        Some(snapshot) => {
            let age = SystemTime::now()
                .duration_since(snapshot.generated_at)
                .unwrap_or_default();
            age <= SNAPSHOT_STALE_AFTER
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        config::EngineConfig,
        dao::{
            models::{GameAggregateEntity, GameCategory, UserCounterDelta},
            stats_store::memory::MemoryStatsStore,
        },
        state::EngineState,
    };

    async fn engine_with_store() -> SharedState {
        let state = EngineState::new(EngineConfig::default());
        state
            .install_store(Arc::new(MemoryStatsStore::new()))
            .await;
        state
    }

    async fn seed(state: &SharedState) {
        let store = state.require_store().await.expect("store");
        let now = SystemTime::now();
        store
            .apply_user_delta(
                "ada".into(),
                UserCounterDelta {
                    messages_sent: 10,
                    voice_minutes: 30,
                    games_played: 2,
                    events_attended: 1,
                    touch_last_seen: Some(now),
                },
            )
            .await
            .expect("ada");
        store
            .apply_user_delta(
                "grace".into(),
                UserCounterDelta {
                    messages_sent: 50,
                    touch_last_seen: Some(now),
                    ..UserCounterDelta::default()
                },
            )
            .await
            .expect("grace");

        let mut aggregate = GameAggregateEntity::new(
            "valorant".into(),
            "Valorant".into(),
            GameCategory::Shooter,
            now,
            now,
        );
        aggregate.total_sessions = 4;
        aggregate.total_minutes = 200;
        store
            .insert_game_aggregate(aggregate)
            .await
            .expect("aggregate");
    }

    #[tokio::test]
    async fn snapshot_reflects_store_and_live_counts() {
        let state = engine_with_store().await;
        seed(&state).await;

        let report = materialize(&state, MaterializeKind::Manual)
            .await
            .expect("materialize");
        match report {
            MaterializeReport::Completed {
                tracked_users,
                tracked_games,
                ..
            } => {
                assert_eq!(tracked_users, 2);
                assert_eq!(tracked_games, 1);
            }
            MaterializeReport::Skipped => panic!("run was skipped"),
        }

        let snapshot = state.snapshot().await.expect("snapshot");
        assert_eq!(snapshot.community.tracked_users, 2);
        assert_eq!(snapshot.community.active_last_day, 2);
        assert_eq!(snapshot.communication.messages_sent, 60);
        assert_eq!(snapshot.communication.voice_minutes, 30);
        assert_eq!(snapshot.events_attended, 1);
        assert_eq!(snapshot.gaming.total_sessions, 4);
        assert_eq!(snapshot.gaming.distinct_games, 1);

        // ada: 10 + 2*30 + 3*2 = 76; grace: 50.
        assert_eq!(snapshot.top_members[0].user_id, "ada");
        assert_eq!(snapshot.top_members[0].activity_score, 76);
        assert_eq!(snapshot.top_games[0].game_id, "valorant");
        assert_eq!(snapshot.top_games[0].total_hours, 3);

        // The snapshot was persisted as well as installed.
        let store = state.require_store().await.expect("store");
        let persisted = store.load_snapshot().await.expect("load").expect("saved");
        assert_eq!(persisted, *snapshot);
    }

    #[tokio::test]
    async fn colliding_run_is_skipped() {
        let state = engine_with_store().await;
        let _permit = state.materialize_flight().try_acquire().expect("permit");

        let report = materialize(&state, MaterializeKind::Scheduled)
            .await
            .expect("materialize");
        assert!(report.is_skipped());
        assert!(state.snapshot().await.is_none());
    }

    #[tokio::test]
    async fn health_flips_once_snapshot_goes_stale() {
        let state = engine_with_store().await;
        assert!(!health_check(&state).await);

        materialize(&state, MaterializeKind::Manual)
            .await
            .expect("materialize");
        assert!(health_check(&state).await);
        assert!(status(&state).await.snapshot.healthy);

        let stale = {
            let current = state.snapshot().await.expect("snapshot");
            let mut stale = (*current).clone();
            stale.generated_at = SystemTime::now() - Duration::from_secs(2 * 60 * 60);
            stale
        };
        state.install_snapshot(stale).await;
        assert!(!health_check(&state).await);
        assert!(!status(&state).await.snapshot.healthy);
    }

    #[tokio::test]
    async fn restore_brings_back_the_persisted_snapshot() {
        let state = engine_with_store().await;
        seed(&state).await;
        materialize(&state, MaterializeKind::Manual)
            .await
            .expect("materialize");
        let generated_at = state.snapshot().await.expect("snapshot").generated_at;

        // A fresh engine sharing the same store starts empty.
        let revived = EngineState::new(EngineConfig::default());
        let store = state.require_store().await.expect("store");
        revived.install_store(store).await;
        assert!(revived.snapshot().await.is_none());

        let restored = restore_snapshot(&revived).await.expect("restore");
        assert!(restored);
        assert_eq!(
            revived.snapshot().await.expect("snapshot").generated_at,
            generated_at
        );
    }
}
