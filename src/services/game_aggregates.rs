//! Read-modify-write updates to per-game aggregates.

use std::time::{Duration, SystemTime};

use time::{OffsetDateTime, Time};
use tracing::{debug, info};

use crate::{
    dao::models::{EventFilter, GameAggregateDelta, GameAggregateEntity},
    error::ServiceError,
    services::scoring,
    state::SharedState,
};

/// Lifecycle edge applied to one game aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameTransition {
    /// A member started playing.
    Start,
    /// A member stopped playing.
    End,
    /// A member stopped playing because they moved to another game.
    Switch,
}

impl GameTransition {
    /// Stable label for structured logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            GameTransition::Start => "start",
            GameTransition::End => "end",
            GameTransition::Switch => "switch",
        }
    }
}

/// Apply one session transition to the aggregate behind `raw_name`.
///
/// Counter bumps stay additive at the store; the recomputed fields (roster
/// count, mean session length, popularity) are written under the per-game
/// lock so concurrent transitions for the same game cannot interleave their
/// read-modify-write cycles. Returns the projected aggregate.
pub async fn apply(
    state: &SharedState,
    raw_name: &str,
    user_id: &str,
    transition: GameTransition,
    minutes: u64,
) -> Result<GameAggregateEntity, ServiceError> {
    let display_name = raw_name.trim();
    let game_id = scoring::normalize_game_name(display_name);
    if game_id.is_empty() {
        return Err(ServiceError::InvalidInput(format!(
            "game name `{raw_name}` normalizes to an empty identifier"
        )));
    }

    let store = state.require_store().await?;
    let lock = state.game_lock(&game_id);
    let _guard = lock.lock().await;

    let now = SystemTime::now();
    let today = day_start_utc(now);

    let mut aggregate = match store.find_game_aggregate(game_id.clone()).await? {
        Some(aggregate) => aggregate,
        None => {
            let aggregate = GameAggregateEntity::new(
                game_id.clone(),
                display_name.to_owned(),
                scoring::infer_category(&game_id),
                today,
                now,
            );
            store.insert_game_aggregate(aggregate.clone()).await?;
            info!(game = %game_id, category = ?aggregate.category, "tracking new game");
            aggregate
        }
    };

    // The bucket rolls in its own delta so the increments below land in the
    // fresh day.
    if aggregate.bucket_day < today {
        let rollover = GameAggregateDelta {
            reset_daily: Some(today),
            ..GameAggregateDelta::default()
        };
        store.apply_game_delta(game_id.clone(), rollover).await?;
        aggregate.daily_sessions = 0;
        aggregate.daily_minutes = 0;
        aggregate.bucket_day = today;
    }

    let mut delta = GameAggregateDelta::default();
    match transition {
        GameTransition::Start => {
            delta.sessions = 1;
            delta.daily_sessions = 1;
            if !aggregate.current_players.iter().any(|p| p == user_id) {
                aggregate.current_players.push(user_id.to_owned());
                delta.add_player = Some(user_id.to_owned());
            }
            let prior_starts = store
                .count_events(EventFilter {
                    user_id: Some(user_id.to_owned()),
                    started_game_id: Some(game_id.clone()),
                    since: Some(today),
                    ..EventFilter::default()
                })
                .await?;
            if prior_starts == 0 {
                delta.unique_players = 1;
            }
        }
        GameTransition::End | GameTransition::Switch => {
            delta.minutes = minutes;
            delta.daily_minutes = minutes;
            // An end without a matching start leaves the roster untouched.
            if aggregate.current_players.iter().any(|p| p == user_id) {
                aggregate.current_players.retain(|p| p != user_id);
                delta.remove_player = Some(user_id.to_owned());
            }
        }
    }

    aggregate.total_sessions += delta.sessions;
    aggregate.total_minutes += delta.minutes;
    aggregate.daily_sessions += delta.daily_sessions;
    aggregate.daily_minutes += delta.daily_minutes;
    aggregate.unique_players += delta.unique_players;
    aggregate.last_seen = now;
    aggregate.current_player_count = aggregate.current_players.len() as u64;
    aggregate.average_session_minutes =
        aggregate.total_minutes as f64 / aggregate.total_sessions.max(1) as f64;
    aggregate.popularity_score =
        scoring::popularity_score(&aggregate, &state.config().popularity_weights, now);

    delta.set_player_count = Some(aggregate.current_player_count);
    delta.set_average_minutes = Some(aggregate.average_session_minutes);
    delta.set_popularity = Some(aggregate.popularity_score);
    delta.set_last_seen = Some(now);

    let found = store.apply_game_delta(game_id.clone(), delta).await?;
    if !found {
        // A cleanup prune can land between the read and the write.
        store.insert_game_aggregate(aggregate.clone()).await?;
    }

    debug!(
        game = %game_id,
        user = %user_id,
        transition = transition.as_str(),
        minutes,
        "game aggregate updated"
    );

    Ok(aggregate)
}

/// Prune abandoned aggregates and roll day buckets that predate today.
///
/// Returns how many aggregates were pruned and how many buckets rolled.
pub async fn run_cleanup(state: &SharedState) -> Result<(u64, u64), ServiceError> {
    let store = state.require_store().await?;
    let now = SystemTime::now();
    let policy = state.config().cleanup;

    let idle_since = now - Duration::from_secs(policy.idle_days * 24 * 60 * 60);
    let pruned = store
        .delete_stale_game_aggregates(idle_since, policy.min_sessions)
        .await?;
    let rolled = store.reset_daily_buckets(day_start_utc(now)).await?;

    info!(pruned, rolled, "game aggregate cleanup finished");
    Ok((pruned, rolled))
}

/// UTC midnight of the day containing `at`.
pub fn day_start_utc(at: SystemTime) -> SystemTime {
    OffsetDateTime::from(at).replace_time(Time::MIDNIGHT).into()
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, UNIX_EPOCH};

    use super::*;
    use crate::{
        config::EngineConfig,
        dao::models::{ActivityEventEntity, ActivityKind},
        dao::stats_store::memory::MemoryStatsStore,
        state::{EngineState, SharedState},
    };
    use std::sync::Arc;

    async fn engine_with_store() -> SharedState {
        let state = EngineState::new(EngineConfig::default());
        state
            .install_store(Arc::new(MemoryStatsStore::new()))
            .await;
        state
    }

    #[test]
    fn day_start_lands_on_utc_midnight() {
        let now = SystemTime::now();
        let start = day_start_utc(now);
        let secs = start
            .duration_since(UNIX_EPOCH)
            .expect("after epoch")
            .as_secs();
        assert_eq!(secs % 86_400, 0);
        assert!(start <= now);
        assert!(now < start + Duration::from_secs(86_400));
    }

    #[tokio::test]
    async fn spellings_of_one_title_update_one_aggregate() {
        let state = engine_with_store().await;

        apply(&state, "The Witcher 3", "ada", GameTransition::Start, 0)
            .await
            .expect("start");
        let aggregate = apply(&state, "Witcher 3", "ada", GameTransition::End, 30)
            .await
            .expect("end");

        assert_eq!(aggregate.game_id, "witcher_3");
        assert_eq!(aggregate.total_sessions, 1);
        assert_eq!(aggregate.total_minutes, 30);
        assert_eq!(aggregate.average_session_minutes, 30.0);
        assert!(aggregate.current_players.is_empty());
    }

    #[tokio::test]
    async fn second_start_of_the_day_adds_no_unique_player() {
        let state = engine_with_store().await;
        let store = state.require_store().await.expect("store");

        let first = apply(&state, "Valorant", "ada", GameTransition::Start, 0)
            .await
            .expect("first start");
        assert_eq!(first.unique_players, 1);

        // The tracker appends the start event right after a successful apply.
        store
            .append_event(ActivityEventEntity::record(
                "ada".into(),
                ActivityKind::GameStart {
                    game_id: "valorant".into(),
                    game_name: "Valorant".into(),
                },
            ))
            .await
            .expect("append");

        apply(&state, "Valorant", "ada", GameTransition::End, 10)
            .await
            .expect("end");
        let second = apply(&state, "Valorant", "ada", GameTransition::Start, 0)
            .await
            .expect("second start");

        assert_eq!(second.unique_players, 1);
        assert_eq!(second.total_sessions, 2);
    }

    #[tokio::test]
    async fn end_without_start_leaves_roster_empty() {
        let state = engine_with_store().await;

        let aggregate = apply(&state, "Rocket League", "ada", GameTransition::End, 15)
            .await
            .expect("end");

        assert_eq!(aggregate.current_player_count, 0);
        assert!(aggregate.current_players.is_empty());
        assert_eq!(aggregate.total_minutes, 15);
        assert_eq!(aggregate.total_sessions, 0);
    }

    #[tokio::test]
    async fn stale_bucket_rolls_before_counting() {
        let state = engine_with_store().await;
        let store = state.require_store().await.expect("store");

        let yesterday = day_start_utc(SystemTime::now()) - Duration::from_secs(86_400);
        let mut aggregate = GameAggregateEntity::new(
            "minecraft".into(),
            "Minecraft".into(),
            scoring::infer_category("minecraft"),
            yesterday,
            yesterday,
        );
        aggregate.daily_sessions = 4;
        aggregate.daily_minutes = 200;
        store
            .insert_game_aggregate(aggregate)
            .await
            .expect("insert");

        let updated = apply(&state, "Minecraft", "ada", GameTransition::End, 25)
            .await
            .expect("end");

        assert_eq!(updated.bucket_day, day_start_utc(SystemTime::now()));
        assert_eq!(updated.daily_sessions, 0);
        assert_eq!(updated.daily_minutes, 25);
    }

    #[tokio::test]
    async fn blank_game_name_is_rejected() {
        let state = engine_with_store().await;
        let result = apply(&state, "  !!! ", "ada", GameTransition::Start, 0).await;
        assert!(matches!(result, Err(ServiceError::InvalidInput(_))));
    }
}
