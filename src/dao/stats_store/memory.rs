//! In-memory [`StatsStore`] backend.
//!
//! Used by hosts that run without a database and by the test suite. All
//! operations are lock-scoped map updates, so the delta semantics match the
//! MongoDB backend without any I/O.

use std::{sync::Arc, time::SystemTime};

use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::dao::{
    models::{
        ActivityEventEntity, ActivityWeights, CounterTotals, EventFilter, GameAggregateDelta,
        GameAggregateEntity, GameCounterTotals, ServerStatsSnapshot, UserCounterDelta,
        UserStatsEntity, VoiceSessionEntity,
    },
    stats_store::StatsStore,
    storage::StorageResult,
};

/// Map-backed stats store with the same delta semantics as the database
/// backends.
#[derive(Clone, Default)]
pub struct MemoryStatsStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    users: DashMap<String, UserStatsEntity>,
    voice_sessions: DashMap<Uuid, VoiceSessionEntity>,
    game_aggregates: DashMap<String, GameAggregateEntity>,
    events: DashMap<Uuid, ActivityEventEntity>,
    snapshot: RwLock<Option<ServerStatsSnapshot>>,
}

impl MemoryStatsStore {
    /// Fresh store with no records.
    pub fn new() -> Self {
        Self::default()
    }
}

fn apply_user_delta_to(record: &mut UserStatsEntity, delta: &UserCounterDelta) {
    record.messages_sent = record.messages_sent.saturating_add(delta.messages_sent);
    record.voice_minutes = record.voice_minutes.saturating_add(delta.voice_minutes);
    record.games_played = record.games_played.saturating_add(delta.games_played);
    record.events_attended = record.events_attended.saturating_add(delta.events_attended);
    if let Some(at) = delta.touch_last_seen {
        record.last_seen = at;
    }
}

fn apply_game_delta_to(aggregate: &mut GameAggregateEntity, delta: &GameAggregateDelta) {
    if let Some(day) = delta.reset_daily {
        aggregate.daily_sessions = 0;
        aggregate.daily_minutes = 0;
        aggregate.bucket_day = day;
    }
    aggregate.total_sessions = aggregate.total_sessions.saturating_add(delta.sessions);
    aggregate.total_minutes = aggregate.total_minutes.saturating_add(delta.minutes);
    aggregate.daily_sessions = aggregate.daily_sessions.saturating_add(delta.daily_sessions);
    aggregate.daily_minutes = aggregate.daily_minutes.saturating_add(delta.daily_minutes);
    aggregate.unique_players = aggregate.unique_players.saturating_add(delta.unique_players);
    if let Some(player) = &delta.add_player
        && !aggregate.current_players.contains(player)
    {
        aggregate.current_players.push(player.clone());
    }
    if let Some(player) = &delta.remove_player {
        aggregate.current_players.retain(|present| present != player);
    }
    if let Some(count) = delta.set_player_count {
        aggregate.current_player_count = count;
    }
    if let Some(average) = delta.set_average_minutes {
        aggregate.average_session_minutes = average;
    }
    if let Some(score) = delta.set_popularity {
        aggregate.popularity_score = score;
    }
    if let Some(at) = delta.set_last_seen {
        aggregate.last_seen = at;
    }
}

impl StatsStore for MemoryStatsStore {
    fn apply_user_delta(
        &self,
        user_id: String,
        delta: UserCounterDelta,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            if delta.is_empty() {
                return Ok(());
            }
            let key = user_id.clone();
            let mut record = store
                .inner
                .users
                .entry(user_id)
                .or_insert_with(|| UserStatsEntity::new(key, SystemTime::UNIX_EPOCH));
            apply_user_delta_to(&mut record, &delta);
            Ok(())
        })
    }

    fn find_user(
        &self,
        user_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<UserStatsEntity>>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.users.get(&user_id).map(|record| record.clone())) })
    }

    fn count_users(&self) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.users.len() as u64) })
    }

    fn count_users_active_since(
        &self,
        since: SystemTime,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            let active = store
                .inner
                .users
                .iter()
                .filter(|record| record.last_seen >= since)
                .count();
            Ok(active as u64)
        })
    }

    fn sum_user_counters(&self) -> BoxFuture<'static, StorageResult<CounterTotals>> {
        let store = self.clone();
        Box::pin(async move {
            let mut totals = CounterTotals::default();
            for record in store.inner.users.iter() {
                totals.messages_sent = totals.messages_sent.saturating_add(record.messages_sent);
                totals.voice_minutes = totals.voice_minutes.saturating_add(record.voice_minutes);
                totals.games_played = totals.games_played.saturating_add(record.games_played);
                totals.events_attended =
                    totals.events_attended.saturating_add(record.events_attended);
            }
            Ok(totals)
        })
    }

    fn top_users_by_activity(
        &self,
        weights: ActivityWeights,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<UserStatsEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut users: Vec<UserStatsEntity> = store
                .inner
                .users
                .iter()
                .map(|record| record.clone())
                .collect();
            users.sort_by(|a, b| {
                weights
                    .score(b)
                    .cmp(&weights.score(a))
                    .then_with(|| a.user_id.cmp(&b.user_id))
            });
            users.truncate(limit);
            Ok(users)
        })
    }

    fn repair_counter_fields(&self) -> BoxFuture<'static, StorageResult<u64>> {
        // Typed records cannot hold malformed counters.
        Box::pin(async move { Ok(0) })
    }

    fn insert_voice_session(
        &self,
        session: VoiceSessionEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.inner.voice_sessions.insert(session.id, session);
            Ok(())
        })
    }

    fn delete_voice_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.voice_sessions.remove(&id).is_some()) })
    }

    fn find_active_voice_sessions(
        &self,
    ) -> BoxFuture<'static, StorageResult<Vec<VoiceSessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let sessions = store
                .inner
                .voice_sessions
                .iter()
                .filter(|session| session.active)
                .map(|session| session.clone())
                .collect();
            Ok(sessions)
        })
    }

    fn find_game_aggregate(
        &self,
        game_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<GameAggregateEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            Ok(store
                .inner
                .game_aggregates
                .get(&game_id)
                .map(|aggregate| aggregate.clone()))
        })
    }

    fn insert_game_aggregate(
        &self,
        aggregate: GameAggregateEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .inner
                .game_aggregates
                .insert(aggregate.game_id.clone(), aggregate);
            Ok(())
        })
    }

    fn apply_game_delta(
        &self,
        game_id: String,
        delta: GameAggregateDelta,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            match store.inner.game_aggregates.get_mut(&game_id) {
                Some(mut aggregate) => {
                    apply_game_delta_to(&mut aggregate, &delta);
                    Ok(true)
                }
                None => Ok(false),
            }
        })
    }

    fn top_game_aggregates(
        &self,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<GameAggregateEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            let mut aggregates: Vec<GameAggregateEntity> = store
                .inner
                .game_aggregates
                .iter()
                .map(|aggregate| aggregate.clone())
                .collect();
            aggregates.sort_by(|a, b| {
                b.total_sessions
                    .cmp(&a.total_sessions)
                    .then_with(|| b.total_minutes.cmp(&a.total_minutes))
                    .then_with(|| a.game_id.cmp(&b.game_id))
            });
            aggregates.truncate(limit);
            Ok(aggregates)
        })
    }

    fn count_game_aggregates(&self) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move { Ok(store.inner.game_aggregates.len() as u64) })
    }

    fn sum_game_counters(&self) -> BoxFuture<'static, StorageResult<GameCounterTotals>> {
        let store = self.clone();
        Box::pin(async move {
            let mut totals = GameCounterTotals::default();
            for aggregate in store.inner.game_aggregates.iter() {
                totals.total_sessions =
                    totals.total_sessions.saturating_add(aggregate.total_sessions);
                totals.total_minutes =
                    totals.total_minutes.saturating_add(aggregate.total_minutes);
            }
            Ok(totals)
        })
    }

    fn delete_stale_game_aggregates(
        &self,
        idle_since: SystemTime,
        min_sessions: u64,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            let before = store.inner.game_aggregates.len();
            store.inner.game_aggregates.retain(|_, aggregate| {
                !(aggregate.last_seen < idle_since && aggregate.total_sessions < min_sessions)
            });
            Ok((before - store.inner.game_aggregates.len()) as u64)
        })
    }

    fn reset_daily_buckets(
        &self,
        day_start: SystemTime,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            let mut rolled = 0;
            for mut aggregate in store.inner.game_aggregates.iter_mut() {
                if aggregate.bucket_day < day_start {
                    aggregate.daily_sessions = 0;
                    aggregate.daily_minutes = 0;
                    aggregate.bucket_day = day_start;
                    rolled += 1;
                }
            }
            Ok(rolled)
        })
    }

    fn append_event(&self, event: ActivityEventEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store.inner.events.insert(event.id, event);
            Ok(())
        })
    }

    fn count_events(&self, filter: EventFilter) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            let matching = store
                .inner
                .events
                .iter()
                .filter(|entry| filter.matches(entry))
                .count();
            Ok(matching as u64)
        })
    }

    fn save_snapshot(
        &self,
        snapshot: ServerStatsSnapshot,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            let mut guard = store.inner.snapshot.write().await;
            *guard = Some(snapshot);
            Ok(())
        })
    }

    fn load_snapshot(&self) -> BoxFuture<'static, StorageResult<Option<ServerStatsSnapshot>>> {
        let store = self.clone();
        Box::pin(async move {
            let guard = store.inner.snapshot.read().await;
            Ok(guard.clone())
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async move { Ok(()) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        Box::pin(async move { Ok(()) })
    }
}
