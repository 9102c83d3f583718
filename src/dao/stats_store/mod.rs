pub mod memory;
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use std::time::SystemTime;

use crate::dao::models::{
    ActivityEventEntity, ActivityWeights, CounterTotals, EventFilter, GameAggregateDelta,
    GameAggregateEntity, GameCounterTotals, ServerStatsSnapshot, UserCounterDelta,
    UserStatsEntity, VoiceSessionEntity,
};
use crate::dao::storage::StorageResult;
use futures::future::BoxFuture;
use uuid::Uuid;

/// Abstraction over the persistence layer for member stats, sessions,
/// game aggregates, the activity log, and the materialized snapshot.
///
/// Counter writes are expressed as deltas so every backend can apply them
/// atomically; no method reads a counter in order to write it back.
pub trait StatsStore: Send + Sync {
    /// Apply an additive counter delta, creating the member record if absent.
    fn apply_user_delta(
        &self,
        user_id: String,
        delta: UserCounterDelta,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Load one member record.
    fn find_user(&self, user_id: String) -> BoxFuture<'static, StorageResult<Option<UserStatsEntity>>>;
    /// Number of members with a stats record.
    fn count_users(&self) -> BoxFuture<'static, StorageResult<u64>>;
    /// Number of members seen at or after the given instant.
    fn count_users_active_since(&self, since: SystemTime)
    -> BoxFuture<'static, StorageResult<u64>>;
    /// Sum every member's counters.
    fn sum_user_counters(&self) -> BoxFuture<'static, StorageResult<CounterTotals>>;
    /// Members ranked by weighted activity score, highest first.
    fn top_users_by_activity(
        &self,
        weights: ActivityWeights,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<UserStatsEntity>>>;
    /// Reset counter fields that are missing or hold a non-numeric value,
    /// returning how many records were repaired.
    fn repair_counter_fields(&self) -> BoxFuture<'static, StorageResult<u64>>;

    /// Persist a freshly opened voice session row.
    fn insert_voice_session(
        &self,
        session: VoiceSessionEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Delete a voice session row, returning whether it existed.
    fn delete_voice_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>>;
    /// All voice session rows still marked active.
    fn find_active_voice_sessions(
        &self,
    ) -> BoxFuture<'static, StorageResult<Vec<VoiceSessionEntity>>>;

    /// Load one game aggregate.
    fn find_game_aggregate(
        &self,
        game_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<GameAggregateEntity>>>;
    /// Persist a fresh game aggregate.
    fn insert_game_aggregate(
        &self,
        aggregate: GameAggregateEntity,
    ) -> BoxFuture<'static, StorageResult<()>>;
    /// Apply an additive delta to an existing game aggregate, returning
    /// whether the aggregate was found.
    fn apply_game_delta(
        &self,
        game_id: String,
        delta: GameAggregateDelta,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Game aggregates ranked by sessions, then minutes, highest first.
    fn top_game_aggregates(
        &self,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<GameAggregateEntity>>>;
    /// Number of distinct game aggregates.
    fn count_game_aggregates(&self) -> BoxFuture<'static, StorageResult<u64>>;
    /// Sum lifetime counters across all game aggregates.
    fn sum_game_counters(&self) -> BoxFuture<'static, StorageResult<GameCounterTotals>>;
    /// Delete aggregates idle since the given instant that never crossed the
    /// session floor, returning how many were removed.
    fn delete_stale_game_aggregates(
        &self,
        idle_since: SystemTime,
        min_sessions: u64,
    ) -> BoxFuture<'static, StorageResult<u64>>;
    /// Zero daily buckets whose day is older than the given day start,
    /// returning how many aggregates rolled over.
    fn reset_daily_buckets(&self, day_start: SystemTime)
    -> BoxFuture<'static, StorageResult<u64>>;

    /// Append one entry to the activity log.
    fn append_event(&self, event: ActivityEventEntity) -> BoxFuture<'static, StorageResult<()>>;
    /// Count activity log entries matching the filter.
    fn count_events(&self, filter: EventFilter) -> BoxFuture<'static, StorageResult<u64>>;

    /// Replace the persisted server stats snapshot.
    fn save_snapshot(&self, snapshot: ServerStatsSnapshot)
    -> BoxFuture<'static, StorageResult<()>>;
    /// Load the persisted server stats snapshot, if one was ever saved.
    fn load_snapshot(&self) -> BoxFuture<'static, StorageResult<Option<ServerStatsSnapshot>>>;

    /// Cheap connectivity probe.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Attempt to re-establish a lost backend connection.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
