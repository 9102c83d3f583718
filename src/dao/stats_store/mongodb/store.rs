use std::{sync::Arc, time::SystemTime};

use futures::{TryStreamExt, future::BoxFuture};
use mongodb::{
    Client, Collection, Database, IndexModel,
    bson::{self, DateTime, Document, doc},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoCounterTotalsRow, MongoEventDocument, MongoGameAggregateDocument,
        MongoGameTotalsRow, MongoSnapshotDocument, MongoUserDocument, MongoVoiceSessionDocument,
        doc_id,
    },
};
use crate::dao::{
    models::{
        ActivityEventEntity, ActivityWeights, CounterTotals, EventFilter, GameAggregateDelta,
        GameAggregateEntity, GameCounterTotals, ServerStatsSnapshot, UserCounterDelta,
        UserStatsEntity, VoiceSessionEntity,
    },
    stats_store::StatsStore,
    storage::StorageResult,
};

const USER_COLLECTION: &str = "user_stats";
const VOICE_COLLECTION: &str = "voice_sessions";
const GAME_COLLECTION: &str = "game_aggregates";
const EVENT_COLLECTION: &str = "activity_events";
const SNAPSHOT_COLLECTION: &str = "server_stats";
const SNAPSHOT_ID: &str = "current";

const COUNTER_FIELDS: [&str; 4] = [
    "messages_sent",
    "voice_minutes",
    "games_played",
    "events_attended",
];

/// MongoDB-backed [`StatsStore`].
#[derive(Clone)]
pub struct MongoStatsStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    state: RwLock<MongoState>,
    config: MongoConfig,
}

struct MongoState {
    client: Client,
    database: Database,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = {
            let guard = self.state.read().await;
            guard.database.clone()
        };

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        let mut guard = self.state.write().await;
        guard.client = client;
        guard.database = database;
        Ok(())
    }
}

impl MongoStatsStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            state: RwLock::new(MongoState { client, database }),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        let database = self.database().await;

        let indexes: [(&str, &str, Document); 5] = [
            (USER_COLLECTION, "user_last_seen_idx", doc! {"last_seen": 1}),
            (VOICE_COLLECTION, "voice_active_idx", doc! {"active": 1}),
            (
                EVENT_COLLECTION,
                "event_user_time_idx",
                doc! {"user_id": 1, "recorded_at": -1},
            ),
            (
                EVENT_COLLECTION,
                "event_type_time_idx",
                doc! {"event.type": 1, "recorded_at": -1},
            ),
            (
                GAME_COLLECTION,
                "game_leaderboard_idx",
                doc! {"total_sessions": -1, "total_minutes": -1},
            ),
        ];

        for (collection_name, index_name, keys) in indexes {
            let collection = database.collection::<Document>(collection_name);
            let index = IndexModel::builder()
                .keys(keys)
                .options(
                    IndexOptions::builder()
                        .name(Some(index_name.to_owned()))
                        .build(),
                )
                .build();

            collection
                .create_index(index)
                .await
                .map_err(|source| MongoDaoError::EnsureIndex {
                    collection: collection_name,
                    index: index_name,
                    source,
                })?;
        }

        Ok(())
    }

    async fn database(&self) -> Database {
        let guard = self.inner.state.read().await;
        guard.database.clone()
    }

    async fn user_collection(&self) -> Collection<MongoUserDocument> {
        self.database().await.collection(USER_COLLECTION)
    }

    async fn voice_collection(&self) -> Collection<MongoVoiceSessionDocument> {
        self.database().await.collection(VOICE_COLLECTION)
    }

    async fn game_collection(&self) -> Collection<MongoGameAggregateDocument> {
        self.database().await.collection(GAME_COLLECTION)
    }

    async fn event_collection(&self) -> Collection<MongoEventDocument> {
        self.database().await.collection(EVENT_COLLECTION)
    }

    async fn snapshot_collection(&self) -> Collection<MongoSnapshotDocument> {
        self.database().await.collection(SNAPSHOT_COLLECTION)
    }

    async fn apply_user_delta(&self, user_id: String, delta: UserCounterDelta) -> MongoResult<()> {
        if delta.is_empty() {
            return Ok(());
        }

        let mut inc = doc! {};
        if delta.messages_sent > 0 {
            inc.insert("messages_sent", delta.messages_sent as i64);
        }
        if delta.voice_minutes > 0 {
            inc.insert("voice_minutes", delta.voice_minutes as i64);
        }
        if delta.games_played > 0 {
            inc.insert("games_played", delta.games_played as i64);
        }
        if delta.events_attended > 0 {
            inc.insert("events_attended", delta.events_attended as i64);
        }

        let mut update = doc! {};
        if !inc.is_empty() {
            update.insert("$inc", inc);
        }
        match delta.touch_last_seen {
            Some(at) => {
                update.insert("$set", doc! {"last_seen": DateTime::from_system_time(at)});
            }
            // Backfill must not disturb live last-seen tracking.
            None => {
                update.insert("$setOnInsert", doc! {"last_seen": DateTime::from_millis(0)});
            }
        }

        let collection = self.user_collection().await;
        collection
            .update_one(doc! {"_id": &user_id}, update)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::ApplyUserDelta { user_id, source })?;
        Ok(())
    }

    async fn find_user(&self, user_id: String) -> MongoResult<Option<UserStatsEntity>> {
        let collection = self.user_collection().await;
        let document = collection
            .find_one(doc! {"_id": &user_id})
            .await
            .map_err(|source| MongoDaoError::LoadUser { user_id, source })?;
        Ok(document.map(Into::into))
    }

    async fn count_users(&self) -> MongoResult<u64> {
        let collection = self.user_collection().await;
        collection
            .count_documents(doc! {})
            .await
            .map_err(|source| MongoDaoError::CountUsers { source })
    }

    async fn count_users_active_since(&self, since: SystemTime) -> MongoResult<u64> {
        let collection = self.user_collection().await;
        collection
            .count_documents(doc! {"last_seen": {"$gte": DateTime::from_system_time(since)}})
            .await
            .map_err(|source| MongoDaoError::CountUsers { source })
    }

    async fn sum_user_counters(&self) -> MongoResult<CounterTotals> {
        let pipeline = vec![doc! {"$group": {
            "_id": null,
            "messages_sent": {"$sum": {"$ifNull": ["$messages_sent", 0]}},
            "voice_minutes": {"$sum": {"$ifNull": ["$voice_minutes", 0]}},
            "games_played": {"$sum": {"$ifNull": ["$games_played", 0]}},
            "events_attended": {"$sum": {"$ifNull": ["$events_attended", 0]}},
        }}];

        let collection = self.user_collection().await;
        let mut cursor = collection
            .aggregate(pipeline)
            .await
            .map_err(|source| MongoDaoError::SumUserCounters { source })?;

        match cursor
            .try_next()
            .await
            .map_err(|source| MongoDaoError::SumUserCounters { source })?
        {
            Some(row) => {
                let row: MongoCounterTotalsRow = bson::deserialize_from_document(row).map_err(
                    |source| MongoDaoError::Decode {
                        collection: USER_COLLECTION,
                        source,
                    },
                )?;
                Ok(row.into())
            }
            None => Ok(CounterTotals::default()),
        }
    }

    async fn top_users_by_activity(
        &self,
        weights: ActivityWeights,
        limit: usize,
    ) -> MongoResult<Vec<UserStatsEntity>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let pipeline = vec![
            doc! {"$addFields": {"activity_score": {"$add": [
                {"$multiply": [weights.message as i64, {"$ifNull": ["$messages_sent", 0]}]},
                {"$multiply": [weights.voice as i64, {"$ifNull": ["$voice_minutes", 0]}]},
                {"$multiply": [weights.gaming as i64, {"$ifNull": ["$games_played", 0]}]},
            ]}}},
            doc! {"$sort": {"activity_score": -1, "_id": 1}},
            doc! {"$limit": limit as i64},
        ];

        let collection = self.user_collection().await;
        let mut cursor = collection
            .aggregate(pipeline)
            .await
            .map_err(|source| MongoDaoError::RankUsers { source })?;

        let mut users = Vec::new();
        while let Some(row) = cursor
            .try_next()
            .await
            .map_err(|source| MongoDaoError::RankUsers { source })?
        {
            let document: MongoUserDocument = bson::deserialize_from_document(row).map_err(
                |source| MongoDaoError::Decode {
                    collection: USER_COLLECTION,
                    source,
                },
            )?;
            users.push(document.into());
        }
        Ok(users)
    }

    async fn repair_counter_fields(&self) -> MongoResult<u64> {
        let collection = self.user_collection().await;
        let mut repaired = 0;

        for field in COUNTER_FIELDS {
            // `$not` also matches documents missing the field entirely.
            let mut broken = Document::new();
            broken.insert(field, doc! {"$not": {"$type": "number"}});
            let mut zeroed = Document::new();
            zeroed.insert(field, 0_i64);

            let result = collection
                .update_many(broken, doc! {"$set": zeroed})
                .await
                .map_err(|source| MongoDaoError::RepairCounters { field, source })?;
            repaired += result.modified_count;
        }

        Ok(repaired)
    }

    async fn insert_voice_session(&self, session: VoiceSessionEntity) -> MongoResult<()> {
        let id = session.id;
        let document: MongoVoiceSessionDocument = session.into();
        let collection = self.voice_collection().await;
        collection
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::SaveVoiceSession { id, source })?;
        Ok(())
    }

    async fn delete_voice_session(&self, id: Uuid) -> MongoResult<bool> {
        let collection = self.voice_collection().await;
        let result = collection
            .delete_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::DeleteVoiceSession { id, source })?;
        Ok(result.deleted_count > 0)
    }

    async fn find_active_voice_sessions(&self) -> MongoResult<Vec<VoiceSessionEntity>> {
        let collection = self.voice_collection().await;
        let documents: Vec<MongoVoiceSessionDocument> = collection
            .find(doc! {"active": true})
            .await
            .map_err(|source| MongoDaoError::ListVoiceSessions { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::ListVoiceSessions { source })?;
        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn find_game_aggregate(
        &self,
        game_id: String,
    ) -> MongoResult<Option<GameAggregateEntity>> {
        let collection = self.game_collection().await;
        let document = collection
            .find_one(doc! {"_id": &game_id})
            .await
            .map_err(|source| MongoDaoError::LoadGameAggregate { game_id, source })?;
        Ok(document.map(Into::into))
    }

    async fn insert_game_aggregate(&self, aggregate: GameAggregateEntity) -> MongoResult<()> {
        let game_id = aggregate.game_id.clone();
        let document: MongoGameAggregateDocument = aggregate.into();
        let collection = self.game_collection().await;
        collection
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::SaveGameAggregate { game_id, source })?;
        Ok(())
    }

    async fn apply_game_delta(
        &self,
        game_id: String,
        delta: GameAggregateDelta,
    ) -> MongoResult<bool> {
        let mut inc = doc! {};
        if delta.sessions > 0 {
            inc.insert("total_sessions", delta.sessions as i64);
        }
        if delta.minutes > 0 {
            inc.insert("total_minutes", delta.minutes as i64);
        }
        if delta.daily_sessions > 0 {
            inc.insert("daily_sessions", delta.daily_sessions as i64);
        }
        if delta.daily_minutes > 0 {
            inc.insert("daily_minutes", delta.daily_minutes as i64);
        }
        if delta.unique_players > 0 {
            inc.insert("unique_players", delta.unique_players as i64);
        }

        let mut set = doc! {};
        if let Some(day) = delta.reset_daily {
            set.insert("daily_sessions", 0_i64);
            set.insert("daily_minutes", 0_i64);
            set.insert("bucket_day", DateTime::from_system_time(day));
        }
        if let Some(count) = delta.set_player_count {
            set.insert("current_player_count", count as i64);
        }
        if let Some(average) = delta.set_average_minutes {
            set.insert("average_session_minutes", average);
        }
        if let Some(score) = delta.set_popularity {
            set.insert("popularity_score", score);
        }
        if let Some(at) = delta.set_last_seen {
            set.insert("last_seen", DateTime::from_system_time(at));
        }

        let mut update = doc! {};
        if !inc.is_empty() {
            update.insert("$inc", inc);
        }
        if !set.is_empty() {
            update.insert("$set", set);
        }
        if let Some(player) = delta.add_player {
            update.insert("$addToSet", doc! {"current_players": player});
        }
        if let Some(player) = delta.remove_player {
            update.insert("$pull", doc! {"current_players": player});
        }

        let collection = self.game_collection().await;
        if update.is_empty() {
            let existing = collection
                .count_documents(doc! {"_id": &game_id})
                .await
                .map_err(|source| MongoDaoError::ApplyGameDelta { game_id, source })?;
            return Ok(existing > 0);
        }

        let result = collection
            .update_one(doc! {"_id": &game_id}, update)
            .await
            .map_err(|source| MongoDaoError::ApplyGameDelta { game_id, source })?;
        Ok(result.matched_count > 0)
    }

    async fn top_game_aggregates(&self, limit: usize) -> MongoResult<Vec<GameAggregateEntity>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let collection = self.game_collection().await;
        let documents: Vec<MongoGameAggregateDocument> = collection
            .find(doc! {})
            .sort(doc! {"total_sessions": -1, "total_minutes": -1, "_id": 1})
            .limit(limit as i64)
            .await
            .map_err(|source| MongoDaoError::RankGames { source })?
            .try_collect()
            .await
            .map_err(|source| MongoDaoError::RankGames { source })?;
        Ok(documents.into_iter().map(Into::into).collect())
    }

    async fn count_game_aggregates(&self) -> MongoResult<u64> {
        let collection = self.game_collection().await;
        collection
            .count_documents(doc! {})
            .await
            .map_err(|source| MongoDaoError::CountGames { source })
    }

    async fn sum_game_counters(&self) -> MongoResult<GameCounterTotals> {
        let pipeline = vec![doc! {"$group": {
            "_id": null,
            "total_sessions": {"$sum": {"$ifNull": ["$total_sessions", 0]}},
            "total_minutes": {"$sum": {"$ifNull": ["$total_minutes", 0]}},
        }}];

        let collection = self.game_collection().await;
        let mut cursor = collection
            .aggregate(pipeline)
            .await
            .map_err(|source| MongoDaoError::SumGameCounters { source })?;

        match cursor
            .try_next()
            .await
            .map_err(|source| MongoDaoError::SumGameCounters { source })?
        {
            Some(row) => {
                let row: MongoGameTotalsRow = bson::deserialize_from_document(row).map_err(
                    |source| MongoDaoError::Decode {
                        collection: GAME_COLLECTION,
                        source,
                    },
                )?;
                Ok(row.into())
            }
            None => Ok(GameCounterTotals::default()),
        }
    }

    async fn delete_stale_game_aggregates(
        &self,
        idle_since: SystemTime,
        min_sessions: u64,
    ) -> MongoResult<u64> {
        let collection = self.game_collection().await;
        let result = collection
            .delete_many(doc! {
                "last_seen": {"$lt": DateTime::from_system_time(idle_since)},
                "total_sessions": {"$lt": min_sessions as i64},
            })
            .await
            .map_err(|source| MongoDaoError::PruneGameAggregates { source })?;
        Ok(result.deleted_count)
    }

    async fn reset_daily_buckets(&self, day_start: SystemTime) -> MongoResult<u64> {
        let day = DateTime::from_system_time(day_start);
        let collection = self.game_collection().await;
        let result = collection
            .update_many(
                doc! {"bucket_day": {"$lt": day}},
                doc! {"$set": {"daily_sessions": 0_i64, "daily_minutes": 0_i64, "bucket_day": day}},
            )
            .await
            .map_err(|source| MongoDaoError::RollDailyBuckets { source })?;
        Ok(result.modified_count)
    }

    async fn append_event(&self, event: ActivityEventEntity) -> MongoResult<()> {
        let id = event.id;
        let document: MongoEventDocument = event.into();
        let collection = self.event_collection().await;
        collection
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::AppendEvent { id, source })?;
        Ok(())
    }

    async fn count_events(&self, filter: EventFilter) -> MongoResult<u64> {
        let mut query = doc! {};
        if let Some(user_id) = filter.user_id {
            query.insert("user_id", user_id);
        }
        if let Some(kind) = filter.kind {
            query.insert("event.type", kind);
        }
        if let Some(game_id) = filter.started_game_id {
            query.insert(
                "$or",
                vec![
                    doc! {"event.type": "game_start", "event.game_id": &game_id},
                    doc! {"event.type": "game_switch", "event.to_game": &game_id},
                ],
            );
        }
        if let Some(since) = filter.since {
            query.insert(
                "recorded_at",
                doc! {"$gte": DateTime::from_system_time(since)},
            );
        }

        let collection = self.event_collection().await;
        collection
            .count_documents(query)
            .await
            .map_err(|source| MongoDaoError::CountEvents { source })
    }

    async fn save_snapshot(&self, snapshot: ServerStatsSnapshot) -> MongoResult<()> {
        let document = MongoSnapshotDocument::singleton(snapshot, SNAPSHOT_ID);
        let collection = self.snapshot_collection().await;
        collection
            .replace_one(doc! {"_id": SNAPSHOT_ID}, &document)
            .upsert(true)
            .await
            .map_err(|source| MongoDaoError::SaveSnapshot { source })?;
        Ok(())
    }

    async fn load_snapshot(&self) -> MongoResult<Option<ServerStatsSnapshot>> {
        let collection = self.snapshot_collection().await;
        let document = collection
            .find_one(doc! {"_id": SNAPSHOT_ID})
            .await
            .map_err(|source| MongoDaoError::LoadSnapshot { source })?;
        Ok(document.map(Into::into))
    }
}

impl StatsStore for MongoStatsStore {
    fn apply_user_delta(
        &self,
        user_id: String,
        delta: UserCounterDelta,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.apply_user_delta(user_id, delta).await.map_err(Into::into) })
    }

    fn find_user(
        &self,
        user_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<UserStatsEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_user(user_id).await.map_err(Into::into) })
    }

    fn count_users(&self) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move { store.count_users().await.map_err(Into::into) })
    }

    fn count_users_active_since(
        &self,
        since: SystemTime,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .count_users_active_since(since)
                .await
                .map_err(Into::into)
        })
    }

    fn sum_user_counters(&self) -> BoxFuture<'static, StorageResult<CounterTotals>> {
        let store = self.clone();
        Box::pin(async move { store.sum_user_counters().await.map_err(Into::into) })
    }

    fn top_users_by_activity(
        &self,
        weights: ActivityWeights,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<UserStatsEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .top_users_by_activity(weights, limit)
                .await
                .map_err(Into::into)
        })
    }

    fn repair_counter_fields(&self) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move { store.repair_counter_fields().await.map_err(Into::into) })
    }

    fn insert_voice_session(
        &self,
        session: VoiceSessionEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.insert_voice_session(session).await.map_err(Into::into) })
    }

    fn delete_voice_session(&self, id: Uuid) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.delete_voice_session(id).await.map_err(Into::into) })
    }

    fn find_active_voice_sessions(
        &self,
    ) -> BoxFuture<'static, StorageResult<Vec<VoiceSessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_active_voice_sessions().await.map_err(Into::into) })
    }

    fn find_game_aggregate(
        &self,
        game_id: String,
    ) -> BoxFuture<'static, StorageResult<Option<GameAggregateEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.find_game_aggregate(game_id).await.map_err(Into::into) })
    }

    fn insert_game_aggregate(
        &self,
        aggregate: GameAggregateEntity,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .insert_game_aggregate(aggregate)
                .await
                .map_err(Into::into)
        })
    }

    fn apply_game_delta(
        &self,
        game_id: String,
        delta: GameAggregateDelta,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .apply_game_delta(game_id, delta)
                .await
                .map_err(Into::into)
        })
    }

    fn top_game_aggregates(
        &self,
        limit: usize,
    ) -> BoxFuture<'static, StorageResult<Vec<GameAggregateEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.top_game_aggregates(limit).await.map_err(Into::into) })
    }

    fn count_game_aggregates(&self) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move { store.count_game_aggregates().await.map_err(Into::into) })
    }

    fn sum_game_counters(&self) -> BoxFuture<'static, StorageResult<GameCounterTotals>> {
        let store = self.clone();
        Box::pin(async move { store.sum_game_counters().await.map_err(Into::into) })
    }

    fn delete_stale_game_aggregates(
        &self,
        idle_since: SystemTime,
        min_sessions: u64,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .delete_stale_game_aggregates(idle_since, min_sessions)
                .await
                .map_err(Into::into)
        })
    }

    fn reset_daily_buckets(
        &self,
        day_start: SystemTime,
    ) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move { store.reset_daily_buckets(day_start).await.map_err(Into::into) })
    }

    fn append_event(&self, event: ActivityEventEntity) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.append_event(event).await.map_err(Into::into) })
    }

    fn count_events(&self, filter: EventFilter) -> BoxFuture<'static, StorageResult<u64>> {
        let store = self.clone();
        Box::pin(async move { store.count_events(filter).await.map_err(Into::into) })
    }

    fn save_snapshot(
        &self,
        snapshot: ServerStatsSnapshot,
    ) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.save_snapshot(snapshot).await.map_err(Into::into) })
    }

    fn load_snapshot(&self) -> BoxFuture<'static, StorageResult<Option<ServerStatsSnapshot>>> {
        let store = self.clone();
        Box::pin(async move { store.load_snapshot().await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
