use mongodb::error::Error as MongoError;
use thiserror::Error;
use uuid::Uuid;

pub type MongoResult<T> = std::result::Result<T, MongoDaoError>;

/// Failure raised by the MongoDB stats backend, one variant per operation so
/// logs name what was being attempted.
#[derive(Debug, Error)]
pub enum MongoDaoError {
    #[error("failed to parse MongoDB connection URI `{uri}`")]
    InvalidUri {
        uri: String,
        #[source]
        source: MongoError,
    },
    #[error("missing environment variable `{var}`")]
    MissingEnvVar { var: &'static str },
    #[error("failed to build MongoDB client from options")]
    ClientConstruction {
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping failed during initial connection after {attempts} attempt(s)")]
    InitialPing {
        attempts: u32,
        #[source]
        source: MongoError,
    },
    #[error("MongoDB ping health check failed")]
    HealthPing {
        #[source]
        source: MongoError,
    },
    #[error("failed to ensure index `{index}` on collection `{collection}`")]
    EnsureIndex {
        collection: &'static str,
        index: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to apply counter delta for member `{user_id}`")]
    ApplyUserDelta {
        user_id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to load stats record for member `{user_id}`")]
    LoadUser {
        user_id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to count member stats records")]
    CountUsers {
        #[source]
        source: MongoError,
    },
    #[error("failed to sum member counters")]
    SumUserCounters {
        #[source]
        source: MongoError,
    },
    #[error("failed to rank members by activity")]
    RankUsers {
        #[source]
        source: MongoError,
    },
    #[error("failed to repair counter field `{field}`")]
    RepairCounters {
        field: &'static str,
        #[source]
        source: MongoError,
    },
    #[error("failed to save voice session `{id}`")]
    SaveVoiceSession {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to delete voice session `{id}`")]
    DeleteVoiceSession {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to list active voice sessions")]
    ListVoiceSessions {
        #[source]
        source: MongoError,
    },
    #[error("failed to load game aggregate `{game_id}`")]
    LoadGameAggregate {
        game_id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to save game aggregate `{game_id}`")]
    SaveGameAggregate {
        game_id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to apply delta to game aggregate `{game_id}`")]
    ApplyGameDelta {
        game_id: String,
        #[source]
        source: MongoError,
    },
    #[error("failed to rank game aggregates")]
    RankGames {
        #[source]
        source: MongoError,
    },
    #[error("failed to count game aggregates")]
    CountGames {
        #[source]
        source: MongoError,
    },
    #[error("failed to sum game aggregate counters")]
    SumGameCounters {
        #[source]
        source: MongoError,
    },
    #[error("failed to prune stale game aggregates")]
    PruneGameAggregates {
        #[source]
        source: MongoError,
    },
    #[error("failed to roll daily game buckets")]
    RollDailyBuckets {
        #[source]
        source: MongoError,
    },
    #[error("failed to append activity event `{id}`")]
    AppendEvent {
        id: Uuid,
        #[source]
        source: MongoError,
    },
    #[error("failed to count activity events")]
    CountEvents {
        #[source]
        source: MongoError,
    },
    #[error("failed to save server stats snapshot")]
    SaveSnapshot {
        #[source]
        source: MongoError,
    },
    #[error("failed to load server stats snapshot")]
    LoadSnapshot {
        #[source]
        source: MongoError,
    },
    #[error("document in collection `{collection}` no longer decodes")]
    Decode {
        collection: &'static str,
        #[source]
        source: mongodb::bson::error::Error,
    },
}
