use mongodb::bson::{Binary, DateTime, Document, doc, spec::BinarySubtype};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::dao::models::{
    ActivityEventEntity, ActivityKind, CommunicationTotals, CommunityTotals, CounterTotals,
    GameAggregateEntity, GameCategory, GameCounterTotals, GameLeader, GamingTotals, MemberLeader,
    ServerStatsSnapshot, UserStatsEntity, VoiceSessionEntity,
};

fn default_last_seen() -> DateTime {
    DateTime::from_millis(0)
}

fn clamp(value: i64) -> u64 {
    value.max(0) as u64
}

/// Member stats record as stored in the `user_stats` collection.
///
/// Counters default so that documents written by older deployments still
/// decode; the repair pass rewrites them to real numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoUserDocument {
    #[serde(rename = "_id")]
    user_id: String,
    #[serde(default)]
    messages_sent: i64,
    #[serde(default)]
    voice_minutes: i64,
    #[serde(default)]
    games_played: i64,
    #[serde(default)]
    events_attended: i64,
    #[serde(default = "default_last_seen")]
    last_seen: DateTime,
}

impl From<MongoUserDocument> for UserStatsEntity {
    fn from(value: MongoUserDocument) -> Self {
        Self {
            user_id: value.user_id,
            messages_sent: clamp(value.messages_sent),
            voice_minutes: clamp(value.voice_minutes),
            games_played: clamp(value.games_played),
            events_attended: clamp(value.events_attended),
            last_seen: value.last_seen.to_system_time(),
        }
    }
}

/// Aggregated counter row produced by the `$group` totals pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct MongoCounterTotalsRow {
    #[serde(default)]
    messages_sent: i64,
    #[serde(default)]
    voice_minutes: i64,
    #[serde(default)]
    games_played: i64,
    #[serde(default)]
    events_attended: i64,
}

impl From<MongoCounterTotalsRow> for CounterTotals {
    fn from(value: MongoCounterTotalsRow) -> Self {
        Self {
            messages_sent: clamp(value.messages_sent),
            voice_minutes: clamp(value.voice_minutes),
            games_played: clamp(value.games_played),
            events_attended: clamp(value.events_attended),
        }
    }
}

/// Open voice connection as stored in the `voice_sessions` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoVoiceSessionDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    user_id: String,
    guild_id: String,
    channel_id: String,
    started_at: DateTime,
    active: bool,
}

impl From<VoiceSessionEntity> for MongoVoiceSessionDocument {
    fn from(value: VoiceSessionEntity) -> Self {
        Self {
            id: value.id,
            user_id: value.user_id,
            guild_id: value.guild_id,
            channel_id: value.channel_id,
            started_at: DateTime::from_system_time(value.started_at),
            active: value.active,
        }
    }
}

impl From<MongoVoiceSessionDocument> for VoiceSessionEntity {
    fn from(value: MongoVoiceSessionDocument) -> Self {
        Self {
            id: value.id,
            user_id: value.user_id,
            guild_id: value.guild_id,
            channel_id: value.channel_id,
            started_at: value.started_at.to_system_time(),
            active: value.active,
        }
    }
}

/// Game aggregate as stored in the `game_aggregates` collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoGameAggregateDocument {
    #[serde(rename = "_id")]
    game_id: String,
    display_name: String,
    category: GameCategory,
    #[serde(default)]
    total_sessions: i64,
    #[serde(default)]
    total_minutes: i64,
    #[serde(default)]
    unique_players: i64,
    #[serde(default)]
    daily_sessions: i64,
    #[serde(default)]
    daily_minutes: i64,
    bucket_day: DateTime,
    #[serde(default)]
    average_session_minutes: f64,
    #[serde(default)]
    current_players: Vec<String>,
    #[serde(default)]
    current_player_count: i64,
    #[serde(default)]
    popularity_score: i64,
    first_seen: DateTime,
    last_seen: DateTime,
}

impl From<GameAggregateEntity> for MongoGameAggregateDocument {
    fn from(value: GameAggregateEntity) -> Self {
        Self {
            game_id: value.game_id,
            display_name: value.display_name,
            category: value.category,
            total_sessions: value.total_sessions as i64,
            total_minutes: value.total_minutes as i64,
            unique_players: value.unique_players as i64,
            daily_sessions: value.daily_sessions as i64,
            daily_minutes: value.daily_minutes as i64,
            bucket_day: DateTime::from_system_time(value.bucket_day),
            average_session_minutes: value.average_session_minutes,
            current_players: value.current_players,
            current_player_count: value.current_player_count as i64,
            popularity_score: value.popularity_score,
            first_seen: DateTime::from_system_time(value.first_seen),
            last_seen: DateTime::from_system_time(value.last_seen),
        }
    }
}

impl From<MongoGameAggregateDocument> for GameAggregateEntity {
    fn from(value: MongoGameAggregateDocument) -> Self {
        Self {
            game_id: value.game_id,
            display_name: value.display_name,
            category: value.category,
            total_sessions: clamp(value.total_sessions),
            total_minutes: clamp(value.total_minutes),
            unique_players: clamp(value.unique_players),
            daily_sessions: clamp(value.daily_sessions),
            daily_minutes: clamp(value.daily_minutes),
            bucket_day: value.bucket_day.to_system_time(),
            average_session_minutes: value.average_session_minutes,
            current_players: value.current_players,
            current_player_count: clamp(value.current_player_count),
            popularity_score: value.popularity_score,
            first_seen: value.first_seen.to_system_time(),
            last_seen: value.last_seen.to_system_time(),
        }
    }
}

/// Aggregated game counter row produced by the `$group` totals pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct MongoGameTotalsRow {
    #[serde(default)]
    total_sessions: i64,
    #[serde(default)]
    total_minutes: i64,
}

impl From<MongoGameTotalsRow> for GameCounterTotals {
    fn from(value: MongoGameTotalsRow) -> Self {
        Self {
            total_sessions: clamp(value.total_sessions),
            total_minutes: clamp(value.total_minutes),
        }
    }
}

/// Activity log entry as stored in the `activity_events` collection.
///
/// The payload keeps its serde shape so filters can match on `event.type`
/// and the game fields inside it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoEventDocument {
    #[serde(rename = "_id")]
    id: Uuid,
    user_id: String,
    event: ActivityKind,
    recorded_at: DateTime,
}

impl From<ActivityEventEntity> for MongoEventDocument {
    fn from(value: ActivityEventEntity) -> Self {
        Self {
            id: value.id,
            user_id: value.user_id,
            event: value.event,
            recorded_at: DateTime::from_system_time(value.recorded_at),
        }
    }
}

impl From<MongoEventDocument> for ActivityEventEntity {
    fn from(value: MongoEventDocument) -> Self {
        Self {
            id: value.id,
            user_id: value.user_id,
            event: value.event,
            recorded_at: value.recorded_at.to_system_time(),
        }
    }
}

/// Materialized snapshot as stored in the singleton `server_stats` document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoSnapshotDocument {
    #[serde(rename = "_id")]
    id: String,
    community: CommunityTotals,
    gaming: GamingTotals,
    communication: CommunicationTotals,
    events_attended: i64,
    top_members: Vec<MemberLeader>,
    top_games: Vec<GameLeader>,
    generated_at: DateTime,
}

impl MongoSnapshotDocument {
    pub fn singleton(snapshot: ServerStatsSnapshot, id: &str) -> Self {
        Self {
            id: id.to_owned(),
            community: snapshot.community,
            gaming: snapshot.gaming,
            communication: snapshot.communication,
            events_attended: snapshot.events_attended as i64,
            top_members: snapshot.top_members,
            top_games: snapshot.top_games,
            generated_at: DateTime::from_system_time(snapshot.generated_at),
        }
    }
}

impl From<MongoSnapshotDocument> for ServerStatsSnapshot {
    fn from(value: MongoSnapshotDocument) -> Self {
        Self {
            community: value.community,
            gaming: value.gaming,
            communication: value.communication,
            events_attended: clamp(value.events_attended),
            top_members: value.top_members,
            top_games: value.top_games,
            generated_at: value.generated_at.to_system_time(),
        }
    }
}

fn uuid_as_binary(id: Uuid) -> Binary {
    Binary {
        subtype: BinarySubtype::Uuid,
        bytes: id.into_bytes().to_vec(),
    }
}

pub fn doc_id(id: Uuid) -> Document {
    doc! {"_id": uuid_as_binary(id)}
}
