use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use uuid::Uuid;

/// Lifetime activity counters kept for a single community member.
///
/// Records are never deleted, even when the member leaves the server. Rows
/// created by historical backfill carry [`SystemTime::UNIX_EPOCH`] as
/// `last_seen` until the member is observed live for the first time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserStatsEntity {
    /// Stable identifier of the member.
    pub user_id: String,
    /// Total chat messages attributed to the member.
    pub messages_sent: u64,
    /// Total minutes spent connected to voice channels.
    pub voice_minutes: u64,
    /// Total completed game sessions.
    pub games_played: u64,
    /// Total scheduled events the member attended.
    pub events_attended: u64,
    /// Last time live tracking observed the member doing anything.
    pub last_seen: SystemTime,
}

impl UserStatsEntity {
    /// Fresh record with all counters at zero.
    pub fn new(user_id: String, last_seen: SystemTime) -> Self {
        Self {
            user_id,
            messages_sent: 0,
            voice_minutes: 0,
            games_played: 0,
            events_attended: 0,
            last_seen,
        }
    }
}

/// Additive mutation applied to a member's counters.
///
/// Every counter write in the engine goes through a delta so concurrent
/// writers never overwrite each other; absolute assignment is reserved for
/// `last_seen`, which only live tracking touches.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UserCounterDelta {
    /// Messages to add.
    pub messages_sent: u64,
    /// Voice minutes to add.
    pub voice_minutes: u64,
    /// Completed game sessions to add.
    pub games_played: u64,
    /// Attended events to add.
    pub events_attended: u64,
    /// When set, move `last_seen` to this instant.
    pub touch_last_seen: Option<SystemTime>,
}

impl UserCounterDelta {
    /// Delta that only refreshes `last_seen`.
    pub fn touch(now: SystemTime) -> Self {
        Self {
            touch_last_seen: Some(now),
            ..Self::default()
        }
    }

    /// Whether applying this delta would change nothing.
    pub fn is_empty(&self) -> bool {
        self.messages_sent == 0
            && self.voice_minutes == 0
            && self.games_played == 0
            && self.events_attended == 0
            && self.touch_last_seen.is_none()
    }
}

/// Sum of every member's counters, produced by the storage layer.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CounterTotals {
    /// Messages across all members.
    pub messages_sent: u64,
    /// Voice minutes across all members.
    pub voice_minutes: u64,
    /// Completed game sessions across all members.
    pub games_played: u64,
    /// Event attendances across all members.
    pub events_attended: u64,
}

/// Weights for the member activity score used by leaderboard queries.
///
/// Backends compute the same weighted sum server-side when ranking, so the
/// formula lives here next to the query contract.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivityWeights {
    /// Points per message sent.
    pub message: u64,
    /// Points per voice minute.
    pub voice: u64,
    /// Points per completed game session.
    pub gaming: u64,
}

impl ActivityWeights {
    /// Weighted activity score for one member.
    pub fn score(&self, user: &UserStatsEntity) -> u64 {
        self.message
            .saturating_mul(user.messages_sent)
            .saturating_add(self.voice.saturating_mul(user.voice_minutes))
            .saturating_add(self.gaming.saturating_mul(user.games_played))
    }
}

impl Default for ActivityWeights {
    fn default() -> Self {
        Self {
            message: 1,
            voice: 2,
            gaming: 3,
        }
    }
}

/// Persistent row for a voice connection that is currently open.
///
/// The row exists for exactly as long as the member stays connected; closing
/// the session credits the elapsed minutes and deletes the row. Rows that
/// survive a process crash are settled by recovery on the next start.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VoiceSessionEntity {
    /// Primary key of the session row.
    pub id: Uuid,
    /// Member connected to voice.
    pub user_id: String,
    /// Server the voice channel belongs to.
    pub guild_id: String,
    /// Channel the member is connected to.
    pub channel_id: String,
    /// Instant the connection was observed.
    pub started_at: SystemTime,
    /// Marks the row as an open session; kept for index-friendly queries.
    pub active: bool,
}

/// Coarse genre bucket assigned to a game from its display name.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GameCategory {
    /// Shooters and tactical FPS titles.
    Shooter,
    /// MOBA and arena titles.
    Moba,
    /// Role-playing games.
    Rpg,
    /// Strategy and 4X titles.
    Strategy,
    /// Sandbox and survival-crafting titles.
    Sandbox,
    /// Sports and racing titles.
    Sports,
    /// Party and social deduction titles.
    Party,
    /// Anything the keyword table does not recognize.
    General,
}

/// Aggregate statistics for one game title across the whole community.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GameAggregateEntity {
    /// Normalized identifier derived from the display name.
    pub game_id: String,
    /// Display name as first observed from presence data.
    pub display_name: String,
    /// Genre bucket inferred from the display name.
    pub category: GameCategory,
    /// Completed sessions over the aggregate's lifetime.
    pub total_sessions: u64,
    /// Minutes played over the aggregate's lifetime.
    pub total_minutes: u64,
    /// Distinct members who started the game, deduplicated per day.
    pub unique_players: u64,
    /// Sessions completed during the current day bucket.
    pub daily_sessions: u64,
    /// Minutes played during the current day bucket.
    pub daily_minutes: u64,
    /// UTC day start the daily counters belong to.
    pub bucket_day: SystemTime,
    /// Mean minutes per completed session.
    pub average_session_minutes: f64,
    /// Members currently in a live session of this game.
    pub current_players: Vec<String>,
    /// Cached length of `current_players`, clamped at zero.
    pub current_player_count: u64,
    /// Ranking score computed from recency and engagement.
    pub popularity_score: i64,
    /// First time the game was observed.
    pub first_seen: SystemTime,
    /// Last time any member played the game.
    pub last_seen: SystemTime,
}

impl GameAggregateEntity {
    /// Fresh aggregate for a game observed for the first time.
    pub fn new(
        game_id: String,
        display_name: String,
        category: GameCategory,
        bucket_day: SystemTime,
        now: SystemTime,
    ) -> Self {
        Self {
            game_id,
            display_name,
            category,
            total_sessions: 0,
            total_minutes: 0,
            unique_players: 0,
            daily_sessions: 0,
            daily_minutes: 0,
            bucket_day,
            average_session_minutes: 0.0,
            current_players: Vec::new(),
            current_player_count: 0,
            popularity_score: 0,
            first_seen: now,
            last_seen: now,
        }
    }
}

/// Additive mutation applied to a game aggregate.
///
/// Counter fields are increments; `set_*` fields are absolute assignments for
/// values recomputed by the caller. `add_player` and `remove_player` must not
/// be combined in one delta, and `reset_daily` must not be combined with
/// daily increments.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GameAggregateDelta {
    /// Completed sessions to add.
    pub sessions: u64,
    /// Minutes to add to the lifetime total.
    pub minutes: u64,
    /// Sessions to add to the current day bucket.
    pub daily_sessions: u64,
    /// Minutes to add to the current day bucket.
    pub daily_minutes: u64,
    /// Distinct daily players to add.
    pub unique_players: u64,
    /// Member to add to the live player roster.
    pub add_player: Option<String>,
    /// Member to remove from the live player roster.
    pub remove_player: Option<String>,
    /// New cached roster length.
    pub set_player_count: Option<u64>,
    /// New mean session length.
    pub set_average_minutes: Option<f64>,
    /// New popularity score.
    pub set_popularity: Option<i64>,
    /// New last-seen instant.
    pub set_last_seen: Option<SystemTime>,
    /// Zero both daily buckets and move `bucket_day` to this day start.
    pub reset_daily: Option<SystemTime>,
}

/// Sum of lifetime counters across all game aggregates.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameCounterTotals {
    /// Completed sessions across all games.
    pub total_sessions: u64,
    /// Minutes played across all games.
    pub total_minutes: u64,
}

/// Payload of one append-only activity log entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActivityKind {
    /// A chat message was posted.
    Message {
        /// Channel the message was posted in.
        channel_id: String,
    },
    /// A voice connection was opened outside live tracking, e.g. by recovery
    /// re-deriving channel membership after a restart.
    VoiceJoin {
        /// Channel the member connected to.
        channel_id: String,
    },
    /// A voice connection ended.
    VoiceLeave {
        /// Channel the member disconnected from.
        channel_id: String,
        /// Minutes credited for the closed session.
        minutes: u64,
    },
    /// A member moved between voice channels; logged once per move.
    VoiceSwitch {
        /// Channel the member left.
        from_channel: String,
        /// Channel the member joined.
        to_channel: String,
        /// Minutes credited for the session that ended.
        minutes: u64,
    },
    /// A game session began.
    GameStart {
        /// Normalized game identifier.
        game_id: String,
        /// Display name as reported by presence.
        game_name: String,
    },
    /// A game session ended.
    GameEnd {
        /// Normalized game identifier.
        game_id: String,
        /// Minutes the session lasted.
        minutes: u64,
    },
    /// A member moved between games; logged once per move.
    GameSwitch {
        /// Game the member stopped playing.
        from_game: String,
        /// Game the member started playing.
        to_game: String,
        /// Minutes credited for the session that ended.
        minutes: u64,
    },
    /// A member joined the server.
    ServerJoin,
    /// A member left the server.
    ServerLeave,
    /// A member joined a scheduled event.
    EventJoined {
        /// Identifier of the scheduled event.
        event_id: String,
    },
    /// A member left a scheduled event.
    EventLeft {
        /// Identifier of the scheduled event.
        event_id: String,
    },
}

impl ActivityKind {
    /// Serialized tag of this payload, usable in storage filters.
    pub fn type_name(&self) -> &'static str {
        match self {
            ActivityKind::Message { .. } => "message",
            ActivityKind::VoiceJoin { .. } => "voice_join",
            ActivityKind::VoiceLeave { .. } => "voice_leave",
            ActivityKind::VoiceSwitch { .. } => "voice_switch",
            ActivityKind::GameStart { .. } => "game_start",
            ActivityKind::GameEnd { .. } => "game_end",
            ActivityKind::GameSwitch { .. } => "game_switch",
            ActivityKind::ServerJoin => "server_join",
            ActivityKind::ServerLeave => "server_leave",
            ActivityKind::EventJoined { .. } => "event_joined",
            ActivityKind::EventLeft { .. } => "event_left",
        }
    }

    /// Game this payload started, if it started one.
    pub fn started_game(&self) -> Option<&str> {
        match self {
            ActivityKind::GameStart { game_id, .. } => Some(game_id),
            ActivityKind::GameSwitch { to_game, .. } => Some(to_game),
            _ => None,
        }
    }
}

/// One entry of the append-only activity log.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ActivityEventEntity {
    /// Primary key of the log entry.
    pub id: Uuid,
    /// Member the activity belongs to.
    pub user_id: String,
    /// What happened.
    pub event: ActivityKind,
    /// When the entry was recorded.
    pub recorded_at: SystemTime,
}

impl ActivityEventEntity {
    /// Log entry recorded now for the given member.
    pub fn record(user_id: String, event: ActivityKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            event,
            recorded_at: SystemTime::now(),
        }
    }
}

/// Predicate for counting activity log entries.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventFilter {
    /// Only entries for this member.
    pub user_id: Option<String>,
    /// Only entries whose payload tag matches, see [`ActivityKind::type_name`].
    pub kind: Option<&'static str>,
    /// Only entries that started this game, matching both plain starts and
    /// the destination side of a game switch.
    pub started_game_id: Option<String>,
    /// Only entries recorded at or after this instant.
    pub since: Option<SystemTime>,
}

impl EventFilter {
    /// Whether the given log entry satisfies every set condition.
    pub fn matches(&self, entry: &ActivityEventEntity) -> bool {
        if let Some(user_id) = &self.user_id
            && &entry.user_id != user_id
        {
            return false;
        }
        if let Some(kind) = self.kind
            && entry.event.type_name() != kind
        {
            return false;
        }
        if let Some(game_id) = &self.started_game_id
            && entry.event.started_game() != Some(game_id.as_str())
        {
            return false;
        }
        if let Some(since) = self.since
            && entry.recorded_at < since
        {
            return false;
        }
        true
    }
}

/// Community-wide membership figures inside a stats snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommunityTotals {
    /// Members with a stats record.
    pub tracked_users: u64,
    /// Members seen in the last twenty-four hours.
    pub active_last_day: u64,
    /// Voice sessions open right now.
    pub live_voice_sessions: u64,
}

/// Gaming figures inside a stats snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct GamingTotals {
    /// Completed sessions across all games.
    pub total_sessions: u64,
    /// Minutes played across all games.
    pub total_minutes: u64,
    /// Distinct game titles observed.
    pub distinct_games: u64,
    /// Members in a live game session right now.
    pub live_players: u64,
}

/// Communication figures inside a stats snapshot.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommunicationTotals {
    /// Messages across all members.
    pub messages_sent: u64,
    /// Voice minutes across all members.
    pub voice_minutes: u64,
}

/// Leaderboard row for one member.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MemberLeader {
    /// Stable identifier of the member.
    pub user_id: String,
    /// Weighted activity score the ranking used.
    pub activity_score: u64,
    /// Messages sent by the member.
    pub messages_sent: u64,
    /// Voice minutes accumulated by the member.
    pub voice_minutes: u64,
    /// Game sessions completed by the member.
    pub games_played: u64,
}

/// Leaderboard row for one game title.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct GameLeader {
    /// Normalized identifier of the game.
    pub game_id: String,
    /// Display name of the game.
    pub display_name: String,
    /// Completed sessions across the community.
    pub total_sessions: u64,
    /// Whole hours played across the community.
    pub total_hours: u64,
}

/// Precomputed server-wide statistics, replaced wholesale on every refresh.
///
/// Readers always receive a complete snapshot from a single materialization
/// run; there is no partial or field-level read path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerStatsSnapshot {
    /// Membership figures.
    pub community: CommunityTotals,
    /// Gaming figures.
    pub gaming: GamingTotals,
    /// Messaging and voice figures.
    pub communication: CommunicationTotals,
    /// Scheduled event attendances across all members.
    pub events_attended: u64,
    /// Most active members, highest score first.
    pub top_members: Vec<MemberLeader>,
    /// Most played games, most sessions first.
    pub top_games: Vec<GameLeader>,
    /// When the snapshot was computed.
    pub generated_at: SystemTime,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn activity_weights_score_sums_weighted_counters() {
        let mut user = UserStatsEntity::new("u1".into(), SystemTime::UNIX_EPOCH);
        user.messages_sent = 10;
        user.voice_minutes = 5;
        user.games_played = 2;
        let weights = ActivityWeights::default();
        assert_eq!(weights.score(&user), 10 + 2 * 5 + 3 * 2);
    }

    #[test]
    fn activity_kind_tag_matches_serialized_form() {
        let kind = ActivityKind::GameSwitch {
            from_game: "valorant".into(),
            to_game: "witcher_3".into(),
            minutes: 30,
        };
        let json = serde_json::to_value(&kind).unwrap();
        assert_eq!(json["type"], kind.type_name());
        assert_eq!(json["to_game"], "witcher_3");

        let unit = ActivityKind::ServerJoin;
        let json = serde_json::to_value(&unit).unwrap();
        assert_eq!(json["type"], unit.type_name());
    }

    #[test]
    fn started_game_covers_starts_and_switch_destinations() {
        let start = ActivityKind::GameStart {
            game_id: "witcher_3".into(),
            game_name: "The Witcher 3".into(),
        };
        let switch = ActivityKind::GameSwitch {
            from_game: "valorant".into(),
            to_game: "witcher_3".into(),
            minutes: 12,
        };
        let end = ActivityKind::GameEnd {
            game_id: "witcher_3".into(),
            minutes: 12,
        };
        assert_eq!(start.started_game(), Some("witcher_3"));
        assert_eq!(switch.started_game(), Some("witcher_3"));
        assert_eq!(end.started_game(), None);
    }

    #[test]
    fn event_filter_applies_all_set_conditions() {
        let entry = ActivityEventEntity::record(
            "u1".into(),
            ActivityKind::GameStart {
                game_id: "witcher_3".into(),
                game_name: "The Witcher 3".into(),
            },
        );

        let filter = EventFilter {
            user_id: Some("u1".into()),
            kind: Some("game_start"),
            started_game_id: Some("witcher_3".into()),
            since: Some(entry.recorded_at - Duration::from_secs(60)),
        };
        assert!(filter.matches(&entry));

        let wrong_user = EventFilter {
            user_id: Some("u2".into()),
            ..filter.clone()
        };
        assert!(!wrong_user.matches(&entry));

        let too_recent = EventFilter {
            since: Some(entry.recorded_at + Duration::from_secs(60)),
            ..filter
        };
        assert!(!too_recent.matches(&entry));
    }

    #[test]
    fn empty_delta_is_detected() {
        assert!(UserCounterDelta::default().is_empty());
        assert!(!UserCounterDelta::touch(SystemTime::now()).is_empty());
        let delta = UserCounterDelta {
            messages_sent: 1,
            ..UserCounterDelta::default()
        };
        assert!(!delta.is_empty());
    }
}
