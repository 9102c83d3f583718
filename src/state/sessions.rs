//! In-memory session records owned by the live tracker.

use std::time::SystemTime;
use uuid::Uuid;

use crate::dao::models::VoiceSessionEntity;

/// Voice connection currently tracked for one member.
///
/// The tracker keeps at most one of these per member; a second join closes
/// the stale session before this one replaces it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveVoiceSession {
    /// Primary key shared with the persisted row.
    pub id: Uuid,
    /// Connected member.
    pub user_id: String,
    /// Server the channel belongs to.
    pub guild_id: String,
    /// Channel the member is connected to.
    pub channel_id: String,
    /// Instant the connection was observed.
    pub started_at: SystemTime,
}

impl LiveVoiceSession {
    /// Open a session starting now.
    pub fn open(user_id: String, guild_id: String, channel_id: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id,
            guild_id,
            channel_id,
            started_at: SystemTime::now(),
        }
    }

    /// Persistent row mirroring this session.
    pub fn to_entity(&self) -> VoiceSessionEntity {
        VoiceSessionEntity {
            id: self.id,
            user_id: self.user_id.clone(),
            guild_id: self.guild_id.clone(),
            channel_id: self.channel_id.clone(),
            started_at: self.started_at,
            active: true,
        }
    }
}

/// Game session currently tracked for one member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveGameSession {
    /// Normalized identifier of the game.
    pub game_id: String,
    /// Display name as reported by presence.
    pub game_name: String,
    /// Instant the session was observed starting.
    pub started_at: SystemTime,
}

impl LiveGameSession {
    /// Open a session starting now.
    pub fn open(game_id: String, game_name: String) -> Self {
        Self {
            game_id,
            game_name,
            started_at: SystemTime::now(),
        }
    }
}

/// Why a session was closed; carried into logs so closures can be told apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// The member disconnected.
    Leave,
    /// The member moved to another channel or game.
    Switch,
    /// Recovery settled a row left behind by a crash.
    Restart,
    /// The engine flushed live sessions during graceful shutdown.
    Shutdown,
}

impl CloseReason {
    /// Stable label for structured logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Leave => "leave",
            CloseReason::Switch => "switch",
            CloseReason::Restart => "restart",
            CloseReason::Shutdown => "shutdown",
        }
    }
}

/// Whole minutes elapsed between two instants, clamped at zero when the
/// clock moved backwards.
pub fn elapsed_minutes(started_at: SystemTime, now: SystemTime) -> u64 {
    now.duration_since(started_at)
        .map(|elapsed| elapsed.as_secs() / 60)
        .unwrap_or(0)
}
