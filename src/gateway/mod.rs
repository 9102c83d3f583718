//! Inbound seam between the engine and the chat platform.
//!
//! The engine never talks to a gateway or HTTP API itself. Hosts translate
//! their platform's payloads into [`GatewayEvent`] values and implement the
//! collaborator traits for the two pull-based lookups the engine needs:
//! current voice channel membership and paged message history.

use std::{error::Error, sync::Arc, time::SystemTime};

use futures::future::BoxFuture;
use thiserror::Error;

/// Platform activity delivered to the engine, one value per observed change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEvent {
    /// A member's game presence changed.
    Presence(PresenceUpdate),
    /// A member's voice connection changed.
    Voice(VoiceStateChange),
    /// A member posted a chat message.
    Message(MessageCreated),
    /// A member joined or left the server.
    Member(MemberChange),
    /// A member joined or left a scheduled event.
    Attendance(EventAttendance),
}

/// Game presence change for one member.
///
/// Lists may contain duplicates and arrive in any order; only the first
/// entry of `current_games` is treated as the game being played.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceUpdate {
    /// Member whose presence changed.
    pub user_id: String,
    /// Game names reported before the change.
    pub previous_games: Vec<String>,
    /// Game names reported after the change.
    pub current_games: Vec<String>,
}

/// Voice connection change for one member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceStateChange {
    /// Member whose voice state changed.
    pub user_id: String,
    /// Server the change happened in.
    pub guild_id: String,
    /// Channel the member was connected to, if any.
    pub previous_channel: Option<String>,
    /// Channel the member is connected to now, if any.
    pub new_channel: Option<String>,
}

/// Chat message notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageCreated {
    /// Author of the message.
    pub user_id: String,
    /// Channel the message was posted in.
    pub channel_id: String,
}

/// Server membership change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MemberChange {
    /// A member joined the server.
    Joined {
        /// Member who joined.
        user_id: String,
    },
    /// A member left the server.
    Left {
        /// Member who left.
        user_id: String,
    },
}

/// Scheduled event attendance change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventAttendance {
    /// Member whose attendance changed.
    pub user_id: String,
    /// Scheduled event concerned.
    pub event_id: String,
    /// True when the member joined, false when they left.
    pub joined: bool,
}

/// One member currently connected to a voice channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoiceOccupant {
    /// Connected member.
    pub user_id: String,
    /// Server the channel belongs to.
    pub guild_id: String,
    /// Channel the member is connected to.
    pub channel_id: String,
}

/// Failure while reading current voice channel membership.
#[derive(Debug, Error)]
pub enum RosterError {
    #[error("voice roster unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl RosterError {
    /// Construct an unavailable error from any host-side failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        RosterError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}

/// Live view of who is connected to voice right now, implemented by the host.
pub trait VoiceRoster: Send + Sync {
    /// Every member currently connected to a voice channel.
    fn occupants(&self) -> BoxFuture<'static, Result<Vec<VoiceOccupant>, RosterError>>;
}

/// One historical chat message, as returned by a history page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryMessage {
    /// Platform identifier of the message, used as the paging cursor.
    pub id: String,
    /// Author of the message.
    pub author_id: String,
    /// When the message was posted.
    pub sent_at: SystemTime,
}

/// Failure while scanning message history.
#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("history source unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
    #[error("failed to fetch a history page for channel `{channel_id}`")]
    PageFetch {
        channel_id: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl HistoryError {
    /// Construct an unavailable error from any host-side failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        HistoryError::Unavailable {
            message,
            source: Box::new(source),
        }
    }

    /// Construct a page fetch error for one channel.
    pub fn page_fetch(channel_id: String, source: impl Error + Send + Sync + 'static) -> Self {
        HistoryError::PageFetch {
            channel_id,
            source: Box::new(source),
        }
    }
}

/// Paged, newest-first access to message history, implemented by the host.
pub trait HistorySource: Send + Sync {
    /// Channels whose history should be scanned.
    fn list_channels(&self) -> BoxFuture<'static, Result<Vec<String>, HistoryError>>;
    /// One page of messages older than `before`, newest first. An empty page
    /// or a short page means the channel is exhausted.
    fn fetch_page(
        &self,
        channel_id: String,
        before: Option<String>,
        limit: usize,
    ) -> BoxFuture<'static, Result<Vec<HistoryMessage>, HistoryError>>;
}

/// Factory producing a connected [`HistorySource`] on demand, so each sync
/// run starts from a fresh connection.
pub trait HistoryConnector: Send + Sync {
    /// Connect and return a usable history source.
    fn connect(&self) -> BoxFuture<'static, Result<Arc<dyn HistorySource>, HistoryError>>;
}
