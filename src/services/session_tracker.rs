//! Live session tracking driven by gateway events.
//!
//! Owns the authoritative in-memory view of who is connected to voice and who
//! is playing what, together with the matching persisted voice rows. Counter
//! increments are emitted when sessions close.

use std::time::SystemTime;

use tracing::{debug, info, warn};

use crate::{
    dao::models::{ActivityEventEntity, ActivityKind, UserCounterDelta, VoiceSessionEntity},
    error::ServiceError,
    gateway::{GatewayEvent, MemberChange, VoiceStateChange},
    services::{
        game_aggregates::{self, GameTransition},
        scoring,
    },
    state::{
        SharedState,
        sessions::{CloseReason, LiveGameSession, LiveVoiceSession, elapsed_minutes},
    },
};

/// Route one gateway event to its handler.
///
/// Failures are logged, never propagated, so one member's bad event cannot
/// stall the stream for everyone else.
pub async fn handle_event(state: &SharedState, event: GatewayEvent) {
    let user_id = match &event {
        GatewayEvent::Presence(update) => update.user_id.clone(),
        GatewayEvent::Voice(change) => change.user_id.clone(),
        GatewayEvent::Message(message) => message.user_id.clone(),
        GatewayEvent::Member(MemberChange::Joined { user_id })
        | GatewayEvent::Member(MemberChange::Left { user_id }) => user_id.clone(),
        GatewayEvent::Attendance(attendance) => attendance.user_id.clone(),
    };

    if let Err(err) = dispatch(state, event).await {
        warn!(user = %user_id, error = %err, "gateway event processing failed");
    }
}

async fn dispatch(state: &SharedState, event: GatewayEvent) -> Result<(), ServiceError> {
    match event {
        GatewayEvent::Presence(update) => {
            on_presence_update(
                state,
                update.user_id,
                update.previous_games,
                update.current_games,
            )
            .await
        }
        GatewayEvent::Voice(change) => on_voice_state(state, change).await,
        GatewayEvent::Message(message) => {
            on_message(state, message.user_id, message.channel_id).await
        }
        GatewayEvent::Member(MemberChange::Joined { user_id }) => {
            on_member_join(state, user_id).await
        }
        GatewayEvent::Member(MemberChange::Left { user_id }) => {
            on_member_leave(state, user_id).await
        }
        GatewayEvent::Attendance(attendance) => {
            on_event_attendance(
                state,
                attendance.user_id,
                attendance.event_id,
                attendance.joined,
            )
            .await
        }
    }
}

async fn on_voice_state(state: &SharedState, change: VoiceStateChange) -> Result<(), ServiceError> {
    match (change.previous_channel, change.new_channel) {
        (None, Some(channel)) => {
            on_voice_join(state, change.user_id, change.guild_id, channel).await
        }
        (Some(_), None) => on_voice_leave(state, &change.user_id, CloseReason::Leave).await,
        (Some(from), Some(to)) if from != to => {
            on_voice_switch(state, change.user_id, change.guild_id, from, to).await
        }
        // Same-channel updates are mute/deafen toggles.
        _ => Ok(()),
    }
}

/// Open a voice session for a member entering a channel.
///
/// A join while a session is already tracked is a duplicate delivery; the
/// stale session is closed as a switch before the new one opens.
pub async fn on_voice_join(
    state: &SharedState,
    user_id: String,
    guild_id: String,
    channel_id: String,
) -> Result<(), ServiceError> {
    if let Some((_, stale)) = state.voice_sessions().remove(&user_id) {
        settle_voice_session(
            state,
            &stale.to_entity(),
            CloseReason::Switch,
            Some(&channel_id),
        )
        .await?;
    }
    open_voice_session(state, user_id, guild_id, channel_id).await
}

/// Close the tracked voice session of a member who disconnected.
pub async fn on_voice_leave(
    state: &SharedState,
    user_id: &str,
    reason: CloseReason,
) -> Result<(), ServiceError> {
    let Some((_, session)) = state.voice_sessions().remove(user_id) else {
        debug!(user = %user_id, "voice leave without a tracked session");
        return Ok(());
    };
    settle_voice_session(state, &session.to_entity(), reason, None).await?;
    Ok(())
}

/// Move a member's voice session between channels, crediting the first leg.
pub async fn on_voice_switch(
    state: &SharedState,
    user_id: String,
    guild_id: String,
    from_channel: String,
    to_channel: String,
) -> Result<(), ServiceError> {
    match state.voice_sessions().remove(&user_id) {
        Some((_, session)) => {
            if session.channel_id != from_channel {
                debug!(
                    user = %user_id,
                    tracked = %session.channel_id,
                    reported = %from_channel,
                    "switch reports a source channel that was not tracked"
                );
            }
            settle_voice_session(
                state,
                &session.to_entity(),
                CloseReason::Switch,
                Some(&to_channel),
            )
            .await?;
            open_voice_session(state, user_id, session.guild_id, to_channel).await
        }
        None => {
            debug!(user = %user_id, "switch without a tracked session, opening fresh");
            open_voice_session(state, user_id, guild_id, to_channel).await
        }
    }
}

async fn open_voice_session(
    state: &SharedState,
    user_id: String,
    guild_id: String,
    channel_id: String,
) -> Result<(), ServiceError> {
    let store = state.require_store().await?;
    let session = LiveVoiceSession::open(user_id.clone(), guild_id, channel_id);
    store.insert_voice_session(session.to_entity()).await?;
    info!(user = %user_id, channel = %session.channel_id, "voice session opened");
    state.voice_sessions().insert(user_id, session);
    Ok(())
}

/// Close one persisted voice session through the shared closure path.
///
/// Ordering: counter increment and last-seen touch land first, then the
/// activity event, then the row delete. A crash between the counter write and
/// the delete leaves an active row whose minutes were already credited, and
/// the next recovery pass will credit them again. Known double-count window.
///
/// Returns the minutes credited.
pub(crate) async fn settle_voice_session(
    state: &SharedState,
    session: &VoiceSessionEntity,
    reason: CloseReason,
    switched_to: Option<&str>,
) -> Result<u64, ServiceError> {
    let store = state.require_store().await?;
    let now = SystemTime::now();
    let minutes = elapsed_minutes(session.started_at, now);

    let delta = UserCounterDelta {
        voice_minutes: minutes,
        touch_last_seen: Some(now),
        ..UserCounterDelta::default()
    };
    store
        .apply_user_delta(session.user_id.clone(), delta)
        .await?;

    let event = match switched_to {
        Some(to_channel) => ActivityKind::VoiceSwitch {
            from_channel: session.channel_id.clone(),
            to_channel: to_channel.to_owned(),
            minutes,
        },
        None => ActivityKind::VoiceLeave {
            channel_id: session.channel_id.clone(),
            minutes,
        },
    };
    store
        .append_event(ActivityEventEntity::record(session.user_id.clone(), event))
        .await?;
    store.delete_voice_session(session.id).await?;

    info!(
        user = %session.user_id,
        channel = %session.channel_id,
        reason = reason.as_str(),
        minutes,
        "voice session closed"
    );
    Ok(minutes)
}

/// Diff a presence update against the tracked game session.
///
/// Only the first reported game of an update is tracked. A change of game is
/// an end plus a start but logs a single switch event.
pub async fn on_presence_update(
    state: &SharedState,
    user_id: String,
    previous_games: Vec<String>,
    current_games: Vec<String>,
) -> Result<(), ServiceError> {
    let desired = current_games.into_iter().next().and_then(|raw| {
        let game_id = scoring::normalize_game_name(&raw);
        if game_id.is_empty() {
            debug!(user = %user_id, game = %raw, "presence game name normalizes to nothing");
            None
        } else {
            Some((game_id, raw))
        }
    });

    let tracked = state
        .game_sessions()
        .get(&user_id)
        .map(|entry| entry.value().clone());

    match (tracked, desired) {
        (None, None) => {
            if !previous_games.is_empty() {
                debug!(user = %user_id, "presence cleared a game that was never tracked");
            }
            Ok(())
        }
        (None, Some((game_id, raw_name))) => start_game(state, user_id, game_id, raw_name).await,
        (Some(session), None) => end_game(state, &user_id, session).await,
        (Some(session), Some((game_id, raw_name))) => {
            if session.game_id == game_id {
                // Same game, possibly a different spelling of its name.
                return Ok(());
            }
            switch_game(state, user_id, session, game_id, raw_name).await
        }
    }
}

async fn start_game(
    state: &SharedState,
    user_id: String,
    game_id: String,
    raw_name: String,
) -> Result<(), ServiceError> {
    let store = state.require_store().await?;
    // The aggregate's unique-player check reads the event log, so it must run
    // before the start event is appended.
    game_aggregates::apply(state, &raw_name, &user_id, GameTransition::Start, 0).await?;
    store
        .append_event(ActivityEventEntity::record(
            user_id.clone(),
            ActivityKind::GameStart {
                game_id: game_id.clone(),
                game_name: raw_name.clone(),
            },
        ))
        .await?;
    info!(user = %user_id, game = %game_id, "game session started");
    state
        .game_sessions()
        .insert(user_id, LiveGameSession::open(game_id, raw_name));
    Ok(())
}

async fn end_game(
    state: &SharedState,
    user_id: &str,
    session: LiveGameSession,
) -> Result<(), ServiceError> {
    let store = state.require_store().await?;
    let now = SystemTime::now();
    let minutes = elapsed_minutes(session.started_at, now);

    game_aggregates::apply(
        state,
        &session.game_name,
        user_id,
        GameTransition::End,
        minutes,
    )
    .await?;
    store
        .apply_user_delta(
            user_id.to_owned(),
            UserCounterDelta {
                games_played: 1,
                touch_last_seen: Some(now),
                ..UserCounterDelta::default()
            },
        )
        .await?;
    store
        .append_event(ActivityEventEntity::record(
            user_id.to_owned(),
            ActivityKind::GameEnd {
                game_id: session.game_id.clone(),
                minutes,
            },
        ))
        .await?;
    info!(user = %user_id, game = %session.game_id, minutes, "game session ended");
    state.game_sessions().remove(user_id);
    Ok(())
}

async fn switch_game(
    state: &SharedState,
    user_id: String,
    session: LiveGameSession,
    game_id: String,
    raw_name: String,
) -> Result<(), ServiceError> {
    let store = state.require_store().await?;
    let now = SystemTime::now();
    let minutes = elapsed_minutes(session.started_at, now);

    game_aggregates::apply(
        state,
        &session.game_name,
        &user_id,
        GameTransition::Switch,
        minutes,
    )
    .await?;
    game_aggregates::apply(state, &raw_name, &user_id, GameTransition::Start, 0).await?;
    store
        .apply_user_delta(
            user_id.clone(),
            UserCounterDelta {
                games_played: 1,
                touch_last_seen: Some(now),
                ..UserCounterDelta::default()
            },
        )
        .await?;
    store
        .append_event(ActivityEventEntity::record(
            user_id.clone(),
            ActivityKind::GameSwitch {
                from_game: session.game_id.clone(),
                to_game: game_id.clone(),
                minutes,
            },
        ))
        .await?;
    info!(user = %user_id, from = %session.game_id, to = %game_id, minutes, "game session switched");
    state
        .game_sessions()
        .insert(user_id, LiveGameSession::open(game_id, raw_name));
    Ok(())
}

/// Count one posted message for a member.
pub async fn on_message(
    state: &SharedState,
    user_id: String,
    channel_id: String,
) -> Result<(), ServiceError> {
    let store = state.require_store().await?;
    store
        .apply_user_delta(
            user_id.clone(),
            UserCounterDelta {
                messages_sent: 1,
                touch_last_seen: Some(SystemTime::now()),
                ..UserCounterDelta::default()
            },
        )
        .await?;
    store
        .append_event(ActivityEventEntity::record(
            user_id,
            ActivityKind::Message { channel_id },
        ))
        .await?;
    Ok(())
}

/// Record a member joining the server.
pub async fn on_member_join(state: &SharedState, user_id: String) -> Result<(), ServiceError> {
    record_membership(state, user_id, ActivityKind::ServerJoin).await
}

/// Record a member leaving the server.
pub async fn on_member_leave(state: &SharedState, user_id: String) -> Result<(), ServiceError> {
    record_membership(state, user_id, ActivityKind::ServerLeave).await
}

async fn record_membership(
    state: &SharedState,
    user_id: String,
    event: ActivityKind,
) -> Result<(), ServiceError> {
    let store = state.require_store().await?;
    store
        .apply_user_delta(user_id.clone(), UserCounterDelta::touch(SystemTime::now()))
        .await?;
    store
        .append_event(ActivityEventEntity::record(user_id, event))
        .await?;
    Ok(())
}

/// Record scheduled-event attendance; only a join bumps the counter.
pub async fn on_event_attendance(
    state: &SharedState,
    user_id: String,
    event_id: String,
    joined: bool,
) -> Result<(), ServiceError> {
    let store = state.require_store().await?;
    let now = SystemTime::now();

    let delta = if joined {
        UserCounterDelta {
            events_attended: 1,
            touch_last_seen: Some(now),
            ..UserCounterDelta::default()
        }
    } else {
        UserCounterDelta::touch(now)
    };
    store.apply_user_delta(user_id.clone(), delta).await?;

    let kind = if joined {
        ActivityKind::EventJoined { event_id }
    } else {
        ActivityKind::EventLeft { event_id }
    };
    store
        .append_event(ActivityEventEntity::record(user_id, kind))
        .await?;
    Ok(())
}

/// Close every tracked session before the process exits.
///
/// Per-session failures are logged and skipped so one bad row cannot keep the
/// rest open.
pub async fn shutdown(state: &SharedState) {
    let connected: Vec<String> = state
        .voice_sessions()
        .iter()
        .map(|entry| entry.key().clone())
        .collect();
    let mut closed_voice = 0u64;
    for user_id in connected {
        match on_voice_leave(state, &user_id, CloseReason::Shutdown).await {
            Ok(()) => closed_voice += 1,
            Err(err) => warn!(user = %user_id, error = %err, "voice session flush failed"),
        }
    }

    let playing: Vec<String> = state
        .game_sessions()
        .iter()
        .map(|entry| entry.key().clone())
        .collect();
    let mut closed_games = 0u64;
    for user_id in playing {
        let Some(session) = state
            .game_sessions()
            .get(&user_id)
            .map(|entry| entry.value().clone())
        else {
            continue;
        };
        match end_game(state, &user_id, session).await {
            Ok(()) => closed_games += 1,
            Err(err) => warn!(user = %user_id, error = %err, "game session flush failed"),
        }
    }

    info!(voice = closed_voice, games = closed_games, "session flush finished");
}
