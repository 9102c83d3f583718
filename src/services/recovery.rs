//! Startup recovery for sessions abandoned by a previous run.

use tracing::{info, warn};

use crate::{
    dao::models::{ActivityEventEntity, ActivityKind},
    dto::status::RecoveryReport,
    error::ServiceError,
    gateway::VoiceRoster,
    services::session_tracker,
    state::{
        SharedState,
        sessions::{CloseReason, LiveVoiceSession},
    },
};

/// Settle every voice row left active by a previous run, then rebuild live
/// sessions from the roster's view of who is connected right now.
///
/// Minutes are credited up to the current instant, so a long outage inflates
/// them. Reopened sessions log a join event because their original join was
/// never observed. Per-row failures are logged and skipped.
pub async fn recover_abandoned_sessions(
    state: &SharedState,
    roster: &dyn VoiceRoster,
    reason: CloseReason,
) -> Result<RecoveryReport, ServiceError> {
    let store = state.require_store().await?;
    let mut report = RecoveryReport::default();

    let abandoned = store.find_active_voice_sessions().await?;
    for row in &abandoned {
        match session_tracker::settle_voice_session(state, row, reason, None).await {
            Ok(minutes) => {
                report.closed += 1;
                report.minutes_credited += minutes;
            }
            Err(err) => {
                warn!(user = %row.user_id, error = %err, "failed to settle abandoned session");
            }
        }
    }

    for occupant in roster.occupants().await? {
        let session = LiveVoiceSession::open(
            occupant.user_id.clone(),
            occupant.guild_id,
            occupant.channel_id,
        );
        if let Err(err) = reopen(state, &session).await {
            warn!(user = %occupant.user_id, error = %err, "failed to reopen live session");
            continue;
        }
        state.voice_sessions().insert(occupant.user_id, session);
        report.reopened += 1;
    }

    info!(
        closed = report.closed,
        minutes = report.minutes_credited,
        reopened = report.reopened,
        "session recovery finished"
    );
    Ok(report)
}

async fn reopen(state: &SharedState, session: &LiveVoiceSession) -> Result<(), ServiceError> {
    let store = state.require_store().await?;
    store.insert_voice_session(session.to_entity()).await?;
    store
        .append_event(ActivityEventEntity::record(
            session.user_id.clone(),
            ActivityKind::VoiceJoin {
                channel_id: session.channel_id.clone(),
            },
        ))
        .await?;
    Ok(())
}
