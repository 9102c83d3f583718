use std::time::{Duration, SystemTime};

use serde::Serialize;

use crate::{dto::format_system_time, state::SyncKind};

/// Freshness summary for one background component.
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Whether the component completed a run recently enough.
    pub healthy: bool,
    /// RFC 3339 timestamp of the last completed run.
    pub last_update: Option<String>,
    /// Whole minutes elapsed since the last completed run.
    pub age_minutes: Option<u64>,
    /// Whether a run is executing right now.
    pub in_progress: bool,
}

impl HealthReport {
    /// Summarize a component from its last completion mark.
    ///
    /// A component that never completed is unhealthy, as is one whose last
    /// completion is older than `stale_after`.
    pub fn from_last_run(
        last_run: Option<SystemTime>,
        stale_after: Duration,
        in_progress: bool,
    ) -> Self {
        let now = SystemTime::now();
        let age = last_run.map(|at| now.duration_since(at).unwrap_or_default());
        let healthy = matches!(age, Some(age) if age <= stale_after);
        Self {
            healthy,
            last_update: last_run.map(format_system_time),
            age_minutes: age.map(|age| age.as_secs() / 60),
            in_progress,
        }
    }
}

/// Materializer status exposed to monitoring surfaces.
#[derive(Debug, Clone, Serialize)]
pub struct MaterializerStatus {
    /// Freshness of the materialized snapshot.
    pub snapshot: HealthReport,
    /// Open voice sessions currently tracked in memory.
    pub live_voice_sessions: u64,
    /// Members currently tracked in a game.
    pub live_game_sessions: u64,
}

/// Reconciliation status covering both sync flavors.
#[derive(Debug, Clone, Serialize)]
pub struct SyncStatus {
    /// Frequent short-window sync.
    pub light: HealthReport,
    /// Infrequent deep sync.
    pub full: HealthReport,
}

/// Outcome of one startup crash-recovery pass.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct RecoveryReport {
    /// Abandoned voice sessions settled and removed.
    pub closed: u64,
    /// Voice minutes credited while settling them.
    pub minutes_credited: u64,
    /// Sessions reopened from the live roster.
    pub reopened: u64,
}

/// Outcome of one reconciliation run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SyncReport {
    /// Another run already held the sync guard.
    Skipped,
    /// The run scanned history and committed its tallies.
    Completed {
        /// Which flavor ran.
        kind: SyncKind,
        /// Channels scanned to the watermark.
        channels_scanned: u64,
        /// Channels abandoned after fetch failures.
        channels_skipped: u64,
        /// Messages tallied inside the window.
        messages_tallied: u64,
        /// Distinct members whose counters were bumped.
        users_updated: u64,
        /// Counter fields normalized by the repair pass.
        repaired_counters: u64,
    },
}

impl SyncReport {
    /// Whether the run was skipped because another held the guard.
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }
}

/// Outcome of one materialization run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum MaterializeReport {
    /// Another run already held the materialize guard.
    Skipped,
    /// The run rebuilt and installed a fresh snapshot.
    Completed {
        /// Members with a stats record.
        tracked_users: u64,
        /// Game aggregates in the store.
        tracked_games: u64,
        /// Entries in the member leaderboard.
        top_members: usize,
        /// Entries in the game leaderboard.
        top_games: usize,
        /// RFC 3339 timestamp the snapshot was generated at.
        generated_at: String,
    },
}

impl MaterializeReport {
    /// Whether the run was skipped because another held the guard.
    pub fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_completed_component_is_unhealthy() {
        let report = HealthReport::from_last_run(None, Duration::from_secs(3600), false);
        assert!(!report.healthy);
        assert!(report.last_update.is_none());
        assert!(report.age_minutes.is_none());
    }

    #[test]
    fn stale_component_is_unhealthy() {
        let last = SystemTime::now() - Duration::from_secs(2 * 3600);
        let report = HealthReport::from_last_run(Some(last), Duration::from_secs(3600), false);
        assert!(!report.healthy);
        assert_eq!(report.age_minutes, Some(120));
    }

    #[test]
    fn recent_component_is_healthy() {
        let last = SystemTime::now() - Duration::from_secs(5 * 60);
        let report = HealthReport::from_last_run(Some(last), Duration::from_secs(3600), true);
        assert!(report.healthy);
        assert!(report.in_progress);
        assert_eq!(report.age_minutes, Some(5));
        assert!(report.last_update.is_some());
    }

    #[test]
    fn reports_expose_skipped_outcome() {
        assert!(SyncReport::Skipped.is_skipped());
        assert!(MaterializeReport::Skipped.is_skipped());
    }
}
