//! Engine configuration loading for job cadences, history paging, and
//! scoring weights.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::dao::models::ActivityWeights;
use crate::services::scoring::PopularityWeights;

/// Default location on disk where the engine looks for the JSON configuration.
const DEFAULT_CONFIG_PATH: &str = "config/engine.json";
/// Environment variable that overrides [`DEFAULT_CONFIG_PATH`].
const CONFIG_PATH_ENV: &str = "GUILD_PULSE_CONFIG_PATH";

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the engine.
pub struct EngineConfig {
    /// How often the stats snapshot is rebuilt.
    pub materialize_interval: Duration,
    /// How often the incremental history sync runs.
    pub light_sync_interval: Duration,
    /// How often the deep history sync runs.
    pub full_sync_interval: Duration,
    /// How often stale game aggregates are pruned and day buckets rolled.
    pub cleanup_interval: Duration,
    /// Window scanned by an incremental sync that has no watermark.
    pub light_sync_lookback: Duration,
    /// Window scanned by a deep sync that has no watermark.
    pub full_sync_lookback: Duration,
    /// Messages requested per history page.
    pub history_page_size: usize,
    /// Pause between history pages so platform rate limits are respected.
    pub history_page_delay: Duration,
    /// Rows kept in each leaderboard.
    pub leaderboard_size: usize,
    /// Weights for the member activity score.
    pub activity_weights: ActivityWeights,
    /// Weights for the game popularity score.
    pub popularity_weights: PopularityWeights,
    /// Pruning thresholds for abandoned game aggregates.
    pub cleanup: CleanupPolicy,
}

/// Thresholds deciding when a game aggregate is abandoned.
#[derive(Debug, Clone, Copy)]
pub struct CleanupPolicy {
    /// Days without activity before an aggregate counts as idle.
    pub idle_days: u64,
    /// Aggregates with at least this many sessions are never pruned.
    pub min_sessions: u64,
}

impl EngineConfig {
    /// Load the engine configuration from disk, falling back to built-in
    /// defaults for anything missing or unreadable.
    pub fn load() -> Self {
        let path = resolve_config_path();
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str::<RawConfig>(&contents) {
                Ok(raw) => {
                    let config: Self = raw.into();
                    info!(path = %path.display(), "loaded engine configuration");
                    config
                }
                Err(err) => {
                    warn!(
                        path = %path.display(),
                        error = %err,
                        "failed to parse config; falling back to defaults"
                    );
                    Self::default()
                }
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {
                info!(
                    path = %path.display(),
                    "config file not found; using built-in defaults"
                );
                Self::default()
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to read config; falling back to defaults"
                );
                Self::default()
            }
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            materialize_interval: Duration::from_secs(15 * 60),
            light_sync_interval: Duration::from_secs(60 * 60),
            full_sync_interval: Duration::from_secs(24 * 60 * 60),
            cleanup_interval: Duration::from_secs(24 * 60 * 60),
            light_sync_lookback: Duration::from_secs(24 * 60 * 60),
            full_sync_lookback: Duration::from_secs(30 * 24 * 60 * 60),
            history_page_size: 100,
            history_page_delay: Duration::from_millis(500),
            leaderboard_size: 10,
            activity_weights: ActivityWeights::default(),
            popularity_weights: PopularityWeights::default(),
            cleanup: CleanupPolicy {
                idle_days: 30,
                min_sessions: 5,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the configuration file. Every field is optional so
/// deployments only state what they tune.
struct RawConfig {
    materialize_interval_secs: Option<u64>,
    light_sync_interval_secs: Option<u64>,
    full_sync_interval_secs: Option<u64>,
    cleanup_interval_secs: Option<u64>,
    light_sync_lookback_secs: Option<u64>,
    full_sync_lookback_secs: Option<u64>,
    history_page_size: Option<usize>,
    history_page_delay_ms: Option<u64>,
    leaderboard_size: Option<usize>,
    activity_weights: Option<ActivityWeights>,
    popularity_weights: Option<PopularityWeights>,
    cleanup: Option<RawCleanupPolicy>,
}

#[derive(Debug, Deserialize)]
struct RawCleanupPolicy {
    idle_days: Option<u64>,
    min_sessions: Option<u64>,
}

impl From<RawConfig> for EngineConfig {
    fn from(value: RawConfig) -> Self {
        let defaults = Self::default();
        let cleanup = value.cleanup.unwrap_or(RawCleanupPolicy {
            idle_days: None,
            min_sessions: None,
        });

        Self {
            materialize_interval: value
                .materialize_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.materialize_interval),
            light_sync_interval: value
                .light_sync_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.light_sync_interval),
            full_sync_interval: value
                .full_sync_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.full_sync_interval),
            cleanup_interval: value
                .cleanup_interval_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.cleanup_interval),
            light_sync_lookback: value
                .light_sync_lookback_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.light_sync_lookback),
            full_sync_lookback: value
                .full_sync_lookback_secs
                .map(Duration::from_secs)
                .unwrap_or(defaults.full_sync_lookback),
            history_page_size: value
                .history_page_size
                .unwrap_or(defaults.history_page_size)
                .max(1),
            history_page_delay: value
                .history_page_delay_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.history_page_delay),
            leaderboard_size: value.leaderboard_size.unwrap_or(defaults.leaderboard_size),
            activity_weights: value.activity_weights.unwrap_or(defaults.activity_weights),
            popularity_weights: value
                .popularity_weights
                .unwrap_or(defaults.popularity_weights),
            cleanup: CleanupPolicy {
                idle_days: cleanup.idle_days.unwrap_or(defaults.cleanup.idle_days),
                min_sessions: cleanup
                    .min_sessions
                    .unwrap_or(defaults.cleanup.min_sessions),
            },
        }
    }
}

/// Resolve the configuration path taking the environment override into account.
fn resolve_config_path() -> PathBuf {
    env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_keeps_defaults_for_the_rest() {
        let raw: RawConfig = serde_json::from_str(
            r#"{
                "materialize_interval_secs": 60,
                "history_page_size": 50,
                "cleanup": { "idle_days": 14 }
            }"#,
        )
        .unwrap();
        let config: EngineConfig = raw.into();

        assert_eq!(config.materialize_interval, Duration::from_secs(60));
        assert_eq!(config.history_page_size, 50);
        assert_eq!(config.cleanup.idle_days, 14);
        assert_eq!(config.cleanup.min_sessions, 5);
        assert_eq!(config.light_sync_interval, Duration::from_secs(3600));
    }

    #[test]
    fn page_size_never_drops_below_one() {
        let raw: RawConfig = serde_json::from_str(r#"{ "history_page_size": 0 }"#).unwrap();
        let config: EngineConfig = raw.into();
        assert_eq!(config.history_page_size, 1);
    }

    #[test]
    fn weights_parse_from_nested_objects() {
        let raw: RawConfig = serde_json::from_str(
            r#"{
                "activity_weights": { "message": 2, "voice": 4, "gaming": 6 },
                "popularity_weights": {
                    "session": 1,
                    "unique_player": 1,
                    "recency_bonus": 0,
                    "recency_window_days": 1,
                    "live_player": 1
                }
            }"#,
        )
        .unwrap();
        let config: EngineConfig = raw.into();
        assert_eq!(config.activity_weights.voice, 4);
        assert_eq!(config.popularity_weights.recency_bonus, 0);
    }
}
