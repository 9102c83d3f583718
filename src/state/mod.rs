pub mod guard;
pub mod sessions;

use std::{sync::Arc, time::SystemTime};

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::{Mutex, RwLock, watch};

use crate::{
    config::EngineConfig,
    dao::{models::ServerStatsSnapshot, stats_store::StatsStore},
    error::ServiceError,
};

pub use self::guard::SingleFlight;
use self::sessions::{LiveGameSession, LiveVoiceSession};

pub type SharedState = Arc<EngineState>;

/// Flavor of historical sync, deciding its cadence and lookback window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncKind {
    /// Frequent incremental scan over a short window.
    Light,
    /// Infrequent deep scan over a long window.
    Full,
}

impl SyncKind {
    /// Stable label for structured logging.
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncKind::Light => "light",
            SyncKind::Full => "full",
        }
    }
}

#[derive(Default)]
struct SyncMarks {
    light: Option<SystemTime>,
    full: Option<SystemTime>,
}

/// Central engine state holding the storage handle, the authoritative live
/// session maps, and the freshest materialized snapshot.
pub struct EngineState {
    config: EngineConfig,
    store: RwLock<Option<Arc<dyn StatsStore>>>,
    degraded: watch::Sender<bool>,
    voice_sessions: DashMap<String, LiveVoiceSession>,
    game_sessions: DashMap<String, LiveGameSession>,
    game_locks: DashMap<String, Arc<Mutex<()>>>,
    snapshot: RwLock<Option<Arc<ServerStatsSnapshot>>>,
    sync_flight: SingleFlight,
    materialize_flight: SingleFlight,
    sync_marks: RwLock<SyncMarks>,
}

impl EngineState {
    /// Construct a new [`EngineState`] wrapped in an [`Arc`] so it can be
    /// cloned cheaply.
    ///
    /// The engine starts in degraded mode until a storage backend is
    /// installed.
    pub fn new(config: EngineConfig) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            config,
            store: RwLock::new(None),
            degraded: degraded_tx,
            voice_sessions: DashMap::new(),
            game_sessions: DashMap::new(),
            game_locks: DashMap::new(),
            snapshot: RwLock::new(None),
            sync_flight: SingleFlight::new(),
            materialize_flight: SingleFlight::new(),
            sync_marks: RwLock::new(SyncMarks::default()),
        })
    }

    /// Runtime configuration the engine was started with.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Obtain a handle to the current stats store, if one is installed.
    pub async fn store(&self) -> Option<Arc<dyn StatsStore>> {
        let guard = self.store.read().await;
        guard.as_ref().cloned()
    }

    /// Obtain the stats store or fail because the engine is degraded.
    pub async fn require_store(&self) -> Result<Arc<dyn StatsStore>, ServiceError> {
        self.store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new stats store implementation and leave degraded mode.
    pub async fn install_store(&self, store: Arc<dyn StatsStore>) {
        {
            let mut guard = self.store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current stats store and enter degraded mode.
    pub async fn clear_store(&self) {
        {
            let mut guard = self.store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                false
            } else {
                *current = value;
                true
            }
        });
    }

    /// Authoritative map of open voice sessions keyed by member.
    pub fn voice_sessions(&self) -> &DashMap<String, LiveVoiceSession> {
        &self.voice_sessions
    }

    /// Authoritative map of open game sessions keyed by member.
    pub fn game_sessions(&self) -> &DashMap<String, LiveGameSession> {
        &self.game_sessions
    }

    /// Per-game lock serializing aggregate read-modify-write cycles.
    pub fn game_lock(&self, game_id: &str) -> Arc<Mutex<()>> {
        self.game_locks
            .entry(game_id.to_owned())
            .or_default()
            .clone()
    }

    /// Freshest materialized snapshot, if any run has completed.
    pub async fn snapshot(&self) -> Option<Arc<ServerStatsSnapshot>> {
        let guard = self.snapshot.read().await;
        guard.clone()
    }

    /// Replace the in-memory snapshot wholesale.
    pub async fn install_snapshot(&self, snapshot: ServerStatsSnapshot) {
        let mut guard = self.snapshot.write().await;
        *guard = Some(Arc::new(snapshot));
    }

    /// Guard ensuring a single historical sync runs at a time.
    pub fn sync_flight(&self) -> &SingleFlight {
        &self.sync_flight
    }

    /// Guard ensuring a single materialization runs at a time.
    pub fn materialize_flight(&self) -> &SingleFlight {
        &self.materialize_flight
    }

    /// When the given sync flavor last completed.
    pub async fn last_sync(&self, kind: SyncKind) -> Option<SystemTime> {
        let guard = self.sync_marks.read().await;
        match kind {
            SyncKind::Light => guard.light,
            SyncKind::Full => guard.full,
        }
    }

    /// Most recent completion over both sync flavors.
    pub async fn last_sync_any(&self) -> Option<SystemTime> {
        let guard = self.sync_marks.read().await;
        match (guard.light, guard.full) {
            (Some(light), Some(full)) => Some(light.max(full)),
            (light, full) => light.or(full),
        }
    }

    /// Record the completion watermark for a sync flavor.
    pub async fn record_sync(&self, kind: SyncKind, at: SystemTime) {
        let mut guard = self.sync_marks.write().await;
        match kind {
            SyncKind::Light => guard.light = Some(at),
            SyncKind::Full => guard.full = Some(at),
        }
    }

    /// Open voice session count and members currently in a game.
    pub fn live_counts(&self) -> (u64, u64) {
        (
            self.voice_sessions.len() as u64,
            self.game_sessions.len() as u64,
        )
    }
}
