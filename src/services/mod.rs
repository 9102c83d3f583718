/// Per-game aggregate updates driven by session transitions.
pub mod game_aggregates;
/// Stats snapshot recomputation and health reporting.
pub mod materializer;
/// Historical message backfill into live counters.
pub mod reconciliation;
/// Startup settlement of sessions abandoned by a previous run.
pub mod recovery;
/// Periodic job spawning.
pub mod scheduler;
/// Game name normalization, category inference, and popularity scoring.
pub mod scoring;
/// Live voice and game session tracking.
pub mod session_tracker;
/// Storage connection supervision and degraded mode switching.
pub mod storage_supervisor;
