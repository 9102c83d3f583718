//! Session lifecycle and stats aggregation engine for community servers.
//!
//! A gateway host pushes member activity (messages, voice state, game
//! presence) into [`services::session_tracker`]; the engine owns the live
//! session view, persists per-member counters and per-game aggregates through
//! [`dao::stats_store::StatsStore`], backfills history additively, and
//! materializes a server-wide stats snapshot on a schedule.

/// Runtime configuration loading.
pub mod config;
/// Storage contracts, entities, and backends.
pub mod dao;
/// Serializable status and report types for monitoring surfaces.
pub mod dto;
/// Service-level error taxonomy.
pub mod error;
/// Contracts the host platform implements: gateway events, voice roster,
/// message history.
pub mod gateway;
/// Tracing setup for hosts and tests.
pub mod logging;
/// Engine services: tracking, aggregates, syncs, snapshots, scheduling.
pub mod services;
/// Shared engine state and concurrency guards.
pub mod state;
