//! The read-only status surface backing `get_status()`.

use aegis_telemetry::EngineStatsSnapshot;
use serde::Serialize;

use crate::config::FailMode;

/// Point-in-time snapshot of the engine's operating state.
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    /// Master switch.
    pub enabled: bool,
    /// Number of distinct policies in the currently published index.
    pub policy_count: usize,
    /// Whether trust tracking is active.
    pub trust_enabled: bool,
    /// Whether audit recording is active.
    pub audit_enabled: bool,
    /// Whether the audit log is in read-only mode after a failed
    /// startup chain verification.
    pub audit_read_only: bool,
    /// The configured error-path disposition.
    pub fail_mode: FailMode,
    /// Running evaluation counters.
    pub stats: EngineStatsSnapshot,
}
