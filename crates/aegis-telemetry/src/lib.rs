#![deny(unsafe_code)]
#![warn(missing_docs)]
//! Structured JSON logging bootstrap and the engine's running evaluation
//! counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use thiserror::Error;
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};

/// Errors from telemetry bootstrap.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The global subscriber was already set by another component.
    #[error("tracing subscriber already initialized")]
    AlreadyInitialized,
}

/// Initialize structured JSON logging with an env filter. Controlled by
/// `RUST_LOG`, e.g. `"info,aegis_engine=debug"`; defaults to `"info"`.
pub fn init_json_logging() -> Result<(), TelemetryError> {
    let fmt_layer = fmt::layer().json().with_current_span(true).with_span_list(true);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber).map_err(|_| TelemetryError::AlreadyInitialized)
}

/// Running evaluation statistics the engine orchestrator aggregates across
/// every `evaluate()` call: totals, per-action counts, error count, and a
/// running mean of evaluation cost.
#[derive(Clone, Default)]
pub struct EngineStats {
    total: Arc<AtomicU64>,
    allow: Arc<AtomicU64>,
    deny: Arc<AtomicU64>,
    escalate: Arc<AtomicU64>,
    error: Arc<AtomicU64>,
    mean_evaluation_us_bits: Arc<AtomicU64>,
}

/// A point-in-time copy of [`EngineStats`], safe to serialize and return
/// from a status endpoint.
#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct EngineStatsSnapshot {
    /// Total evaluations performed.
    pub total: u64,
    /// Evaluations resolved to `allow`.
    pub allow: u64,
    /// Evaluations resolved to `deny`.
    pub deny: u64,
    /// Evaluations resolved to `escalate`.
    pub escalate: u64,
    /// Evaluations that hit the error guard and returned a fallback verdict.
    pub error: u64,
    /// Running mean evaluation cost, in microseconds.
    pub mean_evaluation_us: f64,
}

impl EngineStats {
    /// Construct a zeroed counter set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one `allow`/`deny`/`escalate` outcome and fold its evaluation
    /// cost into the running mean using Welford's incremental formula.
    pub fn record_outcome(&self, action: aegis_core::types::Action, evaluation_us: u64) {
        use aegis_core::types::Action;
        self.total.fetch_add(1, Ordering::Relaxed);
        match action {
            Action::Allow => self.allow.fetch_add(1, Ordering::Relaxed),
            Action::Deny => self.deny.fetch_add(1, Ordering::Relaxed),
            Action::Escalate => self.escalate.fetch_add(1, Ordering::Relaxed),
        };
        self.fold_mean(evaluation_us);
    }

    /// Record that an evaluation hit the broad error guard and a fallback
    /// verdict was returned instead.
    pub fn record_error(&self, evaluation_us: u64) {
        self.total.fetch_add(1, Ordering::Relaxed);
        self.error.fetch_add(1, Ordering::Relaxed);
        self.fold_mean(evaluation_us);
    }

    fn fold_mean(&self, evaluation_us: u64) {
        loop {
            let total = self.total.load(Ordering::Relaxed).max(1) as f64;
            let current_bits = self.mean_evaluation_us_bits.load(Ordering::Relaxed);
            let current = f64::from_bits(current_bits);
            let updated = current + (evaluation_us as f64 - current) / total;
            let updated_bits = updated.to_bits();
            if self
                .mean_evaluation_us_bits
                .compare_exchange(current_bits, updated_bits, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                break;
            }
        }
    }

    /// A consistent-enough snapshot for a status endpoint; individual
    /// counters may be off by one under concurrent load, never corrupted.
    #[must_use]
    pub fn snapshot(&self) -> EngineStatsSnapshot {
        EngineStatsSnapshot {
            total: self.total.load(Ordering::Relaxed),
            allow: self.allow.load(Ordering::Relaxed),
            deny: self.deny.load(Ordering::Relaxed),
            escalate: self.escalate.load(Ordering::Relaxed),
            error: self.error.load(Ordering::Relaxed),
            mean_evaluation_us: f64::from_bits(self.mean_evaluation_us_bits.load(Ordering::Relaxed)),
        }
    }
}
