//! The trust manager: signal aggregation, score/tier derivation, decay at
//! load, and debounced atomic persistence. Single exclusive owner of the
//! store — callers get copies of individual records, never a live handle.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use aegis_core::types::{AgentTrust, TrustEvent, TrustEventKind, TrustStoreEnvelope, TrustTier};
use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::decay::DecayConfig;
use crate::error::TrustError;
use crate::scoring::{self, Weights};
use crate::{decay, persist};

fn default_max_history() -> usize {
    100
}

/// Configuration surface for the trust manager.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustConfig {
    /// Whether trust tracking is active at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Default score by agent id; `"*"` is the fallback for unknown agents.
    #[serde(default)]
    pub defaults: HashMap<String, u8>,
    /// Debounce interval between persistence flushes, in seconds.
    #[serde(default = "default_persist_interval")]
    pub persist_interval_seconds: u64,
    /// Inactivity-driven decay settings.
    #[serde(default)]
    pub decay: DecayConfig,
    /// Score-formula weight overrides.
    #[serde(default)]
    pub weights: Weights,
    /// Maximum history entries retained per agent.
    #[serde(default = "default_max_history")]
    pub max_history_per_agent: usize,
}

fn default_true() -> bool {
    true
}

fn default_persist_interval() -> u64 {
    30
}

impl Default for TrustConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            defaults: HashMap::new(),
            persist_interval_seconds: default_persist_interval(),
            decay: DecayConfig::default(),
            weights: Weights::default(),
            max_history_per_agent: default_max_history(),
        }
    }
}

/// Owns the in-memory trust store and its persistence path.
pub struct TrustManager {
    path: PathBuf,
    config: TrustConfig,
    store: Mutex<HashMap<String, AgentTrust>>,
    dirty: AtomicBool,
}

impl TrustManager {
    /// Load the store from `path` (decay applied per-agent relative to
    /// `now_ms`), or start empty if the file is absent or corrupt.
    pub fn load(path: PathBuf, config: TrustConfig, now_ms: u64) -> Result<Self, TrustError> {
        let envelope = persist::load(&path)?;
        let mut agents = envelope.agents;
        for agent in agents.values_mut() {
            decay::apply(agent, &config.decay, now_ms);
        }
        Ok(Self { path, config, store: Mutex::new(agents), dirty: AtomicBool::new(false) })
    }

    fn default_score_for(&self, agent_id: &str) -> u8 {
        self.config
            .defaults
            .get(agent_id)
            .or_else(|| self.config.defaults.get("*"))
            .copied()
            .unwrap_or(50)
    }

    fn new_agent(&self, agent_id: &str, now_ms: u64) -> AgentTrust {
        let score = self.default_score_for(agent_id);
        AgentTrust {
            agent_id: agent_id.to_string(),
            score,
            tier: TrustTier::from_score(score),
            success_count: 0,
            violation_count: 0,
            approved_escalations: 0,
            denied_escalations: 0,
            age_days: 0,
            clean_streak_days: 0,
            manual_adjustment: 0.0,
            history: Default::default(),
            created_at_ms: now_ms,
            last_evaluated_at_ms: now_ms,
            locked_tier: None,
            floor: None,
            max_history: self.config.max_history_per_agent,
        }
    }

    /// Return a copy of the agent's record, creating a default one (not yet
    /// persisted) if none exists.
    pub fn get_agent_trust(&self, agent_id: &str, now_ms: u64) -> AgentTrust {
        let mut store = self.store.lock().expect("trust store poisoned");
        store.entry(agent_id.to_string()).or_insert_with(|| self.new_agent(agent_id, now_ms)).clone()
    }

    fn recompute(&self, agent: &mut AgentTrust) {
        let raw = scoring::raw_score(agent, &self.config.weights);
        agent.score = scoring::clamp_score(raw, agent.floor);
        if agent.locked_tier.is_none() {
            agent.tier = TrustTier::from_score(agent.score);
        }
    }

    fn with_agent(&self, agent_id: &str, now_ms: u64, f: impl FnOnce(&mut AgentTrust)) {
        let mut store = self.store.lock().expect("trust store poisoned");
        let agent = store.entry(agent_id.to_string()).or_insert_with(|| self.new_agent(agent_id, now_ms));
        f(agent);
        agent.age_days = now_ms.saturating_sub(agent.created_at_ms) / 86_400_000;
        agent.last_evaluated_at_ms = now_ms;
        self.recompute(agent);
        self.dirty.store(true, Ordering::Relaxed);
    }

    /// Record a successful, policy-compliant action outcome.
    pub fn record_success(&self, agent_id: &str, now_ms: u64) {
        self.with_agent(agent_id, now_ms, |agent| {
            agent.success_count += 1;
            agent.clean_streak_days += 1;
            agent.push_history(TrustEvent {
                at_ms: now_ms,
                delta: self.config.weights.success_per_action,
                kind: TrustEventKind::Success,
                note: None,
            });
        });
    }

    /// Record a policy violation.
    pub fn record_violation(&self, agent_id: &str, now_ms: u64, note: Option<String>) {
        self.with_agent(agent_id, now_ms, |agent| {
            agent.violation_count += 1;
            agent.clean_streak_days = 0;
            agent.push_history(TrustEvent {
                at_ms: now_ms,
                delta: self.config.weights.violation_penalty,
                kind: TrustEventKind::Violation,
                note,
            });
        });
    }

    /// Record the outcome of an escalation.
    pub fn record_escalation(&self, agent_id: &str, now_ms: u64, approved: bool) {
        self.with_agent(agent_id, now_ms, |agent| {
            if approved {
                agent.approved_escalations += 1;
                agent.push_history(TrustEvent {
                    at_ms: now_ms,
                    delta: self.config.weights.approved_escalation_bonus,
                    kind: TrustEventKind::EscalationApproved,
                    note: None,
                });
            } else {
                agent.denied_escalations += 1;
                agent.push_history(TrustEvent {
                    at_ms: now_ms,
                    delta: self.config.weights.denied_escalation_penalty,
                    kind: TrustEventKind::EscalationDenied,
                    note: None,
                });
            }
        });
    }

    /// Clamp-set an explicit score; the delta is recorded as a manual
    /// adjustment so subsequent recomputation preserves the override.
    pub fn set_score(&self, agent_id: &str, score: u8, now_ms: u64) {
        let mut store = self.store.lock().expect("trust store poisoned");
        let agent = store.entry(agent_id.to_string()).or_insert_with(|| self.new_agent(agent_id, now_ms));
        let floor = agent.floor.unwrap_or(0);
        let clamped = score.clamp(floor, 100);
        let delta = f64::from(clamped) - f64::from(agent.score);
        agent.manual_adjustment += delta;
        agent.score = clamped;
        if agent.locked_tier.is_none() {
            agent.tier = TrustTier::from_score(clamped);
        }
        agent.last_evaluated_at_ms = now_ms;
        agent.push_history(TrustEvent { at_ms: now_ms, delta, kind: TrustEventKind::ManualAdjustment, note: None });
        drop(store);
        self.dirty.store(true, Ordering::Relaxed);
    }

    /// Override the derived tier; `unlock_tier` restores score-derived tiers.
    pub fn lock_tier(&self, agent_id: &str, tier: TrustTier, now_ms: u64) {
        let mut store = self.store.lock().expect("trust store poisoned");
        let agent = store.entry(agent_id.to_string()).or_insert_with(|| self.new_agent(agent_id, now_ms));
        agent.locked_tier = Some(tier);
        agent.tier = tier;
        drop(store);
        self.dirty.store(true, Ordering::Relaxed);
    }

    /// Clear a tier lock, reverting to the score-derived tier.
    pub fn unlock_tier(&self, agent_id: &str) {
        let mut store = self.store.lock().expect("trust store poisoned");
        if let Some(agent) = store.get_mut(agent_id) {
            agent.locked_tier = None;
            agent.tier = TrustTier::from_score(agent.score);
        }
        drop(store);
        self.dirty.store(true, Ordering::Relaxed);
    }

    /// Set the score's lower clamp bound.
    pub fn set_floor(&self, agent_id: &str, floor: u8, now_ms: u64) {
        let mut store = self.store.lock().expect("trust store poisoned");
        let agent = store.entry(agent_id.to_string()).or_insert_with(|| self.new_agent(agent_id, now_ms));
        agent.floor = Some(floor);
        if agent.score < floor {
            agent.score = floor;
            if agent.locked_tier.is_none() {
                agent.tier = TrustTier::from_score(floor);
            }
        }
        drop(store);
        self.dirty.store(true, Ordering::Relaxed);
    }

    /// Empty an agent's event history while preserving cumulative counters.
    pub fn reset_history(&self, agent_id: &str) {
        let mut store = self.store.lock().expect("trust store poisoned");
        if let Some(agent) = store.get_mut(agent_id) {
            agent.history.clear();
        }
        drop(store);
        self.dirty.store(true, Ordering::Relaxed);
    }

    /// True when a mutation has occurred since the last successful persist.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Relaxed)
    }

    /// Snapshot the store under the lock, release, then serialise and
    /// write-rename without holding it. No-op (and cheap) when not dirty.
    pub fn persist(&self) -> Result<(), TrustError> {
        if !self.dirty.swap(false, Ordering::Relaxed) {
            return Ok(());
        }
        let agents = self.store.lock().expect("trust store poisoned").clone();
        let envelope = TrustStoreEnvelope { version: 1, updated: Utc::now().to_rfc3339(), agents };
        if let Err(e) = persist::save(&self.path, &envelope) {
            self.dirty.store(true, Ordering::Relaxed);
            return Err(e);
        }
        Ok(())
    }

    /// Snapshot of one agent, or the whole store when `agent_id` is `None`.
    #[must_use]
    pub fn snapshot(&self, agent_id: Option<&str>) -> HashMap<String, AgentTrust> {
        let store = self.store.lock().expect("trust store poisoned");
        match agent_id {
            Some(id) => store.get(id).map(|a| HashMap::from([(id.to_string(), a.clone())])).unwrap_or_default(),
            None => store.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> TrustManager {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trust.json");
        std::mem::forget(dir);
        TrustManager::load(path, TrustConfig::default(), 0).unwrap()
    }

    #[test]
    fn unknown_agent_gets_default_score() {
        let mgr = manager();
        let agent = mgr.get_agent_trust("forge", 0);
        assert_eq!(agent.score, 50);
        assert_eq!(agent.tier, TrustTier::Standard);
    }

    #[test]
    fn success_then_violation_moves_score_and_clean_streak() {
        let mgr = manager();
        mgr.record_success("forge", 1000);
        mgr.record_success("forge", 2000);
        let after_success = mgr.get_agent_trust("forge", 2000);
        assert_eq!(after_success.clean_streak_days, 2);

        mgr.record_violation("forge", 3000, Some("denied-exec".into()));
        let after_violation = mgr.get_agent_trust("forge", 3000);
        assert_eq!(after_violation.clean_streak_days, 0);
        assert_eq!(after_violation.violation_count, 1);
        assert!(mgr.is_dirty());
    }

    #[test]
    fn locked_tier_overrides_derived_tier() {
        let mgr = manager();
        mgr.lock_tier("forge", TrustTier::Privileged, 0);
        let agent = mgr.get_agent_trust("forge", 0);
        assert_eq!(agent.tier, TrustTier::Privileged);
        assert_eq!(agent.effective_tier(), TrustTier::Privileged);

        mgr.unlock_tier("forge");
        let agent = mgr.get_agent_trust("forge", 0);
        assert_eq!(agent.tier, TrustTier::from_score(agent.score));
    }

    #[test]
    fn set_score_clamps_to_floor() {
        let mgr = manager();
        mgr.set_floor("forge", 20, 0);
        mgr.set_score("forge", 0, 0);
        let agent = mgr.get_agent_trust("forge", 0);
        assert_eq!(agent.score, 20);
    }

    #[test]
    fn persist_is_noop_when_not_dirty() {
        let mgr = manager();
        assert!(!mgr.is_dirty());
        mgr.persist().unwrap();
    }

    #[test]
    fn reset_history_preserves_counters() {
        let mgr = manager();
        mgr.record_success("forge", 0);
        mgr.reset_history("forge");
        let agent = mgr.get_agent_trust("forge", 0);
        assert!(agent.history.is_empty());
        assert_eq!(agent.success_count, 1);
    }
}
