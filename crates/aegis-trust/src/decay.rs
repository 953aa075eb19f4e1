//! Inactivity-driven score decay, applied once per load.

use aegis_core::types::{AgentTrust, TrustEvent, TrustEventKind, TrustTier};
use serde::{Deserialize, Serialize};

/// Decay configuration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecayConfig {
    /// Whether decay is applied at load time.
    #[serde(default)]
    pub enabled: bool,
    /// Days of inactivity before a decay period is counted.
    #[serde(default = "default_inactivity_days")]
    pub inactivity_days: u64,
    /// Multiplicative decay applied once per inactive period.
    #[serde(default = "default_rate")]
    pub rate: f64,
}

fn default_inactivity_days() -> u64 {
    30
}

fn default_rate() -> f64 {
    0.95
}

impl Default for DecayConfig {
    fn default() -> Self {
        Self { enabled: false, inactivity_days: default_inactivity_days(), rate: default_rate() }
    }
}

/// Apply decay to `agent` in place if inactive for at least one full period,
/// relative to `now_ms`. A no-op when disabled, locked below the floor has
/// no effect, or the agent hasn't been inactive long enough.
pub fn apply(agent: &mut AgentTrust, config: &DecayConfig, now_ms: u64) {
    if !config.enabled || config.inactivity_days == 0 {
        return;
    }
    let inactive_ms = now_ms.saturating_sub(agent.last_evaluated_at_ms);
    let period_ms = config.inactivity_days.saturating_mul(86_400_000);
    if period_ms == 0 {
        return;
    }
    let periods = inactive_ms / period_ms;
    if periods == 0 {
        return;
    }
    let floor = f64::from(agent.floor.unwrap_or(0));
    let decayed = f64::from(agent.score) * config.rate.powi(periods as i32);
    let new_score = decayed.round().clamp(floor, 100.0) as u8;
    if new_score != agent.score {
        let delta = f64::from(new_score) - f64::from(agent.score);
        agent.score = new_score;
        if agent.locked_tier.is_none() {
            agent.tier = TrustTier::from_score(new_score);
        }
        agent.push_history(TrustEvent {
            at_ms: now_ms,
            delta,
            kind: TrustEventKind::Decay,
            note: Some(format!("{periods} inactive period(s)")),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    fn agent(score: u8, last_evaluated_at_ms: u64) -> AgentTrust {
        AgentTrust {
            agent_id: "forge".into(),
            score,
            tier: TrustTier::from_score(score),
            success_count: 0,
            violation_count: 0,
            approved_escalations: 0,
            denied_escalations: 0,
            age_days: 0,
            clean_streak_days: 0,
            manual_adjustment: 0.0,
            history: VecDeque::new(),
            created_at_ms: 0,
            last_evaluated_at_ms,
            locked_tier: None,
            floor: None,
            max_history: 100,
        }
    }

    #[test]
    fn no_decay_when_disabled() {
        let mut a = agent(80, 0);
        apply(&mut a, &DecayConfig { enabled: false, ..DecayConfig::default() }, 1_000_000_000);
        assert_eq!(a.score, 80);
    }

    #[test]
    fn decays_once_per_full_inactive_period() {
        let mut a = agent(80, 0);
        let cfg = DecayConfig { enabled: true, inactivity_days: 30, rate: 0.9 };
        let now = 30 * 86_400_000; // exactly one period
        apply(&mut a, &cfg, now);
        assert_eq!(a.score, 72); // round(80 * 0.9)
    }

    #[test]
    fn decay_respects_floor() {
        let mut a = agent(10, 0);
        a.floor = Some(8);
        let cfg = DecayConfig { enabled: true, inactivity_days: 1, rate: 0.1 };
        apply(&mut a, &cfg, 10 * 86_400_000);
        assert!(a.score >= 8);
    }
}
