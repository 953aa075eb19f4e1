//! The additive score formula and its default weights.

use aegis_core::types::AgentTrust;
use serde::{Deserialize, Serialize};

/// Tunable weights for the score formula. Overridable per-field from
/// configuration; unset fields fall back to [`Weights::default`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Weights {
    /// Score contributed per day of age.
    pub age_per_day: f64,
    /// Cap on the age contribution.
    pub age_max: f64,
    /// Score contributed per recorded success.
    pub success_per_action: f64,
    /// Cap on the success contribution.
    pub success_max: f64,
    /// Score change per recorded violation (negative).
    pub violation_penalty: f64,
    /// Score change per approved escalation.
    pub approved_escalation_bonus: f64,
    /// Score change per denied escalation (negative).
    pub denied_escalation_penalty: f64,
    /// Score contributed per day of an unbroken clean streak.
    pub clean_streak_per_day: f64,
    /// Cap on the clean-streak contribution.
    pub clean_streak_max: f64,
}

impl Default for Weights {
    fn default() -> Self {
        Self {
            age_per_day: 0.5,
            age_max: 20.0,
            success_per_action: 0.1,
            success_max: 30.0,
            violation_penalty: -2.0,
            approved_escalation_bonus: 0.5,
            denied_escalation_penalty: -3.0,
            clean_streak_per_day: 0.3,
            clean_streak_max: 20.0,
        }
    }
}

/// Compute the raw (unclamped) score from an agent's signal counters.
#[must_use]
pub fn raw_score(agent: &AgentTrust, weights: &Weights) -> f64 {
    let age = (agent.age_days as f64 * weights.age_per_day).min(weights.age_max);
    let success = (agent.success_count as f64 * weights.success_per_action).min(weights.success_max);
    let violation = agent.violation_count as f64 * weights.violation_penalty;
    let approved = agent.approved_escalations as f64 * weights.approved_escalation_bonus;
    let denied = agent.denied_escalations as f64 * weights.denied_escalation_penalty;
    let clean_streak = (agent.clean_streak_days as f64 * weights.clean_streak_per_day).min(weights.clean_streak_max);
    age + success + violation + approved + denied + clean_streak + agent.manual_adjustment
}

/// Clamp a raw score into `[max(floor,0), 100]` and round to the nearest
/// integer.
#[must_use]
pub fn clamp_score(raw: f64, floor: Option<u8>) -> u8 {
    let lower = floor.unwrap_or(0) as f64;
    raw.round().clamp(lower.max(0.0), 100.0) as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::types::{TrustEvent, TrustTier};
    use std::collections::VecDeque;

    fn base_agent() -> AgentTrust {
        AgentTrust {
            agent_id: "forge".into(),
            score: 50,
            tier: TrustTier::Standard,
            success_count: 0,
            violation_count: 0,
            approved_escalations: 0,
            denied_escalations: 0,
            age_days: 0,
            clean_streak_days: 0,
            manual_adjustment: 0.0,
            history: VecDeque::new(),
            created_at_ms: 0,
            last_evaluated_at_ms: 0,
            locked_tier: None,
            floor: None,
            max_history: 100,
        }
    }

    #[test]
    fn fresh_agent_scores_zero() {
        let agent = base_agent();
        assert_eq!(raw_score(&agent, &Weights::default()), 0.0);
    }

    #[test]
    fn age_and_success_are_capped() {
        let mut agent = base_agent();
        agent.age_days = 1000;
        agent.success_count = 10_000;
        let raw = raw_score(&agent, &Weights::default());
        assert_eq!(raw, 50.0); // age_max(20) + success_max(30)
    }

    #[test]
    fn violations_pull_score_down_and_floor_clamps() {
        let mut agent = base_agent();
        agent.violation_count = 100;
        let raw = raw_score(&agent, &Weights::default());
        assert!(raw < 0.0);
        assert_eq!(clamp_score(raw, Some(10)), 10);
        assert_eq!(clamp_score(raw, None), 0);
    }

    #[test]
    fn manual_adjustment_and_history_event_shape() {
        let mut agent = base_agent();
        agent.manual_adjustment = 5.0;
        agent.push_history(TrustEvent { at_ms: 1, delta: 5.0, kind: aegis_core::types::TrustEventKind::ManualAdjustment, note: None });
        assert_eq!(raw_score(&agent, &Weights::default()), 5.0);
        assert_eq!(agent.history.len(), 1);
    }
}
