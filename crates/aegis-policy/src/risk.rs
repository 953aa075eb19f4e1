//! Five-factor weighted risk assessment.

use std::collections::HashMap;

use aegis_core::types::{EvaluationContext, RiskAssessment, RiskFactors, RiskLevel};
use aegis_core::FrequencyCounter;
use serde_json::Value;

/// Per-tool sensitivity overrides and the frequency window used by the
/// `frequency` factor. Defaults match the built-in table in the spec.
#[derive(Debug, Clone, Default)]
pub struct RiskConfig {
    /// Tool name → sensitivity score (0-100), superseding the built-in table.
    pub tool_risk_overrides: HashMap<String, u8>,
}

/// Built-in tool sensitivity table; unknown tools default to 30.
#[must_use]
pub fn builtin_tool_risk(tool: &str) -> u8 {
    match tool {
        "gateway" | "elevated" => 95,
        "cron" => 90,
        "exec" => 70,
        "write" => 65,
        "edit" => 60,
        "sessions_send" => 50,
        "sessions_spawn" => 45,
        "browser" => 40,
        "message" => 40,
        "web_fetch" => 20,
        "web_search" => 15,
        "canvas" => 15,
        "read" => 10,
        "image" => 10,
        other if other.starts_with("memory_") => 5,
        _ => 30,
    }
}

fn tool_sensitivity_score(tool: Option<&str>, config: &RiskConfig) -> u8 {
    let Some(tool) = tool else {
        return 0;
    };
    config.tool_risk_overrides.get(tool).copied().unwrap_or_else(|| builtin_tool_risk(tool))
}

fn is_truthy_string(value: &Value, expected: &str) -> bool {
    matches!(value, Value::String(s) if s == expected)
}

fn external_target_detected(ctx: &EvaluationContext) -> bool {
    if ctx.message_addressee.as_deref().is_some_and(|a| !a.is_empty()) {
        return true;
    }
    if let Some(host) = ctx.tool_params.get("host") {
        if !is_truthy_string(host, "sandbox") && matches!(host, Value::String(_)) {
            return true;
        }
    }
    if matches!(ctx.tool_params.get("elevated"), Some(Value::Bool(true))) {
        return true;
    }
    false
}

/// Compute the five weighted factors and the resulting bounded score/band.
#[must_use]
pub fn assess(ctx: &EvaluationContext, frequency: &FrequencyCounter, config: &RiskConfig) -> RiskAssessment {
    let tool_sensitivity = f64::from(tool_sensitivity_score(ctx.tool_name.as_deref(), config)) / 100.0 * 30.0;

    let time_of_day = if ctx.time.hour < 8 || ctx.time.hour >= 23 { 15.0 } else { 0.0 };

    let trust_deficit = (100.0 - f64::from(ctx.trust.score)) / 100.0 * 20.0;

    let now_ms = (ctx.now_us / 1000).max(0) as u64;
    let recent_count = frequency.count_agent_session(60, &ctx.agent_id, &ctx.session_key, now_ms);
    let frequency_factor = (recent_count as f64 / 20.0).min(1.0) * 15.0;

    let target_scope = if external_target_detected(ctx) { 20.0 } else { 0.0 };

    let factors = RiskFactors { tool_sensitivity, time_of_day, trust_deficit, frequency: frequency_factor, target_scope };
    let raw_total = factors.total().round();
    let score = raw_total.clamp(0.0, 100.0) as u8;
    let level = RiskLevel::from_score(score);
    RiskAssessment { score, level, factors }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::types::{HookKind, TimeContext, TrustSnapshot, TrustTier};

    fn ctx(hour: u32, tool: &str, trust_score: u8) -> EvaluationContext {
        EvaluationContext {
            hook: HookKind::BeforeToolCall,
            agent_id: "forge".into(),
            session_key: "agent:forge".into(),
            channel: None,
            tool_name: Some(tool.into()),
            tool_params: serde_json::Map::new(),
            message_content: None,
            message_addressee: None,
            time: TimeContext { hour, minute: 0, day_of_week: 0, date: "2026-08-01".into(), zone: "UTC".into() },
            now_us: 0,
            trust: TrustSnapshot { score: trust_score, tier: TrustTier::from_score(trust_score) },
            history: vec![],
            metadata: serde_json::Map::new(),
        }
    }

    #[test]
    fn night_exec_at_low_trust_is_high_or_critical() {
        let freq = FrequencyCounter::new(10);
        let c = ctx(3, "exec", 60);
        let r = assess(&c, &freq, &RiskConfig::default());
        assert_eq!(r.factors.time_of_day, 15.0);
        assert!(matches!(r.level, RiskLevel::High | RiskLevel::Critical));
    }

    #[test]
    fn daytime_read_is_low() {
        let freq = FrequencyCounter::new(10);
        let c = ctx(12, "read", 100);
        let r = assess(&c, &freq, &RiskConfig::default());
        assert_eq!(r.level, RiskLevel::Low);
    }

    #[test]
    fn unknown_tool_defaults_to_thirty() {
        assert_eq!(builtin_tool_risk("something_bespoke"), 30);
    }

    #[test]
    fn external_target_via_elevated_param() {
        let freq = FrequencyCounter::new(10);
        let mut c = ctx(12, "exec", 100);
        c.tool_params.insert("elevated".into(), Value::Bool(true));
        let r = assess(&c, &freq, &RiskConfig::default());
        assert_eq!(r.factors.target_scope, 20.0);
    }

    #[test]
    fn score_is_clamped_to_one_hundred() {
        let freq = FrequencyCounter::new(10);
        for i in 0..20 {
            freq.record(i * 1_000, "forge", "agent:forge", "exec");
        }
        let mut c = ctx(3, "gateway", 0);
        c.now_us = 20_000 * 1_000;
        c.message_addressee = Some("external@example.com".into());
        let r = assess(&c, &freq, &RiskConfig::default());
        assert!(r.score <= 100);
    }
}
