//! Pure, table-driven evaluation of the closed condition-kind set. A
//! missing context field a condition references yields `false`, never an
//! error — conditions are matchers, not validators.

use std::collections::HashMap;

use aegis_core::types::{
    AgentCondition, Condition, ContextCondition, EvaluationContext, FrequencyCondition,
    NameMatcher, ParamMatcher, RiskAssessment, TimeConditionRef, TimeWindow, ToolCondition,
};
use aegis_core::util::{glob_to_regex, in_time_range, parse_time_minutes, INVALID_MINUTES};
use aegis_core::FrequencyCounter;
use serde_json::Value;

use crate::regex_cache::RegexCache;

/// Dependencies the condition kernel needs but does not own: the shared
/// regex cache, named time windows, the frequency counter, and the risk
/// assessment already computed for this evaluation (if any).
pub struct EvalDeps<'a> {
    /// Shared regex cache for glob/`matches` lookups.
    pub regex_cache: &'a RegexCache,
    /// Named time windows available to `Condition::Time(TimeConditionRef::Named(_))`.
    pub time_windows: &'a HashMap<String, TimeWindow>,
    /// Shared frequency counter.
    pub frequency: &'a FrequencyCounter,
    /// The risk assessment computed earlier in this evaluation, if any.
    pub risk: Option<&'a RiskAssessment>,
    /// Wall-clock milliseconds "now", used for frequency windows.
    pub now_ms: u64,
}

/// Evaluate a single condition against a context. `Any`/`Not` recurse;
/// every other variant is a leaf matcher.
#[must_use]
pub fn evaluate(condition: &Condition, ctx: &EvaluationContext, deps: &EvalDeps<'_>) -> bool {
    match condition {
        Condition::Tool(tc) => eval_tool(tc, ctx, deps),
        Condition::Time(tref) => eval_time(tref, ctx, deps),
        Condition::Agent(ac) => eval_agent(ac, ctx, deps),
        Condition::Context(cc) => eval_context(cc, ctx, deps),
        Condition::Risk { min, max } => deps.risk.is_some_and(|r| r.level >= *min && r.level <= *max),
        Condition::Frequency(fc) => eval_frequency(fc, ctx, deps),
        Condition::Any(subs) => subs.iter().any(|c| evaluate(c, ctx, deps)),
        Condition::Not(inner) => !evaluate(inner, ctx, deps),
    }
}

/// AND-combine a rule's conditions, short-circuiting on the first `false`.
#[must_use]
pub fn evaluate_all(conditions: &[Condition], ctx: &EvaluationContext, deps: &EvalDeps<'_>) -> bool {
    conditions.iter().all(|c| evaluate(c, ctx, deps))
}

fn match_name(matcher: &NameMatcher, subject: &str, cache: &RegexCache) -> bool {
    match matcher {
        NameMatcher::Exact(s) => subject == s,
        NameMatcher::Glob(pattern) => {
            let source = glob_to_regex(pattern);
            cache.get_or_compile(&source).is_some_and(|re| re.is_match(subject))
        }
        NameMatcher::AnyOf(options) => options.iter().any(|s| s == subject),
    }
}

fn coerce_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn match_param(matcher: &ParamMatcher, value: &Value, cache: &RegexCache) -> bool {
    match matcher {
        ParamMatcher::Equals(expected) => value == expected,
        ParamMatcher::Contains(needle) => coerce_string(value).contains(needle.as_str()),
        ParamMatcher::Matches(pattern) => {
            cache.get_or_compile(pattern).is_some_and(|re| re.is_match(&coerce_string(value)))
        }
        ParamMatcher::StartsWith(prefix) => coerce_string(value).starts_with(prefix.as_str()),
        ParamMatcher::In(options) => options.iter().any(|v| v == value),
    }
}

fn eval_tool(tc: &ToolCondition, ctx: &EvaluationContext, deps: &EvalDeps<'_>) -> bool {
    let Some(name) = ctx.tool_name.as_deref() else {
        return false;
    };
    if !match_name(&tc.name, name, deps.regex_cache) {
        return false;
    }
    tc.params.iter().all(|(key, matcher)| {
        ctx.tool_params.get(key).is_some_and(|v| match_param(matcher, v, deps.regex_cache))
    })
}

fn resolve_window<'a>(tref: &'a TimeConditionRef, windows: &'a HashMap<String, TimeWindow>) -> Option<&'a TimeWindow> {
    match tref {
        TimeConditionRef::Named(name) => windows.get(name),
        TimeConditionRef::Inline(window) => Some(window),
    }
}

fn eval_time(tref: &TimeConditionRef, ctx: &EvaluationContext, deps: &EvalDeps<'_>) -> bool {
    let Some(window) = resolve_window(tref, deps.time_windows) else {
        return false;
    };
    if let Some(days) = &window.days {
        if !days.contains(&ctx.time.day_of_week) {
            return false;
        }
    }
    let after = parse_time_minutes(&window.after);
    let before = parse_time_minutes(&window.before);
    if after == INVALID_MINUTES || before == INVALID_MINUTES {
        return false;
    }
    in_time_range(ctx.time.minutes_of_day(), after, before)
}

fn eval_agent(ac: &AgentCondition, ctx: &EvaluationContext, deps: &EvalDeps<'_>) -> bool {
    if !match_name(&ac.id, &ctx.agent_id, deps.regex_cache) {
        return false;
    }
    if !ac.tiers.is_empty() && !ac.tiers.contains(&ctx.trust.tier) {
        return false;
    }
    if let Some((min, max)) = ac.score_range {
        if ctx.trust.score < min || ctx.trust.score > max {
            return false;
        }
    }
    true
}

fn eval_context(cc: &ContextCondition, ctx: &EvaluationContext, deps: &EvalDeps<'_>) -> bool {
    match cc {
        ContextCondition::HistoryContains(needle) => ctx.history.iter().any(|h| h.contains(needle.as_str())),
        ContextCondition::HistoryMatches(pattern) => deps
            .regex_cache
            .get_or_compile(pattern)
            .is_some_and(|re| ctx.history.iter().any(|h| re.is_match(h))),
        ContextCondition::MessageContains(needle) => {
            ctx.message_content.as_deref().is_some_and(|m| m.contains(needle.as_str()))
        }
        ContextCondition::MessageMatches(pattern) => ctx.message_content.as_deref().is_some_and(|m| {
            deps.regex_cache.get_or_compile(pattern).is_some_and(|re| re.is_match(m))
        }),
        ContextCondition::MetadataHasKey(key) => ctx.metadata.contains_key(key),
        ContextCondition::ChannelIn(options) => {
            ctx.channel.as_deref().is_some_and(|c| options.iter().any(|x| x == c))
        }
        ContextCondition::SessionKeyGlob(pattern) => {
            let source = glob_to_regex(pattern);
            deps.regex_cache.get_or_compile(&source).is_some_and(|re| re.is_match(&ctx.session_key))
        }
    }
}

fn eval_frequency(fc: &FrequencyCondition, ctx: &EvaluationContext, deps: &EvalDeps<'_>) -> bool {
    let count = deps.frequency.count(fc.window_seconds, fc.scope, &ctx.agent_id, &ctx.session_key, deps.now_ms);
    count as u32 >= fc.threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::types::{HookKind, TimeContext, TrustSnapshot, TrustTier};
    use serde_json::json;

    fn base_ctx() -> EvaluationContext {
        EvaluationContext {
            hook: HookKind::BeforeToolCall,
            agent_id: "forge".into(),
            session_key: "agent:forge:subagent:1".into(),
            channel: Some("ops".into()),
            tool_name: Some("exec".into()),
            tool_params: serde_json::Map::new(),
            message_content: None,
            message_addressee: None,
            time: TimeContext { hour: 3, minute: 15, day_of_week: 2, date: "2026-08-01".into(), zone: "UTC".into() },
            now_us: 0,
            trust: TrustSnapshot { score: 60, tier: TrustTier::Trusted },
            history: vec!["hello".into(), "world".into()],
            metadata: serde_json::Map::new(),
        }
    }

    fn deps<'a>(cache: &'a RegexCache, windows: &'a HashMap<String, TimeWindow>, freq: &'a FrequencyCounter) -> EvalDeps<'a> {
        EvalDeps { regex_cache: cache, time_windows: windows, frequency: freq, risk: None, now_ms: 3_600_000 }
    }

    #[test]
    fn tool_exact_and_param_matchers() {
        let cache = RegexCache::new();
        let windows = HashMap::new();
        let freq = FrequencyCounter::new(10);
        let mut ctx = base_ctx();
        ctx.tool_params.insert("path".into(), json!("/srv/app/.env"));

        let cond = Condition::Tool(ToolCondition {
            name: NameMatcher::Exact("exec".into()),
            params: vec![("path".into(), ParamMatcher::Contains(".env".into()))],
        });
        assert!(evaluate(&cond, &ctx, &deps(&cache, &windows, &freq)));

        let cond_missing = Condition::Tool(ToolCondition {
            name: NameMatcher::Exact("exec".into()),
            params: vec![("missing_key".into(), ParamMatcher::Contains("x".into()))],
        });
        assert!(!evaluate(&cond_missing, &ctx, &deps(&cache, &windows, &freq)));
    }

    #[test]
    fn glob_tool_name_matches() {
        let cache = RegexCache::new();
        let windows = HashMap::new();
        let freq = FrequencyCounter::new(10);
        let mut ctx = base_ctx();
        ctx.tool_name = Some("sessions_send".into());
        let cond = Condition::Tool(ToolCondition { name: NameMatcher::Glob("sessions_*".into()), params: vec![] });
        assert!(evaluate(&cond, &ctx, &deps(&cache, &windows, &freq)));
    }

    #[test]
    fn inline_time_window_midnight_wrap() {
        let cache = RegexCache::new();
        let windows = HashMap::new();
        let freq = FrequencyCounter::new(10);
        let ctx = base_ctx(); // hour=3
        let cond = Condition::Time(TimeConditionRef::Inline(TimeWindow {
            after: "23:00".into(),
            before: "08:00".into(),
            days: None,
        }));
        assert!(evaluate(&cond, &ctx, &deps(&cache, &windows, &freq)));
    }

    #[test]
    fn missing_context_field_yields_false_not_error() {
        let cache = RegexCache::new();
        let windows = HashMap::new();
        let freq = FrequencyCounter::new(10);
        let mut ctx = base_ctx();
        ctx.tool_name = None;
        let cond = Condition::Tool(ToolCondition { name: NameMatcher::Exact("exec".into()), params: vec![] });
        assert!(!evaluate(&cond, &ctx, &deps(&cache, &windows, &freq)));
    }

    #[test]
    fn any_short_circuits_and_not_inverts() {
        let cache = RegexCache::new();
        let windows = HashMap::new();
        let freq = FrequencyCounter::new(10);
        let ctx = base_ctx();
        let any = Condition::Any(vec![
            Condition::Tool(ToolCondition { name: NameMatcher::Exact("wrong".into()), params: vec![] }),
            Condition::Tool(ToolCondition { name: NameMatcher::Exact("exec".into()), params: vec![] }),
        ]);
        assert!(evaluate(&any, &ctx, &deps(&cache, &windows, &freq)));

        let not = Condition::Not(Box::new(Condition::Tool(ToolCondition {
            name: NameMatcher::Exact("exec".into()),
            params: vec![],
        })));
        assert!(!evaluate(&not, &ctx, &deps(&cache, &windows, &freq)));
    }

    #[test]
    fn frequency_threshold() {
        let cache = RegexCache::new();
        let windows = HashMap::new();
        let freq = FrequencyCounter::new(10);
        for i in 0..5 {
            freq.record(i * 1_000, "forge", "agent:forge:subagent:1", "exec");
        }
        let ctx = base_ctx();
        let d = deps(&cache, &windows, &freq);
        let cond = Condition::Frequency(FrequencyCondition {
            threshold: 5,
            window_seconds: 60,
            scope: aegis_core::types::FrequencyScope::Agent,
        });
        assert!(evaluate(&cond, &ctx, &d));
    }
}
