//! Resolves effective policies for an [`EvaluationContext`], evaluates
//! their rules, and aggregates the results deny-wins.

use std::collections::{HashMap, HashSet};

use aegis_core::types::{
    Action, Effect, EvaluationContext, EscalationInfo, MatchedPolicy, Policy, RiskAssessment, TimeWindow, Verdict,
};
use aegis_core::FrequencyCounter;

use crate::compiler::PolicyIndex;
use crate::condition::{evaluate_all, EvalDeps};

/// A rule that matched, paired with the policy it belongs to, kept around
/// long enough to aggregate and to build [`MatchedPolicy`] records.
struct Contribution<'a> {
    policy: &'a Policy,
    rule_id: &'a str,
    effect: &'a Effect,
}

fn specificity(policy: &Policy) -> u32 {
    let mut score = 0;
    if !policy.scope.agents.is_empty() {
        score += 2;
    }
    if !policy.scope.channels.is_empty() {
        score += 1;
    }
    if !policy.scope.hooks.is_empty() {
        score += 1;
    }
    score
}

/// Collect the policies applicable to this context: union of the
/// hook-indexed and agent-indexed (specific id plus wildcard) lists,
/// deduplicated by id, with `exclude_agents`/`channels`/`enabled` scope
/// filters applied, sorted by priority desc, then specificity desc,
/// stable on ties (preserves declaration order within the index).
fn resolve_effective_policies<'a>(index: &'a PolicyIndex, ctx: &EvaluationContext) -> Vec<&'a Policy> {
    let mut seen = HashSet::new();
    let mut out: Vec<&Policy> = Vec::new();

    let hook_list = index.by_hook.get(&ctx.hook).into_iter().flatten();
    let agent_list = index
        .by_agent
        .get(&ctx.agent_id)
        .into_iter()
        .flatten()
        .chain(index.by_agent.get("*").into_iter().flatten());

    for policy in hook_list.chain(agent_list) {
        if !seen.insert(policy.id.clone()) {
            continue;
        }
        if !policy.enabled {
            continue;
        }
        if policy.scope.exclude_agents.iter().any(|a| a == &ctx.agent_id) {
            continue;
        }
        if !policy.scope.channels.is_empty() {
            let Some(channel) = ctx.channel.as_deref() else { continue };
            if !policy.scope.channels.iter().any(|c| c == channel) {
                continue;
            }
        }
        out.push(policy.as_ref());
    }

    out.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| specificity(b).cmp(&specificity(a))));
    out
}

/// Evaluate every effective policy's rules against `ctx`, returning the
/// first matching rule per policy (rules are tried in declared order).
fn matching_contributions<'a>(
    policies: &[&'a Policy],
    ctx: &EvaluationContext,
    deps: &EvalDeps<'_>,
) -> Vec<Contribution<'a>> {
    let mut out = Vec::new();
    for policy in policies {
        for rule in &policy.rules {
            if let Some(min) = rule.min_trust {
                if ctx.trust.tier < min {
                    continue;
                }
            }
            if let Some(max) = rule.max_trust {
                if ctx.trust.tier > max {
                    continue;
                }
            }
            if evaluate_all(&rule.conditions, ctx, deps) {
                out.push(Contribution { policy, rule_id: &rule.id, effect: &rule.effect });
                break;
            }
        }
    }
    out
}

/// Deny-wins aggregation: the highest-priority (already sorted)
/// deny contribution wins outright; absent any deny, the first escalate
/// wins; absent either, allow. Every contribution (including audit-only
/// ones) is recorded in `matched_policies` regardless of which wins.
fn aggregate(contributions: &[Contribution<'_>]) -> (Action, String, Option<EscalationInfo>) {
    if let Some(c) = contributions.iter().find(|c| matches!(c.effect, Effect::Deny { .. })) {
        let Effect::Deny { reason } = c.effect else { unreachable!() };
        let reason = if reason.trim().is_empty() {
            format!("denied by policy '{}' rule '{}'", c.policy.id, c.rule_id)
        } else {
            reason.clone()
        };
        return (Action::Deny, reason, None);
    }
    if let Some(c) = contributions.iter().find(|c| matches!(c.effect, Effect::Escalate { .. })) {
        let Effect::Escalate { target, fallback, timeout_seconds } = c.effect else { unreachable!() };
        let reason = format!("escalated by policy '{}' rule '{}'", c.policy.id, c.rule_id);
        let info = EscalationInfo { target: target.clone(), fallback: *fallback, timeout_seconds: *timeout_seconds };
        return (Action::Escalate, reason, Some(info));
    }
    let reason = if contributions.is_empty() { "No matching policies" } else { "Allowed by governance policy" };
    (Action::Allow, reason.to_string(), None)
}

/// Evaluate `ctx` against the compiled index: resolve effective policies,
/// match rules, aggregate deny-wins, and assemble the full [`Verdict`].
/// `risk` must already have been computed for this context.
#[must_use]
pub fn evaluate(
    index: &PolicyIndex,
    ctx: &EvaluationContext,
    risk: &RiskAssessment,
    time_windows: &HashMap<String, TimeWindow>,
    frequency: &FrequencyCounter,
    now_ms: u64,
) -> Verdict {
    let start_us = aegis_core::util::now_us();

    let deps = EvalDeps { regex_cache: &index.regex_cache, time_windows, frequency, risk: Some(risk), now_ms };

    let effective = resolve_effective_policies(index, ctx);
    let contributions = matching_contributions(&effective, ctx, &deps);
    let (action, reason, escalation) = aggregate(&contributions);

    let matched_policies = contributions
        .iter()
        .map(|c| MatchedPolicy {
            policy_id: c.policy.id.clone(),
            rule_id: c.rule_id.to_string(),
            effect_kind: c.effect.kind_str().to_string(),
        })
        .collect();

    let evaluation_us = (aegis_core::util::now_us() - start_us).max(0) as u64;

    Verdict { action, reason, risk: *risk, matched_policies, trust: ctx.trust, evaluation_us, escalation }
}
