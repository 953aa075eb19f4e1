//! Turns declared policies (plus enabled built-in templates) into an
//! immutable, scope-keyed index with a shared regex cache. The index is
//! never mutated after [`compile`] returns; a reload replaces it wholesale.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use aegis_core::types::{Condition, ContextCondition, HookKind, Policy, Rule};

use crate::builtins::{self, BuiltinToggles};
use crate::error::PolicyError;
use crate::regex_cache::RegexCache;

/// Derived, read-only lookup structure built from a set of policies.
pub struct PolicyIndex {
    /// Hook kind → policies whose scope includes that hook (or is unscoped).
    pub by_hook: HashMap<HookKind, Vec<Arc<Policy>>>,
    /// Agent id → policies targeting that id; `"*"` holds unscoped policies.
    pub by_agent: HashMap<String, Vec<Arc<Policy>>>,
    /// Shared regex cache populated while compiling condition patterns.
    pub regex_cache: RegexCache,
}

impl PolicyIndex {
    /// Total number of distinct policies indexed (after dedup/skip).
    #[must_use]
    pub fn policy_count(&self) -> usize {
        let mut ids = HashSet::new();
        for list in self.by_hook.values() {
            ids.extend(list.iter().map(|p| p.id.clone()));
        }
        ids.len()
    }
}

fn all_hooks() -> [HookKind; 4] {
    [HookKind::BeforeToolCall, HookKind::MessageSending, HookKind::BeforeAgentStart, HookKind::SessionStart]
}

/// Structural validation: unique rule ids, non-empty escalation targets,
/// non-empty deny reasons are allowed (the evaluator supplies a default)
/// but the policy itself must declare at least one rule.
fn validate_policy(policy: &Policy) -> Result<(), PolicyError> {
    if policy.rules.is_empty() {
        return Err(PolicyError::ConfigInvalid { policy_id: policy.id.clone(), reason: "policy has no rules".into() });
    }
    let mut seen = HashSet::new();
    for rule in &policy.rules {
        if !seen.insert(rule.id.clone()) {
            return Err(PolicyError::ConfigInvalid {
                policy_id: policy.id.clone(),
                reason: format!("duplicate rule id '{}'", rule.id),
            });
        }
        if let aegis_core::types::Effect::Escalate { target, .. } = &rule.effect {
            if target.trim().is_empty() {
                return Err(PolicyError::ConfigInvalid {
                    policy_id: policy.id.clone(),
                    reason: format!("rule '{}' has an empty escalation target", rule.id),
                });
            }
        }
    }
    Ok(())
}

/// Walk a rule's conditions and warm the regex cache for every pattern
/// source (glob or `matches`) it references. A pattern that fails
/// validation is still recorded — as a never-matching marker — so the
/// first real lookup at evaluation time is free.
fn warm_regexes(rule: &Rule, cache: &RegexCache) {
    for condition in &rule.conditions {
        warm_condition(condition, cache);
    }
}

fn warm_condition(condition: &Condition, cache: &RegexCache) {
    match condition {
        Condition::Tool(tc) => {
            if let aegis_core::types::NameMatcher::Glob(g) = &tc.name {
                cache.get_or_compile(&aegis_core::util::glob_to_regex(g));
            }
            for (_, matcher) in &tc.params {
                if let aegis_core::types::ParamMatcher::Matches(pattern) = matcher {
                    cache.get_or_compile(pattern);
                }
            }
        }
        Condition::Agent(ac) => {
            if let aegis_core::types::NameMatcher::Glob(g) = &ac.id {
                cache.get_or_compile(&aegis_core::util::glob_to_regex(g));
            }
        }
        Condition::Context(cc) => match cc {
            ContextCondition::HistoryMatches(p) | ContextCondition::MessageMatches(p) => {
                cache.get_or_compile(p);
            }
            ContextCondition::SessionKeyGlob(g) => {
                cache.get_or_compile(&aegis_core::util::glob_to_regex(g));
            }
            _ => {}
        },
        Condition::Any(subs) => subs.iter().for_each(|c| warm_condition(c, cache)),
        Condition::Not(inner) => warm_condition(inner, cache),
        Condition::Time(_) | Condition::Risk { .. } | Condition::Frequency(_) => {}
    }
}

/// Compile declared policies plus enabled built-in templates into an
/// immutable index. Declared policies win over built-ins sharing an id.
/// Policies failing structural validation are skipped (each producing one
/// [`PolicyError`]); the compiler continues with the rest.
#[must_use]
pub fn compile(declared: Vec<Policy>, toggles: &BuiltinToggles) -> (PolicyIndex, Vec<PolicyError>) {
    let declared_ids: HashSet<String> = declared.iter().map(|p| p.id.clone()).collect();
    let mut all = declared;
    for builtin in builtins::generate(toggles) {
        if !declared_ids.contains(&builtin.id) {
            all.push(builtin);
        }
    }

    let regex_cache = RegexCache::new();
    let mut errors = Vec::new();
    let mut by_hook: HashMap<HookKind, Vec<Arc<Policy>>> = all_hooks().into_iter().map(|h| (h, Vec::new())).collect();
    let mut by_agent: HashMap<String, Vec<Arc<Policy>>> = HashMap::new();

    for policy in all {
        if let Err(e) = validate_policy(&policy) {
            tracing::warn!(policy_id = %policy.id, "skipping invalid policy: {e}");
            errors.push(e);
            continue;
        }
        for rule in &policy.rules {
            warm_regexes(rule, &regex_cache);
        }

        let policy = Arc::new(policy);
        let hooks: Vec<HookKind> =
            if policy.scope.hooks.is_empty() { all_hooks().to_vec() } else { policy.scope.hooks.clone() };
        for hook in hooks {
            by_hook.entry(hook).or_default().push(policy.clone());
        }
        let agents: Vec<String> =
            if policy.scope.agents.is_empty() { vec!["*".to_string()] } else { policy.scope.agents.clone() };
        for agent in agents {
            by_agent.entry(agent).or_default().push(policy.clone());
        }
    }

    (PolicyIndex { by_hook, by_agent, regex_cache }, errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::types::{Effect, Scope};

    fn minimal_policy(id: &str) -> Policy {
        Policy {
            id: id.into(),
            version: "1.0.0".into(),
            name: id.into(),
            priority: 0,
            enabled: true,
            scope: Scope::default(),
            rules: vec![Rule { id: "r1".into(), conditions: vec![], effect: Effect::Allow, min_trust: None, max_trust: None }],
        }
    }

    #[test]
    fn unscoped_policy_lands_in_every_hook_and_wildcard_agent() {
        let (index, errors) = compile(vec![minimal_policy("p1")], &BuiltinToggles::default());
        assert!(errors.is_empty());
        for hook in all_hooks() {
            assert!(index.by_hook[&hook].iter().any(|p| p.id == "p1"));
        }
        assert!(index.by_agent["*"].iter().any(|p| p.id == "p1"));
    }

    #[test]
    fn declared_policy_wins_over_builtin_with_same_id() {
        let mut custom = minimal_policy("builtin-night-mode");
        custom.name = "Custom Night Mode".into();
        let (index, _) = compile(vec![custom], &BuiltinToggles { night_mode: true, ..Default::default() });
        let found = index.by_hook[&HookKind::BeforeToolCall].iter().find(|p| p.id == "builtin-night-mode").unwrap();
        assert_eq!(found.name, "Custom Night Mode");
    }

    #[test]
    fn invalid_policy_is_skipped_not_fatal() {
        let mut bad = minimal_policy("bad");
        bad.rules.clear();
        let (index, errors) = compile(vec![bad, minimal_policy("good")], &BuiltinToggles::default());
        assert_eq!(errors.len(), 1);
        assert!(index.by_agent["*"].iter().any(|p| p.id == "good"));
        assert!(!index.by_agent["*"].iter().any(|p| p.id == "bad"));
    }
}
