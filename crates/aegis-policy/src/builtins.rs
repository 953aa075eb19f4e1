//! Parameterised built-in policy templates. Each is a plain function
//! returning a [`Policy`] value so it compile-checks against exactly the
//! same types as a declared policy — there is no separate template
//! language.

use aegis_core::types::{
    Condition, Effect, FallbackAction, FrequencyCondition, FrequencyScope, HookKind, NameMatcher,
    ParamMatcher, Policy, Rule, Scope, TimeConditionRef, TimeWindow, ToolCondition,
};
use serde::{Deserialize, Serialize};

/// Which built-in templates are enabled, mirroring the
/// `builtinPolicies.{nightMode,credentialGuard,productionSafeguard,rateLimiter}`
/// configuration surface.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuiltinToggles {
    /// Deny tool calls during the configured off-hours window.
    #[serde(default)]
    pub night_mode: bool,
    /// Deny reads/edits/writes that look like they target credential material.
    #[serde(default)]
    pub credential_guard: bool,
    /// Escalate changes that look production-targeted.
    #[serde(default)]
    pub production_safeguard: bool,
    /// Deny once an agent exceeds a per-minute action rate.
    #[serde(default)]
    pub rate_limiter: bool,
}

/// Generate the `Policy` values for every enabled toggle.
#[must_use]
pub fn generate(toggles: &BuiltinToggles) -> Vec<Policy> {
    let mut policies = Vec::new();
    if toggles.night_mode {
        policies.push(night_mode());
    }
    if toggles.credential_guard {
        policies.push(credential_guard());
    }
    if toggles.production_safeguard {
        policies.push(production_safeguard());
    }
    if toggles.rate_limiter {
        policies.push(rate_limiter());
    }
    policies
}

/// Deny tool calls between 23:00 and 08:00 local time.
#[must_use]
pub fn night_mode() -> Policy {
    Policy {
        id: "builtin-night-mode".into(),
        version: "1.0.0".into(),
        name: "Night Mode".into(),
        priority: 0,
        enabled: true,
        scope: Scope { hooks: vec![HookKind::BeforeToolCall], ..Scope::default() },
        rules: vec![Rule {
            id: "deny-off-hours".into(),
            conditions: vec![Condition::Time(TimeConditionRef::Inline(TimeWindow {
                after: "23:00".into(),
                before: "08:00".into(),
                days: None,
            }))],
            effect: Effect::Deny { reason: "Action blocked by night mode policy (23:00-08:00)".into() },
            min_trust: None,
            max_trust: None,
        }],
    }
}

/// Deny reads/writes/edits whose `path` parameter looks like credential
/// material.
#[must_use]
pub fn credential_guard() -> Policy {
    Policy {
        id: "builtin-credential-guard".into(),
        version: "1.0.0".into(),
        name: "Credential Guard".into(),
        priority: 50,
        enabled: true,
        scope: Scope { hooks: vec![HookKind::BeforeToolCall], ..Scope::default() },
        rules: vec![Rule {
            id: "deny-credential-path".into(),
            conditions: vec![Condition::Tool(ToolCondition {
                name: NameMatcher::AnyOf(vec!["read".into(), "edit".into(), "write".into()]),
                params: vec![(
                    "path".into(),
                    ParamMatcher::Matches(r"(?i)(\.env$|\.pem$|id_rsa|credential|secret)".into()),
                )],
            })],
            effect: Effect::Deny {
                reason: "Action blocked: target path appears to reference protected credential material".into(),
            },
            min_trust: None,
            max_trust: None,
        }],
    }
}

/// Escalate (fail closed on timeout) tool calls that look
/// production-targeted via an `environment` parameter.
#[must_use]
pub fn production_safeguard() -> Policy {
    Policy {
        id: "builtin-production-safeguard".into(),
        version: "1.0.0".into(),
        name: "Production Safeguard".into(),
        priority: 40,
        enabled: true,
        scope: Scope { hooks: vec![HookKind::BeforeToolCall], ..Scope::default() },
        rules: vec![Rule {
            id: "escalate-production-change".into(),
            conditions: vec![Condition::Tool(ToolCondition {
                name: NameMatcher::AnyOf(vec!["exec".into(), "write".into(), "edit".into(), "cron".into()]),
                params: vec![("environment".into(), ParamMatcher::Matches("(?i)^prod".into()))],
            })],
            effect: Effect::Escalate {
                target: "production-change-review".into(),
                fallback: Some(FallbackAction::Deny),
                timeout_seconds: Some(300),
            },
            min_trust: None,
            max_trust: None,
        }],
    }
}

/// Deny once an agent exceeds five actions within sixty seconds.
#[must_use]
pub fn rate_limiter() -> Policy {
    Policy {
        id: "builtin-rate-limiter".into(),
        version: "1.0.0".into(),
        name: "Rate Limiter".into(),
        priority: 10,
        enabled: true,
        scope: Scope { hooks: vec![HookKind::BeforeToolCall], ..Scope::default() },
        rules: vec![Rule {
            id: "deny-over-rate".into(),
            conditions: vec![Condition::Frequency(FrequencyCondition {
                threshold: 5,
                window_seconds: 60,
                scope: FrequencyScope::Agent,
            })],
            effect: Effect::Deny { reason: "Rate limit exceeded: more than 5 actions in 60 seconds".into() },
            min_trust: None,
            max_trust: None,
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggles_control_which_policies_generate() {
        let none = generate(&BuiltinToggles::default());
        assert!(none.is_empty());

        let all = generate(&BuiltinToggles {
            night_mode: true,
            credential_guard: true,
            production_safeguard: true,
            rate_limiter: true,
        });
        assert_eq!(all.len(), 4);
    }
}
