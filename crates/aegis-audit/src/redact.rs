//! Deep-copy redaction of sensitive tool parameters and message content
//! before an evaluation context is written to the audit log.

use aegis_core::types::EvaluationContext;
use regex::Regex;
use serde_json::{json, Map, Value};

const REDACTED: &str = "[REDACTED]";
const TRUNCATION_SUFFIX: &str = "[TRUNCATED at 500 chars]";
const MESSAGE_MAX_LEN: usize = 500;

fn sensitive_key_pattern() -> Regex {
    Regex::new(r"(?i)^(password|secret|token|apiKey|api_key|credential|auth|authorization)$")
        .expect("built-in redaction pattern is valid")
}

fn redact_value(value: &Value, sensitive_keys: &Regex, user_patterns: &[Regex]) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = Map::new();
            for (key, v) in map {
                if sensitive_keys.is_match(key) {
                    out.insert(key.clone(), json!(REDACTED));
                } else {
                    out.insert(key.clone(), redact_value(v, sensitive_keys, user_patterns));
                }
            }
            Value::Object(out)
        }
        Value::Array(items) => {
            Value::Array(items.iter().map(|v| redact_value(v, sensitive_keys, user_patterns)).collect())
        }
        Value::String(s) => {
            if user_patterns.iter().any(|p| p.is_match(s)) {
                json!(REDACTED)
            } else {
                Value::String(s.clone())
            }
        }
        other => other.clone(),
    }
}

fn truncate_message(content: &str) -> String {
    if content.chars().count() <= MESSAGE_MAX_LEN {
        return content.to_string();
    }
    let truncated: String = content.chars().take(MESSAGE_MAX_LEN).collect();
    format!("{truncated}{TRUNCATION_SUFFIX}")
}

/// Produce a redacted JSON snapshot of `ctx` suitable for durable storage:
/// sensitive `toolParams` keys become `"[REDACTED]"`, over-length message
/// content is truncated, and any configured user regex redacts matching
/// string leaves throughout.
#[must_use]
pub fn redact_context(ctx: &EvaluationContext, user_patterns: &[Regex]) -> Value {
    let sensitive_keys = sensitive_key_pattern();
    let tool_params = redact_value(&Value::Object(ctx.tool_params.clone()), &sensitive_keys, user_patterns);
    let message_content = ctx.message_content.as_deref().map(truncate_message).map(|s| redact_value(&json!(s), &sensitive_keys, user_patterns));
    let metadata = redact_value(&Value::Object(ctx.metadata.clone()), &sensitive_keys, user_patterns);

    json!({
        "hook": ctx.hook,
        "agent_id": ctx.agent_id,
        "session_key": ctx.session_key,
        "channel": ctx.channel,
        "tool_name": ctx.tool_name,
        "tool_params": tool_params,
        "message_content": message_content,
        "message_addressee": ctx.message_addressee,
        "metadata": metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::types::{HookKind, TimeContext, TrustSnapshot, TrustTier};
    use serde_json::Map as JsonMap;

    fn base_ctx() -> EvaluationContext {
        EvaluationContext {
            hook: HookKind::BeforeToolCall,
            agent_id: "forge".into(),
            session_key: "agent:forge".into(),
            channel: None,
            tool_name: Some("exec".into()),
            tool_params: JsonMap::new(),
            message_content: None,
            message_addressee: None,
            time: TimeContext { hour: 1, minute: 0, day_of_week: 0, date: "2026-08-01".into(), zone: "UTC".into() },
            now_us: 0,
            trust: TrustSnapshot { score: 50, tier: TrustTier::Standard },
            history: vec![],
            metadata: JsonMap::new(),
        }
    }

    #[test]
    fn sensitive_keys_are_redacted_case_insensitively() {
        let mut ctx = base_ctx();
        ctx.tool_params.insert("API_KEY".into(), json!("sk-live-123"));
        ctx.tool_params.insert("path".into(), json!("/tmp/x"));
        let redacted = redact_context(&ctx, &[]);
        assert_eq!(redacted["tool_params"]["API_KEY"], json!(REDACTED));
        assert_eq!(redacted["tool_params"]["path"], json!("/tmp/x"));
    }

    #[test]
    fn long_message_is_truncated_with_suffix() {
        let mut ctx = base_ctx();
        ctx.message_content = Some("x".repeat(600));
        let redacted = redact_context(&ctx, &[]);
        let content = redacted["message_content"].as_str().unwrap();
        assert!(content.ends_with(TRUNCATION_SUFFIX));
        assert_eq!(content.len(), MESSAGE_MAX_LEN + TRUNCATION_SUFFIX.len());
    }

    #[test]
    fn user_pattern_redacts_matching_string_leaves() {
        let mut ctx = base_ctx();
        ctx.tool_params.insert("path".into(), json!("/home/alice/.ssh/id_rsa"));
        let user_pattern = Regex::new(r"id_rsa").unwrap();
        let redacted = redact_context(&ctx, std::slice::from_ref(&user_pattern));
        assert_eq!(redacted["tool_params"]["path"], json!(REDACTED));
    }

    #[test]
    fn short_message_is_untouched() {
        let mut ctx = base_ctx();
        ctx.message_content = Some("hello".into());
        let redacted = redact_context(&ctx, &[]);
        assert_eq!(redacted["message_content"], json!("hello"));
    }
}
