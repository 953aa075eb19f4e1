//! Translates host-defined event shapes into [`EvaluationContext`]. Each
//! adapter is a small pure function so host-specific field names stay out
//! of `aegis-core`; the engine supplies the pieces it alone owns (current
//! trust snapshot, resolved time, the monotonic clock) at call time.

use aegis_core::types::{EvaluationContext, HookKind, TimeContext, TrustSnapshot};
use serde_json::{Map, Value};

/// Common fields every host event shape carries.
#[derive(Debug, Clone)]
pub struct EventEnvelope {
    /// The acting agent's id.
    pub agent_id: String,
    /// The session this action belongs to.
    pub session_key: String,
    /// Optional channel the action is scoped to.
    pub channel: Option<String>,
    /// Bounded recent conversation history, oldest first, untruncated.
    pub history: Vec<String>,
    /// Free-form metadata attached by the host.
    pub metadata: Map<String, Value>,
}

/// Payload specific to `before_tool_call`.
#[derive(Debug, Clone)]
pub struct ToolCallEvent {
    /// Shared envelope fields.
    pub envelope: EventEnvelope,
    /// The tool about to be invoked.
    pub tool_name: String,
    /// Its parameters.
    pub tool_params: Map<String, Value>,
}

/// Payload specific to `message_sending`.
#[derive(Debug, Clone)]
pub struct MessageEvent {
    /// Shared envelope fields.
    pub envelope: EventEnvelope,
    /// Outbound/inbound message content.
    pub content: String,
    /// Message addressee, if known.
    pub addressee: Option<String>,
}

fn truncated_history(history: Vec<String>, max_context_messages: usize) -> Vec<String> {
    if history.len() <= max_context_messages {
        return history;
    }
    history.into_iter().rev().take(max_context_messages).rev().collect()
}

#[allow(clippy::too_many_arguments)]
fn base_context(
    hook: HookKind,
    envelope: EventEnvelope,
    tool_name: Option<String>,
    tool_params: Map<String, Value>,
    message_content: Option<String>,
    message_addressee: Option<String>,
    time: TimeContext,
    now_us: i64,
    trust: TrustSnapshot,
    max_context_messages: usize,
) -> EvaluationContext {
    EvaluationContext {
        hook,
        agent_id: envelope.agent_id,
        session_key: envelope.session_key,
        channel: envelope.channel,
        tool_name,
        tool_params,
        message_content,
        message_addressee,
        time,
        now_us,
        trust,
        history: truncated_history(envelope.history, max_context_messages),
        metadata: envelope.metadata,
    }
}

/// Build the context for a `before_tool_call` evaluation.
#[must_use]
pub fn before_tool_call(
    event: ToolCallEvent,
    time: TimeContext,
    now_us: i64,
    trust: TrustSnapshot,
    max_context_messages: usize,
) -> EvaluationContext {
    base_context(
        HookKind::BeforeToolCall,
        event.envelope,
        Some(event.tool_name),
        event.tool_params,
        None,
        None,
        time,
        now_us,
        trust,
        max_context_messages,
    )
}

/// Build the context for a `message_sending` evaluation.
#[must_use]
pub fn message_sending(
    event: MessageEvent,
    time: TimeContext,
    now_us: i64,
    trust: TrustSnapshot,
    max_context_messages: usize,
) -> EvaluationContext {
    base_context(
        HookKind::MessageSending,
        event.envelope,
        None,
        Map::new(),
        Some(event.content),
        event.addressee,
        time,
        now_us,
        trust,
        max_context_messages,
    )
}

/// Build the context for a `before_agent_start` evaluation.
#[must_use]
pub fn before_agent_start(
    envelope: EventEnvelope,
    time: TimeContext,
    now_us: i64,
    trust: TrustSnapshot,
    max_context_messages: usize,
) -> EvaluationContext {
    base_context(HookKind::BeforeAgentStart, envelope, None, Map::new(), None, None, time, now_us, trust, max_context_messages)
}

/// Build the context for a `session_start` evaluation.
#[must_use]
pub fn session_start(
    envelope: EventEnvelope,
    time: TimeContext,
    now_us: i64,
    trust: TrustSnapshot,
    max_context_messages: usize,
) -> EvaluationContext {
    base_context(HookKind::SessionStart, envelope, None, Map::new(), None, None, time, now_us, trust, max_context_messages)
}
