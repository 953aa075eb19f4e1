//! The declarative policy/condition/effect model, the evaluation context,
//! trust records, and the verdict shape returned by the engine. These
//! types are intentionally host-agnostic — hook adapters in `aegis-engine`
//! translate host event shapes into [`EvaluationContext`].

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// The four hook kinds the host runtime calls the engine on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookKind {
    /// Immediately before a tool invocation is dispatched.
    BeforeToolCall,
    /// Immediately before an outbound message is sent.
    MessageSending,
    /// Immediately before a (sub-)agent session begins acting.
    BeforeAgentStart,
    /// Session creation.
    SessionStart,
}

/// Five-band trust classification in natural order
/// `Untrusted < Restricted < Standard < Trusted < Privileged`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustTier {
    /// score < 20
    Untrusted,
    /// 20 ≤ score < 40
    Restricted,
    /// 40 ≤ score < 60
    Standard,
    /// 60 ≤ score < 80
    Trusted,
    /// score ≥ 80
    Privileged,
}

impl TrustTier {
    /// Pure function mapping a clamped `[0,100]` score to its tier.
    #[must_use]
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=19 => Self::Untrusted,
            20..=39 => Self::Restricted,
            40..=59 => Self::Standard,
            60..=79 => Self::Trusted,
            _ => Self::Privileged,
        }
    }
}

/// Ordered risk bands, `Low < Medium < High < Critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskLevel {
    /// score ≤ 25
    Low,
    /// score ≤ 50
    Medium,
    /// score ≤ 75
    High,
    /// score > 75
    Critical,
}

impl RiskLevel {
    /// Band a clamped `[0,100]` score into a level.
    #[must_use]
    pub fn from_score(score: u8) -> Self {
        match score {
            0..=25 => Self::Low,
            26..=50 => Self::Medium,
            51..=75 => Self::High,
            _ => Self::Critical,
        }
    }
}

/// Scope restricting which `EvaluationContext`s a policy is even
/// considered for. An empty set on any field means "any".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scope {
    /// Agent ids this policy applies to; empty = any.
    #[serde(default)]
    pub agents: Vec<String>,
    /// Agent ids explicitly excluded regardless of `agents`.
    #[serde(default)]
    pub exclude_agents: Vec<String>,
    /// Channels this policy applies to; empty = any.
    #[serde(default)]
    pub channels: Vec<String>,
    /// Hook kinds this policy applies to; empty = any.
    #[serde(default)]
    pub hooks: Vec<HookKind>,
}

/// A name matcher used for tool names and agent ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameMatcher {
    /// Exact string equality.
    Exact(String),
    /// A `*`-glob pattern.
    Glob(String),
    /// Matches if the subject equals any entry.
    AnyOf(Vec<String>),
}

/// How a tool parameter value is compared against an expected value.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "op", content = "value")]
pub enum ParamMatcher {
    /// Strict equality (no string coercion).
    Equals(Value),
    /// String-coerced substring containment.
    Contains(String),
    /// Regex match against the string-coerced value.
    Matches(String),
    /// String-coerced prefix match.
    StartsWith(String),
    /// Element-wise equality against a set of allowed values.
    In(Vec<Value>),
}

/// A single `tool` condition: a name matcher plus zero or more
/// parameter-key matchers (all of which must hold).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolCondition {
    /// Matcher against the tool's name.
    pub name: NameMatcher,
    /// Parameter key → matcher; all must hold.
    #[serde(default)]
    pub params: Vec<(String, ParamMatcher)>,
}

/// Day-of-week, Monday = 0, matching `chrono::Weekday::num_days_from_monday`.
pub type DayOfWeek = u32;

/// An inline time window with optional day-of-week restriction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeWindow {
    /// `"HH:MM"` start of the window.
    pub after: String,
    /// `"HH:MM"` end of the window; `after > before` denotes midnight wrap.
    pub before: String,
    /// Restrict the window to these days; `None` = every day.
    #[serde(default)]
    pub days: Option<Vec<DayOfWeek>>,
}

/// A `time` condition: either a named window looked up in the engine's
/// configured window table, or an inline window.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeConditionRef {
    /// Look up a window by name in `EvalDeps::time_windows`.
    Named(String),
    /// An inline window.
    Inline(TimeWindow),
}

/// An `agent` condition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCondition {
    /// Matcher against the agent id.
    pub id: NameMatcher,
    /// Restrict to these tiers; empty = any.
    #[serde(default)]
    pub tiers: Vec<TrustTier>,
    /// Inclusive `[min,max]` score range.
    #[serde(default)]
    pub score_range: Option<(u8, u8)>,
}

/// A `context` condition, covering conversation history, message content,
/// metadata presence, channel membership, and session-key globbing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextCondition {
    /// Substring present in the bounded conversation history.
    HistoryContains(String),
    /// Regex matches somewhere in the bounded conversation history.
    HistoryMatches(String),
    /// Substring present in the outbound/inbound message content.
    MessageContains(String),
    /// Regex matches the message content.
    MessageMatches(String),
    /// A metadata key is present (value is not inspected).
    MetadataHasKey(String),
    /// The context's channel is one of these.
    ChannelIn(Vec<String>),
    /// The session key matches this glob.
    SessionKeyGlob(String),
}

/// Which frequency-counter scope a `frequency` condition tallies over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrequencyScope {
    /// Count entries for this agent id across all sessions.
    Agent,
    /// Count entries for this session key.
    Session,
    /// Count all entries regardless of agent/session.
    Global,
}

/// A `frequency` condition: matches when the windowed count meets or
/// exceeds `threshold`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrequencyCondition {
    /// Minimum count (inclusive) for the condition to hold.
    pub threshold: u32,
    /// Window size in seconds.
    pub window_seconds: u64,
    /// Which scope to tally over.
    pub scope: FrequencyScope,
}

/// The closed set of condition kinds. `Any`/`Not` compose other
/// conditions; every other variant is a leaf matcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Condition {
    /// Tool name/parameter matcher (only meaningful for tool hooks).
    Tool(ToolCondition),
    /// Time-of-day / day-of-week window.
    Time(TimeConditionRef),
    /// Agent id/tier/score matcher.
    Agent(AgentCondition),
    /// Conversation/message/metadata/channel/session matcher.
    Context(ContextCondition),
    /// Inclusive risk-band range, `[min,max]`.
    Risk {
        /// Lower bound (inclusive).
        min: RiskLevel,
        /// Upper bound (inclusive).
        max: RiskLevel,
    },
    /// Windowed frequency threshold.
    Frequency(FrequencyCondition),
    /// OR over sub-conditions; short-circuits on first true.
    Any(Vec<Condition>),
    /// Negation of a single inner condition.
    Not(Box<Condition>),
}

/// What happens if an `escalate` effect times out before a human/LLM
/// response arrives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackAction {
    /// Treat the timeout as an allow.
    Allow,
    /// Treat the timeout as a deny.
    Deny,
}

/// Verbosity requested by an `audit` effect. Audit effects never block;
/// they only influence what gets recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditVerbosity {
    /// Minimal record.
    Minimal,
    /// Default record shape.
    Standard,
    /// Full record including bounded history/metadata.
    Verbose,
}

/// The action a matched rule contributes to policy aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Effect {
    /// Permit the action.
    Allow,
    /// Block the action with a human-readable reason.
    Deny {
        /// Surfaced verbatim to the host/operator.
        reason: String,
    },
    /// Require external confirmation before the action may proceed.
    Escalate {
        /// Named escalation target (e.g. an approval queue).
        target: String,
        /// Disposition applied if the escalation times out.
        #[serde(default)]
        fallback: Option<FallbackAction>,
        /// Timeout in seconds before `fallback` applies.
        #[serde(default)]
        timeout_seconds: Option<u64>,
    },
    /// Observational only; never blocks the action.
    Audit {
        /// Requested record verbosity.
        verbosity: AuditVerbosity,
    },
}

impl Effect {
    /// Coarse classification used for deny-wins aggregation ordering.
    #[must_use]
    pub fn kind_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny { .. } => "deny",
            Self::Escalate { .. } => "escalate",
            Self::Audit { .. } => "audit",
        }
    }
}

/// A single rule within a policy: an AND-combined condition list, an
/// effect, and optional trust-tier gates.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    /// Identifier, unique within the owning policy.
    pub id: String,
    /// AND-combined conditions; empty means "always matches".
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// The effect this rule contributes when it matches.
    pub effect: Effect,
    /// Minimum trust tier (inclusive) required for this rule to apply.
    #[serde(default)]
    pub min_trust: Option<TrustTier>,
    /// Maximum trust tier (inclusive) allowed for this rule to apply.
    #[serde(default)]
    pub max_trust: Option<TrustTier>,
}

fn default_priority() -> i32 {
    0
}

fn default_enabled() -> bool {
    true
}

/// A declarative policy: a scope, a priority, and an ordered rule list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Stable identifier.
    pub id: String,
    /// Semantic version of this policy document.
    pub version: String,
    /// Human-readable name.
    pub name: String,
    /// Higher priority wins when multiple policies contribute an effect.
    #[serde(default = "default_priority")]
    pub priority: i32,
    /// Disabled policies are never resolved for evaluation.
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Scope restricting applicability.
    #[serde(default)]
    pub scope: Scope,
    /// Rules evaluated in declared order; the first match wins.
    pub rules: Vec<Rule>,
}

/// Bounded recent event in an agent's trust history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustEvent {
    /// Wall-clock milliseconds when the event was recorded.
    pub at_ms: u64,
    /// Signed contribution to the raw score at the time of recording.
    pub delta: f64,
    /// What kind of signal this was.
    pub kind: TrustEventKind,
    /// Optional free-text context (e.g. the violated policy id).
    #[serde(default)]
    pub note: Option<String>,
}

/// The kinds of signal that can appear in an agent's trust history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrustEventKind {
    /// A successfully completed action.
    Success,
    /// A policy violation.
    Violation,
    /// An escalation that was approved.
    EscalationApproved,
    /// An escalation that was denied.
    EscalationDenied,
    /// An operator-issued manual adjustment.
    ManualAdjustment,
    /// Automatic score decay due to inactivity.
    Decay,
}

fn default_max_history() -> usize {
    100
}

/// Per-agent trust record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentTrust {
    /// The agent this record belongs to.
    pub agent_id: String,
    /// Current score, always clamped to `[0,100]`.
    pub score: u8,
    /// Tier derived from `score`, unless `locked_tier` overrides it.
    pub tier: TrustTier,
    /// Count of recorded successes.
    pub success_count: u64,
    /// Count of recorded violations.
    pub violation_count: u64,
    /// Count of approved escalations.
    pub approved_escalations: u64,
    /// Count of denied escalations.
    pub denied_escalations: u64,
    /// Days since the agent's first evaluation.
    pub age_days: u64,
    /// Consecutive days without a violation.
    pub clean_streak_days: u64,
    /// Cumulative operator-issued manual adjustment.
    pub manual_adjustment: f64,
    /// Ring-limited recent history, newest last.
    #[serde(default)]
    pub history: VecDeque<TrustEvent>,
    /// Creation timestamp, wall-clock milliseconds.
    pub created_at_ms: u64,
    /// Timestamp of the most recent evaluation.
    pub last_evaluated_at_ms: u64,
    /// When set, overrides the derived tier.
    #[serde(default)]
    pub locked_tier: Option<TrustTier>,
    /// When set, clamps the score from below.
    #[serde(default)]
    pub floor: Option<u8>,
    /// Maximum history length before the oldest events are dropped.
    #[serde(default = "default_max_history")]
    pub max_history: usize,
}

impl AgentTrust {
    /// The tier actually in effect: `locked_tier` if set, else
    /// `TrustTier::from_score(score)`.
    #[must_use]
    pub fn effective_tier(&self) -> TrustTier {
        self.locked_tier.unwrap_or(self.tier)
    }

    /// Push a history event, evicting the oldest entry if at capacity.
    pub fn push_history(&mut self, event: TrustEvent) {
        if self.history.len() >= self.max_history {
            self.history.pop_front();
        }
        self.history.push_back(event);
    }
}

/// Versioned on-disk envelope for the trust store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrustStoreEnvelope {
    /// Schema version; currently always 1.
    pub version: u32,
    /// ISO-8601 timestamp of the last write.
    pub updated: String,
    /// Per-agent trust records, keyed by agent id.
    pub agents: std::collections::HashMap<String, AgentTrust>,
}

/// A compact snapshot of trust used in verdicts and audit records.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TrustSnapshot {
    /// Score at decision time.
    pub score: u8,
    /// Tier at decision time.
    pub tier: TrustTier,
}

/// The five weighted risk factors, each already scaled to its weight.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct RiskFactors {
    /// Tool sensitivity contribution, max 30.
    pub tool_sensitivity: f64,
    /// Off-hours contribution, 0 or 15.
    pub time_of_day: f64,
    /// Trust-deficit contribution, max 20.
    pub trust_deficit: f64,
    /// Recent-frequency contribution, max 15.
    pub frequency: f64,
    /// External-target contribution, 0 or 20.
    pub target_scope: f64,
}

impl RiskFactors {
    /// Sum of all factors, not yet rounded/clamped.
    #[must_use]
    pub fn total(&self) -> f64 {
        self.tool_sensitivity + self.time_of_day + self.trust_deficit + self.frequency + self.target_scope
    }
}

/// The outcome of the risk assessor: a bounded score, its band, and the
/// per-factor breakdown.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RiskAssessment {
    /// Rounded, clamped `[0,100]` total.
    pub score: u8,
    /// Band derived from `score`.
    pub level: RiskLevel,
    /// Per-factor breakdown before rounding.
    pub factors: RiskFactors,
}

/// Wall-clock components in a configured IANA timezone.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeContext {
    /// Hour of day, 0-23, local to `zone`.
    pub hour: u32,
    /// Minute of hour, 0-59.
    pub minute: u32,
    /// Day of week, Monday = 0.
    pub day_of_week: u32,
    /// ISO calendar date, local to `zone`.
    pub date: String,
    /// The resolved IANA zone name (or `"UTC"` on fallback).
    pub zone: String,
}

impl TimeContext {
    /// Minutes since local midnight, derived from `hour`/`minute`.
    #[must_use]
    pub fn minutes_of_day(&self) -> i32 {
        (self.hour * 60 + self.minute) as i32
    }
}

/// Immutable per-call evaluation context. Hook adapters build this from
/// host-specific event shapes; nothing downstream mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluationContext {
    /// Which hook triggered this evaluation.
    pub hook: HookKind,
    /// The acting agent's id.
    pub agent_id: String,
    /// The session this action belongs to.
    pub session_key: String,
    /// Optional channel the action is scoped to.
    #[serde(default)]
    pub channel: Option<String>,
    /// Tool name, present for `BeforeToolCall`.
    #[serde(default)]
    pub tool_name: Option<String>,
    /// Tool parameters, present for `BeforeToolCall`.
    #[serde(default)]
    pub tool_params: Map<String, Value>,
    /// Outbound/inbound message content, present for `MessageSending`.
    #[serde(default)]
    pub message_content: Option<String>,
    /// Message addressee, present for `MessageSending`.
    #[serde(default)]
    pub message_addressee: Option<String>,
    /// Current wall-clock components in the configured timezone.
    pub time: TimeContext,
    /// Monotonic timestamp captured at context construction.
    pub now_us: i64,
    /// The acting agent's current trust snapshot.
    pub trust: TrustSnapshot,
    /// Bounded recent conversation history, oldest first.
    #[serde(default)]
    pub history: Vec<String>,
    /// Free-form metadata attached by the host.
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// One policy/rule/effect tuple contributing to a verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchedPolicy {
    /// The contributing policy's id.
    pub policy_id: String,
    /// The matched rule's id.
    pub rule_id: String,
    /// Coarse effect kind (`allow`|`deny`|`escalate`|`audit`).
    pub effect_kind: String,
}

/// The verdict's disposition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Proceed.
    Allow,
    /// Block.
    Deny,
    /// Require external confirmation.
    Escalate,
}

/// Escalation details carried by an `Escalate` verdict.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EscalationInfo {
    /// Named escalation target.
    pub target: String,
    /// Disposition applied on timeout.
    pub fallback: Option<FallbackAction>,
    /// Timeout in seconds.
    pub timeout_seconds: Option<u64>,
}

/// The result of one `evaluate()` call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verdict {
    /// The disposition.
    pub action: Action,
    /// Human-readable reason.
    pub reason: String,
    /// Risk assessment computed for this context.
    pub risk: RiskAssessment,
    /// Every policy/rule that contributed an effect.
    pub matched_policies: Vec<MatchedPolicy>,
    /// Trust snapshot at decision time.
    pub trust: TrustSnapshot,
    /// Wall-clock cost of evaluation, in microseconds.
    pub evaluation_us: u64,
    /// Present only when `action == Escalate`.
    #[serde(default)]
    pub escalation: Option<EscalationInfo>,
}
