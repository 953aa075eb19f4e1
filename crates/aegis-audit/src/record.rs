//! The audit record shape and the hash-chain computation.

use aegis_core::types::{HookKind, MatchedPolicy, RiskAssessment, TrustSnapshot};
use aegis_core::util::sha256_hex;
use serde::{Deserialize, Serialize};

/// A single tamper-evident audit entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Monotonically increasing sequence number, 1-based.
    pub sequence: u64,
    /// Process-unique record id.
    pub id: String,
    /// Hash of the previous record in the chain (all-zero at sequence 1).
    pub prev_hash: String,
    /// This record's own hash.
    pub hash: String,
    /// Wall-clock milliseconds at emission.
    pub wall_ms: u64,
    /// ISO-8601 timestamp at emission.
    pub timestamp: String,
    /// The final verdict kind (`allow`/`deny`/`escalate`/`error_fallback`).
    pub verdict: String,
    /// The acting agent's id.
    pub agent_id: String,
    /// Which hook produced this evaluation.
    pub hook: HookKind,
    /// Tool name, when the hook was a tool call.
    #[serde(default)]
    pub tool_name: Option<String>,
    /// Redacted context snapshot.
    pub context: serde_json::Value,
    /// Trust snapshot at decision time.
    pub trust: TrustSnapshot,
    /// Risk assessment at decision time.
    pub risk: RiskAssessment,
    /// Every policy/rule that contributed an effect.
    pub matched_policies: Vec<MatchedPolicy>,
    /// Evaluation cost, in microseconds.
    pub evaluation_us: u64,
    /// Whether an LLM extension was consulted while producing this verdict.
    #[serde(default)]
    pub llm_consulted: bool,
    /// Compliance control identifiers attached at emission time.
    #[serde(default)]
    pub compliance_controls: Vec<String>,
}

/// Everything needed to assemble a record, besides the chain position.
pub struct RecordInputs<'a> {
    /// Wall-clock milliseconds at emission.
    pub wall_ms: u64,
    /// The final verdict kind.
    pub verdict: &'a str,
    /// The acting agent's id.
    pub agent_id: &'a str,
    /// Which hook produced this evaluation.
    pub hook: HookKind,
    /// Tool name, when applicable.
    pub tool_name: Option<&'a str>,
    /// Redacted context snapshot.
    pub context: serde_json::Value,
    /// Trust snapshot at decision time.
    pub trust: TrustSnapshot,
    /// Risk assessment at decision time.
    pub risk: RiskAssessment,
    /// Matched policy/rule/effect tuples.
    pub matched_policies: Vec<MatchedPolicy>,
    /// Evaluation cost, in microseconds.
    pub evaluation_us: u64,
    /// Whether an LLM extension was consulted.
    pub llm_consulted: bool,
    /// Compliance control identifiers.
    pub compliance_controls: Vec<String>,
}

/// Compute `sha256_hex(seq|wall_ms|verdict|agent_id|hook|tool_name_or_empty|prev_hash)`
/// with `|` as a literal separator.
#[must_use]
pub fn compute_hash(sequence: u64, prev_hash: &str, inputs: &RecordInputs<'_>) -> String {
    let hook = serde_json::to_value(inputs.hook).ok().and_then(|v| v.as_str().map(str::to_string)).unwrap_or_default();
    let tool_name = inputs.tool_name.unwrap_or("");
    let material = format!(
        "{}|{}|{}|{}|{}|{}|{}",
        sequence, inputs.wall_ms, inputs.verdict, inputs.agent_id, hook, tool_name, prev_hash
    );
    sha256_hex(material.as_bytes())
}

/// Assemble the next record in the chain: allocate `sequence = prior + 1`,
/// compute its hash, stamp an ISO timestamp.
#[must_use]
pub fn assemble(sequence: u64, prev_hash: &str, inputs: RecordInputs<'_>) -> AuditRecord {
    let hash = compute_hash(sequence, prev_hash, &inputs);
    let timestamp = chrono::DateTime::from_timestamp_millis(inputs.wall_ms as i64)
        .map(|dt| dt.to_rfc3339())
        .unwrap_or_default();
    AuditRecord {
        sequence,
        id: uuid::Uuid::new_v4().to_string(),
        prev_hash: prev_hash.to_string(),
        hash,
        wall_ms: inputs.wall_ms,
        timestamp,
        verdict: inputs.verdict.to_string(),
        agent_id: inputs.agent_id.to_string(),
        hook: inputs.hook,
        tool_name: inputs.tool_name.map(str::to_string),
        context: inputs.context,
        trust: inputs.trust,
        risk: inputs.risk,
        matched_policies: inputs.matched_policies,
        evaluation_us: inputs.evaluation_us,
        llm_consulted: inputs.llm_consulted,
        compliance_controls: inputs.compliance_controls,
    }
}

/// The genesis `prev_hash` sentinel for a brand-new chain.
#[must_use]
pub fn genesis() -> String {
    "0".repeat(64)
}

/// Recompute a stored record's hash from its own fields, to verify it
/// against the stored `hash`.
#[must_use]
pub fn recompute_hash(record: &AuditRecord) -> String {
    compute_hash(
        record.sequence,
        &record.prev_hash,
        &RecordInputs {
            wall_ms: record.wall_ms,
            verdict: &record.verdict,
            agent_id: &record.agent_id,
            hook: record.hook,
            tool_name: record.tool_name.as_deref(),
            context: serde_json::Value::Null,
            trust: record.trust,
            risk: record.risk,
            matched_policies: vec![],
            evaluation_us: record.evaluation_us,
            llm_consulted: record.llm_consulted,
            compliance_controls: vec![],
        },
    )
}
