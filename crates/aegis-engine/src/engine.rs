//! The orchestrator: wires the policy evaluator, trust manager, and audit
//! log behind one synchronous `evaluate()` call plus lifecycle management.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use aegis_audit::AuditLog;
use aegis_core::types::{Action, EvaluationContext, RiskAssessment, RiskFactors, RiskLevel, TrustSnapshot, Verdict};
use aegis_core::util::extract_agent_id;
use aegis_core::FrequencyCounter;
use aegis_policy::compiler::PolicyIndex;
use aegis_trust::TrustManager;
use regex::Regex;
use tracing::{debug, instrument, warn};

use crate::config::{EngineConfig, FailMode};
use crate::error::EngineError;
use crate::status::EngineStatus;

fn compile_redact_patterns(sources: &[String]) -> Result<Vec<Regex>, EngineError> {
    sources
        .iter()
        .map(|pattern| {
            Regex::new(pattern)
                .map_err(|e| EngineError::InvalidRedactPattern { pattern: pattern.clone(), reason: e.to_string() })
        })
        .collect()
}

/// Owns every long-lived piece of governance state for one embedding
/// host process. Constructed once via [`Engine::start`]; all shared state
/// is per-instance, so tests can build an isolated engine per case.
pub struct Engine {
    workspace: PathBuf,
    config: RwLock<EngineConfig>,
    policy_index: RwLock<Arc<PolicyIndex>>,
    frequency: Arc<FrequencyCounter>,
    trust: TrustManager,
    audit: AuditLog,
    audit_read_only: AtomicBool,
    stats: aegis_telemetry::EngineStats,
    /// Child session key -> parent session key, looked up but never owned.
    sub_agents: Mutex<HashMap<String, String>>,
}

fn governance_dir(workspace: &Path) -> PathBuf {
    workspace.join("governance")
}

impl Engine {
    /// Bring up a fresh engine rooted at `{workspace}/governance/`: load
    /// the trust store (applying decay), compile the policy index,
    /// open the audit log, and optionally verify its chain.
    pub fn start(workspace: PathBuf, config: EngineConfig, now_ms: u64) -> Result<Self, EngineError> {
        let dir = governance_dir(&workspace);
        std::fs::create_dir_all(&dir)?;

        let trust = TrustManager::load(dir.join("trust.json"), config.trust.clone(), now_ms)?;

        let (index, compile_errors) = aegis_policy::compiler::compile(config.policies.clone(), &config.builtin_policies);
        for err in &compile_errors {
            warn!(error = %err, "policy skipped at compile time");
        }

        let redact_patterns = compile_redact_patterns(&config.audit.redact_patterns)?;
        let audit = AuditLog::open(dir.join("audit"), redact_patterns)?;

        let audit_read_only = AtomicBool::new(false);
        if config.audit.verify_on_startup {
            if let Err(e) = audit.verify() {
                warn!(error = %e, "audit chain verification failed at startup; entering read-only audit mode");
                audit_read_only.store(true, Ordering::Relaxed);
            }
        }

        let frequency = Arc::new(FrequencyCounter::new(config.performance.frequency_buffer_size));

        Ok(Self {
            workspace,
            policy_index: RwLock::new(Arc::new(index)),
            frequency,
            trust,
            audit,
            audit_read_only,
            stats: aegis_telemetry::EngineStats::new(),
            sub_agents: Mutex::new(HashMap::new()),
            config: RwLock::new(config),
        })
    }

    /// Flush buffered audit records and persist the trust store. Call on
    /// graceful shutdown, or periodically from a host-owned timer when the
    /// `async` feature's background timers are not in use.
    pub fn stop(&self) -> Result<(), EngineError> {
        self.audit.flush()?;
        self.trust.persist()?;
        Ok(())
    }

    /// The workspace root this engine was started against.
    #[must_use]
    pub fn workspace(&self) -> &Path {
        &self.workspace
    }

    /// Register a parent/child session relationship so a freshly-seen
    /// child agent inherits the parent's trust score on first evaluation.
    /// Stores parent-by-child only; never follows the reverse direction.
    pub fn register_sub_agent(&self, parent_session_key: &str, child_session_key: &str) {
        self.sub_agents.lock().expect("sub-agent map poisoned").insert(
            child_session_key.to_string(),
            parent_session_key.to_string(),
        );
    }

    fn resolve_trust(&self, agent_id: &str, session_key: &str, now_ms: u64) -> TrustSnapshot {
        if self.trust.snapshot(Some(agent_id)).is_empty() {
            let parent_session_key = self.sub_agents.lock().expect("sub-agent map poisoned").get(session_key).cloned();
            if let Some(parent_session_key) = parent_session_key {
                let parent_agent_id = extract_agent_id(&parent_session_key, &parent_session_key);
                let parent = self.trust.get_agent_trust(parent_agent_id, now_ms);
                self.trust.set_score(agent_id, parent.score, now_ms);
            }
        }
        let agent = self.trust.get_agent_trust(agent_id, now_ms);
        TrustSnapshot { score: agent.score, tier: agent.effective_tier() }
    }

    /// Resolve the trust snapshot a hook adapter should stamp onto a
    /// freshly-built [`EvaluationContext`], applying sub-agent inheritance
    /// for agents seen for the first time.
    #[must_use]
    pub fn trust_for_context(&self, agent_id: &str, session_key: &str, now_ms: u64) -> TrustSnapshot {
        self.resolve_trust(agent_id, session_key, now_ms)
    }

    fn disabled_verdict(ctx: &EvaluationContext) -> Verdict {
        Verdict {
            action: Action::Allow,
            reason: "governance disabled".to_string(),
            risk: RiskAssessment { score: 0, level: RiskLevel::Low, factors: RiskFactors::default() },
            matched_policies: Vec::new(),
            trust: ctx.trust,
            evaluation_us: 0,
            escalation: None,
        }
    }

    fn fallback_verdict(&self, ctx: &EvaluationContext, fail_mode: FailMode, reason: String) -> Verdict {
        let action = match fail_mode {
            FailMode::Open => Action::Allow,
            FailMode::Closed => Action::Deny,
        };
        Verdict {
            action,
            reason,
            risk: RiskAssessment { score: 0, level: RiskLevel::Low, factors: RiskFactors::default() },
            matched_policies: Vec::new(),
            trust: ctx.trust,
            evaluation_us: 0,
            escalation: None,
        }
    }

    fn append_audit(&self, ctx: &EvaluationContext, verdict: &Verdict, wall_ms: u64, verdict_label: &str) -> Result<(), EngineError> {
        if !self.config.read().expect("config lock poisoned").audit.enabled || self.audit_read_only.load(Ordering::Relaxed) {
            return Ok(());
        }
        let context = aegis_audit::redact::redact_context(ctx, self.audit.redaction_patterns());
        self.audit.append(
            wall_ms,
            verdict_label,
            &ctx.agent_id,
            ctx.hook,
            ctx.tool_name.as_deref(),
            context,
            verdict.trust,
            verdict.risk,
            verdict.matched_policies.clone(),
            verdict.evaluation_us,
            false,
            Vec::new(),
        )?;
        Ok(())
    }

    fn action_label(action: Action) -> &'static str {
        match action {
            Action::Allow => "allow",
            Action::Deny => "deny",
            Action::Escalate => "escalate",
        }
    }

    /// Evaluate one fully-populated context against the current policy
    /// index, trust store, and frequency state. `wall_ms` stamps both the
    /// frequency-counter entry and the emitted audit record. Deadline-bounded
    /// by `performance.maxEvalUs`: an overrun is logged, never truncated.
    #[instrument(skip_all, fields(agent_id = %ctx.agent_id, hook = ?ctx.hook))]
    pub fn evaluate(&self, ctx: EvaluationContext, wall_ms: u64) -> Verdict {
        let (enabled, fail_mode, max_eval_us) = {
            let config = self.config.read().expect("config lock poisoned");
            (config.enabled, config.fail_mode, config.performance.max_eval_us)
        };
        if !enabled {
            return Self::disabled_verdict(&ctx);
        }

        match self.try_evaluate(&ctx, wall_ms) {
            Ok(verdict) => {
                if verdict.evaluation_us > max_eval_us {
                    warn!(evaluation_us = verdict.evaluation_us, max_eval_us, "evaluation exceeded budget");
                }
                match verdict.action {
                    Action::Deny | Action::Escalate => {
                        warn!(decision = ?verdict.action, reason = %verdict.reason, "governance decision")
                    }
                    Action::Allow => debug!(decision = ?verdict.action, "governance decision"),
                }
                self.stats.record_outcome(verdict.action, verdict.evaluation_us);
                verdict
            }
            Err(e) => {
                warn!(error = %e, "evaluation failed; returning fail-mode verdict");
                let verdict = self.fallback_verdict(&ctx, fail_mode, format!("engine error, fail mode {fail_mode:?}: {e}"));
                self.stats.record_error(verdict.evaluation_us);
                let _ = self.append_audit(&ctx, &verdict, wall_ms, "error_fallback");
                verdict
            }
        }
    }

    fn try_evaluate(&self, ctx: &EvaluationContext, wall_ms: u64) -> Result<Verdict, EngineError> {
        self.frequency.record(wall_ms, &ctx.agent_id, &ctx.session_key, ctx.tool_name.as_deref().unwrap_or(""));

        let risk_config = { self.config.read().expect("config lock poisoned").risk_config() };
        let risk = aegis_policy::risk::assess(ctx, &self.frequency, &risk_config);

        let index = self.policy_index.read().expect("policy index lock poisoned").clone();
        let time_windows = self.config.read().expect("config lock poisoned").time_windows.clone();
        let verdict = aegis_policy::evaluator::evaluate(&index, ctx, &risk, &time_windows, &self.frequency, wall_ms);

        self.append_audit(ctx, &verdict, wall_ms, Self::action_label(verdict.action))?;
        Ok(verdict)
    }

    /// Report completion of a tool call so the trust manager can update
    /// the acting agent's signal counters. Trust updates happen only on
    /// outcome report, never on the pre-action evaluation itself.
    pub fn record_outcome(&self, agent_id: &str, tool_name: &str, success: bool, now_ms: u64) {
        if success {
            self.trust.record_success(agent_id, now_ms);
        } else {
            self.trust.record_violation(agent_id, now_ms, Some(format!("tool '{tool_name}' reported failure")));
        }
    }

    /// Record the outcome of an escalation that was previously returned
    /// from `evaluate()`.
    pub fn record_escalation_outcome(&self, agent_id: &str, approved: bool, now_ms: u64) {
        self.trust.record_escalation(agent_id, now_ms, approved);
    }

    /// Rebuild the policy index from `policies` plus the currently
    /// configured built-in toggles and publish it via a single atomic
    /// pointer swap. Readers in flight keep using their already-copied
    /// pointer.
    pub fn reload_policies(&self, policies: Vec<aegis_core::types::Policy>) {
        let toggles = self.config.read().expect("config lock poisoned").builtin_policies;
        let (index, errors) = aegis_policy::compiler::compile(policies.clone(), &toggles);
        for err in &errors {
            warn!(error = %err, "policy skipped at reload time");
        }
        *self.policy_index.write().expect("policy index lock poisoned") = Arc::new(index);
        self.config.write().expect("config lock poisoned").policies = policies;
    }

    /// Snapshot of operating state for a host status endpoint.
    #[must_use]
    pub fn get_status(&self) -> EngineStatus {
        let config = self.config.read().expect("config lock poisoned");
        EngineStatus {
            enabled: config.enabled,
            policy_count: self.policy_index.read().expect("policy index lock poisoned").policy_count(),
            trust_enabled: config.trust.enabled,
            audit_enabled: config.audit.enabled,
            audit_read_only: self.audit_read_only.load(Ordering::Relaxed),
            fail_mode: config.fail_mode,
            stats: self.stats.snapshot(),
        }
    }

    /// One agent's trust record, or the whole store when `agent_id` is
    /// `None`.
    #[must_use]
    pub fn get_trust(&self, agent_id: Option<&str>) -> HashMap<String, aegis_core::types::AgentTrust> {
        self.trust.snapshot(agent_id)
    }

    /// Clamped manual override of an agent's trust score.
    pub fn set_trust(&self, agent_id: &str, score: u8, now_ms: u64) {
        self.trust.set_score(agent_id, score, now_ms);
    }

    /// Manually flush the audit buffer. Exposed for hosts driving their
    /// own persistence schedule instead of the `async` feature's timers.
    pub fn flush_audit(&self) -> Result<(), EngineError> {
        self.audit.flush().map_err(EngineError::from)
    }

    /// Manually persist the trust store if dirty.
    pub fn persist_trust(&self) -> Result<(), EngineError> {
        self.trust.persist().map_err(EngineError::from)
    }

    /// Delete audit segments older than the configured retention window.
    pub fn apply_audit_retention(&self, today: chrono::NaiveDate) -> Result<(), EngineError> {
        let retention_days = self.config.read().expect("config lock poisoned").audit.retention_days;
        self.audit.apply_retention(today, retention_days).map_err(EngineError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::types::{TimeContext, TrustTier};
    use serde_json::Map;

    fn ctx(agent_id: &str, tool: &str, hour: u32, trust: TrustSnapshot) -> EvaluationContext {
        EvaluationContext {
            hook: aegis_core::types::HookKind::BeforeToolCall,
            agent_id: agent_id.into(),
            session_key: format!("agent:{agent_id}"),
            channel: None,
            tool_name: Some(tool.into()),
            tool_params: Map::new(),
            message_content: None,
            message_addressee: None,
            time: TimeContext { hour, minute: 0, day_of_week: 2, date: "2026-08-01".into(), zone: "UTC".into() },
            now_us: 0,
            trust,
            history: vec![],
            metadata: Map::new(),
        }
    }

    fn engine() -> Engine {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path().to_path_buf();
        std::mem::forget(dir);
        Engine::start(workspace, EngineConfig::default(), 0).unwrap()
    }

    #[test]
    fn disabled_engine_always_allows() {
        let e = engine();
        e.config.write().unwrap().enabled = false;
        let verdict = e.evaluate(ctx("forge", "exec", 12, TrustSnapshot { score: 50, tier: TrustTier::Standard }), 0);
        assert_eq!(verdict.action, Action::Allow);
    }

    #[test]
    fn night_mode_denies_and_is_audited() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path().to_path_buf();
        std::mem::forget(dir);
        let mut config = EngineConfig::default();
        config.builtin_policies.night_mode = true;
        let e = Engine::start(workspace, config, 0).unwrap();
        let verdict = e.evaluate(ctx("forge", "exec", 3, TrustSnapshot { score: 60, tier: TrustTier::Trusted }), 0);
        assert_eq!(verdict.action, Action::Deny);
        e.stop().unwrap();
    }

    #[test]
    fn sub_agent_inherits_parent_trust_on_first_sight() {
        let e = engine();
        e.set_trust("parent", 90, 0);
        e.register_sub_agent("agent:parent", "agent:parent:subagent:1");
        let snapshot = e.trust_for_context("child", "agent:parent:subagent:1", 0);
        assert_eq!(snapshot.score, 90);
    }

    #[test]
    fn status_reports_policy_count_and_fail_mode() {
        let e = engine();
        let status = e.get_status();
        assert_eq!(status.fail_mode, FailMode::Open);
        assert_eq!(status.policy_count, 0);
    }

    #[test]
    fn record_outcome_updates_trust_signals() {
        let e = engine();
        e.record_outcome("forge", "exec", true, 0);
        let snapshot = e.get_trust(Some("forge"));
        assert_eq!(snapshot["forge"].success_count, 1);
        e.record_outcome("forge", "exec", false, 1_000);
        let snapshot = e.get_trust(Some("forge"));
        assert_eq!(snapshot["forge"].violation_count, 1);
    }
}
