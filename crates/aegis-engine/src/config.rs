//! The declarative configuration surface: one YAML document covering
//! every recognised option, deserialised with `serde_yaml` the way the
//! reference workspace's `policy` crate loads its rule files.

use std::collections::HashMap;
use std::path::Path;

use aegis_core::types::{Policy, TimeWindow};
use aegis_policy::risk::RiskConfig;
use aegis_policy::BuiltinToggles;
use aegis_trust::TrustConfig;
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Error-path disposition: what `evaluate()` returns when it hits the
/// broad error guard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailMode {
    /// Treat the failure as an allow.
    Open,
    /// Treat the failure as a deny.
    Closed,
}

impl Default for FailMode {
    fn default() -> Self {
        Self::Open
    }
}

/// Requested audit record detail. Currently advisory: it is carried
/// through to `EngineConfig` for a future per-record verbosity knob but
/// does not yet change what `aegis_audit` records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditLevel {
    /// Minimal record.
    Minimal,
    /// Default record shape.
    Standard,
    /// Full record including bounded history/metadata.
    Verbose,
}

impl Default for AuditLevel {
    fn default() -> Self {
        Self::Standard
    }
}

fn default_true() -> bool {
    true
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_retention_days() -> i64 {
    90
}

fn default_max_eval_us() -> u64 {
    5_000
}

fn default_max_context_messages() -> usize {
    20
}

fn default_frequency_buffer_size() -> usize {
    aegis_core::frequency::DEFAULT_CAPACITY
}

/// `audit.*` configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditConfig {
    /// Whether audit recording is active at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Days a segment file is kept before `apply_retention` deletes it.
    #[serde(default = "default_retention_days")]
    pub retention_days: i64,
    /// Replay the chain on `Engine::start` and refuse further appends if
    /// it's broken.
    #[serde(default)]
    pub verify_on_startup: bool,
    /// Regex source strings redacting matching string leaves in addition
    /// to the built-in sensitive-key redaction.
    #[serde(default)]
    pub redact_patterns: Vec<String>,
    /// Requested record verbosity.
    #[serde(default)]
    pub level: AuditLevel,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            retention_days: default_retention_days(),
            verify_on_startup: false,
            redact_patterns: Vec::new(),
            level: AuditLevel::default(),
        }
    }
}

/// `performance.*` configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceConfig {
    /// Deadline budget for one `evaluate()` call, in microseconds.
    /// Overruns are logged, not truncated.
    #[serde(default = "default_max_eval_us")]
    pub max_eval_us: u64,
    /// Maximum bounded conversation history entries a hook adapter keeps.
    #[serde(default = "default_max_context_messages")]
    pub max_context_messages: usize,
    /// Ring capacity backing the frequency counter.
    #[serde(default = "default_frequency_buffer_size")]
    pub frequency_buffer_size: usize,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            max_eval_us: default_max_eval_us(),
            max_context_messages: default_max_context_messages(),
            frequency_buffer_size: default_frequency_buffer_size(),
        }
    }
}

/// The full configuration surface from section 6, loaded as one YAML
/// document (declared policies may embed directly or live in a sibling
/// `policies.yaml` merged in before `EngineConfig::load` returns).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Master switch; when false, `evaluate()` always allows.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// IANA zone name driving `TimeContext`.
    #[serde(default = "default_timezone")]
    pub timezone: String,
    /// Error-path verdict.
    #[serde(default)]
    pub fail_mode: FailMode,
    /// Declared policies.
    #[serde(default)]
    pub policies: Vec<Policy>,
    /// Named time windows referenced by `Condition::Time(TimeConditionRef::Named)`.
    #[serde(default)]
    pub time_windows: HashMap<String, TimeWindow>,
    /// Trust manager configuration.
    #[serde(default)]
    pub trust: TrustConfig,
    /// Audit log configuration.
    #[serde(default)]
    pub audit: AuditConfig,
    /// Tool name → risk override, superseding the built-in sensitivity table.
    #[serde(default)]
    pub tool_risk_overrides: HashMap<String, u8>,
    /// Which built-in policy templates are enabled.
    #[serde(default)]
    pub builtin_policies: BuiltinToggles,
    /// Evaluation budget and context-size knobs.
    #[serde(default)]
    pub performance: PerformanceConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            timezone: default_timezone(),
            fail_mode: FailMode::default(),
            policies: Vec::new(),
            time_windows: HashMap::new(),
            trust: TrustConfig::default(),
            audit: AuditConfig::default(),
            tool_risk_overrides: HashMap::new(),
            builtin_policies: BuiltinToggles::default(),
            performance: PerformanceConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse a YAML document into an `EngineConfig`.
    pub fn from_yaml_str(raw: &str) -> Result<Self, EngineError> {
        serde_yaml::from_str(raw).map_err(EngineError::from)
    }

    /// Load and parse `path` as an `EngineConfig` document.
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    /// The risk assessor configuration derived from this config's tool
    /// risk overrides.
    #[must_use]
    pub fn risk_config(&self) -> RiskConfig {
        RiskConfig { tool_risk_overrides: self.tool_risk_overrides.clone() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_surface() {
        let cfg = EngineConfig::default();
        assert!(cfg.enabled);
        assert_eq!(cfg.timezone, "UTC");
        assert_eq!(cfg.fail_mode, FailMode::Open);
        assert_eq!(cfg.performance.max_eval_us, 5_000);
    }

    #[test]
    fn parses_a_minimal_yaml_document() {
        let yaml = r#"
enabled: true
timezone: "America/New_York"
failMode: closed
builtinPolicies:
  nightMode: true
trust:
  enabled: true
  defaults:
    "*": 50
audit:
  enabled: true
  retentionDays: 30
"#;
        let cfg = EngineConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(cfg.timezone, "America/New_York");
        assert_eq!(cfg.fail_mode, FailMode::Closed);
        assert!(cfg.builtin_policies.night_mode);
        assert_eq!(cfg.audit.retention_days, 30);
    }

    #[test]
    fn empty_document_falls_back_to_defaults() {
        let cfg = EngineConfig::from_yaml_str("{}").unwrap();
        assert!(cfg.enabled);
        assert_eq!(cfg.performance.frequency_buffer_size, aegis_core::frequency::DEFAULT_CAPACITY);
    }
}
