//! The engine's aggregate error type. Each variant wraps one lower crate's
//! typed error via `#[from]`; nothing downstream needs to match on
//! crate-specific variants to decide the fail-mode verdict.

use thiserror::Error;

/// Errors surfaced by the engine orchestrator.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The trust manager failed to load or persist.
    #[error("trust store error: {0}")]
    Trust(#[from] aegis_trust::TrustError),
    /// The audit log failed to open, flush, or verify.
    #[error("audit log error: {0}")]
    Audit(#[from] aegis_audit::AuditError),
    /// A filesystem operation (config load, workspace creation) failed.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// The configuration document failed to parse.
    #[error("invalid configuration: {0}")]
    Config(#[from] serde_yaml::Error),
    /// A redaction pattern in `audit.redactPatterns` failed to compile.
    #[error("invalid redaction pattern '{pattern}': {reason}")]
    InvalidRedactPattern {
        /// The offending pattern source.
        pattern: String,
        /// Why `regex::Regex::new` rejected it.
        reason: String,
    },
    /// The audit chain was found broken on startup verification; the
    /// engine starts in read-only audit mode rather than refusing to
    /// start outright.
    #[error("audit chain broken at sequence {sequence}: {reason}")]
    ChainBroken {
        /// First sequence number found inconsistent.
        sequence: u64,
        /// Why verification rejected it.
        reason: String,
    },
}
