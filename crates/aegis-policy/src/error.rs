use thiserror::Error;

/// Errors surfaced while compiling declared policies into a
/// [`crate::compiler::PolicyIndex`].
#[derive(Debug, Error, Clone)]
pub enum PolicyError {
    /// A policy failed structural validation (duplicate rule id, an empty
    /// escalation target, etc). The offending policy is skipped; the
    /// compiler continues with the rest.
    #[error("policy '{policy_id}' is invalid: {reason}")]
    ConfigInvalid {
        /// The offending policy's id.
        policy_id: String,
        /// Why it was rejected.
        reason: String,
    },
}
