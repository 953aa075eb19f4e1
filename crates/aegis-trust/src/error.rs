use thiserror::Error;

/// Errors from the trust store's persistence layer.
#[derive(Debug, Error)]
pub enum TrustError {
    /// Underlying filesystem operation failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// The on-disk envelope failed to parse; the caller should treat this as
    /// an empty store and quarantine the offending file.
    #[error("corrupt trust store at {path}: {reason}")]
    Corrupt {
        /// Path to the file that failed to parse.
        path: String,
        /// The underlying parse error, stringified.
        reason: String,
    },
    /// Envelope serialization failed; should not happen for well-formed data.
    #[error("serialize: {0}")]
    Serde(#[from] serde_json::Error),
}
