use thiserror::Error;

/// Errors from the audit log's storage layer.
#[derive(Debug, Error)]
pub enum AuditError {
    /// Underlying filesystem operation failed.
    #[error("io: {0}")]
    Io(#[from] std::io::Error),
    /// A record failed to serialize; should not happen for well-formed data.
    #[error("serialize: {0}")]
    Serde(#[from] serde_json::Error),
    /// Startup chain verification found a broken link.
    #[error("audit chain broken at sequence {sequence}: {reason}")]
    ChainBroken {
        /// The first sequence number whose hash did not verify.
        sequence: u64,
        /// Why verification failed.
        reason: String,
    },
}
