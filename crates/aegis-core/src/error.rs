use thiserror::Error;

/// Errors surfaced by the shared governance types and utilities.
///
/// Per the fail-safe discipline the engine is built around, none of these
/// are meant to abort evaluation on their own; callers decide whether a
/// given error degrades to a logged warning (e.g. an unknown timezone) or
/// propagates (e.g. a malformed policy document at load time).
#[derive(Debug, Error)]
pub enum CoreError {
    /// A `"HH:MM"` string did not parse as a valid time-of-day.
    #[error("invalid time string: {0}")]
    InvalidTime(String),
    /// An IANA timezone name was not recognised.
    #[error("unknown timezone: {0}")]
    UnknownTimezone(String),
    /// A regex pattern failed to compile or failed the safety check.
    #[error("invalid regex '{pattern}': {reason}")]
    InvalidRegex {
        /// The offending pattern source.
        pattern: String,
        /// Why it was rejected.
        reason: String,
    },
}
