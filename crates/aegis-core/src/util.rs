//! Time arithmetic, glob/regex, hashing, and id-extraction helpers shared
//! across the governance engine.

use std::sync::OnceLock;
use std::time::Instant;

use chrono::{Datelike, TimeZone, Timelike, Utc};
use sha2::{Digest, Sha256};
use tracing::warn;

use crate::error::CoreError;
use crate::types::TimeContext;

/// Sentinel returned by [`parse_time_minutes`] on malformed input.
pub const INVALID_MINUTES: i32 = -1;

/// Parse `"HH:MM"` (00≤HH≤23, 00≤MM≤59) into minutes since local midnight.
/// Returns [`INVALID_MINUTES`] on any parse failure, including `"24:00"`.
#[must_use]
pub fn parse_time_minutes(s: &str) -> i32 {
    let Some((h, m)) = s.split_once(':') else {
        return INVALID_MINUTES;
    };
    if h.len() != 2 || m.len() != 2 {
        return INVALID_MINUTES;
    }
    let (Ok(hour), Ok(minute)) = (h.parse::<i32>(), m.parse::<i32>()) else {
        return INVALID_MINUTES;
    };
    if !(0..=23).contains(&hour) || !(0..=59).contains(&minute) {
        return INVALID_MINUTES;
    }
    hour * 60 + minute
}

/// True when `now` falls within `[after, before)`, honouring midnight wrap
/// when `after > before`, and matching only the exact minute when
/// `after == before`.
#[must_use]
pub fn in_time_range(now: i32, after: i32, before: i32) -> bool {
    match after.cmp(&before) {
        std::cmp::Ordering::Less => now >= after && now < before,
        std::cmp::Ordering::Greater => now >= after || now < before,
        std::cmp::Ordering::Equal => now == after,
    }
}

/// Compile a shell-style glob (`*` only) into an anchored regex source.
/// All other regex metacharacters are escaped.
#[must_use]
pub fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 2);
    out.push('^');
    for c in pattern.chars() {
        if c == '*' {
            out.push_str(".*");
        } else {
            out.push_str(&regex::escape(&c.to_string()));
        }
    }
    out.push('$');
    out
}

/// Canonical hex-encoded SHA-256 digest of `bytes`.
#[must_use]
pub fn sha256_hex(bytes: &[u8]) -> String {
    const CHUNK: usize = 64 * 1024;
    let mut hasher = Sha256::new();
    if bytes.len() <= CHUNK {
        hasher.update(bytes);
    } else {
        for chunk in bytes.chunks(CHUNK) {
            hasher.update(chunk);
        }
    }
    hex::encode(hasher.finalize())
}

static MONO_BASE: OnceLock<Instant> = OnceLock::new();

/// Monotonic microseconds from an arbitrary, process-local epoch. Never
/// meaningful as a wall-clock value — use only for durations and ordering.
#[must_use]
pub fn now_us() -> i64 {
    let base = MONO_BASE.get_or_init(Instant::now);
    base.elapsed().as_micros() as i64
}

/// Resolve the current wall-clock components in the named IANA timezone.
/// An unrecognised zone degrades to UTC with a single logged warning
/// rather than failing the caller — a bad config value must not take the
/// gateway down.
#[must_use]
pub fn current_time(zone: &str) -> TimeContext {
    match try_current_time(zone) {
        Ok(tc) => tc,
        Err(_) => {
            warn!(zone, "unknown timezone, falling back to UTC");
            try_current_time("UTC").expect("UTC always resolves")
        }
    }
}

/// Resolve the current wall-clock components in `zone`, returning an error
/// instead of silently falling back — used by configuration validation at
/// startup, where a bad zone name should surface to the operator.
pub fn try_current_time(zone: &str) -> Result<TimeContext, CoreError> {
    let tz: chrono_tz::Tz =
        zone.parse().map_err(|_| CoreError::UnknownTimezone(zone.to_string()))?;
    let now = tz.from_utc_datetime(&Utc::now().naive_utc());
    Ok(TimeContext {
        hour: now.hour(),
        minute: now.minute(),
        day_of_week: now.weekday().num_days_from_monday(),
        date: now.date_naive().to_string(),
        zone: zone.to_string(),
    })
}

/// Extract the agent id from a session key of the form
/// `agent:<id>[:subagent:...]`; returns `fallback` when the key does not
/// match the pattern.
#[must_use]
pub fn extract_agent_id<'a>(session_key: &'a str, fallback: &'a str) -> &'a str {
    let Some(rest) = session_key.strip_prefix("agent:") else {
        return fallback;
    };
    match rest.find(':') {
        Some(idx) => &rest[..idx],
        None => rest,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_time_minutes_boundaries() {
        assert_eq!(parse_time_minutes("00:00"), 0);
        assert_eq!(parse_time_minutes("23:59"), 1439);
        assert_eq!(parse_time_minutes("24:00"), INVALID_MINUTES);
        assert_eq!(parse_time_minutes("8:30"), INVALID_MINUTES);
        assert_eq!(parse_time_minutes("bogus"), INVALID_MINUTES);
    }

    #[test]
    fn in_time_range_normal_and_wrap() {
        assert!(in_time_range(parse_time_minutes("09:00"), parse_time_minutes("08:00"), parse_time_minutes("17:00")));
        assert!(!in_time_range(parse_time_minutes("07:00"), parse_time_minutes("08:00"), parse_time_minutes("17:00")));
        // midnight wrap
        assert!(in_time_range(parse_time_minutes("23:30"), parse_time_minutes("23:00"), parse_time_minutes("08:00")));
        assert!(!in_time_range(parse_time_minutes("08:00"), parse_time_minutes("23:00"), parse_time_minutes("08:00")));
    }

    #[test]
    fn in_time_range_equal_matches_only_exact_minute() {
        let t = parse_time_minutes("10:00");
        assert!(in_time_range(t, t, t));
        assert!(!in_time_range(t + 1, t, t));
    }

    #[test]
    fn glob_to_regex_escapes_and_anchors() {
        let src = glob_to_regex("sessions_*");
        let re = regex::Regex::new(&src).unwrap();
        assert!(re.is_match("sessions_send"));
        assert!(!re.is_match("not_sessions_send"));

        let literal = glob_to_regex("a.b");
        let re = regex::Regex::new(&literal).unwrap();
        assert!(re.is_match("a.b"));
        assert!(!re.is_match("aXb"));
    }

    #[test]
    fn sha256_hex_matches_known_vector() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn extract_agent_id_patterns() {
        assert_eq!(extract_agent_id("agent:forge:subagent:1", "fallback"), "forge");
        assert_eq!(extract_agent_id("agent:forge", "fallback"), "forge");
        assert_eq!(extract_agent_id("session:other", "fallback"), "fallback");
    }

    #[test]
    fn now_us_is_monotonic() {
        let a = now_us();
        let b = now_us();
        assert!(b >= a);
    }
}
