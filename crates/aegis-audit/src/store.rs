//! Per-UTC-day segment storage, buffered flushing, the chain-state
//! sidecar, startup verification, retention, and query.

use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Instant;

use aegis_core::types::{HookKind, RiskAssessment, TrustSnapshot};
use chrono::{DateTime, NaiveDate, Utc};
use regex::Regex;
use tracing::{info, warn};

use crate::error::AuditError;
use crate::record::{self, AuditRecord, RecordInputs};

const FLUSH_BATCH_SIZE: usize = 100;
const FLUSH_INTERVAL: std::time::Duration = std::time::Duration::from_secs(1);

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct ChainState {
    sequence: u64,
    hash: String,
}

struct Head {
    sequence: u64,
    hash: String,
}

/// Hash-chained, segment-file-backed audit log.
pub struct AuditLog {
    dir: PathBuf,
    head: Mutex<Head>,
    buffer: Mutex<Vec<AuditRecord>>,
    oldest_buffered_at: Mutex<Option<Instant>>,
    user_redaction_patterns: Vec<Regex>,
}

fn chain_state_path(dir: &Path) -> PathBuf {
    dir.join("chain-state.json")
}

fn segment_path(dir: &Path, date: &str) -> PathBuf {
    dir.join(format!("{date}.jsonl"))
}

fn date_for_ms(wall_ms: u64) -> String {
    DateTime::<Utc>::from_timestamp_millis(wall_ms as i64).unwrap_or_else(Utc::now).format("%Y-%m-%d").to_string()
}

/// Serialize a record with sorted, compact keys by round-tripping through a
/// `Value` (whose maps are `BTreeMap`-backed without the `preserve_order`
/// feature).
fn to_sorted_compact_json(record: &AuditRecord) -> Result<String, AuditError> {
    let value = serde_json::to_value(record)?;
    Ok(serde_json::to_string(&value)?)
}

impl AuditLog {
    /// Open (or create) the audit directory at `dir`, loading the chain
    /// head from the sidecar file if present.
    pub fn open(dir: PathBuf, user_redaction_patterns: Vec<Regex>) -> Result<Self, AuditError> {
        fs::create_dir_all(&dir)?;
        let state_path = chain_state_path(&dir);
        let head = if state_path.exists() {
            let raw = fs::read_to_string(&state_path)?;
            match serde_json::from_str::<ChainState>(&raw) {
                Ok(state) => Head { sequence: state.sequence, hash: state.hash },
                Err(e) => {
                    warn!(error = %e, "chain-state.json failed to parse; starting a fresh chain");
                    Head { sequence: 0, hash: record::genesis() }
                }
            }
        } else {
            Head { sequence: 0, hash: record::genesis() }
        };
        Ok(Self {
            dir,
            head: Mutex::new(head),
            buffer: Mutex::new(Vec::new()),
            oldest_buffered_at: Mutex::new(None),
            user_redaction_patterns,
        })
    }

    /// User-configured redaction patterns, for building the context
    /// snapshot before calling [`AuditLog::append`].
    #[must_use]
    pub fn redaction_patterns(&self) -> &[Regex] {
        &self.user_redaction_patterns
    }

    /// Assemble and buffer the next record in the chain, flushing if the
    /// batch-size or time threshold has been reached.
    #[allow(clippy::too_many_arguments)]
    pub fn append(
        &self,
        wall_ms: u64,
        verdict: &str,
        agent_id: &str,
        hook: HookKind,
        tool_name: Option<&str>,
        context: serde_json::Value,
        trust: TrustSnapshot,
        risk: RiskAssessment,
        matched_policies: Vec<aegis_core::types::MatchedPolicy>,
        evaluation_us: u64,
        llm_consulted: bool,
        compliance_controls: Vec<String>,
    ) -> Result<AuditRecord, AuditError> {
        let record = {
            let mut head = self.head.lock().expect("audit head poisoned");
            let sequence = head.sequence + 1;
            let inputs = RecordInputs {
                wall_ms,
                verdict,
                agent_id,
                hook,
                tool_name,
                context,
                trust,
                risk,
                matched_policies,
                evaluation_us,
                llm_consulted,
                compliance_controls,
            };
            let record = record::assemble(sequence, &head.hash, inputs);
            head.sequence = sequence;
            head.hash = record.hash.clone();
            record
        };

        {
            let mut buffer = self.buffer.lock().expect("audit buffer poisoned");
            let mut oldest = self.oldest_buffered_at.lock().expect("audit oldest poisoned");
            if buffer.is_empty() {
                *oldest = Some(Instant::now());
            }
            buffer.push(record.clone());
        }
        self.maybe_flush()?;
        Ok(record)
    }

    fn should_flush(&self) -> bool {
        let buffer_len = self.buffer.lock().expect("audit buffer poisoned").len();
        if buffer_len >= FLUSH_BATCH_SIZE {
            return true;
        }
        self.oldest_buffered_at
            .lock()
            .expect("audit oldest poisoned")
            .is_some_and(|at| at.elapsed() >= FLUSH_INTERVAL)
    }

    fn maybe_flush(&self) -> Result<(), AuditError> {
        if self.should_flush() {
            self.flush()?;
        }
        Ok(())
    }

    /// Flush every buffered record to its day segment, then persist the
    /// chain head sidecar. Safe to call with an empty buffer.
    pub fn flush(&self) -> Result<(), AuditError> {
        let drained: Vec<AuditRecord> = {
            let mut buffer = self.buffer.lock().expect("audit buffer poisoned");
            std::mem::take(&mut *buffer)
        };
        *self.oldest_buffered_at.lock().expect("audit oldest poisoned") = None;
        if drained.is_empty() {
            return Ok(());
        }

        let mut by_date: BTreeMap<String, Vec<&AuditRecord>> = BTreeMap::new();
        for record in &drained {
            by_date.entry(date_for_ms(record.wall_ms)).or_default().push(record);
        }
        for (date, records) in by_date {
            let path = segment_path(&self.dir, &date);
            let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
            for record in records {
                writeln!(file, "{}", to_sorted_compact_json(record)?)?;
            }
            file.sync_all()?;
        }

        let head = self.head.lock().expect("audit head poisoned");
        let state = ChainState { sequence: head.sequence, hash: head.hash.clone() };
        drop(head);
        let tmp_path = chain_state_path(&self.dir).with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp_path)?;
            file.write_all(&serde_json::to_vec(&state)?)?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, chain_state_path(&self.dir))?;
        Ok(())
    }

    fn segment_dates(&self) -> Result<Vec<String>, AuditError> {
        let mut dates = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(date) = name.strip_suffix(".jsonl") {
                if NaiveDate::parse_from_str(date, "%Y-%m-%d").is_ok() {
                    dates.push(date.to_string());
                }
            }
        }
        dates.sort();
        Ok(dates)
    }

    fn read_segment(&self, date: &str) -> Result<Vec<AuditRecord>, AuditError> {
        let path = segment_path(&self.dir, date);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let file = fs::File::open(&path)?;
        let reader = BufReader::new(file);
        let mut out = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            out.push(serde_json::from_str(&line)?);
        }
        Ok(out)
    }

    /// Recompute every retained record's hash and verify it equals the
    /// stored hash and chains to the previous record's hash. Stops at and
    /// reports the first broken sequence without deleting anything.
    pub fn verify(&self) -> Result<(), AuditError> {
        let dates = self.segment_dates()?;
        let mut prev_hash = record::genesis();
        let mut checked = 0u64;
        for date in dates {
            for rec in self.read_segment(&date)? {
                if rec.prev_hash != prev_hash {
                    return Err(AuditError::ChainBroken {
                        sequence: rec.sequence,
                        reason: "prev_hash does not match the preceding record's hash".to_string(),
                    });
                }
                if record::recompute_hash(&rec) != rec.hash {
                    return Err(AuditError::ChainBroken {
                        sequence: rec.sequence,
                        reason: "stored hash does not match recomputed hash".to_string(),
                    });
                }
                prev_hash = rec.hash.clone();
                checked += 1;
            }
        }
        info!(checked, "audit chain verified");
        Ok(())
    }

    /// Delete segment files whose date is older than `retention_days`
    /// relative to `today`.
    pub fn apply_retention(&self, today: NaiveDate, retention_days: i64) -> Result<(), AuditError> {
        for date in self.segment_dates()? {
            let Ok(parsed) = NaiveDate::parse_from_str(&date, "%Y-%m-%d") else { continue };
            if (today - parsed).num_days() > retention_days {
                fs::remove_file(segment_path(&self.dir, &date))?;
            }
        }
        Ok(())
    }

    /// Scan segments filtered by agent id / verdict / inclusive timestamp
    /// range, returning at most `cap` records, oldest first.
    pub fn query(
        &self,
        agent_id: Option<&str>,
        verdict: Option<&str>,
        from_ms: Option<u64>,
        to_ms: Option<u64>,
        cap: usize,
    ) -> Result<Vec<AuditRecord>, AuditError> {
        let mut out = Vec::new();
        for date in self.segment_dates()? {
            for rec in self.read_segment(&date)? {
                if let Some(id) = agent_id {
                    if rec.agent_id != id {
                        continue;
                    }
                }
                if let Some(v) = verdict {
                    if rec.verdict != v {
                        continue;
                    }
                }
                if from_ms.is_some_and(|f| rec.wall_ms < f) {
                    continue;
                }
                if to_ms.is_some_and(|t| rec.wall_ms > t) {
                    continue;
                }
                out.push(rec);
                if out.len() >= cap {
                    return Ok(out);
                }
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::types::{HookKind, RiskFactors, RiskLevel, TrustTier};

    fn trust() -> TrustSnapshot {
        TrustSnapshot { score: 50, tier: TrustTier::Standard }
    }

    fn risk() -> RiskAssessment {
        RiskAssessment { score: 10, level: RiskLevel::Low, factors: RiskFactors::default() }
    }

    #[test]
    fn append_flushes_after_batch_size() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::open(dir.path().to_path_buf(), vec![]).unwrap();
        for i in 0..100 {
            log.append(
                1_700_000_000_000 + i,
                "allow",
                "forge",
                HookKind::BeforeToolCall,
                Some("exec"),
                serde_json::json!({}),
                trust(),
                risk(),
                vec![],
                10,
                false,
                vec![],
            )
            .unwrap();
        }
        assert!(log.buffer.lock().unwrap().is_empty());
        assert!(dir.path().join("chain-state.json").exists());
    }

    #[test]
    fn verify_passes_on_intact_chain_and_fails_on_tamper() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::open(dir.path().to_path_buf(), vec![]).unwrap();
        for i in 0..3 {
            log.append(
                1_700_000_000_000 + i,
                "allow",
                "forge",
                HookKind::BeforeToolCall,
                None,
                serde_json::json!({}),
                trust(),
                risk(),
                vec![],
                5,
                false,
                vec![],
            )
            .unwrap();
        }
        log.flush().unwrap();
        log.verify().unwrap();

        let date = date_for_ms(1_700_000_000_000);
        let path = segment_path(dir.path(), &date);
        let mut contents = fs::read_to_string(&path).unwrap();
        contents = contents.replace("\"allow\"", "\"deny\"");
        fs::write(&path, contents).unwrap();

        let reopened = AuditLog::open(dir.path().to_path_buf(), vec![]).unwrap();
        let err = reopened.verify().unwrap_err();
        assert!(matches!(err, AuditError::ChainBroken { sequence: 1, .. }));
    }

    #[test]
    fn retention_deletes_old_segments_only() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::open(dir.path().to_path_buf(), vec![]).unwrap();
        fs::write(segment_path(dir.path(), "2020-01-01"), "").unwrap();
        fs::write(segment_path(dir.path(), "2026-08-01"), "").unwrap();
        log.apply_retention(NaiveDate::from_ymd_opt(2026, 8, 1).unwrap(), 30).unwrap();
        assert!(!segment_path(dir.path(), "2020-01-01").exists());
        assert!(segment_path(dir.path(), "2026-08-01").exists());
    }

    #[test]
    fn query_filters_by_agent_and_caps_results() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::open(dir.path().to_path_buf(), vec![]).unwrap();
        for (agent, i) in [("forge", 0u64), ("other", 1), ("forge", 2)] {
            log.append(
                1_700_000_000_000 + i,
                "allow",
                agent,
                HookKind::BeforeToolCall,
                None,
                serde_json::json!({}),
                trust(),
                risk(),
                vec![],
                1,
                false,
                vec![],
            )
            .unwrap();
        }
        log.flush().unwrap();
        let results = log.query(Some("forge"), None, None, None, 10).unwrap();
        assert_eq!(results.len(), 2);
        let capped = log.query(None, None, None, None, 1).unwrap();
        assert_eq!(capped.len(), 1);
    }
}
