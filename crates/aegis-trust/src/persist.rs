//! Durable storage for the trust store: write-then-rename on save, with
//! corrupt-file quarantine on load.

use std::fs;
use std::io::Write;
use std::path::Path;

use aegis_core::types::TrustStoreEnvelope;
use chrono::Utc;
use tracing::warn;

use crate::error::TrustError;

/// Load the envelope at `path`. A missing file yields an empty, version-1
/// envelope. A file that fails to parse is renamed aside with a
/// `.corrupt-<unix_ms>` suffix and an empty envelope is returned instead of
/// propagating the error — trust state is best-effort, never a hard outage.
pub fn load(path: &Path) -> Result<TrustStoreEnvelope, TrustError> {
    if !path.exists() {
        return Ok(empty_envelope());
    }
    let raw = fs::read_to_string(path)?;
    match serde_json::from_str(&raw) {
        Ok(envelope) => Ok(envelope),
        Err(e) => {
            let ts = aegis_core::util::now_us() / 1000;
            let quarantine = path.with_extension(format!("corrupt-{ts}"));
            warn!(path = %path.display(), error = %e, "trust store failed to parse; quarantining and starting empty");
            fs::rename(path, &quarantine)?;
            Ok(empty_envelope())
        }
    }
}

fn empty_envelope() -> TrustStoreEnvelope {
    TrustStoreEnvelope { version: 1, updated: Utc::now().to_rfc3339(), agents: std::collections::HashMap::new() }
}

/// Persist `envelope` atomically: write to a sibling temp file in the same
/// directory, `sync_all`, then rename over `path`.
pub fn save(path: &Path, envelope: &TrustStoreEnvelope) -> Result<(), TrustError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let tmp_path = path.with_extension("tmp");
    {
        let mut file = fs::File::create(&tmp_path)?;
        let body = serde_json::to_vec_pretty(envelope)?;
        file.write_all(&body)?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use aegis_core::types::AgentTrust;
    use std::collections::{HashMap, VecDeque};

    #[test]
    fn missing_file_yields_empty_envelope() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trust.json");
        let envelope = load(&path).unwrap();
        assert!(envelope.agents.is_empty());
    }

    #[test]
    fn save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trust.json");
        let mut agents = HashMap::new();
        agents.insert(
            "forge".to_string(),
            AgentTrust {
                agent_id: "forge".into(),
                score: 70,
                tier: aegis_core::types::TrustTier::Trusted,
                success_count: 3,
                violation_count: 0,
                approved_escalations: 0,
                denied_escalations: 0,
                age_days: 2,
                clean_streak_days: 2,
                manual_adjustment: 0.0,
                history: VecDeque::new(),
                created_at_ms: 0,
                last_evaluated_at_ms: 100,
                locked_tier: None,
                floor: None,
                max_history: 100,
            },
        );
        let envelope = TrustStoreEnvelope { version: 1, updated: "2026-08-01T00:00:00Z".into(), agents };
        save(&path, &envelope).unwrap();
        let loaded = load(&path).unwrap();
        assert_eq!(loaded.agents["forge"].score, 70);
    }

    #[test]
    fn corrupt_file_is_quarantined_and_load_returns_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trust.json");
        fs::write(&path, b"not json").unwrap();
        let envelope = load(&path).unwrap();
        assert!(envelope.agents.is_empty());
        assert!(!path.exists());
        let has_quarantine = fs::read_dir(dir.path()).unwrap().any(|e| {
            e.unwrap().file_name().to_string_lossy().contains("corrupt-")
        });
        assert!(has_quarantine);
    }
}
