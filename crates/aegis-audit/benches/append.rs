use aegis_audit::AuditLog;
use aegis_core::types::{HookKind, RiskAssessment, RiskFactors, RiskLevel, TrustSnapshot, TrustTier};
use criterion::{criterion_group, criterion_main, BatchSize, Criterion};

fn bench_append(c: &mut Criterion) {
    c.bench_function("audit_append", |b| {
        b.iter_batched(
            || {
                let dir = tempfile::tempdir().unwrap();
                let log = AuditLog::open(dir.path().to_path_buf(), vec![]).unwrap();
                (dir, log)
            },
            |(_dir, log)| {
                let _ = log.append(
                    1_700_000_000_000,
                    "allow",
                    "forge",
                    HookKind::BeforeToolCall,
                    Some("exec"),
                    serde_json::json!({}),
                    TrustSnapshot { score: 50, tier: TrustTier::Standard },
                    RiskAssessment { score: 10, level: RiskLevel::Low, factors: RiskFactors::default() },
                    vec![],
                    20,
                    false,
                    vec![],
                );
            },
            BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_append);
criterion_main!(benches);
