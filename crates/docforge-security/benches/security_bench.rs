// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for key derivation, object encryption, integrity
// hashing and audit logging in the docforge-security crate.

use criterion::{Criterion, black_box, criterion_group, criterion_main};

use docforge_core::settings::Permissions;
use docforge_core::types::JobId;
use docforge_security::{AuditLog, NewAuditEntry, SecurityHandler, hash_bytes};

/// Handler derivation runs 100+ MD5 rounds and 40 RC4 schedules.
fn bench_handler_derivation(c: &mut Criterion) {
    let permissions = Permissions::default();
    c.bench_function("security_handler_derive (RC4-128, R3)", |b| {
        b.iter(|| {
            let handler = SecurityHandler::new(
                black_box("user-password"),
                Some("owner-password"),
                &permissions,
                b"0123456789abcdef",
            )
            .expect("derive handler");
            black_box(handler);
        });
    });
}

/// Encrypting a 64 KiB content stream with its per-object key.
fn bench_object_encryption(c: &mut Criterion) {
    let handler = SecurityHandler::new("pw", None, &Permissions::default(), b"0123456789abcdef")
        .expect("derive handler");
    let mut stream = vec![0x42u8; 64 * 1024];

    c.bench_function("object_encrypt (64 KiB)", |b| {
        b.iter(|| {
            handler
                .apply(black_box(12), 0, &mut stream)
                .expect("encrypt failed");
        });
    });
}

fn bench_integrity_hash(c: &mut Criterion) {
    let sizes: &[(&str, usize)] = &[
        ("10 KiB", 10 * 1024),
        ("1 MiB", 1024 * 1024),
        ("8 MiB", 8 * 1024 * 1024),
    ];

    let mut group = c.benchmark_group("integrity_hash_sha256");
    for &(label, size) in sizes {
        let data = vec![0xABu8; size];
        group.bench_function(label, |b| {
            b.iter(|| black_box(hash_bytes(black_box(&data))));
        });
    }
    group.finish();
}

/// A redaction job writing 50 region entries in one transaction.
fn bench_audit_batch(c: &mut Criterion) {
    let log = AuditLog::open_in_memory().expect("open in-memory audit log");
    let entries: Vec<NewAuditEntry> = (0..50)
        .map(|i| NewAuditEntry::new(Some(i / 10 + 1), "redacted", format!("region {i}")))
        .collect();

    c.bench_function("audit_record_all (50 entries)", |b| {
        b.iter(|| {
            log.record_all(JobId::new(), black_box(&entries))
                .expect("record failed");
        });
    });
}

criterion_group!(
    benches,
    bench_handler_derivation,
    bench_object_encryption,
    bench_integrity_hash,
    bench_audit_batch,
);
criterion_main!(benches);
