// Derivation & verification benchmarks for AutoVault.
//
// Covers the canonical bump search for escrow addresses, single-bump
// re-verification, and signer-set verification at various sizes.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use autovault_protocol::config::{default_program_id, ESCROW_SEED};
use autovault_protocol::crypto::derivation::{create_program_address, find_program_address};
use autovault_protocol::crypto::keys::Keypair;
use autovault_protocol::identity::{verify_attestations, Attestation};

fn bench_find_escrow_address(c: &mut Criterion) {
    let program_id = default_program_id();
    let owner = Keypair::generate().public_key();

    c.bench_function("derivation/find_escrow_address", |b| {
        b.iter(|| find_program_address(&[ESCROW_SEED, owner.as_bytes()], &program_id).unwrap());
    });
}

fn bench_verify_with_bump(c: &mut Criterion) {
    let program_id = default_program_id();
    let owner = Keypair::generate().public_key();
    let found = find_program_address(&[ESCROW_SEED, owner.as_bytes()], &program_id).unwrap();

    c.bench_function("derivation/recompute_with_bump", |b| {
        b.iter(|| {
            create_program_address(&[ESCROW_SEED, owner.as_bytes(), &[found.bump]], &program_id)
                .unwrap()
        });
    });
}

fn bench_verify_attestations(c: &mut Criterion) {
    let mut group = c.benchmark_group("identity/verify_attestations");
    let message = b"withdraw_token_by_operator; mint=X; owner=U";

    for size in [1, 2, 4, 8] {
        let attestations: Vec<_> = (0..size)
            .map(|_| Attestation::sign(&Keypair::generate(), message))
            .collect();

        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(size),
            &attestations,
            |b, attestations| {
                b.iter(|| verify_attestations(message, attestations).unwrap());
            },
        );
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_find_escrow_address,
    bench_verify_with_bump,
    bench_verify_attestations,
);
criterion_main!(benches);
