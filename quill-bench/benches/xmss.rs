//! XMSS / XMSS^MT Benchmarks
//!
//! Benchmarks for key generation, signing and verification using the
//! Criterion framework. Geometries stay small enough that key generation
//! finishes in well under a second per iteration.

use criterion::{black_box, criterion_group, criterion_main, BatchSize, Criterion, Throughput};
use quill_xmss::{CachePolicy, Params, PrivateKey, ThreadMode, XmssMt};
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

/// Test message for signing benchmarks.
const TEST_MESSAGE: &[u8] = b"The quick brown fox jumps over the lazy dog";

/// Signatures taken before a signing key is used as a template.
const WARM_UP_SIGNATURES: usize = 5;

fn geometries() -> [(&'static str, Params); 3] {
    [
        ("h10-d1", Params::new(10, 1)),
        ("h12-d2", Params::new(12, 2)),
        ("h20-d4", Params::new(20, 4)),
    ]
}

/// Benchmark key generation across thread modes.
fn bench_keygen(c: &mut Criterion) {
    let mut group = c.benchmark_group("XMSS KeyGen");

    group.throughput(Throughput::Elements(1));
    // Key generation builds a whole top tree
    group.sample_size(10);

    for (name, params) in geometries() {
        for threads in [ThreadMode::Single, ThreadMode::Full] {
            let engine = XmssMt::new(params.with_threads(threads)).unwrap();
            group.bench_function(format!("{name}/{threads:?}"), |b| {
                b.iter_batched(
                    || ChaCha20Rng::seed_from_u64(42),
                    |mut rng| black_box(engine.generate_keys(&mut rng).unwrap()),
                    BatchSize::SmallInput,
                )
            });
        }
    }

    group.finish();
}

/// Benchmark signing across cache policies.
fn bench_sign(c: &mut Criterion) {
    let mut group = c.benchmark_group("XMSS Sign");

    group.throughput(Throughput::Elements(1));
    group.sample_size(10);

    for (name, params) in geometries() {
        for (policy_name, policy) in [
            ("auto", CachePolicy::default()),
            ("full", CachePolicy::Full),
            ("disabled", CachePolicy::Disabled),
        ] {
            let engine = XmssMt::new(params.with_cache(policy)).unwrap();
            let mut rng = ChaCha20Rng::seed_from_u64(42);
            let (mut sk, _) = engine.generate_keys(&mut rng).unwrap();
            for _ in 0..WARM_UP_SIGNATURES {
                engine.sign(&mut sk, TEST_MESSAGE).unwrap();
            }
            let template = sk.to_bytes();

            group.bench_function(format!("{name}/{policy_name}"), |b| {
                b.iter_batched(
                    || PrivateKey::from_bytes(&template).unwrap(),
                    |mut sk| black_box(engine.sign(&mut sk, TEST_MESSAGE).unwrap()),
                    BatchSize::SmallInput,
                )
            });
        }
    }

    group.finish();
}

/// Benchmark verification.
fn bench_verify(c: &mut Criterion) {
    let mut group = c.benchmark_group("XMSS Verify");

    group.throughput(Throughput::Elements(1));

    for (name, params) in geometries() {
        let engine = XmssMt::new(params).unwrap();
        let mut rng = ChaCha20Rng::seed_from_u64(42);
        let (mut sk, pk) = engine.generate_keys(&mut rng).unwrap();
        let sig = engine.sign(&mut sk, TEST_MESSAGE).unwrap();

        group.bench_function(name, |b| {
            b.iter(|| black_box(engine.verify(&sig, TEST_MESSAGE, &pk)))
        });
    }

    group.finish();
}

criterion_group!(benches, bench_keygen, bench_sign, bench_verify);
criterion_main!(benches);
