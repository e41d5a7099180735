//! Benchmarks for program generation throughput.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use cprogen_core::policy::{GenPolicy, LanguageMode};
use cprogen_core::Generator;

/// Benchmark generation time as the statement/array-size budget grows.
fn bench_generate_by_size(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate_by_array_size");

    for &max_size in &[8u32, 16, 32, 64, 128] {
        let mut policy = GenPolicy::default();
        policy.max_array_size = max_size;
        policy.min_array_size = policy.min_array_size.min(max_size);
        group.throughput(Throughput::Elements(max_size as u64));

        group.bench_function(format!("{}_max_size", max_size), |b| {
            b.iter(|| {
                let mut generator = Generator::new(black_box(42), policy.clone());
                let program = generator.generate();
                black_box(program)
            })
        });
    }

    group.finish();
}

/// Benchmark generation across language modes, since ISPC's `foreach`/uniform
/// bookkeeping walks extra branches the plain-C path skips.
fn bench_generate_by_language_mode(c: &mut Criterion) {
    let mut group = c.benchmark_group("generate_by_language_mode");

    for mode in [LanguageMode::C, LanguageMode::Cxx, LanguageMode::Ispc, LanguageMode::Sycl] {
        let mut policy = GenPolicy::default();
        policy.language_mode = mode;

        group.bench_function(format!("{:?}", mode), |b| {
            b.iter(|| {
                let mut generator = Generator::new(black_box(7), policy.clone());
                let program = generator.generate();
                black_box(program)
            })
        });
    }

    group.finish();
}

/// Benchmark raw seed-to-seed throughput with the default policy, the shape
/// most consumers hit when sweeping many seeds for a fuzzing campaign.
fn bench_generate_many_seeds(c: &mut Criterion) {
    let policy = GenPolicy::default();

    c.bench_function("generate_default_policy", |b| {
        b.iter(|| {
            let mut generator = Generator::new(black_box(123), policy.clone());
            let program = generator.generate();
            black_box(program)
        })
    });
}

criterion_group!(
    benches,
    bench_generate_by_size,
    bench_generate_by_language_mode,
    bench_generate_many_seeds,
);
criterion_main!(benches);
