use criterion::{criterion_group, criterion_main, Criterion};
use std::hint::black_box;

use battsafe_core::evaluator::{evaluate, recompute_derived};
use battsafe_core::model::PackSnapshot;
use battsafe_core::thresholds::Thresholds;

fn evaluator_bench(c: &mut Criterion) {
    let thresholds = Thresholds::default();

    let mut nominal = PackSnapshot::nominal();
    recompute_derived(&mut nominal);

    let mut anomalous = PackSnapshot::nominal();
    anomalous.modules[4].ntc1_c = 65.0;
    anomalous.modules[4].ntc2_c = 60.0;
    anomalous.gas_ratio_1 = 0.35;
    anomalous.pressure_delta_1_hpa = 8.0;
    recompute_derived(&mut anomalous);

    c.bench_function("evaluate_nominal", |b| {
        b.iter(|| evaluate(black_box(&nominal), black_box(&thresholds)))
    });

    c.bench_function("evaluate_multi_category", |b| {
        b.iter(|| evaluate(black_box(&anomalous), black_box(&thresholds)))
    });

    c.bench_function("recompute_derived_pre_pass", |b| {
        b.iter(|| {
            let mut snap = anomalous.clone();
            recompute_derived(black_box(&mut snap));
        })
    });
}

criterion_group!(benches, evaluator_bench);
criterion_main!(benches);
