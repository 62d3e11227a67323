use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array2;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use surrogate_bench::prelude::*;

fn create_simulation_data(n_rows: usize, n_features: usize) -> Dataset {
    let mut rng = ChaCha8Rng::seed_from_u64(7);
    let x = Array2::from_shape_fn((n_rows, n_features), |_| rng.gen::<f64>());

    // Smooth response with an interaction term + noise
    let y = Array2::from_shape_fn((n_rows, 1), |(i, _)| {
        let row = x.row(i);
        let base: f64 = row.iter().enumerate().map(|(j, v)| (j as f64 + 1.0) * v.sin()).sum();
        base + row[0] * row[n_features - 1] + rng.gen::<f64>() * 0.01
    });
    Dataset::new(x, y).expect("benchmark data is valid")
}

fn bench_compare(c: &mut Criterion) {
    let mut group = c.benchmark_group("compare");
    group.sample_size(10);

    for n_rows in [50, 100, 200].iter() {
        let data = create_simulation_data(*n_rows, 4);

        group.bench_with_input(BenchmarkId::new("core_models", n_rows), &data, |b, data| {
            b.iter(|| {
                let config = CompareConfig::default()
                    .with_folds(5)
                    .with_workers(Workers::All);
                let mut engine = CompareEngine::new(config);
                engine.setup(black_box(data.clone())).unwrap();
                engine.compare().unwrap()
            })
        });
    }

    group.finish();
}

fn bench_single_family(c: &mut Criterion) {
    let mut group = c.benchmark_group("cross_validate");
    group.sample_size(10);
    let data = create_simulation_data(150, 4);

    for model in ["sop", "gp", "rbf", "svm"] {
        group.bench_with_input(BenchmarkId::new("model", model), &data, |b, data| {
            b.iter(|| {
                let config = CompareConfig::default().with_models([model]);
                let mut engine = CompareEngine::new(config);
                engine.setup(black_box(data.clone())).unwrap();
                engine.compare().unwrap()
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_compare, bench_single_family);
criterion_main!(benches);
