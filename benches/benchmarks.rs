use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use ndarray::Array2;
use pcreg::{FeatureMatrix, Observation, Pca, PcRegression};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::hint::black_box;

/// Generates a seeded random feature matrix of shape (n_rows x n_cols) with a
/// target column appended, for reproducible benchmark inputs.
fn generate_data(n_rows: usize, n_cols: usize, seed: u64) -> FeatureMatrix {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let values = Array2::from_shape_fn((n_rows, n_cols + 1), |_| rng.gen_range(-10.0..10.0));
    let mut names: Vec<String> = (0..n_cols).map(|i| format!("f{}", i)).collect();
    names.push("target".to_string());
    FeatureMatrix::new(names, values).unwrap()
}

fn bench_pca_fit(c: &mut Criterion) {
    let mut group = c.benchmark_group("pca_fit");
    for &(n_rows, n_cols) in &[(50usize, 8usize), (200, 12), (1000, 16)] {
        let data = generate_data(n_rows, n_cols, 42);
        let (features, _) = data.split_target("target").unwrap();
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{}x{}", n_rows, n_cols)),
            &features,
            |b, features| b.iter(|| Pca::fit(black_box(features)).unwrap()),
        );
    }
    group.finish();
}

fn bench_pipeline_fit(c: &mut Criterion) {
    let data = generate_data(200, 12, 7);
    c.bench_function("pcr_fit_200x12_k4", |b| {
        b.iter(|| PcRegression::fit(black_box(&data), "target", 4).unwrap())
    });
}

fn bench_predict(c: &mut Criterion) {
    let data = generate_data(200, 12, 7);
    let model = PcRegression::fit(&data, "target", 4).unwrap();
    let (features, _) = data.split_target("target").unwrap();
    let observation = Observation::from_pairs(
        features
            .names()
            .iter()
            .cloned()
            .zip(features.row(0).iter().copied()),
    );
    c.bench_function("pcr_predict_12_features", |b| {
        b.iter(|| model.predict(black_box(&observation)).unwrap())
    });
}

criterion_group!(benches, bench_pca_fit, bench_pipeline_fit, bench_predict);
criterion_main!(benches);
