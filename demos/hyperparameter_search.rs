//! Tune individual emulators, then compare them with search switched on.
//!
//! Run with `cargo run --example hyperparameter_search`.

use ndarray::Array2;
use std::sync::Arc;
use surrogate_bench::prelude::*;
use surrogate_bench::report::format_search_report;
use surrogate_bench::search::Domain;

fn simulate(n: usize) -> anyhow::Result<Dataset> {
    let x = Array2::from_shape_fn((n, 3), |(i, j)| ((i * (2 * j + 3)) % n) as f64 / n as f64);
    let y = Array2::from_shape_fn((n, 1), |(i, _)| {
        let (a, b, c) = (x[[i, 0]], x[[i, 1]], x[[i, 2]]);
        (3.0 * a).sin() + b * b - 0.5 * a * c
    });
    Ok(Dataset::new(x, y)?)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("surrogate_bench=info")
        .init();

    let dataset = simulate(80)?;
    let folds = Arc::new(KFold::new(4).with_shuffle(true).with_random_state(42));

    // Bayesian search over the built-in Gaussian process space
    let mut gp = GaussianProcess::new();
    let report = HyperparamSearch::new(folds.clone())
        .with_strategy(SearchStrategy::Bayes)
        .with_n_iter(12)
        .with_random_state(Some(42))
        .search(&mut gp, &dataset, None)?;
    println!("{}", format_search_report(&report));

    // Conditional space for the radial basis interpolator, pipeline-style names
    let space = ParamSpace::Conditional(vec![
        Subspace::new()
            .choice("model__kernel", vec!["thin_plate_spline", "cubic"])
            .choice("model__degree", vec![1i64, 2])
            .add("model__smoothing", Domain::Uniform { low: 0.0, high: 0.5 }),
        Subspace::new()
            .choice("model__kernel", vec!["gaussian", "multiquadric"])
            .choice("model__degree", vec![-1i64, 0, 1])
            .log_uniform("model__epsilon", 0.1, 10.0),
    ]);
    let mut rbf = RadialBasisFunctions::new();
    let report = HyperparamSearch::new(folds)
        .with_strategy(SearchStrategy::Random)
        .with_n_iter(15)
        .with_random_state(Some(42))
        .search(&mut rbf, &dataset, Some(space))?;
    println!("{}", format_search_report(&report));
    println!("tuned rbf: {}", rbf.params());

    // Whole comparison with a random search per model
    let config = CompareConfig::default()
        .with_folds(4)
        .with_models(["sop", "gp", "svm", "rbf"])
        .with_search(SearchStrategy::Random, 10);
    let mut engine = CompareEngine::new(config);
    engine.setup(dataset)?;
    engine.compare()?;
    for report in engine.search_reports() {
        println!("{}", format_search_report(report));
    }
    engine.print_scores(None)?;
    Ok(())
}
