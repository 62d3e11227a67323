//! Compare the core emulator families on a synthetic two-output simulation.
//!
//! Run with `cargo run --example compare_emulators`.

use ndarray::Array2;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use surrogate_bench::prelude::*;
use surrogate_bench::report::{format_failures, render_scatter};

/// Branin function and a smooth companion output on [-5, 10] x [0, 15]
fn simulate(n: usize, seed: u64) -> anyhow::Result<Dataset> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let x = Array2::from_shape_fn((n, 2), |(_, j)| {
        if j == 0 {
            rng.gen_range(-5.0..10.0)
        } else {
            rng.gen_range(0.0..15.0)
        }
    });

    let pi = std::f64::consts::PI;
    let (a, b, c) = (1.0, 5.1 / (4.0 * pi * pi), 5.0 / pi);
    let (r, s, t) = (6.0, 10.0, 1.0 / (8.0 * pi));
    let y = Array2::from_shape_fn((n, 2), |(i, k)| {
        let (x1, x2) = (x[[i, 0]], x[[i, 1]]);
        match k {
            0 => a * (x2 - b * x1 * x1 + c * x1 - r).powi(2) + s * (1.0 - t) * x1.cos() + s,
            _ => (0.3 * x1).sin() * (0.2 * x2).cos() * 10.0,
        }
    });
    Ok(Dataset::new(x, y)?)
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("surrogate_bench=info")
        .init();

    let dataset = simulate(120, 3)?;
    let config = CompareConfig::default()
        .with_folds(5)
        .with_metrics(["r2", "rmse", "mae"])
        .with_workers(Workers::All);

    let mut engine = CompareEngine::new(config);
    engine.setup(dataset)?;
    let summary = engine.compare()?;

    println!();
    println!("run {} finished in {:.2}s", summary.run_id, summary.duration_secs);
    engine.print_scores(None)?;
    if !summary.failures.is_empty() {
        println!("{}", format_failures(&summary.failures));
    }

    if let Some(best) = engine.results().mean_scores().ranked_by("r2").first() {
        println!();
        engine.print_scores(Some(&best.0))?;
    }

    println!();
    for panel in engine.plot_predictions(None)? {
        println!("{}", render_scatter(&panel, 0, 40, 12)?);
        println!();
    }

    let path = std::env::temp_dir().join("surrogate-bench-demo.json");
    engine.results().save_json(&path)?;
    println!("results written to {}", path.display());
    Ok(())
}
