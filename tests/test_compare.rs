//! Integration tests for the comparison engine: reruns, partial failures,
//! cancellation and fold reproducibility

use ndarray::Array2;
use std::io::Write;
use surrogate_bench::compare::{CompareConfig, CompareEngine};
use surrogate_bench::cv::{Fold, KFold, StratifiedKFold};
use surrogate_bench::data::{load_csv, Dataset};
use surrogate_bench::emulators::{Estimator, HyperParams, RandomForest, SecondOrderPolynomial};
use surrogate_bench::registry::ModelRegistry;
use surrogate_bench::runner::CancellationToken;
use surrogate_bench::search::{ParamSpace, SearchStrategy, Subspace};
use surrogate_bench::{Result, SurrogateError};

fn dataset(n: usize) -> Dataset {
    let x = Array2::from_shape_fn((n, 2), |(i, j)| {
        if j == 0 {
            i as f64
        } else {
            ((i * 5) % n) as f64
        }
    });
    let y = Array2::from_shape_fn((n, 1), |(i, _)| 0.5 * x[[i, 0]] + 0.1 * x[[i, 1]] * x[[i, 1]]);
    Dataset::new(x, y).unwrap()
}

/// Returns NaN for any test split that contains an input row with x0 >= `poison_from`
#[derive(Clone)]
struct Unstable {
    poison_from: f64,
    fitted: bool,
    cancel: Option<CancellationToken>,
    refuse_fit: bool,
}

impl Unstable {
    fn new(poison_from: f64) -> Self {
        Self {
            poison_from,
            fitted: false,
            cancel: None,
            refuse_fit: false,
        }
    }

    /// Variant that cancels the surrounding run as soon as it is fitted
    fn cancelling(token: CancellationToken) -> Self {
        Self {
            poison_from: f64::INFINITY,
            fitted: false,
            cancel: Some(token),
            refuse_fit: false,
        }
    }

    /// Variant whose `fit` always fails
    fn unfittable() -> Self {
        Self {
            refuse_fit: true,
            ..Self::new(f64::INFINITY)
        }
    }
}

impl Estimator for Unstable {
    fn name(&self) -> &str {
        "Unstable"
    }

    fn params(&self) -> HyperParams {
        HyperParams::new()
    }

    fn set_params(&mut self, _params: &HyperParams) -> Result<()> {
        Ok(())
    }

    fn fit(&mut self, _x: &Array2<f64>, _y: &Array2<f64>) -> Result<()> {
        if let Some(token) = &self.cancel {
            token.cancel();
        }
        if self.refuse_fit {
            return Err(SurrogateError::DataValidation("singular system".to_string()));
        }
        self.fitted = true;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let poisoned = x.column(0).iter().any(|&v| v >= self.poison_from);
        Ok(Array2::from_elem(
            (x.nrows(), 1),
            if poisoned { f64::NAN } else { 1.0 },
        ))
    }

    fn param_space(&self, _strategy: SearchStrategy) -> ParamSpace {
        Subspace::new().choice("scale", vec![1.0, 2.0]).into()
    }

    fn clone_unfitted(&self) -> Box<dyn Estimator> {
        Box::new(Unstable {
            fitted: false,
            ..self.clone()
        })
    }

    fn is_fitted(&self) -> bool {
        self.fitted
    }
}

fn unshuffled(folds: usize) -> CompareConfig {
    CompareConfig::default()
        .with_folds(folds)
        .with_shuffle(false)
        .with_normalise(false)
}

#[test]
fn test_compare_requires_setup() {
    let mut engine = CompareEngine::new(CompareConfig::default());
    let err = engine.compare().unwrap_err();
    assert!(matches!(err, SurrogateError::NotSetUp));
    assert!(err.is_setup_error());
}

#[test]
fn test_unknown_model_fails_setup() {
    let mut engine = CompareEngine::new(CompareConfig::default().with_models(["sop", "kriging"]));
    let err = engine.setup(dataset(20)).unwrap_err();
    assert!(matches!(err, SurrogateError::UnknownModel { .. }));
}

#[test]
fn test_rerun_resets_results() {
    let mut engine = CompareEngine::new(
        CompareConfig::default()
            .with_folds(4)
            .with_models(["sop", "rf"]),
    );
    engine.setup(dataset(24)).unwrap();

    engine.compare().unwrap();
    let first = engine.results().scores().clone();
    let summary = engine.compare().unwrap();
    let second = engine.results().scores().clone();

    // 2 models x 2 metrics x 4 folds, not doubled
    assert_eq!(first.len(), 16);
    assert_eq!(first, second);
    assert_eq!(summary.models_scored, vec!["SecondOrderPolynomial", "RandomForest"]);
}

#[test]
fn test_failing_fold_drops_only_that_model() {
    // 12 rows, 3 unshuffled folds: fold 2 tests rows 8..12
    let mut registry = ModelRegistry::new();
    registry.register("SecondOrderPolynomial", || Box::new(SecondOrderPolynomial::new()), true);
    registry.register("Unstable", || Box::new(Unstable::new(8.0)), true);

    let mut engine = CompareEngine::with_registry(unshuffled(3), registry);
    engine.setup(dataset(12)).unwrap();
    let summary = engine.compare().unwrap();

    assert_eq!(summary.models_scored, vec!["SecondOrderPolynomial"]);
    assert_eq!(summary.failures.len(), 1);
    let failure = &summary.failures[0];
    assert_eq!(failure.model, "Unstable");
    assert_eq!(failure.fold, Some(2));

    let scores = engine.results().scores();
    assert_eq!(scores.len(), 6);
    assert!(scores.iter().all(|r| r.model == "SecondOrderPolynomial"));
    assert!(engine.results().scores_for("Unstable").is_err());
}

#[test]
fn test_search_failure_skips_only_that_model() {
    let mut registry = ModelRegistry::new();
    registry.register("SecondOrderPolynomial", || Box::new(SecondOrderPolynomial::new()), true);
    registry.register("Unstable", || Box::new(Unstable::unfittable()), true);

    let config = unshuffled(3).with_search(SearchStrategy::Grid, 0);
    let mut engine = CompareEngine::with_registry(config, registry);
    engine.setup(dataset(12)).unwrap();
    let summary = engine.compare().unwrap();

    assert_eq!(summary.models_scored, vec!["SecondOrderPolynomial"]);
    assert_eq!(engine.failures().len(), 1);
    let failure = &engine.failures()[0];
    assert_eq!(failure.model, "Unstable");
    assert_eq!(failure.fold, None);
    assert!(failure.reason.contains("singular system"), "{}", failure.reason);

    let reports = engine.search_reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].model, "SecondOrderPolynomial");
    assert!(!reports[0].trials.is_empty());
    assert_eq!(engine.results().scores().len(), 6);
    assert!(engine.results().scores_for("Unstable").is_err());
}

#[test]
fn test_duplicate_model_names_are_rejected() {
    let mut registry = ModelRegistry::new();
    registry.register("RfSmall", || Box::new(RandomForest::new().with_n_estimators(5)), true);
    registry.register("RfBig", || Box::new(RandomForest::new().with_n_estimators(50)), true);

    let mut engine = CompareEngine::with_registry(unshuffled(3), registry);
    let err = engine.setup(dataset(12)).unwrap_err();
    match err {
        SurrogateError::Config(msg) => assert!(msg.contains("RandomForest"), "{msg}"),
        other => panic!("unexpected error {other:?}"),
    }
}

#[test]
fn test_seed_beyond_i64_is_a_config_error() {
    let config = unshuffled(3)
        .with_models(["rf"])
        .with_random_state(Some(u64::MAX));
    let mut engine = CompareEngine::new(config);
    assert!(matches!(engine.setup(dataset(12)), Err(SurrogateError::Config(_))));
}

#[test]
fn test_cancellation_keeps_completed_models_whole() {
    let token = CancellationToken::new();
    let saboteur = token.clone();

    let mut registry = ModelRegistry::new();
    registry.register("SecondOrderPolynomial", || Box::new(SecondOrderPolynomial::new()), true);
    registry.register(
        "Unstable",
        move || Box::new(Unstable::cancelling(saboteur.clone())),
        true,
    );
    registry.register(
        "RandomForest",
        || Box::new(RandomForest::new().with_n_estimators(5).with_random_state(0)),
        true,
    );
    let mut engine = CompareEngine::with_registry(unshuffled(3), registry).with_cancellation(token);
    engine.setup(dataset(12)).unwrap();

    let summary = engine.compare().unwrap();
    assert!(summary.cancelled);
    assert!(!summary.models_scored.contains(&"Unstable".to_string()));
    for model in &summary.models_scored {
        assert_eq!(engine.results().scores().for_model(model).count(), 6);
    }
}

#[test]
fn test_kfold_seed_42_is_reproducible() {
    let split = || {
        KFold::new(5)
            .with_shuffle(true)
            .with_random_state(42)
            .split_indices(10)
            .unwrap()
    };
    let a: Vec<Fold> = split();
    let b: Vec<Fold> = split();
    assert_eq!(a, b);
    assert_eq!(a.len(), 5);
    assert!(a.iter().all(|f| f.test_indices.len() == 2));
}

fn assert_partition(folds: &[Fold], n: usize) {
    let mut seen: Vec<usize> = folds.iter().flat_map(|f| f.test_indices.clone()).collect();
    seen.sort_unstable();
    assert_eq!(seen, (0..n).collect::<Vec<_>>());
}

#[test]
fn test_test_indices_partition_the_samples() {
    for (n, k) in [(10, 5), (11, 3), (37, 4), (6, 6)] {
        let folds = KFold::new(k)
            .with_shuffle(true)
            .with_random_state(7)
            .split_indices(n)
            .unwrap();
        assert_partition(&folds, n);
    }

    let strata: Vec<f64> = (0..23).map(|i| ((i * 13) % 23) as f64).collect();
    let folds = StratifiedKFold::new(4).split_by(&strata).unwrap();
    assert_partition(&folds, 23);
}

#[test]
fn test_csv_to_comparison() {
    let path = std::env::temp_dir().join(format!("surrogate-bench-{}.csv", uuid::Uuid::new_v4()));
    {
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "speed,angle,lift").unwrap();
        for i in 0..30 {
            let speed = i as f64 / 30.0;
            let angle = ((i * 7) % 30) as f64 / 30.0;
            writeln!(file, "{},{},{}", speed, angle, speed * speed + 0.5 * angle).unwrap();
        }
    }

    let dataset = load_csv(&path, &["lift".to_string()], None).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(dataset.n_features(), 2);

    let mut engine = CompareEngine::new(
        CompareConfig::default()
            .with_folds(3)
            .with_metrics(["r2", "mae"])
            .with_models(["sop"]),
    );
    engine.setup(dataset).unwrap();
    let summary = engine.compare().unwrap();
    assert!(summary.failures.is_empty());

    let means = engine.results().mean_scores();
    let r2 = means.get("SecondOrderPolynomial", "r2").unwrap();
    assert!(r2 > 0.99, "r2 = {r2}");
}
