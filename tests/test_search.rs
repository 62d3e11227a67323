//! Integration tests for hyperparameter search

use ndarray::Array2;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use surrogate_bench::cv::KFold;
use surrogate_bench::data::Dataset;
use surrogate_bench::emulators::{Estimator, HyperParams, ParamValue, SecondOrderPolynomial};
use surrogate_bench::search::{HyperparamSearch, ParamSpace, SearchStrategy, Subspace};
use surrogate_bench::{Result, SurrogateError};

/// Predicts `a * x0 + (b - 3) / 10`; counts fits and records the
/// configurations it was fitted with
#[derive(Clone)]
struct Recorder {
    a: i64,
    b: i64,
    fitted: bool,
    fits: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<(i64, i64)>>>,
}

impl Recorder {
    fn new() -> Self {
        Self {
            a: 1,
            b: 4,
            fitted: false,
            fits: Arc::new(AtomicUsize::new(0)),
            seen: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl Estimator for Recorder {
    fn name(&self) -> &str {
        "Recorder"
    }

    fn params(&self) -> HyperParams {
        HyperParams::new().with("a", self.a).with("b", self.b)
    }

    fn set_params(&mut self, params: &HyperParams) -> Result<()> {
        for (name, value) in params.iter() {
            let v = value.as_int().ok_or_else(|| SurrogateError::InvalidParameter {
                name: name.clone(),
                estimator: "Recorder".to_string(),
                reason: "expected an integer".to_string(),
            })?;
            match name.as_str() {
                "a" => self.a = v,
                "b" => self.b = v,
                other => {
                    return Err(SurrogateError::InvalidParameter {
                        name: other.to_string(),
                        estimator: "Recorder".to_string(),
                        reason: "unknown".to_string(),
                    })
                }
            }
        }
        Ok(())
    }

    fn fit(&mut self, _x: &Array2<f64>, _y: &Array2<f64>) -> Result<()> {
        self.fits.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut seen) = self.seen.lock() {
            seen.push((self.a, self.b));
        }
        self.fitted = true;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let offset = (self.b - 3) as f64 / 10.0;
        Ok(Array2::from_shape_fn((x.nrows(), 1), |(i, _)| {
            self.a as f64 * x[[i, 0]] + offset
        }))
    }

    fn param_space(&self, _strategy: SearchStrategy) -> ParamSpace {
        Subspace::new().choice("a", vec![1i64, 2]).choice("b", vec![3i64, 4]).into()
    }

    fn clone_unfitted(&self) -> Box<dyn Estimator> {
        Box::new(Recorder {
            fitted: false,
            ..self.clone()
        })
    }

    fn is_fitted(&self) -> bool {
        self.fitted
    }
}

fn dataset() -> Dataset {
    let x = Array2::from_shape_fn((18, 1), |(i, _)| i as f64 / 18.0);
    let y = x.mapv(|v| 2.0 * v);
    Dataset::new(x, y).unwrap()
}

fn search(strategy: SearchStrategy) -> HyperparamSearch {
    HyperparamSearch::new(Arc::new(KFold::new(3).with_random_state(42)))
        .with_strategy(strategy)
        .with_random_state(Some(42))
}

#[test]
fn test_grid_evaluates_each_combination_once() {
    let mut recorder = Recorder::new();
    let fits = recorder.fits.clone();
    let seen = recorder.seen.clone();

    let report = search(SearchStrategy::Grid)
        .search(&mut recorder, &dataset(), None)
        .unwrap();

    assert_eq!(report.trials.len(), 4);
    // 4 combinations x 3 folds, no refit afterwards
    assert_eq!(fits.load(Ordering::SeqCst), 12);

    let mut combos = seen.lock().unwrap().clone();
    combos.sort_unstable();
    combos.dedup();
    assert_eq!(combos, vec![(1, 3), (1, 4), (2, 3), (2, 4)]);

    assert_eq!(report.best_params.get("a"), Some(&ParamValue::Int(2)));
    assert_eq!(report.best_params.get("b"), Some(&ParamValue::Int(3)));
    assert!((report.best_score - 1.0).abs() < 1e-12);
    assert_eq!(recorder.a, 2);
    assert!(!recorder.is_fitted());
}

#[test]
fn test_random_search_on_small_space_enumerates_it() {
    let mut recorder = Recorder::new();
    let report = search(SearchStrategy::Random)
        .with_n_iter(20)
        .search(&mut recorder, &dataset(), None)
        .unwrap();
    assert_eq!(report.trials.len(), 4);
    assert_eq!(report.strategy, SearchStrategy::Random);
}

#[test]
fn test_bayes_search_stops_when_space_is_exhausted() {
    let mut recorder = Recorder::new();
    let report = search(SearchStrategy::Bayes)
        .with_n_iter(10)
        .search(&mut recorder, &dataset(), None)
        .unwrap();
    assert_eq!(report.trials.len(), 4);
    assert_eq!(report.best_params.get("a"), Some(&ParamValue::Int(2)));
}

#[test]
fn test_prefixed_custom_space() {
    let mut recorder = Recorder::new();
    let space: ParamSpace = Subspace::new().choice("model__a", vec![1i64, 2]).into();
    let report = search(SearchStrategy::Grid)
        .search(&mut recorder, &dataset(), Some(space))
        .unwrap();
    assert_eq!(report.trials.len(), 2);
    assert!(report.best_params.contains("a"));
    assert!(!report.best_params.contains("model__a"));
}

#[test]
fn test_grid_with_distribution_is_invalid() {
    let mut model = SecondOrderPolynomial::new();
    let space: ParamSpace = Subspace::new().log_uniform("alpha", 1e-6, 1.0).into();
    let err = search(SearchStrategy::Grid)
        .search(&mut model, &dataset(), Some(space))
        .unwrap_err();
    assert!(matches!(err, SurrogateError::InvalidParameter { .. }));
}

#[test]
fn test_random_search_is_reproducible() {
    let run = || {
        let mut model = SecondOrderPolynomial::new();
        search(SearchStrategy::Random)
            .with_n_iter(5)
            .search(&mut model, &dataset(), None)
            .unwrap()
    };
    let a = run();
    let b = run();
    assert_eq!(a.trials, b.trials);
    assert_eq!(a.best_params, b.best_params);
}
