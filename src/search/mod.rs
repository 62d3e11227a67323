//! Hyperparameter search
//!
//! Tunes an estimator in place before it is cross-validated. Every
//! configuration is scored by the mean of an internal cross-validation
//! that reuses the outer fold strategy; the default scoring metric is
//! `r2`. The best configuration is written back with `set_params`, and
//! the estimator is left unfitted.
//!
//! Three strategies share one [`ParamSpace`] representation:
//! - grid: every combination of list-valued dimensions
//! - random: `n_iter` distinct draws (the full grid when it is smaller)
//! - bayes: Gaussian-process surrogate with expected improvement

mod sampler;
mod space;

pub use space::{Domain, ParamSpace, Subspace};

use crate::cv::{Fold, FoldStrategyRef};
use crate::data::Dataset;
use crate::emulators::{Estimator, HyperParams};
use crate::error::{Result, SurrogateError};
use crate::metrics::{MetricRef, R2};
use crate::runner::{CancellationToken, Workers};
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use sampler::{random_candidates, BayesSampler};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{error, info};

/// Prefix accepted on parameter names for pipeline-style spaces
pub const PIPELINE_PREFIX: &str = "model__";

/// Random start-up evaluations before the surrogate takes over
const BAYES_STARTUP: usize = 5;

/// How candidate configurations are chosen
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchStrategy {
    Grid,
    #[default]
    Random,
    Bayes,
}

impl fmt::Display for SearchStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchStrategy::Grid => write!(f, "grid"),
            SearchStrategy::Random => write!(f, "random"),
            SearchStrategy::Bayes => write!(f, "bayes"),
        }
    }
}

impl FromStr for SearchStrategy {
    type Err = SurrogateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "grid" => Ok(SearchStrategy::Grid),
            "random" => Ok(SearchStrategy::Random),
            "bayes" => Ok(SearchStrategy::Bayes),
            other => Err(SurrogateError::InvalidSearchStrategy(other.to_string())),
        }
    }
}

/// One evaluated configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trial {
    pub index: usize,
    pub params: HyperParams,
    pub mean_score: f64,
    pub fold_scores: Vec<f64>,
}

/// Outcome of a search
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchReport {
    pub model: String,
    pub strategy: SearchStrategy,
    pub metric: String,
    pub trials: Vec<Trial>,
    pub best_params: HyperParams,
    pub best_score: f64,
}

/// Cross-validated hyperparameter search
#[derive(Debug, Clone)]
pub struct HyperparamSearch {
    strategy: SearchStrategy,
    n_iter: usize,
    fold_strategy: FoldStrategyRef,
    scoring: MetricRef,
    workers: Workers,
    random_state: Option<u64>,
    cancel: CancellationToken,
}

impl HyperparamSearch {
    pub fn new(fold_strategy: FoldStrategyRef) -> Self {
        Self {
            strategy: SearchStrategy::default(),
            n_iter: 20,
            fold_strategy,
            scoring: Arc::new(R2),
            workers: Workers::default(),
            random_state: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_strategy(mut self, strategy: SearchStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_n_iter(mut self, n_iter: usize) -> Self {
        self.n_iter = n_iter;
        self
    }

    pub fn with_scoring(mut self, scoring: MetricRef) -> Self {
        self.scoring = scoring;
        self
    }

    pub fn with_workers(mut self, workers: Workers) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_random_state(mut self, seed: Option<u64>) -> Self {
        self.random_state = seed;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn strategy(&self) -> SearchStrategy {
        self.strategy
    }

    /// Tune `estimator` in place and report every trial.
    ///
    /// Without `param_space` the estimator's own space for the strategy is
    /// used. A custom space may name parameters directly or with the
    /// `model__` prefix; unknown names fail with `InvalidParameter` before
    /// anything is evaluated.
    pub fn search(
        &self,
        estimator: &mut dyn Estimator,
        dataset: &Dataset,
        param_space: Option<ParamSpace>,
    ) -> Result<SearchReport> {
        let model = estimator.name().to_string();
        let custom = param_space.is_some();
        let space = match param_space {
            Some(space) => space.strip_prefix(PIPELINE_PREFIX),
            None => estimator.param_space(self.strategy),
        };

        let checked = space.validate().and_then(|_| {
            if custom {
                check_param_names(&*estimator, &space)
            } else {
                Ok(())
            }
        });
        if let Err(err) = checked {
            error!(model = %model, space = ?space, error = %err, "invalid search space");
            return Err(err);
        }
        if self.n_iter == 0 && self.strategy != SearchStrategy::Grid {
            return Err(SurrogateError::Config(
                "search iterations must be at least 1".to_string(),
            ));
        }

        info!(model = %model, strategy = %self.strategy, n_iter = self.n_iter, "hyperparameter search started");
        let outcome = self
            .run_search(&*estimator, dataset, &space)
            .and_then(|report| estimator.set_params(&report.best_params).map(|_| report));
        match outcome {
            Ok(report) => {
                info!(
                    model = %model,
                    best_score = report.best_score,
                    best_params = %report.best_params,
                    trials = report.trials.len(),
                    "hyperparameter search finished"
                );
                Ok(report)
            }
            Err(err) => {
                error!(model = %model, space = ?space, error = %err, "hyperparameter search failed");
                Err(err)
            }
        }
    }

    fn run_search(&self, estimator: &dyn Estimator, dataset: &Dataset, space: &ParamSpace) -> Result<SearchReport> {
        let folds = self.fold_strategy.split(dataset)?;
        let pool = self.workers.build_pool()?;
        let sign = if self.scoring.greater_is_better() { 1.0 } else { -1.0 };

        let trials = match self.strategy {
            SearchStrategy::Grid => {
                let candidates = space.grid()?;
                pool.install(|| self.evaluate_all(estimator, dataset, &folds, candidates))?
            }
            SearchStrategy::Random => {
                let mut rng = match self.random_state {
                    Some(seed) => Xoshiro256PlusPlus::seed_from_u64(seed),
                    None => Xoshiro256PlusPlus::from_entropy(),
                };
                let candidates = random_candidates(space, self.n_iter, &mut rng);
                pool.install(|| self.evaluate_all(estimator, dataset, &folds, candidates))?
            }
            SearchStrategy::Bayes => {
                let mut sampler = BayesSampler::new(self.random_state, BAYES_STARTUP.min(self.n_iter));
                let mut history: Vec<(HyperParams, f64)> = Vec::with_capacity(self.n_iter);
                let mut trials = Vec::with_capacity(self.n_iter);
                for index in 0..self.n_iter {
                    self.cancel.check()?;
                    let Some(params) = sampler.suggest(space, &history) else {
                        break;
                    };
                    let trial = pool.install(|| self.evaluate(estimator, dataset, &folds, index, params))?;
                    history.push((trial.params.clone(), sign * trial.mean_score));
                    trials.push(trial);
                }
                trials
            }
        };

        // Strict comparison keeps the earliest of equally good trials
        let mut best: Option<usize> = None;
        for (i, trial) in trials.iter().enumerate() {
            if best.map_or(true, |b| sign * trial.mean_score > sign * trials[b].mean_score) {
                best = Some(i);
            }
        }
        let best = best.ok_or_else(|| SurrogateError::Search {
            model: estimator.name().to_string(),
            reason: "no configuration was evaluated".to_string(),
        })?;

        Ok(SearchReport {
            model: estimator.name().to_string(),
            strategy: self.strategy,
            metric: self.scoring.name().to_string(),
            best_params: trials[best].params.clone(),
            best_score: trials[best].mean_score,
            trials,
        })
    }

    fn evaluate_all(
        &self,
        estimator: &dyn Estimator,
        dataset: &Dataset,
        folds: &[Fold],
        candidates: Vec<HyperParams>,
    ) -> Result<Vec<Trial>> {
        candidates
            .into_par_iter()
            .enumerate()
            .map(|(index, params)| {
                self.cancel.check()?;
                self.evaluate(estimator, dataset, folds, index, params)
            })
            .collect()
    }

    /// Mean cross-validated score of one configuration
    fn evaluate(
        &self,
        estimator: &dyn Estimator,
        dataset: &Dataset,
        folds: &[Fold],
        index: usize,
        params: HyperParams,
    ) -> Result<Trial> {
        let mut base = estimator.clone_unfitted();
        base.set_params(&params)?;
        let base = &*base;

        let fold_scores = folds
            .par_iter()
            .map(|fold| {
                let (x_train, y_train) = dataset.take(&fold.train_indices);
                let (x_test, y_test) = dataset.take(&fold.test_indices);
                let mut model = base.clone_unfitted();
                model.fit(&x_train, &y_train)?;
                let y_pred = model.predict(&x_test)?;
                if y_pred.dim() != y_test.dim() {
                    return Err(SurrogateError::ShapeMismatch {
                        model: estimator.name().to_string(),
                        fold: fold.index,
                        expected: y_test.dim(),
                        actual: y_pred.dim(),
                    });
                }
                self.scoring.compute(&y_test, &y_pred)
            })
            .collect::<Result<Vec<f64>>>()
            .map_err(|err| match err {
                SurrogateError::Cancelled => err,
                other => SurrogateError::Search {
                    model: estimator.name().to_string(),
                    reason: format!("configuration {} failed: {}", params, other),
                },
            })?;

        let mean_score = fold_scores.iter().sum::<f64>() / fold_scores.len() as f64;
        Ok(Trial {
            index,
            params,
            mean_score,
            fold_scores,
        })
    }
}

/// Every name in a custom space must be a parameter of the estimator
fn check_param_names(estimator: &dyn Estimator, space: &ParamSpace) -> Result<()> {
    let known = estimator.params();
    for name in space.param_names() {
        if !known.contains(&name) {
            return Err(SurrogateError::InvalidParameter {
                name,
                estimator: estimator.name().to_string(),
                reason: format!(
                    "not a parameter of this estimator; expected one of: {}",
                    known.names().collect::<Vec<_>>().join(", ")
                ),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cv::KFold;
    use crate::emulators::{ParamValue, SecondOrderPolynomial};
    use ndarray::Array2;

    fn dataset() -> Dataset {
        let x = Array2::from_shape_fn((24, 2), |(i, j)| {
            if j == 0 {
                i as f64 / 24.0
            } else {
                ((i * 5) % 24) as f64 / 24.0
            }
        });
        let y = Array2::from_shape_fn((24, 1), |(i, _)| x[[i, 0]] * x[[i, 0]] - x[[i, 1]]);
        Dataset::new(x, y).unwrap()
    }

    fn searcher() -> HyperparamSearch {
        HyperparamSearch::new(Arc::new(KFold::new(3).with_random_state(42))).with_random_state(Some(42))
    }

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("bayes".parse::<SearchStrategy>().unwrap(), SearchStrategy::Bayes);
        assert!(matches!(
            "anneal".parse::<SearchStrategy>(),
            Err(SurrogateError::InvalidSearchStrategy(_))
        ));
        assert_eq!(SearchStrategy::default(), SearchStrategy::Random);
    }

    #[test]
    fn test_grid_search_sets_best_params_without_fitting() {
        let mut model = SecondOrderPolynomial::new();
        let space: ParamSpace = Subspace::new().choice("alpha", vec![1e-6, 100.0]).into();
        let report = searcher()
            .with_strategy(SearchStrategy::Grid)
            .search(&mut model, &dataset(), Some(space))
            .unwrap();

        assert_eq!(report.trials.len(), 2);
        assert_eq!(report.best_params.get("alpha"), Some(&ParamValue::Float(1e-6)));
        assert_eq!(model.params().get("alpha"), Some(&ParamValue::Float(1e-6)));
        assert!(!model.is_fitted());
    }

    #[test]
    fn test_prefixed_names_are_accepted() {
        let mut model = SecondOrderPolynomial::new();
        let space: ParamSpace = Subspace::new().choice("model__fit_intercept", vec![true, false]).into();
        let report = searcher()
            .with_strategy(SearchStrategy::Grid)
            .search(&mut model, &dataset(), Some(space))
            .unwrap();
        assert!(report.best_params.contains("fit_intercept"));
    }

    #[test]
    fn test_unknown_custom_param_fails_early() {
        let mut model = SecondOrderPolynomial::new();
        let space: ParamSpace = Subspace::new().choice("depth", vec![1i64, 2]).into();
        let err = searcher().search(&mut model, &dataset(), Some(space)).unwrap_err();
        assert!(matches!(err, SurrogateError::InvalidParameter { .. }));
    }

    /// Accepts parameters on its unfitted copies but not on itself
    struct Sealed {
        sealed: bool,
        fitted: bool,
    }

    impl Estimator for Sealed {
        fn name(&self) -> &str {
            "Sealed"
        }
        fn params(&self) -> HyperParams {
            HyperParams::new().with("alpha", 1.0)
        }
        fn set_params(&mut self, _params: &HyperParams) -> Result<()> {
            if self.sealed {
                return Err(SurrogateError::InvalidParameter {
                    name: "alpha".to_string(),
                    estimator: "Sealed".to_string(),
                    reason: "sealed".to_string(),
                });
            }
            Ok(())
        }
        fn fit(&mut self, _x: &Array2<f64>, _y: &Array2<f64>) -> Result<()> {
            self.fitted = true;
            Ok(())
        }
        fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
            Ok(Array2::from_shape_fn((x.nrows(), 1), |(i, _)| x[[i, 0]] * x[[i, 0]] - x[[i, 1]]))
        }
        fn param_space(&self, _strategy: SearchStrategy) -> ParamSpace {
            Subspace::new().choice("alpha", vec![1.0, 2.0]).into()
        }
        fn clone_unfitted(&self) -> Box<dyn Estimator> {
            Box::new(Sealed {
                sealed: false,
                fitted: false,
            })
        }
        fn is_fitted(&self) -> bool {
            self.fitted
        }
    }

    #[test]
    fn test_applying_best_params_can_fail() {
        let mut model = Sealed {
            sealed: true,
            fitted: false,
        };
        let err = searcher()
            .with_strategy(SearchStrategy::Grid)
            .search(&mut model, &dataset(), None)
            .unwrap_err();
        assert!(matches!(err, SurrogateError::InvalidParameter { .. }));
    }

    #[test]
    fn test_grid_rejects_distributions() {
        let mut model = SecondOrderPolynomial::new();
        let space: ParamSpace = Subspace::new().log_uniform("alpha", 1e-6, 1.0).into();
        let err = searcher()
            .with_strategy(SearchStrategy::Grid)
            .search(&mut model, &dataset(), Some(space))
            .unwrap_err();
        assert!(matches!(err, SurrogateError::InvalidParameter { .. }));
    }

    #[test]
    fn test_random_search_budget() {
        let mut model = SecondOrderPolynomial::new();
        let report = searcher().with_n_iter(4).search(&mut model, &dataset(), None).unwrap();
        assert_eq!(report.trials.len(), 4);
        assert_eq!(report.metric, "r2");
    }

    #[test]
    fn test_bayes_search_runs() {
        let mut model = SecondOrderPolynomial::new();
        let report = searcher()
            .with_strategy(SearchStrategy::Bayes)
            .with_n_iter(7)
            .search(&mut model, &dataset(), None)
            .unwrap();
        assert_eq!(report.trials.len(), 7);
        let best = report.trials.iter().map(|t| t.mean_score).fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(report.best_score, best);
    }
}
