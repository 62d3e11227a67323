//! Cross-validation runner
//!
//! Trains and scores estimators fold by fold. Each (model, fold) unit fits
//! a fresh unfitted copy of the estimator, so no state leaks between folds.
//! Units run on a bounded rayon pool; every model's records are collected
//! into its own buffer and merged in input order once the pool joins, so
//! the score table is identical whatever the pool size.
//!
//! [`CrossValidationRunner::run_model`] is strict: the first failure aborts
//! the model. [`CrossValidationRunner::run`] applies that per model and
//! keeps going, reporting failed models next to the usable results.

mod workers;

pub use workers::{CancellationToken, Workers};

use crate::cv::{Fold, FoldStrategyRef};
use crate::data::Dataset;
use crate::emulators::Estimator;
use crate::error::{Result, SurrogateError};
use crate::metrics::MetricRef;
use crate::results::{FoldPrediction, ResultsStore, ScoreRecord};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

/// A model dropped from a comparison, with the reason
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFailure {
    pub model: String,
    pub fold: Option<usize>,
    pub reason: String,
}

impl ModelFailure {
    pub fn from_error(model: &str, err: &SurrogateError) -> Self {
        let fold = match err {
            SurrogateError::FoldEvaluation { fold, .. }
            | SurrogateError::MetricComputation { fold, .. }
            | SurrogateError::ShapeMismatch { fold, .. } => Some(*fold),
            _ => None,
        };
        Self {
            model: model.to_string(),
            fold,
            reason: err.to_string(),
        }
    }
}

/// Everything produced by scoring one model
#[derive(Debug, Clone)]
pub struct ModelRun {
    pub model: String,
    pub records: Vec<ScoreRecord>,
    pub predictions: BTreeMap<usize, FoldPrediction>,
}

/// Outcome of a multi-model sweep
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    /// Models scored successfully, in input order
    pub scored: Vec<String>,
    pub failures: Vec<ModelFailure>,
    pub cancelled: bool,
}

struct FoldOutcome {
    records: Vec<ScoreRecord>,
    prediction: FoldPrediction,
}

/// Scores estimators with k-fold cross-validation
#[derive(Debug, Clone)]
pub struct CrossValidationRunner {
    fold_strategy: FoldStrategyRef,
    metrics: Vec<MetricRef>,
    workers: Workers,
    cancel: CancellationToken,
}

impl CrossValidationRunner {
    pub fn new(fold_strategy: FoldStrategyRef, metrics: Vec<MetricRef>) -> Self {
        Self {
            fold_strategy,
            metrics,
            workers: Workers::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_workers(mut self, workers: Workers) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn metrics(&self) -> &[MetricRef] {
        &self.metrics
    }

    pub fn folds(&self, dataset: &Dataset) -> Result<Vec<Fold>> {
        self.fold_strategy.split(dataset)
    }

    fn evaluate_fold(&self, dataset: &Dataset, estimator: &dyn Estimator, fold: &Fold) -> Result<FoldOutcome> {
        self.cancel.check()?;
        let name = estimator.name().to_string();
        let wrap = |source: SurrogateError| SurrogateError::FoldEvaluation {
            model: name.clone(),
            fold: fold.index,
            source: Box::new(source),
        };

        let (x_train, y_train) = dataset.take(&fold.train_indices);
        let (x_test, y_test) = dataset.take(&fold.test_indices);

        let mut model = estimator.clone_unfitted();
        model.fit(&x_train, &y_train).map_err(wrap)?;
        let (y_pred, y_std) = match model.predict_with_std(&x_test).map_err(wrap)? {
            Some((mean, std)) => (mean, Some(std)),
            None => (model.predict(&x_test).map_err(wrap)?, None),
        };

        if y_pred.dim() != y_test.dim() {
            return Err(SurrogateError::ShapeMismatch {
                model: name,
                fold: fold.index,
                expected: y_test.dim(),
                actual: y_pred.dim(),
            });
        }

        let records = self
            .metrics
            .iter()
            .map(|metric| {
                let score = metric.compute(&y_test, &y_pred).map_err(|e| {
                    SurrogateError::MetricComputation {
                        model: name.clone(),
                        metric: metric.name().to_string(),
                        fold: fold.index,
                        reason: e.to_string(),
                    }
                })?;
                Ok(ScoreRecord::new(name.as_str(), metric.name(), fold.index, score))
            })
            .collect::<Result<Vec<_>>>()?;
        debug!(model = %name, fold = fold.index, "fold scored");

        Ok(FoldOutcome {
            records,
            prediction: FoldPrediction {
                y_true: y_test,
                y_pred,
                y_std,
                test_indices: fold.test_indices.clone(),
            },
        })
    }

    /// Score one estimator on precomputed folds; any failure aborts the model.
    ///
    /// Records come out fold-major, metric-minor.
    pub fn run_model(&self, dataset: &Dataset, estimator: &dyn Estimator, folds: &[Fold]) -> Result<ModelRun> {
        self.cancel.check()?;
        info!(model = %estimator.name(), params = %estimator.params(), "cross-validating");

        let outcomes = folds
            .par_iter()
            .map(|fold| self.evaluate_fold(dataset, estimator, fold))
            .collect::<Result<Vec<_>>>()?;

        let mut records = Vec::with_capacity(outcomes.len() * self.metrics.len());
        let mut predictions = BTreeMap::new();
        for (fold, outcome) in folds.iter().zip(outcomes) {
            records.extend(outcome.records);
            predictions.insert(fold.index, outcome.prediction);
        }
        Ok(ModelRun {
            model: estimator.name().to_string(),
            records,
            predictions,
        })
    }

    /// Score every estimator into `store`, skipping models that fail.
    ///
    /// Setup errors (bad folds, cancellation before the start) are
    /// returned directly; per-model errors become [`ModelFailure`]s.
    pub fn run(
        &self,
        dataset: &Dataset,
        estimators: &[Box<dyn Estimator>],
        store: &mut ResultsStore,
    ) -> Result<RunOutcome> {
        let folds = self.folds(dataset)?;
        store.register_metrics(&self.metrics);
        let pool = self.workers.build_pool()?;

        let results: Vec<Result<ModelRun>> = pool.install(|| {
            estimators
                .par_iter()
                .map(|est| self.run_model(dataset, est.as_ref(), &folds))
                .collect()
        });

        let mut outcome = RunOutcome::default();
        for (est, result) in estimators.iter().zip(results) {
            match result {
                Ok(run) => {
                    store.record_model(&run.model, run.records, run.predictions);
                    outcome.scored.push(run.model);
                }
                Err(SurrogateError::Cancelled) => {
                    outcome.cancelled = true;
                }
                Err(err) => {
                    error!(model = %est.name(), error = %err, "model evaluation failed, skipping");
                    outcome.failures.push(ModelFailure::from_error(est.name(), &err));
                }
            }
        }
        if outcome.cancelled {
            warn!(scored = outcome.scored.len(), "cross-validation cancelled");
        }
        Ok(outcome)
    }
}
