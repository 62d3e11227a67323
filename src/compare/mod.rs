//! Model comparison engine
//!
//! Ties the pieces together: `setup` validates the configuration and data,
//! normalises the inputs and resolves the models; `compare` optionally tunes
//! each model, cross-validates all of them and keeps the results for
//! reporting. Each `compare` call starts from an empty results store.

mod config;

pub use config::CompareConfig;

use crate::cv::FoldStrategyRef;
use crate::data::{Dataset, StandardScaler};
use crate::emulators::{Estimator, HyperParams};
use crate::error::{Result, SurrogateError};
use crate::metrics::{metrics_by_name, MetricRef};
use crate::registry::{default_registry, ModelRegistry};
use crate::report;
use crate::results::{PredictionPanel, ResultsStore};
use crate::runner::{CancellationToken, CrossValidationRunner, ModelFailure};
use crate::search::{HyperparamSearch, SearchReport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Summary of one `compare` run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompareSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub duration_secs: f64,
    pub models_scored: Vec<String>,
    pub failures: Vec<ModelFailure>,
    pub cancelled: bool,
}

/// State built by `setup`
struct Prepared {
    dataset: Dataset,
    scaler: Option<StandardScaler>,
    models: Vec<Box<dyn Estimator>>,
    fold_strategy: FoldStrategyRef,
    metrics: Vec<MetricRef>,
}

/// Compares emulator families on one dataset
pub struct CompareEngine {
    config: CompareConfig,
    registry: ModelRegistry,
    prepared: Option<Prepared>,
    results: ResultsStore,
    failures: Vec<ModelFailure>,
    search_reports: Vec<SearchReport>,
    cancel: CancellationToken,
}

impl CompareEngine {
    /// Engine over the built-in model families
    pub fn new(config: CompareConfig) -> Self {
        Self::with_registry(config, default_registry())
    }

    pub fn with_registry(config: CompareConfig, registry: ModelRegistry) -> Self {
        Self {
            config,
            registry,
            prepared: None,
            results: ResultsStore::new(),
            failures: Vec::new(),
            search_reports: Vec::new(),
            cancel: CancellationToken::new(),
        }
    }

    /// Share an existing token, e.g. with a signal handler
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub fn config(&self) -> &CompareConfig {
        &self.config
    }

    pub fn registry(&self) -> &ModelRegistry {
        &self.registry
    }

    /// Validate inputs and prepare models, folds and metrics.
    ///
    /// Every error here is a setup error: nothing has been fitted yet.
    pub fn setup(&mut self, dataset: Dataset) -> Result<()> {
        self.config.validate()?;
        if dataset.n_samples() < self.config.folds {
            return Err(SurrogateError::DataValidation(format!(
                "{} samples cannot be split into {} folds",
                dataset.n_samples(),
                self.config.folds
            )));
        }

        let mut dataset = dataset;
        let scaler = if self.config.normalise {
            let mut scaler = StandardScaler::new();
            dataset.standardise(&mut scaler)?;
            Some(scaler)
        } else {
            None
        };

        let mut models = self.registry.resolve(self.config.models.as_deref())?;
        let mut seen = HashSet::new();
        if let Some(dup) = models.iter().map(|m| m.name()).find(|name| !seen.insert(*name)) {
            return Err(SurrogateError::Config(format!(
                "two selected models are both named '{}'; results are keyed by model name, \
                 so give each estimator a distinct name or select only one of them",
                dup
            )));
        }
        if let Some(seed) = self.config.random_state {
            let seeded = HyperParams::new().with("random_state", seed as i64);
            for model in models.iter_mut().filter(|m| m.params().contains("random_state")) {
                model.set_params(&seeded)?;
            }
        }

        let fold_strategy =
            self.config
                .fold_strategy
                .build(self.config.folds, self.config.shuffle, self.config.random_state);
        let metrics = metrics_by_name(&self.config.metrics)?;

        info!(
            n_samples = dataset.n_samples(),
            n_features = dataset.n_features(),
            n_outputs = dataset.n_outputs(),
            models = models.len(),
            folds = self.config.folds,
            "comparison set up"
        );
        self.prepared = Some(Prepared {
            dataset,
            scaler,
            models,
            fold_strategy,
            metrics,
        });
        Ok(())
    }

    /// Token that stops a running comparison between models and folds
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Run the comparison; earlier results are discarded first
    pub fn compare(&mut self) -> Result<CompareSummary> {
        let prepared = self.prepared.as_ref().ok_or(SurrogateError::NotSetUp)?;
        let run_id = Uuid::new_v4();
        let started_at = Utc::now();
        let start = Instant::now();

        self.results.reset();
        self.failures.clear();
        self.search_reports.clear();
        self.cancel.reset();
        info!(%run_id, models = prepared.models.len(), "comparison started");

        let mut candidates: Vec<Box<dyn Estimator>> =
            prepared.models.iter().map(|m| m.clone_unfitted()).collect();
        let mut cancelled = false;

        if self.config.hyperparameter_search {
            let search = HyperparamSearch::new(prepared.fold_strategy.clone())
                .with_strategy(self.config.search_strategy)
                .with_n_iter(self.config.search_iterations)
                .with_workers(self.config.workers)
                .with_random_state(self.config.random_state)
                .with_cancellation(self.cancel.clone());

            let mut tuned = Vec::with_capacity(candidates.len());
            for mut model in candidates {
                if self.cancel.is_cancelled() {
                    cancelled = true;
                    break;
                }
                match search.search(model.as_mut(), &prepared.dataset, None) {
                    Ok(report) => {
                        self.search_reports.push(report);
                        tuned.push(model);
                    }
                    Err(SurrogateError::Cancelled) => {
                        cancelled = true;
                        break;
                    }
                    Err(err) => {
                        error!(model = %model.name(), error = %err, "search failed, skipping model");
                        self.failures.push(ModelFailure::from_error(model.name(), &err));
                    }
                }
            }
            candidates = tuned;
        }

        let mut scored = Vec::new();
        if !cancelled {
            let runner = CrossValidationRunner::new(prepared.fold_strategy.clone(), prepared.metrics.clone())
                .with_workers(self.config.workers)
                .with_cancellation(self.cancel.clone());
            let outcome = runner.run(&prepared.dataset, &candidates, &mut self.results)?;
            scored = outcome.scored;
            self.failures.extend(outcome.failures);
            cancelled = outcome.cancelled;
        }

        if cancelled {
            warn!(%run_id, scored = scored.len(), "comparison cancelled");
        }
        info!(
            %run_id,
            scored = scored.len(),
            failed = self.failures.len(),
            "comparison finished"
        );
        Ok(CompareSummary {
            run_id,
            started_at,
            duration_secs: start.elapsed().as_secs_f64(),
            models_scored: scored,
            failures: self.failures.clone(),
            cancelled,
        })
    }

    pub fn results(&self) -> &ResultsStore {
        &self.results
    }

    pub fn failures(&self) -> &[ModelFailure] {
        &self.failures
    }

    pub fn search_reports(&self) -> &[SearchReport] {
        &self.search_reports
    }

    /// Names of the models prepared by `setup`
    pub fn model_names(&self) -> Vec<String> {
        self.prepared
            .as_ref()
            .map(|p| p.models.iter().map(|m| m.name().to_string()).collect())
            .unwrap_or_default()
    }

    /// Scaler fitted on the inputs, when normalisation is on
    pub fn scaler(&self) -> Option<&StandardScaler> {
        self.prepared.as_ref().and_then(|p| p.scaler.as_ref())
    }

    /// Print mean scores of all models, or per-fold scores of one
    pub fn print_scores(&self, model: Option<&str>) -> Result<()> {
        let text = match model {
            Some(name) => report::format_model_scores(&self.results.scores_for(name)?),
            None => report::format_mean_scores(&self.results.mean_scores()),
        };
        println!("{}", text);
        Ok(())
    }

    /// Scatter panels: every fold of `model`, else the best fold of each model
    pub fn plot_predictions(&self, model: Option<&str>) -> Result<Vec<PredictionPanel>> {
        self.results.plot_predictions(model)
    }
}
