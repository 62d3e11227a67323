//! Comparison configuration

use crate::cv::FoldStrategyKind;
use crate::error::{Result, SurrogateError};
use crate::metrics::metrics_by_name;
use crate::runner::Workers;
use crate::search::SearchStrategy;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// Settings for one model comparison
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareConfig {
    /// How samples are split into folds
    pub fold_strategy: FoldStrategyKind,
    /// Number of cross-validation folds
    pub folds: usize,
    /// Shuffle samples before splitting
    pub shuffle: bool,
    /// Seed for fold shuffling, search sampling and seeded estimators
    pub random_state: Option<u64>,
    /// Worker pool size; -1 in JSON means all cores
    pub workers: Workers,
    /// Standardise inputs once during setup
    pub normalise: bool,
    /// Tune every model before scoring it
    pub hyperparameter_search: bool,
    pub search_strategy: SearchStrategy,
    pub search_iterations: usize,
    /// Metric names scored on every fold
    pub metrics: Vec<String>,
    /// Subset of long or short model names; `None` means the core models
    pub models: Option<Vec<String>>,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            fold_strategy: FoldStrategyKind::Kfold,
            folds: 5,
            shuffle: true,
            random_state: Some(42),
            workers: Workers::Fixed(1),
            normalise: true,
            hyperparameter_search: false,
            search_strategy: SearchStrategy::Random,
            search_iterations: 20,
            metrics: vec!["rmse".to_string(), "r2".to_string()],
            models: None,
        }
    }
}

impl CompareConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_fold_strategy(mut self, kind: FoldStrategyKind) -> Self {
        self.fold_strategy = kind;
        self
    }

    pub fn with_folds(mut self, folds: usize) -> Self {
        self.folds = folds;
        self
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_random_state(mut self, seed: Option<u64>) -> Self {
        self.random_state = seed;
        self
    }

    pub fn with_workers(mut self, workers: Workers) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_normalise(mut self, normalise: bool) -> Self {
        self.normalise = normalise;
        self
    }

    /// Enable hyperparameter search with the given strategy and budget
    pub fn with_search(mut self, strategy: SearchStrategy, iterations: usize) -> Self {
        self.hyperparameter_search = true;
        self.search_strategy = strategy;
        self.search_iterations = iterations;
        self
    }

    pub fn with_metrics<S: Into<String>>(mut self, metrics: impl IntoIterator<Item = S>) -> Self {
        self.metrics = metrics.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_models<S: Into<String>>(mut self, models: impl IntoIterator<Item = S>) -> Self {
        self.models = Some(models.into_iter().map(Into::into).collect());
        self
    }

    /// Load a JSON config; missing fields take their defaults
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }

    /// Check everything that does not depend on the data
    pub fn validate(&self) -> Result<()> {
        if self.folds < 2 {
            return Err(SurrogateError::Config(format!(
                "folds must be at least 2, got {}",
                self.folds
            )));
        }
        if self.metrics.is_empty() {
            return Err(SurrogateError::Config(
                "at least one metric is required".to_string(),
            ));
        }
        metrics_by_name(&self.metrics)?;
        if let Workers::Fixed(0) = self.workers {
            return Err(SurrogateError::Config(
                "workers must be at least 1, or -1 for all cores".to_string(),
            ));
        }
        if self.hyperparameter_search
            && self.search_iterations == 0
            && self.search_strategy != SearchStrategy::Grid
        {
            return Err(SurrogateError::Config(
                "search_iterations must be at least 1".to_string(),
            ));
        }
        if let Some(seed) = self.random_state {
            if i64::try_from(seed).is_err() {
                return Err(SurrogateError::Config(format!(
                    "random_state must be at most {}, got {}",
                    i64::MAX,
                    seed
                )));
            }
        }
        if let Some(models) = &self.models {
            if models.is_empty() {
                return Err(SurrogateError::Config(
                    "model subset is empty; omit it to compare the core models".to_string(),
                ));
            }
        }
        Ok(())
    }
}
