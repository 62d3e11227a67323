//! Cross-validation results
//!
//! The [`ScoreTable`] is the tidy, append-only record of one comparison:
//! one row per (model, metric, fold). The [`PredictionStore`] keeps the
//! held-out targets and predictions for every (model, fold) pair. Both are
//! owned by a [`ResultsStore`], which answers aggregate queries.

mod store;

pub use store::{MeanScores, ModelScores, PredictionPanel, ResultsStore};

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Metric used to rank models when none is named: `r2` if scored, else the first
pub fn default_ranking_metric(metrics: &[String]) -> Option<&str> {
    metrics
        .iter()
        .find(|m| m.as_str() == "r2")
        .or_else(|| metrics.first())
        .map(String::as_str)
}

/// One observed score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreRecord {
    pub model: String,
    pub metric: String,
    pub fold: usize,
    pub score: f64,
}

impl ScoreRecord {
    pub fn new(model: impl Into<String>, metric: impl Into<String>, fold: usize, score: f64) -> Self {
        Self {
            model: model.into(),
            metric: metric.into(),
            fold,
            score,
        }
    }
}

/// Ordered sequence of score records
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScoreTable {
    records: Vec<ScoreRecord>,
}

impl ScoreTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, record: ScoreRecord) {
        self.records.push(record);
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = ScoreRecord>) {
        self.records.extend(records);
    }

    pub fn records(&self) -> &[ScoreRecord] {
        &self.records
    }

    pub fn iter(&self) -> impl Iterator<Item = &ScoreRecord> {
        self.records.iter()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }

    /// Model names in order of first appearance
    pub fn models(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for r in &self.records {
            if !names.contains(&r.model) {
                names.push(r.model.clone());
            }
        }
        names
    }

    /// Metric names in order of first appearance
    pub fn metrics(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for r in &self.records {
            if !names.contains(&r.metric) {
                names.push(r.metric.clone());
            }
        }
        names
    }

    pub fn for_model<'a>(&'a self, model: &'a str) -> impl Iterator<Item = &'a ScoreRecord> + 'a {
        self.records.iter().filter(move |r| r.model == model)
    }

    /// Drop every record of a model
    pub fn remove_model(&mut self, model: &str) {
        self.records.retain(|r| r.model != model);
    }
}

/// Held-out targets and predictions of one fold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FoldPrediction {
    pub y_true: Array2<f64>,
    pub y_pred: Array2<f64>,
    /// Predictive standard deviation, for models that provide one
    pub y_std: Option<Array2<f64>>,
    pub test_indices: Vec<usize>,
}

/// Per-(model, fold) predictions; a re-scored model overwrites its entries
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PredictionStore {
    entries: BTreeMap<String, BTreeMap<usize, FoldPrediction>>,
}

impl PredictionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, model: impl Into<String>, fold: usize, prediction: FoldPrediction) {
        self.entries.entry(model.into()).or_default().insert(fold, prediction);
    }

    /// Replace all folds of a model at once
    pub fn replace_model(&mut self, model: impl Into<String>, folds: BTreeMap<usize, FoldPrediction>) {
        self.entries.insert(model.into(), folds);
    }

    pub fn get(&self, model: &str, fold: usize) -> Option<&FoldPrediction> {
        self.entries.get(model).and_then(|f| f.get(&fold))
    }

    /// Fold indices stored for a model, ascending
    pub fn folds(&self, model: &str) -> Vec<usize> {
        self.entries
            .get(model)
            .map(|f| f.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn contains_model(&self, model: &str) -> bool {
        self.entries.contains_key(model)
    }

    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn remove_model(&mut self, model: &str) {
        self.entries.remove(model);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
