use super::{default_ranking_metric, FoldPrediction, PredictionStore, ScoreRecord, ScoreTable};
use crate::error::{Result, SurrogateError};
use crate::metrics::{metric_by_name, MetricRef};
use crate::registry::short_name;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracing::info;

/// Scores and predictions of one comparison run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResultsStore {
    scores: ScoreTable,
    predictions: PredictionStore,
    /// metric name -> greater is better
    directions: BTreeMap<String, bool>,
}

/// Mean score per (model, metric)
#[derive(Debug, Clone, PartialEq)]
pub struct MeanScores {
    models: Vec<String>,
    metrics: Vec<String>,
    values: BTreeMap<(String, String), f64>,
    directions: BTreeMap<String, bool>,
}

/// Per-fold scores of a single model with summary rows
#[derive(Debug, Clone, PartialEq)]
pub struct ModelScores {
    model: String,
    metrics: Vec<String>,
    folds: Vec<usize>,
    scores: BTreeMap<(String, usize), f64>,
    mean: BTreeMap<String, f64>,
    std_dev: BTreeMap<String, f64>,
}

/// Data for one true-vs-predicted scatter panel
#[derive(Debug, Clone, PartialEq)]
pub struct PredictionPanel {
    pub model: String,
    pub fold: usize,
    pub y_true: Array2<f64>,
    pub y_pred: Array2<f64>,
    pub y_std: Option<Array2<f64>>,
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Sample standard deviation; 0.0 for fewer than two values
fn sample_std(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let ss: f64 = values.iter().map(|v| (v - m).powi(2)).sum();
    (ss / (values.len() - 1) as f64).sqrt()
}

impl ResultsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remember whether larger values of a metric are better
    pub fn register_metric(&mut self, name: impl Into<String>, greater_is_better: bool) {
        self.directions.insert(name.into(), greater_is_better);
    }

    pub fn register_metrics(&mut self, metrics: &[MetricRef]) {
        for m in metrics {
            self.register_metric(m.name(), m.greater_is_better());
        }
    }

    /// Store a model's results, replacing anything recorded for it before
    pub fn record_model(
        &mut self,
        model: &str,
        records: Vec<ScoreRecord>,
        predictions: BTreeMap<usize, FoldPrediction>,
    ) {
        self.scores.remove_model(model);
        self.scores.extend(records);
        self.predictions.replace_model(model, predictions);
    }

    /// Append a single score, mainly for building fixtures
    pub fn push_score(&mut self, record: ScoreRecord) {
        self.scores.push(record);
    }

    /// Drop all scores and predictions; metric directions are kept
    pub fn reset(&mut self) {
        self.scores.clear();
        self.predictions.clear();
    }

    pub fn scores(&self) -> &ScoreTable {
        &self.scores
    }

    pub fn predictions(&self) -> &PredictionStore {
        &self.predictions
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty() && self.predictions.is_empty()
    }

    /// Known model names, in scoring order
    pub fn model_names(&self) -> Vec<String> {
        let mut names = self.scores.models();
        for m in self.predictions.models() {
            if !names.iter().any(|n| n == m) {
                names.push(m.to_string());
            }
        }
        names
    }

    pub fn greater_is_better(&self, metric: &str) -> bool {
        self.directions
            .get(metric)
            .copied()
            .or_else(|| metric_by_name(metric).ok().map(|m| m.greater_is_better()))
            .unwrap_or(true)
    }

    fn unknown_model(&self, name: &str) -> SurrogateError {
        let available = self.model_names();
        let short_names = available.iter().map(|n| short_name(n)).collect();
        SurrogateError::UnknownModel {
            name: name.to_string(),
            available,
            short_names,
        }
    }

    /// Accept a long or short model name and return the long one
    fn canonical_name(&self, name: &str) -> Result<String> {
        let names = self.model_names();
        names
            .iter()
            .find(|n| n.as_str() == name)
            .or_else(|| names.iter().find(|n| short_name(n) == name))
            .cloned()
            .ok_or_else(|| self.unknown_model(name))
    }

    /// Arithmetic mean of the fold scores of every (model, metric) pair
    pub fn mean_scores(&self) -> MeanScores {
        let mut grouped: BTreeMap<(String, String), Vec<f64>> = BTreeMap::new();
        for r in self.scores.iter() {
            grouped
                .entry((r.model.clone(), r.metric.clone()))
                .or_default()
                .push(r.score);
        }
        let metrics = self.scores.metrics();
        let directions = metrics
            .iter()
            .map(|m| (m.clone(), self.greater_is_better(m)))
            .collect();
        MeanScores {
            models: self.scores.models(),
            metrics,
            values: grouped.into_iter().map(|(k, v)| (k, mean(&v))).collect(),
            directions,
        }
    }

    /// Fold-by-fold scores of one model with mean and sample std dev
    pub fn scores_for(&self, model: &str) -> Result<ModelScores> {
        let model = self.canonical_name(model)?;
        let mut metrics: Vec<String> = Vec::new();
        let mut folds: Vec<usize> = Vec::new();
        let mut scores = BTreeMap::new();
        let mut by_metric: BTreeMap<String, Vec<f64>> = BTreeMap::new();

        for r in self.scores.for_model(&model) {
            if !metrics.contains(&r.metric) {
                metrics.push(r.metric.clone());
            }
            if !folds.contains(&r.fold) {
                folds.push(r.fold);
            }
            scores.insert((r.metric.clone(), r.fold), r.score);
            by_metric.entry(r.metric.clone()).or_default().push(r.score);
        }
        folds.sort_unstable();

        let mean = by_metric.iter().map(|(m, v)| (m.clone(), mean(v))).collect();
        let std_dev = by_metric.iter().map(|(m, v)| (m.clone(), sample_std(v))).collect();
        Ok(ModelScores {
            model,
            metrics,
            folds,
            scores,
            mean,
            std_dev,
        })
    }

    /// Fold with the best score for a metric; ties go to the lowest fold index
    pub fn best_fold(&self, model: &str, metric: &str) -> Result<usize> {
        let model = self.canonical_name(model)?;
        let greater = self.greater_is_better(metric);

        let mut per_fold: Vec<(usize, f64)> = self
            .scores
            .for_model(&model)
            .filter(|r| r.metric == metric)
            .map(|r| (r.fold, r.score))
            .collect();
        per_fold.sort_by_key(|(fold, _)| *fold);

        let mut best: Option<(usize, f64)> = None;
        for (fold, score) in per_fold {
            let better = match best {
                None => true,
                Some((_, b)) if greater => score > b,
                Some((_, b)) => score < b,
            };
            if better {
                best = Some((fold, score));
            }
        }

        best.map(|(fold, _)| fold).ok_or_else(|| SurrogateError::UnknownMetric {
            name: metric.to_string(),
            available: self
                .scores
                .for_model(&model)
                .map(|r| r.metric.clone())
                .fold(Vec::new(), |mut acc, m| {
                    if !acc.contains(&m) {
                        acc.push(m);
                    }
                    acc
                }),
        })
    }

    /// Scatter data: every fold of the named model, else the best fold of each model.
    ///
    /// The best fold is chosen by `r2` when recorded, otherwise by the
    /// first metric in the table.
    pub fn plot_predictions(&self, model: Option<&str>) -> Result<Vec<PredictionPanel>> {
        let panel = |model: &str, fold: usize| {
            self.predictions.get(model, fold).map(|p| PredictionPanel {
                model: model.to_string(),
                fold,
                y_true: p.y_true.clone(),
                y_pred: p.y_pred.clone(),
                y_std: p.y_std.clone(),
            })
        };

        match model {
            Some(name) => {
                let name = self.canonical_name(name)?;
                Ok(self
                    .predictions
                    .folds(&name)
                    .into_iter()
                    .filter_map(|fold| panel(&name, fold))
                    .collect())
            }
            None => {
                let metrics = self.scores.metrics();
                let Some(metric) = default_ranking_metric(&metrics).map(str::to_string) else {
                    return Ok(Vec::new());
                };
                let mut panels = Vec::new();
                for name in self.scores.models() {
                    if let Ok(fold) = self.best_fold(&name, &metric) {
                        panels.extend(panel(&name, fold));
                    }
                }
                Ok(panels)
            }
        }
    }

    pub fn save_json(&self, path: &Path) -> Result<()> {
        let writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer_pretty(writer, self)?;
        info!(path = %path.display(), records = self.scores.len(), "results saved");
        Ok(())
    }

    pub fn load_json(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        Ok(serde_json::from_reader(reader)?)
    }
}

impl MeanScores {
    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn metrics(&self) -> &[String] {
        &self.metrics
    }

    pub fn get(&self, model: &str, metric: &str) -> Option<f64> {
        self.values
            .get(&(model.to_string(), metric.to_string()))
            .copied()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Models with a score for `metric`, best first
    pub fn ranked_by(&self, metric: &str) -> Vec<(String, f64)> {
        let greater = self.directions.get(metric).copied().unwrap_or(true);
        let mut ranked: Vec<(String, f64)> = self
            .models
            .iter()
            .filter_map(|m| self.get(m, metric).map(|s| (m.clone(), s)))
            .collect();
        ranked.sort_by(|a, b| {
            if greater {
                b.1.total_cmp(&a.1)
            } else {
                a.1.total_cmp(&b.1)
            }
        });
        ranked
    }
}

impl ModelScores {
    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn metrics(&self) -> &[String] {
        &self.metrics
    }

    pub fn folds(&self) -> &[usize] {
        &self.folds
    }

    pub fn get(&self, metric: &str, fold: usize) -> Option<f64> {
        self.scores.get(&(metric.to_string(), fold)).copied()
    }

    pub fn mean(&self, metric: &str) -> Option<f64> {
        self.mean.get(metric).copied()
    }

    pub fn std_dev(&self, metric: &str) -> Option<f64> {
        self.std_dev.get(metric).copied()
    }

    /// Labelled rows: one per fold, then `Mean` and `Std Dev`; columns follow `metrics()`
    pub fn rows(&self) -> Vec<(String, Vec<Option<f64>>)> {
        let mut rows: Vec<(String, Vec<Option<f64>>)> = self
            .folds
            .iter()
            .map(|&fold| {
                let cells = self.metrics.iter().map(|m| self.get(m, fold)).collect();
                (fold.to_string(), cells)
            })
            .collect();
        rows.push((
            "Mean".to_string(),
            self.metrics.iter().map(|m| self.mean(m)).collect(),
        ));
        rows.push((
            "Std Dev".to_string(),
            self.metrics.iter().map(|m| self.std_dev(m)).collect(),
        ));
        rows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn store_with(model: &str, metric: &str, scores: &[f64]) -> ResultsStore {
        let mut store = ResultsStore::new();
        for (fold, s) in scores.iter().enumerate() {
            store.push_score(ScoreRecord::new(model, metric, fold, *s));
        }
        store
    }

    #[test]
    fn test_sample_std() {
        assert_eq!(sample_std(&[0.5]), 0.0);
        assert!((sample_std(&[1.0, 2.0, 3.0]) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_best_fold_minimises_error_metrics() {
        let store = store_with("RandomForest", "rmse", &[0.4, 0.1, 0.3, 0.1]);
        assert_eq!(store.best_fold("RandomForest", "rmse").unwrap(), 1);
        assert_eq!(store.best_fold("rf", "rmse").unwrap(), 1);
    }

    #[test]
    fn test_best_fold_unknown_metric() {
        let store = store_with("RandomForest", "r2", &[0.4]);
        let err = store.best_fold("RandomForest", "mae").unwrap_err();
        assert!(matches!(err, SurrogateError::UnknownMetric { .. }));
    }

    #[test]
    fn test_unknown_model_lists_known_names() {
        let store = store_with("GaussianProcess", "r2", &[0.9]);
        match store.scores_for("nn").unwrap_err() {
            SurrogateError::UnknownModel { available, short_names, .. } => {
                assert_eq!(available, vec!["GaussianProcess"]);
                assert_eq!(short_names, vec!["gp"]);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_ranked_by_respects_direction() {
        let mut store = ResultsStore::new();
        store.push_score(ScoreRecord::new("a", "rmse", 0, 0.3));
        store.push_score(ScoreRecord::new("b", "rmse", 0, 0.1));
        store.push_score(ScoreRecord::new("a", "r2", 0, 0.9));
        store.push_score(ScoreRecord::new("b", "r2", 0, 0.7));
        let means = store.mean_scores();
        assert_eq!(means.ranked_by("rmse")[0].0, "b");
        assert_eq!(means.ranked_by("r2")[0].0, "a");
        assert!(means.get("a", "mae").is_none());
    }

    #[test]
    fn test_plot_predictions_best_fold_per_model() {
        let mut store = store_with("RandomForest", "r2", &[0.2, 0.8]);
        for fold in 0..2 {
            store.predictions.insert(
                "RandomForest",
                fold,
                FoldPrediction {
                    y_true: array![[fold as f64]],
                    y_pred: array![[0.0]],
                    y_std: None,
                    test_indices: vec![fold],
                },
            );
        }
        let panels = store.plot_predictions(None).unwrap();
        assert_eq!(panels.len(), 1);
        assert_eq!(panels[0].fold, 1);
        assert_eq!(store.plot_predictions(Some("rf")).unwrap().len(), 2);
    }
}
