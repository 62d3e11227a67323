//! Integration tests for score aggregation and results persistence

use ndarray::array;
use std::collections::BTreeMap;
use surrogate_bench::results::{FoldPrediction, ResultsStore, ScoreRecord};
use surrogate_bench::SurrogateError;

fn store_with(model: &str, metric: &str, scores: &[f64]) -> ResultsStore {
    let mut store = ResultsStore::new();
    for (fold, &score) in scores.iter().enumerate() {
        store.push_score(ScoreRecord::new(model, metric, fold, score));
    }
    store
}

#[test]
fn test_mean_of_five_folds() {
    let store = store_with("GaussianProcess", "r2", &[0.8, 0.9, 0.85, 0.95, 0.7]);
    let mean = store.mean_scores().get("GaussianProcess", "r2").unwrap();
    assert!((mean - 0.84).abs() < 1e-12);

    let summary = store.scores_for("gp").unwrap();
    assert_eq!(summary.folds(), &[0, 1, 2, 3, 4]);
    // sample std dev of the fixture
    assert!((summary.std_dev("r2").unwrap() - 0.096177).abs() < 1e-5);
}

#[test]
fn test_best_fold_prefers_lowest_index_on_ties() {
    let store = store_with("RandomForest", "r2", &[0.5, 0.9, 0.9, 0.3]);
    assert_eq!(store.best_fold("RandomForest", "r2").unwrap(), 1);
    assert_eq!(store.best_fold("rf", "r2").unwrap(), 1);
}

#[test]
fn test_best_fold_minimises_error_metrics() {
    let store = store_with("RandomForest", "rmse", &[0.5, 0.2, 0.2, 0.3]);
    assert_eq!(store.best_fold("RandomForest", "rmse").unwrap(), 1);
    assert!(matches!(
        store.best_fold("RandomForest", "r2"),
        Err(SurrogateError::UnknownMetric { .. })
    ));
}

#[test]
fn test_ranked_by_respects_direction() {
    let mut store = ResultsStore::new();
    for (model, rmse) in [("A", 0.4), ("B", 0.1), ("C", 0.2)] {
        store.push_score(ScoreRecord::new(model, "rmse", 0, rmse));
    }
    let ranked: Vec<String> = store
        .mean_scores()
        .ranked_by("rmse")
        .into_iter()
        .map(|(m, _)| m)
        .collect();
    assert_eq!(ranked, vec!["B", "C", "A"]);
}

#[test]
fn test_unknown_model_query() {
    let store = store_with("RandomForest", "r2", &[0.5]);
    let err = store.scores_for("NeuralNet").unwrap_err();
    assert!(matches!(err, SurrogateError::UnknownModel { .. }));
}

#[test]
fn test_save_and_load_json() {
    let mut store = store_with("SecondOrderPolynomial", "r2", &[0.7, 0.8]);
    store.register_metric("r2", true);
    let mut predictions = BTreeMap::new();
    predictions.insert(
        0,
        FoldPrediction {
            y_true: array![[1.0], [2.0]],
            y_pred: array![[1.1], [1.9]],
            y_std: None,
            test_indices: vec![3, 5],
        },
    );
    store.record_model(
        "GaussianProcess",
        vec![ScoreRecord::new("GaussianProcess", "r2", 0, 0.95)],
        predictions,
    );

    let path = std::env::temp_dir().join(format!("surrogate-bench-{}.json", uuid::Uuid::new_v4()));
    store.save_json(&path).unwrap();
    let loaded = ResultsStore::load_json(&path).unwrap();
    std::fs::remove_file(&path).ok();

    assert_eq!(loaded.scores().len(), 3);
    for (a, b) in loaded.scores().iter().zip(store.scores().iter()) {
        assert_eq!((&a.model, &a.metric, a.fold), (&b.model, &b.metric, b.fold));
        assert!((a.score - b.score).abs() < 1e-12);
    }
    let panels = loaded.plot_predictions(Some("gp")).unwrap();
    assert_eq!(panels.len(), 1);
    assert_eq!(panels[0].fold, 0);
    assert!((panels[0].y_pred[[1, 0]] - 1.9).abs() < 1e-12);
    assert_eq!(
        loaded.predictions().get("GaussianProcess", 0).unwrap().test_indices,
        vec![3, 5]
    );
}
