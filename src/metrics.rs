//! Regression scoring metrics
//!
//! Every metric scores each output column separately and returns the
//! uniform mean across outputs, so single- and multi-output targets are
//! handled the same way.

use crate::error::{Result, SurrogateError};
use ndarray::{Array2, ArrayView1, Axis};
use std::fmt;
use std::sync::Arc;

/// Scoring function applied to one fold's held-out predictions
pub trait Metric: Send + Sync {
    /// Name used in score tables ("r2", "rmse", ...)
    fn name(&self) -> &str;

    /// Whether a larger score means a better model
    fn greater_is_better(&self) -> bool;

    /// Score predictions against the true targets, both shaped (n, o)
    fn compute(&self, y_true: &Array2<f64>, y_pred: &Array2<f64>) -> Result<f64>;
}

impl fmt::Debug for dyn Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Metric({})", self.name())
    }
}

/// Shared handle to a metric
pub type MetricRef = Arc<dyn Metric>;

/// Names of the built-in metrics
pub const METRIC_NAMES: [&str; 3] = ["r2", "rmse", "mae"];

/// Coefficient of determination
#[derive(Debug, Clone, Copy, Default)]
pub struct R2;

/// Root mean squared error
#[derive(Debug, Clone, Copy, Default)]
pub struct Rmse;

/// Mean absolute error
#[derive(Debug, Clone, Copy, Default)]
pub struct Mae;

fn check_inputs(y_true: &Array2<f64>, y_pred: &Array2<f64>) -> Result<()> {
    if y_true.dim() != y_pred.dim() {
        return Err(SurrogateError::DataValidation(format!(
            "y_true has shape {:?} but y_pred has shape {:?}",
            y_true.dim(),
            y_pred.dim()
        )));
    }
    if y_true.is_empty() {
        return Err(SurrogateError::DataValidation(
            "cannot score an empty prediction".to_string(),
        ));
    }
    Ok(())
}

/// Apply a per-column score and average across outputs
fn uniform_average<F>(y_true: &Array2<f64>, y_pred: &Array2<f64>, per_output: F) -> Result<f64>
where
    F: Fn(ArrayView1<f64>, ArrayView1<f64>) -> f64,
{
    check_inputs(y_true, y_pred)?;
    let n_outputs = y_true.ncols() as f64;
    let total: f64 = y_true
        .axis_iter(Axis(1))
        .zip(y_pred.axis_iter(Axis(1)))
        .map(|(t, p)| per_output(t, p))
        .sum();
    let score = total / n_outputs;

    if !score.is_finite() {
        return Err(SurrogateError::DataValidation(format!(
            "score is not finite ({})",
            score
        )));
    }
    Ok(score)
}

impl Metric for R2 {
    fn name(&self) -> &str {
        "r2"
    }

    fn greater_is_better(&self) -> bool {
        true
    }

    fn compute(&self, y_true: &Array2<f64>, y_pred: &Array2<f64>) -> Result<f64> {
        uniform_average(y_true, y_pred, |t, p| {
            let n = t.len() as f64;
            let mean = t.sum() / n;
            let ss_tot: f64 = t.iter().map(|y| (y - mean).powi(2)).sum();
            let ss_res: f64 = t.iter().zip(p.iter()).map(|(a, b)| (a - b).powi(2)).sum();

            if ss_tot > 0.0 {
                1.0 - ss_res / ss_tot
            } else if ss_res == 0.0 {
                1.0
            } else {
                0.0
            }
        })
    }
}

impl Metric for Rmse {
    fn name(&self) -> &str {
        "rmse"
    }

    fn greater_is_better(&self) -> bool {
        false
    }

    fn compute(&self, y_true: &Array2<f64>, y_pred: &Array2<f64>) -> Result<f64> {
        uniform_average(y_true, y_pred, |t, p| {
            let n = t.len() as f64;
            let mse: f64 = t.iter().zip(p.iter()).map(|(a, b)| (a - b).powi(2)).sum::<f64>() / n;
            mse.sqrt()
        })
    }
}

impl Metric for Mae {
    fn name(&self) -> &str {
        "mae"
    }

    fn greater_is_better(&self) -> bool {
        false
    }

    fn compute(&self, y_true: &Array2<f64>, y_pred: &Array2<f64>) -> Result<f64> {
        uniform_average(y_true, y_pred, |t, p| {
            let n = t.len() as f64;
            t.iter().zip(p.iter()).map(|(a, b)| (a - b).abs()).sum::<f64>() / n
        })
    }
}

/// Look up a built-in metric by name
pub fn metric_by_name(name: &str) -> Result<MetricRef> {
    match name {
        "r2" => Ok(Arc::new(R2)),
        "rmse" => Ok(Arc::new(Rmse)),
        "mae" => Ok(Arc::new(Mae)),
        _ => Err(SurrogateError::UnknownMetric {
            name: name.to_string(),
            available: METRIC_NAMES.iter().map(|s| s.to_string()).collect(),
        }),
    }
}

/// Resolve a list of metric names, preserving order
pub fn metrics_by_name<S: AsRef<str>>(names: &[S]) -> Result<Vec<MetricRef>> {
    names.iter().map(|n| metric_by_name(n.as_ref())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_regression_metrics() {
        let y_true = array![[1.0], [2.0], [3.0], [4.0], [5.0]];
        let y_pred = array![[1.1], [2.1], [2.9], [4.2], [4.8]];

        let r2 = R2.compute(&y_true, &y_pred).unwrap();
        let rmse = Rmse.compute(&y_true, &y_pred).unwrap();
        let mae = Mae.compute(&y_true, &y_pred).unwrap();

        assert!(r2 > 0.9);
        assert!((mae - 0.14).abs() < 1e-9);
        // mse = (0.01 + 0.01 + 0.01 + 0.04 + 0.04) / 5 = 0.022
        assert!((rmse - 0.022f64.sqrt()).abs() < 1e-9);
    }

    #[test]
    fn test_multi_output_uniform_average() {
        let y_true = array![[1.0, 10.0], [2.0, 20.0], [3.0, 30.0]];
        let y_pred = array![[1.0, 11.0], [2.0, 21.0], [3.0, 31.0]];
        // Column 0 is perfect, column 1 is off by one everywhere
        let mae = Mae.compute(&y_true, &y_pred).unwrap();
        assert!((mae - 0.5).abs() < 1e-12);
        let rmse = Rmse.compute(&y_true, &y_pred).unwrap();
        assert!((rmse - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_r2_constant_target() {
        let y_true = array![[2.0], [2.0], [2.0]];
        assert_eq!(R2.compute(&y_true, &y_true).unwrap(), 1.0);
        let y_pred = array![[2.0], [2.5], [2.0]];
        assert_eq!(R2.compute(&y_true, &y_pred).unwrap(), 0.0);
    }

    #[test]
    fn test_metric_shape_mismatch() {
        let y_true = array![[1.0], [2.0]];
        let y_pred = array![[1.0], [2.0], [3.0]];
        assert!(R2.compute(&y_true, &y_pred).is_err());
    }

    #[test]
    fn test_metric_by_name() {
        assert_eq!(metric_by_name("rmse").unwrap().name(), "rmse");
        assert!(!metric_by_name("mae").unwrap().greater_is_better());
        let err = metric_by_name("mape").unwrap_err();
        assert!(matches!(err, SurrogateError::UnknownMetric { .. }));
    }
}
