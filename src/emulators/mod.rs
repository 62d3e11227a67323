//! Emulator families
//!
//! Every regression family implements [`Estimator`], the contract the
//! cross-validation runner and hyperparameter search depend on:
//! - construct with default hyperparameters, adjust with `set_params`
//! - `fit` on a training split, `predict` on a test split
//! - `param_space` describes what the search may tune
//! - `clone_unfitted` yields a fresh copy with the same hyperparameters
//!
//! Families without native multi-output support fit one model per output
//! column.

mod decision_tree;
mod gaussian_process;
mod gradient_boosting;
pub(crate) mod linalg;
mod neural_net;
mod params;
mod polynomial;
mod radial_basis;
mod random_forest;
mod support_vector;

pub use gaussian_process::{GaussianProcess, GpKernel};
pub use gradient_boosting::GradientBoosting;
pub use neural_net::{Activation, NeuralNet};
pub use params::{HyperParams, ParamValue};
pub use polynomial::SecondOrderPolynomial;
pub use radial_basis::{RadialBasisFunctions, RbfKernel};
pub use random_forest::RandomForest;
pub use support_vector::{SupportVectorMachines, SvmKernel};

pub(crate) use params::{
    invalid, read_bool, read_choice, read_float, read_non_negative, read_opt_u64, read_opt_usize,
    read_positive, read_usize, unknown,
};

use crate::error::{Result, SurrogateError};
use crate::search::{ParamSpace, SearchStrategy};
use ndarray::{Array1, Array2, ArrayView1};
use std::fmt;

/// Uniform contract for a pluggable regression model
pub trait Estimator: Send + Sync {
    /// Display name, also the long name in the registry and results
    fn name(&self) -> &str;

    /// Current hyperparameters
    fn params(&self) -> HyperParams;

    /// Overwrite some or all hyperparameters.
    ///
    /// Unknown names or ill-typed values fail with `InvalidParameter` and
    /// leave the estimator unchanged.
    fn set_params(&mut self, params: &HyperParams) -> Result<()>;

    /// Fit on inputs (n, f) and targets (n, o)
    fn fit(&mut self, x: &Array2<f64>, y: &Array2<f64>) -> Result<()>;

    /// Predict targets (m, o) for inputs (m, f)
    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>>;

    /// Predictive mean and standard deviation, for families that provide one
    fn predict_with_std(&self, _x: &Array2<f64>) -> Result<Option<(Array2<f64>, Array2<f64>)>> {
        Ok(None)
    }

    /// Search space for the given strategy
    fn param_space(&self, strategy: SearchStrategy) -> ParamSpace;

    /// Fresh, unfitted copy carrying the current hyperparameters
    fn clone_unfitted(&self) -> Box<dyn Estimator>;

    fn is_fitted(&self) -> bool;
}

impl fmt::Debug for dyn Estimator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.name(), self.params())
    }
}

/// Apply a configuration atomically: all values are checked on a copy first
pub(crate) fn apply_params<C: Clone>(
    config: &mut C,
    params: &HyperParams,
    mut apply: impl FnMut(&mut C, &str, &ParamValue) -> Result<()>,
) -> Result<()> {
    let mut next = config.clone();
    for (name, value) in params.iter() {
        apply(&mut next, name, value)?;
    }
    *config = next;
    Ok(())
}

pub(crate) fn check_fit_inputs(x: &Array2<f64>, y: &Array2<f64>) -> Result<()> {
    if x.nrows() != y.nrows() {
        return Err(SurrogateError::DataValidation(format!(
            "X has {} rows but y has {}",
            x.nrows(),
            y.nrows()
        )));
    }
    if x.nrows() == 0 || y.ncols() == 0 {
        return Err(SurrogateError::DataValidation(
            "cannot fit on an empty training set".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn check_n_features(expected: usize, x: &Array2<f64>) -> Result<()> {
    if x.ncols() != expected {
        return Err(SurrogateError::DataValidation(format!(
            "model was fitted on {} features, got {}",
            expected,
            x.ncols()
        )));
    }
    Ok(())
}

/// Fit one sub-model per output column
pub(crate) fn fit_per_output<T>(
    x: &Array2<f64>,
    y: &Array2<f64>,
    mut fit: impl FnMut(&Array2<f64>, ArrayView1<f64>) -> Result<T>,
) -> Result<Vec<T>> {
    y.columns().into_iter().map(|col| fit(x, col)).collect()
}

/// Stack per-output prediction vectors into an (m, o) matrix
pub(crate) fn stack_outputs(columns: Vec<Array1<f64>>, n_rows: usize) -> Array2<f64> {
    let mut out = Array2::zeros((n_rows, columns.len()));
    for (j, col) in columns.into_iter().enumerate() {
        out.column_mut(j).assign(&col);
    }
    out
}


#[cfg(test)]
pub(crate) mod test_support {
    use ndarray::{Array1, Array2};

    /// Smooth 2-D toy simulator with two outputs
    pub fn toy_problem(n: usize) -> (Array2<f64>, Array2<f64>) {
        let x = Array2::from_shape_fn((n, 2), |(i, j)| {
            let t = i as f64 / n as f64;
            if j == 0 {
                2.0 * t - 1.0
            } else {
                ((i * 7) % n) as f64 / n as f64 - 0.5
            }
        });
        let y = Array2::from_shape_fn((n, 2), |(i, j)| {
            let (a, b) = (x[[i, 0]], x[[i, 1]]);
            if j == 0 {
                a * a + 0.5 * b
            } else {
                (2.0 * a).sin() - b
            }
        });
        (x, y)
    }

    pub fn r2(y: &Array2<f64>, pred: &Array2<f64>, col: usize) -> f64 {
        let t: Array1<f64> = y.column(col).to_owned();
        let p: Array1<f64> = pred.column(col).to_owned();
        let mean = t.mean().unwrap_or(0.0);
        let ss_tot: f64 = t.iter().map(|v| (v - mean).powi(2)).sum();
        let ss_res: f64 = t.iter().zip(p.iter()).map(|(a, b)| (a - b).powi(2)).sum();
        1.0 - ss_res / ss_tot
    }
}
