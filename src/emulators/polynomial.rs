//! Second-order polynomial emulator
//!
//! Expands the inputs to all degree-2 terms (squares and pairwise
//! products) and fits a lightly ridge-regularised least-squares model.
//! Multi-output targets share one factorisation of the normal equations.

use super::linalg::{cholesky_solve_factored, cholesky_with_jitter};
use super::{
    apply_params, check_fit_inputs, check_n_features, read_bool, read_non_negative, unknown,
    Estimator, HyperParams,
};
use crate::error::{Result, SurrogateError};
use crate::search::{ParamSpace, SearchStrategy, Subspace};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

const NAME: &str = "SecondOrderPolynomial";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PolyConfig {
    alpha: f64,
    fit_intercept: bool,
}

impl Default for PolyConfig {
    fn default() -> Self {
        Self {
            alpha: 1e-6,
            fit_intercept: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PolyFit {
    coefficients: Array2<f64>,
    intercept: Array1<f64>,
    n_features: usize,
}

/// Quadratic response-surface emulator
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SecondOrderPolynomial {
    config: PolyConfig,
    fitted: Option<PolyFit>,
}

impl SecondOrderPolynomial {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_alpha(mut self, alpha: f64) -> Self {
        self.config.alpha = alpha;
        self
    }

    /// Original features followed by x_i * x_j for i <= j
    pub(crate) fn expand_features(x: &Array2<f64>) -> Array2<f64> {
        let p = x.ncols();
        let n_terms = p + p * (p + 1) / 2;
        let mut out = Array2::zeros((x.nrows(), n_terms));

        for (row, mut target) in x.outer_iter().zip(out.outer_iter_mut()) {
            let mut k = 0;
            for j in 0..p {
                target[k] = row[j];
                k += 1;
            }
            for i in 0..p {
                for j in i..p {
                    target[k] = row[i] * row[j];
                    k += 1;
                }
            }
        }
        out
    }
}

impl Estimator for SecondOrderPolynomial {
    fn name(&self) -> &str {
        NAME
    }

    fn params(&self) -> HyperParams {
        HyperParams::new()
            .with("alpha", self.config.alpha)
            .with("fit_intercept", self.config.fit_intercept)
    }

    fn set_params(&mut self, params: &HyperParams) -> Result<()> {
        apply_params(&mut self.config, params, |c, name, value| {
            match name {
                "alpha" => c.alpha = read_non_negative(NAME, name, value)?,
                "fit_intercept" => c.fit_intercept = read_bool(NAME, name, value)?,
                _ => return Err(unknown(NAME, name)),
            }
            Ok(())
        })
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array2<f64>) -> Result<()> {
        check_fit_inputs(x, y)?;
        let phi = Self::expand_features(x);
        let n_terms = phi.ncols();

        let (phi_c, y_c, phi_mean, y_mean) = if self.config.fit_intercept {
            let phi_mean = phi
                .mean_axis(Axis(0))
                .ok_or_else(|| SurrogateError::Training("empty design matrix".to_string()))?;
            let y_mean = y
                .mean_axis(Axis(0))
                .ok_or_else(|| SurrogateError::Training("empty target matrix".to_string()))?;
            (
                &phi - &phi_mean.view().insert_axis(Axis(0)),
                y - &y_mean.view().insert_axis(Axis(0)),
                phi_mean,
                y_mean,
            )
        } else {
            (
                phi.clone(),
                y.clone(),
                Array1::zeros(n_terms),
                Array1::zeros(y.ncols()),
            )
        };

        let mut gram = phi_c.t().dot(&phi_c);
        for i in 0..n_terms {
            gram[[i, i]] += self.config.alpha;
        }
        let l = cholesky_with_jitter(&gram).ok_or_else(|| {
            SurrogateError::Training("normal equations are singular".to_string())
        })?;

        let rhs = phi_c.t().dot(&y_c);
        let mut coefficients = Array2::zeros((n_terms, y.ncols()));
        for (j, col) in rhs.columns().into_iter().enumerate() {
            let w = cholesky_solve_factored(&l, &col.to_owned());
            coefficients.column_mut(j).assign(&w);
        }
        let intercept = &y_mean - &phi_mean.dot(&coefficients);

        self.fitted = Some(PolyFit {
            coefficients,
            intercept,
            n_features: x.ncols(),
        });
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let fit = self.fitted.as_ref().ok_or(SurrogateError::ModelNotFitted)?;
        check_n_features(fit.n_features, x)?;
        let phi = Self::expand_features(x);
        Ok(phi.dot(&fit.coefficients) + &fit.intercept.view().insert_axis(Axis(0)))
    }

    fn param_space(&self, strategy: SearchStrategy) -> ParamSpace {
        let space = match strategy {
            SearchStrategy::Grid => Subspace::new()
                .choice("alpha", vec![1e-6, 1e-3, 1e-1, 1.0])
                .choice("fit_intercept", vec![true, false]),
            SearchStrategy::Random | SearchStrategy::Bayes => Subspace::new()
                .log_uniform("alpha", 1e-8, 1.0)
                .choice("fit_intercept", vec![true, false]),
        };
        space.into()
    }

    fn clone_unfitted(&self) -> Box<dyn Estimator> {
        Box::new(Self {
            config: self.config.clone(),
            fitted: None,
        })
    }

    fn is_fitted(&self) -> bool {
        self.fitted.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_expand_features() {
        let x = array![[2.0, 3.0]];
        let phi = SecondOrderPolynomial::expand_features(&x);
        assert_eq!(phi, array![[2.0, 3.0, 4.0, 6.0, 9.0]]);
    }

    #[test]
    fn test_fits_quadratic_exactly() {
        let x = Array2::from_shape_fn((30, 2), |(i, j)| ((i * (j + 3)) % 11) as f64 / 5.0 - 1.0);
        let y = Array2::from_shape_fn((30, 2), |(i, j)| {
            let (a, b) = (x[[i, 0]], x[[i, 1]]);
            if j == 0 {
                1.0 + 2.0 * a - b + 0.5 * a * b
            } else {
                a * a - 3.0 * b * b
            }
        });

        let mut model = SecondOrderPolynomial::new();
        model.fit(&x, &y).unwrap();
        let pred = model.predict(&x).unwrap();
        for (p, t) in pred.iter().zip(y.iter()) {
            assert!((p - t).abs() < 1e-4, "{} vs {}", p, t);
        }
    }

    #[test]
    fn test_predict_before_fit() {
        let model = SecondOrderPolynomial::new();
        assert!(matches!(
            model.predict(&array![[1.0, 2.0]]),
            Err(SurrogateError::ModelNotFitted)
        ));
    }

    #[test]
    fn test_set_params_is_atomic() {
        let mut model = SecondOrderPolynomial::new();
        let bad = HyperParams::new().with("alpha", 0.5).with("degree", 3i64);
        assert!(model.set_params(&bad).is_err());
        assert_eq!(model.params().get("alpha").and_then(|v| v.as_float()), Some(1e-6));
    }
}
