//! Gaussian process emulator
//!
//! Exact GP regression with a stationary kernel shared by all outputs.
//! Targets are standardised per output before fitting, and the kernel
//! length scale is optionally chosen by maximising the log marginal
//! likelihood over a small geometric ladder around its configured value.

use super::linalg::{backward_substitute, cholesky_with_jitter, forward_substitute, sq_distances};
use super::{
    apply_params, check_fit_inputs, check_n_features, read_bool, read_choice, read_positive,
    unknown, Estimator, HyperParams,
};
use crate::error::{Result, SurrogateError};
use crate::search::{ParamSpace, SearchStrategy, Subspace};
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;
use tracing::debug;

const NAME: &str = "GaussianProcess";
const KERNELS: [&str; 3] = ["rbf", "matern32", "matern52"];

/// Stationary covariance function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GpKernel {
    Rbf,
    Matern32,
    Matern52,
}

impl GpKernel {
    /// Correlation at Euclidean distance `r` for length scale `l`
    fn correlation(self, r: f64, l: f64) -> f64 {
        let d = r / l;
        match self {
            GpKernel::Rbf => (-0.5 * d * d).exp(),
            GpKernel::Matern32 => {
                let s = 3f64.sqrt() * d;
                (1.0 + s) * (-s).exp()
            }
            GpKernel::Matern52 => {
                let s = 5f64.sqrt() * d;
                (1.0 + s + s * s / 3.0) * (-s).exp()
            }
        }
    }
}

impl fmt::Display for GpKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GpKernel::Rbf => "rbf",
            GpKernel::Matern32 => "matern32",
            GpKernel::Matern52 => "matern52",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for GpKernel {
    type Err = SurrogateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rbf" => Ok(GpKernel::Rbf),
            "matern32" => Ok(GpKernel::Matern32),
            "matern52" => Ok(GpKernel::Matern52),
            other => Err(super::invalid(NAME, "kernel", format!("unknown kernel '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GpConfig {
    kernel: GpKernel,
    length_scale: f64,
    signal_variance: f64,
    noise: f64,
    optimize: bool,
}

impl Default for GpConfig {
    fn default() -> Self {
        Self {
            kernel: GpKernel::Rbf,
            length_scale: 1.0,
            signal_variance: 1.0,
            noise: 1e-6,
            optimize: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct GpFit {
    x_train: Array2<f64>,
    alpha: Array2<f64>,
    cholesky_l: Array2<f64>,
    y_mean: Array1<f64>,
    y_std: Array1<f64>,
    length_scale: f64,
}

/// Gaussian process regressor with predictive uncertainty
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GaussianProcess {
    config: GpConfig,
    fitted: Option<GpFit>,
}

impl GaussianProcess {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kernel(mut self, kernel: GpKernel) -> Self {
        self.config.kernel = kernel;
        self
    }

    pub fn with_length_scale(mut self, length_scale: f64) -> Self {
        self.config.length_scale = length_scale;
        self
    }

    /// Length scale used by the fitted model
    pub fn fitted_length_scale(&self) -> Option<f64> {
        self.fitted.as_ref().map(|f| f.length_scale)
    }

    fn covariance(&self, dist_sq: &Array2<f64>, length_scale: f64) -> Array2<f64> {
        let kernel = self.config.kernel;
        let sv = self.config.signal_variance;
        dist_sq.mapv(|d2| sv * kernel.correlation(d2.sqrt(), length_scale))
    }

    /// Factorise K + noise I and solve for every output; returns (L, alpha, log marginal likelihood)
    fn solve(
        &self,
        dist_sq: &Array2<f64>,
        y: &Array2<f64>,
        length_scale: f64,
    ) -> Option<(Array2<f64>, Array2<f64>, f64)> {
        let n = dist_sq.nrows();
        let mut k = self.covariance(dist_sq, length_scale);
        for i in 0..n {
            k[[i, i]] += self.config.noise;
        }
        let l = cholesky_with_jitter(&k)?;

        let mut alpha = Array2::zeros(y.dim());
        let mut lml = 0.0;
        let log_det: f64 = l.diag().iter().map(|v| v.ln()).sum();
        for (j, col) in y.columns().into_iter().enumerate() {
            let col = col.to_owned();
            let a = backward_substitute(&l, &forward_substitute(&l, &col));
            lml += -0.5 * col.dot(&a) - log_det - 0.5 * n as f64 * (2.0 * PI).ln();
            alpha.column_mut(j).assign(&a);
        }
        Some((l, alpha, lml))
    }
}

impl Estimator for GaussianProcess {
    fn name(&self) -> &str {
        NAME
    }

    fn params(&self) -> HyperParams {
        let c = &self.config;
        HyperParams::new()
            .with("kernel", c.kernel.to_string())
            .with("length_scale", c.length_scale)
            .with("signal_variance", c.signal_variance)
            .with("noise", c.noise)
            .with("optimize", c.optimize)
    }

    fn set_params(&mut self, params: &HyperParams) -> Result<()> {
        apply_params(&mut self.config, params, |c, name, value| {
            match name {
                "kernel" => c.kernel = read_choice(NAME, name, value, &KERNELS)?.parse()?,
                "length_scale" => c.length_scale = read_positive(NAME, name, value)?,
                "signal_variance" => c.signal_variance = read_positive(NAME, name, value)?,
                "noise" => c.noise = read_positive(NAME, name, value)?,
                "optimize" => c.optimize = read_bool(NAME, name, value)?,
                _ => return Err(unknown(NAME, name)),
            }
            Ok(())
        })
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array2<f64>) -> Result<()> {
        check_fit_inputs(x, y)?;
        let y_mean = y
            .mean_axis(Axis(0))
            .ok_or_else(|| SurrogateError::Training("empty target matrix".to_string()))?;
        let y_std = y
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s > 1e-12 { s } else { 1.0 });
        let y_norm = (y - &y_mean.view().insert_axis(Axis(0))) / &y_std.view().insert_axis(Axis(0));

        let dist_sq = sq_distances(x, x);
        let candidates: Vec<f64> = if self.config.optimize {
            (-3..=3)
                .map(|k| self.config.length_scale * 2f64.powi(k))
                .collect()
        } else {
            vec![self.config.length_scale]
        };

        let best = candidates
            .par_iter()
            .filter_map(|&ls| self.solve(&dist_sq, &y_norm, ls).map(|s| (ls, s)))
            .collect::<Vec<_>>()
            .into_iter()
            .max_by(|(_, a), (_, b)| a.2.total_cmp(&b.2));

        let (length_scale, (cholesky_l, alpha, lml)) = best.ok_or_else(|| {
            SurrogateError::Training("kernel matrix is not positive definite".to_string())
        })?;
        debug!(length_scale, lml, "gaussian process fitted");

        self.fitted = Some(GpFit {
            x_train: x.clone(),
            alpha,
            cholesky_l,
            y_mean,
            y_std,
            length_scale,
        });
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let fit = self.fitted.as_ref().ok_or(SurrogateError::ModelNotFitted)?;
        check_n_features(fit.x_train.ncols(), x)?;
        let k_star = self.covariance(&sq_distances(x, &fit.x_train), fit.length_scale);
        let norm = k_star.dot(&fit.alpha);
        Ok(norm * &fit.y_std.view().insert_axis(Axis(0)) + &fit.y_mean.view().insert_axis(Axis(0)))
    }

    fn predict_with_std(&self, x: &Array2<f64>) -> Result<Option<(Array2<f64>, Array2<f64>)>> {
        let fit = self.fitted.as_ref().ok_or(SurrogateError::ModelNotFitted)?;
        let mean = self.predict(x)?;
        let k_star = self.covariance(&sq_distances(x, &fit.x_train), fit.length_scale);

        let latent_std: Array1<f64> = k_star
            .outer_iter()
            .map(|row| {
                let v = forward_substitute(&fit.cholesky_l, &row.to_owned());
                (self.config.signal_variance - v.dot(&v)).max(1e-12).sqrt()
            })
            .collect();

        let std = Array2::from_shape_fn(mean.dim(), |(i, j)| latent_std[i] * fit.y_std[j]);
        Ok(Some((mean, std)))
    }

    fn param_space(&self, strategy: SearchStrategy) -> ParamSpace {
        let space = match strategy {
            SearchStrategy::Grid => Subspace::new()
                .choice("kernel", KERNELS.to_vec())
                .choice("length_scale", vec![0.1, 0.5, 1.0, 2.0])
                .choice("noise", vec![1e-6, 1e-3, 1e-1]),
            SearchStrategy::Random | SearchStrategy::Bayes => Subspace::new()
                .choice("kernel", KERNELS.to_vec())
                .log_uniform("length_scale", 0.05, 10.0)
                .log_uniform("noise", 1e-8, 1e-1)
                .choice("optimize", vec![true, false]),
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
