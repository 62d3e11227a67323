//! Support vector regression emulator
//!
//! Epsilon-insensitive SVR solved in the dual by coordinate descent. The
//! bias is folded into the kernel (K + 1), which removes the equality
//! constraint so each coordinate update is a closed-form soft threshold
//! followed by clipping to [-C, C]. One machine is trained per output.

use super::{
    apply_params, check_fit_inputs, check_n_features, fit_per_output, invalid, read_bool,
    read_choice, read_non_negative, read_positive, read_usize, stack_outputs, unknown, Estimator,
    HyperParams, ParamValue,
};
use crate::error::{Result, SurrogateError};
use crate::search::{ParamSpace, SearchStrategy, Subspace};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const NAME: &str = "SupportVectorMachines";
const KERNELS: [&str; 4] = ["rbf", "linear", "poly", "sigmoid"];

/// Kernel function
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SvmKernel {
    Rbf,
    Linear,
    Poly,
    Sigmoid,
}

impl fmt::Display for SvmKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SvmKernel::Rbf => "rbf",
            SvmKernel::Linear => "linear",
            SvmKernel::Poly => "poly",
            SvmKernel::Sigmoid => "sigmoid",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for SvmKernel {
    type Err = SurrogateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "rbf" => Ok(SvmKernel::Rbf),
            "linear" => Ok(SvmKernel::Linear),
            "poly" => Ok(SvmKernel::Poly),
            "sigmoid" => Ok(SvmKernel::Sigmoid),
            other => Err(invalid(NAME, "kernel", format!("unknown kernel '{}'", other))),
        }
    }
}

/// Kernel width: a fixed value or derived from the training inputs
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
enum Gamma {
    Scale,
    Auto,
    Value(f64),
}

impl Gamma {
    fn to_param(self) -> ParamValue {
        match self {
            Gamma::Scale => "scale".into(),
            Gamma::Auto => "auto".into(),
            Gamma::Value(v) => v.into(),
        }
    }

    fn from_param(value: &ParamValue) -> Result<Self> {
        match value {
            ParamValue::Str(s) if s == "scale" => Ok(Gamma::Scale),
            ParamValue::Str(s) if s == "auto" => Ok(Gamma::Auto),
            other => read_positive(NAME, "gamma", other).map(Gamma::Value),
        }
    }

    fn resolve(self, x: &Array2<f64>) -> f64 {
        let n_features = x.ncols().max(1) as f64;
        match self {
            Gamma::Value(v) => v,
            Gamma::Auto => 1.0 / n_features,
            Gamma::Scale => {
                let n = x.len() as f64;
                let mean = x.sum() / n;
                let var = x.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
                if var > 0.0 {
                    1.0 / (n_features * var)
                } else {
                    1.0
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SvrConfig {
    kernel: SvmKernel,
    degree: usize,
    gamma: Gamma,
    coef0: f64,
    c: f64,
    epsilon: f64,
    tol: f64,
    max_iter: usize,
    normalise_y: bool,
}

impl Default for SvrConfig {
    fn default() -> Self {
        Self {
            kernel: SvmKernel::Rbf,
            degree: 3,
            gamma: Gamma::Scale,
            coef0: 0.0,
            c: 1.0,
            epsilon: 0.1,
            tol: 1e-3,
            max_iter: 1000,
            normalise_y: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Machine {
    support_vectors: Array2<f64>,
    beta: Array1<f64>,
    y_mean: f64,
    y_scale: f64,
}

/// Epsilon-SVR with linear, polynomial, RBF and sigmoid kernels
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SupportVectorMachines {
    config: SvrConfig,
    machines: Vec<Machine>,
    gamma: f64,
    n_features: usize,
}

impl SupportVectorMachines {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kernel(mut self, kernel: SvmKernel) -> Self {
        self.config.kernel = kernel;
        self
    }

    pub fn with_c(mut self, c: f64) -> Self {
        self.config.c = c;
        self
    }

    fn kernel(&self, a: ArrayView1<f64>, b: ArrayView1<f64>) -> f64 {
        let c = &self.config;
        match c.kernel {
            SvmKernel::Linear => a.dot(&b),
            SvmKernel::Poly => (self.gamma * a.dot(&b) + c.coef0).powi(c.degree as i32),
            SvmKernel::Rbf => {
                let sq: f64 = a.iter().zip(b.iter()).map(|(p, q)| (p - q).powi(2)).sum();
                (-self.gamma * sq).exp()
            }
            SvmKernel::Sigmoid => (self.gamma * a.dot(&b) + c.coef0).tanh(),
        }
    }

    /// Gram matrix with the bias column folded in
    fn gram(&self, a: &Array2<f64>, b: &Array2<f64>) -> Array2<f64> {
        Array2::from_shape_fn((a.nrows(), b.nrows()), |(i, j)| {
            self.kernel(a.row(i), b.row(j)) + 1.0
        })
    }

    fn fit_machine(&self, x: &Array2<f64>, q: &Array2<f64>, y: ArrayView1<f64>) -> Machine {
        let n = x.nrows();
        let (y_mean, y_scale) = if self.config.normalise_y {
            let mean = y.mean().unwrap_or(0.0);
            let std = y.std(0.0);
            (mean, if std > 1e-12 { std } else { 1.0 })
        } else {
            (0.0, 1.0)
        };
        let target: Array1<f64> = y.mapv(|v| (v - y_mean) / y_scale);

        let (c, eps) = (self.config.c, self.config.epsilon);
        let mut beta = Array1::<f64>::zeros(n);
        let mut q_beta = Array1::<f64>::zeros(n);

        for _ in 0..self.config.max_iter {
            let mut max_change = 0.0f64;
            for i in 0..n {
                let q_ii = q[[i, i]];
                if q_ii <= 0.0 {
                    continue;
                }
                let g = q_beta[i] - q_ii * beta[i] - target[i];
                let shrunk = (g.abs() - eps).max(0.0);
                let next = (-g.signum() * shrunk / q_ii).clamp(-c, c);
                let delta = next - beta[i];
                if delta != 0.0 {
                    q_beta.scaled_add(delta, &q.column(i));
                    beta[i] = next;
                    max_change = max_change.max(delta.abs());
                }
            }
            if max_change < self.config.tol {
                break;
            }
        }

        let support: Vec<usize> = (0..n).filter(|&i| beta[i].abs() > 1e-10).collect();
        Machine {
            support_vectors: x.select(ndarray::Axis(0), &support),
            beta: support.iter().map(|&i| beta[i]).collect(),
            y_mean,
            y_scale,
        }
    }

    /// Total support vectors across all outputs
    pub fn n_support_vectors(&self) -> usize {
        self.machines.iter().map(|m| m.beta.len()).sum()
    }
}

impl Estimator for SupportVectorMachines {
    fn name(&self) -> &str {
        NAME
    }

    fn params(&self) -> HyperParams {
        let c = &self.config;
        HyperParams::new()
            .with("kernel", c.kernel.to_string())
            .with("degree", c.degree)
            .with("gamma", c.gamma.to_param())
            .with("coef0", c.coef0)
            .with("C", c.c)
            .with("epsilon", c.epsilon)
            .with("tol", c.tol)
            .with("max_iter", c.max_iter)
            .with("normalise_y", c.normalise_y)
    }

    fn set_params(&mut self, params: &HyperParams) -> Result<()> {
        apply_params(&mut self.config, params, |c, name, value| {
            match name {
                "kernel" => c.kernel = read_choice(NAME, name, value, &KERNELS)?.parse()?,
                "degree" => c.degree = read_usize(NAME, name, value)?.max(1),
                "gamma" => c.gamma = Gamma::from_param(value)?,
                "coef0" => c.coef0 = super::read_float(NAME, name, value)?,
                "C" => c.c = read_positive(NAME, name, value)?,
                "epsilon" => c.epsilon = read_non_negative(NAME, name, value)?,
                "tol" => c.tol = read_positive(NAME, name, value)?,
                "max_iter" => c.max_iter = read_usize(NAME, name, value)?.max(1),
                "normalise_y" => c.normalise_y = read_bool(NAME, name, value)?,
                _ => return Err(unknown(NAME, name)),
            }
            Ok(())
        })
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array2<f64>) -> Result<()> {
        check_fit_inputs(x, y)?;
        self.gamma = self.config.gamma.resolve(x);
        let q = self.gram(x, x);

        let machines = fit_per_output(x, y, |x, col| Ok(self.fit_machine(x, &q, col)))?;
        self.machines = machines;
        self.n_features = x.ncols();
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.machines.is_empty() {
            return Err(SurrogateError::ModelNotFitted);
        }
        check_n_features(self.n_features, x)?;

        let columns = self
            .machines
            .iter()
            .map(|m| {
                let raw: Array1<f64> = if m.beta.is_empty() {
                    Array1::zeros(x.nrows())
                } else {
                    self.gram(x, &m.support_vectors).dot(&m.beta)
                };
                raw.mapv(|v| v * m.y_scale + m.y_mean)
            })
            .collect();
        Ok(stack_outputs(columns, x.nrows()))
    }

    fn param_space(&self, strategy: SearchStrategy) -> ParamSpace {
        let space = match strategy {
            SearchStrategy::Grid => Subspace::new()
                .choice("kernel", vec!["rbf", "linear"])
                .choice("C", vec![0.1, 1.0, 10.0])
                .choice("epsilon", vec![0.01, 0.1]),
            SearchStrategy::Random | SearchStrategy::Bayes => Subspace::new()
                .choice("kernel", KERNELS.to_vec())
                .int_uniform("degree", 2, 4)
                .choice("gamma", vec!["scale", "auto"])
                .log_uniform("C", 1e-2, 1e2)
                .log_uniform("epsilon", 1e-3, 0.5)
                .choice("normalise_y", vec![true]),
        };
        space.into()
    }

    fn clone_unfitted(&self) -> Box<dyn Estimator> {
        Box::new(Self {
            config: self.config.clone(),
            machines: Vec::new(),
            gamma: 0.0,
            n_features: 0,
        })
    }

    fn is_fitted(&self) -> bool {
        !self.machines.is_empty()
    }
}
