//! Radial basis function interpolation
//!
//! Fits `f(x) = sum_i w_i phi(eps * |x - x_i|) + p(x)` where `p` is a
//! polynomial tail of the configured degree. Weights and polynomial
//! coefficients come from the saddle-point system
//!
//! ```text
//! [ K + s I   P ] [w]   [y]
//! [ P^T       0 ] [c] = [0]
//! ```
//!
//! solved once for all outputs.

use super::linalg::{lu_solve, sq_distances};
use super::{
    apply_params, check_fit_inputs, check_n_features, invalid, read_choice, read_float,
    read_non_negative, read_positive, unknown, Estimator, HyperParams,
};
use crate::error::{Result, SurrogateError};
use crate::search::{ParamSpace, SearchStrategy, Subspace};
use ndarray::{s, Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

const NAME: &str = "RadialBasisFunctions";
const KERNELS: [&str; 8] = [
    "linear",
    "thin_plate_spline",
    "cubic",
    "quintic",
    "multiquadric",
    "inverse_multiquadric",
    "inverse_quadratic",
    "gaussian",
];

/// Radial kernel `phi(r)`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RbfKernel {
    Linear,
    ThinPlateSpline,
    Cubic,
    Quintic,
    Multiquadric,
    InverseMultiquadric,
    InverseQuadratic,
    Gaussian,
}

impl RbfKernel {
    fn phi(self, r: f64) -> f64 {
        match self {
            RbfKernel::Linear => -r,
            RbfKernel::ThinPlateSpline => {
                if r == 0.0 {
                    0.0
                } else {
                    r * r * r.ln()
                }
            }
            RbfKernel::Cubic => r.powi(3),
            RbfKernel::Quintic => -r.powi(5),
            RbfKernel::Multiquadric => -(1.0 + r * r).sqrt(),
            RbfKernel::InverseMultiquadric => 1.0 / (1.0 + r * r).sqrt(),
            RbfKernel::InverseQuadratic => 1.0 / (1.0 + r * r),
            RbfKernel::Gaussian => (-r * r).exp(),
        }
    }

    /// Smallest polynomial degree for which the system is well posed
    pub fn min_degree(self) -> i64 {
        match self {
            RbfKernel::Linear | RbfKernel::Multiquadric => 0,
            RbfKernel::ThinPlateSpline | RbfKernel::Cubic => 1,
            RbfKernel::Quintic => 2,
            RbfKernel::InverseMultiquadric | RbfKernel::InverseQuadratic | RbfKernel::Gaussian => -1,
        }
    }

    /// Kernels whose interpolant does not depend on epsilon
    fn scale_invariant(self) -> bool {
        matches!(
            self,
            RbfKernel::Linear | RbfKernel::ThinPlateSpline | RbfKernel::Cubic | RbfKernel::Quintic
        )
    }
}

impl fmt::Display for RbfKernel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RbfKernel::Linear => "linear",
            RbfKernel::ThinPlateSpline => "thin_plate_spline",
            RbfKernel::Cubic => "cubic",
            RbfKernel::Quintic => "quintic",
            RbfKernel::Multiquadric => "multiquadric",
            RbfKernel::InverseMultiquadric => "inverse_multiquadric",
            RbfKernel::InverseQuadratic => "inverse_quadratic",
            RbfKernel::Gaussian => "gaussian",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for RbfKernel {
    type Err = SurrogateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "linear" => Ok(RbfKernel::Linear),
            "thin_plate_spline" => Ok(RbfKernel::ThinPlateSpline),
            "cubic" => Ok(RbfKernel::Cubic),
            "quintic" => Ok(RbfKernel::Quintic),
            "multiquadric" => Ok(RbfKernel::Multiquadric),
            "inverse_multiquadric" => Ok(RbfKernel::InverseMultiquadric),
            "inverse_quadratic" => Ok(RbfKernel::InverseQuadratic),
            "gaussian" => Ok(RbfKernel::Gaussian),
            other => Err(invalid(NAME, "kernel", format!("unknown kernel '{}'", other))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RbfConfig {
    kernel: RbfKernel,
    smoothing: f64,
    epsilon: f64,
    degree: i64,
}

impl Default for RbfConfig {
    fn default() -> Self {
        Self {
            kernel: RbfKernel::ThinPlateSpline,
            smoothing: 0.0,
            epsilon: 1.0,
            degree: 1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RbfFit {
    centers: Array2<f64>,
    weights: Array2<f64>,
    coefficients: Array2<f64>,
    powers: Vec<Vec<u32>>,
    shift: Array1<f64>,
    scale: Array1<f64>,
}

/// RBF interpolator with a polynomial tail
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RadialBasisFunctions {
    config: RbfConfig,
    fitted: Option<RbfFit>,
}

/// Exponent vectors of every monomial in `n_features` variables of total degree <= `degree`
fn monomial_powers(n_features: usize, degree: i64) -> Vec<Vec<u32>> {
    if degree < 0 {
        return Vec::new();
    }
    let mut out = vec![vec![0u32; n_features]];
    let mut frontier = out.clone();
    for _ in 0..degree {
        let mut next: Vec<Vec<u32>> = Vec::new();
        for p in &frontier {
            // Only raise variables at or after the last raised one to avoid duplicates
            let start = p.iter().rposition(|&e| e > 0).unwrap_or(0);
            for j in start..n_features {
                let mut q = p.clone();
                q[j] += 1;
                next.push(q);
            }
        }
        out.extend(next.iter().cloned());
        frontier = next;
    }
    out
}

impl RadialBasisFunctions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_kernel(mut self, kernel: RbfKernel) -> Self {
        self.config.kernel = kernel;
        self
    }

    pub fn with_degree(mut self, degree: i64) -> Self {
        self.config.degree = degree;
        self
    }

    fn kernel_matrix(&self, a: &Array2<f64>, b: &Array2<f64>) -> Array2<f64> {
        let eps = self.config.epsilon;
        let kernel = self.config.kernel;
        sq_distances(a, b).mapv(|d2| kernel.phi(eps * d2.max(0.0).sqrt()))
    }

    fn polynomial_matrix(x: &Array2<f64>, fit_powers: &[Vec<u32>], shift: &Array1<f64>, scale: &Array1<f64>) -> Array2<f64> {
        Array2::from_shape_fn((x.nrows(), fit_powers.len()), |(i, k)| {
            fit_powers[k]
                .iter()
                .enumerate()
                .map(|(j, &e)| ((x[[i, j]] - shift[j]) / scale[j]).powi(e as i32))
                .product()
        })
    }
}

impl Estimator for RadialBasisFunctions {
    fn name(&self) -> &str {
        NAME
    }

    fn params(&self) -> HyperParams {
        let c = &self.config;
        HyperParams::new()
            .with("kernel", c.kernel.to_string())
            .with("smoothing", c.smoothing)
            .with("epsilon", c.epsilon)
            .with("degree", c.degree)
    }

    fn set_params(&mut self, params: &HyperParams) -> Result<()> {
        apply_params(&mut self.config, params, |c, name, value| {
            match name {
                "kernel" => c.kernel = read_choice(NAME, name, value, &KERNELS)?.parse()?,
                "smoothing" => c.smoothing = read_non_negative(NAME, name, value)?,
                "epsilon" => c.epsilon = read_positive(NAME, name, value)?,
                "degree" => {
                    let d = read_float(NAME, name, value)?;
                    if d.fract() != 0.0 || d < -1.0 {
                        return Err(invalid(NAME, name, "must be an integer >= -1"));
                    }
                    c.degree = d as i64;
                }
                _ => return Err(unknown(NAME, name)),
            }
            Ok(())
        })
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array2<f64>) -> Result<()> {
        check_fit_inputs(x, y)?;
        let kernel = self.config.kernel;
        if self.config.degree < kernel.min_degree() {
            warn!(
                kernel = %kernel,
                degree = self.config.degree,
                min_degree = kernel.min_degree(),
                "polynomial degree below the kernel minimum, interpolant may be ill-posed"
            );
        }
        if !kernel.scale_invariant() && self.config.epsilon <= 0.0 {
            return Err(invalid(NAME, "epsilon", "must be positive"));
        }

        let n = x.nrows();
        let n_outputs = y.ncols();
        let powers = monomial_powers(x.ncols(), self.config.degree);
        let m = powers.len();
        if n < m {
            return Err(SurrogateError::Training(format!(
                "at least {} samples are required for a degree {} polynomial tail, got {}",
                m, self.config.degree, n
            )));
        }

        // Centre and scale the polynomial inputs on the data bounding box
        let mins = x.fold_axis(Axis(0), f64::INFINITY, |a, &b| a.min(b));
        let maxs = x.fold_axis(Axis(0), f64::NEG_INFINITY, |a, &b| a.max(b));
        let shift = (&maxs + &mins) / 2.0;
        let scale = ((&maxs - &mins) / 2.0).mapv(|s| if s > 1e-12 { s } else { 1.0 });

        let mut lhs = Array2::zeros((n + m, n + m));
        let mut k = self.kernel_matrix(x, x);
        for i in 0..n {
            k[[i, i]] += self.config.smoothing;
        }
        lhs.slice_mut(s![..n, ..n]).assign(&k);
        if m > 0 {
            let p = Self::polynomial_matrix(x, &powers, &shift, &scale);
            lhs.slice_mut(s![..n, n..]).assign(&p);
            lhs.slice_mut(s![n.., ..n]).assign(&p.t());
        }

        let mut rhs = Array2::zeros((n + m, n_outputs));
        rhs.slice_mut(s![..n, ..]).assign(y);

        let solution = lu_solve(&lhs, &rhs).ok_or_else(|| {
            SurrogateError::Training(
                "RBF system is singular; check for duplicate inputs or raise smoothing".to_string(),
            )
        })?;

        self.fitted = Some(RbfFit {
            centers: x.clone(),
            weights: solution.slice(s![..n, ..]).to_owned(),
            coefficients: solution.slice(s![n.., ..]).to_owned(),
            powers,
            shift,
            scale,
        });
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let fit = self.fitted.as_ref().ok_or(SurrogateError::ModelNotFitted)?;
        check_n_features(fit.centers.ncols(), x)?;
        let mut out = self.kernel_matrix(x, &fit.centers).dot(&fit.weights);
        if !fit.powers.is_empty() {
            let p = Self::polynomial_matrix(x, &fit.powers, &fit.shift, &fit.scale);
            out += &p.dot(&fit.coefficients);
        }
        Ok(out)
    }

    /// Kernels are grouped with the degree range each supports, so the
    /// space is conditional on the kernel.
    fn param_space(&self, strategy: SearchStrategy) -> ParamSpace {
        let groups: [(&[&str], i64); 4] = [
            (&["linear", "multiquadric"], 0),
            (&["thin_plate_spline", "cubic"], 1),
            (&["quintic"], 2),
            (&["gaussian", "inverse_multiquadric", "inverse_quadratic"], -1),
        ];
        let subspaces = groups
            .iter()
            .map(|(kernels, min_degree)| {
                let degrees: Vec<i64> = (*min_degree..=2).collect();
                let base = Subspace::new()
                    .choice("kernel", kernels.to_vec())
                    .choice("degree", degrees);
                match strategy {
                    SearchStrategy::Grid => base.choice("smoothing", vec![0.0, 0.1, 0.5]),
                    SearchStrategy::Random | SearchStrategy::Bayes => base.uniform("smoothing", 0.0, 1.0),
                }
            })
            .collect();
        ParamSpace::Conditional(subspaces)
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
    use crate::emulators::test_support::{r2, toy_problem};
    use ndarray::array;

    #[test]
    fn test_monomial_powers_count() {
        assert!(monomial_powers(3, -1).is_empty());
        assert_eq!(monomial_powers(3, 0).len(), 1);
        assert_eq!(monomial_powers(3, 1).len(), 4);
        // C(2 + 2, 2)
        assert_eq!(monomial_powers(2, 2).len(), 6);
        assert_eq!(monomial_powers(3, 2).len(), 10);
    }

    #[test]
    fn test_interpolates_without_smoothing() {
        let (x, y) = toy_problem(30);
        let mut rbf = RadialBasisFunctions::new();
        rbf.fit(&x, &y).unwrap();
        let pred = rbf.predict(&x).unwrap();
        for (a, b) in pred.iter().zip(y.iter()) {
            assert!((a - b).abs() < 1e-6);
        }
    }

    #[test]
    fn test_reproduces_linear_function() {
        let x = array![[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0], [0.5, 0.3], [0.2, 0.8]];
        let y = x.map_axis(Axis(1), |r| 2.0 * r[0] - r[1] + 1.0).insert_axis(Axis(1));
        let mut rbf = RadialBasisFunctions::new().with_kernel(RbfKernel::Cubic);
        rbf.fit(&x, &y).unwrap();
        let pred = rbf.predict(&array![[0.7, 0.1]]).unwrap();
        assert!((pred[[0, 0]] - 2.3).abs() < 1e-6);
    }

    #[test]
    fn test_smoothing_generalises() {
        let (x, y) = toy_problem(60);
        let mut rbf = RadialBasisFunctions::new();
        rbf.set_params(&HyperParams::new().with("smoothing", 0.1).with("kernel", "gaussian").with("degree", 0i64))
            .unwrap();
        rbf.fit(&x, &y).unwrap();
        let pred = rbf.predict(&x).unwrap();
        assert!(r2(&y, &pred, 0) > 0.8);
    }

    #[test]
    fn test_param_space_is_conditional() {
        let space = RadialBasisFunctions::new().param_space(SearchStrategy::Grid);
        assert_eq!(space.subspaces().len(), 4);
        // (2 kernels * 3 degrees + 2 * 2 + 1 * 1 + 3 * 4) * 3 smoothing values
        assert_eq!(space.cardinality(), Some((6 + 4 + 1 + 12) * 3));
        for point in space.grid().unwrap() {
            let mut rbf = RadialBasisFunctions::new();
            rbf.set_params(&point).unwrap();
            let degree = rbf.config.degree;
            assert!(degree >= rbf.config.kernel.min_degree());
        }
    }

    #[test]
    fn test_rejects_bad_degree() {
        let mut rbf = RadialBasisFunctions::new();
        assert!(rbf.set_params(&HyperParams::new().with("degree", -2i64)).is_err());
        assert!(rbf.set_params(&HyperParams::new().with("degree", 1.5)).is_err());
    }
}
