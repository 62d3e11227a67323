//! Candidate generation for random and Bayesian search

use super::{Domain, ParamSpace};
use crate::emulators::{Estimator, GaussianProcess, GpKernel, HyperParams};
use ndarray::{Array1, Array2};
use rand::Rng;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;
use tracing::debug;

const MAX_DRAWS_PER_POINT: usize = 50;

/// Draw one point, picking a conditional subspace uniformly
fn draw<R: Rng + ?Sized>(space: &ParamSpace, rng: &mut R) -> HyperParams {
    let subs = space.subspaces();
    subs[rng.gen_range(0..subs.len())].sample(rng)
}

/// Up to `n_iter` distinct configurations.
///
/// An all-discrete space no larger than the budget is enumerated in full.
pub(crate) fn random_candidates<R: Rng + ?Sized>(
    space: &ParamSpace,
    n_iter: usize,
    rng: &mut R,
) -> Vec<HyperParams> {
    if space.is_empty() {
        return vec![HyperParams::new()];
    }

    if let Some(cardinality) = space.cardinality() {
        if cardinality <= n_iter {
            let mut all: Vec<HyperParams> = Vec::with_capacity(cardinality);
            for sub in space.subspaces() {
                for point in sub.enumerate().unwrap_or_default() {
                    if !all.contains(&point) {
                        all.push(point);
                    }
                }
            }
            return all;
        }
    }

    let mut out: Vec<HyperParams> = Vec::with_capacity(n_iter);
    let mut draws = 0;
    while out.len() < n_iter && draws < n_iter * MAX_DRAWS_PER_POINT {
        draws += 1;
        let point = draw(space, rng);
        if !out.contains(&point) {
            out.push(point);
        }
    }
    out
}

/// Index of the subspace a point was drawn from
fn locate(space: &ParamSpace, point: &HyperParams) -> usize {
    space
        .subspaces()
        .iter()
        .position(|sub| {
            sub.dims().iter().all(|(name, domain)| match (point.get(name), domain) {
                (None, _) => false,
                (Some(v), Domain::Choice { values }) => values.contains(v),
                (Some(_), _) => true,
            })
        })
        .unwrap_or(0)
}

/// Map a point into the unit cube; parameters absent from its subspace sit at 0
fn encode(space: &ParamSpace, names: &[String], point: &HyperParams) -> Vec<f64> {
    let subs = space.subspaces();
    let idx = locate(space, point);
    let sub = &subs[idx];

    let mut row: Vec<f64> = names
        .iter()
        .map(|name| {
            let domain = sub.dims().iter().find(|(n, _)| n == name).map(|(_, d)| d);
            match (domain, point.get(name)) {
                (Some(d), Some(v)) => d.encode(v),
                _ => 0.0,
            }
        })
        .collect();
    if subs.len() > 1 {
        row.push((idx as f64 + 0.5) / subs.len() as f64);
    }
    row
}

fn normal_cdf(x: f64) -> f64 {
    0.5 * (1.0 + erf(x / std::f64::consts::SQRT_2))
}

fn normal_pdf(x: f64) -> f64 {
    (-0.5 * x * x).exp() / (2.0 * std::f64::consts::PI).sqrt()
}

/// Abramowitz and Stegun 7.1.26
fn erf(x: f64) -> f64 {
    let (a1, a2, a3, a4, a5) = (0.254829592, -0.284496736, 1.421413741, -1.453152027, 1.061405429);
    let p = 0.3275911;

    let sign = if x < 0.0 { -1.0 } else { 1.0 };
    let x = x.abs();
    let t = 1.0 / (1.0 + p * x);
    let y = 1.0 - (((((a5 * t + a4) * t) + a3) * t + a2) * t + a1) * t * (-x * x).exp();
    sign * y
}

/// Expected improvement over `best` for a maximised objective
pub(crate) fn expected_improvement(mean: f64, std: f64, best: f64) -> f64 {
    let std = std.max(1e-10);
    let improvement = mean - best;
    let z = improvement / std;
    improvement * normal_cdf(z) + std * normal_pdf(z)
}

/// Gaussian-process guided sampler; scores in the history are maximised
pub(crate) struct BayesSampler {
    rng: Xoshiro256PlusPlus,
    n_startup: usize,
    n_candidates: usize,
}

impl BayesSampler {
    pub(crate) fn new(seed: Option<u64>, n_startup: usize) -> Self {
        let rng = match seed {
            Some(s) => Xoshiro256PlusPlus::seed_from_u64(s),
            None => Xoshiro256PlusPlus::from_entropy(),
        };
        Self {
            rng,
            n_startup,
            n_candidates: 256,
        }
    }

    /// Fresh points not yet evaluated
    fn unseen(&mut self, space: &ParamSpace, history: &[(HyperParams, f64)], n: usize) -> Vec<HyperParams> {
        let mut out: Vec<HyperParams> = Vec::with_capacity(n);
        let mut draws = 0;
        while out.len() < n && draws < n * MAX_DRAWS_PER_POINT {
            draws += 1;
            let p = draw(space, &mut self.rng);
            if !out.contains(&p) && !history.iter().any(|(h, _)| *h == p) {
                out.push(p);
            }
        }
        out
    }

    /// Next configuration to evaluate, `None` once the space is exhausted
    pub(crate) fn suggest(&mut self, space: &ParamSpace, history: &[(HyperParams, f64)]) -> Option<HyperParams> {
        if space.is_empty() {
            return history.is_empty().then(HyperParams::new);
        }
        if history.len() < self.n_startup {
            return self.unseen(space, history, 1).pop();
        }

        let candidates = self.unseen(space, history, self.n_candidates);
        if candidates.is_empty() {
            return None;
        }

        let names = space.param_names();
        let rows: Vec<Vec<f64>> = history.iter().map(|(p, _)| encode(space, &names, p)).collect();
        let width = rows[0].len();
        let x = Array2::from_shape_fn((rows.len(), width), |(i, j)| rows[i][j]);
        let y = Array1::from_iter(history.iter().map(|(_, s)| *s)).insert_axis(ndarray::Axis(1));
        let best = history.iter().map(|(_, s)| *s).fold(f64::NEG_INFINITY, f64::max);

        let mut surrogate = GaussianProcess::new()
            .with_kernel(GpKernel::Matern52)
            .with_length_scale(0.5);
        if let Err(err) = surrogate.fit(&x, &y) {
            debug!(error = %err, "surrogate fit failed, falling back to random sampling");
            return candidates.into_iter().next();
        }

        let cand_rows: Vec<Vec<f64>> = candidates.iter().map(|p| encode(space, &names, p)).collect();
        let xc = Array2::from_shape_fn((cand_rows.len(), width), |(i, j)| cand_rows[i][j]);
        let (mean, std) = match surrogate.predict_with_std(&xc) {
            Ok(Some(pred)) => pred,
            _ => return candidates.into_iter().next(),
        };

        let mut best_idx = 0;
        let mut best_ei = f64::NEG_INFINITY;
        for i in 0..candidates.len() {
            let ei = expected_improvement(mean[[i, 0]], std[[i, 0]], best);
            if ei > best_ei {
                best_ei = ei;
                best_idx = i;
            }
        }
        candidates.into_iter().nth(best_idx)
    }
}
