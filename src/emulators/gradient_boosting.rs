//! Gradient-boosted trees emulator
//!
//! Least-squares boosting: start from the target mean and repeatedly fit
//! a shallow tree to the current residuals, adding a shrunken copy of its
//! prediction. One booster is trained per output column.

use super::decision_tree::{RegressionTree, TreeConfig};
use super::{
    apply_params, check_fit_inputs, check_n_features, invalid, read_choice,
    read_opt_u64, read_positive, read_usize, stack_outputs, unknown, Estimator, HyperParams,
};
use crate::error::{Result, SurrogateError};
use crate::search::{ParamSpace, SearchStrategy, Subspace};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use rand::prelude::*;
use rand_xoshiro::Xoshiro256PlusPlus;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

const NAME: &str = "GradientBoosting";
const MAX_FEATURES: [&str; 3] = ["all", "sqrt", "log2"];

#[derive(Debug, Clone, Serialize, Deserialize)]
struct BoostingConfig {
    n_estimators: usize,
    learning_rate: f64,
    max_depth: usize,
    min_samples_split: usize,
    min_samples_leaf: usize,
    subsample: f64,
    max_features: String,
    random_state: Option<u64>,
}

impl Default for BoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 3,
            min_samples_split: 2,
            min_samples_leaf: 1,
            subsample: 1.0,
            max_features: "all".to_string(),
            random_state: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Booster {
    init: f64,
    trees: Vec<RegressionTree>,
}

/// Boosted regression trees, one booster per output
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GradientBoosting {
    config: BoostingConfig,
    boosters: Vec<Booster>,
    n_features: usize,
}

impl GradientBoosting {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.config.n_estimators = n;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.config.random_state = Some(seed);
        self
    }

    fn subsample_indices(&self, n_samples: usize, rng: &mut Xoshiro256PlusPlus) -> Vec<usize> {
        if self.config.subsample >= 1.0 {
            return (0..n_samples).collect();
        }
        let n_sub = ((n_samples as f64 * self.config.subsample).ceil() as usize).clamp(1, n_samples);
        let mut idx = rand::seq::index::sample(rng, n_samples, n_sub).into_vec();
        idx.sort_unstable();
        idx
    }

    fn fit_booster(&self, x: &Array2<f64>, y: ArrayView1<f64>, seed: u64) -> Result<Booster> {
        let n_samples = x.nrows();
        let n_features = x.ncols();
        let init = y.mean().unwrap_or(0.0);
        let mut predictions = Array1::from_elem(n_samples, init);
        let mut rng = Xoshiro256PlusPlus::seed_from_u64(seed);

        let max_features = match self.config.max_features.as_str() {
            "sqrt" => Some(((n_features as f64).sqrt() as usize).max(1)),
            "log2" => Some(((n_features as f64).log2() as usize).max(1)),
            _ => None,
        };
        let tree_config = TreeConfig {
            max_depth: Some(self.config.max_depth),
            min_samples_split: self.config.min_samples_split,
            min_samples_leaf: self.config.min_samples_leaf,
            max_features,
        };

        let mut trees = Vec::with_capacity(self.config.n_estimators);
        for _ in 0..self.config.n_estimators {
            let residuals = (&y - &predictions).insert_axis(Axis(1));
            let sample = self.subsample_indices(n_samples, &mut rng);

            let mut tree = RegressionTree::new(tree_config.clone());
            tree.fit_indices(x, &residuals, &sample, &mut rng)?;

            // Every row moves, not only the subsampled ones
            let update = tree.predict(x)?;
            predictions.scaled_add(self.config.learning_rate, &update.column(0));
            trees.push(tree);
        }

        Ok(Booster { init, trees })
    }

    fn predict_booster(&self, booster: &Booster, x: &Array2<f64>) -> Result<Array1<f64>> {
        let mut pred = Array1::from_elem(x.nrows(), booster.init);
        for tree in &booster.trees {
            let update = tree.predict(x)?;
            pred.scaled_add(self.config.learning_rate, &update.column(0));
        }
        Ok(pred)
    }
}

impl Estimator for GradientBoosting {
    fn name(&self) -> &str {
        NAME
    }

    fn params(&self) -> HyperParams {
        let c = &self.config;
        HyperParams::new()
            .with("n_estimators", c.n_estimators)
            .with("learning_rate", c.learning_rate)
            .with("max_depth", c.max_depth)
            .with("min_samples_split", c.min_samples_split)
            .with("min_samples_leaf", c.min_samples_leaf)
            .with("subsample", c.subsample)
            .with("max_features", c.max_features.as_str())
            .with("random_state", c.random_state.map(|s| s as i64))
    }

    fn set_params(&mut self, params: &HyperParams) -> Result<()> {
        apply_params(&mut self.config, params, |c, name, value| {
            match name {
                "n_estimators" => c.n_estimators = read_usize(NAME, name, value)?,
                "learning_rate" => c.learning_rate = read_positive(NAME, name, value)?,
                "max_depth" => c.max_depth = read_usize(NAME, name, value)?.max(1),
                "min_samples_split" => c.min_samples_split = read_usize(NAME, name, value)?.max(2),
                "min_samples_leaf" => c.min_samples_leaf = read_usize(NAME, name, value)?.max(1),
                "subsample" => {
                    let v = read_positive(NAME, name, value)?;
                    if v > 1.0 {
                        return Err(invalid(NAME, name, "must lie in (0, 1]"));
                    }
                    c.subsample = v;
                }
                "max_features" => c.max_features = read_choice(NAME, name, value, &MAX_FEATURES)?,
                "random_state" => c.random_state = read_opt_u64(NAME, name, value)?,
                _ => return Err(unknown(NAME, name)),
            }
            Ok(())
        })
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array2<f64>) -> Result<()> {
        check_fit_inputs(x, y)?;
        let base_seed = self
            .config
            .random_state
            .unwrap_or_else(|| rand::thread_rng().gen());

        let columns: Vec<ArrayView1<f64>> = y.columns().into_iter().collect();
        let boosters = columns
            .into_par_iter()
            .enumerate()
            .map(|(j, col)| self.fit_booster(x, col, base_seed.wrapping_add(j as u64)))
            .collect::<Result<Vec<_>>>()?;

        self.boosters = boosters;
        self.n_features = x.ncols();
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.boosters.is_empty() {
            return Err(SurrogateError::ModelNotFitted);
        }
        check_n_features(self.n_features, x)?;
        let columns = self
            .boosters
            .iter()
            .map(|b| self.predict_booster(b, x))
            .collect::<Result<Vec<_>>>()?;
        Ok(stack_outputs(columns, x.nrows()))
    }

    fn param_space(&self, strategy: SearchStrategy) -> ParamSpace {
        let space = match strategy {
            SearchStrategy::Grid => Subspace::new()
                .choice("learning_rate", vec![0.01, 0.1])
                .choice("n_estimators", vec![100i64, 200])
                .choice("max_depth", vec![3i64, 5]),
            SearchStrategy::Random | SearchStrategy::Bayes => Subspace::new()
                .log_uniform("learning_rate", 0.01, 0.5)
                .int_uniform("n_estimators", 50, 500)
                .int_uniform("max_depth", 3, 8)
                .int_uniform("min_samples_split", 2, 20)
                .int_uniform("min_samples_leaf", 1, 6)
                .uniform("subsample", 0.6, 1.0)
                .choice("max_features", MAX_FEATURES.to_vec()),
        };
        space.into()
    }

    fn clone_unfitted(&self) -> Box<dyn Estimator> {
        Box::new(Self {
            config: self.config.clone(),
            boosters: Vec::new(),
            n_features: 0,
        })
    }

    fn is_fitted(&self) -> bool {
        !self.boosters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emulators::test_support::{r2, toy_problem};

    #[test]
    fn test_gradient_boosting_fits_toy_problem() {
        let (x, y) = toy_problem(80);
        let mut gb = GradientBoosting::new().with_n_estimators(60).with_random_state(3);
        gb.fit(&x, &y).unwrap();
        let pred = gb.predict(&x).unwrap();
        assert_eq!(pred.dim(), (80, 2));
        assert!(r2(&y, &pred, 0) > 0.9);
        assert!(r2(&y, &pred, 1) > 0.9);
    }

    #[test]
    fn test_subsample_still_updates_all_rows() {
        let (x, y) = toy_problem(60);
        let mut gb = GradientBoosting::new().with_n_estimators(40).with_random_state(11);
        gb.set_params(&HyperParams::new().with("subsample", 0.5)).unwrap();
        gb.fit(&x, &y).unwrap();
        let pred = gb.predict(&x).unwrap();
        assert!(r2(&y, &pred, 0) > 0.8);
    }

    #[test]
    fn test_subsample_out_of_range() {
        let mut gb = GradientBoosting::new();
        assert!(gb.set_params(&HyperParams::new().with("subsample", 1.5)).is_err());
    }
}
