//! Random forest emulator

use super::decision_tree::{RegressionTree, TreeConfig};
use super::{
    apply_params, check_fit_inputs, check_n_features, read_bool, read_choice, read_opt_u64,
    read_opt_usize, read_usize, invalid, unknown, Estimator, HyperParams, ParamValue,
};
use crate::error::{Result, SurrogateError};
use crate::search::{ParamSpace, SearchStrategy, Subspace};
use ndarray::Array2;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

const NAME: &str = "RandomForest";
const MAX_FEATURES: [&str; 3] = ["all", "sqrt", "log2"];

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ForestConfig {
    n_estimators: usize,
    max_depth: Option<usize>,
    min_samples_split: usize,
    min_samples_leaf: usize,
    max_features: String,
    bootstrap: bool,
    random_state: Option<u64>,
}

impl Default for ForestConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: "all".to_string(),
            bootstrap: true,
            random_state: None,
        }
    }
}

impl ForestConfig {
    fn features_per_split(&self, n_features: usize) -> usize {
        let k = match self.max_features.as_str() {
            "sqrt" => (n_features as f64).sqrt() as usize,
            "log2" => (n_features as f64).log2() as usize,
            _ => n_features,
        };
        k.clamp(1, n_features.max(1))
    }
}

/// Bagged ensemble of multi-output regression trees
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RandomForest {
    config: ForestConfig,
    trees: Vec<RegressionTree>,
    n_features: usize,
}

impl RandomForest {
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
}

impl Estimator for RandomForest {
    fn name(&self) -> &str {
        NAME
    }

    fn params(&self) -> HyperParams {
        let c = &self.config;
        HyperParams::new()
            .with("n_estimators", c.n_estimators)
            .with("max_depth", c.max_depth)
            .with("min_samples_split", c.min_samples_split)
            .with("min_samples_leaf", c.min_samples_leaf)
            .with("max_features", c.max_features.as_str())
            .with("bootstrap", c.bootstrap)
            .with("random_state", c.random_state.map(|s| s as i64))
    }

    fn set_params(&mut self, params: &HyperParams) -> Result<()> {
        apply_params(&mut self.config, params, |c, name, value| {
            match name {
                "n_estimators" => {
                    c.n_estimators = read_usize(NAME, name, value)?;
                    if c.n_estimators == 0 {
                        return Err(invalid(NAME, name, "must be at least 1"));
                    }
                }
                "max_depth" => c.max_depth = read_opt_usize(NAME, name, value)?,
                "min_samples_split" => c.min_samples_split = read_usize(NAME, name, value)?.max(2),
                "min_samples_leaf" => c.min_samples_leaf = read_usize(NAME, name, value)?.max(1),
                "max_features" => c.max_features = read_choice(NAME, name, value, &MAX_FEATURES)?,
                "bootstrap" => c.bootstrap = read_bool(NAME, name, value)?,
                "random_state" => c.random_state = read_opt_u64(NAME, name, value)?,
                _ => return Err(unknown(NAME, name)),
            }
            Ok(())
        })
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array2<f64>) -> Result<()> {
        check_fit_inputs(x, y)?;
        let n_samples = x.nrows();
        let tree_config = TreeConfig {
            max_depth: self.config.max_depth,
            min_samples_split: self.config.min_samples_split,
            min_samples_leaf: self.config.min_samples_leaf,
            max_features: Some(self.config.features_per_split(x.ncols())),
        };
        let base_seed = self
            .config
            .random_state
            .unwrap_or_else(|| rand::thread_rng().gen());
        let bootstrap = self.config.bootstrap;

        let trees: Vec<RegressionTree> = (0..self.config.n_estimators)
            .into_par_iter()
            .map(|tree_idx| {
                let mut rng = ChaCha8Rng::seed_from_u64(base_seed.wrapping_add(tree_idx as u64));
                let sample: Vec<usize> = if bootstrap {
                    (0..n_samples).map(|_| rng.gen_range(0..n_samples)).collect()
                } else {
                    (0..n_samples).collect()
                };
                let mut tree = RegressionTree::new(tree_config.clone());
                tree.fit_indices(x, y, &sample, &mut rng)?;
                Ok(tree)
            })
            .collect::<Result<Vec<_>>>()?;

        self.trees = trees;
        self.n_features = x.ncols();
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if self.trees.is_empty() {
            return Err(SurrogateError::ModelNotFitted);
        }
        check_n_features(self.n_features, x)?;

        let per_tree: Vec<Array2<f64>> = self
            .trees
            .par_iter()
            .map(|t| t.predict(x))
            .collect::<Result<Vec<_>>>()?;

        let mut sum = Array2::zeros(per_tree[0].dim());
        for p in &per_tree {
            sum += p;
        }
        Ok(sum / self.trees.len() as f64)
    }

    fn param_space(&self, strategy: SearchStrategy) -> ParamSpace {
        let space = match strategy {
            SearchStrategy::Grid => Subspace::new()
                .choice("n_estimators", vec![50i64, 100, 200])
                .choice("max_depth", vec![ParamValue::None, 10i64.into(), 20i64.into()])
                .choice("min_samples_leaf", vec![1i64, 2, 4])
                .choice("max_features", vec!["all", "sqrt"]),
            SearchStrategy::Random | SearchStrategy::Bayes => Subspace::new()
                .int_uniform("n_estimators", 50, 500)
                .int_uniform("min_samples_split", 2, 20)
                .int_uniform("min_samples_leaf", 1, 10)
                .choice("max_features", MAX_FEATURES.to_vec())
                .choice("bootstrap", vec![true, false])
                .choice(
                    "max_depth",
                    vec![
                        ParamValue::None,
                        5i64.into(),
                        10i64.into(),
                        15i64.into(),
                        20i64.into(),
                        25i64.into(),
                    ],
                ),
        };
        space.into()
    }

    fn clone_unfitted(&self) -> Box<dyn Estimator> {
        Box::new(Self {
            config: self.config.clone(),
            trees: Vec::new(),
            n_features: 0,
        })
    }

    fn is_fitted(&self) -> bool {
        !self.trees.is_empty()
    }
}
