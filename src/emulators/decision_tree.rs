//! Multi-output regression tree used by the ensemble emulators

use crate::error::{Result, SurrogateError};
use ndarray::{Array1, Array2, ArrayView1, ArrayViewMut1};
use rand::seq::index::sample;
use rand::Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
enum TreeNode {
    Leaf {
        value: Array1<f64>,
    },
    Split {
        feature_idx: usize,
        threshold: f64,
        left: Box<TreeNode>,
        right: Box<TreeNode>,
    },
}

/// Growth limits for a regression tree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct TreeConfig {
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    /// Number of features examined per split, all when `None`
    pub max_features: Option<usize>,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: None,
        }
    }
}

/// CART regression tree with the summed-variance criterion over all outputs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct RegressionTree {
    config: TreeConfig,
    root: Option<TreeNode>,
    n_features: usize,
    n_outputs: usize,
}

struct SplitCandidate {
    feature_idx: usize,
    threshold: f64,
    gain: f64,
}

impl RegressionTree {
    pub fn new(config: TreeConfig) -> Self {
        Self {
            config,
            root: None,
            n_features: 0,
            n_outputs: 0,
        }
    }

    /// Fit on the rows listed in `indices` (duplicates allowed, as in a bootstrap sample)
    pub fn fit_indices<R: Rng>(
        &mut self,
        x: &Array2<f64>,
        y: &Array2<f64>,
        indices: &[usize],
        rng: &mut R,
    ) -> Result<()> {
        if indices.is_empty() {
            return Err(SurrogateError::Training(
                "cannot grow a tree on zero samples".to_string(),
            ));
        }
        self.n_features = x.ncols();
        self.n_outputs = y.ncols();
        self.root = Some(self.build(x, y, indices, 0, rng));
        Ok(())
    }

    fn leaf(y: &Array2<f64>, indices: &[usize]) -> TreeNode {
        let mut value = Array1::zeros(y.ncols());
        for &i in indices {
            value += &y.row(i);
        }
        value /= indices.len() as f64;
        TreeNode::Leaf { value }
    }

    fn build<R: Rng>(
        &self,
        x: &Array2<f64>,
        y: &Array2<f64>,
        indices: &[usize],
        depth: usize,
        rng: &mut R,
    ) -> TreeNode {
        let n = indices.len();
        let should_stop = n < self.config.min_samples_split
            || n < 2 * self.config.min_samples_leaf.max(1)
            || self.config.max_depth.map_or(false, |d| depth >= d);

        if should_stop {
            return Self::leaf(y, indices);
        }

        let features = self.pick_features(x.ncols(), rng);
        match self.find_best_split(x, y, indices, &features) {
            Some(split) => {
                let (left, right): (Vec<usize>, Vec<usize>) = indices
                    .iter()
                    .partition(|&&i| x[[i, split.feature_idx]] <= split.threshold);

                TreeNode::Split {
                    feature_idx: split.feature_idx,
                    threshold: split.threshold,
                    left: Box::new(self.build(x, y, &left, depth + 1, rng)),
                    right: Box::new(self.build(x, y, &right, depth + 1, rng)),
                }
            }
            None => Self::leaf(y, indices),
        }
    }

    fn pick_features<R: Rng>(&self, n_features: usize, rng: &mut R) -> Vec<usize> {
        match self.config.max_features {
            Some(k) if k < n_features => {
                let mut picked = sample(rng, n_features, k.max(1)).into_vec();
                picked.sort_unstable();
                picked
            }
            _ => (0..n_features).collect(),
        }
    }

    fn find_best_split(
        &self,
        x: &Array2<f64>,
        y: &Array2<f64>,
        indices: &[usize],
        features: &[usize],
    ) -> Option<SplitCandidate> {
        let n = indices.len();
        let n_outputs = y.ncols();
        let min_leaf = self.config.min_samples_leaf.max(1);

        let mut total_sum = vec![0.0; n_outputs];
        let mut total_sq = 0.0;
        for &i in indices {
            for (o, s) in total_sum.iter_mut().enumerate() {
                let v = y[[i, o]];
                *s += v;
                total_sq += v * v;
            }
        }
        let sse = |sum: &[f64], sq: f64, count: usize| -> f64 {
            sq - sum.iter().map(|s| s * s).sum::<f64>() / count as f64
        };
        let parent_sse = sse(&total_sum, total_sq, n);

        // Each feature is scanned independently over its sorted values
        let results: Vec<Option<SplitCandidate>> = features
            .par_iter()
            .map(|&feature_idx| {
                let mut order: Vec<usize> = indices.to_vec();
                order.sort_by(|&a, &b| x[[a, feature_idx]].total_cmp(&x[[b, feature_idx]]));

                let mut left_sum = vec![0.0; n_outputs];
                let mut left_sq = 0.0;
                let mut best: Option<SplitCandidate> = None;

                for pos in 0..n - 1 {
                    let row = order[pos];
                    for (o, s) in left_sum.iter_mut().enumerate() {
                        let v = y[[row, o]];
                        *s += v;
                        left_sq += v * v;
                    }

                    let n_left = pos + 1;
                    let n_right = n - n_left;
                    if n_left < min_leaf || n_right < min_leaf {
                        continue;
                    }
                    let here = x[[row, feature_idx]];
                    let next = x[[order[pos + 1], feature_idx]];
                    if next <= here {
                        continue;
                    }

                    let right_sum: Vec<f64> =
                        total_sum.iter().zip(&left_sum).map(|(t, l)| t - l).collect();
                    let child_sse =
                        sse(&left_sum, left_sq, n_left) + sse(&right_sum, total_sq - left_sq, n_right);
                    let gain = (parent_sse - child_sse) / n as f64;

                    if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                        best = Some(SplitCandidate {
                            feature_idx,
                            threshold: (here + next) / 2.0,
                            gain,
                        });
                    }
                }
                best
            })
            .collect();

        // Highest gain wins; earlier features win ties
        results.into_iter().flatten().fold(None, |acc, c| match acc {
            Some(best) if best.gain >= c.gain => Some(best),
            _ => Some(c),
        })
    }

    fn predict_row(&self, node: &TreeNode, row: ArrayView1<f64>, mut out: ArrayViewMut1<f64>) {
        match node {
            TreeNode::Leaf { value } => out.assign(value),
            TreeNode::Split {
                feature_idx,
                threshold,
                left,
                right,
            } => {
                if row[*feature_idx] <= *threshold {
                    self.predict_row(left, row, out)
                } else {
                    self.predict_row(right, row, out)
                }
            }
        }
    }

    pub fn predict(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        let root = self.root.as_ref().ok_or(SurrogateError::ModelNotFitted)?;
        super::check_n_features(self.n_features, x)?;

        let mut out = Array2::zeros((x.nrows(), self.n_outputs));
        for (row, target) in x.outer_iter().zip(out.outer_iter_mut()) {
            self.predict_row(root, row, target);
        }
        Ok(out)
    }

    /// Depth of the fitted tree
    pub fn depth(&self) -> usize {
        fn walk(node: &TreeNode) -> usize {
            match node {
                TreeNode::Leaf { .. } => 0,
                TreeNode::Split { left, right, .. } => 1 + walk(left).max(walk(right)),
            }
        }
        self.root.as_ref().map_or(0, walk)
    }
}
