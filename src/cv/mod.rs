//! Cross-validation fold strategies
//!
//! A fold strategy partitions the sample indices `0..n` into `k` disjoint
//! train/test pairs. Every index lands in exactly one test set, and the
//! split is reproducible for a fixed `random_state`.

use crate::data::Dataset;
use crate::error::{Result, SurrogateError};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// A single train/test split
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    pub index: usize,
    pub train_indices: Vec<usize>,
    pub test_indices: Vec<usize>,
}

/// Strategy that splits a dataset into folds
pub trait FoldStrategy: Send + Sync {
    /// Produce the folds for a dataset, ordered by fold index
    fn split(&self, dataset: &Dataset) -> Result<Vec<Fold>>;

    /// Number of folds produced
    fn n_splits(&self) -> usize;
}

/// Shared handle to a fold strategy
pub type FoldStrategyRef = Arc<dyn FoldStrategy>;

impl fmt::Debug for dyn FoldStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FoldStrategy(n_splits={})", self.n_splits())
    }
}

fn rng_for(random_state: Option<u64>) -> ChaCha8Rng {
    match random_state {
        Some(seed) => ChaCha8Rng::seed_from_u64(seed),
        None => ChaCha8Rng::from_entropy(),
    }
}

fn check_split_sizes(n_samples: usize, n_splits: usize) -> Result<()> {
    if n_splits < 2 {
        return Err(SurrogateError::DataValidation(
            "n_splits must be at least 2".to_string(),
        ));
    }
    if n_samples < n_splits {
        return Err(SurrogateError::DataValidation(format!(
            "n_samples ({}) must be >= n_splits ({})",
            n_samples, n_splits
        )));
    }
    Ok(())
}

/// Turn per-fold test index lists into complete folds
fn folds_from_test_sets(test_sets: Vec<Vec<usize>>) -> Vec<Fold> {
    let k = test_sets.len();
    (0..k)
        .map(|index| {
            let train_indices = test_sets
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != index)
                .flat_map(|(_, f)| f.iter().copied())
                .collect();
            Fold {
                index,
                train_indices,
                test_indices: test_sets[index].clone(),
            }
        })
        .collect()
}

// ============ K-Fold ============

/// Plain k-fold: contiguous blocks of the (optionally shuffled) index list
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KFold {
    pub n_splits: usize,
    pub shuffle: bool,
    pub random_state: Option<u64>,
}

impl KFold {
    pub fn new(n_splits: usize) -> Self {
        Self {
            n_splits,
            shuffle: false,
            random_state: None,
        }
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Split `0..n_samples` without looking at the data
    pub fn split_indices(&self, n_samples: usize) -> Result<Vec<Fold>> {
        check_split_sizes(n_samples, self.n_splits)?;

        let mut indices: Vec<usize> = (0..n_samples).collect();
        if self.shuffle {
            indices.shuffle(&mut rng_for(self.random_state));
        }

        // The first n % k folds take one extra sample
        let base = n_samples / self.n_splits;
        let remainder = n_samples % self.n_splits;

        let mut test_sets = Vec::with_capacity(self.n_splits);
        let mut current = 0;
        for i in 0..self.n_splits {
            let size = if i < remainder { base + 1 } else { base };
            test_sets.push(indices[current..current + size].to_vec());
            current += size;
        }

        Ok(folds_from_test_sets(test_sets))
    }
}

impl FoldStrategy for KFold {
    fn split(&self, dataset: &Dataset) -> Result<Vec<Fold>> {
        self.split_indices(dataset.n_samples())
    }

    fn n_splits(&self) -> usize {
        self.n_splits
    }
}

// ============ Stratified K-Fold ============

/// Stratified k-fold for continuous targets.
///
/// The first output column is cut into `n_splits` quantile bins, and the
/// members of each bin are dealt round-robin across the folds so that every
/// fold covers the whole target range.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StratifiedKFold {
    pub n_splits: usize,
    pub shuffle: bool,
    pub random_state: Option<u64>,
}

impl StratifiedKFold {
    pub fn new(n_splits: usize) -> Self {
        Self {
            n_splits,
            shuffle: false,
            random_state: None,
        }
    }

    pub fn with_shuffle(mut self, shuffle: bool) -> Self {
        self.shuffle = shuffle;
        self
    }

    pub fn with_random_state(mut self, seed: u64) -> Self {
        self.random_state = Some(seed);
        self
    }

    /// Split using an explicit stratification variable
    pub fn split_by(&self, strata: &[f64]) -> Result<Vec<Fold>> {
        let n = strata.len();
        check_split_sizes(n, self.n_splits)?;

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| strata[a].total_cmp(&strata[b]).then(a.cmp(&b)));

        let mut bins: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for (rank, &idx) in order.iter().enumerate() {
            bins.entry(rank * self.n_splits / n).or_default().push(idx);
        }

        if self.shuffle {
            let mut rng = rng_for(self.random_state);
            for members in bins.values_mut() {
                members.shuffle(&mut rng);
            }
        }

        // Continue the round-robin across bins so fold sizes stay balanced
        let mut test_sets: Vec<Vec<usize>> = vec![Vec::new(); self.n_splits];
        let mut slot = 0;
        for members in bins.values() {
            for &idx in members {
                test_sets[slot % self.n_splits].push(idx);
                slot += 1;
            }
        }
        for set in &mut test_sets {
            set.sort_unstable();
        }

        Ok(folds_from_test_sets(test_sets))
    }
}

impl FoldStrategy for StratifiedKFold {
    fn split(&self, dataset: &Dataset) -> Result<Vec<Fold>> {
        let strata: Vec<f64> = dataset.y().column(0).to_vec();
        self.split_by(&strata)
    }

    fn n_splits(&self) -> usize {
        self.n_splits
    }
}

// ============ Strategy selection ============

/// Named fold strategy used in configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FoldStrategyKind {
    #[default]
    Kfold,
    StratifiedKfold,
}

impl FoldStrategyKind {
    /// Build the strategy with the given parameters
    pub fn build(self, n_splits: usize, shuffle: bool, random_state: Option<u64>) -> FoldStrategyRef {
        match self {
            FoldStrategyKind::Kfold => Arc::new(KFold {
                n_splits,
                shuffle,
                random_state,
            }),
            FoldStrategyKind::StratifiedKfold => Arc::new(StratifiedKFold {
                n_splits,
                shuffle,
                random_state,
            }),
        }
    }
}

impl fmt::Display for FoldStrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FoldStrategyKind::Kfold => write!(f, "kfold"),
            FoldStrategyKind::StratifiedKfold => write!(f, "stratified_kfold"),
        }
    }
}

impl FromStr for FoldStrategyKind {
    type Err = SurrogateError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "kfold" => Ok(FoldStrategyKind::Kfold),
            "stratified_kfold" => Ok(FoldStrategyKind::StratifiedKfold),
            other => Err(SurrogateError::Config(format!(
                "unknown fold strategy '{}', expected kfold or stratified_kfold",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_partition(folds: &[Fold], n: usize) {
        let mut all_test: Vec<usize> = folds.iter().flat_map(|f| f.test_indices.clone()).collect();
        all_test.sort_unstable();
        assert_eq!(all_test, (0..n).collect::<Vec<_>>());

        for fold in folds {
            assert_eq!(fold.train_indices.len() + fold.test_indices.len(), n);
            for idx in &fold.test_indices {
                assert!(!fold.train_indices.contains(idx));
            }
        }
    }

    #[test]
    fn test_k_fold_sizes() {
        let folds = KFold::new(3).split_indices(10).unwrap();
        assert_eq!(folds.len(), 3);
        let sizes: Vec<usize> = folds.iter().map(|f| f.test_indices.len()).collect();
        assert_eq!(sizes, vec![4, 3, 3]);
        assert_eq!(folds[0].test_indices, vec![0, 1, 2, 3]);
        assert_partition(&folds, 10);
    }

    #[test]
    fn test_k_fold_shuffle_reproducible() {
        let cv = KFold::new(5).with_shuffle(true).with_random_state(42);
        let a = cv.split_indices(10).unwrap();
        let b = cv.split_indices(10).unwrap();
        assert_eq!(a, b);
        assert_partition(&a, 10);

        let other = KFold::new(5).with_shuffle(true).with_random_state(7);
        assert_ne!(a, other.split_indices(10).unwrap());
    }

    #[test]
    fn test_k_fold_invalid() {
        assert!(KFold::new(1).split_indices(10).is_err());
        assert!(KFold::new(5).split_indices(3).is_err());
    }

    #[test]
    fn test_stratified_covers_range() {
        let strata: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let folds = StratifiedKFold::new(4).split_by(&strata).unwrap();
        assert_partition(&folds, 20);

        // Each fold holds one sample from each quartile
        for fold in &folds {
            assert_eq!(fold.test_indices.len(), 5);
            let mut quartiles: Vec<usize> = fold.test_indices.iter().map(|i| i * 4 / 20).collect();
            quartiles.sort_unstable();
            quartiles.dedup();
            assert_eq!(quartiles.len(), 4);
        }
    }

    #[test]
    fn test_stratified_shuffle_reproducible() {
        let strata: Vec<f64> = (0..17).map(|i| ((i * 7) % 11) as f64).collect();
        let cv = StratifiedKFold::new(3).with_shuffle(true).with_random_state(42);
        let a = cv.split_by(&strata).unwrap();
        assert_eq!(a, cv.split_by(&strata).unwrap());
        assert_partition(&a, 17);
    }

    #[test]
    fn test_fold_strategy_kind_parse() {
        assert_eq!("kfold".parse::<FoldStrategyKind>().unwrap(), FoldStrategyKind::Kfold);
        assert_eq!(
            "stratified_kfold".parse::<FoldStrategyKind>().unwrap(),
            FoldStrategyKind::StratifiedKfold
        );
        assert!("loo".parse::<FoldStrategyKind>().is_err());
        assert_eq!(FoldStrategyKind::Kfold.build(4, false, None).n_splits(), 4);
    }
}
