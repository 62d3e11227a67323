//! Surrogate Bench - emulator comparison for simulation data
//!
//! Given simulation inputs `X` and outputs `y`, this crate trains a set of
//! candidate surrogate models (emulators) under k-fold cross-validation,
//! optionally tunes their hyperparameters, and reports how well each one
//! predicts held-out data.
//!
//! # Modules
//!
//! ## Data and scoring
//! - [`data`] - Validated datasets, input standardisation, CSV loading
//! - [`metrics`] - R², RMSE, MAE behind a common trait
//! - [`cv`] - K-fold and stratified k-fold splitting
//!
//! ## Models
//! - [`emulators`] - The `Estimator` contract and the built-in families
//! - [`registry`] - Name → constructor lookup with short aliases
//! - [`search`] - Grid, random and Bayesian hyperparameter search
//!
//! ## Orchestration
//! - [`runner`] - Parallel cross-validation with per-model failure isolation
//! - [`results`] - Score table, stored predictions, summaries
//! - [`compare`] - `CompareEngine`: setup, compare, report
//! - [`report`] - Console tables and scatter panels
//! - [`cli`] - Command-line interface
//!
//! # Example
//!
//! ```no_run
//! use surrogate_bench::prelude::*;
//! use ndarray::Array2;
//!
//! # fn main() -> surrogate_bench::Result<()> {
//! let x = Array2::from_shape_fn((40, 2), |(i, j)| (i * (j + 1)) as f64 / 40.0);
//! let y = Array2::from_shape_fn((40, 1), |(i, _)| (i as f64 / 40.0).sin());
//!
//! let mut engine = CompareEngine::new(CompareConfig::default().with_models(["sop", "gp"]));
//! engine.setup(Dataset::new(x, y)?)?;
//! let summary = engine.compare()?;
//! println!("scored {:?}", summary.models_scored);
//! engine.print_scores(None)?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod compare;
pub mod cv;
pub mod data;
pub mod emulators;
pub mod error;
pub mod metrics;
pub mod registry;
pub mod report;
pub mod results;
pub mod runner;
pub mod search;

pub use error::{Result, SurrogateError};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::compare::{CompareConfig, CompareEngine, CompareSummary};
    pub use crate::cv::{Fold, FoldStrategy, FoldStrategyKind, KFold, StratifiedKFold};
    pub use crate::data::{load_csv, Dataset, StandardScaler};
    pub use crate::emulators::{
        Estimator, GaussianProcess, GradientBoosting, HyperParams, NeuralNet, ParamValue,
        RadialBasisFunctions, RandomForest, SecondOrderPolynomial, SupportVectorMachines,
    };
    pub use crate::error::{Result, SurrogateError};
    pub use crate::metrics::{metric_by_name, Metric, Mae, Rmse, R2};
    pub use crate::registry::{default_registry, short_name, ModelRegistry};
    pub use crate::results::{MeanScores, ModelScores, PredictionPanel, ResultsStore};
    pub use crate::runner::{CancellationToken, CrossValidationRunner, ModelFailure, Workers};
    pub use crate::search::{HyperparamSearch, ParamSpace, SearchReport, SearchStrategy, Subspace};
}

/// Version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
