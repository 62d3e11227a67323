//! Simulation datasets
//!
//! Provides the validated input/output pair every comparison runs on:
//! - [`Dataset`] - rectangular, finite `X` (n, f) and `y` (n, o)
//! - [`StandardScaler`] - z-score normalisation of the inputs
//! - [`load_csv`] - build a dataset from a CSV file

mod loader;
mod scaler;

pub use loader::{dataset_from_frame, load_csv};
pub use scaler::StandardScaler;

use crate::error::{Result, SurrogateError};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

/// Simulation inputs and outputs
///
/// Targets are always stored as a 2-D array; a 1-D target becomes a single
/// output column.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dataset {
    x: Array2<f64>,
    y: Array2<f64>,
}

impl Dataset {
    /// Create a dataset from an input matrix and a (possibly multi-output) target matrix
    pub fn new(x: Array2<f64>, y: Array2<f64>) -> Result<Self> {
        let dataset = Self { x, y };
        dataset.validate()?;
        Ok(dataset)
    }

    /// Create a dataset with a single output
    pub fn from_vector(x: Array2<f64>, y: Array1<f64>) -> Result<Self> {
        Self::new(x, y.insert_axis(Axis(1)))
    }

    fn validate(&self) -> Result<()> {
        let (n, f) = self.x.dim();
        let (n_y, o) = self.y.dim();

        if n == 0 {
            return Err(SurrogateError::DataValidation(
                "X must contain at least one sample".to_string(),
            ));
        }
        if f == 0 {
            return Err(SurrogateError::DataValidation(
                "X must contain at least one feature".to_string(),
            ));
        }
        if o == 0 {
            return Err(SurrogateError::DataValidation(
                "y must contain at least one output".to_string(),
            ));
        }
        if n != n_y {
            return Err(SurrogateError::DataValidation(format!(
                "X has {} samples but y has {}",
                n, n_y
            )));
        }
        if let Some(((row, col), v)) = self.x.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(SurrogateError::DataValidation(format!(
                "X contains non-finite value {} at ({}, {})",
                v, row, col
            )));
        }
        if let Some(((row, col), v)) = self.y.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(SurrogateError::DataValidation(format!(
                "y contains non-finite value {} at ({}, {})",
                v, row, col
            )));
        }
        Ok(())
    }

    /// Simulation inputs
    pub fn x(&self) -> &Array2<f64> {
        &self.x
    }

    /// Simulation outputs
    pub fn y(&self) -> &Array2<f64> {
        &self.y
    }

    pub fn n_samples(&self) -> usize {
        self.x.nrows()
    }

    pub fn n_features(&self) -> usize {
        self.x.ncols()
    }

    pub fn n_outputs(&self) -> usize {
        self.y.ncols()
    }

    /// Rows of X and y at the given indices
    pub fn take(&self, indices: &[usize]) -> (Array2<f64>, Array2<f64>) {
        (
            self.x.select(Axis(0), indices),
            self.y.select(Axis(0), indices),
        )
    }

    /// Replace the inputs with their standardised version
    pub(crate) fn standardise(&mut self, scaler: &mut StandardScaler) -> Result<()> {
        self.x = scaler.fit_transform(&self.x)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_dataset_from_vector() {
        let x = array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]];
        let y = array![1.0, 2.0, 3.0];
        let ds = Dataset::from_vector(x, y).unwrap();
        assert_eq!(ds.n_samples(), 3);
        assert_eq!(ds.n_features(), 2);
        assert_eq!(ds.n_outputs(), 1);
        assert_eq!(ds.y()[[2, 0]], 3.0);
    }

    #[test]
    fn test_dataset_rejects_mismatched_rows() {
        let x = array![[1.0], [2.0]];
        let y = array![[1.0], [2.0], [3.0]];
        let err = Dataset::new(x, y).unwrap_err();
        assert!(matches!(err, SurrogateError::DataValidation(_)));
    }

    #[test]
    fn test_dataset_rejects_non_finite() {
        let x = array![[1.0], [f64::NAN]];
        let y = array![1.0, 2.0];
        assert!(matches!(
            Dataset::from_vector(x, y),
            Err(SurrogateError::DataValidation(_))
        ));

        let x = array![[1.0], [2.0]];
        let y = array![1.0, f64::INFINITY];
        assert!(matches!(
            Dataset::from_vector(x, y),
            Err(SurrogateError::DataValidation(_))
        ));
    }

    #[test]
    fn test_dataset_rejects_empty() {
        let x = Array2::<f64>::zeros((0, 2));
        let y = Array2::<f64>::zeros((0, 1));
        assert!(Dataset::new(x, y).is_err());
    }

    #[test]
    fn test_take_rows() {
        let x = array![[1.0], [2.0], [3.0], [4.0]];
        let y = array![[10.0, 1.0], [20.0, 2.0], [30.0, 3.0], [40.0, 4.0]];
        let ds = Dataset::new(x, y).unwrap();
        let (xs, ys) = ds.take(&[3, 1]);
        assert_eq!(xs, array![[4.0], [2.0]]);
        assert_eq!(ys, array![[40.0, 4.0], [20.0, 2.0]]);
    }
}
