//! CSV loading into a [`Dataset`]

use super::Dataset;
use crate::error::{Result, SurrogateError};
use ndarray::Array2;
use polars::prelude::*;
use std::path::Path;
use tracing::debug;

/// Read a CSV file and split it into simulation inputs and outputs.
///
/// `targets` names the output columns. When `features` is `None` every
/// remaining column is used as an input.
pub fn load_csv(path: &Path, targets: &[String], features: Option<&[String]>) -> Result<Dataset> {
    let df = CsvReadOptions::default()
        .with_infer_schema_length(Some(1000))
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    debug!(path = %path.display(), rows = df.height(), cols = df.width(), "loaded csv");
    dataset_from_frame(&df, targets, features)
}

/// Build a dataset from named columns of a DataFrame
pub fn dataset_from_frame(
    df: &DataFrame,
    targets: &[String],
    features: Option<&[String]>,
) -> Result<Dataset> {
    if targets.is_empty() {
        return Err(SurrogateError::DataValidation(
            "at least one target column is required".to_string(),
        ));
    }

    let feature_cols: Vec<String> = match features {
        Some(cols) => cols.to_vec(),
        None => df
            .get_column_names()
            .into_iter()
            .map(|s| s.to_string())
            .filter(|name| !targets.contains(name))
            .collect(),
    };

    if let Some(overlap) = feature_cols.iter().find(|c| targets.contains(c)) {
        return Err(SurrogateError::DataValidation(format!(
            "column '{}' is both a feature and a target",
            overlap
        )));
    }

    let x = columns_to_array2(df, &feature_cols)?;
    let y = columns_to_array2(df, targets)?;
    Dataset::new(x, y)
}

fn columns_to_array2(df: &DataFrame, col_names: &[String]) -> Result<Array2<f64>> {
    let n_rows = df.height();

    let col_data: Vec<Vec<f64>> = col_names
        .iter()
        .map(|name| {
            let column = df.column(name).map_err(|_| {
                SurrogateError::DataValidation(format!("column '{}' not found", name))
            })?;
            let series = column.as_materialized_series().cast(&DataType::Float64)?;
            series
                .f64()?
                .into_iter()
                .enumerate()
                .map(|(row, v)| {
                    v.ok_or_else(|| {
                        SurrogateError::DataValidation(format!(
                            "column '{}' has a missing value at row {}",
                            name, row
                        ))
                    })
                })
                .collect::<Result<Vec<f64>>>()
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Array2::from_shape_fn((n_rows, col_names.len()), |(r, c)| {
        col_data[c][r]
    }))
}
