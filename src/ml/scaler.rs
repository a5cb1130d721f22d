use crate::error::{AppError, Result};
use crate::ml::classifier::to_dense_matrix;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use smartcore::api::{Transformer, UnsupervisedEstimator};
use smartcore::linalg::basic::arrays::Array;
use smartcore::linalg::basic::matrix::DenseMatrix;
use smartcore::preprocessing::numerical::{self, StandardScalerParameters};

/// Per-column standardisation over smartcore's scaler.
///
/// Fit once over the training matrix and reused unchanged for every
/// inference vector. Columns that were constant at fit time are only
/// centred, never divided by smartcore's floored zero deviation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    inner: numerical::StandardScaler<f64>,
    n_features: usize,

    /// `(column, value)` of every column constant in the training matrix
    constant: Vec<(usize, f64)>,
}

impl StandardScaler {
    /// Fit column means and population standard deviations
    pub fn fit(x: &Array2<f64>) -> Result<Self> {
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(AppError::Training(
                "Cannot fit scaler on an empty matrix".to_string(),
            ));
        }

        let params = StandardScalerParameters::default();
        let inner = numerical::StandardScaler::<f64>::fit(&to_dense_matrix(x), params)
            .map_err(|e| AppError::Training(format!("Failed to fit scaler: {}", e)))?;

        let constant = x
            .columns()
            .into_iter()
            .enumerate()
            .filter_map(|(j, column)| {
                let first = column[0];
                column.iter().all(|v| *v == first).then_some((j, first))
            })
            .collect();

        Ok(Self {
            inner,
            n_features: x.ncols(),
            constant,
        })
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Indices of the columns that are centred but not scaled
    pub fn constant_columns(&self) -> Vec<usize> {
        self.constant.iter().map(|(j, _)| *j).collect()
    }

    /// Standardise every row of `x`
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_width(x.ncols())?;
        if x.nrows() == 0 {
            return Ok(x.clone());
        }

        let scaled: DenseMatrix<f64> = self
            .inner
            .transform(&to_dense_matrix(x))
            .map_err(|e| AppError::Internal(format!("Scaling failed: {}", e)))?;

        let mut out = Array2::from_shape_fn(x.dim(), |(i, j)| *scaled.get((i, j)));
        for &(j, value) in &self.constant {
            for (o, v) in out.column_mut(j).iter_mut().zip(x.column(j)) {
                *o = v - value;
            }
        }
        Ok(out)
    }

    /// Standardise one feature vector
    pub fn transform_row(&self, row: &[f64]) -> Result<Vec<f64>> {
        self.check_width(row.len())?;

        let x = Array2::from_shape_vec((1, row.len()), row.to_vec())
            .map_err(|e| AppError::Internal(format!("Failed to create feature array: {}", e)))?;
        Ok(self.transform(&x)?.row(0).to_vec())
    }

    fn check_width(&self, width: usize) -> Result<()> {
        if width != self.n_features {
            return Err(AppError::Validation(format!(
                "Scaler expects {} features, got {}",
                self.n_features, width
            )));
        }
        Ok(())
    }
}
