//! Ordinary least squares on a numeric design matrix.

use ndarray::{Array1, Array2, ArrayView1};
use ndarray_linalg::SVD;
use serde::{Deserialize, Serialize};

use crate::error::ModelError;

/// Singular values below this fraction of the largest are treated as zero
/// when deciding the rank of the design matrix.
const RANK_TOLERANCE: f64 = 1e-10;

/// A fitted ordinary least squares model: an intercept plus one coefficient
/// per predictor column, with the usual fit summaries.
///
/// Created once by [`LinearModel::fit`] and immutable thereafter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearModel {
    predictor_names: Vec<String>,
    intercept: f64,
    coefficients: Array1<f64>,
    residual_standard_error: f64,
    r_squared: f64,
    fitted_values: Array1<f64>,
    residuals: Array1<f64>,
}

impl LinearModel {
    /// Fits least-squares coefficients for `target ~ intercept + predictors`.
    ///
    /// The solve goes through the singular value decomposition of the design
    /// matrix (intercept column prepended), which is robust for tall systems
    /// and makes rank deficiency explicit: the rank is the number of singular
    /// values above `1e-10` times the largest.
    ///
    /// # Errors
    /// - `ModelError::InvalidInput` on dimension mismatches or an empty
    ///   design.
    /// - `ModelError::RankDeficient` if the design matrix does not have full
    ///   column rank (collinear predictors, or fewer rows than coefficients),
    ///   since the least-squares solution is then not unique.
    pub fn fit(
        predictors: &Array2<f64>,
        predictor_names: &[String],
        target: &Array1<f64>,
    ) -> Result<Self, ModelError> {
        let n_samples = predictors.nrows();
        let n_predictors = predictors.ncols();

        if n_predictors == 0 {
            return Err(ModelError::InvalidInput(
                "at least one predictor column is required".to_string(),
            ));
        }
        if predictor_names.len() != n_predictors {
            return Err(ModelError::InvalidInput(format!(
                "{} predictor names were given for {} predictor columns",
                predictor_names.len(),
                n_predictors
            )));
        }
        if target.len() != n_samples {
            return Err(ModelError::InvalidInput(format!(
                "target has {} rows but predictors have {}",
                target.len(),
                n_samples
            )));
        }

        // Design matrix with the intercept column prepended.
        let n_coefficients = n_predictors + 1;
        let mut design = Array2::<f64>::ones((n_samples, n_coefficients));
        design
            .slice_mut(ndarray::s![.., 1..])
            .assign(predictors);

        let (u_opt, singular_values, vt_opt) = design.svd(true, true)?;
        let u = u_opt.ok_or_else(|| {
            ModelError::InvalidInput("SVD did not return left singular vectors".to_string())
        })?;
        let vt = vt_opt.ok_or_else(|| {
            ModelError::InvalidInput("SVD did not return right singular vectors".to_string())
        })?;

        let largest = singular_values.iter().cloned().fold(0.0_f64, f64::max);
        let rank = singular_values
            .iter()
            .filter(|&&s| s > largest * RANK_TOLERANCE)
            .count();
        if rank < n_coefficients {
            return Err(ModelError::RankDeficient {
                rank,
                columns: n_coefficients,
            });
        }

        // beta = V diag(1/s) U^T y, summed over the retained singular values.
        let mut beta = Array1::<f64>::zeros(n_coefficients);
        for i in 0..n_coefficients {
            let projection = u.column(i).dot(target) / singular_values[i];
            beta.scaled_add(projection, &vt.row(i));
        }

        let fitted_values = design.dot(&beta);
        let residuals = target - &fitted_values;
        let rss: f64 = residuals.iter().map(|r| r * r).sum();

        let degrees_of_freedom = n_samples.saturating_sub(n_coefficients);
        let residual_standard_error = if degrees_of_freedom > 0 {
            (rss / degrees_of_freedom as f64).sqrt()
        } else {
            // Saturated fit: no residual degrees of freedom.
            f64::NAN
        };

        let tss: f64 = match target.mean() {
            Some(mean) => target.iter().map(|y| (y - mean).powi(2)).sum(),
            None => 0.0,
        };
        let r_squared = if tss > f64::EPSILON {
            1.0 - rss / tss
        } else {
            f64::NAN
        };

        log::debug!(
            "fitted least squares on {} rows x {} predictors; RSE {:.6}, R^2 {:.6}",
            n_samples,
            n_predictors,
            residual_standard_error,
            r_squared
        );

        Ok(Self {
            predictor_names: predictor_names.to_vec(),
            intercept: beta[0],
            coefficients: beta.slice(ndarray::s![1..]).to_owned(),
            residual_standard_error,
            r_squared,
            fitted_values,
            residuals,
        })
    }

    pub fn predictor_names(&self) -> &[String] {
        &self.predictor_names
    }

    pub fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Slope coefficients, one per predictor column, intercept excluded.
    pub fn coefficients(&self) -> &Array1<f64> {
        &self.coefficients
    }

    /// Typical magnitude of a prediction error:
    /// `sqrt(RSS / (n - k - 1))` for `k` predictors. NaN for a saturated fit.
    pub fn residual_standard_error(&self) -> f64 {
        self.residual_standard_error
    }

    pub fn r_squared(&self) -> f64 {
        self.r_squared
    }

    /// In-sample predictions for the training rows.
    pub fn fitted_values(&self) -> &Array1<f64> {
        &self.fitted_values
    }

    pub fn residuals(&self) -> &Array1<f64> {
        &self.residuals
    }

    /// Scores one predictor row: dot product with the coefficients plus the
    /// intercept.
    ///
    /// # Errors
    /// `ModelError::InvalidInput` if the row length does not match the number
    /// of predictors.
    pub fn predict_row(&self, row: ArrayView1<'_, f64>) -> Result<f64, ModelError> {
        if row.len() != self.coefficients.len() {
            return Err(ModelError::InvalidInput(format!(
                "prediction row has {} values but the model has {} predictors",
                row.len(),
                self.coefficients.len()
            )));
        }
        Ok(self.intercept + self.coefficients.dot(&row))
    }
}
