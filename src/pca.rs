//! Principal component analysis over named feature columns.

use ndarray::{Array1, Array2, Axis};
use ndarray_linalg::{Eigh, UPLO};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::dataset::{FeatureMatrix, Observation};
use crate::error::ModelError;

/// A standard deviation below this is treated as zero variance.
const DEGENERATE_STD_DEV: f64 = 1e-9;

/// A fitted principal component analysis transform.
///
/// Holds the per-feature mean (`center`), per-feature sample standard
/// deviation (`scale`), and a square orthonormal rotation matrix mapping
/// centered/scaled feature space to component space, together with the
/// explained variance of each component. The rotation always has as many
/// components as input features, ordered by descending captured variance;
/// with fewer observations than features the trailing components simply
/// carry zero variance.
///
/// A `Pca` is an immutable value object: it is produced fully-populated by
/// [`Pca::fit`] (or loaded via [`Pca::load_model`]) and never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pca {
    feature_names: Vec<String>,
    /// Mean of each training feature. Shape: (n_features)
    center: Array1<f64>,
    /// Sample standard deviation (ddof = 1) of each training feature.
    /// Strictly positive; a degenerate column fails the fit instead.
    /// Shape: (n_features)
    scale: Array1<f64>,
    /// Orthonormal rotation, one component per column.
    /// Shape: (n_features, n_features)
    rotation: Array2<f64>,
    /// Eigenvalues of the sample correlation matrix, descending.
    /// Shape: (n_features)
    explained_variance: Array1<f64>,
}

impl Pca {
    /// Fits the transform to a feature matrix and returns it together with
    /// the projected coordinates (scores) of every training row.
    ///
    /// Each column is centered by its mean and scaled by its sample standard
    /// deviation, then the principal axes are obtained by eigen-decomposition
    /// of the sample correlation matrix. Eigenpairs are sorted by descending
    /// eigenvalue; tiny negative eigenvalues from the decomposition of a
    /// rank-deficient matrix are clamped to zero.
    ///
    /// # Errors
    /// - `ModelError::InvalidInput` if the matrix has fewer than 2 rows.
    /// - `ModelError::DegenerateInput` naming the first column whose standard
    ///   deviation is below `1e-9`; scaling such a column would divide by
    ///   zero, so the fit refuses it outright instead of producing NaN.
    ///
    /// # Examples
    ///
    /// ```
    /// use pcreg::{FeatureMatrix, Pca};
    ///
    /// # fn main() -> Result<(), pcreg::ModelError> {
    /// let data = FeatureMatrix::from_columns(vec![
    ///     ("x", vec![2.0, 4.0, 6.0, 8.0]),
    ///     ("y", vec![1.0, 2.5, 2.9, 4.6]),
    /// ])?;
    /// let (pca, scores) = Pca::fit(&data)?;
    /// assert_eq!(scores.dim(), (4, 2));
    /// assert_eq!(pca.rotation().dim(), (2, 2));
    /// # Ok(())
    /// # }
    /// ```
    pub fn fit(data: &FeatureMatrix) -> Result<(Self, Array2<f64>), ModelError> {
        let n_samples = data.nrows();
        let n_features = data.ncols();

        if n_features == 0 {
            return Err(ModelError::InvalidInput(
                "input matrix has zero feature columns".to_string(),
            ));
        }
        if n_samples < 2 {
            return Err(ModelError::InvalidInput(format!(
                "PCA requires at least 2 observations, got {}",
                n_samples
            )));
        }

        let mut matrix = data.values().to_owned();
        let center = matrix
            .mean_axis(Axis(0))
            .ok_or_else(|| ModelError::InvalidInput("failed to compute column means".to_string()))?;
        matrix -= &center;

        let scale = matrix.map_axis(Axis(0), |column| column.std(1.0));
        for (name, &sd) in data.names().iter().zip(scale.iter()) {
            if sd.abs() < DEGENERATE_STD_DEV {
                return Err(ModelError::DegenerateInput {
                    column: name.clone(),
                    std_dev: sd,
                });
            }
        }
        matrix /= &scale;

        let mut correlation = matrix.t().dot(&matrix);
        correlation /= (n_samples - 1) as f64;

        let (eigenvalues, eigenvectors) = correlation.eigh(UPLO::Upper)?;

        let mut eig_pairs: Vec<(f64, Array1<f64>)> = eigenvalues
            .into_iter()
            .zip(eigenvectors.columns().into_iter().map(|col| col.to_owned()))
            .collect();
        eig_pairs.sort_by(|(a, _), (b, _)| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

        let mut rotation = Array2::<f64>::zeros((n_features, n_features));
        let mut explained_variance = Array1::<f64>::zeros(n_features);
        for (idx, (eigenvalue, mut axis)) in eig_pairs.into_iter().enumerate() {
            explained_variance[idx] = eigenvalue.max(0.0);
            let norm = axis.dot(&axis).sqrt();
            if norm > DEGENERATE_STD_DEV {
                axis.mapv_inplace(|v| v / norm);
            } else {
                axis.fill(0.0);
            }
            rotation.column_mut(idx).assign(&axis);
        }

        log::debug!(
            "fitted PCA on {} rows x {} features; leading eigenvalue {:.6}",
            n_samples,
            n_features,
            explained_variance[0]
        );

        let scores = matrix.dot(&rotation);
        let pca = Self {
            feature_names: data.names().to_vec(),
            center,
            scale,
            rotation,
            explained_variance,
        };
        Ok((pca, scores))
    }

    /// Names of the features the transform was fitted on, in training order.
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    /// Per-feature mean of the training data. Shape: (n_features)
    pub fn center(&self) -> &Array1<f64> {
        &self.center
    }

    /// Per-feature sample standard deviation of the training data, strictly
    /// positive. Shape: (n_features)
    pub fn scale(&self) -> &Array1<f64> {
        &self.scale
    }

    /// The orthonormal rotation matrix. Shape: (n_features, n_features)
    pub fn rotation(&self) -> &Array2<f64> {
        &self.rotation
    }

    /// Explained variance per component (correlation-matrix eigenvalues),
    /// descending. Shape: (n_features)
    pub fn explained_variance(&self) -> &Array1<f64> {
        &self.explained_variance
    }

    /// Standard deviation of each component (square root of its explained
    /// variance).
    pub fn standard_deviations(&self) -> Array1<f64> {
        self.explained_variance.mapv(f64::sqrt)
    }

    /// Fraction of total variance captured by each component. Sums to 1.
    pub fn proportion_of_variance(&self) -> Array1<f64> {
        let total: f64 = self.explained_variance.sum();
        self.explained_variance.mapv(|v| v / total)
    }

    /// Running total of [`Pca::proportion_of_variance`]; the last entry is 1.
    pub fn cumulative_proportion(&self) -> Array1<f64> {
        let mut running = 0.0;
        self.proportion_of_variance().mapv(|p| {
            running += p;
            running
        })
    }

    /// Projects rows of a feature matrix into component space.
    ///
    /// Columns are matched to the training features by name, independent of
    /// order, then centered, scaled, and rotated.
    ///
    /// # Errors
    /// `ModelError::FeatureMismatch` if the column names do not exactly match
    /// the trained feature set.
    pub fn transform(&self, data: &FeatureMatrix) -> Result<Array2<f64>, ModelError> {
        let mut aligned = self.align_matrix(data)?;
        for mut row in aligned.axis_iter_mut(Axis(0)) {
            ndarray::Zip::from(row.view_mut())
                .and(self.center.view())
                .and(self.scale.view())
                .for_each(|value, &center, &scale| {
                    *value = (*value - center) / scale;
                });
        }
        Ok(aligned.dot(&self.rotation))
    }

    /// Projects a single raw observation into component space, matching
    /// features by name.
    pub fn transform_observation(&self, observation: &Observation) -> Result<Array1<f64>, ModelError> {
        let raw = self.align_observation(observation)?;
        Ok(self.project_row(&raw))
    }

    /// Maps component coordinates back to raw feature space: apply the
    /// transposed rotation (its inverse, by orthonormality), then undo the
    /// scaling and centering. Round-trips [`Pca::transform`] up to floating
    /// point error.
    ///
    /// # Errors
    /// `ModelError::InvalidInput` unless the coordinates cover all components.
    pub fn inverse_transform(&self, scores: &Array2<f64>) -> Result<Array2<f64>, ModelError> {
        let n_features = self.feature_names.len();
        if scores.ncols() != n_features {
            return Err(ModelError::InvalidInput(format!(
                "inverse transform needs full component coordinates ({} columns), got {}",
                n_features,
                scores.ncols()
            )));
        }
        let mut raw = scores.dot(&self.rotation.t());
        raw *= &self.scale;
        raw += &self.center;
        Ok(raw)
    }

    /// Collects an observation's values into training column order.
    pub(crate) fn align_observation(&self, observation: &Observation) -> Result<Array1<f64>, ModelError> {
        let mut raw = Array1::zeros(self.feature_names.len());
        let mut missing = Vec::new();
        for (idx, name) in self.feature_names.iter().enumerate() {
            match observation.get(name) {
                Some(value) => raw[idx] = value,
                None => missing.push(name.clone()),
            }
        }
        let unexpected: Vec<String> = observation
            .names()
            .filter(|name| !self.feature_names.iter().any(|trained| trained == name))
            .map(str::to_string)
            .collect();
        if !missing.is_empty() || !unexpected.is_empty() {
            return Err(ModelError::FeatureMismatch { missing, unexpected });
        }
        for (idx, name) in self.feature_names.iter().enumerate() {
            if !raw[idx].is_finite() {
                return Err(ModelError::InvalidInput(format!(
                    "non-finite value {} for feature '{}'",
                    raw[idx], name
                )));
            }
        }
        Ok(raw)
    }

    /// Centers, scales, and rotates one raw row already in training order.
    pub(crate) fn project_row(&self, raw: &Array1<f64>) -> Array1<f64> {
        let standardized = (raw - &self.center) / &self.scale;
        self.rotation.t().dot(&standardized)
    }

    fn align_matrix(&self, data: &FeatureMatrix) -> Result<Array2<f64>, ModelError> {
        let mut indices = Vec::with_capacity(self.feature_names.len());
        let mut missing = Vec::new();
        for name in &self.feature_names {
            match data.names().iter().position(|n| n == name) {
                Some(idx) => indices.push(idx),
                None => missing.push(name.clone()),
            }
        }
        let unexpected: Vec<String> = data
            .names()
            .iter()
            .filter(|name| !self.feature_names.contains(name))
            .cloned()
            .collect();
        if !missing.is_empty() || !unexpected.is_empty() {
            return Err(ModelError::FeatureMismatch { missing, unexpected });
        }
        Ok(data.values().select(Axis(1), &indices))
    }

    /// Saves the transform to a file with bincode.
    pub fn save_model<P: AsRef<Path>>(&self, path: P) -> Result<(), ModelError> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())?;
        Ok(())
    }

    /// Loads a transform previously written by [`Pca::save_model`],
    /// validating internal consistency before returning it.
    pub fn load_model<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let file = File::open(path.as_ref())?;
        let mut reader = BufReader::new(file);
        let pca: Pca =
            bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())?;
        pca.validate()?;
        Ok(pca)
    }

    pub(crate) fn validate(&self) -> Result<(), ModelError> {
        let n_features = self.feature_names.len();
        if self.center.len() != n_features
            || self.scale.len() != n_features
            || self.rotation.dim() != (n_features, n_features)
            || self.explained_variance.len() != n_features
        {
            return Err(ModelError::InvalidInput(format!(
                "inconsistent model dimensions: {} names, {} center, {} scale, {:?} rotation, {} variances",
                n_features,
                self.center.len(),
                self.scale.len(),
                self.rotation.dim(),
                self.explained_variance.len()
            )));
        }
        if self.scale.iter().any(|&v| !v.is_finite() || v <= 0.0) {
            return Err(ModelError::InvalidInput(
                "model scale vector must contain strictly positive finite values".to_string(),
            ));
        }
        if self
            .explained_variance
            .iter()
            .any(|&v| !v.is_finite() || v < 0.0)
        {
            return Err(ModelError::InvalidInput(
                "model explained variance must be non-negative and finite".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::Array2;
    use rand::{Rng, SeedableRng};
    use rand_chacha::ChaCha8Rng;

    const EPS: f64 = 1e-9;

    fn random_matrix(n_rows: usize, n_cols: usize, seed: u64) -> FeatureMatrix {
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        let values = Array2::from_shape_fn((n_rows, n_cols), |_| rng.gen_range(-3.0..3.0));
        let names = (0..n_cols).map(|i| format!("f{}", i)).collect();
        FeatureMatrix::new(names, values).unwrap()
    }

    fn two_feature_data() -> FeatureMatrix {
        FeatureMatrix::from_columns(vec![
            ("x", vec![2.0, 4.0, 6.0, 8.0]),
            ("y", vec![1.0, 2.5, 2.9, 4.6]),
        ])
        .unwrap()
    }

    #[test]
    fn rotation_is_orthonormal() {
        let data = random_matrix(40, 7, 42);
        let (pca, _) = Pca::fit(&data).unwrap();
        let rotation = pca.rotation();
        for a in 0..7 {
            for b in 0..7 {
                let dot = rotation.column(a).dot(&rotation.column(b));
                let expected = if a == b { 1.0 } else { 0.0 };
                assert_abs_diff_eq!(dot, expected, epsilon = EPS);
            }
        }
    }

    #[test]
    fn variance_is_conserved_under_rotation() {
        let data = random_matrix(30, 6, 7);
        let (pca, scores) = Pca::fit(&data).unwrap();

        // Each standardized column has unit sample variance, so the total
        // variance equals the number of features.
        let total: f64 = pca.explained_variance().sum();
        assert_abs_diff_eq!(total, 6.0, epsilon = EPS);

        // Score column variances reproduce the eigenvalues.
        let n = data.nrows();
        for j in 0..6 {
            let column = scores.column(j);
            let mean = column.sum() / n as f64;
            let var = column.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            assert_abs_diff_eq!(var, pca.explained_variance()[j], epsilon = 1e-8);
        }
    }

    #[test]
    fn proportions_sum_to_one() {
        let data = random_matrix(25, 5, 11);
        let (pca, _) = Pca::fit(&data).unwrap();
        assert_abs_diff_eq!(pca.proportion_of_variance().sum(), 1.0, epsilon = EPS);
        let cumulative = pca.cumulative_proportion();
        assert_abs_diff_eq!(cumulative[4], 1.0, epsilon = EPS);
        for j in 1..5 {
            assert!(cumulative[j] >= cumulative[j - 1]);
        }
    }

    #[test]
    fn eigenvalues_are_sorted_descending() {
        let data = random_matrix(50, 8, 3);
        let (pca, _) = Pca::fit(&data).unwrap();
        let ev = pca.explained_variance();
        for j in 1..8 {
            assert!(ev[j] <= ev[j - 1] + EPS);
        }
    }

    #[test]
    fn round_trip_recovers_raw_values() {
        let data = random_matrix(20, 4, 99);
        let (pca, scores) = Pca::fit(&data).unwrap();
        let recovered = pca.inverse_transform(&scores).unwrap();
        for (&original, &restored) in data.values().iter().zip(recovered.iter()) {
            assert_abs_diff_eq!(original, restored, epsilon = EPS);
        }
    }

    #[test]
    fn transform_reproduces_training_scores() {
        let data = random_matrix(15, 3, 5);
        let (pca, scores) = Pca::fit(&data).unwrap();
        let again = pca.transform(&data).unwrap();
        for (&a, &b) in scores.iter().zip(again.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = EPS);
        }
    }

    #[test]
    fn two_feature_eigenvalues_match_correlation_structure() {
        // For two standardized features with correlation r, the eigenvalues
        // of the correlation matrix are 1 + r and 1 - r.
        let (pca, scores) = Pca::fit(&two_feature_data()).unwrap();
        assert_abs_diff_eq!(pca.explained_variance()[0], 1.977057988835066, epsilon = EPS);
        assert_abs_diff_eq!(pca.explained_variance()[1], 0.022942011164934, epsilon = EPS);
        assert_abs_diff_eq!(pca.standard_deviations()[0], 1.406078941181848, epsilon = EPS);
        assert_abs_diff_eq!(pca.proportion_of_variance()[0], 0.988528994417533, epsilon = EPS);
        // Axis signs are arbitrary; magnitudes are not.
        assert_abs_diff_eq!(scores[[0, 0]].abs(), 1.657766, epsilon = 1e-5);
    }

    #[test]
    fn zero_variance_column_is_rejected_by_name() {
        let data = FeatureMatrix::from_columns(vec![
            ("varied", vec![1.0, 2.0, 3.0, 4.0]),
            ("constant", vec![5.0, 5.0, 5.0, 5.0]),
        ])
        .unwrap();
        let err = Pca::fit(&data).unwrap_err();
        match err {
            ModelError::DegenerateInput { column, .. } => assert_eq!(column, "constant"),
            other => panic!("expected DegenerateInput, got {:?}", other),
        }
    }

    #[test]
    fn fewer_rows_than_features_is_legal() {
        let data = random_matrix(3, 5, 21);
        let (pca, _) = Pca::fit(&data).unwrap();
        // Rank is at most n_samples - 1, so the trailing axes carry no
        // variance, but the rotation stays square and orthonormal.
        assert_eq!(pca.rotation().dim(), (5, 5));
        for j in 2..5 {
            assert!(pca.explained_variance()[j].abs() < 1e-8);
        }
        for a in 0..5 {
            let norm = pca.rotation().column(a).dot(&pca.rotation().column(a));
            assert_abs_diff_eq!(norm, 1.0, epsilon = 1e-8);
        }
        assert_abs_diff_eq!(pca.explained_variance().sum(), 5.0, epsilon = 1e-8);
    }

    #[test]
    fn single_row_is_rejected() {
        let data = FeatureMatrix::from_columns(vec![("x", vec![1.0]), ("y", vec![2.0])]).unwrap();
        assert!(matches!(
            Pca::fit(&data).unwrap_err(),
            ModelError::InvalidInput(_)
        ));
    }

    #[test]
    fn transform_matches_features_by_name_not_order() {
        let data = two_feature_data();
        let (pca, scores) = Pca::fit(&data).unwrap();
        let reordered = data.select(&["y", "x"]).unwrap();
        let projected = pca.transform(&reordered).unwrap();
        for (&a, &b) in scores.iter().zip(projected.iter()) {
            assert_abs_diff_eq!(a, b, epsilon = EPS);
        }
    }

    #[test]
    fn transform_rejects_mismatched_columns() {
        let (pca, _) = Pca::fit(&two_feature_data()).unwrap();
        let other = FeatureMatrix::from_columns(vec![
            ("x", vec![1.0, 2.0]),
            ("z", vec![3.0, 4.0]),
        ])
        .unwrap();
        match pca.transform(&other).unwrap_err() {
            ModelError::FeatureMismatch { missing, unexpected } => {
                assert_eq!(missing, vec!["y".to_string()]);
                assert_eq!(unexpected, vec!["z".to_string()]);
            }
            other => panic!("expected FeatureMismatch, got {:?}", other),
        }
    }

    #[test]
    fn observation_projection_matches_matrix_transform() {
        let data = random_matrix(12, 4, 8);
        let (pca, scores) = Pca::fit(&data).unwrap();
        let row = data.row(3);
        let observation = Observation::from_pairs(
            data.names()
                .iter()
                .map(|n| n.clone())
                .zip(row.iter().copied()),
        );
        let coords = pca.transform_observation(&observation).unwrap();
        for j in 0..4 {
            assert_abs_diff_eq!(coords[j], scores[[3, j]], epsilon = EPS);
        }
    }

    #[test]
    fn save_and_load_round_trip() {
        let data = random_matrix(10, 3, 17);
        let (pca, _) = Pca::fit(&data).unwrap();
        let file = tempfile::NamedTempFile::new().unwrap();
        pca.save_model(file.path()).unwrap();
        let loaded = Pca::load_model(file.path()).unwrap();
        assert_eq!(loaded.feature_names(), pca.feature_names());
        for (&a, &b) in loaded.rotation().iter().zip(pca.rotation().iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 0.0);
        }
        for (&a, &b) in loaded.center().iter().zip(pca.center().iter()) {
            assert_abs_diff_eq!(a, b, epsilon = 0.0);
        }
    }
}
