//! The fitted pipeline: PCA transform plus a linear model on leading
//! components, scoring raw observations end to end.

use ndarray::{s, Array1, Axis};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

use crate::dataset::{FeatureMatrix, Observation};
use crate::error::ModelError;
use crate::pca::Pca;
use crate::regression::LinearModel;

/// An advisory report that one raw feature value fell outside the range
/// observed during training. Advisory only: the prediction is still made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutOfRange {
    pub feature: String,
    pub value: f64,
    pub training_min: f64,
    pub training_max: f64,
}

/// A scalar prediction together with any out-of-range advisories raised
/// while producing it.
#[derive(Debug, Clone)]
pub struct Prediction {
    pub value: f64,
    pub out_of_range: Vec<OutOfRange>,
}

/// A fitted principal component regression: target regressed on the leading
/// principal components of the remaining features.
///
/// Immutable once fitted. New observations travel through the stored
/// center/scale/rotation, are truncated to the trained component subset, and
/// are scored by the stored coefficients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PcRegression {
    pca: Pca,
    model: LinearModel,
    n_components: usize,
    target_name: String,
    /// Observed per-feature minima/maxima of the training data, in the
    /// PCA's feature order; used only for out-of-range advisories.
    training_min: Array1<f64>,
    training_max: Array1<f64>,
}

impl PcRegression {
    /// Fits the full pipeline: split off `target`, PCA-fit the remaining
    /// columns, regress the target on the first `n_components` score columns.
    ///
    /// # Errors
    /// - `ModelError::InvalidInput` if the target column is unknown, or
    ///   `n_components` is zero or exceeds the feature count.
    /// - Any error from the PCA fit (`DegenerateInput`, ...) or the
    ///   regression fit (`RankDeficient`, ...).
    ///
    /// # Examples
    ///
    /// ```
    /// use pcreg::{FeatureMatrix, Observation, PcRegression};
    ///
    /// # fn main() -> Result<(), pcreg::ModelError> {
    /// let data = FeatureMatrix::from_columns(vec![
    ///     ("x", vec![1.0, 2.0, 3.0, 4.0, 5.0]),
    ///     ("z", vec![2.2, 3.8, 6.1, 8.0, 9.9]),
    ///     ("y", vec![5.1, 7.2, 8.9, 11.1, 13.0]),
    /// ])?;
    /// let model = PcRegression::fit(&data, "y", 1)?;
    /// let p = model.predict(&Observation::new().with("x", 3.0).with("z", 6.0))?;
    /// assert!(p.out_of_range.is_empty());
    /// # Ok(())
    /// # }
    /// ```
    pub fn fit(
        data: &FeatureMatrix,
        target: &str,
        n_components: usize,
    ) -> Result<Self, ModelError> {
        let (features, target_values) = data.split_target(target)?;
        if n_components == 0 || n_components > features.ncols() {
            return Err(ModelError::InvalidInput(format!(
                "n_components must be between 1 and {} (the feature count), got {}",
                features.ncols(),
                n_components
            )));
        }

        let (pca, scores) = Pca::fit(&features)?;
        let leading = scores.slice(s![.., ..n_components]).to_owned();
        let component_names: Vec<String> =
            (1..=n_components).map(|i| format!("PC{}", i)).collect();
        let model = LinearModel::fit(&leading, &component_names, &target_values)?;

        let training_min = features
            .values()
            .map_axis(Axis(0), |col| col.fold(f64::INFINITY, |a, &b| a.min(b)));
        let training_max = features
            .values()
            .map_axis(Axis(0), |col| col.fold(f64::NEG_INFINITY, |a, &b| a.max(b)));

        log::debug!(
            "fitted principal component regression of '{}' on {} of {} components",
            target,
            n_components,
            features.ncols()
        );

        Ok(Self {
            pca,
            model,
            n_components,
            target_name: target.to_string(),
            training_min,
            training_max,
        })
    }

    /// Scores a raw observation.
    ///
    /// Features are matched by name (order-independent), centered, scaled,
    /// and rotated through the stored PCA transform; the leading component
    /// coordinates are then combined with the regression coefficients.
    ///
    /// A raw value outside the observed training range of its feature adds
    /// an [`OutOfRange`] advisory (also logged at `warn` level) but never
    /// blocks the prediction.
    ///
    /// # Errors
    /// `ModelError::FeatureMismatch` if the observation's feature names do
    /// not exactly match the trained feature set.
    pub fn predict(&self, observation: &Observation) -> Result<Prediction, ModelError> {
        let raw = self.pca.align_observation(observation)?;

        let mut out_of_range = Vec::new();
        for (idx, name) in self.pca.feature_names().iter().enumerate() {
            let value = raw[idx];
            if value < self.training_min[idx] || value > self.training_max[idx] {
                log::warn!(
                    "feature '{}' value {} is outside the training range [{}, {}]",
                    name,
                    value,
                    self.training_min[idx],
                    self.training_max[idx]
                );
                out_of_range.push(OutOfRange {
                    feature: name.clone(),
                    value,
                    training_min: self.training_min[idx],
                    training_max: self.training_max[idx],
                });
            }
        }

        let coordinates = self.pca.project_row(&raw);
        let value = self
            .model
            .predict_row(coordinates.slice(s![..self.n_components]))?;

        Ok(Prediction {
            value,
            out_of_range,
        })
    }

    /// [`PcRegression::predict`], discarding the advisories.
    pub fn predict_value(&self, observation: &Observation) -> Result<f64, ModelError> {
        Ok(self.predict(observation)?.value)
    }

    /// The fitted PCA transform.
    pub fn pca(&self) -> &Pca {
        &self.pca
    }

    /// The fitted linear model over the leading components.
    pub fn model(&self) -> &LinearModel {
        &self.model
    }

    /// How many leading components the regression uses.
    pub fn n_components(&self) -> usize {
        self.n_components
    }

    /// Name of the regressed target column.
    pub fn target_name(&self) -> &str {
        &self.target_name
    }

    /// Per-component `(standard deviation, proportion of variance,
    /// cumulative proportion)` rows, across all components.
    pub fn variance_summary(&self) -> Vec<(f64, f64, f64)> {
        let sdev = self.pca.standard_deviations();
        let proportion = self.pca.proportion_of_variance();
        let cumulative = self.pca.cumulative_proportion();
        (0..sdev.len())
            .map(|i| (sdev[i], proportion[i], cumulative[i]))
            .collect()
    }

    /// Saves the fitted pipeline to a file with bincode.
    pub fn save_model<P: AsRef<Path>>(&self, path: P) -> Result<(), ModelError> {
        let file = File::create(path.as_ref())?;
        let mut writer = BufWriter::new(file);
        bincode::serde::encode_into_std_write(self, &mut writer, bincode::config::standard())?;
        Ok(())
    }

    /// Loads a pipeline previously written by [`PcRegression::save_model`],
    /// validating internal consistency before returning it.
    pub fn load_model<P: AsRef<Path>>(path: P) -> Result<Self, ModelError> {
        let file = File::open(path.as_ref())?;
        let mut reader = BufReader::new(file);
        let model: PcRegression =
            bincode::serde::decode_from_std_read(&mut reader, bincode::config::standard())?;
        model.pca.validate()?;
        let n_features = model.pca.feature_names().len();
        if model.n_components == 0
            || model.n_components > n_features
            || model.model.coefficients().len() != model.n_components
            || model.training_min.len() != n_features
            || model.training_max.len() != n_features
        {
            return Err(ModelError::InvalidInput(
                "loaded model has inconsistent component or range dimensions".to_string(),
            ));
        }
        Ok(model)
    }
}
