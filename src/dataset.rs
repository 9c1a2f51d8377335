//! In-memory tabular input types: named numeric columns over ordered rows.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::ModelError;

/// An ordered collection of named numeric columns over ordered rows.
///
/// Every cell is a finite `f64`; constructors reject NaN and infinities so
/// downstream fits never have to re-validate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureMatrix {
    names: Vec<String>,
    values: Array2<f64>,
}

impl FeatureMatrix {
    /// Builds a feature matrix from column names and a values matrix of shape
    /// (n_rows, n_columns).
    ///
    /// # Errors
    /// Returns `ModelError::InvalidInput` if the name count does not match the
    /// column count, a name is duplicated or empty, or any cell is non-finite.
    pub fn new(names: Vec<String>, values: Array2<f64>) -> Result<Self, ModelError> {
        if names.len() != values.ncols() {
            return Err(ModelError::InvalidInput(format!(
                "{} column names were given for a matrix with {} columns",
                names.len(),
                values.ncols()
            )));
        }
        let mut seen = HashSet::new();
        for name in &names {
            if name.is_empty() {
                return Err(ModelError::InvalidInput(
                    "column names must be non-empty".to_string(),
                ));
            }
            if !seen.insert(name.as_str()) {
                return Err(ModelError::InvalidInput(format!(
                    "duplicate column name '{}'",
                    name
                )));
            }
        }
        for (row_idx, row) in values.rows().into_iter().enumerate() {
            for (col_idx, &cell) in row.iter().enumerate() {
                if !cell.is_finite() {
                    return Err(ModelError::InvalidInput(format!(
                        "non-finite value {} at row {}, column '{}'",
                        cell, row_idx, names[col_idx]
                    )));
                }
            }
        }
        Ok(Self { names, values })
    }

    /// Builds a feature matrix column by column; all columns must share the
    /// same length.
    pub fn from_columns<S: Into<String>>(
        columns: Vec<(S, Vec<f64>)>,
    ) -> Result<Self, ModelError> {
        if columns.is_empty() {
            return Err(ModelError::InvalidInput(
                "at least one column is required".to_string(),
            ));
        }
        let n_rows = columns[0].1.len();
        let mut names = Vec::with_capacity(columns.len());
        let mut values = Array2::zeros((n_rows, columns.len()));
        for (col_idx, (name, column)) in columns.into_iter().enumerate() {
            let name = name.into();
            if column.len() != n_rows {
                return Err(ModelError::InvalidInput(format!(
                    "column '{}' has {} rows, expected {}",
                    name,
                    column.len(),
                    n_rows
                )));
            }
            values
                .column_mut(col_idx)
                .assign(&Array1::from_vec(column));
            names.push(name);
        }
        Self::new(names, values)
    }

    /// Column names in order.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// The underlying values, shape (n_rows, n_columns).
    pub fn values(&self) -> ArrayView2<'_, f64> {
        self.values.view()
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    pub fn ncols(&self) -> usize {
        self.values.ncols()
    }

    /// A single column by name, if present.
    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| self.values.column(idx))
    }

    /// A single row as an owned vector, in column order.
    pub fn row(&self, index: usize) -> Array1<f64> {
        self.values.row(index).to_owned()
    }

    /// A copy restricted to the requested columns, in the requested order.
    ///
    /// # Errors
    /// Returns `ModelError::InvalidInput` naming the first unknown column.
    pub fn select(&self, names: &[&str]) -> Result<Self, ModelError> {
        let mut requested = HashSet::new();
        let mut indices = Vec::with_capacity(names.len());
        for &name in names {
            if !requested.insert(name) {
                return Err(ModelError::InvalidInput(format!(
                    "column '{}' requested twice",
                    name
                )));
            }
            let idx = self
                .names
                .iter()
                .position(|n| n == name)
                .ok_or_else(|| {
                    ModelError::InvalidInput(format!("unknown column '{}'", name))
                })?;
            indices.push(idx);
        }
        Ok(Self {
            names: names.iter().map(|n| n.to_string()).collect(),
            values: self.values.select(Axis(1), &indices),
        })
    }

    /// Splits off one column as a target vector, returning the remaining
    /// columns as a new matrix.
    pub fn split_target(&self, target: &str) -> Result<(Self, Array1<f64>), ModelError> {
        let target_idx = self
            .names
            .iter()
            .position(|n| n == target)
            .ok_or_else(|| {
                ModelError::InvalidInput(format!("unknown target column '{}'", target))
            })?;
        if self.ncols() < 2 {
            return Err(ModelError::InvalidInput(
                "splitting off the target would leave no feature columns".to_string(),
            ));
        }
        let keep: Vec<usize> = (0..self.ncols()).filter(|&i| i != target_idx).collect();
        let features = Self {
            names: keep.iter().map(|&i| self.names[i].clone()).collect(),
            values: self.values.select(Axis(1), &keep),
        };
        Ok((features, self.values.column(target_idx).to_owned()))
    }
}

/// A single raw observation: ordered `(name, value)` pairs, looked up by name
/// at prediction time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Observation {
    entries: Vec<(String, f64)>,
}

impl Observation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a named value, builder style. A repeated name overwrites the
    /// earlier value.
    pub fn with<S: Into<String>>(mut self, name: S, value: f64) -> Self {
        let name = name.into();
        if let Some(entry) = self.entries.iter_mut().find(|(n, _)| *n == name) {
            entry.1 = value;
        } else {
            self.entries.push((name, value));
        }
        self
    }

    pub fn from_pairs<S: Into<String>, I: IntoIterator<Item = (S, f64)>>(pairs: I) -> Self {
        pairs
            .into_iter()
            .fold(Self::new(), |obs, (name, value)| obs.with(name, value))
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| *v)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(n, _)| n.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn rejects_mismatched_name_count() {
        let err = FeatureMatrix::new(
            vec!["a".to_string()],
            array![[1.0, 2.0], [3.0, 4.0]],
        )
        .unwrap_err();
        assert!(matches!(err, ModelError::InvalidInput(_)));
    }

    #[test]
    fn rejects_duplicate_names() {
        let err = FeatureMatrix::new(
            vec!["a".to_string(), "a".to_string()],
            array![[1.0, 2.0], [3.0, 4.0]],
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("duplicate"), "{}", message);
    }

    #[test]
    fn rejects_non_finite_cells() {
        let err = FeatureMatrix::new(
            vec!["a".to_string(), "b".to_string()],
            array![[1.0, f64::NAN], [3.0, 4.0]],
        )
        .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("column 'b'"), "{}", message);
    }

    #[test]
    fn from_columns_builds_in_order() {
        let matrix = FeatureMatrix::from_columns(vec![
            ("x", vec![1.0, 2.0]),
            ("y", vec![3.0, 4.0]),
        ])
        .unwrap();
        assert_eq!(matrix.names(), &["x".to_string(), "y".to_string()]);
        assert_eq!(matrix.values()[[1, 0]], 2.0);
        assert_eq!(matrix.values()[[0, 1]], 3.0);
    }

    #[test]
    fn split_target_removes_the_column() {
        let matrix = FeatureMatrix::from_columns(vec![
            ("x", vec![1.0, 2.0]),
            ("y", vec![3.0, 4.0]),
            ("z", vec![5.0, 6.0]),
        ])
        .unwrap();
        let (features, target) = matrix.split_target("y").unwrap();
        assert_eq!(features.names(), &["x".to_string(), "z".to_string()]);
        assert_eq!(target, array![3.0, 4.0]);
        assert!(matrix.split_target("missing").is_err());
    }

    #[test]
    fn select_reorders_columns() {
        let matrix = FeatureMatrix::from_columns(vec![
            ("x", vec![1.0, 2.0]),
            ("y", vec![3.0, 4.0]),
        ])
        .unwrap();
        let swapped = matrix.select(&["y", "x"]).unwrap();
        assert_eq!(swapped.names(), &["y".to_string(), "x".to_string()]);
        assert_eq!(swapped.values()[[0, 0]], 3.0);
        assert!(matrix.select(&["x", "x"]).is_err());
    }

    #[test]
    fn column_lookup_is_by_name() {
        let matrix = FeatureMatrix::from_columns(vec![
            ("x", vec![1.0, 2.0]),
            ("y", vec![3.0, 4.0]),
        ])
        .unwrap();
        assert_eq!(matrix.column("y").unwrap()[1], 4.0);
        assert!(matrix.column("z").is_none());
    }

    #[test]
    fn observation_lookup_is_by_name() {
        let obs = Observation::new().with("wt", 5.424).with("hp", 215.0);
        assert_eq!(obs.get("hp"), Some(215.0));
        assert_eq!(obs.get("wt"), Some(5.424));
        assert_eq!(obs.get("disp"), None);
        assert_eq!(obs.len(), 2);
    }

    #[test]
    fn observation_with_overwrites_repeated_name() {
        let obs = Observation::new().with("hp", 1.0).with("hp", 2.0);
        assert_eq!(obs.len(), 1);
        assert_eq!(obs.get("hp"), Some(2.0));
    }
}
