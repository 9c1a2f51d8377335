use thiserror::Error;

/// Errors produced while fitting or scoring principal component regression
/// models.
///
/// Advisory conditions (a prediction input outside the observed training
/// range) are not errors; they are reported alongside the prediction value.
#[derive(Error, Debug)]
pub enum ModelError {
    /// A feature column has (numerically) zero variance, so unit-variance
    /// scaling is undefined. The offending column is named.
    #[error("column '{column}' has zero variance (standard deviation {std_dev:e}); centering and scaling are undefined")]
    DegenerateInput { column: String, std_dev: f64 },

    /// The predictor columns are linearly dependent, so the least-squares
    /// problem has no unique solution.
    #[error("predictor matrix is rank deficient (rank {rank} of {columns} columns); least squares has no unique solution")]
    RankDeficient { rank: usize, columns: usize },

    /// The feature names of a prediction input do not match the feature set
    /// the model was trained on. Matching is by name, order-independent.
    #[error("observation features do not match the trained feature set (missing: {missing:?}, unexpected: {unexpected:?})")]
    FeatureMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },

    /// Malformed input to a constructor or fit: non-finite values, duplicate
    /// or unknown column names, inconsistent dimensions, too few rows.
    #[error("{0}")]
    InvalidInput(String),

    /// A decomposition in the linear algebra backend failed.
    #[error("linear algebra backend error: {0}")]
    Linalg(#[from] ndarray_linalg::error::LinalgError),

    /// Reading or writing a persisted model failed.
    #[error("model file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Serializing a model for persistence failed.
    #[error("model encoding failed: {0}")]
    Encode(#[from] bincode::error::EncodeError),

    /// Deserializing a persisted model failed.
    #[error("model decoding failed: {0}")]
    Decode(#[from] bincode::error::DecodeError),
}
