// Principal component regression (PCR)

#![doc = include_str!("../README.md")]

mod dataset;
mod error;
mod pca;
mod pcr;
mod regression;

pub use dataset::{FeatureMatrix, Observation};
pub use error::ModelError;
pub use pca::Pca;
pub use pcr::{OutOfRange, PcRegression, Prediction};
pub use regression::LinearModel;
