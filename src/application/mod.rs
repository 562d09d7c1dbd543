//! Application layer: Use cases and services.
//!
//! Orchestrates the domain engine, the model layer and the ports into the
//! two use cases of the crate: training a model and scoring patients.

pub mod inference;
pub mod training;

pub use inference::{predict, predict_with_demographics, prepare_features, InferenceService};
pub use training::{
    build_feature_matrix, train, CrossValidation, TrainingConfig, TrainingOutcome, TrainingReport,
    TrainingService,
};
