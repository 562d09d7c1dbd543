//! # Sepsiguard
//!
//! Short-horizon sepsis risk estimation from eleven vital signs and
//! laboratory values.
//!
//! This crate provides:
//! - SOFA, SIRS and qSOFA scoring under a versioned threshold table
//! - A fixed 32-value engineered feature vector shared by training and
//!   inference
//! - Random-forest training with standardization and SMOTE oversampling
//! - Risk tiers and out-of-range alerts for each prediction
//!
//! ## Architecture
//!
//! The crate follows Hexagonal Architecture:
//! - `domain`: measurements, clinical scores, features, risk tiers
//! - `model`: scaler, SMOTE, decision trees, forest, metrics, fitted bundle
//! - `ports`: trait definitions (`Classifier`, `ModelStore`)
//! - `adapters`: JSON bundle store, CSV datasets, synthetic cohort, log redaction
//! - `application`: training and inference use cases

pub mod adapters;
pub mod application;
pub mod domain;
pub mod model;
pub mod ports;

pub use adapters::{JsonModelStore, StoreError};
pub use application::{
    predict, predict_with_demographics, prepare_features, train, InferenceService, TrainingConfig,
    TrainingOutcome, TrainingService,
};
pub use domain::{
    compute_clinical_scores, engineer_features, BaseMeasurement, ClinicalScores,
    EngineeredFeatureVector, InputError, PredictionResult, RiskTier, ScoringPolicy,
};
pub use model::FittedModel;
pub use ports::{Classifier, ModelStore};

/// Result type for Sepsiguard operations
pub type Result<T> = std::result::Result<T, SepsisError>;

/// Main error type for Sepsiguard
#[derive(Debug, thiserror::Error)]
pub enum SepsisError {
    #[error("Invalid input: {0}")]
    Input(#[from] InputError),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Training failed: {0}")]
    Training(String),

    #[error("Model store error: {0}")]
    Store(#[from] StoreError),

    #[error("Dataset error: {0}")]
    Dataset(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
