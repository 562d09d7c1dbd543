//! Domain layer: measurements, clinical scores, features and risk tiers.
//!
//! Everything here is a pure function of its inputs. No I/O, no global state.

pub mod features;
pub mod measurement;
pub mod risk;
pub mod scores;

pub use features::{
    engineer_features, engineer_features_with, feature_names, EngineeredFeatureVector,
    FEATURE_CONTRACT_VERSION, FEATURE_COUNT, FEATURE_NAMES,
};
pub use measurement::{
    BaseMeasurement, Demographics, Gender, InputError, LabeledRecord, PatientRecord,
    BASE_FEATURE_NAMES,
};
pub use risk::{
    demographic_alerts, range_alerts, stratify, Alert, Deviation, Parameter, PredictionResult,
    RiskTier, DECISION_THRESHOLD, RISK_TIER_CUTS,
};
pub use scores::{
    compute_clinical_scores, compute_clinical_scores_with, ClinicalScores, ScoringPolicy,
};
