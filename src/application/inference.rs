//! Inference: one patient's measurements in, a stratified risk result out.
//!
//! The feature vector is built by the same engine used for training, under
//! the scoring policy stored in the model bundle.

use std::sync::Arc;

use crate::domain::{
    compute_clinical_scores_with, demographic_alerts, engineer_features_with, stratify,
    BaseMeasurement, ClinicalScores, Demographics, EngineeredFeatureVector, PatientRecord,
    PredictionResult,
};
use crate::model::FittedModel;
use crate::{Result, SepsisError};

fn scores_and_features(
    base: &BaseMeasurement,
    model: &FittedModel,
) -> Result<(ClinicalScores, EngineeredFeatureVector)> {
    base.ensure_finite()?;
    let policy = model.policy();
    let scores = compute_clinical_scores_with(base, policy);
    let features = engineer_features_with(base, &scores, policy);
    model.ensure_contract(&features)?;
    Ok((scores, features))
}

fn score(features: &EngineeredFeatureVector, model: &FittedModel) -> Result<f64> {
    let scaled = model.scaler().transform(features.as_slice());
    let probability = model.classifier().predict_proba(&scaled);
    if !(0.0..=1.0).contains(&probability) {
        return Err(SepsisError::Configuration(format!(
            "classifier returned probability {probability}"
        )));
    }
    Ok(probability)
}

/// The engineered feature vector `model` would score for `base`.
///
/// # Errors
/// Returns [`SepsisError::Input`] for a non-finite measurement and
/// [`SepsisError::Configuration`] on a contract mismatch.
pub fn prepare_features(base: &BaseMeasurement, model: &FittedModel) -> Result<EngineeredFeatureVector> {
    scores_and_features(base, model).map(|(_, features)| features)
}

/// Score one patient.
///
/// # Errors
/// Returns [`SepsisError::Input`] for a non-finite measurement and
/// [`SepsisError::Configuration`] if the model does not match the feature
/// engine or yields an invalid probability.
pub fn predict(base: &BaseMeasurement, model: &FittedModel) -> Result<PredictionResult> {
    let (scores, features) = scores_and_features(base, model)?;
    let probability = score(&features, model)?;
    Ok(stratify(probability, scores, base, model.contract_version()))
}

/// Score one patient and append demographic annotations to the alerts.
///
/// # Errors
/// See [`predict`].
pub fn predict_with_demographics(
    base: &BaseMeasurement,
    demographics: &Demographics,
    model: &FittedModel,
) -> Result<PredictionResult> {
    let mut result = predict(base, model)?;
    result.alerts.extend(demographic_alerts(demographics));
    Ok(result)
}

/// Shares one loaded model across callers.
#[derive(Debug, Clone)]
pub struct InferenceService {
    model: Arc<FittedModel>,
}

impl InferenceService {
    #[must_use]
    pub fn new(model: FittedModel) -> Self {
        Self {
            model: Arc::new(model),
        }
    }

    #[must_use]
    pub fn from_shared(model: Arc<FittedModel>) -> Self {
        Self { model }
    }

    #[must_use]
    pub fn model(&self) -> &FittedModel {
        &self.model
    }

    /// Score a patient record, including demographic annotations.
    ///
    /// # Errors
    /// See [`predict`].
    pub fn assess(&self, patient: &PatientRecord) -> Result<PredictionResult> {
        let result = predict_with_demographics(&patient.measurement, &patient.demographics, &self.model)?;
        tracing::info!(
            "Assessment complete: tier={}, probability={:.3}, sofa={}, alerts={}",
            result.tier,
            result.probability,
            result.scores.sofa_total(),
            result.alerts.len()
        );
        if result.scores.needs_escalation() {
            tracing::warn!("qSOFA >= 2: escalation criteria met");
        }
        Ok(result)
    }

    /// Score a batch of records in order. Each record succeeds or fails on
    /// its own.
    #[must_use]
    pub fn assess_all(&self, patients: &[PatientRecord]) -> Vec<Result<PredictionResult>> {
        patients.iter().map(|p| self.assess(p)).collect()
    }

    /// Probability only, skipping alerts.
    ///
    /// # Errors
    /// See [`predict`].
    pub fn probability(&self, base: &BaseMeasurement) -> Result<f64> {
        let features = prepare_features(base, &self.model)?;
        score(&features, &self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::training::stratified_split;
    use crate::application::training::test_support::{cohort, quick_config, trained_model as trained};
    use crate::application::{build_feature_matrix, TrainingConfig, TrainingService};
    use crate::domain::measurement::fixtures;
    use crate::domain::{
        compute_clinical_scores, engineer_features, Gender, InputError, Parameter, RiskTier,
        ScoringPolicy, DECISION_THRESHOLD,
    };
    use crate::model::test_support::tiny_model;
    use crate::model::EvaluationMetrics;

    #[test]
    fn test_stable_patient_is_low_risk() {
        let model = trained();
        let result = predict(&fixtures::stable(), model).expect("Should predict");
        assert_eq!(result.scores.sofa_total(), 0);
        assert_eq!(result.scores.sirs_count(), 0);
        assert_eq!(result.scores.qsofa_total(), 0);
        assert!(result.probability < 0.3, "p={}", result.probability);
        assert_eq!(result.tier, RiskTier::Low);
        assert!(!result.prediction);
        assert!(result.alerts.is_empty());
    }

    #[test]
    fn test_septic_patient_is_very_high_risk() {
        let model = trained();
        let result = predict(&fixtures::septic(), model).expect("Should predict");
        assert_eq!(result.scores.sofa_total(), 7);
        assert_eq!(result.scores.sirs_count(), 4);
        assert_eq!(result.scores.qsofa_total(), 2);
        assert!(result.probability >= 0.7, "p={}", result.probability);
        assert_eq!(result.tier, RiskTier::VeryHigh);
        assert!(result.prediction);
        assert!(result
            .alerts
            .iter()
            .any(|a| a.parameter == Parameter::Lactate));
    }

    #[test]
    fn test_prediction_is_deterministic() {
        let model = trained();
        let a = predict(&fixtures::septic(), model).unwrap();
        let b = predict(&fixtures::septic(), model).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_inference_features_match_training_features() {
        let model = tiny_model();
        let base = fixtures::septic();
        let scores = compute_clinical_scores(&base);
        let training_row = engineer_features(&base, &scores);
        let inference_row = prepare_features(&base, &model).unwrap();
        assert_eq!(training_row, inference_row);
    }

    #[test]
    fn test_predict_reproduces_held_out_evaluation() {
        let mut policy = ScoringPolicy::default();
        policy.sofa_renal.cuts = [0.5, 0.6, 0.7, 0.8];
        let config = TrainingConfig {
            policy,
            ..quick_config()
        };
        let records = cohort(300, 21);
        let outcome = TrainingService::new(config.clone()).train(&records).unwrap();

        let (rows, labels) = build_feature_matrix(&records, &config.policy).unwrap();
        for (row, record) in rows.iter().zip(&records) {
            let features = prepare_features(&record.measurement, &outcome.model).unwrap();
            assert_eq!(row.as_slice(), features.as_slice());
        }

        let (_, test) = stratified_split(&labels, config.test_fraction, config.seed);
        let probabilities: Vec<f64> = test
            .iter()
            .map(|&i| predict(&records[i].measurement, &outcome.model).unwrap().probability)
            .collect();
        let test_labels: Vec<bool> = test.iter().map(|&i| labels[i]).collect();
        let metrics =
            EvaluationMetrics::from_probabilities(&test_labels, &probabilities, DECISION_THRESHOLD);
        assert_eq!(metrics, outcome.report.metrics);
    }

    #[test]
    fn test_service_probability_matches_predict() {
        let service = InferenceService::new(tiny_model());
        let p = service.probability(&fixtures::septic()).unwrap();
        let result = predict(&fixtures::septic(), service.model()).unwrap();
        assert_eq!(p, result.probability);
        assert!((0.0..=1.0).contains(&p));
    }

    #[test]
    fn test_non_finite_input_is_rejected() {
        let mut base = fixtures::stable();
        base.heart_rate = f64::NAN;
        let err = predict(&base, &tiny_model()).unwrap_err();
        assert!(matches!(
            err,
            SepsisError::Input(InputError::NonFinite { field: "HR", .. })
        ));
    }

    #[test]
    fn test_model_policy_drives_scoring() {
        // A model trained under a stricter renal table scores creatinine
        // differently from the default policy.
        let mut policy = ScoringPolicy::default();
        policy.sofa_renal.cuts = [0.5, 0.6, 0.7, 0.8];
        let config = TrainingConfig {
            policy,
            ..quick_config()
        };
        let model = TrainingService::new(config)
            .train(&cohort(120, 9))
            .unwrap()
            .model;
        let features = prepare_features(&fixtures::stable(), &model).unwrap();
        assert_eq!(features.get("sofa_renal"), Some(4.0));
    }

    #[test]
    fn test_elderly_annotation() {
        let demographics = Demographics {
            age: Some(71.0),
            gender: Some(Gender::Female),
        };
        let result =
            predict_with_demographics(&fixtures::stable(), &demographics, &tiny_model()).unwrap();
        assert_eq!(result.alerts.len(), 1);
        assert_eq!(result.alerts[0].parameter, Parameter::Age);
        assert!(result.alerts[0].message.contains("Elderly"));
    }

    #[test]
    fn test_service_assess_all_keeps_order() {
        let service = InferenceService::from_shared(Arc::new(trained().clone()));
        let mut bad = fixtures::stable();
        bad.wbc = f64::INFINITY;
        let patients = vec![
            PatientRecord::new(fixtures::stable()),
            PatientRecord::new(bad),
            PatientRecord::new(fixtures::septic()),
        ];
        let results = service.assess_all(&patients);
        assert_eq!(results.len(), 3);
        assert_eq!(results[0].as_ref().unwrap().tier, RiskTier::Low);
        assert!(results[1].is_err());
        assert_eq!(results[2].as_ref().unwrap().tier, RiskTier::VeryHigh);
    }

    #[test]
    fn test_service_is_shareable_across_threads() {
        let service = InferenceService::new(tiny_model());
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let service = service.clone();
                std::thread::spawn(move || service.probability(&fixtures::septic()).unwrap())
            })
            .collect();
        let probabilities: Vec<f64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert!(probabilities.windows(2).all(|w| w[0] == w[1]));
    }
}
