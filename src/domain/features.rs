//! Feature engineering: the single source of the model's input vector.
//!
//! Training and inference both build feature vectors through
//! [`engineer_features_with`]. Column identity is defined by position; the
//! names in [`FEATURE_NAMES`] document each position and are stored with
//! every trained model so a contract change is detected on load.

use serde::{Deserialize, Serialize};

use super::measurement::{BaseMeasurement, BASE_FEATURE_NAMES};
use super::scores::{ClinicalScores, ScoringPolicy};

/// Number of engineered features (base + derived).
pub const FEATURE_COUNT: usize = 32;

/// Version of the feature contract. Bump on any change to [`FEATURE_NAMES`]
/// or to the meaning of a position.
pub const FEATURE_CONTRACT_VERSION: u32 = 1;

/// Ordered feature names. Positions 0..=10 equal [`BASE_FEATURE_NAMES`].
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    // base measurements
    "HR",
    "Temp",
    "Resp",
    "O2Sat",
    "SBP",
    "DBP",
    "MAP",
    "WBC",
    "Platelets",
    "Creatinine",
    "Lactate",
    // SOFA
    "sofa_respiratory",
    "sofa_cardiovascular",
    "sofa_coagulation",
    "sofa_renal",
    "sofa_total",
    // SIRS
    "sirs_count",
    "sirs_temperature",
    "sirs_heart_rate",
    "sirs_respiratory",
    "sirs_wbc",
    // qSOFA
    "qsofa_total",
    "qsofa_respiratory",
    "qsofa_hypotension",
    // abnormal-value flags
    "hypotension_flag",
    "hypoxemia_flag",
    "tachycardia_flag",
    "hyperlactatemia_flag",
    "thrombocytopenia_flag",
    "elevated_creatinine_flag",
    // composites
    "severity_index",
    "shock_index",
];

/// Ordered feature names as owned strings, as stored in a model bundle.
#[must_use]
pub fn feature_names() -> Vec<String> {
    FEATURE_NAMES.iter().map(|s| (*s).to_string()).collect()
}

/// Fixed-length engineered feature vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EngineeredFeatureVector(pub [f64; FEATURE_COUNT]);

impl EngineeredFeatureVector {
    #[must_use]
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Value at the position documented by `name`, if the name is known.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        FEATURE_NAMES
            .iter()
            .position(|n| *n == name)
            .map(|i| self.0[i])
    }

    /// Name and index of the first non-finite value.
    #[must_use]
    pub fn first_non_finite(&self) -> Option<(usize, &'static str)> {
        self.0
            .iter()
            .position(|v| !v.is_finite())
            .map(|i| (i, FEATURE_NAMES[i]))
    }
}

fn flag(condition: bool) -> f64 {
    if condition {
        1.0
    } else {
        0.0
    }
}

/// Engineer the feature vector under the current default policy.
#[must_use]
pub fn engineer_features(base: &BaseMeasurement, scores: &ClinicalScores) -> EngineeredFeatureVector {
    engineer_features_with(base, scores, &ScoringPolicy::default())
}

/// Engineer the feature vector under an explicit policy.
///
/// `scores` must have been computed from `base` under the same policy.
#[must_use]
pub fn engineer_features_with(
    base: &BaseMeasurement,
    scores: &ClinicalScores,
    policy: &ScoringPolicy,
) -> EngineeredFeatureVector {
    let mut v = [0.0; FEATURE_COUNT];
    v[..BASE_FEATURE_NAMES.len()].copy_from_slice(&base.to_array());

    let sofa_total = f64::from(scores.sofa_total());
    let sirs_count = f64::from(scores.sirs_count());
    let qsofa_total = f64::from(scores.qsofa_total());
    let flags = &policy.flags;
    let hyperlactatemia = flag(base.lactate > flags.hyperlactatemia_above);

    v[11] = f64::from(scores.sofa.respiratory);
    v[12] = f64::from(scores.sofa.cardiovascular);
    v[13] = f64::from(scores.sofa.coagulation);
    v[14] = f64::from(scores.sofa.renal);
    v[15] = sofa_total;

    v[16] = sirs_count;
    v[17] = flag(scores.sirs.temperature);
    v[18] = flag(scores.sirs.heart_rate);
    v[19] = flag(scores.sirs.resp_rate);
    v[20] = flag(scores.sirs.wbc);

    v[21] = qsofa_total;
    v[22] = flag(scores.qsofa.resp_rate);
    v[23] = flag(scores.qsofa.hypotension);

    v[24] = flag(base.sbp < flags.hypotension_sbp_below);
    v[25] = flag(base.o2_sat < flags.hypoxemia_o2_sat_below);
    v[26] = flag(base.heart_rate > flags.tachycardia_hr_above);
    v[27] = hyperlactatemia;
    v[28] = flag(base.platelets < flags.thrombocytopenia_below);
    v[29] = flag(base.creatinine > flags.creatinine_above);

    let w = &policy.severity;
    v[30] = w.sofa * sofa_total
        + w.sirs * sirs_count
        + w.qsofa * qsofa_total
        + w.hyperlactatemia * hyperlactatemia;
    v[31] = base.heart_rate / base.sbp.max(policy.shock_index_min_sbp);

    EngineeredFeatureVector(v)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::measurement::fixtures;
    use crate::domain::scores::compute_clinical_scores;
    use proptest::prelude::*;

    fn features_of(m: &BaseMeasurement) -> EngineeredFeatureVector {
        engineer_features(m, &compute_clinical_scores(m))
    }

    #[test]
    fn test_feature_names_are_unique_and_prefixed_by_base() {
        assert_eq!(&FEATURE_NAMES[..11], &BASE_FEATURE_NAMES[..]);
        let mut names = FEATURE_NAMES.to_vec();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), FEATURE_COUNT);
    }

    #[test]
    fn test_stable_patient_vector() {
        let m = fixtures::stable();
        let v = features_of(&m);
        assert_eq!(&v.as_slice()[..11], &m.to_array()[..]);
        assert!(v.as_slice()[11..30].iter().all(|x| *x == 0.0));
        assert_eq!(v.get("severity_index"), Some(0.0));
        assert!((v.get("shock_index").unwrap() - 75.0 / 125.0).abs() < 1e-12);
    }

    #[test]
    fn test_septic_patient_vector() {
        let v = features_of(&fixtures::septic());
        assert_eq!(v.get("sofa_total"), Some(7.0));
        assert_eq!(v.get("sirs_count"), Some(4.0));
        assert_eq!(v.get("qsofa_total"), Some(2.0));
        for name in [
            "hypotension_flag",
            "hypoxemia_flag",
            "tachycardia_flag",
            "hyperlactatemia_flag",
            "thrombocytopenia_flag",
            "elevated_creatinine_flag",
        ] {
            assert_eq!(v.get(name), Some(1.0), "{name}");
        }
        // 7 + 4 + 2*2 + 2*1
        assert_eq!(v.get("severity_index"), Some(17.0));
    }

    #[test]
    fn test_shock_index_denominator_is_bounded() {
        let mut m = fixtures::septic();
        m.sbp = 0.0;
        let v = features_of(&m);
        assert_eq!(v.get("shock_index"), Some(118.0));
        assert!(v.first_non_finite().is_none());
    }

    #[test]
    fn test_policy_changes_flags() {
        let m = fixtures::septic();
        let mut policy = ScoringPolicy::default();
        policy.flags.tachycardia_hr_above = 130.0;
        let scores = crate::domain::scores::compute_clinical_scores_with(&m, &policy);
        let v = engineer_features_with(&m, &scores, &policy);
        assert_eq!(v.get("tachycardia_flag"), Some(0.0));
    }

    #[test]
    fn test_vector_serializes_as_list() {
        let v = features_of(&fixtures::stable());
        let json = serde_json::to_string(&v).unwrap();
        assert!(json.starts_with('['));
        let back: EngineeredFeatureVector = serde_json::from_str(&json).unwrap();
        assert_eq!(back, v);
        assert!(serde_json::from_str::<EngineeredFeatureVector>("[1.0, 2.0]").is_err());
    }

    proptest! {
        #[test]
        fn prop_contract_holds_for_any_finite_input(values in proptest::collection::vec(-1.0e6f64..1.0e6, 11)) {
            let m = BaseMeasurement::from_slice(&values).unwrap();
            let v = features_of(&m);
            prop_assert_eq!(v.len(), FEATURE_COUNT);
            prop_assert_eq!(&v.as_slice()[..11], &values[..]);
            prop_assert!(v.first_non_finite().is_none());
        }

        #[test]
        fn prop_engineering_is_deterministic(values in proptest::collection::vec(0.0f64..500.0, 11)) {
            let m = BaseMeasurement::from_slice(&values).unwrap();
            prop_assert_eq!(features_of(&m), features_of(&m));
        }
    }
}
