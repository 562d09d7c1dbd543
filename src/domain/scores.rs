//! Clinical severity scores: SOFA, SIRS and qSOFA.
//!
//! Every threshold lives in [`ScoringPolicy`], a versioned table that is
//! stored with each trained model so that training and inference always
//! score a patient under the same rules.
//!
//! qSOFA here is a two-criterion approximation: the altered-mentation
//! criterion needs a Glasgow Coma Scale reading, which is not collected.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::measurement::BaseMeasurement;

/// Version tag of [`ScoringPolicy::default`].
pub const SCORING_POLICY_VERSION: &str = "sepsis-scoring-v1";

/// Direction in which a staged score escalates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageDirection {
    /// A cut is crossed when `value < cut` (lower is worse).
    Descending,
    /// A cut is crossed when `value > cut` (higher is worse).
    Ascending,
}

/// Four cut points mapping a value onto a 0..=4 stage.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Staging {
    pub direction: StageDirection,
    pub cuts: [f64; 4],
}

impl Staging {
    #[must_use]
    pub const fn descending(cuts: [f64; 4]) -> Self {
        Self {
            direction: StageDirection::Descending,
            cuts,
        }
    }

    #[must_use]
    pub const fn ascending(cuts: [f64; 4]) -> Self {
        Self {
            direction: StageDirection::Ascending,
            cuts,
        }
    }

    /// Number of cuts crossed by `value`.
    #[must_use]
    pub fn stage(&self, value: f64) -> u8 {
        let crossed = self
            .cuts
            .iter()
            .filter(|&&cut| match self.direction {
                StageDirection::Descending => value < cut,
                StageDirection::Ascending => value > cut,
            })
            .count();
        crossed as u8
    }

    fn is_monotonic(&self) -> bool {
        self.cuts.iter().all(|c| c.is_finite())
            && self.cuts.windows(2).all(|w| match self.direction {
                StageDirection::Descending => w[0] > w[1],
                StageDirection::Ascending => w[0] < w[1],
            })
    }
}

/// Closed interval treated as normal by a two-sided criterion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Band {
    pub low: f64,
    pub high: f64,
}

impl Band {
    /// True when `value` lies strictly outside `[low, high]`.
    #[must_use]
    pub fn excludes(&self, value: f64) -> bool {
        value < self.low || value > self.high
    }
}

/// SIRS criteria thresholds. All comparisons are strict.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SirsThresholds {
    pub temperature: Band,
    /// Criterion met when HR > this
    pub heart_rate_above: f64,
    /// Criterion met when Resp > this
    pub resp_rate_above: f64,
    pub wbc: Band,
}

/// qSOFA criteria thresholds. Both comparisons are inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QsofaThresholds {
    /// Criterion met when Resp >= this
    pub resp_rate_at_least: f64,
    /// Criterion met when SBP <= this
    pub sbp_at_most: f64,
}

/// Thresholds for the binary abnormal-value flags of the feature vector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FlagThresholds {
    /// SBP < this
    pub hypotension_sbp_below: f64,
    /// O2Sat < this
    pub hypoxemia_o2_sat_below: f64,
    /// HR > this
    pub tachycardia_hr_above: f64,
    /// Lactate > this
    pub hyperlactatemia_above: f64,
    /// Platelets < this
    pub thrombocytopenia_below: f64,
    /// Creatinine > this
    pub creatinine_above: f64,
}

/// Weights of the composite severity index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeverityWeights {
    pub sofa: f64,
    pub sirs: f64,
    pub qsofa: f64,
    pub hyperlactatemia: f64,
}

/// Versioned table of every clinical cut point used by the scoring pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringPolicy {
    pub version: String,
    pub sofa_respiratory: Staging,
    pub sofa_cardiovascular: Staging,
    pub sofa_coagulation: Staging,
    pub sofa_renal: Staging,
    pub sirs: SirsThresholds,
    pub qsofa: QsofaThresholds,
    pub flags: FlagThresholds,
    pub severity: SeverityWeights,
    /// Lower bound applied to SBP in the shock index denominator
    pub shock_index_min_sbp: f64,
}

impl Default for ScoringPolicy {
    fn default() -> Self {
        Self {
            version: SCORING_POLICY_VERSION.to_string(),
            // O2Sat: >=95 -> 0, [91,95) -> 1, [86,91) -> 2, [76,86) -> 3, <76 -> 4
            sofa_respiratory: Staging::descending([95.0, 91.0, 86.0, 76.0]),
            // MAP < 70 is the Sepsis-3 hypotension threshold
            sofa_cardiovascular: Staging::descending([70.0, 60.0, 50.0, 40.0]),
            sofa_coagulation: Staging::descending([150.0, 100.0, 50.0, 20.0]),
            sofa_renal: Staging::ascending([1.2, 1.9, 3.4, 4.9]),
            sirs: SirsThresholds {
                temperature: Band {
                    low: 36.0,
                    high: 38.0,
                },
                heart_rate_above: 90.0,
                resp_rate_above: 20.0,
                wbc: Band {
                    low: 4.0,
                    high: 12.0,
                },
            },
            qsofa: QsofaThresholds {
                resp_rate_at_least: 22.0,
                sbp_at_most: 100.0,
            },
            flags: FlagThresholds {
                hypotension_sbp_below: 90.0,
                hypoxemia_o2_sat_below: 90.0,
                tachycardia_hr_above: 100.0,
                hyperlactatemia_above: 2.0,
                thrombocytopenia_below: 150.0,
                creatinine_above: 1.2,
            },
            severity: SeverityWeights {
                sofa: 1.0,
                sirs: 1.0,
                qsofa: 2.0,
                hyperlactatemia: 2.0,
            },
            shock_index_min_sbp: 1.0,
        }
    }
}

impl ScoringPolicy {
    /// Check the table for internal consistency.
    ///
    /// # Errors
    /// Returns a description of every inconsistent entry.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.version.trim().is_empty() {
            errors.push("policy version must not be empty".to_string());
        }
        for (name, staging) in [
            ("sofa_respiratory", &self.sofa_respiratory),
            ("sofa_cardiovascular", &self.sofa_cardiovascular),
            ("sofa_coagulation", &self.sofa_coagulation),
            ("sofa_renal", &self.sofa_renal),
        ] {
            if !staging.is_monotonic() {
                errors.push(format!(
                    "{name} cuts {:?} are not strictly monotonic in the {:?} direction",
                    staging.cuts, staging.direction
                ));
            }
        }
        for (name, band) in [
            ("sirs.temperature", self.sirs.temperature),
            ("sirs.wbc", self.sirs.wbc),
        ] {
            if !(band.low.is_finite() && band.high.is_finite() && band.low <= band.high) {
                errors.push(format!("{name} band [{}, {}] is invalid", band.low, band.high));
            }
        }
        if !(self.shock_index_min_sbp.is_finite() && self.shock_index_min_sbp > 0.0) {
            errors.push(format!(
                "shock_index_min_sbp {} must be positive",
                self.shock_index_min_sbp
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Load a policy table from a JSON file and validate it.
    ///
    /// # Errors
    /// Returns a message if the file cannot be read, parsed or validated.
    pub fn from_json_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Failed to read scoring policy {path:?}: {e}"))?;
        let policy: Self = serde_json::from_str(&content)
            .map_err(|e| format!("Invalid scoring policy {path:?}: {e}"))?;
        policy.validate().map_err(|errs| errs.join("; "))?;
        Ok(policy)
    }
}

/// SOFA organ components, each 0..=4.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SofaComponents {
    pub respiratory: u8,
    pub cardiovascular: u8,
    pub coagulation: u8,
    pub renal: u8,
}

impl SofaComponents {
    #[must_use]
    pub fn total(&self) -> u8 {
        self.respiratory + self.cardiovascular + self.coagulation + self.renal
    }
}

/// Which SIRS criteria are met.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SirsCriteria {
    pub temperature: bool,
    pub heart_rate: bool,
    pub resp_rate: bool,
    pub wbc: bool,
}

impl SirsCriteria {
    #[must_use]
    pub fn count(&self) -> u8 {
        [self.temperature, self.heart_rate, self.resp_rate, self.wbc]
            .into_iter()
            .map(u8::from)
            .sum()
    }
}

/// Which qSOFA criteria are met.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct QsofaCriteria {
    pub resp_rate: bool,
    pub hypotension: bool,
}

impl QsofaCriteria {
    #[must_use]
    pub fn count(&self) -> u8 {
        u8::from(self.resp_rate) + u8::from(self.hypotension)
    }
}

/// Clinical scores derived from one [`BaseMeasurement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ClinicalScores {
    pub sofa: SofaComponents,
    pub sirs: SirsCriteria,
    pub qsofa: QsofaCriteria,
}

impl ClinicalScores {
    #[must_use]
    pub fn sofa_total(&self) -> u8 {
        self.sofa.total()
    }

    #[must_use]
    pub fn sirs_count(&self) -> u8 {
        self.sirs.count()
    }

    #[must_use]
    pub fn qsofa_total(&self) -> u8 {
        self.qsofa.count()
    }

    /// SOFA >= 2
    #[must_use]
    pub fn organ_dysfunction(&self) -> bool {
        self.sofa_total() >= 2
    }

    /// SIRS >= 2
    #[must_use]
    pub fn systemic_inflammation(&self) -> bool {
        self.sirs_count() >= 2
    }

    /// qSOFA >= 2
    #[must_use]
    pub fn needs_escalation(&self) -> bool {
        self.qsofa_total() >= 2
    }
}

/// Score a measurement under the current default policy.
#[must_use]
pub fn compute_clinical_scores(base: &BaseMeasurement) -> ClinicalScores {
    compute_clinical_scores_with(base, &ScoringPolicy::default())
}

/// Score a measurement under an explicit policy.
#[must_use]
pub fn compute_clinical_scores_with(base: &BaseMeasurement, policy: &ScoringPolicy) -> ClinicalScores {
    let sofa = SofaComponents {
        respiratory: policy.sofa_respiratory.stage(base.o2_sat),
        cardiovascular: policy.sofa_cardiovascular.stage(base.map),
        coagulation: policy.sofa_coagulation.stage(base.platelets),
        renal: policy.sofa_renal.stage(base.creatinine),
    };

    let sirs = SirsCriteria {
        temperature: policy.sirs.temperature.excludes(base.temperature),
        heart_rate: base.heart_rate > policy.sirs.heart_rate_above,
        resp_rate: base.resp_rate > policy.sirs.resp_rate_above,
        wbc: policy.sirs.wbc.excludes(base.wbc),
    };

    let qsofa = QsofaCriteria {
        resp_rate: base.resp_rate >= policy.qsofa.resp_rate_at_least,
        hypotension: base.sbp <= policy.qsofa.sbp_at_most,
    };

    ClinicalScores { sofa, sirs, qsofa }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::measurement::fixtures;
    use proptest::prelude::*;

    #[test]
    fn test_stable_patient_scores_zero() {
        let scores = compute_clinical_scores(&fixtures::stable());
        assert_eq!(scores.sofa_total(), 0);
        assert_eq!(scores.sirs_count(), 0);
        assert_eq!(scores.qsofa_total(), 0);
        assert!(!scores.organ_dysfunction());
    }

    #[test]
    fn test_septic_patient_scores() {
        let scores = compute_clinical_scores(&fixtures::septic());
        assert_eq!(scores.sirs_count(), 4);
        assert_eq!(scores.qsofa_total(), 2);
        // O2Sat 89 -> 2, MAP 63 -> 1, platelets 95 -> 2, creatinine 2.3 -> 2
        assert_eq!(
            scores.sofa,
            SofaComponents {
                respiratory: 2,
                cardiovascular: 1,
                coagulation: 2,
                renal: 2,
            }
        );
        assert_eq!(scores.sofa_total(), 7);
        assert!(scores.organ_dysfunction());
        assert!(scores.systemic_inflammation());
        assert!(scores.needs_escalation());
    }

    #[test]
    fn test_qsofa_boundaries_are_inclusive() {
        let mut m = fixtures::stable();
        m.sbp = 100.0;
        m.resp_rate = 22.0;
        let scores = compute_clinical_scores(&m);
        assert!(scores.qsofa.resp_rate);
        assert!(scores.qsofa.hypotension);
        assert_eq!(scores.qsofa_total(), 2);

        m.sbp = 100.01;
        m.resp_rate = 21.99;
        assert_eq!(compute_clinical_scores(&m).qsofa_total(), 0);
    }

    #[test]
    fn test_sirs_boundaries_are_strict() {
        let mut m = fixtures::stable();
        m.temperature = 38.0;
        m.heart_rate = 90.0;
        m.resp_rate = 20.0;
        m.wbc = 12.0;
        assert_eq!(compute_clinical_scores(&m).sirs_count(), 0);

        m.temperature = 36.0;
        m.wbc = 4.0;
        assert_eq!(compute_clinical_scores(&m).sirs_count(), 0);

        m.temperature = 35.9;
        m.wbc = 3.9;
        m.heart_rate = 91.0;
        m.resp_rate = 21.0;
        assert_eq!(compute_clinical_scores(&m).sirs_count(), 4);
    }

    #[test]
    fn test_respiratory_stage_table() {
        let staging = ScoringPolicy::default().sofa_respiratory;
        assert_eq!(staging.stage(99.0), 0);
        assert_eq!(staging.stage(95.0), 0);
        assert_eq!(staging.stage(94.0), 1);
        assert_eq!(staging.stage(91.0), 1);
        assert_eq!(staging.stage(90.0), 2);
        assert_eq!(staging.stage(86.0), 2);
        assert_eq!(staging.stage(85.0), 3);
        assert_eq!(staging.stage(76.0), 3);
        assert_eq!(staging.stage(75.0), 4);
    }

    #[test]
    fn test_renal_stage_table() {
        let staging = ScoringPolicy::default().sofa_renal;
        assert_eq!(staging.stage(0.9), 0);
        assert_eq!(staging.stage(1.2), 0);
        assert_eq!(staging.stage(1.3), 1);
        assert_eq!(staging.stage(2.0), 2);
        assert_eq!(staging.stage(3.5), 3);
        assert_eq!(staging.stage(5.0), 4);
    }

    #[test]
    fn test_cardiovascular_and_coagulation_thresholds() {
        let policy = ScoringPolicy::default();
        assert_eq!(policy.sofa_cardiovascular.stage(70.0), 0);
        assert_eq!(policy.sofa_cardiovascular.stage(69.9), 1);
        assert_eq!(policy.sofa_cardiovascular.stage(35.0), 4);
        assert_eq!(policy.sofa_coagulation.stage(150.0), 0);
        assert_eq!(policy.sofa_coagulation.stage(149.0), 1);
        assert_eq!(policy.sofa_coagulation.stage(10.0), 4);
    }

    #[test]
    fn test_default_policy_is_valid() {
        assert!(ScoringPolicy::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_unordered_cuts() {
        let mut policy = ScoringPolicy::default();
        policy.sofa_renal = Staging::ascending([1.2, 3.4, 1.9, 4.9]);
        policy.sirs.wbc = Band {
            low: 12.0,
            high: 4.0,
        };
        let errors = policy.validate().unwrap_err();
        assert_eq!(errors.len(), 2);
        assert!(errors[0].contains("sofa_renal"));
    }

    #[test]
    fn test_policy_json_file_roundtrip() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("policy.json");
        let policy = ScoringPolicy::default();
        std::fs::write(&path, serde_json::to_vec_pretty(&policy).unwrap()).unwrap();

        let loaded = ScoringPolicy::from_json_file(&path).expect("Should load");
        assert_eq!(loaded, policy);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_descending_stages_never_improve_as_value_falls(a in 0.0f64..200.0, b in 0.0f64..200.0) {
            let policy = ScoringPolicy::default();
            let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
            for staging in [policy.sofa_respiratory, policy.sofa_cardiovascular, policy.sofa_coagulation] {
                prop_assert!(staging.stage(lo) >= staging.stage(hi));
            }
        }

        #[test]
        fn prop_renal_stage_never_improves_as_creatinine_rises(a in 0.0f64..15.0, b in 0.0f64..15.0) {
            let staging = ScoringPolicy::default().sofa_renal;
            let (hi, lo) = if a >= b { (a, b) } else { (b, a) };
            prop_assert!(staging.stage(hi) >= staging.stage(lo));
        }

        #[test]
        fn prop_lactate_never_moves_sofa(lactate in 0.0f64..30.0) {
            let mut m = fixtures::septic();
            let baseline = compute_clinical_scores(&m);
            m.lactate = lactate;
            prop_assert_eq!(compute_clinical_scores(&m), baseline);
        }

        #[test]
        fn prop_scores_stay_in_range(
            hr in -50.0f64..300.0,
            temp in 20.0f64..45.0,
            resp in 0.0f64..80.0,
            o2 in 0.0f64..100.0,
            map in 0.0f64..200.0,
            plt in 0.0f64..1000.0,
            creat in 0.0f64..20.0,
        ) {
            let mut m = fixtures::stable();
            m.heart_rate = hr;
            m.temperature = temp;
            m.resp_rate = resp;
            m.o2_sat = o2;
            m.map = map;
            m.platelets = plt;
            m.creatinine = creat;
            let s = compute_clinical_scores(&m);
            prop_assert!(s.sofa_total() <= 16);
            prop_assert!(s.sirs_count() <= 4);
            prop_assert!(s.qsofa_total() <= 2);
        }
    }
}
