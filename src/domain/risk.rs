//! Risk stratification and alert generation.
//!
//! Maps a classifier probability onto a fixed four-tier scale and flags
//! every base measurement outside its normal range. Alerts are display
//! metadata only and never feed back into the feature vector.

use serde::{Deserialize, Serialize};

use super::measurement::{BaseMeasurement, Demographics};
use super::scores::ClinicalScores;

/// Lower-inclusive probability cut points for Moderate, High and VeryHigh.
pub const RISK_TIER_CUTS: [f64; 3] = [0.3, 0.5, 0.7];

/// Probability at or above which the binary prediction is positive.
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Age from which the elderly annotation is added.
pub const ELDERLY_AGE: f64 = 65.0;

/// Ordered sepsis risk tier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum RiskTier {
    /// Routine monitoring
    Low,
    /// Closer observation recommended
    Moderate,
    /// Clinical review recommended
    High,
    /// Immediate sepsis workup advised
    VeryHigh,
}

impl RiskTier {
    /// Tier for a probability. A value exactly at a cut belongs to the upper
    /// tier.
    #[must_use]
    pub fn from_probability(probability: f64) -> Self {
        let [moderate, high, very_high] = RISK_TIER_CUTS;
        if probability >= very_high {
            Self::VeryHigh
        } else if probability >= high {
            Self::High
        } else if probability >= moderate {
            Self::Moderate
        } else {
            Self::Low
        }
    }

    /// Get a human-readable description.
    #[must_use]
    pub fn description(&self) -> &'static str {
        match self {
            Self::Low => "Low risk - continue routine monitoring",
            Self::Moderate => "Moderate risk - increase observation frequency",
            Self::High => "High risk - clinical review and sepsis screen advised",
            Self::VeryHigh => "Very high risk - initiate sepsis bundle evaluation immediately",
        }
    }
}

impl std::fmt::Display for RiskTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "LOW"),
            Self::Moderate => write!(f, "MODERATE"),
            Self::High => write!(f, "HIGH"),
            Self::VeryHigh => write!(f, "VERY HIGH"),
        }
    }
}

/// Base measurement an alert refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Parameter {
    HeartRate,
    Temperature,
    RespRate,
    O2Sat,
    Sbp,
    Dbp,
    Map,
    Wbc,
    Platelets,
    Creatinine,
    Lactate,
    Age,
}

impl Parameter {
    #[must_use]
    pub fn label(&self) -> &'static str {
        match self {
            Self::HeartRate => "HR",
            Self::Temperature => "Temp",
            Self::RespRate => "Resp",
            Self::O2Sat => "O2Sat",
            Self::Sbp => "SBP",
            Self::Dbp => "DBP",
            Self::Map => "MAP",
            Self::Wbc => "WBC",
            Self::Platelets => "Platelets",
            Self::Creatinine => "Creatinine",
            Self::Lactate => "Lactate",
            Self::Age => "Age",
        }
    }
}

/// Which side of the normal range a value falls on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Deviation {
    Low,
    High,
}

/// Normal range of one base measurement, with the clinical names of its
/// low and high deviations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NormalRange {
    pub parameter: Parameter,
    pub low: f64,
    pub high: f64,
    pub unit: &'static str,
    pub low_finding: &'static str,
    pub high_finding: &'static str,
}

/// Normal ranges in canonical measurement order.
pub const NORMAL_RANGES: [NormalRange; 11] = [
    NormalRange { parameter: Parameter::HeartRate, low: 60.0, high: 100.0, unit: "bpm", low_finding: "Bradycardia", high_finding: "Tachycardia" },
    NormalRange { parameter: Parameter::Temperature, low: 36.5, high: 37.5, unit: "°C", low_finding: "Hypothermia", high_finding: "Fever" },
    NormalRange { parameter: Parameter::RespRate, low: 12.0, high: 20.0, unit: "/min", low_finding: "Bradypnea", high_finding: "Tachypnea" },
    NormalRange { parameter: Parameter::O2Sat, low: 95.0, high: 100.0, unit: "%", low_finding: "Low oxygen saturation", high_finding: "Oxygen saturation above 100%" },
    NormalRange { parameter: Parameter::Sbp, low: 90.0, high: 140.0, unit: "mmHg", low_finding: "Hypotension", high_finding: "Systolic hypertension" },
    NormalRange { parameter: Parameter::Dbp, low: 60.0, high: 90.0, unit: "mmHg", low_finding: "Low diastolic pressure", high_finding: "Diastolic hypertension" },
    NormalRange { parameter: Parameter::Map, low: 70.0, high: 100.0, unit: "mmHg", low_finding: "Low mean arterial pressure", high_finding: "High mean arterial pressure" },
    NormalRange { parameter: Parameter::Wbc, low: 4.0, high: 11.0, unit: "×10⁹/L", low_finding: "Leukopenia", high_finding: "Leukocytosis" },
    NormalRange { parameter: Parameter::Platelets, low: 150.0, high: 400.0, unit: "×10⁹/L", low_finding: "Thrombocytopenia", high_finding: "Thrombocytosis" },
    NormalRange { parameter: Parameter::Creatinine, low: 0.6, high: 1.2, unit: "mg/dL", low_finding: "Low creatinine", high_finding: "Elevated creatinine" },
    NormalRange { parameter: Parameter::Lactate, low: 0.5, high: 2.2, unit: "mmol/L", low_finding: "Low lactate", high_finding: "Elevated lactate" },
];

/// One abnormal-value flag for presentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub parameter: Parameter,
    pub value: f64,
    /// `None` for annotations that are not range checks (e.g. age)
    pub deviation: Option<Deviation>,
    pub message: String,
}

impl std::fmt::Display for Alert {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.message)
    }
}

/// One alert per base measurement strictly outside its normal range, in
/// canonical order.
#[must_use]
pub fn range_alerts(base: &BaseMeasurement) -> Vec<Alert> {
    NORMAL_RANGES
        .iter()
        .zip(base.to_array())
        .filter_map(|(range, value)| {
            let (deviation, finding, bound) = if value < range.low {
                (Deviation::Low, range.low_finding, range.low)
            } else if value > range.high {
                (Deviation::High, range.high_finding, range.high)
            } else {
                return None;
            };
            let op = if deviation == Deviation::Low { '<' } else { '>' };
            Some(Alert {
                parameter: range.parameter,
                value,
                deviation: Some(deviation),
                message: format!(
                    "{finding} ({} {value} {} {op} {bound})",
                    range.parameter.label(),
                    range.unit
                ),
            })
        })
        .collect()
}

/// Demographic annotations. Never used as a model input.
#[must_use]
pub fn demographic_alerts(demographics: &Demographics) -> Vec<Alert> {
    match demographics.age {
        Some(age) if age >= ELDERLY_AGE => vec![Alert {
            parameter: Parameter::Age,
            value: age,
            deviation: None,
            message: format!("Elderly patient (age {age}) - increased sepsis risk"),
        }],
        _ => Vec::new(),
    }
}

/// Output of one inference call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionResult {
    /// Probability of sepsis (0.0 to 1.0)
    pub probability: f64,

    /// Binary prediction at [`DECISION_THRESHOLD`]
    pub prediction: bool,

    pub tier: RiskTier,

    pub scores: ClinicalScores,

    pub alerts: Vec<Alert>,

    /// Feature contract of the model that produced this result
    pub contract_version: u32,

    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Equality ignores `created_at`: two calls on the same input compare equal.
impl PartialEq for PredictionResult {
    fn eq(&self, other: &Self) -> bool {
        self.probability == other.probability
            && self.prediction == other.prediction
            && self.tier == other.tier
            && self.scores == other.scores
            && self.alerts == other.alerts
            && self.contract_version == other.contract_version
    }
}

impl PredictionResult {
    /// Whether any alert was raised.
    #[must_use]
    pub fn has_alerts(&self) -> bool {
        !self.alerts.is_empty()
    }
}

/// Build the prediction result from a probability and its inputs.
#[must_use]
pub fn stratify(
    probability: f64,
    scores: ClinicalScores,
    base: &BaseMeasurement,
    contract_version: u32,
) -> PredictionResult {
    PredictionResult {
        probability,
        prediction: probability >= DECISION_THRESHOLD,
        tier: RiskTier::from_probability(probability),
        scores,
        alerts: range_alerts(base),
        contract_version,
        created_at: chrono::Utc::now(),
    }
}
