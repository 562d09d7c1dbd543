//! Base measurement types for sepsis risk scoring.
//!
//! Eleven vital signs and laboratory values form the mandatory input of the
//! scoring pipeline. Demographics travel alongside but never enter the
//! feature contract.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Canonical order of the eleven base measurements.
///
/// Positions 0..=10 of every engineered feature vector follow this order.
pub const BASE_FEATURE_NAMES: [&str; 11] = [
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
];

/// Error raised when raw input cannot be turned into a [`BaseMeasurement`].
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum InputError {
    #[error("Missing required measurement: {0}")]
    Missing(&'static str),

    #[error("Measurement {field} is not numeric: {value:?}")]
    NonNumeric { field: &'static str, value: String },

    #[error("Measurement {field} is not finite: {value}")]
    NonFinite { field: &'static str, value: f64 },

    #[error("Measurement {0} supplied more than once")]
    Duplicate(&'static str),

    #[error("Expected {expected} measurements, got {actual}")]
    Length { expected: usize, actual: usize },
}

/// The eleven mandatory clinical inputs.
///
/// All values are finite reals. Physiologically implausible values are scored,
/// not rejected.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaseMeasurement {
    /// Heart rate, beats/min
    pub heart_rate: f64,

    /// Temperature, °C
    pub temperature: f64,

    /// Respiratory rate, breaths/min
    pub resp_rate: f64,

    /// Oxygen saturation, %
    pub o2_sat: f64,

    /// Systolic blood pressure, mmHg
    pub sbp: f64,

    /// Diastolic blood pressure, mmHg
    pub dbp: f64,

    /// Mean arterial pressure, mmHg
    pub map: f64,

    /// White blood cell count, ×10⁹/L
    pub wbc: f64,

    /// Platelet count, ×10⁹/L
    pub platelets: f64,

    /// Serum creatinine, mg/dL
    pub creatinine: f64,

    /// Lactate, mmol/L
    pub lactate: f64,
}

impl BaseMeasurement {
    /// Values in canonical order (see [`BASE_FEATURE_NAMES`]).
    #[must_use]
    pub fn to_array(&self) -> [f64; 11] {
        [
            self.heart_rate,
            self.temperature,
            self.resp_rate,
            self.o2_sat,
            self.sbp,
            self.dbp,
            self.map,
            self.wbc,
            self.platelets,
            self.creatinine,
            self.lactate,
        ]
    }

    /// Build a measurement from values in canonical order.
    ///
    /// # Errors
    /// Returns [`InputError::Length`] if the slice does not hold exactly 11
    /// values, or [`InputError::NonFinite`] for NaN/infinite entries.
    pub fn from_slice(v: &[f64]) -> Result<Self, InputError> {
        if v.len() != BASE_FEATURE_NAMES.len() {
            return Err(InputError::Length {
                expected: BASE_FEATURE_NAMES.len(),
                actual: v.len(),
            });
        }
        for (name, value) in BASE_FEATURE_NAMES.iter().zip(v) {
            if !value.is_finite() {
                return Err(InputError::NonFinite {
                    field: *name,
                    value: *value,
                });
            }
        }

        Ok(Self {
            heart_rate: v[0],
            temperature: v[1],
            resp_rate: v[2],
            o2_sat: v[3],
            sbp: v[4],
            dbp: v[5],
            map: v[6],
            wbc: v[7],
            platelets: v[8],
            creatinine: v[9],
            lactate: v[10],
        })
    }

    /// Parse a measurement from transport-level key/value pairs.
    ///
    /// Keys are matched case-insensitively against [`BASE_FEATURE_NAMES`];
    /// unknown keys are ignored. No value is ever defaulted.
    ///
    /// # Errors
    /// Returns [`InputError::Duplicate`] if two keys name the same
    /// measurement, otherwise the first missing, non-numeric or non-finite
    /// field.
    pub fn from_fields<K, V>(fields: &HashMap<K, V>) -> Result<Self, InputError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut raw: [Option<&str>; 11] = [None; 11];
        for (key, value) in fields {
            let key = key.as_ref().trim();
            let Some(index) = BASE_FEATURE_NAMES
                .iter()
                .position(|name| name.eq_ignore_ascii_case(key))
            else {
                continue;
            };
            if raw[index].replace(value.as_ref()).is_some() {
                return Err(InputError::Duplicate(BASE_FEATURE_NAMES[index]));
            }
        }

        let mut values = [0.0; 11];
        for ((slot, name), raw) in values.iter_mut().zip(BASE_FEATURE_NAMES).zip(raw) {
            let raw = raw.ok_or(InputError::Missing(name))?;
            *slot = parse_value(name, raw)?;
        }

        Self::from_slice(&values)
    }

    /// Check that every value is finite.
    ///
    /// # Errors
    /// Returns the first non-finite field.
    pub fn ensure_finite(&self) -> Result<(), InputError> {
        for (name, value) in BASE_FEATURE_NAMES.into_iter().zip(self.to_array()) {
            if !value.is_finite() {
                return Err(InputError::NonFinite { field: name, value });
            }
        }
        Ok(())
    }
}

fn parse_value(field: &'static str, raw: &str) -> Result<f64, InputError> {
    let value: f64 = raw.trim().parse().map_err(|_| InputError::NonNumeric {
        field,
        value: raw.to_string(),
    })?;
    if !value.is_finite() {
        return Err(InputError::NonFinite { field, value });
    }
    Ok(value)
}

/// Recorded gender. Encoded as 1 = male, 0 = female in datasets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Female,
    Male,
}

impl Gender {
    /// Decode the dataset encoding (1 = male, 0 = female).
    #[must_use]
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(Self::Female),
            1 => Some(Self::Male),
            _ => None,
        }
    }

    #[must_use]
    pub fn code(self) -> u8 {
        match self {
            Self::Female => 0,
            Self::Male => 1,
        }
    }
}

/// Optional demographics. Used only to annotate alerts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Demographics {
    /// Age in years
    pub age: Option<f64>,
    pub gender: Option<Gender>,
}

/// A patient's measurements with optional identity and demographics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatientRecord {
    /// Local identifier, never part of the model input
    pub id: Option<String>,

    pub measurement: BaseMeasurement,

    #[serde(default)]
    pub demographics: Demographics,
}

impl PatientRecord {
    #[must_use]
    pub fn new(measurement: BaseMeasurement) -> Self {
        Self {
            id: None,
            measurement,
            demographics: Demographics::default(),
        }
    }

    #[must_use]
    pub fn with_demographics(mut self, demographics: Demographics) -> Self {
        self.demographics = demographics;
        self
    }
}

/// A measurement with its binary sepsis outcome, as used for training.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LabeledRecord {
    pub measurement: BaseMeasurement,

    /// `true` when the patient developed sepsis
    pub label: bool,
}

impl LabeledRecord {
    #[must_use]
    pub fn new(measurement: BaseMeasurement, label: bool) -> Self {
        Self { measurement, label }
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::BaseMeasurement;

    /// Healthy adult, every value inside its normal range.
    pub fn stable() -> BaseMeasurement {
        BaseMeasurement {
            heart_rate: 75.0,
            temperature: 36.8,
            resp_rate: 14.0,
            o2_sat: 98.0,
            sbp: 125.0,
            dbp: 75.0,
            map: 92.0,
            wbc: 7.2,
            platelets: 240.0,
            creatinine: 0.9,
            lactate: 1.1,
        }
    }

    /// Septic shock presentation.
    pub fn septic() -> BaseMeasurement {
        BaseMeasurement {
            heart_rate: 118.0,
            temperature: 38.8,
            resp_rate: 26.0,
            o2_sat: 89.0,
            sbp: 85.0,
            dbp: 52.0,
            map: 63.0,
            wbc: 16.5,
            platelets: 95.0,
            creatinine: 2.3,
            lactate: 4.2,
        }
    }
}
