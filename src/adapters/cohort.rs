//! Seeded synthetic training cohort.
//!
//! Septic and non-septic patients are drawn from per-class normal
//! distributions and clamped to physiologically plausible ranges. Useful
//! for bootstrapping a model when no labelled data is available, and in
//! tests.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rand_distr::{Distribution, Normal};

use super::dataset::DatasetRecord;
use crate::domain::{BaseMeasurement, Demographics, Gender, PatientRecord};
use crate::{Result, SepsisError};

/// Mean and standard deviation of one draw.
pub type Moments = (f64, f64);

/// Distribution parameters of one outcome class.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassParams {
    pub age: Moments,
    /// Probability of a male patient
    pub male_fraction: f64,
    pub heart_rate: Moments,
    pub temperature: Moments,
    pub resp_rate: Moments,
    pub sbp: Moments,
    pub map: Moments,
    pub wbc: Moments,
    pub lactate: Moments,
    pub platelets: Moments,
    pub creatinine: Moments,
    pub o2_sat: Moments,
}

pub const SEPTIC_PARAMS: ClassParams = ClassParams {
    age: (68.0, 15.0),
    male_fraction: 0.55,
    heart_rate: (110.0, 20.0),
    temperature: (38.5, 1.5),
    resp_rate: (24.0, 5.0),
    sbp: (92.0, 15.0),
    map: (65.0, 10.0),
    wbc: (14.0, 4.0),
    lactate: (3.5, 1.5),
    platelets: (120.0, 40.0),
    creatinine: (1.8, 0.8),
    o2_sat: (92.0, 4.0),
};

pub const NON_SEPTIC_PARAMS: ClassParams = ClassParams {
    age: (55.0, 18.0),
    male_fraction: 0.48,
    heart_rate: (80.0, 15.0),
    temperature: (37.0, 0.8),
    resp_rate: (16.0, 3.0),
    sbp: (120.0, 15.0),
    map: (80.0, 10.0),
    wbc: (8.0, 2.0),
    lactate: (1.2, 0.5),
    platelets: (220.0, 60.0),
    creatinine: (0.9, 0.3),
    o2_sat: (97.0, 2.0),
};

/// Ready-to-sample distributions of one outcome class.
#[derive(Debug, Clone, Copy)]
pub struct ClassProfile {
    pub age: Normal<f64>,
    pub male_fraction: f64,
    pub heart_rate: Normal<f64>,
    pub temperature: Normal<f64>,
    pub resp_rate: Normal<f64>,
    pub sbp: Normal<f64>,
    pub map: Normal<f64>,
    pub wbc: Normal<f64>,
    pub lactate: Normal<f64>,
    pub platelets: Normal<f64>,
    pub creatinine: Normal<f64>,
    pub o2_sat: Normal<f64>,
}

fn normal(name: &str, (mean, std_dev): Moments) -> Result<Normal<f64>> {
    Normal::new(mean, std_dev).map_err(|e| {
        SepsisError::Configuration(format!("invalid {name} distribution ({mean}, {std_dev}): {e}"))
    })
}

impl ClassProfile {
    /// # Errors
    /// Returns [`SepsisError::Configuration`] for a negative or non-finite
    /// standard deviation, or a male fraction outside `0..=1`.
    pub fn new(params: &ClassParams) -> Result<Self> {
        if !(0.0..=1.0).contains(&params.male_fraction) {
            return Err(SepsisError::Configuration(format!(
                "male fraction {} outside 0..=1",
                params.male_fraction
            )));
        }
        Ok(Self {
            age: normal("age", params.age)?,
            male_fraction: params.male_fraction,
            heart_rate: normal("HR", params.heart_rate)?,
            temperature: normal("Temp", params.temperature)?,
            resp_rate: normal("Resp", params.resp_rate)?,
            sbp: normal("SBP", params.sbp)?,
            map: normal("MAP", params.map)?,
            wbc: normal("WBC", params.wbc)?,
            lactate: normal("Lactate", params.lactate)?,
            platelets: normal("Platelets", params.platelets)?,
            creatinine: normal("Creatinine", params.creatinine)?,
            o2_sat: normal("O2Sat", params.o2_sat)?,
        })
    }
}

/// Cohort generation settings.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CohortConfig {
    pub patients: usize,
    /// Probability that a patient develops sepsis
    pub sepsis_rate: f64,
    pub seed: u64,
}

impl Default for CohortConfig {
    fn default() -> Self {
        Self {
            patients: 2000,
            sepsis_rate: 0.35,
            seed: 42,
        }
    }
}

/// Generate a labelled cohort. Patient ids are `P0001`, `P0002`, ...
///
/// # Errors
/// Returns [`SepsisError::Configuration`] if `sepsis_rate` lies outside
/// `0..=1`.
pub fn generate(config: &CohortConfig) -> Result<Vec<DatasetRecord>> {
    if !(0.0..=1.0).contains(&config.sepsis_rate) {
        return Err(SepsisError::Configuration(format!(
            "sepsis rate {} outside 0..=1",
            config.sepsis_rate
        )));
    }
    let septic_profile = ClassProfile::new(&SEPTIC_PARAMS)?;
    let non_septic_profile = ClassProfile::new(&NON_SEPTIC_PARAMS)?;
    let mut rng = ChaCha20Rng::seed_from_u64(config.seed);
    let records: Vec<DatasetRecord> = (1..=config.patients)
        .map(|n| {
            let septic = rng.gen::<f64>() < config.sepsis_rate;
            let profile = if septic {
                &septic_profile
            } else {
                &non_septic_profile
            };
            let mut patient = sample_patient(profile, &mut rng);
            patient.id = Some(format!("P{n:04}"));
            DatasetRecord::labeled(patient, septic)
        })
        .collect();

    let septic = records.iter().filter(|r| r.label == Some(true)).count();
    tracing::info!(
        "Generated cohort of {} patients ({} septic, seed {})",
        records.len(),
        septic,
        config.seed
    );
    Ok(records)
}

fn sample_patient<R: Rng>(profile: &ClassProfile, rng: &mut R) -> PatientRecord {
    let age = profile.age.sample(rng).trunc().clamp(18.0, 95.0);
    let gender = if rng.gen::<f64>() < profile.male_fraction {
        Gender::Male
    } else {
        Gender::Female
    };

    let heart_rate = profile.heart_rate.sample(rng);
    let temperature = profile.temperature.sample(rng);
    let resp_rate = profile.resp_rate.sample(rng);
    let sbp = profile.sbp.sample(rng);
    let map = profile.map.sample(rng);
    let wbc = profile.wbc.sample(rng);
    let lactate = profile.lactate.sample(rng);
    let platelets = profile.platelets.sample(rng);
    let creatinine = profile.creatinine.sample(rng);
    let o2_sat = profile.o2_sat.sample(rng);

    let measurement = BaseMeasurement {
        heart_rate: heart_rate.clamp(40.0, 180.0),
        temperature: temperature.clamp(34.0, 42.0),
        resp_rate: resp_rate.clamp(8.0, 40.0),
        o2_sat: o2_sat.clamp(70.0, 100.0),
        sbp: sbp.clamp(60.0, 200.0),
        // Derived from the unclamped systolic draw.
        dbp: (sbp - 40.0).clamp(30.0, 120.0),
        map: map.clamp(40.0, 140.0),
        wbc: wbc.clamp(1.0, 30.0),
        platelets: platelets.clamp(20.0, 500.0),
        creatinine: creatinine.clamp(0.3, 8.0),
        lactate: lactate.clamp(0.5, 10.0),
    };

    PatientRecord {
        id: None,
        measurement,
        demographics: Demographics {
            age: Some(age),
            gender: Some(gender),
        },
    }
}
