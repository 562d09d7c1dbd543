//! The fitted model bundle: everything inference needs, validated together.

use crate::domain::{EngineeredFeatureVector, ScoringPolicy, FEATURE_CONTRACT_VERSION, FEATURE_NAMES};
use crate::{Result, SepsisError};

use super::{RandomForest, StandardScaler};

/// Scaler, classifier, ordered feature names, contract version and the
/// scoring policy the model was trained under.
///
/// Only constructible through [`FittedModel::from_parts`], so a value of
/// this type always matches the feature engine it was built against.
#[derive(Debug, Clone)]
pub struct FittedModel {
    scaler: StandardScaler,
    classifier: RandomForest,
    feature_names: Vec<String>,
    contract_version: u32,
    policy: ScoringPolicy,
}

impl FittedModel {
    /// Assemble and validate a bundle.
    ///
    /// # Errors
    /// Returns [`SepsisError::Configuration`] if the parts disagree with each
    /// other or with the current feature contract (names, order, version),
    /// or if the scaler, forest or policy is internally inconsistent.
    pub fn from_parts(
        scaler: StandardScaler,
        classifier: RandomForest,
        feature_names: Vec<String>,
        contract_version: u32,
        policy: ScoringPolicy,
    ) -> Result<Self> {
        if contract_version != FEATURE_CONTRACT_VERSION {
            return Err(SepsisError::Configuration(format!(
                "bundle uses feature contract v{contract_version}, engine provides v{FEATURE_CONTRACT_VERSION}"
            )));
        }
        if feature_names.len() != FEATURE_NAMES.len() {
            return Err(SepsisError::Configuration(format!(
                "bundle lists {} features, engine produces {}",
                feature_names.len(),
                FEATURE_NAMES.len()
            )));
        }
        if let Some((i, (got, want))) = feature_names
            .iter()
            .zip(FEATURE_NAMES)
            .enumerate()
            .find(|(_, (got, want))| got.as_str() != *want)
        {
            return Err(SepsisError::Configuration(format!(
                "feature {i} is '{got}' in the bundle but '{want}' in the engine"
            )));
        }

        scaler.check().map_err(SepsisError::Configuration)?;
        classifier.check().map_err(SepsisError::Configuration)?;
        if scaler.width() != feature_names.len() {
            return Err(SepsisError::Configuration(format!(
                "scaler width {} does not match {} features",
                scaler.width(),
                feature_names.len()
            )));
        }
        if classifier.n_features != feature_names.len() {
            return Err(SepsisError::Configuration(format!(
                "classifier width {} does not match {} features",
                classifier.n_features,
                feature_names.len()
            )));
        }
        policy
            .validate()
            .map_err(|problems| SepsisError::Configuration(problems.join("; ")))?;

        Ok(Self {
            scaler,
            classifier,
            feature_names,
            contract_version,
            policy,
        })
    }

    /// Confirm an engineered vector fits this bundle.
    ///
    /// # Errors
    /// Returns [`SepsisError::Configuration`] on a length mismatch.
    pub fn ensure_contract(&self, features: &EngineeredFeatureVector) -> Result<()> {
        if features.len() != self.feature_names.len() {
            return Err(SepsisError::Configuration(format!(
                "feature vector has {} values, model expects {}",
                features.len(),
                self.feature_names.len()
            )));
        }
        Ok(())
    }

    #[must_use]
    pub fn scaler(&self) -> &StandardScaler {
        &self.scaler
    }

    #[must_use]
    pub fn classifier(&self) -> &RandomForest {
        &self.classifier
    }

    #[must_use]
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    #[must_use]
    pub fn contract_version(&self) -> u32 {
        self.contract_version
    }

    #[must_use]
    pub fn policy(&self) -> &ScoringPolicy {
        &self.policy
    }

    /// Feature names paired with their importance, most important first.
    #[must_use]
    pub fn ranked_importances(&self) -> Vec<(String, f64)> {
        let mut ranked: Vec<(String, f64)> = self
            .feature_names
            .iter()
            .cloned()
            .zip(self.classifier.feature_importances.iter().copied())
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::domain::{feature_names, FEATURE_COUNT};
    use crate::model::{ForestParams, MaxFeatures};

    /// A small forest over 32 synthetic columns where column 0 carries the
    /// label.
    pub(crate) fn tiny_parts() -> (StandardScaler, RandomForest) {
        let rows: Vec<Vec<f64>> = (0..40)
            .map(|i| {
                let mut row = vec![0.0; FEATURE_COUNT];
                row[0] = i as f64;
                row[1] = (i % 7) as f64;
                row
            })
            .collect();
        let labels: Vec<bool> = (0..40).map(|i| i >= 25).collect();
        let scaler = StandardScaler::fit(&rows).expect("scaler fits");
        let scaled = scaler.transform_all(&rows);
        let forest = RandomForest::fit(
            &scaled,
            &labels,
            ForestParams {
                n_trees: 5,
                max_features: MaxFeatures::All,
                ..ForestParams::default()
            },
        )
        .expect("forest fits");
        (scaler, forest)
    }

    pub(crate) fn tiny_model() -> FittedModel {
        let (scaler, forest) = tiny_parts();
        FittedModel::from_parts(
            scaler,
            forest,
            feature_names(),
            FEATURE_CONTRACT_VERSION,
            ScoringPolicy::default(),
        )
        .expect("consistent bundle")
    }
}
