//! Training service: labelled records in, validated model bundle out.
//!
//! Per run:
//! 1. Engineer features for every record under the configured policy
//! 2. Stratified train/test split
//! 3. Fit the scaler on the training split, transform both splits
//! 4. SMOTE on the training split only
//! 5. Fit the random forest
//! 6. Evaluate on the held-out split
//!
//! Cross-validation repeats steps 3 to 6 for every fold.

use std::collections::HashSet;
use std::time::Instant;

use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use serde::{Deserialize, Serialize};

use crate::domain::{
    compute_clinical_scores_with, engineer_features_with, feature_names, LabeledRecord,
    ScoringPolicy, DECISION_THRESHOLD, FEATURE_CONTRACT_VERSION,
};
use crate::model::{EvaluationMetrics, FittedModel, ForestParams, RandomForest, Smote, StandardScaler};
use crate::{Result, SepsisError};

/// Training hyperparameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    pub forest: ForestParams,
    /// Fraction of each class held out for evaluation
    pub test_fraction: f64,
    pub smote_k: usize,
    /// Skip SMOTE entirely when false
    pub oversample: bool,
    pub cv_folds: usize,
    /// Seed for the split and for SMOTE
    pub seed: u64,
    pub policy: ScoringPolicy,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            forest: ForestParams::default(),
            test_fraction: 0.2,
            smote_k: 5,
            oversample: true,
            cv_folds: 5,
            seed: 42,
            policy: ScoringPolicy::default(),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse::<T>().ok())
}

impl TrainingConfig {
    /// Defaults with best-effort overrides from `SEPSIGUARD_*` variables.
    /// Unparsable or out-of-range values are ignored.
    #[must_use]
    pub fn from_env_or_default() -> Self {
        let mut cfg = Self::default();

        if let Some(n) = env_parse::<usize>("SEPSIGUARD_N_TREES").filter(|&n| n > 0) {
            cfg.forest.n_trees = n;
        }
        if let Some(d) = env_parse::<usize>("SEPSIGUARD_MAX_DEPTH").filter(|&d| d > 0) {
            cfg.forest.max_depth = d;
        }
        if let Some(seed) = env_parse::<u64>("SEPSIGUARD_SEED") {
            cfg.seed = seed;
            cfg.forest.seed = seed;
        }
        if let Some(f) =
            env_parse::<f64>("SEPSIGUARD_TEST_FRACTION").filter(|f| f.is_finite() && (0.0..1.0).contains(f))
        {
            cfg.test_fraction = f;
        }
        if let Some(k) = env_parse::<usize>("SEPSIGUARD_SMOTE_K").filter(|&k| k > 0) {
            cfg.smote_k = k;
        }
        if let Some(folds) = env_parse::<usize>("SEPSIGUARD_CV_FOLDS").filter(|&f| f >= 2) {
            cfg.cv_folds = folds;
        }

        cfg
    }
}

/// Summary of one training run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub total_samples: usize,
    pub positives: usize,
    pub train_samples: usize,
    /// Training rows after oversampling
    pub resampled_samples: usize,
    pub test_samples: usize,
    pub metrics: EvaluationMetrics,
    /// Feature name and mean decrease in impurity, most important first
    pub feature_importances: Vec<(String, f64)>,
    pub elapsed_ms: u128,
}

impl TrainingReport {
    #[must_use]
    pub fn top_features(&self, n: usize) -> &[(String, f64)] {
        &self.feature_importances[..n.min(self.feature_importances.len())]
    }
}

/// A trained model with its evaluation.
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub model: FittedModel,
    pub report: TrainingReport,
}

/// Per-fold and mean cross-validation metrics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossValidation {
    pub folds: Vec<EvaluationMetrics>,
    pub mean: EvaluationMetrics,
}

/// Engineer one feature row per record, in record order.
///
/// # Errors
/// Returns [`SepsisError::Training`] naming the record and feature of the
/// first non-finite engineered value.
pub fn build_feature_matrix(
    records: &[LabeledRecord],
    policy: &ScoringPolicy,
) -> Result<(Vec<Vec<f64>>, Vec<bool>)> {
    let mut rows = Vec::with_capacity(records.len());
    let mut labels = Vec::with_capacity(records.len());
    for (i, record) in records.iter().enumerate() {
        let scores = compute_clinical_scores_with(&record.measurement, policy);
        let features = engineer_features_with(&record.measurement, &scores, policy);
        if let Some((_, name)) = features.first_non_finite() {
            return Err(SepsisError::Training(format!(
                "record {i}: feature '{name}' is not finite"
            )));
        }
        rows.push(features.as_slice().to_vec());
        labels.push(record.label);
    }
    Ok((rows, labels))
}

fn class_indices(labels: &[bool], class: bool) -> Vec<usize> {
    labels
        .iter()
        .enumerate()
        .filter(|(_, l)| **l == class)
        .map(|(i, _)| i)
        .collect()
}

/// Stratified train/test split. Returns sorted `(train, test)` indices.
///
/// Each class contributes `round(n_class * test_fraction)` rows to the test
/// set, but always leaves at least one row of each class for training.
#[must_use]
pub fn stratified_split(labels: &[bool], test_fraction: f64, seed: u64) -> (Vec<usize>, Vec<usize>) {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let mut train = Vec::new();
    let mut test = Vec::new();
    for class in [false, true] {
        let mut idx = class_indices(labels, class);
        idx.shuffle(&mut rng);
        let n_test = ((idx.len() as f64 * test_fraction).round() as usize).min(idx.len().saturating_sub(1));
        test.extend_from_slice(&idx[..n_test]);
        train.extend_from_slice(&idx[n_test..]);
    }
    train.sort_unstable();
    test.sort_unstable();
    (train, test)
}

/// Stratified k-fold assignment. Returns the sorted test indices of each
/// fold; the training set of fold `i` is everything else. Zero folds yield
/// no assignments.
#[must_use]
pub fn stratified_folds(labels: &[bool], folds: usize, seed: u64) -> Vec<Vec<usize>> {
    if folds == 0 {
        return Vec::new();
    }
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    let mut out = vec![Vec::new(); folds];
    for class in [false, true] {
        let mut idx = class_indices(labels, class);
        idx.shuffle(&mut rng);
        for (n, i) in idx.into_iter().enumerate() {
            out[n % folds].push(i);
        }
    }
    for fold in &mut out {
        fold.sort_unstable();
    }
    out
}

fn select<T: Clone>(items: &[T], idx: &[usize]) -> Vec<T> {
    idx.iter().map(|&i| items[i].clone()).collect()
}

fn ensure_two_classes(labels: &[bool]) -> Result<usize> {
    if labels.is_empty() {
        return Err(SepsisError::Training("no training records".to_string()));
    }
    let positives = labels.iter().filter(|l| **l).count();
    if positives == 0 || positives == labels.len() {
        return Err(SepsisError::Training(format!(
            "training data needs both classes, got {} positive of {}",
            positives,
            labels.len()
        )));
    }
    Ok(positives)
}

/// Orchestrates model fitting and evaluation.
#[derive(Debug, Clone, Default)]
pub struct TrainingService {
    config: TrainingConfig,
}

struct FoldFit {
    scaler: StandardScaler,
    forest: RandomForest,
    resampled: usize,
    metrics: EvaluationMetrics,
}

impl TrainingService {
    #[must_use]
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Scaler, SMOTE and forest on one training split, evaluated on `test`.
    fn fit_fold(
        &self,
        rows: &[Vec<f64>],
        labels: &[bool],
        train: &[usize],
        test: &[usize],
    ) -> Result<FoldFit> {
        let train_rows = select(rows, train);
        let train_labels = select(labels, train);

        let scaler = StandardScaler::fit(&train_rows).map_err(SepsisError::Training)?;
        let scaled_train = scaler.transform_all(&train_rows);

        let (fit_rows, fit_labels) = if self.config.oversample {
            Smote::new(self.config.smote_k, self.config.seed).fit_resample(&scaled_train, &train_labels)
        } else {
            (scaled_train, train_labels)
        };
        tracing::debug!(
            "Fitting on {} rows ({} after oversampling)",
            train.len(),
            fit_rows.len()
        );

        let forest = RandomForest::fit(&fit_rows, &fit_labels, self.config.forest)
            .map_err(SepsisError::Training)?;

        let test_rows = scaler.transform_all(&select(rows, test));
        let test_labels = select(labels, test);
        let metrics = EvaluationMetrics::evaluate(&forest, &test_rows, &test_labels, DECISION_THRESHOLD);

        Ok(FoldFit {
            scaler,
            forest,
            resampled: fit_rows.len(),
            metrics,
        })
    }

    /// Train a model on `records` and evaluate it on a held-out split.
    ///
    /// # Errors
    /// Returns [`SepsisError::Training`] for empty or single-class input or
    /// non-finite features, and [`SepsisError::Configuration`] if the fitted
    /// parts do not form a consistent bundle.
    pub fn train(&self, records: &[LabeledRecord]) -> Result<TrainingOutcome> {
        let start = Instant::now();
        let policy = &self.config.policy;
        policy
            .validate()
            .map_err(|problems| SepsisError::Configuration(problems.join("; ")))?;

        let (rows, labels) = build_feature_matrix(records, policy)?;
        let positives = ensure_two_classes(&labels)?;
        tracing::info!(
            "Training on {} records ({} septic) with policy {}",
            records.len(),
            positives,
            policy.version
        );

        let (train, test) = stratified_split(&labels, self.config.test_fraction, self.config.seed);
        if test.is_empty() {
            tracing::warn!("Held-out split is empty; evaluation metrics will be zero");
        }

        let fit = self.fit_fold(&rows, &labels, &train, &test)?;
        let model = FittedModel::from_parts(
            fit.scaler,
            fit.forest,
            feature_names(),
            FEATURE_CONTRACT_VERSION,
            policy.clone(),
        )?;

        let report = TrainingReport {
            total_samples: records.len(),
            positives,
            train_samples: train.len(),
            resampled_samples: fit.resampled,
            test_samples: test.len(),
            metrics: fit.metrics,
            feature_importances: model.ranked_importances(),
            elapsed_ms: start.elapsed().as_millis(),
        };

        tracing::info!(
            "Training complete: accuracy={:.3} precision={:.3} recall={:.3} f1={:.3} roc_auc={}",
            report.metrics.accuracy,
            report.metrics.precision,
            report.metrics.recall,
            report.metrics.f1,
            report
                .metrics
                .roc_auc
                .map_or_else(|| "n/a".to_string(), |v| format!("{v:.3}"))
        );

        Ok(TrainingOutcome { model, report })
    }

    /// Stratified k-fold cross-validation with the same per-fold protocol
    /// as [`TrainingService::train`].
    ///
    /// # Errors
    /// Returns [`SepsisError::Training`] if `folds < 2`, if a class has fewer
    /// records than folds, or for the same data problems as `train`.
    pub fn cross_validate(&self, records: &[LabeledRecord], folds: usize) -> Result<CrossValidation> {
        if folds < 2 {
            return Err(SepsisError::Training(format!(
                "cross-validation needs at least 2 folds, got {folds}"
            )));
        }
        let (rows, labels) = build_feature_matrix(records, &self.config.policy)?;
        let positives = ensure_two_classes(&labels)?;
        let smallest = positives.min(labels.len() - positives);
        if smallest < folds {
            return Err(SepsisError::Training(format!(
                "smallest class has {smallest} records, fewer than {folds} folds"
            )));
        }

        let assignments = stratified_folds(&labels, folds, self.config.seed);
        let mut results = Vec::with_capacity(folds);
        for (k, test) in assignments.iter().enumerate() {
            let held_out: HashSet<usize> = test.iter().copied().collect();
            let train: Vec<usize> = (0..labels.len()).filter(|i| !held_out.contains(i)).collect();
            let fit = self.fit_fold(&rows, &labels, &train, test)?;
            tracing::debug!("Fold {}/{}: f1={:.3}", k + 1, folds, fit.metrics.f1);
            results.push(fit.metrics);
        }

        let mean = EvaluationMetrics::mean(&results)
            .ok_or_else(|| SepsisError::Training("no folds evaluated".to_string()))?;
        tracing::info!("Cross-validation ({folds} folds): mean f1={:.3}", mean.f1);
        Ok(CrossValidation {
            folds: results,
            mean,
        })
    }
}

/// Train with an explicit configuration.
///
/// # Errors
/// See [`TrainingService::train`].
pub fn train(records: &[LabeledRecord], config: &TrainingConfig) -> Result<TrainingOutcome> {
    TrainingService::new(config.clone()).train(records)
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::adapters::cohort::{generate, CohortConfig};
    use crate::adapters::dataset::labeled_records;
    use crate::model::MaxFeatures;
    use std::sync::OnceLock;

    pub(crate) fn cohort(patients: usize, seed: u64) -> Vec<LabeledRecord> {
        let records = generate(&CohortConfig {
            patients,
            seed,
            ..CohortConfig::default()
        })
        .expect("cohort generates");
        labeled_records(&records).expect("cohort is labelled")
    }

    /// A model trained once on a 1000-patient cohort and shared by tests.
    pub(crate) fn trained_model() -> &'static FittedModel {
        static MODEL: OnceLock<FittedModel> = OnceLock::new();
        MODEL.get_or_init(|| {
            TrainingService::new(quick_config())
                .train(&cohort(1000, 42))
                .expect("cohort trains")
                .model
        })
    }

    /// Small, fast configuration for tests.
    pub(crate) fn quick_config() -> TrainingConfig {
        TrainingConfig {
            forest: ForestParams {
                n_trees: 25,
                max_depth: 8,
                max_features: MaxFeatures::Fixed(8),
                ..ForestParams::default()
            },
            ..TrainingConfig::default()
        }
    }
}
