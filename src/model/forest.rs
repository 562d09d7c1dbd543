//! Random forest: bootstrap-aggregated CART trees with random feature
//! subsets at every split.
//!
//! Trees are grown in parallel. Each tree receives its own seed drawn up
//! front from the forest seed, so the fitted forest depends only on the
//! data and [`ForestParams`], never on thread scheduling.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha20Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::tree::{DecisionTree, TrainingView, TreeParams};
use crate::ports::Classifier;

/// Size of the candidate feature subset drawn at each split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    /// `floor(sqrt(n_features))`, at least 1
    Sqrt,
    All,
    Fixed(usize),
}

impl MaxFeatures {
    #[must_use]
    pub fn resolve(self, n_features: usize) -> usize {
        let k = match self {
            Self::Sqrt => (n_features as f64).sqrt().floor() as usize,
            Self::All => n_features,
            Self::Fixed(k) => k,
        };
        k.clamp(1, n_features.max(1))
    }
}

/// Forest hyperparameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    /// Weight classes by `n_samples / (2 * n_class)`
    pub balanced_class_weight: bool,
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 200,
            max_depth: 20,
            min_samples_split: 5,
            min_samples_leaf: 2,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            balanced_class_weight: true,
            seed: 42,
        }
    }
}

/// A fitted random forest for binary classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    pub params: ForestParams,
    pub n_features: usize,
    pub trees: Vec<DecisionTree>,
    /// Mean decrease in impurity per feature, normalized to sum to 1
    pub feature_importances: Vec<f64>,
}

impl RandomForest {
    /// Fit a forest on standardized rows.
    ///
    /// # Errors
    /// Returns a message for empty or ragged input, a label count mismatch,
    /// a single-class label set or a zero tree count.
    pub fn fit(rows: &[Vec<f64>], labels: &[bool], params: ForestParams) -> Result<Self, String> {
        if rows.is_empty() {
            return Err("cannot fit a forest on zero samples".to_string());
        }
        if rows.len() != labels.len() {
            return Err(format!(
                "{} rows but {} labels",
                rows.len(),
                labels.len()
            ));
        }
        if params.n_trees == 0 {
            return Err("n_trees must be at least 1".to_string());
        }
        let n_features = rows[0].len();
        if n_features == 0 || rows.iter().any(|r| r.len() != n_features) {
            return Err("rows must share a non-zero width".to_string());
        }

        let positives = labels.iter().filter(|l| **l).count();
        let negatives = labels.len() - positives;
        if positives == 0 || negatives == 0 {
            return Err("both classes must be present".to_string());
        }

        let class_weight = if params.balanced_class_weight {
            let n = labels.len() as f64;
            [n / (2.0 * negatives as f64), n / (2.0 * positives as f64)]
        } else {
            [1.0, 1.0]
        };

        let tree_params = TreeParams {
            max_depth: params.max_depth,
            min_samples_split: params.min_samples_split,
            min_samples_leaf: params.min_samples_leaf,
            max_features: params.max_features.resolve(n_features),
        };

        let mut master = ChaCha20Rng::seed_from_u64(params.seed);
        let seeds: Vec<u64> = (0..params.n_trees).map(|_| master.gen()).collect();
        let data = TrainingView {
            rows,
            labels,
            class_weight,
        };

        tracing::debug!(
            "Fitting {} trees on {} samples x {} features (max_features={})",
            params.n_trees,
            rows.len(),
            n_features,
            tree_params.max_features
        );

        let fitted: Vec<(DecisionTree, Vec<f64>)> = seeds
            .par_iter()
            .map(|&seed| {
                let mut rng = ChaCha20Rng::seed_from_u64(seed);
                let n = data.rows.len();
                let samples: Vec<usize> = if params.bootstrap {
                    (0..n).map(|_| rng.gen_range(0..n)).collect()
                } else {
                    (0..n).collect()
                };
                let mut importances = vec![0.0; n_features];
                let tree = DecisionTree::fit(&data, samples, tree_params, &mut rng, &mut importances);
                (tree, importances)
            })
            .collect();

        let mut feature_importances = vec![0.0; n_features];
        let mut trees = Vec::with_capacity(fitted.len());
        for (tree, importances) in fitted {
            let total: f64 = importances.iter().sum();
            if total > 0.0 {
                for (acc, v) in feature_importances.iter_mut().zip(&importances) {
                    *acc += v / total;
                }
            }
            trees.push(tree);
        }
        let total: f64 = feature_importances.iter().sum();
        if total > 0.0 {
            for v in &mut feature_importances {
                *v /= total;
            }
        }

        Ok(Self {
            params,
            n_features,
            trees,
            feature_importances,
        })
    }

    /// Mean of the trees' leaf probabilities for the positive class.
    #[must_use]
    pub fn predict_proba(&self, row: &[f64]) -> f64 {
        debug_assert_eq!(row.len(), self.n_features);
        let sum: f64 = self.trees.iter().map(|t| t.predict_proba(row)).sum();
        sum / self.trees.len() as f64
    }

    /// Structural validity of a deserialized forest.
    pub(crate) fn check(&self) -> Result<(), String> {
        if self.trees.is_empty() {
            return Err("forest has no trees".to_string());
        }
        if self.feature_importances.len() != self.n_features {
            return Err(format!(
                "forest has {} importances for {} features",
                self.feature_importances.len(),
                self.n_features
            ));
        }
        for (i, tree) in self.trees.iter().enumerate() {
            if tree.n_features != self.n_features {
                return Err(format!("tree {i} width does not match the forest"));
            }
            tree.check().map_err(|e| format!("tree {i}: {e}"))?;
        }
        Ok(())
    }
}

impl Classifier for RandomForest {
    fn predict_proba(&self, row: &[f64]) -> f64 {
        RandomForest::predict_proba(self, row)
    }
}
