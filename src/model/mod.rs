//! Model layer: preprocessing, oversampling, the random-forest classifier,
//! evaluation metrics and the fitted bundle.

mod bundle;
pub mod forest;
pub mod metrics;
pub mod scaler;
pub mod smote;
pub mod tree;

pub use bundle::FittedModel;
#[cfg(test)]
pub(crate) use bundle::test_support;
pub use forest::{ForestParams, MaxFeatures, RandomForest};
pub use metrics::{roc_auc, ConfusionMatrix, EvaluationMetrics};
pub use scaler::StandardScaler;
pub use smote::Smote;
pub use tree::{DecisionTree, Node, TreeParams};
