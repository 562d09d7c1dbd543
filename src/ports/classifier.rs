//! Classifier port: anything that turns a standardized feature row into a
//! positive-class probability.

/// A fitted binary classifier.
///
/// Implementations must be immutable after fitting so a single instance can
/// be shared across threads.
pub trait Classifier: Send + Sync {
    /// Probability of the positive (septic) class, in `0.0..=1.0`.
    ///
    /// `row` must already be standardized.
    fn predict_proba(&self, row: &[f64]) -> f64;

    /// Probabilities for a batch of rows.
    fn predict_proba_batch(&self, rows: &[Vec<f64>]) -> Vec<f64> {
        rows.iter().map(|r| self.predict_proba(r)).collect()
    }
}
