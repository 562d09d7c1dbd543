//! Model store port: persistence of fitted model bundles.
//!
//! This trait abstracts the on-disk format from training and inference.

use crate::model::FittedModel;

/// Persistent storage for one fitted model bundle.
pub trait ModelStore: Send + Sync {
    /// Error type for store operations.
    type Error: std::error::Error + Send + Sync + 'static;

    /// Persist a bundle, replacing any previous one.
    ///
    /// Either the complete bundle is written or the previous one is left
    /// untouched.
    ///
    /// # Errors
    /// Returns error if an artifact cannot be serialized or written.
    fn save(&self, model: &FittedModel) -> Result<(), Self::Error>;

    /// Load and validate the stored bundle.
    ///
    /// # Errors
    /// Returns error if the bundle is missing, tampered with, malformed or
    /// inconsistent with the current feature contract.
    fn load(&self) -> Result<FittedModel, Self::Error>;

    /// Whether a bundle is present.
    fn exists(&self) -> bool;
}
