//! Ports layer: Trait definitions for external operations.
//!
//! Following Hexagonal Architecture, these traits define the boundaries
//! between the pipeline and its collaborators (classifier, bundle storage).

mod classifier;
mod model_store;

pub use classifier::Classifier;
pub use model_store::ModelStore;
