//! Adapters layer: Concrete implementations of ports and data sources.
//!
//! - `json_store`: directory-backed, hash-verified model bundles
//! - `dataset`: CSV training data
//! - `cohort`: seeded synthetic cohort generator
//! - `sanitize`: redaction of identifiers and raw values in logs

pub mod cohort;
pub mod dataset;
pub mod json_store;
pub mod sanitize;

pub use cohort::{generate as generate_cohort, CohortConfig};
pub use dataset::{labeled_records, read_csv, write_csv, DatasetRecord};
pub use json_store::{JsonModelStore, StoreError};
