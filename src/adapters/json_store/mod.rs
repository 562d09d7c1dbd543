//! JSON bundle store.
//!
//! A bundle is a directory:
//!
//! ```text
//! model/
//!   scaler.json      StandardScaler
//!   classifier.json  RandomForest
//!   features.json    ordered feature names, contract version, scoring policy
//!   manifest.json    format version, creation time, SHA-256 of each artifact
//! ```
//!
//! Saving writes a complete staging directory next to the target and renames
//! it into place, so readers see either the old bundle or the new one. Loading
//! verifies every hash listed in the manifest before parsing an artifact, then
//! rebuilds the model through [`FittedModel::from_parts`].

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::domain::ScoringPolicy;
use crate::model::{FittedModel, RandomForest, StandardScaler};
use crate::ports::ModelStore;
use crate::SepsisError;

/// Version of the on-disk layout, independent of the feature contract.
pub const BUNDLE_FORMAT_VERSION: u32 = 1;

const SCALER_FILE: &str = "scaler.json";
const CLASSIFIER_FILE: &str = "classifier.json";
const FEATURES_FILE: &str = "features.json";
const MANIFEST_FILE: &str = "manifest.json";
const ARTIFACTS: [&str; 3] = [SCALER_FILE, CLASSIFIER_FILE, FEATURES_FILE];

/// Error type for bundle store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed artifact {file}: {reason}")]
    Malformed { file: String, reason: String },

    #[error("Manifest does not list {0}")]
    MissingArtifact(String),

    #[error("Hash mismatch for {0}")]
    HashMismatch(String),

    #[error("Unsupported bundle format version {0}")]
    UnsupportedFormat(u32),

    #[error("No model bundle at {0}")]
    NotFound(PathBuf),
}

impl StoreError {
    fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct FeatureSpec {
    names: Vec<String>,
    contract_version: u32,
    policy: ScoringPolicy,
}

#[derive(Debug, Serialize, Deserialize)]
struct Manifest {
    format_version: u32,
    created_at: DateTime<Utc>,
    contract_version: u32,
    /// Artifact file name to lowercase hex SHA-256
    files: BTreeMap<String, String>,
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect()
}

fn to_json<T: Serialize>(file: &str, value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec_pretty(value).map_err(|e| StoreError::Malformed {
        file: file.to_string(),
        reason: e.to_string(),
    })
}

fn from_json<T: DeserializeOwned>(file: &str, bytes: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(bytes).map_err(|e| StoreError::Malformed {
        file: file.to_string(),
        reason: e.to_string(),
    })
}

/// Directory-backed [`ModelStore`].
#[derive(Debug, Clone)]
pub struct JsonModelStore {
    dir: PathBuf,
}

impl JsonModelStore {
    #[must_use]
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let name = self
            .dir
            .file_name()
            .map_or_else(|| "model".into(), |n| n.to_string_lossy().into_owned());
        let parent = self.dir.parent().unwrap_or_else(|| Path::new("."));
        parent.join(format!(".{name}.{suffix}-{}", std::process::id()))
    }

    fn write_bundle(&self, model: &FittedModel) -> Result<(), StoreError> {
        let spec = FeatureSpec {
            names: model.feature_names().to_vec(),
            contract_version: model.contract_version(),
            policy: model.policy().clone(),
        };
        let artifacts = [
            (SCALER_FILE, to_json(SCALER_FILE, model.scaler())?),
            (CLASSIFIER_FILE, to_json(CLASSIFIER_FILE, model.classifier())?),
            (FEATURES_FILE, to_json(FEATURES_FILE, &spec)?),
        ];

        if let Some(parent) = self.dir.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| StoreError::io(parent, e))?;
        }

        let staging = self.sibling("staging");
        if staging.exists() {
            fs::remove_dir_all(&staging).map_err(|e| StoreError::io(&staging, e))?;
        }
        fs::create_dir(&staging).map_err(|e| StoreError::io(&staging, e))?;

        let result = (|| {
            let mut files = BTreeMap::new();
            for (name, bytes) in &artifacts {
                let path = staging.join(name);
                fs::write(&path, bytes).map_err(|e| StoreError::io(&path, e))?;
                files.insert((*name).to_string(), sha256_hex(bytes));
            }
            let manifest = Manifest {
                format_version: BUNDLE_FORMAT_VERSION,
                created_at: Utc::now(),
                contract_version: model.contract_version(),
                files,
            };
            let path = staging.join(MANIFEST_FILE);
            fs::write(&path, to_json(MANIFEST_FILE, &manifest)?)
                .map_err(|e| StoreError::io(&path, e))?;
            self.swap_in(&staging)
        })();

        if result.is_err() && staging.exists() {
            if let Err(e) = fs::remove_dir_all(&staging) {
                tracing::warn!("Failed to clean up staging directory {:?}: {e}", staging);
            }
        }
        result
    }

    /// Replace the target directory with `staging`.
    fn swap_in(&self, staging: &Path) -> Result<(), StoreError> {
        if !self.dir.exists() {
            return fs::rename(staging, &self.dir).map_err(|e| StoreError::io(&self.dir, e));
        }

        let previous = self.sibling("previous");
        if previous.exists() {
            fs::remove_dir_all(&previous).map_err(|e| StoreError::io(&previous, e))?;
        }
        fs::rename(&self.dir, &previous).map_err(|e| StoreError::io(&self.dir, e))?;
        if let Err(e) = fs::rename(staging, &self.dir) {
            // Put the old bundle back before reporting.
            if let Err(restore) = fs::rename(&previous, &self.dir) {
                tracing::error!("Failed to restore previous bundle: {restore}");
            }
            return Err(StoreError::io(&self.dir, e));
        }
        if let Err(e) = fs::remove_dir_all(&previous) {
            tracing::warn!("Failed to remove previous bundle {:?}: {e}", previous);
        }
        Ok(())
    }

    fn read(&self, file: &str) -> Result<Vec<u8>, StoreError> {
        let path = self.dir.join(file);
        fs::read(&path).map_err(|e| StoreError::io(&path, e))
    }

    fn read_verified(&self, manifest: &Manifest, file: &str) -> Result<Vec<u8>, StoreError> {
        let expected = manifest
            .files
            .get(file)
            .ok_or_else(|| StoreError::MissingArtifact(file.to_string()))?;
        let bytes = self.read(file)?;
        if !sha256_hex(&bytes).eq_ignore_ascii_case(expected) {
            return Err(StoreError::HashMismatch(file.to_string()));
        }
        Ok(bytes)
    }
}

impl ModelStore for JsonModelStore {
    type Error = SepsisError;

    fn save(&self, model: &FittedModel) -> Result<(), SepsisError> {
        self.write_bundle(model)?;
        tracing::info!(
            "Saved model bundle ({} trees, contract v{}) to {:?}",
            model.classifier().trees.len(),
            model.contract_version(),
            self.dir
        );
        Ok(())
    }

    fn load(&self) -> Result<FittedModel, SepsisError> {
        if !self.exists() {
            return Err(StoreError::NotFound(self.dir.clone()).into());
        }

        let manifest: Manifest = from_json(MANIFEST_FILE, &self.read(MANIFEST_FILE)?)?;
        if manifest.format_version != BUNDLE_FORMAT_VERSION {
            return Err(StoreError::UnsupportedFormat(manifest.format_version).into());
        }
        for file in ARTIFACTS {
            if !manifest.files.contains_key(file) {
                return Err(StoreError::MissingArtifact(file.to_string()).into());
            }
        }

        let scaler: StandardScaler =
            from_json(SCALER_FILE, &self.read_verified(&manifest, SCALER_FILE)?)?;
        let classifier: RandomForest =
            from_json(CLASSIFIER_FILE, &self.read_verified(&manifest, CLASSIFIER_FILE)?)?;
        let spec: FeatureSpec = from_json(FEATURES_FILE, &self.read_verified(&manifest, FEATURES_FILE)?)?;

        if spec.contract_version != manifest.contract_version {
            return Err(SepsisError::Configuration(format!(
                "manifest declares contract v{} but features.json declares v{}",
                manifest.contract_version, spec.contract_version
            )));
        }

        let model = FittedModel::from_parts(
            scaler,
            classifier,
            spec.names,
            spec.contract_version,
            spec.policy,
        )?;
        tracing::info!(
            "Loaded model bundle created {} (contract v{})",
            manifest.created_at.format("%Y-%m-%d %H:%M:%S UTC"),
            model.contract_version()
        );
        Ok(model)
    }

    fn exists(&self) -> bool {
        self.dir.join(MANIFEST_FILE).is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::test_support::tiny_model;
    use tempfile::TempDir;

    fn store() -> (TempDir, JsonModelStore) {
        let tmp = TempDir::new().expect("temp dir");
        let store = JsonModelStore::new(tmp.path().join("model"));
        (tmp, store)
    }

    fn rewrite_manifest(store: &JsonModelStore, edit: impl FnOnce(&mut Manifest)) {
        let path = store.dir().join(MANIFEST_FILE);
        let mut manifest: Manifest = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        edit(&mut manifest);
        fs::write(&path, serde_json::to_vec(&manifest).unwrap()).unwrap();
    }

    #[test]
    fn test_save_load_roundtrip() {
        let (_tmp, store) = store();
        let model = tiny_model();
        assert!(!store.exists());
        store.save(&model).expect("save");
        assert!(store.exists());

        let loaded = store.load().expect("load");
        assert_eq!(loaded.feature_names(), model.feature_names());
        assert_eq!(loaded.scaler(), model.scaler());
        assert_eq!(loaded.classifier(), model.classifier());
        assert_eq!(loaded.policy(), model.policy());
    }

    #[test]
    fn test_save_replaces_existing_bundle() {
        let (tmp, store) = store();
        store.save(&tiny_model()).unwrap();
        store.save(&tiny_model()).unwrap();
        assert!(store.load().is_ok());

        // Only the bundle itself remains; staging and backup are gone.
        let entries: Vec<_> = fs::read_dir(tmp.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_missing_bundle_is_not_found() {
        let (_tmp, store) = store();
        let err = store.load().unwrap_err();
        assert!(matches!(err, SepsisError::Store(StoreError::NotFound(_))));
    }

    #[test]
    fn test_tampered_artifact_is_detected() {
        let (_tmp, store) = store();
        store.save(&tiny_model()).unwrap();

        let path = store.dir().join(SCALER_FILE);
        let mut scaler: StandardScaler = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        scaler.mean[0] += 1.0;
        fs::write(&path, serde_json::to_vec_pretty(&scaler).unwrap()).unwrap();

        let err = store.load().unwrap_err();
        match err {
            SepsisError::Store(StoreError::HashMismatch(file)) => assert_eq!(file, SCALER_FILE),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn test_thirty_one_feature_names_is_configuration_error() {
        let (_tmp, store) = store();
        store.save(&tiny_model()).unwrap();

        // Rewrite features.json consistently (hash updated) but with a
        // truncated feature list.
        let path = store.dir().join(FEATURES_FILE);
        let mut spec: FeatureSpec = serde_json::from_slice(&fs::read(&path).unwrap()).unwrap();
        spec.names.pop();
        assert_eq!(spec.names.len(), 31);
        let bytes = serde_json::to_vec_pretty(&spec).unwrap();
        fs::write(&path, &bytes).unwrap();
        rewrite_manifest(&store, |m| {
            m.files.insert(FEATURES_FILE.to_string(), sha256_hex(&bytes));
        });

        let err = store.load().unwrap_err();
        assert!(matches!(err, SepsisError::Configuration(_)), "{err:?}");
    }

    #[test]
    fn test_unsupported_format_version() {
        let (_tmp, store) = store();
        store.save(&tiny_model()).unwrap();
        rewrite_manifest(&store, |m| m.format_version = 99);
        let err = store.load().unwrap_err();
        assert!(matches!(
            err,
            SepsisError::Store(StoreError::UnsupportedFormat(99))
        ));
    }

    #[test]
    fn test_manifest_must_list_every_artifact() {
        let (_tmp, store) = store();
        store.save(&tiny_model()).unwrap();
        rewrite_manifest(&store, |m| {
            m.files.remove(CLASSIFIER_FILE);
        });
        let err = store.load().unwrap_err();
        assert!(matches!(
            err,
            SepsisError::Store(StoreError::MissingArtifact(_))
        ));
    }

    #[test]
    fn test_malformed_manifest() {
        let (_tmp, store) = store();
        store.save(&tiny_model()).unwrap();
        fs::write(store.dir().join(MANIFEST_FILE), b"{not json").unwrap();
        let err = store.load().unwrap_err();
        assert!(matches!(err, SepsisError::Store(StoreError::Malformed { .. })));
    }
}
