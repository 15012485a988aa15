//! Inference Engine - model loading and the serving classifier
//!
//! Loads the persisted forest once per process. A missing artifact falls
//! back to the seed bootstrap; a present but unreadable or invalid artifact
//! is an error the caller must treat as fatal.

use std::collections::BTreeMap;
use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::forest::{ForestError, ForestParams, RandomForest};
use super::{Classification, ClassifyError, Classifier, Features, FEATURE_COUNT, FEATURE_NAMES};
use crate::models::Label;

// ============================================================================
// SEED BOOTSTRAP
// ============================================================================

/// Columns: temp, pressure, vibration, current
const SEED_FEATURES: [[f64; FEATURE_COUNT]; 4] = [
    [75.0, 100.0, 45.0, 12.0],
    [85.0, 120.0, 60.0, 15.0],
    [70.0, 95.0, 40.0, 11.0],
    [90.0, 130.0, 70.0, 18.0],
];

/// 0: normal, 1: anomalous
const SEED_LABELS: [u8; 4] = [0, 1, 0, 1];

// ============================================================================
// DATA STRUCTURES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelSource {
    /// Loaded from the persisted artifact
    Artifact,
    /// Trained at startup from the fixed seed set
    Seed,
}

/// Model status for the API
#[derive(Debug, Clone, Serialize)]
pub struct ModelStatus {
    pub source: ModelSource,
    pub model_path: String,
    pub digest: Option<String>,
    pub n_trees: usize,
    pub feature_importances: BTreeMap<&'static str, f64>,
    pub threshold: f64,
    pub inference_count: u64,
    pub avg_latency_us: f64,
    pub loaded_at: DateTime<Utc>,
}

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("failed to read model artifact {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: io::Error,
    },

    #[error("model artifact {path} is not a valid forest: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("model artifact {path} failed validation: {source}")]
    Invalid {
        path: String,
        #[source]
        source: ForestError,
    },

    #[error("seed model bootstrap failed: {0}")]
    Seed(#[from] ForestError),

    #[error("anomaly threshold {0} is outside 0.0..=1.0")]
    Threshold(f64),
}

/// Random forest classifier shared read-only by every caller.
pub struct ModelClassifier {
    forest: RandomForest,
    source: ModelSource,
    model_path: String,
    digest: Option<String>,
    threshold: f64,
    loaded_at: DateTime<Utc>,
    latency_sum_us: AtomicU64,
    inference_count: AtomicU64,
}

// ============================================================================
// LOADING
// ============================================================================

impl ModelClassifier {
    /// Load the artifact at `path`, or bootstrap the seed model if it does not exist.
    pub fn load(path: impl AsRef<Path>, threshold: f64) -> Result<Self, ModelError> {
        let path = path.as_ref();
        let path_str = path.display().to_string();
        check_threshold(threshold)?;

        tracing::info!("Loading model artifact from: {}", path_str);

        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                tracing::warn!(
                    "Model artifact {} not found - bootstrapping seed model (fixed training set, not meant to generalize)",
                    path_str
                );
                let mut classifier = Self::seed(threshold)?;
                classifier.model_path = path_str;
                return Ok(classifier);
            }
            Err(source) => return Err(ModelError::Io { path: path_str, source }),
        };

        let forest: RandomForest = serde_json::from_slice(&bytes)
            .map_err(|source| ModelError::Parse { path: path_str.clone(), source })?;
        forest
            .validate()
            .map_err(|source| ModelError::Invalid { path: path_str.clone(), source })?;

        let digest = format!("{:x}", Sha256::digest(&bytes));
        tracing::info!(
            "Model loaded: {} trees, sha256 {}",
            forest.trees.len(),
            digest
        );

        Ok(Self::new(forest, ModelSource::Artifact, path_str, Some(digest), threshold))
    }

    /// Train the seed forest. Deterministic across calls.
    pub fn seed(threshold: f64) -> Result<Self, ModelError> {
        check_threshold(threshold)?;
        let forest = RandomForest::fit(&SEED_FEATURES, &SEED_LABELS, &ForestParams::default())?;
        tracing::info!("Seed model trained: {} trees", forest.trees.len());

        Ok(Self::new(forest, ModelSource::Seed, "<seed>".to_string(), None, threshold))
    }

    fn new(
        forest: RandomForest,
        source: ModelSource,
        model_path: String,
        digest: Option<String>,
        threshold: f64,
    ) -> Self {
        Self {
            forest,
            source,
            model_path,
            digest,
            threshold,
            loaded_at: Utc::now(),
            latency_sum_us: AtomicU64::new(0),
            inference_count: AtomicU64::new(0),
        }
    }

    pub fn source(&self) -> ModelSource {
        self.source
    }

    #[cfg(test)]
    pub fn forest(&self) -> &RandomForest {
        &self.forest
    }
}

fn check_threshold(threshold: f64) -> Result<(), ModelError> {
    if (0.0..=1.0).contains(&threshold) {
        Ok(())
    } else {
        Err(ModelError::Threshold(threshold))
    }
}

// ============================================================================
// PREDICTION
// ============================================================================

impl Classifier for ModelClassifier {
    fn classify(&self, features: &Features) -> Result<Classification, ClassifyError> {
        features.validate()?;

        let start_time = Instant::now();
        let confidence = self.forest.predict_proba(&features.to_array());
        let label = if confidence > self.threshold {
            Label::Anomalous
        } else {
            Label::Normal
        };

        // Track metrics
        self.latency_sum_us
            .fetch_add(start_time.elapsed().as_micros() as u64, Ordering::Relaxed);
        self.inference_count.fetch_add(1, Ordering::Relaxed);

        Ok(Classification { label, confidence })
    }

    fn status(&self) -> Option<ModelStatus> {
        let sum = self.latency_sum_us.load(Ordering::Relaxed);
        let count = self.inference_count.load(Ordering::Relaxed);
        let avg = if count > 0 { sum as f64 / count as f64 } else { 0.0 };

        Some(ModelStatus {
            source: self.source,
            model_path: self.model_path.clone(),
            digest: self.digest.clone(),
            n_trees: self.forest.trees.len(),
            feature_importances: FEATURE_NAMES
                .into_iter()
                .zip(self.forest.feature_importances())
                .collect(),
            threshold: self.threshold,
            inference_count: count,
            avg_latency_us: avg,
            loaded_at: self.loaded_at,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
