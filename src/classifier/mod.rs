//! Classifier Module - anomaly inference over sensor features
//!
//! The serving pipeline only sees the [`Classifier`] trait. The concrete
//! implementation is a random forest loaded once at startup, either from a
//! persisted artifact or from the seed bootstrap.

pub mod forest;
pub mod inference;

pub use inference::{ModelClassifier, ModelStatus};

use thiserror::Error;

use crate::models::Label;

/// Number of features per reading
pub const FEATURE_COUNT: usize = 4;

/// Feature order used by every model
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = ["temp", "pressure", "vibration", "current"];

/// Classifier input
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Features {
    pub temp: f64,
    pub pressure: f64,
    pub vibration: f64,
    pub current: f64,
}

impl Features {
    pub fn to_array(&self) -> [f64; FEATURE_COUNT] {
        [self.temp, self.pressure, self.vibration, self.current]
    }

    /// Shape check only. Physically implausible values are accepted.
    pub fn validate(&self) -> Result<(), ClassifyError> {
        for (name, value) in FEATURE_NAMES.iter().zip(self.to_array()) {
            if !value.is_finite() {
                return Err(ClassifyError::NonFinite { name: *name });
            }
        }
        Ok(())
    }
}

/// Classifier output
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub label: Label,
    /// Probability of `Anomalous`
    pub confidence: f64,
}

#[derive(Debug, Error, PartialEq)]
pub enum ClassifyError {
    #[error("feature `{name}` must be a finite number")]
    NonFinite { name: &'static str },
}

/// Read-only classification capability shared by the ingestion task and request handlers.
pub trait Classifier: Send + Sync {
    fn classify(&self, features: &Features) -> Result<Classification, ClassifyError>;

    /// Serving model details, if the implementation has any to report
    fn status(&self) -> Option<ModelStatus> {
        None
    }
}
