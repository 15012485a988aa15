//! Ingestion cycle: decode → classify → store

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;

use crate::classifier::{ClassifyError, Classifier};
use crate::models::{PredictionResult, SensorReading, TelemetryMessage};
use crate::store::{LatestState, LatestStateStore};

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("malformed telemetry message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("classification failed: {0}")]
    Classify(#[from] ClassifyError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestOutcome {
    Stored { cycle: u64 },
    /// Older than the stored reading; only produced with the stale guard on
    Stale,
}

/// Sole writer of the [`LatestStateStore`].
pub struct IngestPipeline {
    classifier: Arc<dyn Classifier>,
    store: Arc<LatestStateStore>,
    reject_stale: bool,
}

impl IngestPipeline {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        store: Arc<LatestStateStore>,
        reject_stale: bool,
    ) -> Self {
        Self { classifier, store, reject_stale }
    }

    /// Run one ingestion cycle for a raw payload.
    pub fn ingest(&self, payload: &[u8]) -> Result<IngestOutcome, IngestError> {
        let reading = TelemetryMessage::decode(payload)?.into_reading(Utc::now());

        if self.reject_stale && self.is_stale(&reading) {
            return Ok(IngestOutcome::Stale);
        }

        let classification = self.classifier.classify(&reading.features())?;
        let result = PredictionResult::new(classification, reading.timestamp.clone());

        tracing::debug!(
            "Reading {} classified {:?} ({:.2})",
            reading.timestamp,
            result.label,
            result.confidence
        );

        let cycle = self.store.set(reading, result);
        Ok(IngestOutcome::Stored { cycle })
    }

    /// Strictly older than the stored reading. Unparseable timestamps are never
    /// stale, and neither is anything compared against a receive-time stamp.
    fn is_stale(&self, reading: &SensorReading) -> bool {
        let LatestState::Present(current) = self.store.get() else {
            return false;
        };
        if reading.stamped_on_receipt || current.reading.stamped_on_receipt {
            return false;
        }

        match (reading.parsed_timestamp(), current.reading.parsed_timestamp()) {
            (Some(incoming), Some(stored)) => incoming < stored,
            _ => false,
        }
    }
}
