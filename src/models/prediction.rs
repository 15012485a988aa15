//! Prediction models

use serde::{Deserialize, Serialize};

use crate::classifier::{Classification, Features};
use super::SensorReading;

/// Binary classification outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Label {
    Normal,
    Anomalous,
}

impl Label {
    /// Integer class used on the wire: 0 = normal, 1 = anomalous
    pub fn class(self) -> u8 {
        match self {
            Label::Normal => 0,
            Label::Anomalous => 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub label: Label,
    /// Probability of `Anomalous`, 0.0 - 1.0
    pub confidence: f64,
    pub timestamp: String,
}

impl PredictionResult {
    pub fn new(classification: Classification, timestamp: String) -> Self {
        Self {
            label: classification.label,
            confidence: classification.confidence,
            timestamp,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub temp: f64,
    pub pressure: f64,
    pub vibration: f64,
    pub current: f64,
}

impl PredictRequest {
    pub fn features(&self) -> Features {
        Features {
            temp: self.temp,
            pressure: self.pressure,
            vibration: self.vibration,
            current: self.current,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub prediction: u8,
    pub confidence: f64,
}

#[derive(Debug, Serialize)]
pub struct LatestResponse {
    pub sensor: SensorReading,
    pub prediction: PredictionResult,
    pub cycle: u64,
}
