//! Sensor reading model

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classifier::Features;

/// One timestamped set of sensor measurements.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorReading {
    /// Chamber temperature (°C)
    pub temp: f64,
    /// Chamber pressure (psi)
    pub pressure: f64,
    /// Vibration frequency (Hz)
    pub vibration: f64,
    /// Motor current (A)
    pub current: f64,
    /// Publisher timestamp, verbatim
    pub timestamp: String,
    /// Set by the simulator only; never fed to the classifier
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_simulated_anomaly: Option<bool>,
    /// `timestamp` is our receive time, not the publisher's clock
    #[serde(skip)]
    pub stamped_on_receipt: bool,
}

/// Telemetry payload as published on the topic.
#[derive(Debug, Deserialize)]
pub struct TelemetryMessage {
    pub temp: f64,
    pub pressure: f64,
    pub vibration: f64,
    pub current: f64,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(default)]
    pub is_simulated_anomaly: Option<bool>,
}

impl TelemetryMessage {
    pub fn decode(payload: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(payload)
    }

    /// Build the reading, stamping it with `received_at` when the publisher sent no timestamp.
    pub fn into_reading(self, received_at: DateTime<Utc>) -> SensorReading {
        SensorReading {
            temp: self.temp,
            pressure: self.pressure,
            vibration: self.vibration,
            current: self.current,
            stamped_on_receipt: self.timestamp.is_none(),
            timestamp: self
                .timestamp
                .unwrap_or_else(|| received_at.to_rfc3339()),
            is_simulated_anomaly: self.is_simulated_anomaly,
        }
    }
}

impl SensorReading {
    pub fn features(&self) -> Features {
        Features {
            temp: self.temp,
            pressure: self.pressure,
            vibration: self.vibration,
            current: self.current,
        }
    }

    /// Parsed timestamp. Offset-less timestamps are taken as UTC.
    pub fn parsed_timestamp(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(&self.timestamp)
    }
}

pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}
