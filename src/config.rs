//! Configuration module

use std::env;
use std::time::Duration;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server bind address
    pub bind_addr: String,

    /// Server port
    pub port: u16,

    /// MQTT broker host
    pub mqtt_host: String,

    /// MQTT broker port
    pub mqtt_port: u16,

    /// Telemetry topic
    pub mqtt_topic: String,

    /// MQTT client identifier
    pub mqtt_client_id: String,

    /// MQTT keep-alive in seconds
    pub mqtt_keep_alive_secs: u64,

    /// First reconnect delay in milliseconds
    pub reconnect_min_ms: u64,

    /// Reconnect delay ceiling in milliseconds
    pub reconnect_max_ms: u64,

    /// Run the telemetry subscriber at all
    pub ingestion_enabled: bool,

    /// Persisted model artifact
    pub model_path: String,

    /// Anomaly probability above which a reading is labelled anomalous
    pub anomaly_threshold: f64,

    /// Drop readings older than the stored one
    pub reject_stale_readings: bool,

    /// Grace period for in-flight requests on shutdown
    pub shutdown_grace_secs: u64,

    /// Environment (development, production)
    pub environment: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            bind_addr: env::var("BIND_ADDR")
                .unwrap_or_else(|_| "0.0.0.0".to_string()),

            port: parse_var("PORT", 8100),

            mqtt_host: env::var("MQTT_HOST")
                .unwrap_or_else(|_| "localhost".to_string()),

            mqtt_port: parse_var("MQTT_PORT", 1883),

            mqtt_topic: env::var("MQTT_TOPIC")
                .unwrap_or_else(|_| "factory/semiconductor/sensor".to_string()),

            mqtt_client_id: env::var("MQTT_CLIENT_ID")
                .unwrap_or_else(|_| format!("sensor-anomaly-{}", uuid::Uuid::new_v4().simple())),

            mqtt_keep_alive_secs: parse_var("MQTT_KEEP_ALIVE_SECS", 60),

            reconnect_min_ms: parse_var("MQTT_RECONNECT_MIN_MS", 1_000),

            reconnect_max_ms: parse_var("MQTT_RECONNECT_MAX_MS", 30_000),

            ingestion_enabled: parse_flag("INGESTION_ENABLED", true),

            model_path: env::var("MODEL_PATH")
                .unwrap_or_else(|_| "models/anomaly_forest.json".to_string()),

            anomaly_threshold: parse_var("ANOMALY_THRESHOLD", 0.5),

            reject_stale_readings: parse_flag("REJECT_STALE_READINGS", false),

            shutdown_grace_secs: parse_var("SHUTDOWN_GRACE_SECS", 5),

            environment: env::var("ENVIRONMENT")
                .unwrap_or_else(|_| "development".to_string()),
        }
    }

    /// Check if running in production
    pub fn is_production(&self) -> bool {
        self.environment == "production"
    }

    pub fn keep_alive(&self) -> Duration {
        Duration::from_secs(self.mqtt_keep_alive_secs)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_secs)
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, default: T) -> T {
    parse_or(key, env::var(key).ok().as_deref(), default)
}

fn parse_flag(key: &str, default: bool) -> bool {
    flag_or(key, env::var(key).ok().as_deref(), default)
}

fn parse_or<T: std::str::FromStr>(key: &str, raw: Option<&str>, default: T) -> T {
    let Some(raw) = raw else {
        return default;
    };

    match raw.trim().parse() {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!("{}={:?} is not a valid value, using the default", key, raw);
            default
        }
    }
}

fn flag_or(key: &str, raw: Option<&str>, default: bool) -> bool {
    let Some(raw) = raw else {
        return default;
    };

    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => true,
        "false" | "0" | "no" | "off" => false,
        _ => {
            tracing::warn!("{}={:?} is not a recognised flag, using {}", key, raw, default);
            default
        }
    }
}

#[cfg(test)]
impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1".to_string(),
            port: 0,
            mqtt_host: "localhost".to_string(),
            mqtt_port: 1883,
            mqtt_topic: "factory/semiconductor/sensor".to_string(),
            mqtt_client_id: "sensor-anomaly-test".to_string(),
            mqtt_keep_alive_secs: 60,
            reconnect_min_ms: 1_000,
            reconnect_max_ms: 30_000,
            ingestion_enabled: false,
            model_path: "models/anomaly_forest.json".to_string(),
            anomaly_threshold: 0.5,
            reject_stale_readings: false,
            shutdown_grace_secs: 5,
            environment: "test".to_string(),
        }
    }
}
