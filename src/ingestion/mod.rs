//! Ingestion Module - telemetry topic → classifier → latest-state store
//!
//! The subscriber runs on its own tokio task. Broker failures stay inside
//! that task: it backs off and reconnects while the HTTP side keeps serving.

pub mod pipeline;
pub mod subscriber;

pub use pipeline::IngestPipeline;
pub use subscriber::{Backoff, Subscriber};

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use rumqttc::MqttOptions;
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::Config;

/// Subscriber state visible to the health endpoint
#[derive(Debug, Default)]
pub struct IngestionStatus {
    broker_connected: AtomicBool,
    messages_received: AtomicU64,
    messages_dropped: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestionStats {
    pub broker_connected: bool,
    pub messages_received: u64,
    pub messages_dropped: u64,
}

impl IngestionStatus {
    pub fn is_connected(&self) -> bool {
        self.broker_connected.load(Ordering::Relaxed)
    }

    pub(crate) fn set_connected(&self, connected: bool) {
        self.broker_connected.store(connected, Ordering::Relaxed);
    }

    pub(crate) fn record_received(&self) {
        self.messages_received.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped(&self) {
        self.messages_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> IngestionStats {
        IngestionStats {
            broker_connected: self.is_connected(),
            messages_received: self.messages_received.load(Ordering::Relaxed),
            messages_dropped: self.messages_dropped.load(Ordering::Relaxed),
        }
    }
}

/// Start the subscriber loop on a dedicated task.
pub fn spawn(
    config: &Config,
    pipeline: IngestPipeline,
    status: Arc<IngestionStatus>,
    shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    let mut options = MqttOptions::new(
        config.mqtt_client_id.clone(),
        config.mqtt_host.clone(),
        config.mqtt_port,
    );
    options.set_keep_alive(config.keep_alive());
    options.set_clean_session(true);

    let backoff = Backoff::new(
        Duration::from_millis(config.reconnect_min_ms),
        Duration::from_millis(config.reconnect_max_ms),
    );
    let subscriber = Subscriber::new(pipeline, status, config.mqtt_topic.clone(), backoff);

    tracing::info!(
        "Starting telemetry subscriber: mqtt://{}:{}/{}",
        config.mqtt_host,
        config.mqtt_port,
        config.mqtt_topic
    );

    tokio::spawn(subscriber.run(options, shutdown))
}
