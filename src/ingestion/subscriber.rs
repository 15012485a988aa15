//! Telemetry Subscriber
//!
//! Owns the MQTT event loop. Every inbound publish runs one ingestion cycle;
//! bad messages are dropped and logged, connection errors back off and retry.

use std::sync::Arc;
use std::time::Duration;

use rumqttc::{AsyncClient, ConnectionError, Event, MqttOptions, Outgoing, Packet, QoS};
use tokio::sync::watch;

use super::pipeline::{IngestOutcome, IngestPipeline};
use super::IngestionStatus;

/// Exponential reconnect delay, doubling from `min` up to `max`
#[derive(Debug, Clone)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    current: Option<Duration>,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration) -> Self {
        Self { min, max: max.max(min), current: None }
    }

    pub fn next_delay(&mut self) -> Duration {
        let delay = match self.current {
            None => self.min,
            Some(prev) => prev.saturating_mul(2).min(self.max),
        };
        self.current = Some(delay);
        delay
    }

    pub fn reset(&mut self) {
        self.current = None;
    }
}

#[derive(Debug, PartialEq, Eq)]
enum Action {
    Continue,
    Subscribe,
}

pub struct Subscriber {
    pipeline: IngestPipeline,
    status: Arc<IngestionStatus>,
    topic: String,
    backoff: Backoff,
}

impl Subscriber {
    pub fn new(
        pipeline: IngestPipeline,
        status: Arc<IngestionStatus>,
        topic: String,
        backoff: Backoff,
    ) -> Self {
        Self { pipeline, status, topic, backoff }
    }

    /// Poll the broker until `shutdown` fires (or its sender is dropped).
    pub async fn run(mut self, options: MqttOptions, mut shutdown: watch::Receiver<bool>) {
        let (client, mut eventloop) = AsyncClient::new(options, 64);
        tracing::info!("Telemetry subscriber loop started");

        loop {
            let event = tokio::select! {
                _ = shutdown.changed() => break,
                event = eventloop.poll() => event,
            };

            match event {
                Ok(event) => {
                    if self.on_event(event) == Action::Subscribe {
                        // Clean session: subscriptions do not survive a reconnect
                        if let Err(e) = client.try_subscribe(self.topic.clone(), QoS::AtLeastOnce) {
                            tracing::error!("Failed to queue subscription to {}: {}", self.topic, e);
                        }
                    }
                }
                Err(e) => {
                    let delay = self.on_connection_error(&e);
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }

        self.status.set_connected(false);
        if client.try_disconnect().is_ok() {
            // Flush the DISCONNECT packet, bounded
            let _ = tokio::time::timeout(Duration::from_secs(1), async {
                loop {
                    match eventloop.poll().await {
                        Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                        Ok(_) => {}
                    }
                }
            })
            .await;
        }

        tracing::info!("Telemetry subscriber stopped");
    }

    fn on_event(&mut self, event: Event) -> Action {
        match event {
            Event::Incoming(Packet::ConnAck(ack)) => {
                tracing::info!(
                    "Connected to MQTT broker (session_present={})",
                    ack.session_present
                );
                self.status.set_connected(true);
                self.backoff.reset();
                Action::Subscribe
            }
            Event::Incoming(Packet::SubAck(_)) => {
                tracing::info!("Subscribed to {}", self.topic);
                Action::Continue
            }
            Event::Incoming(Packet::Publish(publish)) => {
                self.on_publish(&publish.payload);
                Action::Continue
            }
            Event::Incoming(Packet::Disconnect) => {
                tracing::warn!("Broker sent DISCONNECT");
                self.status.set_connected(false);
                Action::Continue
            }
            _ => Action::Continue,
        }
    }

    fn on_publish(&self, payload: &[u8]) {
        self.status.record_received();

        match self.pipeline.ingest(payload) {
            Ok(IngestOutcome::Stored { cycle }) => {
                tracing::trace!("Ingestion cycle {} stored", cycle);
            }
            Ok(IngestOutcome::Stale) => {
                self.status.record_dropped();
                tracing::debug!("Dropped out-of-order reading");
            }
            Err(e) => {
                self.status.record_dropped();
                tracing::warn!("Dropping telemetry message: {}", e);
            }
        }
    }

    fn on_connection_error(&mut self, err: &ConnectionError) -> Duration {
        if self.status.is_connected() {
            tracing::warn!("Lost connection to MQTT broker: {}", err);
        }
        self.status.set_connected(false);

        let delay = self.backoff.next_delay();
        tracing::warn!("MQTT connection error: {} - retrying in {:?}", err, delay);
        delay
    }
}
