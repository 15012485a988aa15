//! Sensor Anomaly Service
//!
//! Ingests semiconductor tool telemetry from MQTT, classifies every reading
//! and serves the latest reading/prediction pair plus on-demand predictions.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  SENSOR ANOMALY SERVICE                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────┐     ┌────────────┐     ┌────────────┐  │
//! │  │ MQTT Subscriber │ ──▶ │ Classifier │ ◀── │ API (Axum) │  │
//! │  │ (Background)    │     │ (Forest)   │     │  /predict  │  │
//! │  └────────┬────────┘     └────────────┘     │  /latest   │  │
//! │           ▼                                 │  /health   │  │
//! │   ┌───────────────────┐                     └─────┬──────┘  │
//! │   │ Latest-State Store│ ◀──────────── reads ──────┘         │
//! │   └───────────────────┘                                     │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod classifier;
mod config;
mod error;
mod handlers;
mod ingestion;
mod models;
mod store;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{CorsLayer, Any},
    trace::TraceLayer,
    compression::CompressionLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use anyhow::Context;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::watch;

use classifier::{Classifier, ModelClassifier};
use ingestion::{IngestPipeline, IngestionStatus};
use store::LatestStateStore;

pub use error::{AppError, AppResult};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env();

    init_tracing(&config);

    tracing::info!("Sensor Anomaly Service starting...");
    tracing::info!("Environment: {}", config.environment);

    // A corrupt artifact is fatal; only a missing one falls back to the seed model
    let model = ModelClassifier::load(&config.model_path, config.anomaly_threshold)
        .context("Failed to load classifier model")?;
    tracing::info!("Serving {:?} model (threshold {})", model.source(), config.anomaly_threshold);
    let classifier: Arc<dyn Classifier> = Arc::new(model);

    let store = Arc::new(LatestStateStore::new());
    let ingestion_status = Arc::new(IngestionStatus::default());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start telemetry ingestion
    let subscriber = if config.ingestion_enabled {
        let pipeline = IngestPipeline::new(
            Arc::clone(&classifier),
            Arc::clone(&store),
            config.reject_stale_readings,
        );
        Some(ingestion::spawn(
            &config,
            pipeline,
            Arc::clone(&ingestion_status),
            shutdown_rx.clone(),
        ))
    } else {
        tracing::warn!("Telemetry ingestion disabled - serving predictions only");
        None
    };

    // Build application state
    let state = AppState {
        classifier,
        store,
        ingestion: ingestion_status,
        config: config.clone(),
    };

    // Build router
    let app = create_router(state);

    // Start server
    let addr: SocketAddr = format!("{}:{}", config.bind_addr, config.port)
        .parse()
        .context("Invalid BIND_ADDR/PORT")?;
    tracing::info!("🚀 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    let mut server_shutdown = shutdown_rx.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = server_shutdown.changed().await;
            })
            .await
    });

    tokio::select! {
        _ = shutdown_signal() => tracing::info!("Shutdown signal received"),
        res = &mut server => {
            let _ = shutdown_tx.send(true);
            return res.context("Server task failed")?.context("Server error");
        }
    }

    let _ = shutdown_tx.send(true);
    let grace = config.shutdown_grace();

    match tokio::time::timeout(grace, server).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => tracing::error!("Server error: {}", e),
        Ok(Err(e)) => tracing::error!("Server task failed: {}", e),
        Err(_) => tracing::warn!("In-flight requests still running after {:?}, exiting", grace),
    }

    if let Some(handle) = subscriber {
        if tokio::time::timeout(grace, handle).await.is_err() {
            tracing::warn!("Telemetry subscriber did not stop within {:?}", grace);
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

fn init_tracing(config: &config::Config) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "sensor_anomaly_service=debug,tower_http=debug".into());
    let registry = tracing_subscriber::registry().with(filter);

    if config.is_production() {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub classifier: Arc<dyn Classifier>,
    pub store: Arc<LatestStateStore>,
    pub ingestion: Arc<IngestionStatus>,
    pub config: config::Config,
}

/// Create the main router with all routes
fn create_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route("/api/v1/latest", get(handlers::latest::get))
        .route("/api/v1/predict", post(handlers::predict::predict))
        .route("/api/v1/model", get(handlers::model::status))
        // Legacy dashboard path
        .route("/predict", post(handlers::predict::predict));

    Router::new()
        .route("/health", get(handlers::health::check))
        .merge(api_routes)
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}
