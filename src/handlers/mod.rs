//! HTTP handlers

pub mod health;
pub mod latest;
pub mod predict;
pub mod model;

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use axum::Router;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use crate::classifier::{Classification, ClassifyError, Classifier, Features, ModelClassifier, ModelStatus};
    use crate::config::Config;
    use crate::ingestion::{IngestPipeline, IngestionStatus};
    use crate::store::LatestStateStore;
    use crate::{create_router, AppState};

    /// Seed classifier that counts invocations
    struct CountingClassifier {
        inner: ModelClassifier,
        calls: AtomicUsize,
    }

    impl Classifier for CountingClassifier {
        fn classify(&self, features: &Features) -> Result<Classification, ClassifyError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.inner.classify(features)
        }

        fn status(&self) -> Option<ModelStatus> {
            self.inner.status()
        }
    }

    struct Harness {
        app: Router,
        classifier: Arc<CountingClassifier>,
        store: Arc<LatestStateStore>,
        ingestion: Arc<IngestionStatus>,
    }

    impl Harness {
        fn new() -> Self {
            let classifier = Arc::new(CountingClassifier {
                inner: ModelClassifier::seed(0.5).unwrap(),
                calls: AtomicUsize::new(0),
            });
            let store = Arc::new(LatestStateStore::new());
            let ingestion = Arc::new(IngestionStatus::default());

            let state = AppState {
                classifier: classifier.clone(),
                store: Arc::clone(&store),
                ingestion: Arc::clone(&ingestion),
                config: Config::default(),
            };

            Self { app: create_router(state), classifier, store, ingestion }
        }

        fn pipeline(&self) -> IngestPipeline {
            IngestPipeline::new(self.classifier.clone(), Arc::clone(&self.store), false)
        }

        fn calls(&self) -> usize {
            self.classifier.calls.load(Ordering::SeqCst)
        }

        async fn get(&self, uri: &str) -> (StatusCode, Value) {
            let request = Request::builder().uri(uri).body(Body::empty()).unwrap();
            self.send(request).await
        }

        async fn post(&self, uri: &str, body: &str) -> (StatusCode, Value) {
            let request = Request::builder()
                .method("POST")
                .uri(uri)
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap();
            self.send(request).await
        }

        async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
            let response = self.app.clone().oneshot(request).await.unwrap();
            let status = response.status();
            let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
            let body = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap()
            };
            (status, body)
        }
    }

    const READING: &str = r#"{"temp": 90.5, "pressure": 131.2, "vibration": 71.0, "current": 18.4,
        "timestamp": "2026-10-19T08:00:00", "is_simulated_anomaly": true}"#;

    #[tokio::test]
    async fn test_latest_unavailable_before_ingestion() {
        let h = Harness::new();

        let request = Request::builder().uri("/api/v1/latest").body(Body::empty()).unwrap();
        let response = h.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "2");

        let (status, body) = h.get("/api/v1/latest").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], 503);
        assert!(body["error"].as_str().unwrap().contains("No sensor data"));
    }

    #[tokio::test]
    async fn test_latest_returns_last_ingested_pair() {
        let h = Harness::new();
        h.pipeline().ingest(READING.as_bytes()).unwrap();

        let (status, body) = h.get("/api/v1/latest").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(
            body["sensor"],
            json!({
                "temp": 90.5, "pressure": 131.2, "vibration": 71.0, "current": 18.4,
                "timestamp": "2026-10-19T08:00:00", "is_simulated_anomaly": true
            })
        );
        assert_eq!(body["prediction"]["label"], "anomalous");
        assert_eq!(body["prediction"]["timestamp"], "2026-10-19T08:00:00");
        assert_eq!(body["cycle"], 1);
    }

    #[tokio::test]
    async fn test_predict_anomalous_reading() {
        let h = Harness::new();

        let (status, body) = h
            .post("/api/v1/predict", r#"{"temp": 90, "pressure": 130, "vibration": 70, "current": 18}"#)
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["prediction"], 1);
        assert!(body["confidence"].as_f64().unwrap() > 0.5);
    }

    #[tokio::test]
    async fn test_predict_normal_reading_on_legacy_path() {
        let h = Harness::new();

        let (status, body) = h
            .post("/predict", r#"{"temp": 75, "pressure": 100, "vibration": 45, "current": 12}"#)
            .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["prediction"], 0);
    }

    #[tokio::test]
    async fn test_predict_does_not_touch_store() {
        let h = Harness::new();

        h.post("/api/v1/predict", r#"{"temp": 90, "pressure": 130, "vibration": 70, "current": 18}"#)
            .await;

        assert!(!h.store.has_received_data());
        let (status, _) = h.get("/api/v1/latest").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_predict_rejects_missing_field_without_classifying() {
        let h = Harness::new();

        let (status, body) = h
            .post("/api/v1/predict", r#"{"temp": 90, "pressure": 130, "vibration": 70}"#)
            .await;

        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("current"));
        assert_eq!(h.calls(), 0);
    }

    #[tokio::test]
    async fn test_predict_rejects_malformed_bodies() {
        let h = Harness::new();

        let (status, _) = h
            .post("/api/v1/predict", r#"{"temp": "hot", "pressure": 130, "vibration": 70, "current": 18}"#)
            .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = h.post("/api/v1/predict", "temp=90").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let request = Request::builder()
            .method("POST")
            .uri("/api/v1/predict")
            .body(Body::from(r#"{"temp": 90, "pressure": 130, "vibration": 70, "current": 18}"#))
            .unwrap();
        let (status, _) = h.send(request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        assert_eq!(h.calls(), 0);
    }

    #[tokio::test]
    async fn test_concurrent_predictions_are_independent() {
        let h = Arc::new(Harness::new());

        let tasks: Vec<_> = (0..32)
            .map(|i| {
                let h = Arc::clone(&h);
                tokio::spawn(async move {
                    let anomalous = i % 2 == 0;
                    let body = if anomalous {
                        r#"{"temp": 90, "pressure": 130, "vibration": 70, "current": 18}"#
                    } else {
                        r#"{"temp": 75, "pressure": 100, "vibration": 45, "current": 12}"#
                    };
                    let (status, json) = h.post("/api/v1/predict", body).await;
                    assert_eq!(status, StatusCode::OK);
                    assert_eq!(json["prediction"], u8::from(anomalous));
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(h.calls(), 32);
    }

    #[tokio::test]
    async fn test_health_tracks_first_ingestion() {
        let h = Harness::new();

        let (status, body) = h.get("/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["alive"], true);
        assert_eq!(body["has_received_data"], false);
        assert_eq!(body["mqtt_connected"], false);

        h.ingestion.set_connected(true);
        h.pipeline().ingest(READING.as_bytes()).unwrap();

        let (_, body) = h.get("/health").await;
        assert_eq!(body["has_received_data"], true);
        assert_eq!(body["mqtt_connected"], true);
        assert_eq!(body["broker_connected"], true);

        // Broker drops and a later message is garbage: the flag stays set
        h.ingestion.set_connected(false);
        assert!(h.pipeline().ingest(b"garbage").is_err());

        let (_, body) = h.get("/health").await;
        assert_eq!(body["has_received_data"], true);
        assert_eq!(body["mqtt_connected"], true);
        assert_eq!(body["broker_connected"], false);
        assert_eq!(body["ingestion_cycles"], 1);
    }

    #[tokio::test]
    async fn test_model_status() {
        let h = Harness::new();
        h.post("/api/v1/predict", r#"{"temp": 75, "pressure": 100, "vibration": 45, "current": 12}"#)
            .await;

        let (status, body) = h.get("/api/v1/model").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["source"], "seed");
        assert_eq!(body["n_trees"], 10);
        assert_eq!(body["inference_count"], 1);
        assert!(body["feature_importances"]["pressure"].is_number());
    }
}
