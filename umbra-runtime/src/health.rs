//! Health reporting over HTTP
//!
//! `GET /health` answers 200 with a JSON status while storage responds to a
//! ping, 503 otherwise.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::scraper::Scraper;
use crate::storage::Storage;

const PING_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HealthStatus {
    pub status: String,
    pub timestamp: DateTime<Utc>,
    pub database_ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_scrape_at: Option<DateTime<Utc>>,
    pub total_scraped: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.database_ok
    }
}

pub struct HealthChecker {
    storage: Arc<dyn Storage>,
    scraper: Arc<Scraper>,
    timeout: Duration,
}

impl HealthChecker {
    pub fn new(storage: Arc<dyn Storage>, scraper: Arc<Scraper>) -> Self {
        Self {
            storage,
            scraper,
            timeout: PING_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub async fn check(&self) -> HealthStatus {
        let ping = match tokio::time::timeout(self.timeout, self.storage.ping()).await {
            Ok(result) => result.map_err(|e| e.to_string()),
            Err(_) => Err(format!("timed out after {:?}", self.timeout)),
        };

        if let Err(e) = ping {
            warn!("Health check failed: {}", e);
            return HealthStatus {
                status: "unhealthy".to_string(),
                timestamp: Utc::now(),
                database_ok: false,
                last_scrape_at: None,
                total_scraped: 0,
                error: Some(format!("database ping failed: {}", e)),
            };
        }

        let stats = self.scraper.stats();
        HealthStatus {
            status: "healthy".to_string(),
            timestamp: Utc::now(),
            database_ok: true,
            last_scrape_at: stats.last_scrape_at,
            total_scraped: stats.total_scraped,
            error: None,
        }
    }
}

pub fn router(checker: Arc<HealthChecker>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .with_state(checker)
}

async fn health_handler(State(checker): State<Arc<HealthChecker>>) -> Response {
    let status = checker.check().await;
    let code = if status.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::{Pipeline, PipelineConfig};
    use crate::scraper::ScraperConfig;
    use crate::storage::MemoryStorage;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::util::ServiceExt;
    use umbra_tor::{TorClient, TorConfig};

    fn checker(storage: Arc<MemoryStorage>) -> Arc<HealthChecker> {
        let client = TorClient::new(TorConfig::direct()).unwrap();
        let pipeline = Pipeline::new(Arc::new(client), PipelineConfig::default());
        let scraper = Arc::new(Scraper::new(storage.clone(), pipeline, ScraperConfig::default()));
        Arc::new(HealthChecker::new(storage, scraper))
    }

    async fn get_health(checker: Arc<HealthChecker>) -> (StatusCode, serde_json::Value) {
        let response = router(checker)
            .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_healthy() {
        let storage = Arc::new(MemoryStorage::new(Vec::new()));
        let (status, body) = get_health(checker(storage)).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["database_ok"], true);
        assert!(body["timestamp"].is_string());
        assert_eq!(body["total_scraped"], 0);
        assert!(body.get("last_scrape_at").is_none());
        assert!(body.get("error").is_none());
    }

    #[tokio::test]
    async fn test_unhealthy_when_storage_down() {
        let storage = Arc::new(MemoryStorage::new(Vec::new()));
        storage.set_available(false);
        let (status, body) = get_health(checker(storage)).await;

        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["status"], "unhealthy");
        assert_eq!(body["database_ok"], false);
        assert!(body["error"]
            .as_str()
            .unwrap()
            .starts_with("database ping failed:"));
    }

    #[tokio::test]
    async fn test_unknown_route() {
        let storage = Arc::new(MemoryStorage::new(Vec::new()));
        let response = router(checker(storage))
            .oneshot(Request::builder().uri("/nope").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
