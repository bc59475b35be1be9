// crates/server/src/lib.rs
//! PowerPulse server library.
//!
//! Axum-based HTTP transport for the ingestion-and-analysis pipeline: the
//! upload boundary (`POST /api/upload-json`), the progress poller
//! (`GET /api/progress/{upload_id}`), and the background orchestrator that
//! runs C1–C9 for each upload.

pub mod error;
pub mod metrics;
pub mod orchestrator;
pub mod progress;
pub mod routes;
pub mod scheduler;
pub mod state;

pub use error::{ApiError, ErrorResponse};
pub use state::AppState;

use std::sync::Arc;

use axum::http::HeaderValue;
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Restricts the API to localhost origins, matching the teacher's CORS
/// posture for a locally-run dashboard.
fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(AllowOrigin::predicate(
            |origin: &HeaderValue, _req_parts: &axum::http::request::Parts| {
                if let Ok(origin) = origin.to_str() {
                    origin.starts_with("http://localhost:")
                        || origin.starts_with("http://127.0.0.1:")
                        || origin == "http://localhost"
                        || origin == "http://127.0.0.1"
                } else {
                    false
                }
            },
        ))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Builds the full Axum application: upload/progress routes, CORS, and
/// request tracing.
pub fn create_app(state: Arc<AppState>) -> Router {
    routes::router(state)
        .layer(cors_layer())
        .layer(TraceLayer::new_for_http())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use powerpulse_core::llm::factory::create_provider;
    use powerpulse_core::Config;
    use powerpulse_db::Database;
    use tower::ServiceExt;

    async fn test_app() -> Router {
        let db = Database::new_in_memory().await.unwrap();
        let mut config = Config::default();
        config.llm_api_key = Some("test-key".to_string());
        let provider = create_provider(&config).unwrap();
        create_app(AppState::new(db, config, provider))
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let app = test_app().await;
        let response = app
            .oneshot(Request::builder().uri("/api/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn metrics_snapshot_returns_ok() {
        let app = test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/metrics/snapshot")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn unknown_progress_id_returns_404() {
        let app = test_app().await;
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/progress/does-not-exist")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
