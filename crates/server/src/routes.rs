// crates/server/src/routes.rs
//! HTTP surface consumed at the boundary (§6), not part of the core.

use std::sync::Arc;

use axum::extract::{Multipart, Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use ulid::Ulid;

use crate::error::ApiError;
use crate::metrics::render_metrics;
use crate::orchestrator::{self, UploadPayload};
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/upload-json", post(upload_json))
        .route("/api/progress/:upload_id", get(get_progress))
        .route("/api/metrics/snapshot", get(metrics_snapshot))
        .route("/api/health", get(health))
        .route("/metrics", get(prometheus_metrics))
        .with_state(state)
}

/// Response for `GET /api/health` (§2.1).
#[derive(Debug, Serialize)]
#[cfg_attr(test, derive(serde::Deserialize))]
struct HealthResponse {
    status: String,
    version: String,
    uptime_secs: u64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let status = match sqlx::query("SELECT 1").execute(state.db.pool()).await {
        Ok(_) => "ok",
        Err(_) => "degraded",
    };
    Json(HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_secs: state.uptime_secs(),
    })
}

/// `GET /metrics` — Prometheus scrape endpoint (§1.1 ambient stack).
async fn prometheus_metrics() -> Response {
    match render_metrics() {
        Some(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "text/plain; version=0.0.4; charset=utf-8")],
            body,
        )
            .into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "metrics not initialized").into_response(),
    }
}

/// `GET /api/metrics/snapshot` (§6.1) — the current Metric cache as JSON.
async fn metrics_snapshot(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let metrics = powerpulse_db::queries::metrics::all_metrics(state.db.pool())
        .await
        .map_err(ApiError::Database)?;
    Ok(Json(metrics))
}

/// Synchronous response for `POST /api/upload-json` (§6). The real counts
/// are only known once the background pipeline runs; per the contract,
/// this response is always zeroed and the caller polls `/api/progress`.
#[derive(Debug, Serialize)]
struct UploadAccepted {
    upload_id: String,
    success: bool,
    conversations_processed: u64,
    messages_processed: u64,
}

async fn upload_json(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let mut file_bytes: Option<Vec<u8>> = None;
    let mut force_reprocess = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(e.to_string()))?
    {
        match field.name().unwrap_or_default() {
            "file" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                if bytes.len() > state.config.max_file_size {
                    return Err(ApiError::FileTooLarge {
                        max_bytes: state.config.max_file_size,
                    });
                }
                file_bytes = Some(bytes.to_vec());
            }
            "force_reprocess" => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::BadRequest(e.to_string()))?;
                force_reprocess = text == "true" || text == "1";
            }
            _ => {}
        }
    }

    let bytes = file_bytes.ok_or_else(|| ApiError::BadRequest("missing `file` field".to_string()))?;

    let value: serde_json::Value =
        serde_json::from_slice(&bytes).map_err(|e| ApiError::InvalidJson(e.to_string()))?;
    if !value.is_object() {
        return Err(ApiError::InvalidShape);
    }
    let payload: UploadPayload =
        serde_json::from_value(value).map_err(|e| ApiError::InvalidJson(e.to_string()))?;

    let upload_id = Ulid::new().to_string();

    let db = state.db.clone();
    let config = state.config.clone();
    let provider = state.provider.clone();
    let registry = state.progress.clone();
    let task_upload_id = upload_id.clone();

    tokio::spawn(async move {
        orchestrator::run(
            task_upload_id,
            payload,
            force_reprocess,
            db,
            config,
            provider,
            registry,
        )
        .await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(UploadAccepted {
            upload_id,
            success: true,
            conversations_processed: 0,
            messages_processed: 0,
        }),
    ))
}

async fn get_progress(
    State(state): State<Arc<AppState>>,
    Path(upload_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    state
        .progress
        .snapshot(&upload_id)
        .map(Json)
        .ok_or_else(|| ApiError::UploadNotFound(upload_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use powerpulse_core::llm::factory::create_provider;
    use powerpulse_core::Config;
    use powerpulse_db::Database;

    async fn test_state() -> Arc<AppState> {
        let db = Database::new_in_memory().await.unwrap();
        let mut config = Config::default();
        config.llm_api_key = Some("test-key".to_string());
        let provider = create_provider(&config).unwrap();
        AppState::new(db, config, provider)
    }

    #[tokio::test]
    async fn progress_for_unknown_upload_is_not_found() {
        let state = test_state().await;
        let result = get_progress(State(state), Path("missing".to_string())).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let state = test_state().await;
        let _ = health(State(state)).await;
    }
}
