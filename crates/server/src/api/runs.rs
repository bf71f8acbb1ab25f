//! # REST API
//!
//! Health, run history and configuration endpoints.

use super::SharedState;
use crate::config::PersistedConfig;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use shopwise_core::state::{RunRecord, RunStatus};
use utoipa::{IntoParams, ToSchema};

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub uptime_secs: i64,
}

/// Finished run as listed by the API
#[derive(Serialize, ToSchema)]
pub struct RunSummary {
    pub id: String,
    pub query: String,
    /// "completed" or "failed"
    pub status: String,
    pub steps: u32,
    pub flow: Vec<String>,
    pub product_count: usize,
    pub recommended: Option<String>,
    pub error_kind: Option<String>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl From<RunRecord> for RunSummary {
    fn from(record: RunRecord) -> Self {
        Self {
            id: record.id,
            query: record.query,
            status: match record.status {
                RunStatus::Completed => "completed",
                RunStatus::Failed => "failed",
            }
            .to_string(),
            steps: record.steps,
            flow: record.flow,
            product_count: record.product_count,
            recommended: record.recommended,
            error_kind: record.error_kind,
            error: record.error,
            started_at: record.started_at,
            finished_at: record.finished_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct RunListResponse {
    pub runs: Vec<RunSummary>,
}

#[derive(Deserialize, IntoParams)]
pub struct RunListQuery {
    /// Maximum number of runs, newest first (default 50)
    pub limit: Option<usize>,
}

#[derive(Serialize, ToSchema)]
pub struct ErrorResponse {
    pub message: String,
}

#[derive(Serialize, ToSchema)]
pub struct ConfigResponse {
    /// Stored overrides
    pub config: PersistedConfig,
    /// Pipeline configuration the next run will use
    #[schema(value_type = Object)]
    pub effective: serde_json::Value,
}

type ApiError = (StatusCode, Json<ErrorResponse>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(ErrorResponse {
            message: message.into(),
        }),
    )
}

/// Service health
#[utoipa::path(
    get,
    path = "/api/v1/health",
    tag = "health",
    responses(
        (status = 200, description = "Server is up", body = HealthResponse)
    )
)]
pub async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        uptime_secs: (Utc::now() - state.started_at).num_seconds(),
    })
}

/// List finished runs, newest first
#[utoipa::path(
    get,
    path = "/api/v1/runs",
    tag = "runs",
    params(RunListQuery),
    responses(
        (status = 200, description = "Recent runs", body = RunListResponse),
        (status = 500, description = "History unavailable", body = ErrorResponse)
    )
)]
pub async fn list_runs(
    State(state): State<SharedState>,
    Query(query): Query<RunListQuery>,
) -> Result<Json<RunListResponse>, ApiError> {
    let limit = query.limit.unwrap_or(50).clamp(1, 500);
    let runs = state
        .history
        .list(limit)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e)))?;
    Ok(Json(RunListResponse {
        runs: runs.into_iter().map(RunSummary::from).collect(),
    }))
}

/// Get one run
#[utoipa::path(
    get,
    path = "/api/v1/runs/{id}",
    tag = "runs",
    params(("id" = String, Path, description = "Run id")),
    responses(
        (status = 200, description = "The run", body = RunSummary),
        (status = 404, description = "No such run", body = ErrorResponse),
        (status = 500, description = "History unavailable", body = ErrorResponse)
    )
)]
pub async fn get_run(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<RunSummary>, ApiError> {
    match state.history.load(&id) {
        Ok(Some(record)) => Ok(Json(record.into())),
        Ok(None) => Err(api_error(StatusCode::NOT_FOUND, format!("No run with id {}", id))),
        Err(e) => Err(api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e))),
    }
}

async fn config_response(state: &SharedState) -> Result<ConfigResponse, ApiError> {
    let config = state.config.read().await.clone();
    let effective = serde_json::to_value(state.pipeline_config().await)
        .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;
    Ok(ConfigResponse { config, effective })
}

/// Current configuration
#[utoipa::path(
    get,
    path = "/api/v1/config",
    tag = "config",
    responses(
        (status = 200, description = "Stored and effective configuration", body = ConfigResponse)
    )
)]
pub async fn get_config(State(state): State<SharedState>) -> Result<Json<ConfigResponse>, ApiError> {
    config_response(&state).await.map(Json)
}

/// Update configuration; applies to runs started afterwards
#[utoipa::path(
    patch,
    path = "/api/v1/config",
    tag = "config",
    request_body = PersistedConfig,
    responses(
        (status = 200, description = "Updated configuration", body = ConfigResponse),
        (status = 500, description = "Could not persist", body = ErrorResponse)
    )
)]
pub async fn update_config(
    State(state): State<SharedState>,
    Json(update): Json<PersistedConfig>,
) -> Result<Json<ConfigResponse>, ApiError> {
    {
        // Held across the save so concurrent updates cannot interleave
        let mut config = state.config.write().await;
        let mut updated = config.clone();
        updated.merge(update);
        updated
            .save_to(&state.config_path)
            .await
            .map_err(|e| api_error(StatusCode::INTERNAL_SERVER_ERROR, format!("{:#}", e)))?;
        *config = updated;
    }
    tracing::info!("configuration updated");
    config_response(&state).await.map(Json)
}
