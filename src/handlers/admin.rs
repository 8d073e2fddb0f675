//! Back-office endpoints served on the admin port.

use std::sync::Arc;
use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use metrics_exporter_prometheus::PrometheusHandle;
use serde::Deserialize;
use serde_json::json;

use crate::error::AppError;
use crate::health::{check_health, DependencyChecker};
use crate::ports::TransferRepository;
use crate::schedule::ManualTrigger;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Clone)]
pub struct AdminState {
    pub repo: Arc<dyn TransferRepository>,
    pub trigger: ManualTrigger,
    pub checkers: Arc<Vec<(String, Box<dyn DependencyChecker>)>>,
    pub metrics: PrometheusHandle,
    pub started_at: Instant,
}

/// Injects an immediate flush. The flush itself runs asynchronously in the
/// aggregator; acceptance is all this reports.
pub async fn trigger_cutoff(State(state): State<AdminState>) -> Result<impl IntoResponse, AppError> {
    if state.trigger.fire().await {
        tracing::info!("manual cutoff triggered");
        Ok(StatusCode::OK)
    } else {
        Err(AppError::Internal(
            "aggregator is not accepting ticks".to_string(),
        ))
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: String,
}

pub async fn update_transfer_status(
    State(state): State<AdminState>,
    Path(transfer_id): Path<String>,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<impl IntoResponse, AppError> {
    let next = crate::domain::TransferStatus::from_str(&request.status)
        .ok_or_else(|| AppError::Validation(format!("unknown status {:?}", request.status)))?;

    let transfer = state.repo.get_transfer(&transfer_id).await?;
    if !transfer.status.admin_transition_allowed(next) {
        return Err(AppError::BadRequest(format!(
            "cannot transition transferID={transfer_id} from {:?} to {:?}",
            transfer.status, next
        )));
    }

    state.repo.update_transfer_status(&transfer_id, next).await?;
    tracing::info!(transfer_id = %transfer_id, status = ?next, "transfer status updated");
    Ok(StatusCode::OK)
}

pub async fn version() -> impl IntoResponse {
    VERSION
}

pub async fn live(State(state): State<AdminState>) -> impl IntoResponse {
    Json(json!({
        "status": "up",
        "uptime_seconds": state.started_at.elapsed().as_secs(),
    }))
}

pub async fn ready(State(state): State<AdminState>) -> impl IntoResponse {
    let report = check_health(&state.checkers).await;
    let status = if report.healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(report))
}

pub async fn metrics_handler(State(state): State<AdminState>) -> impl IntoResponse {
    state.metrics.render()
}
