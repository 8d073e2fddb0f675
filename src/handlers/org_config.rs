//! Per-organization transfer configuration.

use axum::{extract::State, response::IntoResponse, Json};
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::middleware::organization::Organization;

use super::AppState;

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferConfiguration {
    pub company_identification: String,
}

pub async fn get_configuration(
    State(state): State<AppState>,
    Organization(organization): Organization,
) -> Result<impl IntoResponse, AppError> {
    let company_identification = state
        .repo
        .get_company_identification(&organization)
        .await?
        .unwrap_or_else(|| state.odfi.file_config.company_identification.clone());
    Ok(Json(TransferConfiguration {
        company_identification,
    }))
}

pub async fn update_configuration(
    State(state): State<AppState>,
    Organization(organization): Organization,
    Json(config): Json<TransferConfiguration>,
) -> Result<impl IntoResponse, AppError> {
    if config.company_identification.trim().is_empty() {
        return Err(AppError::Validation(
            "companyIdentification is required".to_string(),
        ));
    }
    state
        .repo
        .upsert_company_identification(&organization, &config.company_identification)
        .await?;
    tracing::info!(organization = %organization, "transfer configuration updated");
    Ok(Json(config))
}
