//! Tenant-facing transfer endpoints.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::domain::{self, CreateEndpoint, CreateTransfer, Endpoint, Transfer, TransferStatus};
use crate::error::AppError;
use crate::middleware::organization::Organization;
use crate::ports::{RepositoryError, TransferFilters};

use super::AppState;

const MAX_CUSTOMER_ID_FILTERS: usize = 25;
const DEFAULT_PAGE_SIZE: i64 = 20;

pub async fn create_transfer(
    State(state): State<AppState>,
    Organization(organization): Organization,
    Json(request): Json<CreateTransfer>,
) -> Result<impl IntoResponse, AppError> {
    request.validate().map_err(AppError::Validation)?;

    let source = resolve_endpoint(&state, &request.source).await?;
    let destination = resolve_endpoint(&state, &request.destination).await?;

    let transfer = Transfer {
        transfer_id: domain::transfer::generate_id(),
        organization: organization.clone(),
        amount: request.amount.clone(),
        source,
        destination,
        description: request.description.clone(),
        status: TransferStatus::Pending,
        same_day: request.same_day,
        return_code: None,
        processed_at: None,
        created_at: Utc::now(),
        trace_numbers: Vec::new(),
    };

    state.repo.create_transfer(&transfer).await?;
    metrics::counter!("transfers_created_total").increment(1);

    // Bus trouble is not the caller's problem: the transfer is persisted
    // PENDING and picked up at a later cutoff once the bus recovers.
    if let Err(err) = state.publisher.publish(&transfer.transfer_id).await {
        metrics::counter!("transfer_publish_errors_total").increment(1);
        tracing::error!(transfer_id = %transfer.transfer_id, error = %err, "failed to publish accepted transfer");
    }

    tracing::info!(transfer_id = %transfer.transfer_id, organization = %organization, "transfer accepted");
    Ok((StatusCode::CREATED, Json(transfer)))
}

/// Resolves a customer/account pair against the customers service,
/// fetching the decrypted account number for file construction.
async fn resolve_endpoint(
    state: &AppState,
    endpoint: &CreateEndpoint,
) -> Result<Endpoint, AppError> {
    let customer = state.customers.get_customer(&endpoint.customer_id).await?;
    let account = state
        .customers
        .get_account(&endpoint.customer_id, &endpoint.account_id)
        .await?;
    let account_number = state
        .customers
        .get_account_number(&endpoint.customer_id, &endpoint.account_id)
        .await?;
    Ok(Endpoint {
        customer_id: customer.customer_id,
        account_id: account.account_id,
        routing_number: account.routing_number,
        account_number,
        account_type: account.account_type,
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListTransfersParams {
    #[serde(default)]
    pub skip: Option<i64>,
    #[serde(default)]
    pub count: Option<i64>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub start_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(rename = "customerIDs", default)]
    pub customer_ids: Option<String>,
    #[serde(rename = "organizationIDs", default)]
    pub organization_ids: Option<String>,
}

pub async fn list_transfers(
    State(state): State<AppState>,
    Organization(organization): Organization,
    Query(params): Query<ListTransfersParams>,
) -> Result<impl IntoResponse, AppError> {
    let status = match &params.status {
        Some(raw) => Some(
            TransferStatus::from_str(raw)
                .ok_or_else(|| AppError::Validation(format!("unknown status {raw:?}")))?,
        ),
        None => None,
    };

    let customer_ids = split_ids(params.customer_ids.as_deref());
    if customer_ids.len() > MAX_CUSTOMER_ID_FILTERS {
        return Err(AppError::Validation(format!(
            "customerIDs accepts at most {MAX_CUSTOMER_ID_FILTERS} values"
        )));
    }

    let filters = TransferFilters {
        skip: params.skip.unwrap_or(0),
        count: params.count.unwrap_or(DEFAULT_PAGE_SIZE),
        status,
        start_date: params.start_date,
        end_date: params.end_date,
        customer_ids,
        organization_ids: split_ids(params.organization_ids.as_deref()),
    };

    let transfers = state.repo.list_transfers(&organization, &filters).await?;
    Ok(Json(transfers))
}

fn split_ids(raw: Option<&str>) -> Vec<String> {
    raw.map(|s| {
        s.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

pub async fn get_transfer(
    State(state): State<AppState>,
    Organization(organization): Organization,
    Path(transfer_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let transfer = state
        .repo
        .get_transfer_for_organization(&transfer_id, &organization)
        .await?;
    Ok(Json(transfer))
}

pub async fn delete_transfer(
    State(state): State<AppState>,
    Organization(organization): Organization,
    Path(transfer_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    match state.repo.delete_transfer(&organization, &transfer_id).await {
        Ok(()) => {
            tracing::info!(transfer_id = %transfer_id, organization = %organization, "transfer canceled");
            Ok(StatusCode::OK)
        }
        // deletes are only valid while PENDING, surfaced as a 400
        Err(RepositoryError::Conflict(message)) => Err(AppError::BadRequest(message)),
        Err(other) => Err(other.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_ids_handles_commas_and_blanks() {
        assert_eq!(split_ids(None), Vec::<String>::new());
        assert_eq!(split_ids(Some("a,b , ,c")), vec!["a", "b", "c"]);
    }

    #[test]
    fn customer_id_filter_limit() {
        let raw = (0..26).map(|i| format!("c{i}")).collect::<Vec<_>>().join(",");
        assert_eq!(split_ids(Some(&raw)).len(), 26);
    }
}
