//! Repository contracts the rest of the system depends on.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};

use crate::domain::{Transfer, TransferStatus};

#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("database error: {0}")]
    Database(String),
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("row not found".to_string()),
            other => RepositoryError::Database(other.to_string()),
        }
    }
}

pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Filters accepted by `GET /transfers`.
#[derive(Debug, Clone, Default)]
pub struct TransferFilters {
    pub skip: i64,
    pub count: i64,
    pub status: Option<TransferStatus>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub customer_ids: Vec<String>,
    pub organization_ids: Vec<String>,
}

#[async_trait]
pub trait TransferRepository: Send + Sync {
    async fn create_transfer(&self, transfer: &Transfer) -> RepositoryResult<()>;

    /// Reads a transfer regardless of tenant; used by the pipeline.
    async fn get_transfer(&self, transfer_id: &str) -> RepositoryResult<Transfer>;

    async fn get_transfer_for_organization(
        &self,
        transfer_id: &str,
        organization: &str,
    ) -> RepositoryResult<Transfer>;

    async fn list_transfers(
        &self,
        organization: &str,
        filters: &TransferFilters,
    ) -> RepositoryResult<Vec<Transfer>>;

    async fn update_transfer_status(
        &self,
        transfer_id: &str,
        status: TransferStatus,
    ) -> RepositoryResult<()>;

    /// Transitions to PROCESSED and stamps `processed_at` in one statement.
    async fn mark_processed(
        &self,
        transfer_id: &str,
        processed_at: DateTime<Utc>,
    ) -> RepositoryResult<()>;

    /// Soft-deletes a PENDING transfer; anything else is a conflict.
    async fn delete_transfer(&self, organization: &str, transfer_id: &str)
        -> RepositoryResult<()>;

    /// Records a return code, only when none has been recorded yet.
    async fn save_return_code(&self, transfer_id: &str, return_code: &str)
        -> RepositoryResult<()>;

    async fn save_trace_numbers(
        &self,
        transfer_id: &str,
        trace_numbers: &[String],
    ) -> RepositoryResult<()>;

    async fn get_trace_numbers(&self, transfer_id: &str) -> RepositoryResult<Vec<String>>;

    /// Matches an inbound return entry to a PROCESSED transfer created
    /// within five calendar days of the return's effective entry date.
    async fn lookup_transfer_from_return(
        &self,
        amount_value: i64,
        trace_number: &str,
        effective_entry_date: NaiveDate,
    ) -> RepositoryResult<Option<Transfer>>;

    async fn get_company_identification(
        &self,
        organization: &str,
    ) -> RepositoryResult<Option<String>>;

    async fn upsert_company_identification(
        &self,
        organization: &str,
        company_identification: &str,
    ) -> RepositoryResult<()>;
}
