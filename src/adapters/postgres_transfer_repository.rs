//! Postgres implementation of TransferRepository.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use sqlx::{PgPool, Postgres, QueryBuilder};

use crate::ach::codes::lookup_return_code;
use crate::domain::{AccountType, Amount, Endpoint, Transfer, TransferStatus};
use crate::ports::{RepositoryError, RepositoryResult, TransferFilters, TransferRepository};

const TRANSFER_COLUMNS: &str = "transfer_id, organization, amount_currency, amount_value, \
     source_customer_id, source_account_id, source_routing_number, source_account_number, source_account_type, \
     destination_customer_id, destination_account_id, destination_routing_number, destination_account_number, destination_account_type, \
     description, status, same_day, return_code, processed_at, created_at";

/// Postgres-backed transfer repository.
#[derive(Clone)]
pub struct PostgresTransferRepository {
    pool: PgPool,
}

impl PostgresTransferRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn attach_trace_numbers(&self, mut transfer: Transfer) -> RepositoryResult<Transfer> {
        transfer.trace_numbers = self.get_trace_numbers(&transfer.transfer_id).await?;
        Ok(transfer)
    }
}

#[async_trait]
impl TransferRepository for PostgresTransferRepository {
    async fn create_transfer(&self, transfer: &Transfer) -> RepositoryResult<()> {
        sqlx::query(
            r#"
            INSERT INTO transfers (
                transfer_id, organization, amount_currency, amount_value,
                source_customer_id, source_account_id, source_routing_number,
                source_account_number, source_account_type,
                destination_customer_id, destination_account_id, destination_routing_number,
                destination_account_number, destination_account_type,
                description, status, same_day, created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18)
            "#,
        )
        .bind(&transfer.transfer_id)
        .bind(&transfer.organization)
        .bind(&transfer.amount.currency)
        .bind(transfer.amount.value)
        .bind(&transfer.source.customer_id)
        .bind(&transfer.source.account_id)
        .bind(&transfer.source.routing_number)
        .bind(&transfer.source.account_number)
        .bind(transfer.source.account_type.as_str())
        .bind(&transfer.destination.customer_id)
        .bind(&transfer.destination.account_id)
        .bind(&transfer.destination.routing_number)
        .bind(&transfer.destination.account_number)
        .bind(transfer.destination.account_type.as_str())
        .bind(&transfer.description)
        .bind(transfer.status.as_str())
        .bind(transfer.same_day)
        .bind(transfer.created_at)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;
        Ok(())
    }

    async fn get_transfer(&self, transfer_id: &str) -> RepositoryResult<Transfer> {
        let row = sqlx::query_as::<_, TransferRow>(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers WHERE transfer_id = $1 AND deleted_at IS NULL"
        ))
        .bind(transfer_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        let transfer = row
            .map(TransferRow::into_domain)
            .transpose()?
            .ok_or_else(|| RepositoryError::NotFound(transfer_id.to_string()))?;
        self.attach_trace_numbers(transfer).await
    }

    async fn get_transfer_for_organization(
        &self,
        transfer_id: &str,
        organization: &str,
    ) -> RepositoryResult<Transfer> {
        let row = sqlx::query_as::<_, TransferRow>(&format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers \
             WHERE transfer_id = $1 AND organization = $2 AND deleted_at IS NULL"
        ))
        .bind(transfer_id)
        .bind(organization)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        let transfer = row
            .map(TransferRow::into_domain)
            .transpose()?
            .ok_or_else(|| RepositoryError::NotFound(transfer_id.to_string()))?;
        self.attach_trace_numbers(transfer).await
    }

    async fn list_transfers(
        &self,
        organization: &str,
        filters: &TransferFilters,
    ) -> RepositoryResult<Vec<Transfer>> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(format!(
            "SELECT {TRANSFER_COLUMNS} FROM transfers WHERE deleted_at IS NULL AND organization = "
        ));
        builder.push_bind(organization);

        if !filters.organization_ids.is_empty() {
            builder.push(" AND organization = ANY(");
            builder.push_bind(filters.organization_ids.clone());
            builder.push(")");
        }
        if let Some(status) = filters.status {
            builder.push(" AND status = ");
            builder.push_bind(status.as_str());
        }
        if let Some(start) = filters.start_date {
            builder.push(" AND created_at >= ");
            builder.push_bind(start);
        }
        if let Some(end) = filters.end_date {
            builder.push(" AND created_at <= ");
            builder.push_bind(end);
        }
        if !filters.customer_ids.is_empty() {
            builder.push(" AND (source_customer_id = ANY(");
            builder.push_bind(filters.customer_ids.clone());
            builder.push(") OR destination_customer_id = ANY(");
            builder.push_bind(filters.customer_ids.clone());
            builder.push("))");
        }

        builder.push(" ORDER BY created_at DESC LIMIT ");
        builder.push_bind(filters.count.max(1));
        builder.push(" OFFSET ");
        builder.push_bind(filters.skip.max(0));

        let rows: Vec<TransferRow> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(RepositoryError::from)?;

        let mut transfers = Vec::with_capacity(rows.len());
        for row in rows {
            let transfer = row.into_domain()?;
            transfers.push(self.attach_trace_numbers(transfer).await?);
        }
        Ok(transfers)
    }

    async fn update_transfer_status(
        &self,
        transfer_id: &str,
        status: TransferStatus,
    ) -> RepositoryResult<()> {
        sqlx::query(
            "UPDATE transfers SET status = $1, last_updated_at = NOW() \
             WHERE transfer_id = $2 AND deleted_at IS NULL",
        )
        .bind(status.as_str())
        .bind(transfer_id)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;
        Ok(())
    }

    async fn mark_processed(
        &self,
        transfer_id: &str,
        processed_at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        sqlx::query(
            "UPDATE transfers SET status = $1, processed_at = $2, last_updated_at = NOW() \
             WHERE transfer_id = $3 AND deleted_at IS NULL",
        )
        .bind(TransferStatus::Processed.as_str())
        .bind(processed_at)
        .bind(transfer_id)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;
        Ok(())
    }

    async fn delete_transfer(
        &self,
        organization: &str,
        transfer_id: &str,
    ) -> RepositoryResult<()> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        let status: Option<String> = sqlx::query_scalar(
            "SELECT status FROM transfers \
             WHERE transfer_id = $1 AND organization = $2 AND deleted_at IS NULL",
        )
        .bind(transfer_id)
        .bind(organization)
        .fetch_optional(&mut *tx)
        .await
        .map_err(RepositoryError::from)?;

        let status = status.ok_or_else(|| RepositoryError::NotFound(transfer_id.to_string()))?;
        if status != TransferStatus::Pending.as_str() {
            return Err(RepositoryError::Conflict(format!(
                "transferID={transfer_id} is not in PENDING status"
            )));
        }

        sqlx::query(
            "UPDATE transfers SET deleted_at = NOW(), last_updated_at = NOW() \
             WHERE transfer_id = $1 AND organization = $2 AND status = $3 AND deleted_at IS NULL",
        )
        .bind(transfer_id)
        .bind(organization)
        .bind(TransferStatus::Pending.as_str())
        .execute(&mut *tx)
        .await
        .map_err(RepositoryError::from)?;

        tx.commit().await.map_err(RepositoryError::from)?;
        Ok(())
    }

    async fn save_return_code(
        &self,
        transfer_id: &str,
        return_code: &str,
    ) -> RepositoryResult<()> {
        sqlx::query(
            "UPDATE transfers SET return_code = $1, last_updated_at = NOW() \
             WHERE transfer_id = $2 AND return_code IS NULL AND deleted_at IS NULL",
        )
        .bind(return_code)
        .bind(transfer_id)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;
        Ok(())
    }

    async fn save_trace_numbers(
        &self,
        transfer_id: &str,
        trace_numbers: &[String],
    ) -> RepositoryResult<()> {
        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;
        for trace_number in trace_numbers {
            sqlx::query(
                "INSERT INTO transfer_trace_numbers (transfer_id, trace_number) \
                 VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(transfer_id)
            .bind(trace_number)
            .execute(&mut *tx)
            .await
            .map_err(RepositoryError::from)?;
        }
        tx.commit().await.map_err(RepositoryError::from)?;
        Ok(())
    }

    async fn get_trace_numbers(&self, transfer_id: &str) -> RepositoryResult<Vec<String>> {
        let traces: Vec<String> = sqlx::query_scalar(
            "SELECT trace_number FROM transfer_trace_numbers WHERE transfer_id = $1 \
             ORDER BY trace_number",
        )
        .bind(transfer_id)
        .fetch_all(&self.pool)
        .await
        .map_err(RepositoryError::from)?;
        Ok(traces)
    }

    async fn lookup_transfer_from_return(
        &self,
        amount_value: i64,
        trace_number: &str,
        effective_entry_date: NaiveDate,
    ) -> RepositoryResult<Option<Transfer>> {
        // Trace numbers should be globally unique given the ODFI prefix, but
        // the window filter keeps a collision from resurrecting archived
        // history.
        let day_start = effective_entry_date
            .and_hms_opt(0, 0, 0)
            .unwrap_or_default()
            .and_utc();
        let min = day_start - Duration::days(5);
        let max = day_start + Duration::days(6);

        let row = sqlx::query_as::<_, TransferRow>(&format!(
            "SELECT {cols} FROM transfers AS xf \
             INNER JOIN transfer_trace_numbers AS trace ON xf.transfer_id = trace.transfer_id \
             WHERE xf.amount_value = $1 AND trace.trace_number = $2 AND xf.status = $3 \
               AND xf.created_at > $4 AND xf.created_at < $5 AND xf.deleted_at IS NULL \
             LIMIT 1",
            cols = qualified_columns("xf"),
        ))
        .bind(amount_value)
        .bind(trace_number)
        .bind(TransferStatus::Processed.as_str())
        .bind(min)
        .bind(max)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;

        match row {
            Some(row) => {
                let transfer = row.into_domain()?;
                Ok(Some(self.attach_trace_numbers(transfer).await?))
            }
            None => Ok(None),
        }
    }

    async fn get_company_identification(
        &self,
        organization: &str,
    ) -> RepositoryResult<Option<String>> {
        let value: Option<String> = sqlx::query_scalar(
            "SELECT company_identification FROM organization_configs WHERE organization = $1",
        )
        .bind(organization)
        .fetch_optional(&self.pool)
        .await
        .map_err(RepositoryError::from)?;
        Ok(value)
    }

    async fn upsert_company_identification(
        &self,
        organization: &str,
        company_identification: &str,
    ) -> RepositoryResult<()> {
        sqlx::query(
            "INSERT INTO organization_configs (organization, company_identification) \
             VALUES ($1, $2) \
             ON CONFLICT (organization) DO UPDATE SET company_identification = EXCLUDED.company_identification",
        )
        .bind(organization)
        .bind(company_identification)
        .execute(&self.pool)
        .await
        .map_err(RepositoryError::from)?;
        Ok(())
    }
}

fn qualified_columns(alias: &str) -> String {
    TRANSFER_COLUMNS
        .split(", ")
        .map(|col| format!("{alias}.{}", col.trim()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Internal row type for SQLx. Not exposed outside the adapter.
#[derive(Debug, sqlx::FromRow)]
struct TransferRow {
    transfer_id: String,
    organization: String,
    amount_currency: String,
    amount_value: i64,
    source_customer_id: String,
    source_account_id: String,
    source_routing_number: String,
    source_account_number: String,
    source_account_type: String,
    destination_customer_id: String,
    destination_account_id: String,
    destination_routing_number: String,
    destination_account_number: String,
    destination_account_type: String,
    description: String,
    status: String,
    same_day: bool,
    return_code: Option<String>,
    processed_at: Option<DateTime<Utc>>,
    created_at: DateTime<Utc>,
}

impl TransferRow {
    fn into_domain(self) -> RepositoryResult<Transfer> {
        let status = TransferStatus::from_str(&self.status).ok_or_else(|| {
            RepositoryError::Database(format!("unknown transfer status {:?}", self.status))
        })?;
        let source = endpoint(
            self.source_customer_id,
            self.source_account_id,
            self.source_routing_number,
            self.source_account_number,
            &self.source_account_type,
        )?;
        let destination = endpoint(
            self.destination_customer_id,
            self.destination_account_id,
            self.destination_routing_number,
            self.destination_account_number,
            &self.destination_account_type,
        )?;
        Ok(Transfer {
            transfer_id: self.transfer_id,
            organization: self.organization,
            amount: Amount {
                currency: self.amount_currency,
                value: self.amount_value,
            },
            source,
            destination,
            description: self.description,
            status,
            same_day: self.same_day,
            return_code: self.return_code.as_deref().and_then(lookup_return_code),
            processed_at: self.processed_at,
            created_at: self.created_at,
            trace_numbers: Vec::new(),
        })
    }
}

fn endpoint(
    customer_id: String,
    account_id: String,
    routing_number: String,
    account_number: String,
    account_type: &str,
) -> RepositoryResult<Endpoint> {
    let account_type = AccountType::from_str(account_type).ok_or_else(|| {
        RepositoryError::Database(format!("unknown account type {account_type:?}"))
    })?;
    Ok(Endpoint {
        customer_id,
        account_id,
        routing_number,
        account_number,
        account_type,
    })
}
