//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};

use clearway::ach::builder::{Gateway, OffsetAccount};
use clearway::ach::codes::lookup_return_code;
use clearway::config::{
    Cutoffs, FileConfig, OdfiConfig, RemotePaths, UploadConfig, UploadKind,
};
use clearway::domain::{AccountType, Amount, Endpoint, Transfer, TransferStatus};
use clearway::ports::{
    RepositoryError, RepositoryResult, TransferFilters, TransferRepository,
};
use clearway::upload::filename_template::FilenameTemplate;

pub const ODFI_ROUTING: &str = "221475786";
pub const REMOTE_ROUTING: &str = "071000301";

/// In-memory TransferRepository used where Postgres is unavailable.
#[derive(Default)]
pub struct MockTransferRepository {
    inner: Mutex<MockState>,
}

#[derive(Default)]
struct MockState {
    transfers: HashMap<String, Transfer>,
    traces: HashMap<String, Vec<String>>,
    return_codes: HashMap<String, String>,
    company_ids: HashMap<String, String>,
}

impl MockTransferRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, transfer: Transfer) {
        self.inner
            .lock()
            .unwrap()
            .transfers
            .insert(transfer.transfer_id.clone(), transfer);
    }

    pub fn status_of(&self, transfer_id: &str) -> Option<TransferStatus> {
        self.inner
            .lock()
            .unwrap()
            .transfers
            .get(transfer_id)
            .map(|t| t.status)
    }

    pub fn traces_of(&self, transfer_id: &str) -> Vec<String> {
        self.inner
            .lock()
            .unwrap()
            .traces
            .get(transfer_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn return_code_of(&self, transfer_id: &str) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .return_codes
            .get(transfer_id)
            .cloned()
    }

    pub fn processed_at_of(&self, transfer_id: &str) -> Option<DateTime<Utc>> {
        self.inner
            .lock()
            .unwrap()
            .transfers
            .get(transfer_id)
            .and_then(|t| t.processed_at)
    }

    fn with_traces(&self, state: &MockState, mut transfer: Transfer) -> Transfer {
        transfer.trace_numbers = state
            .traces
            .get(&transfer.transfer_id)
            .cloned()
            .unwrap_or_default();
        transfer.return_code = state
            .return_codes
            .get(&transfer.transfer_id)
            .and_then(|code| lookup_return_code(code));
        transfer
    }
}

#[async_trait]
impl TransferRepository for MockTransferRepository {
    async fn create_transfer(&self, transfer: &Transfer) -> RepositoryResult<()> {
        self.insert(transfer.clone());
        Ok(())
    }

    async fn get_transfer(&self, transfer_id: &str) -> RepositoryResult<Transfer> {
        let state = self.inner.lock().unwrap();
        let transfer = state
            .transfers
            .get(transfer_id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(transfer_id.to_string()))?;
        Ok(self.with_traces(&state, transfer))
    }

    async fn get_transfer_for_organization(
        &self,
        transfer_id: &str,
        organization: &str,
    ) -> RepositoryResult<Transfer> {
        let transfer = self.get_transfer(transfer_id).await?;
        if transfer.organization != organization {
            return Err(RepositoryError::NotFound(transfer_id.to_string()));
        }
        Ok(transfer)
    }

    async fn list_transfers(
        &self,
        organization: &str,
        filters: &TransferFilters,
    ) -> RepositoryResult<Vec<Transfer>> {
        let state = self.inner.lock().unwrap();
        let mut transfers: Vec<Transfer> = state
            .transfers
            .values()
            .filter(|t| t.organization == organization)
            .filter(|t| filters.status.map_or(true, |s| t.status == s))
            .cloned()
            .collect();
        transfers.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        let transfers = transfers
            .into_iter()
            .skip(filters.skip.max(0) as usize)
            .take(filters.count.max(1) as usize)
            .map(|t| self.with_traces(&state, t))
            .collect();
        Ok(transfers)
    }

    async fn update_transfer_status(
        &self,
        transfer_id: &str,
        status: TransferStatus,
    ) -> RepositoryResult<()> {
        let mut state = self.inner.lock().unwrap();
        if let Some(transfer) = state.transfers.get_mut(transfer_id) {
            transfer.status = status;
        }
        Ok(())
    }

    async fn mark_processed(
        &self,
        transfer_id: &str,
        processed_at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let mut state = self.inner.lock().unwrap();
        if let Some(transfer) = state.transfers.get_mut(transfer_id) {
            transfer.status = TransferStatus::Processed;
            transfer.processed_at = Some(processed_at);
        }
        Ok(())
    }

    async fn delete_transfer(
        &self,
        organization: &str,
        transfer_id: &str,
    ) -> RepositoryResult<()> {
        let mut state = self.inner.lock().unwrap();
        let transfer = state
            .transfers
            .get(transfer_id)
            .filter(|t| t.organization == organization)
            .ok_or_else(|| RepositoryError::NotFound(transfer_id.to_string()))?;
        if transfer.status != TransferStatus::Pending {
            return Err(RepositoryError::Conflict(format!(
                "transferID={transfer_id} is not in PENDING status"
            )));
        }
        state.transfers.remove(transfer_id);
        Ok(())
    }

    async fn save_return_code(
        &self,
        transfer_id: &str,
        return_code: &str,
    ) -> RepositoryResult<()> {
        let mut state = self.inner.lock().unwrap();
        // first recorded code wins
        state
            .return_codes
            .entry(transfer_id.to_string())
            .or_insert_with(|| return_code.to_string());
        Ok(())
    }

    async fn save_trace_numbers(
        &self,
        transfer_id: &str,
        trace_numbers: &[String],
    ) -> RepositoryResult<()> {
        let mut state = self.inner.lock().unwrap();
        let existing = state.traces.entry(transfer_id.to_string()).or_default();
        for trace in trace_numbers {
            if !existing.contains(trace) {
                existing.push(trace.clone());
            }
        }
        Ok(())
    }

    async fn get_trace_numbers(&self, transfer_id: &str) -> RepositoryResult<Vec<String>> {
        Ok(self.traces_of(transfer_id))
    }

    async fn lookup_transfer_from_return(
        &self,
        amount_value: i64,
        trace_number: &str,
        effective_entry_date: NaiveDate,
    ) -> RepositoryResult<Option<Transfer>> {
        let state = self.inner.lock().unwrap();
        let day = effective_entry_date
            .and_hms_opt(0, 0, 0)
            .unwrap()
            .and_utc();
        let min = day - Duration::days(5);
        let max = day + Duration::days(6);
        let found = state
            .transfers
            .values()
            .find(|t| {
                t.amount.value == amount_value
                    && t.status == TransferStatus::Processed
                    && t.created_at > min
                    && t.created_at < max
                    && state
                        .traces
                        .get(&t.transfer_id)
                        .is_some_and(|traces| traces.iter().any(|tr| tr == trace_number))
            })
            .cloned();
        Ok(found.map(|t| self.with_traces(&state, t)))
    }

    async fn get_company_identification(
        &self,
        organization: &str,
    ) -> RepositoryResult<Option<String>> {
        Ok(self.inner.lock().unwrap().company_ids.get(organization).cloned())
    }

    async fn upsert_company_identification(
        &self,
        organization: &str,
        company_identification: &str,
    ) -> RepositoryResult<()> {
        self.inner
            .lock()
            .unwrap()
            .company_ids
            .insert(organization.to_string(), company_identification.to_string());
        Ok(())
    }
}

pub fn odfi_config() -> OdfiConfig {
    OdfiConfig {
        routing_number: ODFI_ROUTING.to_string(),
        gateway: Gateway {
            origin: ODFI_ROUTING.to_string(),
            origin_name: "My Bank".to_string(),
            destination: REMOTE_ROUTING.to_string(),
            destination_name: "Federal Reserve".to_string(),
        },
        cutoffs: Cutoffs {
            timezone: chrono_tz::America::New_York,
            windows: vec![chrono::NaiveTime::from_hms_opt(16, 20, 0).unwrap()],
            holidays: Vec::new(),
        },
        file_config: FileConfig {
            company_identification: "MOOV".to_string(),
            company_name: "My Company".to_string(),
            company_descriptor: "PAYMENT".to_string(),
            balance_entries: true,
            offset: Some(OffsetAccount {
                routing_number: ODFI_ROUTING.to_string(),
                account_number: "99887766".to_string(),
                account_type: AccountType::Checking,
            }),
        },
    }
}

pub fn upload_config(root: &std::path::Path, local: &std::path::Path) -> UploadConfig {
    UploadConfig {
        kind: UploadKind::Filesystem {
            root: root.to_path_buf(),
        },
        paths: RemotePaths {
            outbound: "outbound/".to_string(),
            inbound: "inbound/".to_string(),
            returns: "returned/".to_string(),
            reconciliation: "reconciliation/".to_string(),
        },
        timeout: std::time::Duration::from_secs(60),
        local_directory: local.to_path_buf(),
        filename_template: FilenameTemplate::default(),
        gpg: false,
    }
}

pub fn pending_transfer(
    transfer_id: &str,
    value: i64,
    source_routing: &str,
    destination_routing: &str,
) -> Transfer {
    Transfer {
        transfer_id: transfer_id.to_string(),
        organization: "acme".to_string(),
        amount: Amount {
            currency: "USD".to_string(),
            value,
        },
        source: Endpoint {
            customer_id: "cust-src".to_string(),
            account_id: "acct-src".to_string(),
            routing_number: source_routing.to_string(),
            account_number: "11111111".to_string(),
            account_type: AccountType::Checking,
        },
        destination: Endpoint {
            customer_id: "cust-dst".to_string(),
            account_id: "acct-dst".to_string(),
            routing_number: destination_routing.to_string(),
            account_number: "22222222".to_string(),
            account_type: AccountType::Checking,
        },
        description: "test payment".to_string(),
        status: TransferStatus::Pending,
        same_day: false,
        return_code: None,
        processed_at: None,
        created_at: Utc::now(),
        trace_numbers: Vec::new(),
    }
}

/// Serves verified-individual customer records for the IDs used in tests.
pub async fn mock_customers(server: &mut mockito::ServerGuard) {
    for (customer_id, status) in [("cust-src", "verified"), ("cust-dst", "verified")] {
        mock_customer(server, customer_id, status).await;
    }
}

pub async fn mock_customer(server: &mut mockito::ServerGuard, customer_id: &str, status: &str) {
    let body = format!(
        r#"{{"customerID": "{customer_id}", "firstName": "Jane", "lastName": "Doe", "type": "individual", "status": "{status}"}}"#
    );
    server
        .mock("GET", format!("/customers/{customer_id}").as_str())
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body)
        .create_async()
        .await;
}

pub async fn mock_account(
    server: &mut mockito::ServerGuard,
    customer_id: &str,
    account_id: &str,
    routing_number: &str,
) {
    let body = format!(
        r#"{{"accountID": "{account_id}", "routingNumber": "{routing_number}", "type": "checking"}}"#
    );
    server
        .mock(
            "GET",
            format!("/customers/{customer_id}/accounts/{account_id}").as_str(),
        )
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(body)
        .create_async()
        .await;
    server
        .mock(
            "POST",
            format!("/customers/{customer_id}/accounts/{account_id}/decrypt").as_str(),
        )
        .with_status(200)
        .with_header("content-type", "application/json")
        .with_body(r#"{"accountNumber": "123456789"}"#)
        .create_async()
        .await;
}
