//! Transfer domain entity.
//! Framework-agnostic representation of a first-party ACH transfer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ach::ReturnCode;

pub const MAX_DESCRIPTION_LENGTH: usize = 200;
pub const TRANSFER_ID_LENGTH: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccountType {
    Checking,
    Savings,
    Loan,
}

impl AccountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountType::Checking => "checking",
            AccountType::Savings => "savings",
            AccountType::Loan => "loan",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "checking" => Some(AccountType::Checking),
            "savings" => Some(AccountType::Savings),
            "loan" => Some(AccountType::Loan),
            _ => None,
        }
    }
}

/// ISO-4217 currency plus a value in minor units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Amount {
    pub currency: String,
    pub value: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TransferStatus {
    Pending,
    Reviewable,
    Canceled,
    Processed,
    Returned,
    Failed,
}

impl TransferStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransferStatus::Pending => "PENDING",
            TransferStatus::Reviewable => "REVIEWABLE",
            TransferStatus::Canceled => "CANCELED",
            TransferStatus::Processed => "PROCESSED",
            TransferStatus::Returned => "RETURNED",
            TransferStatus::Failed => "FAILED",
        }
    }

    pub fn from_str(value: &str) -> Option<Self> {
        match value {
            "PENDING" => Some(TransferStatus::Pending),
            "REVIEWABLE" => Some(TransferStatus::Reviewable),
            "CANCELED" => Some(TransferStatus::Canceled),
            "PROCESSED" => Some(TransferStatus::Processed),
            "RETURNED" => Some(TransferStatus::Returned),
            "FAILED" => Some(TransferStatus::Failed),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferStatus::Canceled
                | TransferStatus::Processed
                | TransferStatus::Returned
                | TransferStatus::Failed
        )
    }

    /// The transitions the back-office status endpoint accepts.
    pub fn admin_transition_allowed(&self, next: TransferStatus) -> bool {
        matches!(
            (self, next),
            (TransferStatus::Pending, TransferStatus::Reviewable)
                | (TransferStatus::Reviewable, TransferStatus::Pending)
                | (TransferStatus::Pending, TransferStatus::Canceled)
                | (TransferStatus::Reviewable, TransferStatus::Canceled)
        )
    }
}

/// One side of a transfer, resolved against the customers service when the
/// transfer is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    #[serde(rename = "customerID")]
    pub customer_id: String,
    #[serde(rename = "accountID")]
    pub account_id: String,
    pub routing_number: String,
    #[serde(skip_serializing)]
    #[serde(default)]
    pub account_number: String,
    pub account_type: AccountType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transfer {
    #[serde(rename = "transferID")]
    pub transfer_id: String,
    pub organization: String,
    pub amount: Amount,
    pub source: Endpoint,
    pub destination: Endpoint,
    pub description: String,
    pub status: TransferStatus,
    pub same_day: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub return_code: Option<ReturnCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub trace_numbers: Vec<String>,
}

/// Request body accepted by `POST /transfers`.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTransfer {
    pub amount: Amount,
    pub source: CreateEndpoint,
    pub destination: CreateEndpoint,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub same_day: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CreateEndpoint {
    #[serde(rename = "customerID")]
    pub customer_id: String,
    #[serde(rename = "accountID")]
    pub account_id: String,
}

impl CreateTransfer {
    pub fn validate(&self) -> Result<(), String> {
        if self.amount.value <= 0 {
            return Err(format!("amount must be positive, got {}", self.amount.value));
        }
        if self.amount.currency.len() != 3 {
            return Err(format!("invalid currency {:?}", self.amount.currency));
        }
        if self.description.len() > MAX_DESCRIPTION_LENGTH {
            return Err(format!(
                "description exceeds {MAX_DESCRIPTION_LENGTH} characters"
            ));
        }
        for (side, endpoint) in [("source", &self.source), ("destination", &self.destination)] {
            if endpoint.customer_id.is_empty() {
                return Err(format!("{side} customerID is required"));
            }
            if endpoint.account_id.is_empty() {
                return Err(format!("{side} accountID is required"));
            }
        }
        if self.source.customer_id == self.destination.customer_id
            && self.source.account_id == self.destination.account_id
        {
            return Err("source and destination accounts must differ".to_string());
        }
        Ok(())
    }
}

/// 40-character opaque identifier used for transfers and related rows.
pub fn generate_id() -> String {
    let mut id = format!(
        "{}{}",
        Uuid::new_v4().simple(),
        Uuid::new_v4().simple()
    );
    id.truncate(TRANSFER_ID_LENGTH);
    id
}
