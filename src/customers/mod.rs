//! HTTP client for the customers (KYC + accounts) service.

mod client;

pub use client::{Account, Customer, CustomerError, CustomersClient};

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CustomerStatus {
    Unknown,
    ReceiveOnly,
    Verified,
    Frozen,
    Deceased,
}

impl CustomerStatus {
    /// Only verified customers may have their accounts debited.
    pub fn allows_debit(&self) -> bool {
        matches!(self, CustomerStatus::Verified)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CustomerType {
    Individual,
    Business,
}

impl CustomerType {
    pub fn is_consumer(&self) -> bool {
        matches!(self, CustomerType::Individual)
    }
}
