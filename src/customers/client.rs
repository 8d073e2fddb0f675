use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::AccountType;

use super::{CustomerStatus, CustomerType};

#[derive(Error, Debug)]
pub enum CustomerError {
    #[error("HTTP request failed: {0}")]
    RequestError(#[from] reqwest::Error),
    #[error("customer not found: {0}")]
    CustomerNotFound(String),
    #[error("account not found: {0}")]
    AccountNotFound(String),
    #[error("invalid response from customers service: {0}")]
    InvalidResponse(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Customer {
    #[serde(rename = "customerID")]
    pub customer_id: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(rename = "type")]
    pub customer_type: CustomerType,
    pub status: CustomerStatus,
}

impl Customer {
    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    #[serde(rename = "accountID")]
    pub account_id: String,
    pub routing_number: String,
    #[serde(rename = "type")]
    pub account_type: AccountType,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TransitAccountNumber {
    account_number: String,
}

/// HTTP client for the customers service.
#[derive(Clone)]
pub struct CustomersClient {
    client: Client,
    base_url: String,
}

impl CustomersClient {
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_default();

        CustomersClient { client, base_url }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    pub async fn ping(&self) -> Result<(), CustomerError> {
        let response = self.client.get(self.url("/ping")).send().await?;
        if !response.status().is_success() {
            return Err(CustomerError::InvalidResponse(format!(
                "ping returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    pub async fn get_customer(&self, customer_id: &str) -> Result<Customer, CustomerError> {
        let url = self.url(&format!("/customers/{customer_id}"));
        let response = self.client.get(&url).send().await?;
        if response.status() == 404 {
            return Err(CustomerError::CustomerNotFound(customer_id.to_string()));
        }
        Ok(response.json::<Customer>().await?)
    }

    pub async fn get_account(
        &self,
        customer_id: &str,
        account_id: &str,
    ) -> Result<Account, CustomerError> {
        let url = self.url(&format!("/customers/{customer_id}/accounts/{account_id}"));
        let response = self.client.get(&url).send().await?;
        if response.status() == 404 {
            return Err(CustomerError::AccountNotFound(account_id.to_string()));
        }
        Ok(response.json::<Account>().await?)
    }

    /// Fetches the decrypted account number for building entry details.
    pub async fn get_account_number(
        &self,
        customer_id: &str,
        account_id: &str,
    ) -> Result<String, CustomerError> {
        let url = self.url(&format!(
            "/customers/{customer_id}/accounts/{account_id}/decrypt"
        ));
        let response = self.client.post(&url).send().await?;
        if response.status() == 404 {
            return Err(CustomerError::AccountNotFound(account_id.to_string()));
        }
        let transit = response.json::<TransitAccountNumber>().await?;
        if transit.account_number.is_empty() {
            return Err(CustomerError::InvalidResponse(
                "empty decrypted account number".to_string(),
            ));
        }
        Ok(transit.account_number)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_trims_trailing_slash() {
        let client = CustomersClient::new("http://localhost:8087/".to_string());
        assert_eq!(client.url("/ping"), "http://localhost:8087/ping");
    }

    #[tokio::test]
    async fn get_customer_with_mock() {
        let mut server = mockito::Server::new_async().await;

        let body = r#"{
            "customerID": "cust-1",
            "firstName": "Jane",
            "lastName": "Doe",
            "type": "individual",
            "status": "verified"
        }"#;
        let _mock = server
            .mock("GET", "/customers/cust-1")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body)
            .create_async()
            .await;

        let client = CustomersClient::new(server.url());
        let customer = client.get_customer("cust-1").await.unwrap();
        assert_eq!(customer.customer_id, "cust-1");
        assert_eq!(customer.display_name(), "Jane Doe");
        assert!(customer.status.allows_debit());
        assert!(customer.customer_type.is_consumer());
    }

    #[tokio::test]
    async fn get_customer_not_found() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/customers/missing")
            .with_status(404)
            .create_async()
            .await;

        let client = CustomersClient::new(server.url());
        let result = client.get_customer("missing").await;
        assert!(matches!(result, Err(CustomerError::CustomerNotFound(_))));
    }

    #[tokio::test]
    async fn decrypt_account_number() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/customers/cust-1/accounts/acct-1/decrypt")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"accountNumber": "123456789"}"#)
            .create_async()
            .await;

        let client = CustomersClient::new(server.url());
        let number = client.get_account_number("cust-1", "acct-1").await.unwrap();
        assert_eq!(number, "123456789");
    }
}
