pub mod admin;
pub mod org_config;
pub mod transfers;

use std::sync::Arc;

use crate::config::OdfiConfig;
use crate::customers::CustomersClient;
use crate::pipeline::TransferPublisher;
use crate::ports::TransferRepository;

/// Shared state for the tenant-facing API.
#[derive(Clone)]
pub struct AppState {
    pub repo: Arc<dyn TransferRepository>,
    pub customers: CustomersClient,
    pub publisher: Arc<dyn TransferPublisher>,
    pub odfi: OdfiConfig,
}
