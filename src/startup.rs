//! Startup validation: the process refuses to serve until its collaborators
//! answer.

use anyhow::{Context, Result};
use sqlx::PgPool;
use std::sync::Arc;

use crate::config::Config;
use crate::customers::CustomersClient;
use crate::upload::Agent;

pub struct ValidationReport {
    pub environment: bool,
    pub database: bool,
    pub upload_agent: bool,
    pub customers: bool,
    pub errors: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        // the upload agent being down is logged but not fatal: the issue may
        // resolve before the next cutoff without a restart
        self.environment && self.database && self.customers
    }

    pub fn log(&self) {
        tracing::info!(
            environment = self.environment,
            database = self.database,
            upload_agent = self.upload_agent,
            customers = self.customers,
            "startup validation"
        );
        for error in &self.errors {
            tracing::error!("startup validation: {error}");
        }
    }
}

pub async fn validate_environment(
    config: &Config,
    pool: &PgPool,
    agent: &Arc<dyn Agent>,
    customers: &CustomersClient,
) -> Result<ValidationReport> {
    let mut report = ValidationReport {
        environment: true,
        database: true,
        upload_agent: true,
        customers: true,
        errors: Vec::new(),
    };

    if let Err(e) = validate_config(config) {
        report.environment = false;
        report.errors.push(format!("environment: {e}"));
    }

    if let Err(e) = validate_database(pool).await {
        report.database = false;
        report.errors.push(format!("database: {e}"));
    }

    if let Err(e) = agent.ping().await {
        report.upload_agent = false;
        report.errors.push(format!("upload agent: {e}"));
    }

    if let Err(e) = customers.ping().await {
        report.customers = false;
        report.errors.push(format!("customers: {e}"));
    }

    Ok(report)
}

fn validate_config(config: &Config) -> Result<()> {
    if config.database_url.is_empty() {
        anyhow::bail!("DATABASE_URL is empty");
    }
    if config.odfi.cutoffs.windows.is_empty() {
        anyhow::bail!("no cutoff windows configured");
    }
    url::Url::parse(&config.customers_base_url)
        .context("CUSTOMERS_BASE_URL is not a valid URL")?;
    if !crate::ach::valid_routing_number(&config.odfi.routing_number)
        && config.odfi.routing_number.len() == 9
    {
        anyhow::bail!(
            "ODFI_ROUTING_NUMBER {} has an invalid check digit",
            config.odfi.routing_number
        );
    }
    Ok(())
}

async fn validate_database(pool: &PgPool) -> Result<()> {
    sqlx::query("SELECT 1")
        .fetch_one(pool)
        .await
        .context("failed to connect to database")?;

    let applied: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM _sqlx_migrations")
        .fetch_one(pool)
        .await
        .context("failed to check migrations table")?;
    if applied == 0 {
        anyhow::bail!("no migrations applied");
    }
    Ok(())
}
