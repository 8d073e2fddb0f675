//! Dependency health checks backing the readiness probe.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;

use crate::customers::CustomersClient;
use crate::upload::Agent;

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum DependencyStatus {
    Healthy { status: String, latency_ms: u64 },
    Unhealthy { status: String, error: String },
}

impl DependencyStatus {
    fn healthy(latency: Duration) -> Self {
        DependencyStatus::Healthy {
            status: "healthy".to_string(),
            latency_ms: latency.as_millis() as u64,
        }
    }

    fn unhealthy(error: impl ToString) -> Self {
        DependencyStatus::Unhealthy {
            status: "unhealthy".to_string(),
            error: error.to_string(),
        }
    }

    pub fn is_healthy(&self) -> bool {
        matches!(self, DependencyStatus::Healthy { .. })
    }
}

#[async_trait]
pub trait DependencyChecker: Send + Sync {
    async fn check(&self) -> DependencyStatus;
}

pub struct PostgresChecker {
    pool: sqlx::PgPool,
}

impl PostgresChecker {
    pub fn new(pool: sqlx::PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DependencyChecker for PostgresChecker {
    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => DependencyStatus::healthy(start.elapsed()),
            Err(e) => DependencyStatus::unhealthy(e),
        }
    }
}

pub struct RedisChecker {
    url: String,
}

impl RedisChecker {
    pub fn new(url: String) -> Self {
        Self { url }
    }
}

#[async_trait]
impl DependencyChecker for RedisChecker {
    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        let client = match redis::Client::open(self.url.as_str()) {
            Ok(client) => client,
            Err(e) => return DependencyStatus::unhealthy(e),
        };
        match client.get_multiplexed_async_connection().await {
            Ok(mut conn) => match redis::cmd("PING").query_async::<_, String>(&mut conn).await {
                Ok(_) => DependencyStatus::healthy(start.elapsed()),
                Err(e) => DependencyStatus::unhealthy(e),
            },
            Err(e) => DependencyStatus::unhealthy(e),
        }
    }
}

pub struct UploadAgentChecker {
    agent: Arc<dyn Agent>,
}

impl UploadAgentChecker {
    pub fn new(agent: Arc<dyn Agent>) -> Self {
        Self { agent }
    }
}

#[async_trait]
impl DependencyChecker for UploadAgentChecker {
    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        match self.agent.ping().await {
            Ok(()) => DependencyStatus::healthy(start.elapsed()),
            Err(e) => DependencyStatus::unhealthy(e),
        }
    }
}

pub struct CustomersChecker {
    client: CustomersClient,
}

impl CustomersChecker {
    pub fn new(client: CustomersClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl DependencyChecker for CustomersChecker {
    async fn check(&self) -> DependencyStatus {
        let start = Instant::now();
        match self.client.ping().await {
            Ok(()) => DependencyStatus::healthy(start.elapsed()),
            Err(e) => DependencyStatus::unhealthy(e),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthReport {
    pub status: String,
    pub dependencies: std::collections::HashMap<String, DependencyStatus>,
}

impl HealthReport {
    pub fn healthy(&self) -> bool {
        self.status == "healthy"
    }
}

const CHECK_TIMEOUT: Duration = Duration::from_secs(5);

pub async fn check_health(
    checkers: &[(String, Box<dyn DependencyChecker>)],
) -> HealthReport {
    let mut dependencies = std::collections::HashMap::new();
    for (name, checker) in checkers {
        let status = match tokio::time::timeout(CHECK_TIMEOUT, checker.check()).await {
            Ok(status) => status,
            Err(_) => DependencyStatus::unhealthy("timeout"),
        };
        dependencies.insert(name.clone(), status);
    }

    let status = if dependencies.values().all(DependencyStatus::is_healthy) {
        "healthy"
    } else {
        "unhealthy"
    };
    HealthReport {
        status: status.to_string(),
        dependencies,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysHealthy;
    struct AlwaysFailing;

    #[async_trait]
    impl DependencyChecker for AlwaysHealthy {
        async fn check(&self) -> DependencyStatus {
            DependencyStatus::healthy(Duration::from_millis(1))
        }
    }

    #[async_trait]
    impl DependencyChecker for AlwaysFailing {
        async fn check(&self) -> DependencyStatus {
            DependencyStatus::unhealthy("connection refused")
        }
    }

    #[tokio::test]
    async fn all_healthy_reports_healthy() {
        let checkers: Vec<(String, Box<dyn DependencyChecker>)> =
            vec![("db".into(), Box::new(AlwaysHealthy))];
        let report = check_health(&checkers).await;
        assert!(report.healthy());
    }

    #[tokio::test]
    async fn one_failure_reports_unhealthy() {
        let checkers: Vec<(String, Box<dyn DependencyChecker>)> = vec![
            ("db".into(), Box::new(AlwaysHealthy)),
            ("upload".into(), Box::new(AlwaysFailing)),
        ];
        let report = check_health(&checkers).await;
        assert!(!report.healthy());
        assert!(!report.dependencies["upload"].is_healthy());
    }

    #[test]
    fn status_serialization_shape() {
        let healthy = DependencyStatus::healthy(Duration::from_millis(42));
        let json = serde_json::to_value(&healthy).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["latency_ms"], 42);
        assert!(json.get("error").is_none());

        let unhealthy = DependencyStatus::unhealthy("timeout");
        let json = serde_json::to_value(&unhealthy).unwrap();
        assert_eq!(json["error"], "timeout");
    }
}
