//! Redis-backed idempotency for transfer creation.
//!
//! Clients may send an `X-Idempotency-Key` header on `POST /transfers`; a
//! repeated key within 24 hours returns the recorded outcome instead of
//! creating a second transfer. Redis being down fails open — a duplicate
//! transfer is preferable to rejecting legitimate ones.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};

const IDEMPOTENCY_TTL: u64 = 86_400; // 24 hours in seconds
const PROCESSING_TTL: u64 = 300;
const IDEMPOTENCY_PREFIX: &str = "idempotency:";

pub const IDEMPOTENCY_HEADER: &str = "x-idempotency-key";

#[derive(Clone)]
pub struct IdempotencyService {
    redis_client: redis::Client,
}

#[derive(Debug, Serialize, Deserialize)]
struct CachedResponse {
    status: u16,
    body: String,
}

#[derive(Debug)]
pub enum IdempotencyStatus {
    New,
    Processing,
    Completed(u16, String),
}

impl IdempotencyService {
    pub fn new(redis_url: &str) -> anyhow::Result<Self> {
        let redis_client = redis::Client::open(redis_url)?;
        Ok(Self { redis_client })
    }

    pub async fn check(&self, key: &str) -> anyhow::Result<IdempotencyStatus> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let key = format!("{IDEMPOTENCY_PREFIX}{key}");

        let existing: Option<String> = conn.get(&key).await?;
        match existing {
            Some(value) if value == "PROCESSING" => Ok(IdempotencyStatus::Processing),
            Some(value) => {
                let cached: CachedResponse = serde_json::from_str(&value)?;
                Ok(IdempotencyStatus::Completed(cached.status, cached.body))
            }
            None => {
                let _: () = conn.set_ex(&key, "PROCESSING", PROCESSING_TTL).await?;
                Ok(IdempotencyStatus::New)
            }
        }
    }

    pub async fn store(&self, key: &str, status: u16, body: String) -> anyhow::Result<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let key = format!("{IDEMPOTENCY_PREFIX}{key}");
        let serialized = serde_json::to_string(&CachedResponse { status, body })?;
        let _: () = conn.set_ex(&key, serialized, IDEMPOTENCY_TTL).await?;
        Ok(())
    }

    pub async fn release(&self, key: &str) -> anyhow::Result<()> {
        let mut conn = self.redis_client.get_multiplexed_async_connection().await?;
        let key = format!("{IDEMPOTENCY_PREFIX}{key}");
        let _: () = conn.del(&key).await?;
        Ok(())
    }
}

pub async fn idempotency_middleware(
    State(service): State<IdempotencyService>,
    request: Request,
    next: Next,
) -> Response {
    // only creation requests carry idempotency semantics
    if request.method() != axum::http::Method::POST {
        return next.run(request).await;
    }
    let key = match request.headers().get(IDEMPOTENCY_HEADER) {
        Some(value) => match value.to_str() {
            Ok(key) => key.to_string(),
            Err(_) => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(serde_json::json!({"error": "invalid idempotency key"})),
                )
                    .into_response();
            }
        },
        // no key means no idempotency semantics were requested
        None => return next.run(request).await,
    };

    match service.check(&key).await {
        Ok(IdempotencyStatus::New) => {
            let response = next.run(request).await;
            let status = response.status();
            if status.is_success() {
                let (parts, body) = response.into_parts();
                let bytes = match axum::body::to_bytes(body, usize::MAX).await {
                    Ok(bytes) => bytes,
                    Err(_) => return StatusCode::INTERNAL_SERVER_ERROR.into_response(),
                };
                let body_text = String::from_utf8_lossy(&bytes).to_string();
                if let Err(err) = service.store(&key, status.as_u16(), body_text).await {
                    tracing::error!(error = %err, "failed to store idempotent response");
                }
                Response::from_parts(parts, axum::body::Body::from(bytes))
            } else {
                if let Err(err) = service.release(&key).await {
                    tracing::error!(error = %err, "failed to release idempotency lock");
                }
                response
            }
        }
        Ok(IdempotencyStatus::Processing) => (
            StatusCode::CONFLICT,
            Json(serde_json::json!({
                "error": "a request with this idempotency key is in flight",
            })),
        )
            .into_response(),
        Ok(IdempotencyStatus::Completed(status, body)) => {
            let status = StatusCode::from_u16(status).unwrap_or(StatusCode::OK);
            let mut response = Response::new(axum::body::Body::from(body));
            *response.status_mut() = status;
            response.headers_mut().insert(
                axum::http::header::CONTENT_TYPE,
                axum::http::HeaderValue::from_static("application/json"),
            );
            response
        }
        Err(err) => {
            // fail open on Redis trouble
            tracing::error!(error = %err, "idempotency check failed");
            next.run(request).await
        }
    }
}
