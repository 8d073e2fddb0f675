//! Tenant identification. Every tenant-facing request carries the
//! organization in the `X-Organization` header.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

pub const ORGANIZATION_HEADER: &str = "x-organization";

pub struct Organization(pub String);

#[axum::async_trait]
impl<S> FromRequestParts<S> for Organization
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match parts
            .headers
            .get(ORGANIZATION_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
        {
            Some(organization) => Ok(Organization(organization.to_string())),
            None => Err((
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "missing X-Organization header"})),
            )
                .into_response()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    #[tokio::test]
    async fn extracts_the_header() {
        let request = Request::builder()
            .header("X-Organization", "acme")
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();
        let Organization(org) = Organization::from_request_parts(&mut parts, &())
            .await
            .expect("header present");
        assert_eq!(org, "acme");
    }

    #[tokio::test]
    async fn missing_header_is_a_bad_request() {
        let request = Request::builder().body(()).unwrap();
        let (mut parts, _) = request.into_parts();
        let rejection = Organization::from_request_parts(&mut parts, &())
            .await
            .err()
            .expect("header absent");
        assert_eq!(rejection.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn blank_header_is_rejected() {
        let request = Request::builder()
            .header("X-Organization", "   ")
            .body(())
            .unwrap();
        let (mut parts, _) = request.into_parts();
        assert!(Organization::from_request_parts(&mut parts, &())
            .await
            .is_err());
    }
}
