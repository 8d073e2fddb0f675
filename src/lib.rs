pub mod ach;
pub mod adapters;
pub mod config;
pub mod customers;
pub mod db;
pub mod domain;
pub mod error;
pub mod fundflow;
pub mod handlers;
pub mod health;
pub mod inbound;
pub mod metrics;
pub mod middleware;
pub mod notify;
pub mod pipeline;
pub mod ports;
pub mod schedule;
pub mod startup;
pub mod upload;

use axum::{
    middleware as axum_middleware,
    routing::{get, put},
    Router,
};
use tower_http::cors::CorsLayer;

pub use error::AppError;
pub use handlers::admin::AdminState;
pub use handlers::AppState;

use middleware::idempotency::{idempotency_middleware, IdempotencyService};

/// Builds the tenant-facing API router.
pub fn create_app(state: AppState, idempotency: Option<IdempotencyService>) -> Router {
    let mut app = Router::new()
        .route(
            "/transfers",
            axum::routing::post(handlers::transfers::create_transfer)
                .get(handlers::transfers::list_transfers),
        )
        .route(
            "/transfers/:id",
            get(handlers::transfers::get_transfer).delete(handlers::transfers::delete_transfer),
        )
        .route(
            "/configuration/transfers",
            get(handlers::org_config::get_configuration)
                .put(handlers::org_config::update_configuration),
        )
        .with_state(state);

    if let Some(service) = idempotency {
        app = app.layer(axum_middleware::from_fn_with_state(
            service,
            idempotency_middleware,
        ));
    }

    app.layer(axum_middleware::from_fn(
        middleware::request_logger::request_logger_middleware,
    ))
    .layer(CorsLayer::permissive())
}

/// Builds the back-office router served on the admin port.
pub fn create_admin_app(state: AdminState) -> Router {
    Router::new()
        .route("/version", get(handlers::admin::version))
        .route("/live", get(handlers::admin::live))
        .route("/ready", get(handlers::admin::ready))
        .route("/metrics", get(handlers::admin::metrics_handler))
        .route("/trigger-cutoff", put(handlers::admin::trigger_cutoff))
        .route(
            "/transfers/:id/status",
            put(handlers::admin::update_transfer_status),
        )
        .with_state(state)
}
