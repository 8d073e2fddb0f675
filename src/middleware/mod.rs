pub mod idempotency;
pub mod organization;
pub mod request_logger;
