pub mod postgres_transfer_repository;

pub use postgres_transfer_repository::PostgresTransferRepository;
