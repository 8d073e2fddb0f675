pub mod transfer;

pub use transfer::{
    AccountType, Amount, CreateEndpoint, CreateTransfer, Endpoint, Transfer, TransferStatus,
};
