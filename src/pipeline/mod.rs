//! Transfer aggregation pipeline: bus, durable merge buffer and the cutoff
//! aggregator that turns spooled transfers into uploaded NACHA files.

pub mod aggregator;
pub mod bus;
pub mod merge;

pub use aggregator::Aggregator;
pub use bus::{BusError, BusMessage, TransferPublisher, TransferSubscription};
pub use merge::{Generation, MergeBuffer, MergeError};
