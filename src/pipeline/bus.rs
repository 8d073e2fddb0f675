//! Transfer bus: at-least-once delivery of accepted transfer IDs from the
//! API process to the aggregator.
//!
//! The payload is the transfer ID only; consumers re-read the authoritative
//! record from the repository. Ordering is not guaranteed — the merge
//! buffer deduplicates by ID. Two substrates exist: an in-process channel
//! and Redis Streams with a consumer group for multi-process deployments.

use async_trait::async_trait;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::AsyncCommands;
use tokio::sync::{mpsc, Mutex};

use crate::config::StreamConfig;

#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("bus unavailable: {0}")]
    Unavailable(String),
    #[error("publish failed: {0}")]
    PublishFailed(String),
}

/// A delivered message; `delivery_id` carries the substrate acknowledgment
/// token where one exists.
#[derive(Debug, Clone)]
pub struct BusMessage {
    pub transfer_id: String,
    delivery_id: Option<String>,
}

#[async_trait]
pub trait TransferPublisher: Send + Sync {
    async fn publish(&self, transfer_id: &str) -> Result<(), BusError>;
}

#[async_trait]
pub trait TransferSubscription: Send + Sync {
    /// Waits for the next message; `None` once the bus has shut down.
    async fn recv(&mut self) -> Option<BusMessage>;

    /// Tries to take a message without waiting, used by the cutoff grace
    /// drain.
    async fn try_recv(&mut self) -> Option<BusMessage>;

    async fn ack(&mut self, message: &BusMessage) -> Result<(), BusError>;
}

// --- in-memory substrate ---

#[derive(Clone)]
pub struct InMemPublisher {
    tx: mpsc::Sender<String>,
}

pub struct InMemSubscription {
    rx: mpsc::Receiver<String>,
}

/// Builds the single-process bus pair.
pub fn inmem() -> (InMemPublisher, InMemSubscription) {
    let (tx, rx) = mpsc::channel(1024);
    (InMemPublisher { tx }, InMemSubscription { rx })
}

#[async_trait]
impl TransferPublisher for InMemPublisher {
    async fn publish(&self, transfer_id: &str) -> Result<(), BusError> {
        self.tx
            .send(transfer_id.to_string())
            .await
            .map_err(|e| BusError::PublishFailed(e.to_string()))
    }
}

#[async_trait]
impl TransferSubscription for InMemSubscription {
    async fn recv(&mut self) -> Option<BusMessage> {
        self.rx.recv().await.map(|transfer_id| BusMessage {
            transfer_id,
            delivery_id: None,
        })
    }

    async fn try_recv(&mut self) -> Option<BusMessage> {
        self.rx.try_recv().ok().map(|transfer_id| BusMessage {
            transfer_id,
            delivery_id: None,
        })
    }

    async fn ack(&mut self, _message: &BusMessage) -> Result<(), BusError> {
        Ok(())
    }
}

// --- Redis Streams substrate ---

const TRANSFER_ID_FIELD: &str = "transfer_id";
const CONSUMER_NAME: &str = "aggregator-1";

pub struct RedisPublisher {
    conn: Mutex<redis::aio::MultiplexedConnection>,
    stream: String,
}

impl RedisPublisher {
    pub async fn connect(url: &str, stream: String) -> Result<Self, BusError> {
        let client =
            redis::Client::open(url).map_err(|e| BusError::Unavailable(e.to_string()))?;
        let conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BusError::Unavailable(e.to_string()))?;
        Ok(RedisPublisher {
            conn: Mutex::new(conn),
            stream,
        })
    }
}

#[async_trait]
impl TransferPublisher for RedisPublisher {
    async fn publish(&self, transfer_id: &str) -> Result<(), BusError> {
        let mut conn = self.conn.lock().await;
        let _: String = conn
            .xadd(&self.stream, "*", &[(TRANSFER_ID_FIELD, transfer_id)])
            .await
            .map_err(|e| BusError::PublishFailed(e.to_string()))?;
        Ok(())
    }
}

pub struct RedisSubscription {
    conn: redis::aio::MultiplexedConnection,
    stream: String,
    group: String,
    /// Unacknowledged deliveries from a previous process are replayed before
    /// new messages, preserving at-least-once behavior across restarts.
    backlog: bool,
    buffered: Vec<BusMessage>,
}

impl RedisSubscription {
    pub async fn connect(url: &str, stream: String, group: String) -> Result<Self, BusError> {
        let client =
            redis::Client::open(url).map_err(|e| BusError::Unavailable(e.to_string()))?;
        let mut conn = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| BusError::Unavailable(e.to_string()))?;

        let created: Result<String, _> = conn
            .xgroup_create_mkstream(&stream, &group, "$")
            .await;
        if let Err(err) = created {
            // BUSYGROUP means the group already exists, which is fine
            if !err.to_string().contains("BUSYGROUP") {
                return Err(BusError::Unavailable(err.to_string()));
            }
        }

        Ok(RedisSubscription {
            conn,
            stream,
            group,
            backlog: true,
            buffered: Vec::new(),
        })
    }

    async fn read(&mut self, block_ms: usize) -> Option<BusMessage> {
        if let Some(message) = self.buffered.pop() {
            return Some(message);
        }
        loop {
            let id = if self.backlog { "0" } else { ">" };
            let mut options = StreamReadOptions::default()
                .group(&self.group, CONSUMER_NAME)
                .count(16);
            if block_ms > 0 {
                options = options.block(block_ms);
            }
            let reply: Result<StreamReadReply, _> = self
                .conn
                .xread_options(&[&self.stream], &[id], &options)
                .await;
            let reply = match reply {
                Ok(reply) => reply,
                Err(err) => {
                    tracing::error!(error = %err, "transfer bus read failed");
                    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
                    continue;
                }
            };

            let mut messages = Vec::new();
            for key in reply.keys {
                for entry in key.ids {
                    if let Some(transfer_id) = entry.get::<String>(TRANSFER_ID_FIELD) {
                        messages.push(BusMessage {
                            transfer_id,
                            delivery_id: Some(entry.id.clone()),
                        });
                    }
                }
            }
            if messages.is_empty() {
                if self.backlog {
                    // pending entries exhausted, switch to new deliveries
                    self.backlog = false;
                    continue;
                }
                return None;
            }
            messages.reverse();
            let first = messages.pop();
            self.buffered = messages;
            return first;
        }
    }
}

#[async_trait]
impl TransferSubscription for RedisSubscription {
    async fn recv(&mut self) -> Option<BusMessage> {
        loop {
            if let Some(message) = self.read(5_000).await {
                return Some(message);
            }
        }
    }

    async fn try_recv(&mut self) -> Option<BusMessage> {
        self.read(0).await
    }

    async fn ack(&mut self, message: &BusMessage) -> Result<(), BusError> {
        if let Some(delivery_id) = &message.delivery_id {
            let _: i64 = self
                .conn
                .xack(&self.stream, &self.group, &[delivery_id])
                .await
                .map_err(|e| BusError::Unavailable(e.to_string()))?;
        }
        Ok(())
    }
}

/// Builds the configured publisher/subscription pair.
pub async fn from_config(
    stream: &StreamConfig,
) -> Result<
    (
        std::sync::Arc<dyn TransferPublisher>,
        Box<dyn TransferSubscription>,
    ),
    BusError,
> {
    match stream {
        StreamConfig::InMem => {
            let (publisher, subscription) = inmem();
            Ok((std::sync::Arc::new(publisher), Box::new(subscription)))
        }
        StreamConfig::Redis {
            url,
            stream,
            consumer_group,
        } => {
            let publisher = RedisPublisher::connect(url, stream.clone()).await?;
            let subscription =
                RedisSubscription::connect(url, stream.clone(), consumer_group.clone()).await?;
            Ok((std::sync::Arc::new(publisher), Box::new(subscription)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn inmem_round_trip() {
        let (publisher, mut subscription) = inmem();
        publisher.publish("transfer-1").await.unwrap();
        publisher.publish("transfer-2").await.unwrap();

        let first = subscription.recv().await.unwrap();
        assert_eq!(first.transfer_id, "transfer-1");
        subscription.ack(&first).await.unwrap();

        let second = subscription.try_recv().await.unwrap();
        assert_eq!(second.transfer_id, "transfer-2");
        assert!(subscription.try_recv().await.is_none());
    }

    #[tokio::test]
    async fn inmem_recv_returns_none_when_publisher_drops() {
        let (publisher, mut subscription) = inmem();
        drop(publisher);
        assert!(subscription.recv().await.is_none());
    }
}
