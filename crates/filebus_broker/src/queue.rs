use async_trait::async_trait;
use filebus_contract::QueueEnvelope;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("queue connection closed")]
    Closed,
    #[error("queue send failure: {0}")]
    SendFailed(String),
    #[error("queue receive failure: {0}")]
    ReceiveFailed(String),
    #[error("message disposition failed: {0}")]
    DispositionFailed(String),
}

/// Sending half of the queue. Publish failures leave the source of truth (the
/// caller's file) untouched; the caller decides whether to retry.
#[async_trait]
pub trait QueueSender: Send + Sync {
    async fn send(&self, envelope: QueueEnvelope) -> Result<(), BrokerError>;

    /// Releases the sender handle. Idempotent.
    async fn close(&self);
}

/// Receiving half of the queue, bounded to one leased message per `recv` call.
#[async_trait]
pub trait QueueReceiver: Send + Sync {
    /// Waits for the next message and leases it to the caller. Returns `None`
    /// once the connection is closed and the queue has drained its waiters.
    async fn recv(&self) -> Result<Option<LeasedMessage>, BrokerError>;

    /// Releases the receiver handle. Idempotent.
    async fn close(&self);
}

/// Temporary ownership of one delivered message.
///
/// Exactly one disposition consumes the lease: `complete` removes the message
/// permanently, `abandon` returns it for redelivery, `dead_letter` parks it
/// for operator reconciliation. A lease dropped without a disposition lapses
/// and the message becomes eligible for redelivery.
#[async_trait]
pub trait Lease: Send {
    fn envelope(&self) -> &QueueEnvelope;

    /// Number of delivery attempts including the current one.
    fn delivery_count(&self) -> u32;

    async fn complete(self: Box<Self>) -> Result<(), BrokerError>;

    async fn abandon(self: Box<Self>) -> Result<(), BrokerError>;

    async fn dead_letter(self: Box<Self>, reason: &str) -> Result<(), BrokerError>;
}

pub type LeasedMessage = Box<dyn Lease>;
