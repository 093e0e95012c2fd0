use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use filebus_contract::QueueEnvelope;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::queue::{BrokerError, Lease, LeasedMessage, QueueReceiver, QueueSender};

const DEFAULT_MAX_DELIVERY_COUNT: u32 = 10;

#[derive(Debug, Clone)]
pub struct MemoryQueueOptions {
    pub queue_name: String,
    /// Abandoning a message at or past this attempt count dead-letters it
    /// instead of requeueing.
    pub max_delivery_count: u32,
}

impl MemoryQueueOptions {
    pub fn new(queue_name: &str) -> Self {
        Self {
            queue_name: queue_name.to_string(),
            max_delivery_count: DEFAULT_MAX_DELIVERY_COUNT,
        }
    }
}

/// A message parked after a permanent failure or too many delivery attempts.
#[derive(Debug, Clone)]
pub struct DeadLetter {
    pub envelope: QueueEnvelope,
    pub delivery_count: u32,
    pub reason: String,
}

#[derive(Debug)]
struct StoredMessage {
    envelope: QueueEnvelope,
    delivery_count: u32,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<StoredMessage>,
    dead: Vec<DeadLetter>,
    closed: bool,
}

#[derive(Debug)]
struct Shared {
    state: Mutex<QueueState>,
    notify: Notify,
    options: MemoryQueueOptions,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// In-memory queue with at-least-once delivery, per-message leases and a
/// dead-letter area. One instance is the connection; senders and receivers
/// are cheap handles onto it.
#[derive(Debug, Clone)]
pub struct MemoryQueue {
    shared: Arc<Shared>,
}

impl MemoryQueue {
    pub fn connect(options: MemoryQueueOptions) -> Self {
        info!(
            queue = %options.queue_name,
            max_delivery_count = options.max_delivery_count,
            "in-memory queue ready"
        );
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(QueueState::default()),
                notify: Notify::new(),
                options,
            }),
        }
    }

    pub fn create_sender(&self) -> Arc<dyn QueueSender> {
        Arc::new(MemorySender {
            shared: Arc::clone(&self.shared),
        })
    }

    pub fn create_receiver(&self) -> Arc<dyn QueueReceiver> {
        Arc::new(MemoryReceiver {
            shared: Arc::clone(&self.shared),
        })
    }

    pub fn ready_len(&self) -> usize {
        self.shared.lock().ready.len()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.shared.lock().dead.clone()
    }

    /// Closes the connection: pending and future `recv` calls observe the end
    /// of the queue, and sends are rejected.
    pub async fn close(&self) {
        self.shared.lock().closed = true;
        self.shared.notify.notify_waiters();
        info!(queue = %self.shared.options.queue_name, "queue connection released");
    }
}

struct MemorySender {
    shared: Arc<Shared>,
}

#[async_trait]
impl QueueSender for MemorySender {
    async fn send(&self, envelope: QueueEnvelope) -> Result<(), BrokerError> {
        let mut state = self.shared.lock();
        if state.closed {
            return Err(BrokerError::Closed);
        }
        debug!(
            message_id = %envelope.message_id,
            file_name = %envelope.file_name,
            "message enqueued"
        );
        state.ready.push_back(StoredMessage {
            envelope,
            delivery_count: 0,
        });
        drop(state);
        self.shared.notify.notify_one();
        Ok(())
    }

    async fn close(&self) {
        info!(queue = %self.shared.options.queue_name, "queue sender released");
    }
}

struct MemoryReceiver {
    shared: Arc<Shared>,
}

#[async_trait]
impl QueueReceiver for MemoryReceiver {
    async fn recv(&self) -> Result<Option<LeasedMessage>, BrokerError> {
        loop {
            let notified = self.shared.notify.notified();
            {
                let mut state = self.shared.lock();
                if state.closed {
                    return Ok(None);
                }
                if let Some(mut stored) = state.ready.pop_front() {
                    stored.delivery_count += 1;
                    return Ok(Some(Box::new(MemoryLease {
                        envelope: stored.envelope,
                        delivery_count: stored.delivery_count,
                        disposed: false,
                        shared: Arc::clone(&self.shared),
                    })));
                }
            }
            notified.await;
        }
    }

    async fn close(&self) {
        info!(queue = %self.shared.options.queue_name, "queue receiver released");
    }
}

struct MemoryLease {
    envelope: QueueEnvelope,
    delivery_count: u32,
    disposed: bool,
    shared: Arc<Shared>,
}

impl MemoryLease {
    fn requeue_front(&self) {
        let mut state = self.shared.lock();
        state.ready.push_front(StoredMessage {
            envelope: self.envelope.clone(),
            delivery_count: self.delivery_count,
        });
        drop(state);
        self.shared.notify.notify_one();
    }

    fn park(&self, reason: &str) {
        let mut state = self.shared.lock();
        state.dead.push(DeadLetter {
            envelope: self.envelope.clone(),
            delivery_count: self.delivery_count,
            reason: reason.to_string(),
        });
    }
}

#[async_trait]
impl Lease for MemoryLease {
    fn envelope(&self) -> &QueueEnvelope {
        &self.envelope
    }

    fn delivery_count(&self) -> u32 {
        self.delivery_count
    }

    async fn complete(mut self: Box<Self>) -> Result<(), BrokerError> {
        self.disposed = true;
        debug!(message_id = %self.envelope.message_id, "message completed");
        Ok(())
    }

    async fn abandon(mut self: Box<Self>) -> Result<(), BrokerError> {
        self.disposed = true;
        if self.delivery_count >= self.shared.options.max_delivery_count {
            warn!(
                message_id = %self.envelope.message_id,
                delivery_count = self.delivery_count,
                "delivery count limit reached, dead-lettering message"
            );
            self.park("delivery count limit reached");
        } else {
            self.requeue_front();
        }
        Ok(())
    }

    async fn dead_letter(mut self: Box<Self>, reason: &str) -> Result<(), BrokerError> {
        self.disposed = true;
        warn!(
            message_id = %self.envelope.message_id,
            reason,
            "message dead-lettered"
        );
        self.park(reason);
        Ok(())
    }
}

impl Drop for MemoryLease {
    fn drop(&mut self) {
        // A lapsed lease makes the message eligible for redelivery.
        if !self.disposed {
            self.requeue_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{MemoryQueue, MemoryQueueOptions};
    use filebus_contract::{QueueEnvelope, TransferMessage};

    fn envelope(name: &str) -> QueueEnvelope {
        let message = TransferMessage::package("op-1", name, "hello".to_string());
        QueueEnvelope::wrap(&message).expect("wrap")
    }

    #[tokio::test]
    async fn complete_removes_the_message() {
        let queue = MemoryQueue::connect(MemoryQueueOptions::new("q"));
        let sender = queue.create_sender();
        let receiver = queue.create_receiver();

        sender.send(envelope("a.txt")).await.expect("send");
        let lease = receiver.recv().await.expect("recv").expect("message");
        assert_eq!(lease.delivery_count(), 1);
        lease.complete().await.expect("complete");

        assert_eq!(queue.ready_len(), 0);
        assert!(queue.dead_letters().is_empty());
    }

    #[tokio::test]
    async fn abandon_redelivers_with_incremented_count() {
        let queue = MemoryQueue::connect(MemoryQueueOptions::new("q"));
        let sender = queue.create_sender();
        let receiver = queue.create_receiver();

        sender.send(envelope("a.txt")).await.expect("send");
        let first = receiver.recv().await.expect("recv").expect("message");
        let message_id = first.envelope().message_id.clone();
        first.abandon().await.expect("abandon");

        let second = receiver.recv().await.expect("recv").expect("redelivery");
        assert_eq!(second.envelope().message_id, message_id);
        assert_eq!(second.delivery_count(), 2);
    }

    #[tokio::test]
    async fn abandon_past_the_limit_dead_letters() {
        let mut options = MemoryQueueOptions::new("q");
        options.max_delivery_count = 2;
        let queue = MemoryQueue::connect(options);
        let sender = queue.create_sender();
        let receiver = queue.create_receiver();

        sender.send(envelope("a.txt")).await.expect("send");
        for _ in 0..2 {
            let lease = receiver.recv().await.expect("recv").expect("message");
            lease.abandon().await.expect("abandon");
        }

        assert_eq!(queue.ready_len(), 0);
        let dead = queue.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].delivery_count, 2);
        assert_eq!(dead[0].reason, "delivery count limit reached");
    }

    #[tokio::test]
    async fn dead_letter_parks_with_reason() {
        let queue = MemoryQueue::connect(MemoryQueueOptions::new("q"));
        let sender = queue.create_sender();
        let receiver = queue.create_receiver();

        sender.send(envelope("a.txt")).await.expect("send");
        let lease = receiver.recv().await.expect("recv").expect("message");
        lease.dead_letter("malformed payload").await.expect("dead letter");

        assert_eq!(queue.ready_len(), 0);
        let dead = queue.dead_letters();
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].reason, "malformed payload");
    }

    #[tokio::test]
    async fn dropped_lease_lapses_back_onto_the_queue() {
        let queue = MemoryQueue::connect(MemoryQueueOptions::new("q"));
        let sender = queue.create_sender();
        let receiver = queue.create_receiver();

        sender.send(envelope("a.txt")).await.expect("send");
        let lease = receiver.recv().await.expect("recv").expect("message");
        drop(lease);

        let redelivered = receiver.recv().await.expect("recv").expect("redelivery");
        assert_eq!(redelivered.delivery_count(), 2);
    }

    #[tokio::test]
    async fn recv_observes_close() {
        let queue = MemoryQueue::connect(MemoryQueueOptions::new("q"));
        let receiver = queue.create_receiver();

        let pending = tokio::spawn({
            let receiver = std::sync::Arc::clone(&receiver);
            async move { receiver.recv().await }
        });
        queue.close().await;

        let result = pending.await.expect("join").expect("recv");
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn send_after_close_is_rejected() {
        let queue = MemoryQueue::connect(MemoryQueueOptions::new("q"));
        let sender = queue.create_sender();
        queue.close().await;

        let err = sender.send(envelope("a.txt")).await.expect_err("must fail");
        assert!(matches!(err, crate::queue::BrokerError::Closed));
    }
}
