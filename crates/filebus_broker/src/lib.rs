pub mod memory;
pub mod queue;

pub use memory::{DeadLetter, MemoryQueue, MemoryQueueOptions};
pub use queue::{BrokerError, Lease, LeasedMessage, QueueReceiver, QueueSender};
