pub mod dedup;
pub mod pipeline;
pub mod stability;
pub mod watcher;
pub mod worker;

pub use dedup::{Admission, DedupGuard};
pub use pipeline::{FilePipeline, ProducerError};
pub use stability::StabilityPolicy;
pub use worker::{ProducerConfig, ProducerWorker};
