pub mod decode;
pub mod materialize;
pub mod worker;

pub use decode::{decode_envelope, ConsumeError};
pub use materialize::materialize;
pub use worker::{ConsumerConfig, ConsumerWorker, Disposition};
