pub mod codec;
pub mod envelope;
pub mod message;

pub use codec::{decode_message, encode_message, CodecError};
pub use envelope::QueueEnvelope;
pub use message::{is_bare_file_name, TransferMessage};
