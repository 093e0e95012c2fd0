use serde_json::Error as JsonError;
use thiserror::Error;

use crate::message::TransferMessage;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to serialize transfer message to JSON: {0}")]
    Serialize(#[source] JsonError),
    #[error("failed to deserialize transfer message payload: {0}")]
    Deserialize(#[source] JsonError),
}

pub fn encode_message(message: &TransferMessage) -> Result<String, CodecError> {
    serde_json::to_string(message).map_err(CodecError::Serialize)
}

pub fn decode_message(payload: &str) -> Result<TransferMessage, CodecError> {
    serde_json::from_str(payload).map_err(CodecError::Deserialize)
}
