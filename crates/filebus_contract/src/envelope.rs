use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::codec::{encode_message, CodecError};
use crate::message::TransferMessage;

/// Broker-level wrapper around a serialized [`TransferMessage`].
///
/// `operation_id` and `file_name` mirror the payload as application properties
/// for correlation and diagnostics only; routing and deduplication never
/// consult them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueueEnvelope {
    pub message_id: String,
    pub operation_id: String,
    pub file_name: String,
    pub body: String,
}

impl QueueEnvelope {
    pub fn wrap(message: &TransferMessage) -> Result<Self, CodecError> {
        let body = encode_message(message)?;
        Ok(Self {
            message_id: Uuid::now_v7().to_string(),
            operation_id: message.operation_id.clone(),
            file_name: message.file_name.clone(),
            body,
        })
    }

    /// An envelope around a raw payload, bypassing packaging. Intended for
    /// tests that need malformed bodies on the queue.
    pub fn raw(operation_id: &str, file_name: &str, body: &str) -> Self {
        Self {
            message_id: Uuid::now_v7().to_string(),
            operation_id: operation_id.to_string(),
            file_name: file_name.to_string(),
            body: body.to_string(),
        }
    }
}
