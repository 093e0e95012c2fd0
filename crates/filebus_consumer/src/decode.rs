use std::path::PathBuf;

use filebus_contract::{decode_message, is_bare_file_name, CodecError, QueueEnvelope, TransferMessage};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConsumeError {
    #[error("malformed payload: {0}")]
    Decode(#[source] CodecError),
    #[error("file name is not materializable: {0:?}")]
    UnsafeFileName(String),
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ConsumeError {
    /// Permanent failures can never succeed on redelivery and are
    /// dead-lettered; transient ones are abandoned for another attempt.
    pub fn is_permanent(&self) -> bool {
        matches!(self, Self::Decode(_) | Self::UnsafeFileName(_))
    }
}

/// Maps an envelope payload to a validated [`TransferMessage`].
///
/// The envelope's own `file_name` property is diagnostic only; validation
/// applies to the decoded payload, which is what materialization uses.
pub fn decode_envelope(envelope: &QueueEnvelope) -> Result<TransferMessage, ConsumeError> {
    let message = decode_message(&envelope.body).map_err(ConsumeError::Decode)?;
    if !is_bare_file_name(&message.file_name) {
        return Err(ConsumeError::UnsafeFileName(message.file_name));
    }
    Ok(message)
}

#[cfg(test)]
mod tests {
    use super::{decode_envelope, ConsumeError};
    use filebus_contract::{QueueEnvelope, TransferMessage};

    #[test]
    fn valid_envelope_decodes_to_the_packaged_message() {
        let message = TransferMessage::package("op-1", "report.txt", "hello".to_string());
        let envelope = QueueEnvelope::wrap(&message).expect("wrap");

        let decoded = decode_envelope(&envelope).expect("decode");
        assert_eq!(decoded, message);
    }

    #[test]
    fn malformed_body_is_permanent() {
        let envelope = QueueEnvelope::raw("op-1", "report.txt", "{broken");
        let err = decode_envelope(&envelope).expect_err("must fail");
        assert!(matches!(err, ConsumeError::Decode(_)));
        assert!(err.is_permanent());
    }

    #[test]
    fn traversal_file_names_are_permanent() {
        let mut message = TransferMessage::package("op-1", "x", "hello".to_string());
        message.file_name = "../escape.txt".to_string();
        let envelope = QueueEnvelope::wrap(&message).expect("wrap");

        let err = decode_envelope(&envelope).expect_err("must fail");
        assert!(matches!(err, ConsumeError::UnsafeFileName(_)));
        assert!(err.is_permanent());
    }

    #[test]
    fn empty_file_name_is_permanent() {
        let mut message = TransferMessage::package("op-1", "x", "hello".to_string());
        message.file_name = String::new();
        let envelope = QueueEnvelope::wrap(&message).expect("wrap");

        let err = decode_envelope(&envelope).expect_err("must fail");
        assert!(err.is_permanent());
    }
}
