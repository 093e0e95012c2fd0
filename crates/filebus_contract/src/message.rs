use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type OperationId = String;

/// Application payload carried through the queue for one file transfer attempt.
///
/// `content` is exactly the text read from the source file at packaging time;
/// `file_size` is its byte length and is informational only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TransferMessage {
    pub operation_id: OperationId,
    pub file_name: String,
    pub content: String,
    pub processed_time: DateTime<Utc>,
    pub file_size: u64,
}

impl TransferMessage {
    /// Packages file content under a fresh packaging timestamp.
    pub fn package(operation_id: &str, file_name: &str, content: String) -> Self {
        let file_size = content.len() as u64;
        Self {
            operation_id: operation_id.to_string(),
            file_name: file_name.to_string(),
            content,
            processed_time: Utc::now(),
            file_size,
        }
    }
}

/// A file name is materializable only when it is a plain base name: non-empty,
/// no path separators, no current/parent directory components.
pub fn is_bare_file_name(name: &str) -> bool {
    !name.is_empty() && !name.contains(['/', '\\']) && name != "." && name != ".."
}
