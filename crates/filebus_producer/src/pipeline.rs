use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use filebus_broker::{BrokerError, QueueSender};
use filebus_contract::{CodecError, QueueEnvelope, TransferMessage};
use thiserror::Error;
use tracing::info;

use crate::stability::{await_stable, StabilityPolicy};

#[derive(Debug, Error)]
pub enum ProducerError {
    #[error("source is not a regular file: {}", path.display())]
    NotAFile { path: PathBuf },
    #[error("source file never stabilized: {}", path.display())]
    Unstable { path: PathBuf },
    #[error("failed to read source file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to package transfer message: {0}")]
    Encode(#[from] CodecError),
    #[error("publish failed: {0}")]
    Publish(#[from] BrokerError),
    /// The message is already delivered but the source file could not be
    /// archived; the file remains in the watched folder and operators must
    /// reconcile manually.
    #[error("post-publish archive failure for {}: {source}", path.display())]
    ArchiveAfterPublish {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ProducerError {
    /// True for the inconsistency window left by an archive failure after a
    /// successful publish.
    pub fn is_post_publish(&self) -> bool {
        matches!(self, Self::ArchiveAfterPublish { .. })
    }
}

/// Archive name embedding a second-granularity timestamp so repeated transfers
/// of a same-named file land under distinct names.
pub fn archive_file_name(file_name: &str, at: DateTime<Utc>) -> String {
    let path = Path::new(file_name);
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| file_name.to_string());
    let extension = path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    format!("{stem}_{}{extension}", at.format("%Y%m%d%H%M%S"))
}

/// The read → package → publish → archive sequence for one detected file.
pub struct FilePipeline {
    sender: Arc<dyn QueueSender>,
    processed_dir: PathBuf,
    stability: StabilityPolicy,
}

impl FilePipeline {
    pub fn new(
        sender: Arc<dyn QueueSender>,
        processed_dir: PathBuf,
        stability: StabilityPolicy,
    ) -> Self {
        Self {
            sender,
            processed_dir,
            stability,
        }
    }

    /// Runs the full handling sequence. On success the source file has been
    /// published and moved into the processed area; the archived path is
    /// returned. Any failure before the publish leaves the source file where
    /// it was.
    pub async fn handle_file(
        &self,
        path: &Path,
        file_name: &str,
        operation_id: &str,
    ) -> Result<PathBuf, ProducerError> {
        let size = await_stable(path, &self.stability).await?;
        info!(
            operation_id,
            file_name,
            file_size = size,
            "source file settled, packaging"
        );

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ProducerError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let message = TransferMessage::package(operation_id, file_name, content);
        let envelope = QueueEnvelope::wrap(&message)?;
        let message_id = envelope.message_id.clone();

        self.sender.send(envelope).await?;
        info!(
            operation_id,
            file_name,
            message_id = %message_id,
            file_size = message.file_size,
            "transfer message published"
        );

        self.archive(path, file_name).await
    }

    /// Moves a published source file into the processed area. Only called
    /// after a successful publish; failures here are the post-publish
    /// inconsistency class.
    async fn archive(&self, path: &Path, file_name: &str) -> Result<PathBuf, ProducerError> {
        let target = self
            .processed_dir
            .join(archive_file_name(file_name, Utc::now()));

        match tokio::fs::try_exists(&target).await {
            Ok(true) => {
                return Err(ProducerError::ArchiveAfterPublish {
                    path: path.to_path_buf(),
                    source: std::io::Error::new(
                        std::io::ErrorKind::AlreadyExists,
                        format!("archive target already exists: {}", target.display()),
                    ),
                });
            }
            Ok(false) => {}
            Err(source) => {
                return Err(ProducerError::ArchiveAfterPublish {
                    path: path.to_path_buf(),
                    source,
                });
            }
        }

        tokio::fs::rename(path, &target)
            .await
            .map_err(|source| ProducerError::ArchiveAfterPublish {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(target)
    }
}

#[cfg(test)]
mod tests {
    use super::{archive_file_name, FilePipeline, ProducerError};
    use crate::stability::StabilityPolicy;
    use chrono::{TimeZone, Utc};
    use filebus_broker::{MemoryQueue, MemoryQueueOptions};
    use filebus_contract::decode_message;
    use std::time::Duration;

    fn fast_policy() -> StabilityPolicy {
        StabilityPolicy {
            poll_interval: Duration::from_millis(10),
            max_wait: Duration::from_millis(500),
        }
    }

    #[test]
    fn archive_names_embed_a_second_granularity_timestamp() {
        let at = Utc.with_ymd_and_hms(2026, 8, 23, 10, 15, 42).unwrap();
        assert_eq!(
            archive_file_name("report.txt", at),
            "report_20260823101542.txt"
        );
        assert_eq!(archive_file_name("archive.tar.gz", at), "archive.tar_20260823101542.gz");
        assert_eq!(archive_file_name("README", at), "README_20260823101542");
    }

    #[tokio::test]
    async fn happy_path_publishes_then_archives() {
        let dir = tempfile::tempdir().expect("tempdir");
        let processed = dir.path().join("processed");
        tokio::fs::create_dir_all(&processed).await.expect("mkdir");
        let source = dir.path().join("report.txt");
        tokio::fs::write(&source, "hello").await.expect("write");

        let queue = MemoryQueue::connect(MemoryQueueOptions::new("q"));
        let pipeline = FilePipeline::new(queue.create_sender(), processed.clone(), fast_policy());

        let archived = pipeline
            .handle_file(&source, "report.txt", "op-1")
            .await
            .expect("handled");

        assert_eq!(queue.ready_len(), 1);
        let lease = queue
            .create_receiver()
            .recv()
            .await
            .expect("recv")
            .expect("message");
        let message = decode_message(&lease.envelope().body).expect("decode");
        assert_eq!(message.file_name, "report.txt");
        assert_eq!(message.content, "hello");
        assert_eq!(message.file_size, 5);
        assert_eq!(message.operation_id, "op-1");

        assert!(!source.exists(), "source must be moved out of the watch folder");
        assert!(archived.starts_with(&processed));
        let archived_name = archived.file_name().unwrap().to_string_lossy().into_owned();
        assert!(archived_name.starts_with("report_"));
        assert!(archived_name.ends_with(".txt"));
    }

    #[tokio::test]
    async fn publish_failure_leaves_the_source_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let processed = dir.path().join("processed");
        tokio::fs::create_dir_all(&processed).await.expect("mkdir");
        let source = dir.path().join("report.txt");
        tokio::fs::write(&source, "hello").await.expect("write");

        let queue = MemoryQueue::connect(MemoryQueueOptions::new("q"));
        let sender = queue.create_sender();
        queue.close().await;
        let pipeline = FilePipeline::new(sender, processed.clone(), fast_policy());

        let err = pipeline
            .handle_file(&source, "report.txt", "op-1")
            .await
            .expect_err("publish must fail");
        assert!(matches!(err, ProducerError::Publish(_)));
        assert!(!err.is_post_publish());

        assert!(source.exists(), "failed publish must not archive the source");
        let mut entries = tokio::fs::read_dir(&processed).await.expect("read dir");
        assert!(entries.next_entry().await.expect("entry").is_none());
    }

    #[tokio::test]
    async fn archive_failure_after_publish_is_its_own_error_class() {
        let dir = tempfile::tempdir().expect("tempdir");
        // Missing processed directory makes the rename fail after the publish
        // has already gone out.
        let processed = dir.path().join("processed");
        let source = dir.path().join("report.txt");
        tokio::fs::write(&source, "hello").await.expect("write");

        let queue = MemoryQueue::connect(MemoryQueueOptions::new("q"));
        let pipeline = FilePipeline::new(queue.create_sender(), processed, fast_policy());

        let err = pipeline
            .handle_file(&source, "report.txt", "op-1")
            .await
            .expect_err("archive must fail");
        assert!(err.is_post_publish());
        assert_eq!(queue.ready_len(), 1, "message was already delivered");
        assert!(source.exists(), "source stays behind for manual reconciliation");
    }
}
