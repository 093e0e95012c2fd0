use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use filebus_broker::QueueSender;
use glob::Pattern;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, info_span, Instrument};
use uuid::Uuid;

use crate::dedup::DedupGuard;
use crate::pipeline::{FilePipeline, ProducerError};
use crate::stability::StabilityPolicy;

const EVENT_CHANNEL_CAPACITY: usize = 64;

#[derive(Debug, Clone)]
pub struct ProducerConfig {
    pub watch_folder: PathBuf,
    /// Glob applied to base file names; `*` admits everything.
    pub file_filter: String,
    pub stability: StabilityPolicy,
}

impl ProducerConfig {
    pub fn processed_dir(&self) -> PathBuf {
        self.watch_folder.join("processed")
    }
}

/// Long-running producer loop: translates watcher notifications into discrete
/// per-file tasks, admitted through the dedup guard.
pub struct ProducerWorker {
    config: ProducerConfig,
    sender: Arc<dyn QueueSender>,
    guard: Arc<DedupGuard>,
}

impl ProducerWorker {
    pub fn new(config: ProducerConfig, sender: Arc<dyn QueueSender>) -> Self {
        Self {
            config,
            sender,
            guard: DedupGuard::new(),
        }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        tokio::fs::create_dir_all(&self.config.watch_folder)
            .await
            .with_context(|| {
                format!(
                    "failed to create watch folder {}",
                    self.config.watch_folder.display()
                )
            })?;
        let processed_dir = self.config.processed_dir();
        tokio::fs::create_dir_all(&processed_dir)
            .await
            .with_context(|| {
                format!("failed to create processed folder {}", processed_dir.display())
            })?;

        let pattern = Pattern::new(&self.config.file_filter)
            .with_context(|| format!("invalid file filter {:?}", self.config.file_filter))?;

        let (events_tx, mut events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let watch_handle = crate::watcher::spawn_watcher(&self.config.watch_folder, events_tx)
            .context("failed to start file watcher")?;

        let pipeline = Arc::new(FilePipeline::new(
            Arc::clone(&self.sender),
            processed_dir,
            self.config.stability.clone(),
        ));

        info!(
            watch_folder = %self.config.watch_folder.display(),
            file_filter = %self.config.file_filter,
            "producer worker started"
        );

        let mut tasks = JoinSet::new();
        loop {
            tokio::select! {
                _ = shutdown.changed() => break,
                maybe_path = events_rx.recv() => match maybe_path {
                    None => break,
                    Some(path) => self.dispatch(path, &pattern, &pipeline, &mut tasks),
                },
                Some(result) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(err) = result {
                        error!(error = %err, "file handling task failed to complete");
                    }
                }
            }
        }

        // Release order on shutdown: the watcher first, then in-flight
        // sequences run to completion before the caller closes the sender.
        watch_handle.close();
        while let Some(result) = tasks.join_next().await {
            if let Err(err) = result {
                error!(error = %err, "file handling task failed to complete");
            }
        }
        info!("producer worker stopped");
        Ok(())
    }

    fn dispatch(
        &self,
        path: PathBuf,
        pattern: &Pattern,
        pipeline: &Arc<FilePipeline>,
        tasks: &mut JoinSet<()>,
    ) {
        let file_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name.to_string(),
            None => {
                debug!(path = %path.display(), "ignoring entry without a UTF-8 base name");
                return;
            }
        };
        if !pattern.matches(&file_name) {
            debug!(%file_name, "notification dropped by file filter");
            return;
        }

        let Some(admission) = self.guard.admit(&file_name) else {
            info!(%file_name, "file is already being handled, duplicate notification dropped");
            return;
        };

        let operation_id = Uuid::now_v7().to_string();
        let pipeline = Arc::clone(pipeline);
        // One span per handling sequence; every record inside carries the
        // correlation fields.
        let span = info_span!("transfer", %operation_id, %file_name);
        tasks.spawn(
            async move {
                // Admission is held for the whole sequence and released on
                // every exit path when it drops.
                let _admission = admission;
                info!(path = %path.display(), "started handling file");

                match pipeline.handle_file(&path, &file_name, &operation_id).await {
                    Ok(archived) => info!(
                        archived = %archived.display(),
                        "file published and archived"
                    ),
                    Err(ProducerError::NotAFile { path }) => {
                        debug!(path = %path.display(), "ignoring non-file entry");
                    }
                    Err(err) if err.is_post_publish() => error!(
                        error = %err,
                        "message already published but source could not be archived; manual reconciliation required"
                    ),
                    Err(err) => error!(
                        error = %err,
                        "file handling aborted, awaiting a new notification to retry"
                    ),
                }
            }
            .instrument(span),
        );
    }
}
