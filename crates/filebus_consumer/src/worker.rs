use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use filebus_broker::{LeasedMessage, QueueReceiver};
use tokio::sync::watch;
use tracing::{error, info, warn};

use crate::decode::decode_envelope;
use crate::materialize::materialize;

#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    pub receive_folder: PathBuf,
}

/// How a leased message left the consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Materialized and acknowledged; the broker removes the message.
    Completed,
    /// Transient failure; the message returns to the queue for redelivery.
    Abandoned,
    /// Permanent failure; the message is parked for operator reconciliation.
    DeadLettered,
}

/// Long-running consumer loop. At most one message is leased at a time; every
/// lease ends in exactly one explicit disposition.
pub struct ConsumerWorker {
    config: ConsumerConfig,
    receiver: Arc<dyn QueueReceiver>,
}

impl ConsumerWorker {
    pub fn new(config: ConsumerConfig, receiver: Arc<dyn QueueReceiver>) -> Self {
        Self { config, receiver }
    }

    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) -> Result<()> {
        tokio::fs::create_dir_all(&self.config.receive_folder)
            .await
            .with_context(|| {
                format!(
                    "failed to create receive folder {}",
                    self.config.receive_folder.display()
                )
            })?;
        info!(
            receive_folder = %self.config.receive_folder.display(),
            "consumer worker started"
        );

        loop {
            let leased = tokio::select! {
                _ = shutdown.changed() => break,
                received = self.receiver.recv() => match received? {
                    None => break,
                    Some(leased) => leased,
                },
            };
            self.process(leased).await;
        }

        info!("consumer worker stopped");
        Ok(())
    }

    /// Runs one message through decode → materialize → acknowledge.
    pub async fn process(&self, leased: LeasedMessage) -> Disposition {
        let message_id = leased.envelope().message_id.clone();
        let operation_id = leased.envelope().operation_id.clone();
        let file_name = leased.envelope().file_name.clone();
        let delivery_count = leased.delivery_count();
        info!(%message_id, %operation_id, %file_name, delivery_count, "started processing message");

        let outcome = match decode_envelope(leased.envelope()) {
            Ok(message) => materialize(&self.config.receive_folder, &message).await,
            Err(err) => Err(err),
        };

        match outcome {
            Ok(target) => {
                if let Err(err) = leased.complete().await {
                    // The lease is already spent; no explicit abandon can be
                    // issued. The broker redelivers once the lease lapses, so
                    // the file (idempotent write) is simply produced again.
                    error!(%message_id, error = %err, "failed to complete message, awaiting lease lapse");
                    return Disposition::Abandoned;
                }
                info!(
                    %message_id,
                    %operation_id,
                    target = %target.display(),
                    "message processed and completed"
                );
                Disposition::Completed
            }
            Err(err) if err.is_permanent() => {
                let reason = err.to_string();
                error!(
                    %message_id,
                    %operation_id,
                    %file_name,
                    error = %reason,
                    "permanent failure, dead-lettering message"
                );
                if let Err(err) = leased.dead_letter(&reason).await {
                    error!(%message_id, error = %err, "failed to dead-letter message");
                }
                Disposition::DeadLettered
            }
            Err(err) => {
                warn!(
                    %message_id,
                    %operation_id,
                    %file_name,
                    delivery_count,
                    error = %err,
                    "transient failure, abandoning message for redelivery"
                );
                if let Err(err) = leased.abandon().await {
                    error!(%message_id, error = %err, "failed to abandon message");
                }
                Disposition::Abandoned
            }
        }
    }
}
