use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use filebus_broker::{MemoryQueue, MemoryQueueOptions};
use filebus_consumer::{ConsumerConfig, ConsumerWorker};
use filebus_producer::{ProducerConfig, ProducerWorker, StabilityPolicy};
use serde::Deserialize;
use tracing::{error, info};

#[derive(Debug, Parser)]
#[command(author, version, about = "filebus file transfer daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Serve {
        #[arg(long, default_value = "config/filebus.toml")]
        config: PathBuf,
    },
}

#[derive(Debug, Clone, Deserialize)]
struct RuntimeConfig {
    queue: QueueSection,
    producer: ProducerSection,
    consumer: ConsumerSection,
}

#[derive(Debug, Clone, Deserialize)]
struct QueueSection {
    endpoint: String,
    name: String,
    max_delivery_count: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
struct ProducerSection {
    watch_folder: String,
    file_filter: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
struct ConsumerSection {
    receive_folder: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve { config } => serve(config).await,
    }
}

async fn serve(config_path: PathBuf) -> Result<()> {
    let config_source = std::fs::read_to_string(&config_path)
        .with_context(|| format!("failed to read config file {}", config_path.display()))?;
    let config: RuntimeConfig = toml::from_str(&config_source)
        .with_context(|| format!("invalid config TOML at {}", config_path.display()))?;

    if config.queue.endpoint.trim().is_empty() {
        return Err(anyhow!("queue.endpoint is required"));
    }
    if config.queue.name.trim().is_empty() {
        return Err(anyhow!("queue.name is required"));
    }
    if config.producer.watch_folder.trim().is_empty() {
        return Err(anyhow!("producer.watch_folder is required"));
    }
    if config.consumer.receive_folder.trim().is_empty() {
        return Err(anyhow!("consumer.receive_folder is required"));
    }

    // The queue connection is built once here and handed into the workers;
    // the in-memory broker stands behind the same seam a remote client would.
    let mut options = MemoryQueueOptions::new(&config.queue.name);
    if let Some(limit) = config.queue.max_delivery_count {
        options.max_delivery_count = limit;
    }
    info!(endpoint = %config.queue.endpoint, queue = %config.queue.name, "connecting queue");
    let queue = MemoryQueue::connect(options);
    let sender = queue.create_sender();
    let receiver = queue.create_receiver();

    let producer = ProducerWorker::new(
        ProducerConfig {
            watch_folder: PathBuf::from(&config.producer.watch_folder),
            file_filter: config
                .producer
                .file_filter
                .clone()
                .unwrap_or_else(|| "*".to_string()),
            stability: StabilityPolicy::default(),
        },
        std::sync::Arc::clone(&sender),
    );
    let consumer = ConsumerWorker::new(
        ConsumerConfig {
            receive_folder: PathBuf::from(&config.consumer.receive_folder),
        },
        std::sync::Arc::clone(&receiver),
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    let producer_task = {
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move { producer.run(shutdown).await })
    };
    let consumer_task = tokio::spawn(async move { consumer.run(shutdown_rx).await });

    info!("filebusd serving, press ctrl-c to stop");
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");
    let _ = shutdown_tx.send(true);

    // Each release step is attempted even if an earlier one failed, in the
    // fixed order: workers (watcher included), sender, receiver, connection.
    match producer_task.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!(error = %err, "producer worker failed"),
        Err(err) => error!(error = %err, "producer task did not finish cleanly"),
    }
    match consumer_task.await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => error!(error = %err, "consumer worker failed"),
        Err(err) => error!(error = %err, "consumer task did not finish cleanly"),
    }
    sender.close().await;
    receiver.close().await;
    queue.close().await;

    info!("filebusd stopped");
    Ok(())
}
