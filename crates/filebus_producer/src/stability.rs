use std::path::Path;
use std::time::{Duration, SystemTime};

use tokio::time::sleep;

use crate::pipeline::ProducerError;

/// How long to wait for a freshly created file to stop changing before it is
/// read. Two consecutive metadata polls with identical size and mtime count as
/// quiescent; a file still changing at `max_wait` fails the attempt instead of
/// risking a half-written read.
#[derive(Debug, Clone)]
pub struct StabilityPolicy {
    pub poll_interval: Duration,
    pub max_wait: Duration,
}

impl Default for StabilityPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(200),
            max_wait: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Snapshot {
    size: u64,
    modified: Option<SystemTime>,
}

async fn snapshot(path: &Path) -> Result<Snapshot, ProducerError> {
    let metadata = tokio::fs::metadata(path)
        .await
        .map_err(|source| ProducerError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    if !metadata.is_file() {
        return Err(ProducerError::NotAFile {
            path: path.to_path_buf(),
        });
    }
    Ok(Snapshot {
        size: metadata.len(),
        modified: metadata.modified().ok(),
    })
}

/// Polls until the file's size and mtime quiesce, returning the settled size.
pub async fn await_stable(path: &Path, policy: &StabilityPolicy) -> Result<u64, ProducerError> {
    let started = tokio::time::Instant::now();
    let mut previous = snapshot(path).await?;

    loop {
        sleep(policy.poll_interval).await;
        let current = snapshot(path).await?;
        if current == previous {
            return Ok(current.size);
        }
        if started.elapsed() >= policy.max_wait {
            return Err(ProducerError::Unstable {
                path: path.to_path_buf(),
            });
        }
        previous = current;
    }
}
