use std::path::{Path, PathBuf};

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Owns the OS watcher; dropping or closing it stops event delivery.
pub struct WatchHandle {
    _watcher: RecommendedWatcher,
}

impl WatchHandle {
    pub fn close(self) {
        info!("file watcher released");
    }
}

/// Starts watching `folder` for newly created entries, forwarding their paths
/// onto a tokio channel. The notify callback runs on the watcher's own thread;
/// translating events into channel items keeps admission control and
/// cancellation out of the OS watcher's threading model.
pub fn spawn_watcher(
    folder: &Path,
    events: mpsc::Sender<PathBuf>,
) -> Result<WatchHandle, notify::Error> {
    let mut watcher = notify::recommended_watcher(move |result: notify::Result<notify::Event>| {
        match result {
            Ok(event) => {
                if matches!(event.kind, EventKind::Create(_)) {
                    for path in event.paths {
                        // A full channel or closed receiver means shutdown is
                        // in progress; the notification is dropped.
                        let _ = events.blocking_send(path);
                    }
                }
            }
            Err(err) => warn!(error = %err, "file watcher error"),
        }
    })?;
    watcher.watch(folder, RecursiveMode::NonRecursive)?;
    info!(folder = %folder.display(), "file watcher started");
    Ok(WatchHandle { _watcher: watcher })
}

#[cfg(test)]
mod tests {
    use super::spawn_watcher;
    use std::time::Duration;
    use tokio::sync::mpsc;

    #[tokio::test(flavor = "multi_thread")]
    async fn created_files_are_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let (tx, mut rx) = mpsc::channel(16);
        let handle = spawn_watcher(dir.path(), tx).expect("watcher");

        let target = dir.path().join("report.txt");
        std::fs::write(&target, "hello").expect("write");

        let seen = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("watcher event within timeout")
            .expect("channel open");
        assert_eq!(seen.file_name(), target.file_name());

        handle.close();
    }
}
