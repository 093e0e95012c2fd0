use std::path::{Path, PathBuf};

use filebus_contract::TransferMessage;
use tracing::debug;

use crate::decode::ConsumeError;

fn write_error(path: &Path, source: std::io::Error) -> ConsumeError {
    ConsumeError::Write {
        path: path.to_path_buf(),
        source,
    }
}

/// Writes decoded content to `receive_folder/<file_name>`, overwriting any
/// existing file of the same name (last-write-wins).
///
/// The content is staged under a temporary name and renamed into place so no
/// reader ever observes a partial file.
pub async fn materialize(
    receive_folder: &Path,
    message: &TransferMessage,
) -> Result<PathBuf, ConsumeError> {
    tokio::fs::create_dir_all(receive_folder)
        .await
        .map_err(|source| write_error(receive_folder, source))?;

    let target = receive_folder.join(&message.file_name);
    let staging = receive_folder.join(format!(".{}.filebus-tmp", message.file_name));

    tokio::fs::write(&staging, &message.content)
        .await
        .map_err(|source| write_error(&staging, source))?;
    if let Err(source) = tokio::fs::rename(&staging, &target).await {
        // Best effort: do not leave the staging file behind.
        let _ = tokio::fs::remove_file(&staging).await;
        return Err(write_error(&target, source));
    }

    debug!(target = %target.display(), bytes = message.file_size, "file materialized");
    Ok(target)
}
