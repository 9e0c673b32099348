use std::io;
use std::path::{Path, PathBuf};

/// Error that occurs when reading a file fails.
#[derive(Debug, thiserror::Error)]
#[error("failed to read file `{path}`: {source}")]
pub struct FileReadError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

/// Reads the whole file at the given path.
///
/// Pseudo-files under `/sys/fs/cgroup` report a size of zero, so the content is read
/// until EOF instead of relying on metadata.
///
/// # Errors
///
/// Returns a [`FileReadError`] if the file cannot be opened or read.
///
/// # Example
/// ```no_run
/// # use plugin_controller::fsutil;
/// # async fn example() -> Result<(), fsutil::FileReadError> {
/// let content = fsutil::read_file("/sys/fs/cgroup/memory/memory.usage_in_bytes").await?;
/// # Ok(())
/// # }
/// ```
pub async fn read_file(path: impl AsRef<Path>) -> Result<Vec<u8>, FileReadError> {
    let path = path.as_ref();
    tokio::fs::read(path)
        .await
        .map_err(|source| FileReadError {
            path: path.to_path_buf(),
            source,
        })
}

/// Returns whether the given path exists.
///
/// Errors other than "not found" (e.g., permission denied on a parent directory) are
/// reported instead of being folded into `false`.
///
/// # Errors
///
/// Returns a [`FileReadError`] if existence cannot be determined.
pub fn path_exists(path: impl AsRef<Path>) -> Result<bool, FileReadError> {
    let path = path.as_ref();
    path.try_exists().map_err(|source| FileReadError {
        path: path.to_path_buf(),
        source,
    })
}
