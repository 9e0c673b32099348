//! The plugin's "started" marker file.
//!
//! The plugin runtime creates the marker right before executing the plugin, so its
//! presence means the plugin has run at least once. Combined with a missing process it
//! distinguishes "not started yet" from "already finished".

use std::path::{Path, PathBuf};

use crate::fsutil::{self, FileReadError};

pub const DEFAULT_STARTED_MARKER: &str = "/app/started";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartedMarker {
    path: PathBuf,
}

impl StartedMarker {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns whether the marker exists.
    ///
    /// # Errors
    ///
    /// Returns a [`FileReadError`] if the existence of the marker cannot be determined.
    pub fn is_present(&self) -> Result<bool, FileReadError> {
        fsutil::path_exists(&self.path)
    }
}

impl Default for StartedMarker {
    fn default() -> Self {
        Self::new(DEFAULT_STARTED_MARKER)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_marker_presence() {
        let dir = tempfile::tempdir().unwrap();
        let marker = StartedMarker::new(dir.path().join("started"));
        assert!(!marker.is_present().unwrap());
        std::fs::write(marker.path(), b"").unwrap();
        assert!(marker.is_present().unwrap());
    }

    #[test]
    fn test_default_path() {
        assert_eq!(StartedMarker::default().path(), Path::new("/app/started"));
    }
}
