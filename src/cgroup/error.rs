use std::path::PathBuf;

use crate::fsutil;

use super::stats::StatParseError;

/// Errors that may occur while sampling a cgroup v1 hierarchy.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Read(#[from] fsutil::FileReadError),
    #[error("failed to parse file `{path}`: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: StatParseError,
    },
}

pub type Result<T> = std::result::Result<T, Error>;
