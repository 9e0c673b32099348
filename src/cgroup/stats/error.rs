//! Defines structured error types for parsing cgroup v1 statistics.
//!
//! This module provides the [`StatParseError`] enum, which encapsulates detailed
//! error reporting for parsing failures encountered while processing cgroup stat files.
//!
//! # Error Types
//!
//! - [`StatParseError::InvalidKeyValue`]: A value in a key-value file (e.g., `memory.stat`) is not an unsigned integer.
//! - [`StatParseError::InvalidValue`]: A single numeric value (e.g., in `memory.usage_in_bytes`) failed to parse.
//! - [`StatParseError::DuplicateField`]: A key appeared twice where duplicates are disallowed.
//! - [`StatParseError::MissingField`]: A required key never appeared in the file.
//! - [`StatParseError::Io`]: Wraps underlying I/O errors during reads.
//!
//! # Example
//!
//! ```rust
//! use plugin_controller::cgroup::stats::StatParseError;
//!
//! fn parse_line(val: &str) -> Result<u64, StatParseError> {
//!     val.parse::<u64>().map_err(|source| StatParseError::InvalidValue {
//!         value: val.to_string(),
//!         line: 1,
//!         source,
//!     })
//! }
//!
//! parse_line("not-a-number").unwrap_err();
//! ```

use std::num::ParseIntError;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatParseError {
    #[error("duplicate field '{field}' at line {line}")]
    DuplicateField { field: String, line: usize },

    #[error("invalid value for '{key}' at line {line}: '{value}': {source}")]
    InvalidKeyValue {
        key: String,
        value: String,
        line: usize,
        #[source]
        source: ParseIntError,
    },

    #[error("invalid value at line {line}: '{value}': {source}")]
    InvalidValue {
        value: String,
        line: usize,
        #[source]
        source: ParseIntError,
    },

    #[error("missing field '{field}'")]
    MissingField { field: &'static str },

    #[error("error during I/O: {0}")]
    Io(#[from] std::io::Error),
}
