//! Parsing utilities for cgroup v1 memory statistics.
//!
//! - **Key-value statistics** from `memory.stat`. Only `total_inactive_file` is
//!   retained, since it is what separates reclaimable page cache from the working set.
//! - **Single-line usage** from `memory.usage_in_bytes`.
//!
//! The working set is `usage_in_bytes - total_inactive_file`, see [`working_set_bytes`].
//!
//! # Examples
//!
//! ```rust
//! use plugin_controller::cgroup::stats::{
//!     KeyValueStat, MemoryStat, MemoryUsage, SingleLineStat, working_set_bytes,
//! };
//!
//! let stat = MemoryStat::from_reader(&mut "inactive_file 10\ntotal_inactive_file 100\n".as_bytes()).unwrap();
//! let usage = MemoryUsage::from_reader(&mut "1000\n".as_bytes()).unwrap();
//! assert_eq!(working_set_bytes(&usage, &stat).unwrap(), 900);
//! ```

use std::collections::HashMap;
use std::io::BufRead;
use std::sync::LazyLock;

use super::parser::KeyValueStat;
use super::{SingleLineStat, StatParseError};

const TOTAL_INACTIVE_FILE: &str = "total_inactive_file";

/// Values of interest from a cgroup v1 `memory.stat` file.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemoryStat {
    /// Inactive file-backed memory of the hierarchy, in bytes.
    ///
    /// `None` if the key was absent from the file.
    pub total_inactive_file: Option<u64>,
}

impl MemoryStat {
    fn set_total_inactive_file(&mut self, v: u64) {
        self.total_inactive_file = Some(v);
    }
}

type Setter = fn(&mut MemoryStat, u64);

static SETTERS: LazyLock<HashMap<&'static str, Setter>> = LazyLock::new(|| {
    let mut m: HashMap<&'static str, Setter> = HashMap::with_capacity(1);

    m.insert(TOTAL_INACTIVE_FILE, MemoryStat::set_total_inactive_file);

    m
});

impl KeyValueStat for MemoryStat {
    const ALLOW_DUPLICATE_KEYS: bool = false;

    fn field_handlers() -> &'static HashMap<&'static str, fn(&mut Self, u64)> {
        &SETTERS
    }
}

/// Total memory usage from `memory.usage_in_bytes`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MemoryUsage {
    /// Total memory usage in bytes.
    pub usage_bytes: u64,
}

impl SingleLineStat for MemoryUsage {
    /// Parses a `memory.usage_in_bytes` file.
    ///
    /// # Errors
    ///
    /// Returns [`StatParseError::InvalidValue`] if the value is not an unsigned integer.
    fn from_reader<R: BufRead>(buf: &mut R) -> Result<Self, StatParseError> {
        let mut line = String::new();

        buf.read_line(&mut line)?;
        let line = line.trim();
        let usage_bytes = line
            .parse::<u64>()
            .map_err(|source| StatParseError::InvalidValue {
                value: line.to_string(),
                line: 1,
                source,
            })?;

        Ok(MemoryUsage { usage_bytes })
    }
}

/// Computes the working-set memory: used bytes minus inactive file-backed bytes.
///
/// Saturates at zero if the kernel reports more inactive pages than total usage,
/// which can happen transiently since the two files are not read atomically.
///
/// # Errors
///
/// Returns [`StatParseError::MissingField`] if `total_inactive_file` was not present.
pub fn working_set_bytes(usage: &MemoryUsage, stat: &MemoryStat) -> Result<u64, StatParseError> {
    let inactive = stat
        .total_inactive_file
        .ok_or(StatParseError::MissingField {
            field: TOTAL_INACTIVE_FILE,
        })?;
    Ok(usage.usage_bytes.saturating_sub(inactive))
}
