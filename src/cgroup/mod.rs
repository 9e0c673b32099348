//! Read-only access to a cgroup v1 hierarchy.
//!
//! The controller samples the plugin's resource usage from the cgroup v1 pseudo-files
//! below a cgroup root (usually `/sys/fs/cgroup` as seen from the plugin's mount
//! namespace):
//!
//! - `cpu,cpuacct/cpuacct.usage_percpu`
//! - `memory/memory.usage_in_bytes`
//! - `memory/memory.stat`
//!
//! [`CgroupV1`] is stateless: every call re-reads the files, so it can be shared by
//! collectors sampling at different cadences.
mod error;
pub mod stats;

use std::path::{Path, PathBuf};

pub use error::{Error, Result};

use crate::fsutil;
use stats::{CpuUsagePerCpu, KeyValueStat, MemoryStat, MemoryUsage, SingleLineStat};

const CPUACCT_DIR: &str = "cpu,cpuacct";
const CPUACCT_USAGE_PERCPU: &str = "cpuacct.usage_percpu";
const MEMORY_DIR: &str = "memory";
const MEMORY_USAGE_IN_BYTES: &str = "memory.usage_in_bytes";
const MEMORY_STAT: &str = "memory.stat";

/// A cgroup v1 hierarchy rooted at a directory containing the controller mounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CgroupV1 {
    root: PathBuf,
}

impl CgroupV1 {
    /// Creates a reader for the hierarchy rooted at `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The hierarchy visible to the process `pid`, reached through its root directory
    /// in procfs, i.e. `/proc/<pid>/root/sys/fs/cgroup`.
    pub fn for_pid(pid: u32) -> Self {
        Self::new(format!("/proc/{pid}/root/sys/fs/cgroup"))
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn cpuacct_usage_percpu_path(&self) -> PathBuf {
        self.root.join(CPUACCT_DIR).join(CPUACCT_USAGE_PERCPU)
    }

    pub fn memory_usage_path(&self) -> PathBuf {
        self.root.join(MEMORY_DIR).join(MEMORY_USAGE_IN_BYTES)
    }

    pub fn memory_stat_path(&self) -> PathBuf {
        self.root.join(MEMORY_DIR).join(MEMORY_STAT)
    }

    /// Reads the per-core cumulative CPU usage.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the file cannot be read or contains a malformed counter.
    pub async fn read_cpu_usage(&self) -> Result<CpuUsagePerCpu> {
        let path = self.cpuacct_usage_percpu_path();
        let content = fsutil::read_file(&path).await?;
        CpuUsagePerCpu::from_reader(&mut content.as_slice())
            .map_err(|source| Error::Parse { path, source })
    }

    /// Reads the total memory usage.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the file cannot be read or the value is malformed.
    pub async fn read_memory_usage(&self) -> Result<MemoryUsage> {
        let path = self.memory_usage_path();
        let content = fsutil::read_file(&path).await?;
        MemoryUsage::from_reader(&mut content.as_slice())
            .map_err(|source| Error::Parse { path, source })
    }

    /// Reads the relevant entries of `memory.stat`.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if the file cannot be read or a known entry is malformed.
    pub async fn read_memory_stat(&self) -> Result<MemoryStat> {
        let path = self.memory_stat_path();
        let content = fsutil::read_file(&path).await?;
        MemoryStat::from_reader(&mut content.as_slice())
            .map_err(|source| Error::Parse { path, source })
    }

    /// Reads the working-set memory in bytes.
    ///
    /// # Errors
    ///
    /// Returns an [`Error`] if either file cannot be read, a value is malformed, or
    /// `total_inactive_file` is missing from `memory.stat`.
    pub async fn read_working_set_bytes(&self) -> Result<u64> {
        let usage = self.read_memory_usage().await?;
        let stat = self.read_memory_stat().await?;
        stats::working_set_bytes(&usage, &stat).map_err(|source| Error::Parse {
            path: self.memory_stat_path(),
            source,
        })
    }
}
