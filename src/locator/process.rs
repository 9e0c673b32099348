use std::sync::{Arc, Mutex, PoisonError};

use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};
use tokio::task::JoinError;

/// A live process as seen during one enumeration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessEntry {
    pub pid: u32,
    pub name: String,
}

impl ProcessEntry {
    pub fn new(pid: u32, name: impl Into<String>) -> Self {
        Self {
            pid,
            name: name.into(),
        }
    }
}

/// Source of process information for the locator and the liveness check.
pub trait ProcessTable: Send + 'static {
    /// Enumerates live processes, ordered by ascending pid.
    fn processes(&mut self) -> Vec<ProcessEntry>;

    /// Returns whether `pid` is still running.
    fn exists(&mut self, pid: u32) -> bool;
}

/// [`ProcessTable`] backed by the host's procfs through `sysinfo`.
///
/// Threads and zombies are not reported as processes.
#[derive(Debug, Default)]
pub struct SysinfoProcessTable {
    system: System,
}

impl SysinfoProcessTable {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ProcessTable for SysinfoProcessTable {
    fn processes(&mut self) -> Vec<ProcessEntry> {
        self.system.refresh_processes(ProcessesToUpdate::All, true);
        let mut entries: Vec<ProcessEntry> = self
            .system
            .processes()
            .iter()
            .filter(|(_, process)| {
                process.thread_kind().is_none() && process.status() != ProcessStatus::Zombie
            })
            .map(|(pid, process)| {
                ProcessEntry::new(pid.as_u32(), process.name().to_string_lossy())
            })
            .collect();
        entries.sort_by_key(|entry| entry.pid);
        entries
    }

    fn exists(&mut self, pid: u32) -> bool {
        let pid = Pid::from_u32(pid);
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
        self.system
            .process(pid)
            .is_some_and(|process| process.status() != ProcessStatus::Zombie)
    }
}

/// Runs [`ProcessTable`] queries on the blocking thread pool.
///
/// Scanning procfs is synchronous, so the queries stay off the async workers that
/// drive the collectors and the API.
#[derive(Debug)]
pub struct BlockingTable<T> {
    inner: Arc<Mutex<T>>,
}

impl<T> Clone for BlockingTable<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: ProcessTable> BlockingTable<T> {
    pub fn new(table: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(table)),
        }
    }

    /// # Errors
    ///
    /// Returns a [`JoinError`] if the query panicked.
    pub async fn processes(&self) -> Result<Vec<ProcessEntry>, JoinError> {
        self.query(|table| table.processes()).await
    }

    /// # Errors
    ///
    /// Returns a [`JoinError`] if the query panicked.
    pub async fn exists(&self, pid: u32) -> Result<bool, JoinError> {
        self.query(move |table| table.exists(pid)).await
    }

    async fn query<R, F>(&self, f: F) -> Result<R, JoinError>
    where
        R: Send + 'static,
        F: FnOnce(&mut T) -> R + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || {
            let mut table = inner.lock().unwrap_or_else(PoisonError::into_inner);
            f(&mut table)
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_own_process_is_listed_and_alive() {
        let mut table = SysinfoProcessTable::new();
        let own_pid = std::process::id();
        let entries = table.processes();
        assert!(entries.iter().any(|entry| entry.pid == own_pid));
        assert!(entries.windows(2).all(|pair| pair[0].pid < pair[1].pid));
        assert!(table.exists(own_pid));
    }

    #[test]
    fn test_unknown_pid_does_not_exist() {
        let mut table = SysinfoProcessTable::new();
        assert!(!table.exists(u32::MAX - 1));
    }

    #[tokio::test]
    async fn test_blocking_table_queries() {
        let table = BlockingTable::new(SysinfoProcessTable::new());
        let own_pid = std::process::id();
        let entries = table.processes().await.unwrap();
        assert!(entries.iter().any(|entry| entry.pid == own_pid));
        assert!(table.exists(own_pid).await.unwrap());
    }
}
