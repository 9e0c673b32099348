//! Discovery of the plugin process.
//!
//! The plugin shares the controller's process namespace, so the controller finds it by
//! enumerating processes:
//!
//! - With a name hint, the first process (by ascending pid) whose name equals the hint
//!   is selected.
//! - Without a hint, the first process that is not the controller itself and not a
//!   known infrastructure process (see [`INFRASTRUCTURE_PROCESSES`]) is selected. This
//!   is a best-effort heuristic: any other helper process that happens to be running
//!   is indistinguishable from the plugin, so the result may be wrong in crowded
//!   namespaces.
//!
//! Lookups are retried with exponential backoff for as long as it takes, unless the
//! started marker shows that the plugin already ran, in which case a missing process
//! means it has finished.
mod backoff;
mod process;

use std::collections::HashSet;

pub use backoff::ExponentialBackoff;
pub use process::{BlockingTable, ProcessEntry, ProcessTable, SysinfoProcessTable};

use crate::marker::StartedMarker;
use crate::shutdown::Shutdown;

const LOG_TARGET: &str = "process locator";

/// Process names that never belong to the plugin.
pub const INFRASTRUCTURE_PROCESSES: &[&str] = &["pause", "plugin-controller"];

/// The located plugin process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessHandle {
    pid: u32,
    name: String,
}

impl ProcessHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Outcome of a single lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    Found(ProcessHandle),
    /// Nothing matched yet; worth retrying.
    Transient(String),
    /// Nothing matched and retrying cannot help.
    Permanent(String),
}

#[derive(Debug, thiserror::Error)]
pub enum LocateError {
    #[error("plugin process will not appear: {0}")]
    Permanent(String),
    #[error("plugin process lookup was cancelled")]
    Cancelled,
}

/// Finds the plugin process in a [`ProcessTable`].
#[derive(Debug)]
pub struct ProcessLocator<T> {
    table: BlockingTable<T>,
    marker: StartedMarker,
    backoff: ExponentialBackoff,
    excluded_names: HashSet<String>,
    own_pid: u32,
}

impl<T: ProcessTable> ProcessLocator<T> {
    pub fn new(table: T, marker: StartedMarker, backoff: ExponentialBackoff) -> Self {
        let mut excluded_names: HashSet<String> = INFRASTRUCTURE_PROCESSES
            .iter()
            .map(|name| name.to_string())
            .collect();
        if let Some(own_name) = own_process_name() {
            excluded_names.insert(own_name);
        }
        Self {
            table: BlockingTable::new(table),
            marker,
            backoff,
            excluded_names,
            own_pid: std::process::id(),
        }
    }

    /// Runs one lookup over the current process list.
    pub async fn attempt(&self, name_hint: &str) -> Attempt {
        let processes = match self.table.processes().await {
            Ok(processes) => processes,
            Err(err) => {
                log::error!(target: LOG_TARGET, "process enumeration failed: {err}");
                return Attempt::Transient(format!("process enumeration failed: {err}"));
            }
        };
        let found = if name_hint.is_empty() {
            processes.into_iter().find(|entry| {
                entry.pid != self.own_pid && !self.excluded_names.contains(&entry.name)
            })
        } else {
            processes.into_iter().find(|entry| entry.name == name_hint)
        };
        if let Some(entry) = found {
            return Attempt::Found(ProcessHandle {
                pid: entry.pid,
                name: entry.name,
            });
        }

        let wanted = if name_hint.is_empty() {
            "any user process".to_string()
        } else {
            format!("process `{name_hint}`")
        };
        match self.marker.is_present() {
            Ok(true) => Attempt::Permanent(format!(
                "{wanted} not found while `{}` exists, the plugin might have finished its job already",
                self.marker.path().display()
            )),
            Ok(false) => Attempt::Transient(format!("{wanted} not found")),
            Err(err) => Attempt::Transient(format!("{wanted} not found ({err})")),
        }
    }

    /// Looks up the plugin process, retrying until it is found.
    ///
    /// # Errors
    ///
    /// Returns [`LocateError::Permanent`] if the process is missing while the started
    /// marker exists, and [`LocateError::Cancelled`] if `shutdown` fires first.
    pub async fn locate(
        &mut self,
        name_hint: &str,
        shutdown: &mut Shutdown,
    ) -> Result<ProcessHandle, LocateError> {
        if name_hint.is_empty() {
            log::info!(
                target: LOG_TARGET,
                "no plugin process name is given, looking for any user process"
            );
        } else {
            log::info!(target: LOG_TARGET, "looking for the plugin process `{name_hint}`");
        }

        self.backoff.reset();
        let mut attempts: u64 = 0;
        loop {
            if shutdown.is_requested() {
                return Err(LocateError::Cancelled);
            }
            attempts += 1;
            match self.attempt(name_hint).await {
                Attempt::Found(handle) => {
                    log::info!(
                        target: LOG_TARGET,
                        "selected pid {} (`{}`) as plugin process after {attempts} attempt(s)",
                        handle.pid,
                        handle.name
                    );
                    return Ok(handle);
                }
                Attempt::Permanent(reason) => return Err(LocateError::Permanent(reason)),
                Attempt::Transient(reason) => {
                    let delay = self.backoff.next_delay();
                    log::debug!(
                        target: LOG_TARGET,
                        "attempt {attempts}: {reason}, retrying in {delay:?}"
                    );
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown.requested() => return Err(LocateError::Cancelled),
                    }
                }
            }
        }
    }

    /// Releases the process table, e.g. for liveness checks after the lookup.
    pub fn into_table(self) -> BlockingTable<T> {
        self.table
    }
}

fn own_process_name() -> Option<String> {
    let exe = std::env::current_exe().ok()?;
    Some(exe.file_name()?.to_string_lossy().into_owned())
}
