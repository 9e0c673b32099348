//! Types and parsers for the cgroup v1 statistics the controller samples.
//!
//! # Main types
//!
//! - [`CpuUsagePerCpu`]: per-core cumulative CPU time from `cpuacct.usage_percpu`.
//! - [`MemoryUsage`]: total usage from `memory.usage_in_bytes`.
//! - [`MemoryStat`]: the `total_inactive_file` entry of `memory.stat`.
//!
//! Parsing is driven by the [`KeyValueStat`] and [`SingleLineStat`] traits, so every
//! type can be parsed from any [`std::io::BufRead`], including in-memory byte slices.

mod cpu;
mod error;
mod memory;
mod parser;

pub use cpu::CpuUsagePerCpu;
pub use error::StatParseError;
pub use memory::{MemoryStat, MemoryUsage, working_set_bytes};
pub use parser::{KeyValueStat, SingleLineStat};
