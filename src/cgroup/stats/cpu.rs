//! Parsing of the cgroup v1 `cpuacct.usage_percpu` file.
//!
//! The file holds a single line of whitespace-separated cumulative CPU time counters,
//! one per core, in nanoseconds:
//!
//! ```text
//! 825037625632 359430490816 37867331808 39416937312 38447872416 40916037344
//! ```
//!
//! # Examples
//!
//! ```rust
//! use plugin_controller::cgroup::stats::{CpuUsagePerCpu, SingleLineStat};
//!
//! let usage = CpuUsagePerCpu::from_reader(&mut "1000000000 500000000\n".as_bytes()).unwrap();
//! assert_eq!(usage.total_seconds(), 1.5);
//! ```

use std::io::BufRead;

use super::{SingleLineStat, StatParseError};

const NANOS_PER_SECOND: f64 = 1e9;

/// Cumulative CPU time consumed by the cgroup on each core.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CpuUsagePerCpu {
    /// Nanoseconds consumed per core, indexed by core number.
    pub per_cpu_ns: Vec<u64>,
}

impl CpuUsagePerCpu {
    /// Returns the per-core counters converted to seconds.
    pub fn per_cpu_seconds(&self) -> impl Iterator<Item = f64> + '_ {
        self.per_cpu_ns
            .iter()
            .map(|&ns| ns as f64 / NANOS_PER_SECOND)
    }

    /// Returns the sum of all per-core counters in seconds.
    pub fn total_seconds(&self) -> f64 {
        self.per_cpu_seconds().sum()
    }
}

impl SingleLineStat for CpuUsagePerCpu {
    /// Parses a `cpuacct.usage_percpu` line.
    ///
    /// Empty input yields zero cores.
    ///
    /// # Errors
    ///
    /// Returns [`StatParseError::InvalidValue`] if any counter is not an unsigned integer.
    fn from_reader<R: BufRead>(buf: &mut R) -> Result<Self, StatParseError> {
        let mut line = String::new();
        buf.read_line(&mut line)?;
        let per_cpu_ns = line
            .split_whitespace()
            .map(|value| {
                value
                    .parse::<u64>()
                    .map_err(|source| StatParseError::InvalidValue {
                        value: value.to_string(),
                        line: 1,
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(CpuUsagePerCpu { per_cpu_ns })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_empty_usage() {
        let usage = CpuUsagePerCpu::from_reader(&mut "".as_bytes()).unwrap();
        assert!(usage.per_cpu_ns.is_empty());
        assert_eq!(usage.total_seconds(), 0.0);
    }

    #[test]
    fn test_parse_six_cores() {
        let data = "825037625632 359430490816 37867331808 39416937312 38447872416 40916037344\n";
        let usage = CpuUsagePerCpu::from_reader(&mut data.as_bytes()).unwrap();

        assert_eq!(
            usage.per_cpu_ns,
            vec![
                825_037_625_632,
                359_430_490_816,
                37_867_331_808,
                39_416_937_312,
                38_447_872_416,
                40_916_037_344,
            ]
        );
        let seconds: Vec<f64> = usage.per_cpu_seconds().collect();
        assert!((seconds[0] - 825.037625632).abs() < 1e-6);
        assert!((seconds[5] - 40.916037344).abs() < 1e-6);
    }

    #[test]
    fn test_parse_extra_whitespace() {
        let usage = CpuUsagePerCpu::from_reader(&mut "  10   20 \t30  \n".as_bytes()).unwrap();
        assert_eq!(usage.per_cpu_ns, vec![10, 20, 30]);
    }

    #[test]
    fn test_parse_invalid_counter() {
        let err = CpuUsagePerCpu::from_reader(&mut "10 abc 30".as_bytes()).unwrap_err();
        match err {
            StatParseError::InvalidValue { value, line, .. } => {
                assert_eq!(value, "abc");
                assert_eq!(line, 1);
            }
            _ => panic!("Expected InvalidValue error"),
        }
    }
}
