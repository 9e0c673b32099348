//! Prometheus metrics describing the supervised plugin.
//!
//! Collectors update these metrics on every successful sample; the API server renders
//! the registry in the OpenMetrics text format. Counters get their `_total` suffix
//! from the encoder.

use std::sync::atomic::AtomicU64;
use std::sync::{Arc, Mutex, PoisonError};

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

use crate::cgroup::stats::CpuUsagePerCpu;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct CpuLabels {
    pub cpu: String,
}

type FloatGauge = Gauge<f64, AtomicU64>;
type FloatCounter = Counter<f64, AtomicU64>;

/// Handles to the plugin metrics. Clones share the same underlying values.
#[derive(Debug, Clone, Default)]
pub struct PluginMetrics {
    cpu_seconds_per_cpu: Family<CpuLabels, FloatCounter>,
    cpu_seconds: FloatCounter,
    /// Last per-core reading the CPU counters were advanced to.
    last_cpu_seconds: Arc<Mutex<Vec<f64>>>,
    memory_working_set: FloatGauge,
    gpu_load: FloatGauge,
}

impl PluginMetrics {
    /// Registers every metric, plus the event bus drop counter, with `registry`.
    pub fn register(&self, registry: &mut Registry, events_dropped: Counter) {
        registry.register(
            "plugin_per_cpu_seconds",
            "Cumulative plugin cpu time consumed per cpu core in seconds",
            self.cpu_seconds_per_cpu.clone(),
        );
        registry.register(
            "plugin_cpu_seconds",
            "Cumulative plugin cpu time consumed in seconds",
            self.cpu_seconds.clone(),
        );
        registry.register(
            "plugin_memory_workingset_bytes",
            "Amount of working set memory in bytes",
            self.memory_working_set.clone(),
        );
        registry.register(
            "plugin_gpu_load_percent",
            "GPU load averaged over one second in percent",
            self.gpu_load.clone(),
        );
        registry.register(
            "plugin_controller_events_dropped",
            "Events dropped because a subscriber queue was full",
            events_dropped,
        );
    }

    /// Advances the CPU counters to a cumulative reading.
    ///
    /// A core whose reading went backwards (e.g., a recreated cgroup) is re-baselined
    /// without advancing its counter.
    pub fn observe_cpu_usage(&self, usage: &CpuUsagePerCpu) {
        let mut last = self
            .last_cpu_seconds
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let mut total_delta = 0.0;
        for (index, seconds) in usage.per_cpu_seconds().enumerate() {
            if last.len() <= index {
                last.push(0.0);
            }
            let delta = seconds - last[index];
            last[index] = seconds;
            if delta <= 0.0 {
                continue;
            }
            self.cpu_seconds_per_cpu
                .get_or_create(&CpuLabels {
                    cpu: index.to_string(),
                })
                .inc_by(delta);
            total_delta += delta;
        }
        if total_delta > 0.0 {
            self.cpu_seconds.inc_by(total_delta);
        }
    }

    pub fn observe_working_set(&self, bytes: u64) {
        self.memory_working_set.set(bytes as f64);
    }

    pub fn observe_gpu_load(&self, percent: f64) {
        self.gpu_load.set(percent);
    }

    /// Renders a registry in the OpenMetrics text format.
    ///
    /// # Errors
    ///
    /// Returns [`std::fmt::Error`] if a metric fails to encode.
    pub fn encode(registry: &Registry) -> Result<String, std::fmt::Error> {
        let mut body = String::new();
        prometheus_client::encoding::text::encode(&mut body, registry)?;
        Ok(body)
    }
}
