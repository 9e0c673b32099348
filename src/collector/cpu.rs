use tokio::time::Instant;

use super::{CollectorState, Probe, SampleError};
use crate::cgroup::CgroupV1;
use crate::event::EventKind;
use crate::metrics::PluginMetrics;

/// Samples CPU utilization in percent from the cumulative per-core counters.
///
/// 100 percent corresponds to one fully used core, so a plugin saturating six cores
/// reports 600.
#[derive(Debug)]
pub struct CpuProbe {
    cgroup: CgroupV1,
    state: CollectorState,
    metrics: PluginMetrics,
}

impl CpuProbe {
    pub fn new(cgroup: CgroupV1, metrics: PluginMetrics) -> Self {
        Self {
            cgroup,
            state: CollectorState::default(),
            metrics,
        }
    }
}

impl Probe for CpuProbe {
    fn name(&self) -> &'static str {
        "cpu"
    }

    async fn sample(&mut self) -> Result<EventKind, SampleError> {
        let usage = self.cgroup.read_cpu_usage().await?;
        let read_at = Instant::now();
        self.metrics.observe_cpu_usage(&usage);
        let cores_busy = self.state.rate(usage.total_seconds(), read_at);
        Ok(EventKind::PerfCpu(cores_busy * 100.0))
    }
}
