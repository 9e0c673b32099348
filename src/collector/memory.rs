use super::{Probe, SampleError};
use crate::cgroup::CgroupV1;
use crate::event::EventKind;
use crate::metrics::PluginMetrics;

/// Samples the working-set memory (used minus inactive file pages) in bytes.
#[derive(Debug)]
pub struct MemoryProbe {
    cgroup: CgroupV1,
    metrics: PluginMetrics,
}

impl MemoryProbe {
    pub fn new(cgroup: CgroupV1, metrics: PluginMetrics) -> Self {
        Self { cgroup, metrics }
    }
}

impl Probe for MemoryProbe {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn sample(&mut self) -> Result<EventKind, SampleError> {
        let working_set = self.cgroup.read_working_set_bytes().await?;
        self.metrics.observe_working_set(working_set);
        Ok(EventKind::PerfMemory(working_set))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cgroup::testutil::write_cgroup_v1;

    #[tokio::test]
    async fn test_working_set_event() {
        let dir = tempfile::tempdir().unwrap();
        write_cgroup_v1(
            dir.path(),
            "",
            "28065792\n",
            "inactive_file 6606848\ntotal_inactive_file 6606848\ntotal_active_file 6209536\n",
        );
        let mut probe = MemoryProbe::new(CgroupV1::new(dir.path()), PluginMetrics::default());

        let kind = probe.sample().await.unwrap();
        assert_eq!(kind, EventKind::PerfMemory(21_458_944));
    }

    #[tokio::test]
    async fn test_missing_inactive_file_fails_tick() {
        let dir = tempfile::tempdir().unwrap();
        write_cgroup_v1(dir.path(), "", "28065792\n", "total_cache 1\n");
        let mut probe = MemoryProbe::new(CgroupV1::new(dir.path()), PluginMetrics::default());

        assert!(probe.sample().await.is_err());
    }

    #[tokio::test]
    async fn test_malformed_usage_fails_tick() {
        let dir = tempfile::tempdir().unwrap();
        write_cgroup_v1(dir.path(), "", "lots\n", "total_inactive_file 1\n");
        let mut probe = MemoryProbe::new(CgroupV1::new(dir.path()), PluginMetrics::default());

        assert!(probe.sample().await.is_err());
    }
}
