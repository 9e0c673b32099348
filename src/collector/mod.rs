//! Interval-driven resource collectors.
//!
//! A [`Collector`] is a shell around a [`Probe`]: the shell owns the ticking cadence,
//! the stop signal, the error-to-log policy and the construction of [`Event`]s, while
//! the probe only knows how to take one sample.
//!
//! # Probes
//!
//! - [`CpuProbe`]: CPU utilization derived from `cpuacct.usage_percpu` deltas.
//! - [`MemoryProbe`]: working-set memory from `memory.usage_in_bytes` and `memory.stat`.
//! - [`GpuProbe`]: GPU load scraped from a Prometheus exposition endpoint.
//!
//! A failed sample is logged and the tick skipped; it never stops the collector.
mod cpu;
mod gpu;
mod memory;
mod state;

use std::future::Future;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

pub use cpu::CpuProbe;
pub use gpu::{GPU_METRIC_KEY, GPU_METRIC_PORT, GpuError, GpuProbe, GpuReader};
pub use memory::MemoryProbe;
pub use state::{CollectorState, MIN_CUMULATIVE_VALUE};

use crate::bus::EventBus;
use crate::cgroup;
use crate::event::{Event, EventKind};

const LOG_TARGET: &str = "collector";

/// Reasons a single sample could not be taken.
#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error(transparent)]
    Cgroup(#[from] cgroup::Error),
    #[error(transparent)]
    Gpu(#[from] GpuError),
}

/// Takes one sample of a resource.
pub trait Probe: Send + 'static {
    /// Short name used in log messages.
    fn name(&self) -> &'static str;

    /// Reads the resource and turns the reading into an event payload.
    ///
    /// Implementations that keep state stamp their readings once the read completed; the
    /// tick deadline lags behind after a late tick.
    fn sample(&mut self) -> impl Future<Output = Result<EventKind, SampleError>> + Send;
}

/// Polls a [`Probe`] on an interval and publishes one event per successful sample.
#[derive(Debug)]
pub struct Collector<P> {
    probe: P,
    bus: EventBus,
}

impl<P: Probe> Collector<P> {
    pub fn new(probe: P, bus: EventBus) -> Self {
        Self { probe, bus }
    }

    /// Spawns the collector task, ticking every `interval` until stopped.
    ///
    /// The first tick fires one `interval` after the start.
    pub fn start(self, interval: Duration) -> CollectorHandle {
        let (stop_tx, stop_rx) = watch::channel(false);
        let name = self.probe.name();
        log::info!(target: LOG_TARGET, "starting {name} collector every {interval:?}");
        let task = tokio::spawn(self.run(interval, stop_rx));
        CollectorHandle {
            name,
            stop: stop_tx,
            task,
        }
    }

    async fn run(mut self, interval: Duration, mut stop: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                biased;
                // Also fires when the handle was dropped without stopping.
                _ = stop.changed() => break,
                _ = ticker.tick() => self.tick().await,
            }
        }
        log::debug!(target: LOG_TARGET, "{} collector stopped", self.probe.name());
    }

    async fn tick(&mut self) {
        match self.probe.sample().await {
            Ok(kind) => self.bus.publish(Event::now(kind)),
            Err(err) => log::warn!(
                target: LOG_TARGET,
                "{} collector skipped a tick: {err}",
                self.probe.name()
            ),
        }
    }
}

/// Controls a running collector task.
#[derive(Debug)]
pub struct CollectorHandle {
    name: &'static str,
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl CollectorHandle {
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signals the collector to stop and waits until its task has finished.
    ///
    /// A sample in progress is completed first; the stop takes effect at the next tick
    /// boundary.
    pub async fn stop(self) {
        // The receiver only disappears if the task already ended.
        let _ = self.stop.send(true);
        if let Err(err) = self.task.await {
            log::error!(target: LOG_TARGET, "{} collector task failed: {err}", self.name);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::cgroup::CgroupV1;
    use crate::cgroup::testutil::write_cgroup_v1;
    use crate::fsutil::FileReadError;
    use crate::metrics::PluginMetrics;

    struct ScriptedProbe {
        script: VecDeque<Result<EventKind, SampleError>>,
        calls: Arc<AtomicUsize>,
    }

    impl Probe for ScriptedProbe {
        fn name(&self) -> &'static str {
            "scripted"
        }

        async fn sample(&mut self) -> Result<EventKind, SampleError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.script
                .pop_front()
                .unwrap_or(Ok(EventKind::PerfCpu(0.0)))
        }
    }

    fn read_failure() -> SampleError {
        SampleError::Cgroup(cgroup::Error::Read(FileReadError {
            path: "/missing".into(),
            source: std::io::Error::from(std::io::ErrorKind::NotFound),
        }))
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_tick_is_skipped() {
        let bus = EventBus::new(16);
        let mut subscription = bus.subscribe();
        let calls = Arc::new(AtomicUsize::new(0));
        let probe = ScriptedProbe {
            script: VecDeque::from([
                Ok(EventKind::PerfCpu(1.0)),
                Err(read_failure()),
                Ok(EventKind::PerfCpu(3.0)),
            ]),
            calls: Arc::clone(&calls),
        };

        let handle = Collector::new(probe, bus.clone()).start(Duration::from_secs(1));
        let first = subscription.recv().await.unwrap();
        let second = subscription.recv().await.unwrap();
        handle.stop().await;

        assert_eq!(first.kind(), &EventKind::PerfCpu(1.0));
        assert_eq!(second.kind(), &EventKind::PerfCpu(3.0));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_after_one_interval() {
        let bus = EventBus::new(16);
        let mut subscription = bus.subscribe();
        let calls = Arc::new(AtomicUsize::new(0));
        let probe = ScriptedProbe {
            script: VecDeque::new(),
            calls: Arc::clone(&calls),
        };
        let start = Instant::now();

        let handle = Collector::new(probe, bus).start(Duration::from_secs(5));
        subscription.recv().await.unwrap();

        assert!(start.elapsed() >= Duration::from_secs(5));
        handle.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_acknowledged() {
        let bus = EventBus::new(16);
        let calls = Arc::new(AtomicUsize::new(0));
        let probe = ScriptedProbe {
            script: VecDeque::new(),
            calls: Arc::clone(&calls),
        };

        let handle = Collector::new(probe, bus).start(Duration::from_secs(3600));
        assert_eq!(handle.name(), "scripted");
        handle.stop().await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cpu_rate_uses_read_time_after_late_tick() {
        let dir = tempfile::tempdir().unwrap();
        write_cgroup_v1(dir.path(), "0 0 0 0 0 0\n", "0\n", "");
        let bus = EventBus::new(16);
        let mut subscription = bus.subscribe();
        let probe = CpuProbe::new(CgroupV1::new(dir.path()), PluginMetrics::default());
        let handle = Collector::new(probe, bus).start(Duration::from_secs(1));

        let first = subscription.recv().await.unwrap();
        assert_eq!(first.kind(), &EventKind::PerfCpu(0.0));

        // Six busy cores until the second read, which happens 1.5 s after its deadline.
        let busy = vec!["2500000000"; 6].join(" ");
        write_cgroup_v1(dir.path(), &busy, "0\n", "");
        tokio::time::advance(Duration::from_millis(2500)).await;

        let second = subscription.recv().await.unwrap();
        handle.stop().await;
        match second.kind() {
            EventKind::PerfCpu(percent) => {
                assert!((percent - 600.0).abs() < 1e-6, "got {percent}")
            }
            other => panic!("Expected PerfCpu, got {other:?}"),
        }
    }
}
