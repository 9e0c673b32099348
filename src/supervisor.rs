//! The plugin supervisor.
//!
//! A [`Supervisor`] walks through three states:
//!
//! 1. [`SupervisorState::Locating`]: the [`ProcessLocator`] looks for the plugin process.
//! 2. [`SupervisorState::Supervising`]: collectors sample the plugin, every event is
//!    logged and optionally published, and the plugin's liveness is checked once per
//!    liveness interval.
//! 3. [`SupervisorState::Terminated`]: collectors are stopped, events still queued are
//!    forwarded and the bus is closed.
//!
//! A vanished plugin process only ends supervision once the started marker exists.
//! Without the marker the plugin has not been started yet and supervision continues.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};

use crate::bus::{EventBus, Subscription};
use crate::cgroup::CgroupV1;
use crate::collector::{Collector, CollectorHandle, CpuProbe, GpuProbe, GpuReader, MemoryProbe};
use crate::error::ResultOkLogExt;
use crate::event::Event;
use crate::locator::{
    BlockingTable, ExponentialBackoff, LocateError, ProcessHandle, ProcessLocator, ProcessTable,
};
use crate::marker::StartedMarker;
use crate::metrics::PluginMetrics;
use crate::publisher::{META_PLUGIN, PublishedMessage, Publisher};
use crate::shutdown::Shutdown;

const LOG_TARGET: &str = "supervisor";

pub const DEFAULT_COLLECTION_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_LIVENESS_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Why supervision ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The plugin finished, or shutdown was requested while supervising.
    Normal,
    /// Shutdown was requested before the plugin process was found.
    NotStarted,
    /// The plugin process could not be found and never will be.
    LocateFailed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorState {
    Locating,
    Supervising(ProcessHandle),
    Terminated(Termination),
}

#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Exact name of the plugin process. Empty selects the first user process.
    pub plugin_name: String,
    pub marker: StartedMarker,
    pub backoff: ExponentialBackoff,
    /// Enables the CPU and memory collectors.
    pub collect_cpu: bool,
    /// Enables the GPU collector.
    pub gpu: Option<GpuReader>,
    pub collection_interval: Duration,
    /// cgroup v1 root of the plugin. Defaults to the root seen through the plugin's
    /// `/proc/<pid>/root`.
    pub cgroup_dir: Option<PathBuf>,
    pub liveness_interval: Duration,
    /// Scope for published messages. `None` disables publishing.
    pub publishing_scope: Option<String>,
    /// Meta attached to every published message.
    pub meta: BTreeMap<String, String>,
    pub queue_capacity: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            plugin_name: String::new(),
            marker: StartedMarker::default(),
            backoff: ExponentialBackoff::default(),
            collect_cpu: false,
            gpu: None,
            collection_interval: DEFAULT_COLLECTION_INTERVAL,
            cgroup_dir: None,
            liveness_interval: DEFAULT_LIVENESS_INTERVAL,
            publishing_scope: None,
            meta: BTreeMap::new(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}

pub struct Supervisor<T, P = ()> {
    table: T,
    publisher: Arc<P>,
    config: SupervisorConfig,
    bus: EventBus,
    metrics: PluginMetrics,
    state: watch::Sender<SupervisorState>,
}

impl<T: ProcessTable, P: Publisher> Supervisor<T, P> {
    pub fn new(table: T, publisher: P, config: SupervisorConfig) -> Self {
        let bus = EventBus::new(config.queue_capacity);
        let (state, _) = watch::channel(SupervisorState::Locating);
        Self {
            table,
            publisher: Arc::new(publisher),
            config,
            bus,
            metrics: PluginMetrics::default(),
            state,
        }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    pub fn metrics(&self) -> &PluginMetrics {
        &self.metrics
    }

    /// Follows state transitions of the supervisor.
    pub fn watch_state(&self) -> watch::Receiver<SupervisorState> {
        self.state.subscribe()
    }

    /// Runs the supervisor until it terminates.
    pub async fn run(self, mut shutdown: Shutdown) -> Termination {
        let Self {
            table,
            publisher,
            config,
            bus,
            metrics,
            state,
        } = self;

        let mut locator = ProcessLocator::new(table, config.marker.clone(), config.backoff.clone());
        let handle = match locator.locate(&config.plugin_name, &mut shutdown).await {
            Ok(handle) => handle,
            Err(LocateError::Cancelled) => {
                log::info!(target: LOG_TARGET, "shutdown requested before the plugin was found");
                return terminate(&state, &bus, Termination::NotStarted);
            }
            Err(err @ LocateError::Permanent(_)) => {
                log::info!(target: LOG_TARGET, "{err}");
                return terminate(&state, &bus, Termination::LocateFailed);
            }
        };
        let mut meta = config.meta.clone();
        meta.insert(META_PLUGIN.to_owned(), handle.name().to_owned());
        let mut supervising = Supervising {
            table: locator.into_table(),
            handle: handle.clone(),
            // Subscribed before any collector starts so no event is missed.
            subscription: bus.subscribe(),
            publisher,
            config,
            meta,
        };
        state.send_replace(SupervisorState::Supervising(handle));
        let collectors = supervising.start_collectors(&bus, &metrics);
        let termination = supervising.supervise(&mut shutdown).await;
        stop_collectors(collectors).await;
        supervising.drain();
        terminate(&state, &bus, termination)
    }
}

struct Supervising<T, P> {
    table: BlockingTable<T>,
    handle: ProcessHandle,
    subscription: Subscription,
    publisher: Arc<P>,
    config: SupervisorConfig,
    meta: BTreeMap<String, String>,
}

impl<T: ProcessTable, P: Publisher> Supervising<T, P> {
    fn start_collectors(&self, bus: &EventBus, metrics: &PluginMetrics) -> Vec<CollectorHandle> {
        let interval = self.config.collection_interval;
        let mut collectors = Vec::new();
        if self.config.collect_cpu {
            let cgroup = match &self.config.cgroup_dir {
                Some(dir) => CgroupV1::new(dir),
                None => CgroupV1::for_pid(self.handle.pid()),
            };
            log::info!(
                target: LOG_TARGET,
                "cpu and memory collection enabled, reading cgroup at {}",
                cgroup.root().display()
            );
            collectors.push(
                Collector::new(CpuProbe::new(cgroup.clone(), metrics.clone()), bus.clone())
                    .start(interval),
            );
            collectors.push(
                Collector::new(MemoryProbe::new(cgroup, metrics.clone()), bus.clone())
                    .start(interval),
            );
        }
        if let Some(reader) = &self.config.gpu {
            log::info!(
                target: LOG_TARGET,
                "gpu collection enabled, scraping {}",
                reader.url()
            );
            collectors.push(
                Collector::new(GpuProbe::new(reader.clone(), metrics.clone()), bus.clone())
                    .start(interval),
            );
        }
        collectors
    }

    async fn supervise(&mut self, shutdown: &mut Shutdown) -> Termination {
        let period = self.config.liveness_interval;
        let mut liveness = tokio::time::interval_at(Instant::now() + period, period);
        liveness.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = liveness.tick() => {
                    if self.plugin_finished().await {
                        log::info!(
                            target: LOG_TARGET,
                            "the plugin has terminated, supervision ends"
                        );
                        return Termination::Normal;
                    }
                }
                Some(event) = self.subscription.recv() => self.forward(&event),
                _ = shutdown.requested() => {
                    log::info!(target: LOG_TARGET, "shutdown requested while supervising");
                    return Termination::Normal;
                }
            }
        }
    }

    async fn plugin_finished(&self) -> bool {
        let pid = self.handle.pid();
        // A failed query counts as alive.
        if self.table.exists(pid).await.ok_log(LOG_TARGET).unwrap_or(true) {
            return false;
        }
        log::info!(target: LOG_TARGET, "plugin pid {pid} does not exist");
        match self.config.marker.is_present().ok_log(LOG_TARGET) {
            Some(true) => true,
            Some(false) => {
                log::info!(
                    target: LOG_TARGET,
                    "{} does not exist, the plugin has not started yet",
                    self.config.marker.path().display()
                );
                false
            }
            // Undecidable: keep supervising and check again on the next tick.
            None => false,
        }
    }

    /// Forwards the events still queued once the collectors have stopped.
    fn drain(&mut self) {
        while let Some(event) = self.subscription.try_recv() {
            self.forward(&event);
        }
    }

    fn forward(&self, event: &Event) {
        match event.to_json() {
            Ok(json) => log::info!(target: LOG_TARGET, "{}: {json}", event.name()),
            Err(err) => log::error!(target: LOG_TARGET, "failed to encode {}: {err}", event.name()),
        }
        let Some(scope) = &self.config.publishing_scope else {
            return;
        };
        let message = PublishedMessage::from_event(event, self.meta.clone());
        let publisher = Arc::clone(&self.publisher);
        let scope = scope.clone();
        tokio::spawn(async move {
            if let Err(err) = publisher.publish(message, &scope).await {
                log::error!(target: LOG_TARGET, "{err}");
            }
        });
    }
}

async fn stop_collectors(collectors: Vec<CollectorHandle>) {
    for collector in collectors {
        let name = collector.name();
        collector.stop().await;
        log::debug!(target: LOG_TARGET, "{name} collector stopped");
    }
}

fn terminate(
    state: &watch::Sender<SupervisorState>,
    bus: &EventBus,
    termination: Termination,
) -> Termination {
    bus.close();
    state.send_replace(SupervisorState::Terminated(termination));
    log::info!(target: LOG_TARGET, "terminated: {termination:?}");
    termination
}
