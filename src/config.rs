use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::collector::{GpuError, GpuReader};
use crate::locator::ExponentialBackoff;
use crate::marker::{DEFAULT_STARTED_MARKER, StartedMarker};
use crate::publisher::META_HOST;
use crate::supervisor::{DEFAULT_LIVENESS_INTERVAL, SupervisorConfig};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("`--{flag}` must be greater than zero")]
    NotPositive { flag: &'static str },
    #[error("GPU performance collection requires `--gpu-metric-host`")]
    MissingGpuHost,
    #[error("failed to set up GPU metric reader: {0}")]
    Gpu(#[source] GpuError),
}

/// Command line of the plugin controller. Every flag can also be set through the
/// environment.
#[derive(Debug, Clone, Parser)]
#[command(name = "plugin-controller", version, about = "Supervises an edge plugin process")]
pub struct Config {
    /// Collect CPU and memory usage of the plugin.
    #[arg(long, env = "ENABLE_CPU_PERFORMANCE")]
    pub enable_cpu_performance: bool,

    /// Collect GPU load from the GPU metric exporter.
    #[arg(long, env = "ENABLE_GPU_PERFORMANCE")]
    pub enable_gpu_performance: bool,

    /// Seconds between two samples of every collector.
    #[arg(long, env = "PERFORMANCE_COLLECTION_INTERVAL", default_value_t = 5)]
    pub performance_collection_interval: u64,

    /// Exact process name of the plugin. Empty picks the first user process.
    #[arg(long, env = "PLUGIN_PROCESS_NAME", default_value = "")]
    pub plugin_process_name: String,

    /// cgroup v1 root of the plugin. Defaults to `/proc/<pid>/root/sys/fs/cgroup`.
    #[arg(long, env = "APP_CGROUP_DIR")]
    pub app_cgroup_dir: Option<PathBuf>,

    /// Host serving the Prometheus formatted GPU metrics.
    #[arg(long, env = "GPU_METRIC_HOST")]
    pub gpu_metric_host: Option<String>,

    /// Seconds before a GPU metric request is abandoned.
    #[arg(long, env = "GPU_METRIC_TIMEOUT", default_value_t = 5)]
    pub gpu_metric_timeout: u64,

    /// Hand every event to the message publisher.
    #[arg(long, env = "ENABLE_METRICS_PUBLISHING")]
    pub enable_metrics_publishing: bool,

    /// Scope of published messages.
    #[arg(long, env = "WAGGLE_PUBLISHING_SCOPE", default_value = "node")]
    pub metrics_publishing_scope: String,

    /// File created by the plugin runtime once the plugin has been started.
    #[arg(long, env = "STARTED_MARKER", default_value = DEFAULT_STARTED_MARKER)]
    pub started_marker: PathBuf,

    /// Port of the HTTP API. 0 disables the API.
    #[arg(long, env = "API_PORT", default_value_t = 9100)]
    pub api_port: u16,

    /// Events buffered per subscriber before the oldest is dropped.
    #[arg(long, env = "EVENT_QUEUE_CAPACITY", default_value_t = 64)]
    pub event_queue_capacity: usize,
}

impl Config {
    /// Checks the settings that clap cannot check on its own.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] describing the first invalid setting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.performance_collection_interval == 0 {
            return Err(ConfigError::NotPositive {
                flag: "performance-collection-interval",
            });
        }
        if self.gpu_metric_timeout == 0 {
            return Err(ConfigError::NotPositive {
                flag: "gpu-metric-timeout",
            });
        }
        if self.event_queue_capacity == 0 {
            return Err(ConfigError::NotPositive {
                flag: "event-queue-capacity",
            });
        }
        if self.enable_gpu_performance && self.gpu_metric_host().is_none() {
            return Err(ConfigError::MissingGpuHost);
        }
        Ok(())
    }

    fn gpu_metric_host(&self) -> Option<&str> {
        self.gpu_metric_host
            .as_deref()
            .map(str::trim)
            .filter(|host| !host.is_empty())
    }

    /// Validates the settings and turns them into a [`SupervisorConfig`].
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] if a setting is invalid or the GPU reader cannot be
    /// created.
    pub fn supervisor_config(&self) -> Result<SupervisorConfig, ConfigError> {
        self.validate()?;
        let gpu = match self.gpu_metric_host() {
            Some(host) if self.enable_gpu_performance => Some(
                GpuReader::for_host(host, Duration::from_secs(self.gpu_metric_timeout))
                    .map_err(ConfigError::Gpu)?,
            ),
            _ => None,
        };
        let mut meta = BTreeMap::new();
        if let Some(host) = sysinfo::System::host_name() {
            meta.insert(META_HOST.to_owned(), host);
        }
        Ok(SupervisorConfig {
            plugin_name: self.plugin_process_name.trim().to_owned(),
            marker: StartedMarker::new(&self.started_marker),
            backoff: ExponentialBackoff::default(),
            collect_cpu: self.enable_cpu_performance,
            gpu,
            collection_interval: Duration::from_secs(self.performance_collection_interval),
            cgroup_dir: self.app_cgroup_dir.clone(),
            liveness_interval: DEFAULT_LIVENESS_INTERVAL,
            publishing_scope: self
                .enable_metrics_publishing
                .then(|| self.metrics_publishing_scope.clone()),
            meta,
            queue_capacity: self.event_queue_capacity,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Config {
        Config::try_parse_from(std::iter::once("plugin-controller").chain(args.iter().copied()))
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = parse(&[]);
        assert!(!config.enable_cpu_performance);
        assert_eq!(config.performance_collection_interval, 5);
        assert_eq!(config.started_marker, PathBuf::from("/app/started"));
        assert_eq!(config.api_port, 9100);
        assert_eq!(config.event_queue_capacity, 64);
        config.validate().unwrap();
    }

    #[test]
    fn test_supervisor_config() {
        let config = parse(&[
            "--enable-cpu-performance",
            "--performance-collection-interval",
            "2",
            "--plugin-process-name",
            "python3",
            "--app-cgroup-dir",
            "/sys/fs/cgroup",
            "--enable-metrics-publishing",
            "--metrics-publishing-scope",
            "all",
        ]);
        let supervisor = config.supervisor_config().unwrap();
        assert!(supervisor.collect_cpu);
        assert!(supervisor.gpu.is_none());
        assert_eq!(supervisor.collection_interval, Duration::from_secs(2));
        assert_eq!(supervisor.plugin_name, "python3");
        assert_eq!(supervisor.cgroup_dir, Some(PathBuf::from("/sys/fs/cgroup")));
        assert_eq!(supervisor.publishing_scope.as_deref(), Some("all"));
    }

    #[test]
    fn test_publishing_disabled_by_default() {
        let supervisor = parse(&[]).supervisor_config().unwrap();
        assert_eq!(supervisor.publishing_scope, None);
    }

    #[test]
    fn test_gpu_reader_url() {
        let config = parse(&[
            "--enable-gpu-performance",
            "--gpu-metric-host",
            "10.31.81.1",
        ]);
        let supervisor = config.supervisor_config().unwrap();
        assert_eq!(
            supervisor.gpu.unwrap().url(),
            "http://10.31.81.1:9101/metrics"
        );
    }

    #[test]
    fn test_gpu_without_host_is_rejected() {
        let config = parse(&["--enable-gpu-performance", "--gpu-metric-host", " "]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingGpuHost)
        ));
    }

    #[test]
    fn test_zero_interval_is_rejected() {
        let config = parse(&["--performance-collection-interval", "0"]);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::NotPositive {
                flag: "performance-collection-interval"
            })
        ));
    }

    #[test]
    fn test_malformed_number_is_rejected() {
        let parsed = Config::try_parse_from([
            "plugin-controller",
            "--performance-collection-interval",
            "five",
        ]);
        assert!(parsed.is_err());
    }
}
