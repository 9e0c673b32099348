//! Plugin Controller: a sidecar that supervises an edge plugin process.
//!
//! The controller locates the plugin in the shared process namespace, samples its CPU,
//! memory and GPU usage on an interval and turns every sample into a telemetry event.
//! Events are logged, optionally handed to a message publisher and reflected in
//! Prometheus metrics. Supervision ends once the plugin process is gone and the plugin
//! runtime's started marker shows that it has actually run.
use std::sync::Arc;

use prometheus_client::registry::Registry;

pub mod api;
pub mod bus;
pub mod cgroup;
pub mod collector;
pub mod config;
pub mod error;
pub mod event;
pub mod fsutil;
pub mod locator;
pub mod marker;
pub mod metrics;
pub mod publisher;
pub mod shutdown;
pub mod supervisor;

use config::Config;
use locator::SysinfoProcessTable;
use publisher::Publisher;
use shutdown::Shutdown;
use supervisor::{Supervisor, Termination};

const LOG_TARGET: &str = "plugin controller";

/// Runs the Plugin Controller until the plugin terminates or `shutdown` fires.
///
/// Spawns the API server unless its port is 0, then supervises the plugin.
///
/// # Errors
///
/// Returns an error if the configuration is invalid.
pub async fn run<P: Publisher>(
    config: Config,
    publisher: P,
    shutdown: Shutdown,
) -> Result<Termination, Box<dyn std::error::Error>> {
    let supervisor_config = config.supervisor_config()?;
    log::info!(target: LOG_TARGET, "plugin controller started");

    let supervisor = Supervisor::new(SysinfoProcessTable::new(), publisher, supervisor_config);

    if config.api_port != 0 {
        let mut registry = Registry::default();
        supervisor
            .metrics()
            .register(&mut registry, supervisor.bus().dropped_counter());
        let api = api::APIServer::new(Arc::new(registry));
        let port = config.api_port;
        tokio::spawn(async move {
            if let Err(err) = api.listen(("0.0.0.0", port)).await {
                log::error!(target: LOG_TARGET, "API server failed: {err}");
            }
        });
    }

    Ok(supervisor.run(shutdown).await)
}
