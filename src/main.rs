use clap::Parser;

use plugin_controller::config::Config;
use plugin_controller::shutdown;

/// Entry point for the Plugin Controller.
///
/// Installs the logger, parses the command line and supervises the plugin until it
/// terminates or the controller receives `SIGINT` or `SIGTERM`.
///
/// # Errors
///
/// Returns an error if the configuration is invalid.
///
/// # Examples
///
/// ```bash
/// RUST_LOG=info plugin-controller --enable-cpu-performance --plugin-process-name python3
/// ```
#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    env_logger::init();
    let config = Config::parse();

    let (trigger, shutdown) = shutdown::channel();
    tokio::spawn(async move {
        match termination_signal().await {
            Ok(()) => {
                log::info!("received termination signal, shutting down");
                trigger.trigger();
            }
            Err(err) => log::error!("failed to listen for termination signals: {err}"),
        }
    });

    let termination = plugin_controller::run(config, (), shutdown).await?;
    log::info!("plugin controller exits: {termination:?}");
    Ok(())
}

#[cfg(unix)]
async fn termination_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result,
        _ = terminate.recv() => Ok(()),
    }
}

#[cfg(not(unix))]
async fn termination_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}
