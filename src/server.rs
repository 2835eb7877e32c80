//! Server initialization and startup logic for cdpmux.

use std::path::PathBuf;
use std::time::Duration;

use tracing::{info, warn};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cdpmux_config::{Config, ConfigLoader, ConfigValidator, LogConfig};
use cdpmux_relay::{RelayConfig, RelayServer};

/// Initialize tracing with console output and, when a log directory is
/// configured, a daily-rolling file layer.
pub(crate) fn init_tracing(log: &LogConfig) -> Result<(), Box<dyn std::error::Error>> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log.level.clone()));

    let registry = tracing_subscriber::registry().with(env_filter).with(
        fmt::layer()
            .with_target(true)
            .with_ansi(true),
    );

    match &log.dir {
        Some(dir) => {
            let log_dir = PathBuf::from(ConfigLoader::expand_path(dir));
            std::fs::create_dir_all(&log_dir)?;

            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("cdpmux")
                .filename_suffix("log")
                .max_log_files(30)
                .build(&log_dir)?;

            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            // Keep the writer guard alive for the program duration.
            static GUARD: std::sync::OnceLock<tracing_appender::non_blocking::WorkerGuard> =
                std::sync::OnceLock::new();
            let _ = GUARD.set(guard);

            registry
                .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                .init();
        }
        None => registry.init(),
    }

    Ok(())
}

/// Run the relay in foreground until ctrl-c.
pub(crate) async fn run_server(config: Config) -> Result<(), Box<dyn std::error::Error>> {
    info!("Starting cdpmux v{}", env!("CARGO_PKG_VERSION"));

    let validation = ConfigValidator::validate(&config)?;
    for warning in &validation.warnings {
        warn!(path = %warning.path, "{}", warning.message);
    }

    let relay_config = RelayConfig {
        host: config.server.host.clone(),
        port: config.server.port,
        bearer_token: config.relay.bearer_token.clone(),
        extension_allowed_origins: config.relay.extension_allowed_origins.clone(),
        request_timeout: Duration::from_millis(config.relay.request_timeout_ms),
        write_queue_capacity: config.relay.write_queue_capacity,
    };

    let server = RelayServer::bind(relay_config).await?;
    let addr = server.local_addr()?;

    info!("cdpmux ready:");
    info!("  Extension endpoint:  ws://{}/extension", addr);
    info!("  CDP endpoint:        ws://{}/cdp", addr);
    info!("  Version:             http://{}/version", addr);
    info!("  Extension status:    http://{}/extension/status", addr);

    // Ctrl-c triggers the graceful drain.
    let state = server.state();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutdown signal received");
            state.shutdown.notify_one();
        }
    });

    server.serve().await?;

    info!("Shutting down...");
    Ok(())
}
