//! cdpmux - Chrome DevTools Protocol relay
//!
//! Main entry point for the cdpmux CLI and server.

mod cli;
mod server;

use clap::Parser;
use tracing::{info, warn};

use cdpmux_config::{Config, ConfigLoader};
use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Load configuration from file (with env var expansion); fall back to
    // defaults when the file is absent.
    let loaded = ConfigLoader::load(&cli.config);

    let mut config = match &loaded {
        Ok(config) => config.clone(),
        Err(_) => Config::default(),
    };

    server::init_tracing(&config.log)?;

    if let Err(error) = loaded {
        warn!(path = %cli.config.display(), %error, "Failed to load config, using defaults");
    }
    info!(
        "Configuration loaded: server={}:{}",
        config.server.host, config.server.port
    );

    match cli.command {
        None => server::run_server(config).await,
        Some(Commands::Run {
            host,
            port,
            token,
            extension_origins,
        }) => {
            // CLI args override config values
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            if let Some(token) = token {
                config.relay.bearer_token = Some(token);
            }
            if !extension_origins.is_empty() {
                config.relay.extension_allowed_origins = extension_origins;
            }
            server::run_server(config).await
        }
    }
}
