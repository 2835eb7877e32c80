//! CLI definitions for cdpmux.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// cdpmux CLI.
#[derive(Parser)]
#[command(name = "cdpmux")]
#[command(about = "Chrome DevTools Protocol relay")]
#[command(version)]
pub(crate) struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config/default.toml", global = true)]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Run the relay in foreground (default)
    Run {
        /// Bind host
        #[arg(long)]
        host: Option<String>,

        /// Bind port
        #[arg(long)]
        port: Option<u16>,

        /// Bearer token required from CDP clients
        #[arg(long)]
        token: Option<String>,

        /// Allowed extension origin (repeatable)
        #[arg(long = "extension-origin")]
        extension_origins: Vec<String>,
    },
}
