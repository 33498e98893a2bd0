use clap::{Parser, Subcommand};

use std::path::PathBuf;

/// Correlated request/response over a localhost WebSocket.
#[derive(Debug, Parser)]
#[command(name = "ipc-bridge", author, version, about, long_about = None)]
pub struct Cli {
    /// Directory holding config.json and connection.json
    #[arg(long, global = true, value_name = "DIR")]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the host and serve the built-in channels until Ctrl-C
    Host {
        /// Port to listen on (overrides config and IPC_BRIDGE_PORT)
        #[arg(short, long)]
        port: Option<u16>,
    },

    /// Send one request to a running host and print the response
    Call {
        /// Channel to send on, e.g. `ping`
        channel: String,

        /// JSON payload; defaults to null
        payload: Option<String>,

        /// Give up after this many milliseconds
        #[arg(short, long, value_name = "MS")]
        timeout_ms: Option<u64>,

        /// Host URL (defaults to the one in connection.json)
        #[arg(long)]
        url: Option<String>,

        /// Auth token (defaults to IPC_BRIDGE_TOKEN, then connection.json)
        #[arg(long)]
        token: Option<String>,
    },
}
