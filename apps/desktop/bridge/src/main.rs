use ipc_bridge::cli::{Cli, Command};
use ipc_bridge::commands::call::CallRequest;
use ipc_bridge::commands::{call, host};
use ipc_bridge::connection_info::TOKEN_ENV_VAR;
use ipc_bridge::error::BridgeError;
use ipc_bridge::logger::initialize as LoggerInitialize;

use ipc_core::config::BridgeConfig;

use common::{ErrorLocation, RedactedToken};

use std::fs::create_dir_all;
use std::panic::Location;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use log::{LevelFilter, error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            match serde_json::to_string_pretty(&e) {
                Ok(json) => eprintln!("{json}"),
                Err(_) => eprintln!("{e}"),
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), BridgeError> {
    let dotenv = dotenvy::dotenv();

    let config_dir = match cli.config_dir {
        Some(dir) => dir,
        None => default_config_dir()?,
    };
    create_dir_all(&config_dir).map_err(|e| BridgeError::Bridge {
        message: format!("Failed to create config directory: {e}"),
        location: ErrorLocation::from(Location::caller()),
    })?;

    let mut config = BridgeConfig::load(&config_dir)?;
    config.apply_env_overrides()?;
    let env_token = std::env::var(TOKEN_ENV_VAR).ok().map(RedactedToken::new);

    match cli.command {
        Command::Host { port } => {
            LoggerInitialize(&config_dir, config.logging.level.to_level_filter())?;
            info!("ipc-bridge host starting");
            info!("Config directory: {}", config_dir.display());
            match dotenv {
                Ok(path) => info!("Loaded .env from {}", path.display()),
                Err(e) => warn!("No .env loaded: {e}"),
            }

            if let Some(port) = port {
                config.transport.port = port;
            }
            config.validate()?;

            host::run(&config, &config_dir, env_token).await
        }
        Command::Call {
            channel,
            payload,
            timeout_ms,
            url,
            token,
        } => {
            // Quiet: stdout carries the response
            LoggerInitialize(&config_dir, LevelFilter::Error)?;

            let request = CallRequest {
                channel,
                payload: CallRequest::parse_payload(payload.as_deref())?,
                timeout: timeout_ms
                    .or(config.protocol.default_timeout_ms)
                    .map(Duration::from_millis),
                url,
                token: token.map(RedactedToken::new).or(env_token),
            };

            let response = call::run(&config, &config_dir, request).await?;
            let json = serde_json::to_string_pretty(&response).map_err(|e| BridgeError::Bridge {
                message: format!("Failed to format response: {e}"),
                location: ErrorLocation::from(Location::caller()),
            })?;
            println!("{json}");
            Ok(())
        }
    }
}

fn default_config_dir() -> Result<PathBuf, BridgeError> {
    BridgeConfig::default_dir().ok_or_else(|| BridgeError::Config {
        message: "No platform config directory; pass --config-dir".to_string(),
        location: ErrorLocation::from(Location::caller()),
    })
}
