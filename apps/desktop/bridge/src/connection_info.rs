//! Where a running host can be reached.
//!
//! The host writes `connection.json` (port + auth token) into the config
//! directory so `ipc-bridge call` can find it without flags.

use crate::error::BridgeError;

use ipc_core::transport::ws::LOOPBACK_HOST;

use common::{ErrorLocation, RedactedToken};

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::panic::Location;
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};

pub const CONNECTION_FILE_NAME: &str = "connection.json";

/// Overrides the token read from `connection.json`.
pub const TOKEN_ENV_VAR: &str = "IPC_BRIDGE_TOKEN";

#[derive(Clone)]
pub struct ConnectionInfo {
    port: u16,
    auth_token: RedactedToken,
}

/// On-disk form. Only ever built right before writing.
#[derive(Serialize, Deserialize)]
struct ConnectionFile {
    port: u16,
    auth_token: String,
}

impl ConnectionInfo {
    pub fn new(port: u16, auth_token: RedactedToken) -> Self {
        Self { port, auth_token }
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn auth_token(&self) -> &RedactedToken {
        &self.auth_token
    }

    pub fn url(&self) -> String {
        format!("ws://{LOOPBACK_HOST}:{}", self.port)
    }

    /// Write {dir}/connection.json atomically, readable by the owner only.
    pub fn write(&self, dir: &Path) -> Result<(), BridgeError> {
        std::fs::create_dir_all(dir).map_err(|e| BridgeError::Bridge {
            message: format!("Failed to create {}: {e}", dir.display()),
            location: ErrorLocation::from(Location::caller()),
        })?;

        let path = dir.join(CONNECTION_FILE_NAME);
        let temp_path = dir.join(format!("{CONNECTION_FILE_NAME}.tmp"));

        let json = serde_json::to_string_pretty(&ConnectionFile {
            port: self.port,
            auth_token: self.auth_token.expose().to_string(),
        })
        .map_err(|e| BridgeError::Bridge {
            message: format!("Failed to serialize connection info: {e}"),
            location: ErrorLocation::from(Location::caller()),
        })?;

        write_private(&temp_path, json.as_bytes()).map_err(|e| BridgeError::Bridge {
            message: format!("Failed to write {}: {e}", temp_path.display()),
            location: ErrorLocation::from(Location::caller()),
        })?;
        std::fs::rename(&temp_path, &path).map_err(|e| BridgeError::Bridge {
            message: format!("Failed to write {}: {e}", path.display()),
            location: ErrorLocation::from(Location::caller()),
        })?;

        info!("Connection info written to {}", path.display());
        Ok(())
    }

    /// Read {dir}/connection.json.
    pub fn read(dir: &Path) -> Result<Self, BridgeError> {
        let path = dir.join(CONNECTION_FILE_NAME);
        let contents = std::fs::read_to_string(&path).map_err(|e| BridgeError::Bridge {
            message: format!(
                "No running host found ({}: {e}); start one with `ipc-bridge host`",
                path.display()
            ),
            location: ErrorLocation::from(Location::caller()),
        })?;

        let file: ConnectionFile = serde_json::from_str(&contents).map_err(|e| BridgeError::Bridge {
            message: format!("Corrupt connection file {}: {e}", path.display()),
            location: ErrorLocation::from(Location::caller()),
        })?;

        Ok(Self::new(file.port, RedactedToken::new(file.auth_token)))
    }

    /// Remove {dir}/connection.json if present.
    pub fn remove(dir: &Path) {
        let path = dir.join(CONNECTION_FILE_NAME);
        match std::fs::remove_file(&path) {
            Ok(()) => debug!("Removed {}", path.display()),
            Err(e) => debug!("Nothing to remove at {}: {e}", path.display()),
        }
    }
}

/// Create `path` fresh, owner-only from the moment it exists.
fn write_private(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }

    let mut file = options.open(path)?;
    file.write_all(contents)?;
    file.sync_all()
}
