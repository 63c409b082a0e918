//! Server configuration.
//!
//! Settings come from a JSON config file with CLI overrides on top.
//! Validation failures are fatal before the first accept.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::ServerError;

/// How the server presents itself to the outside world.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServerMode {
    /// Local network only: no auth resolver, no master-list registration.
    Lan,
    /// Internet server: auth and listing collaborators are active.
    Inet,
}

/// Settings consumed by the relay core.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Maximum simultaneous clients.
    pub max_clients: usize,
    /// TCP port to listen on.
    pub listen_port: u16,
    /// LAN or internet mode.
    #[serde(default = "default_mode")]
    pub server_mode: ServerMode,
    /// Display name sent during the handshake and used for listings.
    #[serde(default = "default_name")]
    pub server_name: String,
    /// Whether a script host should be attached.
    #[serde(default)]
    pub enable_scripting: bool,
    /// Script to hand to the embedding script engine.
    #[serde(default)]
    pub script_path: Option<PathBuf>,
    /// Log the occupancy table on roster changes.
    #[serde(default)]
    pub print_stats: bool,
    /// Message-of-the-day file streamed to each admitted client.
    #[serde(default = "default_motd")]
    pub motd_file: PathBuf,
    /// User authorization file; absent means every client is unprivileged.
    #[serde(default)]
    pub auth_file: Option<PathBuf>,
    /// Depth of each client's outgoing frame queue.
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,
}

fn default_mode() -> ServerMode {
    ServerMode::Inet
}

fn default_name() -> String {
    "slipstream server".to_string()
}

fn default_motd() -> PathBuf {
    PathBuf::from("motd.txt")
}

fn default_queue_depth() -> usize {
    256
}

impl ServerConfig {
    /// Load a JSON configuration file.
    pub fn load_file(path: &Path) -> Result<Self, ServerError> {
        let file = std::fs::File::open(path)
            .map_err(|e| ServerError::Config(format!("cannot open '{}': {e}", path.display())))?;
        serde_json::from_reader(std::io::BufReader::new(file))
            .map_err(|e| ServerError::Config(format!("cannot parse '{}': {e}", path.display())))
    }

    /// Check settings before the first accept.
    pub fn validate(&self) -> Result<(), ServerError> {
        if self.max_clients == 0 {
            return Err(ServerError::Config("max_clients must be at least 1".to_string()));
        }
        if self.listen_port == 0 {
            return Err(ServerError::Config("listen_port must be set".to_string()));
        }
        if self.queue_depth == 0 {
            return Err(ServerError::Config("queue_depth must be at least 1".to_string()));
        }
        if self.enable_scripting && self.script_path.is_none() {
            return Err(ServerError::Config(
                "enable_scripting requires script_path".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_clients: 16,
            listen_port: 12333,
            server_mode: default_mode(),
            server_name: default_name(),
            enable_scripting: false,
            script_path: None,
            print_stats: false,
            motd_file: default_motd(),
            auth_file: None,
            queue_depth: default_queue_depth(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let config: ServerConfig =
            serde_json::from_str(r#"{"max_clients": 8, "listen_port": 12000}"#).unwrap();

        assert_eq!(config.max_clients, 8);
        assert_eq!(config.listen_port, 12000);
        assert_eq!(config.server_mode, ServerMode::Inet);
        assert_eq!(config.queue_depth, 256);
        config.validate().unwrap();
    }

    #[test]
    fn parse_lan_mode() {
        let config: ServerConfig = serde_json::from_str(
            r#"{"max_clients": 8, "listen_port": 12000, "server_mode": "lan"}"#,
        )
        .unwrap();
        assert_eq!(config.server_mode, ServerMode::Lan);
    }

    #[test]
    fn validation_rejects_bad_settings() {
        let mut config = ServerConfig::default();
        config.max_clients = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.listen_port = 0;
        assert!(config.validate().is_err());

        let mut config = ServerConfig::default();
        config.enable_scripting = true;
        assert!(config.validate().is_err());
        config.script_path = Some(PathBuf::from("hooks.script"));
        config.validate().unwrap();
    }
}
