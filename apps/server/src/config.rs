//! Server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.
//! Variables may also come from a `.env` file in the working directory;
//! the process environment wins over it.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::Path;

use anyhow::{Context, Result};
use cinerelay_core::protocol_constants::{DEFAULT_HEARTBEAT_INTERVAL_SECS, DEFAULT_MEDIA_TTL_SECS};
use serde::Deserialize;

/// Dotenv file read from the working directory.
const DOTENV_FILE: &str = ".env";

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP server to.
    /// Override: `CINERELAY_BIND_PORT`, then `PORT`
    pub bind_port: u16,

    /// Address to bind the HTTP server to.
    pub bind_address: IpAddr,

    /// Shared secret for the admin routes.
    /// Override: `ADMIN_KEY`
    pub admin_key: Option<String>,

    /// Shared secret for the plugin socket.
    /// Override: `PLUGIN_TOKEN`
    pub plugin_token: Option<String>,

    /// Seconds an idle media record is kept.
    /// Override: `CINERELAY_MEDIA_TTL_SECS`
    pub media_ttl_secs: u64,

    /// Seconds between heartbeat pings on video sockets.
    pub heartbeat_interval_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_port: 8080,
            bind_address: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            admin_key: None,
            plugin_token: None,
            media_ttl_secs: DEFAULT_MEDIA_TTL_SECS,
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let dotenv = read_dotenv(Path::new(DOTENV_FILE))?;
        Self::load_with_env(path, |name| {
            std::env::var(name)
                .ok()
                .or_else(|| dotenv.get(name).cloned())
        })
    }

    /// Like [`ServerConfig::load`], reading variables through `lookup`.
    pub fn load_with_env(
        path: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides(lookup);
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let port = lookup("CINERELAY_BIND_PORT").or_else(|| lookup("PORT"));
        if let Some(port) = port.and_then(|val| val.parse().ok()) {
            self.bind_port = port;
        }

        if let Some(key) = lookup("ADMIN_KEY") {
            self.admin_key = Some(key);
        }

        if let Some(token) = lookup("PLUGIN_TOKEN") {
            self.plugin_token = Some(token);
        }

        if let Some(ttl) = lookup("CINERELAY_MEDIA_TTL_SECS").and_then(|val| val.parse().ok()) {
            self.media_ttl_secs = ttl;
        }
    }

    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.bind_address, self.bind_port)
    }

    /// Converts to cinerelay-core's Config type.
    pub fn to_core_config(&self) -> cinerelay_core::Config {
        cinerelay_core::Config {
            admin_key: self.admin_key.clone(),
            plugin_token: self.plugin_token.clone(),
            media_ttl_secs: self.media_ttl_secs,
            heartbeat_interval_secs: self.heartbeat_interval_secs,
        }
    }
}

/// Reads `KEY=value` pairs from a dotenv file. A missing file yields none.
fn read_dotenv(path: &Path) -> Result<HashMap<String, String>> {
    match dotenvy::from_path_iter(path) {
        Ok(iter) => iter
            .map(|item| item.with_context(|| format!("Invalid line in {}", path.display())))
            .collect(),
        Err(e) if e.not_found() => Ok(HashMap::new()),
        Err(e) => Err(e).with_context(|| format!("Failed to read {}", path.display())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| vars.get(name).cloned()
    }

    #[test]
    fn defaults_without_file() {
        let config = ServerConfig::load_with_env(None, env(&[])).unwrap();
        assert_eq!(config, ServerConfig::default());
        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:8080");
    }

    #[test]
    fn reads_yaml_with_partial_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bind_port: 9000\nadmin_key: from-file\nmedia_ttl_secs: 60").unwrap();

        let config = ServerConfig::load_with_env(Some(file.path()), env(&[])).unwrap();
        assert_eq!(config.bind_port, 9000);
        assert_eq!(config.admin_key.as_deref(), Some("from-file"));
        assert_eq!(config.media_ttl_secs, 60);
        assert_eq!(config.heartbeat_interval_secs, DEFAULT_HEARTBEAT_INTERVAL_SECS);
    }

    #[test]
    fn env_overrides_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bind_port: 9000\nadmin_key: from-file").unwrap();

        let config = ServerConfig::load_with_env(
            Some(file.path()),
            env(&[
                ("PORT", "7000"),
                ("ADMIN_KEY", "from-env"),
                ("PLUGIN_TOKEN", "plug"),
                ("CINERELAY_MEDIA_TTL_SECS", "30"),
            ]),
        )
        .unwrap();
        assert_eq!(config.bind_port, 7000);
        assert_eq!(config.admin_key.as_deref(), Some("from-env"));
        assert_eq!(config.plugin_token.as_deref(), Some("plug"));
        assert_eq!(config.media_ttl_secs, 30);
    }

    #[test]
    fn specific_port_variable_wins() {
        let config = ServerConfig::load_with_env(
            None,
            env(&[("PORT", "7000"), ("CINERELAY_BIND_PORT", "7100")]),
        )
        .unwrap();
        assert_eq!(config.bind_port, 7100);
    }

    #[test]
    fn unparsable_overrides_are_ignored() {
        let config =
            ServerConfig::load_with_env(None, env(&[("PORT", "http"), ("CINERELAY_MEDIA_TTL_SECS", "x")]))
                .unwrap();
        assert_eq!(config.bind_port, 8080);
        assert_eq!(config.media_ttl_secs, DEFAULT_MEDIA_TTL_SECS);
    }

    #[test]
    fn invalid_yaml_is_an_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "bind_port: [not a port").unwrap();
        assert!(ServerConfig::load_with_env(Some(file.path()), env(&[])).is_err());
    }

    #[test]
    fn dotenv_file_supplies_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".env");
        std::fs::write(&path, "# secrets\nADMIN_KEY=from-dotenv\nPORT=7300\n").unwrap();

        let dotenv = read_dotenv(&path).unwrap();
        assert_eq!(dotenv.get("ADMIN_KEY").map(String::as_str), Some("from-dotenv"));

        let config = ServerConfig::load_with_env(None, |name| dotenv.get(name).cloned()).unwrap();
        assert_eq!(config.admin_key.as_deref(), Some("from-dotenv"));
        assert_eq!(config.bind_port, 7300);
    }

    #[test]
    fn missing_dotenv_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_dotenv(&dir.path().join(".env")).unwrap().is_empty());
    }

    #[test]
    fn core_config_carries_secrets() {
        let config = ServerConfig {
            plugin_token: Some("plug".into()),
            ..ServerConfig::default()
        };
        let core = config.to_core_config();
        assert_eq!(core.plugin_token.as_deref(), Some("plug"));
        assert!(core.validate().is_ok());
    }
}
