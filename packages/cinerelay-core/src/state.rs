//! Core configuration types.
//!
//! [`Config`] is what the library needs to run a relay. Binaries build it
//! from their own file/env/CLI layering and hand it to
//! [`bootstrap_services`](crate::bootstrap::bootstrap_services).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::protocol_constants::{DEFAULT_HEARTBEAT_INTERVAL_SECS, DEFAULT_MEDIA_TTL_SECS};

/// Configuration for the relay.
///
/// All fields have sensible defaults.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Shared secret expected in the `x-admin-key` header. Unset or empty
    /// leaves the admin routes open.
    pub admin_key: Option<String>,

    /// Shared secret expected on the plugin socket query string. Unset or
    /// empty leaves the plugin socket open.
    pub plugin_token: Option<String>,

    /// Idle time after which a media record is pruned (seconds).
    pub media_ttl_secs: u64,

    /// Interval between `PING` frames on video sockets (seconds).
    pub heartbeat_interval_secs: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            admin_key: None,
            plugin_token: None,
            media_ttl_secs: DEFAULT_MEDIA_TTL_SECS,
            heartbeat_interval_secs: DEFAULT_HEARTBEAT_INTERVAL_SECS,
        }
    }
}

impl Config {
    /// Validates the configuration values.
    pub fn validate(&self) -> Result<(), String> {
        if self.media_ttl_secs == 0 {
            return Err("media_ttl_secs must be >= 1".to_string());
        }
        if self.heartbeat_interval_secs == 0 {
            return Err(
                "heartbeat_interval_secs must be >= 1 (tokio::time::interval panics on 0)"
                    .to_string(),
            );
        }
        Ok(())
    }

    pub fn media_ttl(&self) -> Duration {
        Duration::from_secs(self.media_ttl_secs)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.heartbeat_interval_secs)
    }

    /// Admin key if one is actually configured.
    pub fn effective_admin_key(&self) -> Option<&str> {
        self.admin_key.as_deref().filter(|k| !k.is_empty())
    }

    /// Plugin token if one is actually configured.
    pub fn effective_plugin_token(&self) -> Option<&str> {
        self.plugin_token.as_deref().filter(|k| !k.is_empty())
    }
}
